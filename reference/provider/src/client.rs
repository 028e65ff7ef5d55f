//! HTTP client for the liquidity provider.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use swapsettle_common::{CurrencyPair, FxRate};
use swapsettle_fx::{FxError, FxResult, RateProvider};
use swapsettle_protocol::{
    InstantOrderRequest, LiquidityProvider, ProviderAck, ProviderEnvelope, ProviderError, Ticker,
    WithdrawRequest,
};
use tracing::{debug, info, instrument, warn};

use crate::config::ProviderConfig;

/// Provider client over HTTP and JSON.
///
/// Constructed once at startup and shared; the inner `reqwest::Client`
/// pools connections.
pub struct HttpLiquidityProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpLiquidityProvider {
    /// Create a new client.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ProviderError> {
        let request = if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), message = %message, "Provider rejected request");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ProviderEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if envelope.status != "success" {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message: envelope.message.unwrap_or(envelope.status),
            });
        }

        Ok(envelope.data)
    }
}

#[async_trait]
impl RateProvider for HttpLiquidityProvider {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self), fields(pair = %pair))]
    async fn get_rate(&self, pair: &CurrencyPair) -> FxResult<FxRate> {
        if !self.supports_pair(pair) {
            return Err(FxError::RateNotAvailable(pair.clone()));
        }

        let url = self.url(&format!("/markets/{}/ticker", pair.market_symbol()));
        let ticker: Ticker = self
            .send(self.client.get(&url))
            .await
            .map_err(|e| FxError::ProviderError {
                pair: pair.clone(),
                message: e.to_string(),
            })?;

        debug!(price = %ticker.price, "Fetched ticker");
        Ok(FxRate::new(pair.clone(), ticker.price, chrono::Utc::now(), RateProvider::name(self)))
    }

    fn supports_pair(&self, pair: &CurrencyPair) -> bool {
        self.config.markets.contains(pair)
    }

    fn supported_pairs(&self) -> Vec<CurrencyPair> {
        self.config.markets.clone()
    }
}

#[async_trait]
impl LiquidityProvider for HttpLiquidityProvider {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(reference = %request.reference, market = %request.market))]
    async fn execute_order(&self, request: &InstantOrderRequest) -> Result<ProviderAck, ProviderError> {
        let url = self.url(&format!("/users/{}/instant_orders", request.account_id));
        let ack: ProviderAck = self.send(self.client.post(&url).json(request)).await?;

        info!(external_id = %ack.id, status = %ack.status, "Order acknowledged");
        Ok(ack)
    }

    #[instrument(skip(self, request), fields(reference = %request.reference, currency = %request.currency))]
    async fn withdraw(&self, request: &WithdrawRequest) -> Result<ProviderAck, ProviderError> {
        let url = self.url(&format!("/users/{}/withdraws", request.account_id));
        let ack: ProviderAck = self.send(self.client.post(&url).json(request)).await?;

        info!(external_id = %ack.id, status = %ack.status, "Withdrawal acknowledged");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use swapsettle_common::Currency;
    use swapsettle_protocol::OrderSide;

    async fn ticker(Path(symbol): Path<String>) -> (StatusCode, Json<Value>) {
        match symbol.as_str() {
            "btcngn" => (
                StatusCode::OK,
                Json(json!({"status": "success", "data": {"market": "btcngn", "price": "50000000"}})),
            ),
            "ethngn" => (StatusCode::OK, Json(json!({"unexpected": true}))),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({"status": "error", "message": "market not found"})),
            ),
        }
    }

    async fn instant_order(
        Path(account): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"status": "error"})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "data": {"id": format!("ord_{}", account), "status": "submitted", "reference": body["reference"]}
            })),
        )
    }

    async fn withdraw() -> (StatusCode, Json<Value>) {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"status": "error", "message": "insufficient funds"})),
        )
    }

    async fn setup_client() -> HttpLiquidityProvider {
        let app = Router::new()
            .route("/markets/{symbol}/ticker", get(ticker))
            .route("/users/{account}/instant_orders", post(instant_order))
            .route("/users/{account}/withdraws", post(withdraw));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        HttpLiquidityProvider::new(ProviderConfig {
            base_url: format!("http://{}", addr),
            api_key: "test-key".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_rate() {
        let client = setup_client().await;
        let pair = CurrencyPair::new(Currency::btc(), Currency::ngn());

        let rate = client.get_rate(&pair).await.unwrap();
        assert_eq!(rate.price, dec!(50000000));
        assert_eq!(rate.pair, pair);
        assert_eq!(rate.source, "http");
        assert_eq!(LiquidityProvider::name(&client), "http");
    }

    #[tokio::test]
    async fn test_get_rate_errors() {
        let client = setup_client().await;

        let undecodable = client
            .get_rate(&CurrencyPair::new(Currency::eth(), Currency::ngn()))
            .await;
        assert!(matches!(undecodable, Err(FxError::ProviderError { .. })));

        let unsupported = client
            .get_rate(&CurrencyPair::new(Currency::new("DOGE"), Currency::ngn()))
            .await;
        assert!(matches!(unsupported, Err(FxError::RateNotAvailable(_))));

        let missing = client
            .get_rate(&CurrencyPair::new(Currency::btc(), Currency::usd()))
            .await;
        assert!(matches!(missing, Err(FxError::ProviderError { .. })));
    }

    #[tokio::test]
    async fn test_execute_order() {
        let client = setup_client().await;
        let request = InstantOrderRequest {
            account_id: "acct-1".to_string(),
            market: "btcngn".to_string(),
            side: OrderSide::Buy,
            unit: "btc".to_string(),
            volume: "0.002".to_string(),
            price: "50000000".to_string(),
            reference: "q_abc".to_string(),
        };

        let ack = client.execute_order(&request).await.unwrap();
        assert_eq!(ack.id, "ord_acct-1");
        assert_eq!(ack.reference.as_deref(), Some("q_abc"));
    }

    #[tokio::test]
    async fn test_withdraw_rejected() {
        let client = setup_client().await;
        let request = WithdrawRequest {
            account_id: "acct-1".to_string(),
            currency: "btc".to_string(),
            amount: "0.1".to_string(),
            network: None,
            fund_uid: "bc1qexample".to_string(),
            reference: "w_1".to_string(),
        };

        let err = client.withdraw(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let client = HttpLiquidityProvider::new(ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .unwrap();
        let request = WithdrawRequest {
            account_id: "acct-1".to_string(),
            currency: "btc".to_string(),
            amount: "0.1".to_string(),
            network: None,
            fund_uid: "bc1qexample".to_string(),
            reference: "w_1".to_string(),
        };

        let err = client.withdraw(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}

//! HTTP surface.
//!
//! Identity is taken from the `x-user-id` header, which the upstream
//! identity layer sets after authenticating the caller. The webhook route
//! is the exception: it is authenticated by its signature header.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use swapsettle_common::{Currency, QuoteId, SwapSettleError, Trade, TradeId, TradeType, UserId};
use swapsettle_fx::{Quote, QuoteRequest};
use swapsettle_ledger::{MinimumWithdrawal, WithdrawalCheck};
use tracing::error;

use crate::engine::{SettlementEngine, WithdrawalRequest};
use crate::metrics::Metrics;
use crate::reconciler::{ReconcileOutcome, WebhookReconciler};

/// Header carrying the authenticated user.
pub const USER_HEADER: &str = "x-user-id";
/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "x-provider-signature";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    pub reconciler: Arc<WebhookReconciler>,
    pub metrics: Arc<Metrics>,
    pub metrics_enabled: bool,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/fees", get(fees))
        .route("/v1/quotes", post(create_quote))
        .route("/v1/trades", post(confirm_trade).get(list_trades))
        .route("/v1/trades/{id}", get(get_trade))
        .route("/v1/withdrawals/validate", post(validate_withdrawal))
        .route("/v1/withdrawals", post(withdraw))
        .route("/v1/webhooks/provider", post(webhook))
        .with_state(state)
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorResponse {
                code: "UNAUTHENTICATED".to_string(),
                message: format!("Missing or invalid {} header", USER_HEADER),
                details: None,
            },
        }
    }
}

/// HTTP status for an error kind.
pub fn status_for(err: &SwapSettleError) -> StatusCode {
    match err {
        SwapSettleError::Validation { .. }
        | SwapSettleError::UnsupportedCurrency(_)
        | SwapSettleError::InvalidAmount(_)
        | SwapSettleError::Money(_) => StatusCode::BAD_REQUEST,
        SwapSettleError::WebhookAuthentication => StatusCode::UNAUTHORIZED,
        SwapSettleError::AccountFrozen(_) => StatusCode::FORBIDDEN,
        SwapSettleError::TradeNotFound(_) => StatusCode::NOT_FOUND,
        SwapSettleError::QuoteExpired(_) => StatusCode::GONE,
        SwapSettleError::QuoteAlreadyConsumed(_) | SwapSettleError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        SwapSettleError::InsufficientBalance { .. } | SwapSettleError::BelowMinimum { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SwapSettleError::ProviderError(_) => StatusCode::BAD_GATEWAY,
        SwapSettleError::RateUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SwapSettleError::Store(_) | SwapSettleError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SwapSettleError> for ApiError {
    fn from(err: SwapSettleError) -> Self {
        let status = status_for(&err);
        let details = match &err {
            SwapSettleError::InsufficientBalance {
                available,
                requested,
            } => Some(serde_json::json!({ "available": available, "requested": requested })),
            SwapSettleError::BelowMinimum { minimum } => {
                Some(serde_json::json!({ "minimum": minimum }))
            }
            SwapSettleError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        };

        // Internal failures are logged, not echoed.
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            error!(error = %err, "Request failed");
            "Internal error".to_string()
        } else {
            err.to_string()
        };

        Self {
            status,
            body: ErrorResponse {
                code: err.error_code().to_string(),
                message,
                details,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The caller, as asserted by the identity layer.
pub struct AuthenticatedUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| UserId::new(v.trim()))
            .filter(UserId::is_valid)
            .map(AuthenticatedUser)
            .ok_or_else(ApiError::unauthenticated)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
        .into_response()
}

/// Read-only fee and minimum configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeesResponse {
    pub platform_fee_rate: Decimal,
    pub processing_fee_rate: Decimal,
    pub total_fee_rate: Decimal,
    pub minimum_withdrawals: Vec<MinimumWithdrawal>,
}

async fn fees(State(state): State<AppState>) -> Json<FeesResponse> {
    let schedule = state.engine.quotes().fee_schedule();
    Json(FeesResponse {
        platform_fee_rate: schedule.platform_rate,
        processing_fee_rate: schedule.processing_rate,
        total_fee_rate: schedule.total_rate(),
        minimum_withdrawals: state.engine.withdrawal_limits().summary(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateQuoteBody {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub amount: String,
    #[serde(rename = "type")]
    pub trade_type: TradeType,
}

async fn create_quote(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<CreateQuoteBody>,
) -> ApiResult<(StatusCode, Json<Quote>)> {
    let quote = state
        .engine
        .get_quote(QuoteRequest::new(
            user_id,
            body.from_currency,
            body.to_currency,
            body.amount,
            body.trade_type,
        ))
        .await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmTradeBody {
    pub quote_id: QuoteId,
}

async fn confirm_trade(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<ConfirmTradeBody>,
) -> ApiResult<(StatusCode, Json<Trade>)> {
    let trade = state.engine.confirm_trade(&body.quote_id, &user_id).await?;
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn list_trades(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> ApiResult<Json<Vec<Trade>>> {
    Ok(Json(state.engine.trades_for_user(&user_id).await?))
}

async fn get_trade(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Trade>> {
    let id = TradeId::parse(&id).map_err(|_| SwapSettleError::TradeNotFound(id.clone()))?;
    Ok(Json(state.engine.get_trade(&id, &user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ValidateWithdrawalBody {
    pub currency: Currency,
    pub amount: String,
    #[serde(default)]
    pub network: Option<String>,
}

async fn validate_withdrawal(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<ValidateWithdrawalBody>,
) -> ApiResult<Json<WithdrawalCheck>> {
    let check = state
        .engine
        .validate_withdrawal(&user_id, &body.currency, &body.amount, body.network.as_deref())
        .await?;
    Ok(Json(check))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawBody {
    pub currency: Currency,
    pub amount: String,
    #[serde(default)]
    pub network: Option<String>,
    pub address: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

async fn withdraw(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<WithdrawBody>,
) -> ApiResult<(StatusCode, Json<Trade>)> {
    let trade = state
        .engine
        .withdraw(WithdrawalRequest {
            user_id,
            currency: body.currency,
            amount: body.amount,
            network: body.network,
            destination: body.address,
            idempotency_key: body.idempotency_key,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(trade)))
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ReconcileOutcome>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    Ok(Json(state.reconciler.handle(&body, signature).await?))
}

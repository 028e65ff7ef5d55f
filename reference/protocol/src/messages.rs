//! Provider wire types.
//!
//! These types represent the requests sent to the liquidity provider, its
//! synchronous acknowledgments, and the webhook deliveries it sends back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Response wrapper used by every provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEnvelope<T> {
    /// `success` or `error`.
    pub status: String,
    /// Error or informational message.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload.
    pub data: T,
}

/// Side of an instant order, from the base asset's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Request to execute an instant order at a locked price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantOrderRequest {
    /// Provider sub-account; carried in the URL path.
    #[serde(skip)]
    pub account_id: String,
    /// Market symbol, e.g. `btcngn`.
    pub market: String,
    pub side: OrderSide,
    /// Currency `volume` is denominated in.
    pub unit: String,
    /// Base quantity.
    pub volume: String,
    /// Locked price in counter units per base unit.
    pub price: String,
    /// Internal trade reference, echoed back in webhooks.
    pub reference: String,
}

/// Request to send funds out of a sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRequest {
    /// Provider sub-account; carried in the URL path.
    #[serde(skip)]
    pub account_id: String,
    pub currency: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Destination address or bank account.
    pub fund_uid: String,
    /// Internal trade reference, echoed back in webhooks.
    pub reference: String,
}

/// Synchronous acknowledgment of an order or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAck {
    /// Provider-assigned identifier.
    pub id: String,
    /// Initial provider-side status.
    pub status: String,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Market ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub market: String,
    /// Last traded price, counter units per base unit.
    pub price: Decimal,
}

/// Inbound webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    /// Provider event type, e.g. `instant_order.done`.
    pub event: String,
    pub data: WebhookData,
}

/// Payload of a webhook delivery. Fields beyond `id` depend on the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    /// Provider identifier of the order, withdrawal or deposit.
    pub id: String,
    /// Internal reference echoed from the request.
    #[serde(default, alias = "note")]
    pub reference: Option<String>,
    /// Provider sub-account the event concerns.
    #[serde(default, alias = "user_id")]
    pub account_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl WebhookEnvelope {
    /// Parse a raw webhook body.
    pub fn from_slice(body: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_parse_with_aliases() {
        let body = br#"{
            "event": "instant_order.done",
            "data": {"id": "ord_1", "note": "q_abc", "user_id": "acct-1", "currency": "btc", "amount": "0.002"}
        }"#;

        let envelope = WebhookEnvelope::from_slice(body).unwrap();
        assert_eq!(envelope.event, "instant_order.done");
        assert_eq!(envelope.data.reference.as_deref(), Some("q_abc"));
        assert_eq!(envelope.data.account_id.as_deref(), Some("acct-1"));
        assert!(envelope.data.status.is_none());
    }

    #[test]
    fn test_order_request_omits_account() {
        let request = InstantOrderRequest {
            account_id: "acct-1".to_string(),
            market: "btcngn".to_string(),
            side: OrderSide::Buy,
            unit: "btc".to_string(),
            volume: "0.002".to_string(),
            price: "50000000".to_string(),
            reference: "q_abc".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("account_id").is_none());
        assert_eq!(json["side"], "buy");
    }

    #[test]
    fn test_ticker_accepts_string_price() {
        let ticker: Ticker =
            serde_json::from_str(r#"{"market":"btcngn","price":"50000000.5"}"#).unwrap();
        assert_eq!(ticker.price, Decimal::new(500000005, 1));
    }
}

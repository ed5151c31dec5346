use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::GatewayStatus;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityRequest {
    pub reference: String,
    pub amount_in_cents: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntegrityResponse {
    pub hash: String,
}

/// Transaction as the gateway reports it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GatewayTransaction {
    pub id: String,
    /// Status exactly as the gateway sent it; it is part of the event checksum.
    #[schema(example = "APPROVED")]
    pub status: String,
    /// Our order id.
    pub reference: String,
    pub amount_in_cents: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookData {
    pub transaction: GatewayTransaction,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EventSignature {
    Checksum(String),
    Detailed {
        checksum: String,
        #[serde(default)]
        properties: Vec<String>,
    },
}

impl EventSignature {
    pub fn checksum(&self) -> &str {
        match self {
            EventSignature::Checksum(checksum) => checksum,
            EventSignature::Detailed { checksum, .. } => checksum,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
    pub signature: Option<EventSignature>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

impl GatewayTransaction {
    pub fn gateway_status(&self) -> GatewayStatus {
        GatewayStatus::parse(&self.status)
    }
}

/// `{"data": ...}` wrapper used by the gateway status endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct StatusData {
    pub status: GatewayStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    Success,
    Pending,
    Error,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentResultView {
    pub state: ResultState,
    pub transaction_id: String,
    /// Raw gateway status, absent when the lookup failed.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionIdQuery {
    pub id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SandboxCheckoutQuery {
    pub reference: String,
    #[serde(rename = "amount-in-cents")]
    pub amount_in_cents: i64,
    pub currency: String,
    #[serde(rename = "signature:integrity")]
    pub integrity: String,
    #[serde(rename = "redirect-url")]
    pub redirect_url: Option<String>,
    /// Gateway status the simulated transaction settles on. Defaults to APPROVED.
    pub outcome: Option<String>,
}

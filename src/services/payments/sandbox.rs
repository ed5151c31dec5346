//! Stand-in for the gateway's hosted checkout, used in development and
//! tests. Transactions live in memory only.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{poller::TransactionLookup, webhook::{EventVerifier, TRANSACTION_UPDATED}};
use crate::{
    dto::payments::{EventSignature, GatewayTransaction, WebhookData, WebhookEvent},
    error::{AppError, AppResult},
    models::GatewayStatus,
};

#[derive(Clone, Default)]
pub struct SandboxGateway {
    ledger: Arc<DashMap<String, GatewayTransaction>>,
}

impl SandboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_transaction(
        &self,
        reference: &str,
        amount_in_cents: i64,
        currency: &str,
        status: GatewayStatus,
    ) -> GatewayTransaction {
        let transaction = GatewayTransaction {
            id: format!("sbx-{}", Uuid::new_v4().simple()),
            status: status.as_str().to_string(),
            reference: reference.to_string(),
            amount_in_cents,
            currency: currency.to_string(),
        };
        self.ledger
            .insert(transaction.id.clone(), transaction.clone());
        tracing::info!(
            transaction_id = %transaction.id,
            reference,
            status = %transaction.status,
            "sandbox transaction created"
        );
        transaction
    }

    pub fn transaction(&self, id: &str) -> Option<GatewayTransaction> {
        self.ledger.get(id).map(|entry| entry.value().clone())
    }

    /// Move a transaction to a new status, as the gateway does when a
    /// pending payment settles.
    pub fn settle(&self, id: &str, status: GatewayStatus) -> AppResult<GatewayTransaction> {
        let mut entry = self.ledger.get_mut(id).ok_or(AppError::NotFound)?;
        entry.status = status.as_str().to_string();
        Ok(entry.value().clone())
    }

    /// The `transaction.updated` event the gateway would push for
    /// `transaction`, signed when the verifier is enabled.
    pub fn event_for(
        &self,
        transaction: &GatewayTransaction,
        verifier: &EventVerifier,
    ) -> AppResult<WebhookEvent> {
        let timestamp = Utc::now().timestamp();
        let signature = if verifier.is_enabled() {
            Some(EventSignature::Detailed {
                checksum: verifier.checksum(transaction, timestamp)?,
                properties: vec![
                    "transaction.id".into(),
                    "transaction.status".into(),
                    "transaction.amount_in_cents".into(),
                ],
            })
        } else {
            None
        };
        Ok(WebhookEvent {
            event: TRANSACTION_UPDATED.to_string(),
            data: WebhookData {
                transaction: transaction.clone(),
            },
            signature,
            timestamp: Some(timestamp),
        })
    }
}

#[async_trait]
impl TransactionLookup for SandboxGateway {
    async fn transaction_status(&self, transaction_id: &str) -> AppResult<GatewayStatus> {
        self.transaction(transaction_id)
            .map(|t| t.gateway_status())
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_transactions_are_looked_up_and_settled() {
        let sandbox = SandboxGateway::new();
        let tx = sandbox.create_transaction("order-1", 1000, "COP", GatewayStatus::Pending);
        assert!(tx.id.starts_with("sbx-"));
        assert_eq!(
            sandbox.transaction_status(&tx.id).await.expect("status"),
            GatewayStatus::Pending
        );

        sandbox.settle(&tx.id, GatewayStatus::Approved).expect("settle");
        assert_eq!(
            sandbox.transaction_status(&tx.id).await.expect("status"),
            GatewayStatus::Approved
        );
        assert!(matches!(
            sandbox.transaction_status("missing").await,
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn events_are_signed_only_when_verification_is_on() {
        let sandbox = SandboxGateway::new();
        let tx = sandbox.create_transaction("order-1", 1000, "COP", GatewayStatus::Approved);

        let unsigned = sandbox.event_for(&tx, &EventVerifier::disabled()).expect("event");
        assert!(unsigned.signature.is_none());

        let verifier = EventVerifier::new(true, Some("events".into()));
        let signed = sandbox.event_for(&tx, &verifier).expect("event");
        assert!(verifier.verify(&signed).is_ok());
    }
}

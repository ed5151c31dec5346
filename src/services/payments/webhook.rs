use std::fmt;

use uuid::Uuid;

use super::signer::{constant_time_eq, sha256_hex};
use crate::{
    dto::payments::{GatewayTransaction, WebhookEvent},
    error::{AppError, AppResult},
    models::OrderStatus,
    services::store::{OrderStore, PaymentApplied},
};

pub const TRANSACTION_UPDATED: &str = "transaction.updated";

/// Checks the event checksum
/// `sha256(id || status || amount_in_cents || timestamp || secret)`.
/// Off unless explicitly enabled.
#[derive(Clone)]
pub struct EventVerifier {
    enabled: bool,
    secret: Option<String>,
}

impl fmt::Debug for EventVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventVerifier")
            .field("enabled", &self.enabled)
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl EventVerifier {
    pub fn new(enabled: bool, secret: Option<String>) -> Self {
        Self {
            enabled,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn checksum(&self, transaction: &GatewayTransaction, timestamp: i64) -> AppResult<String> {
        let secret = self.secret.as_deref().ok_or_else(|| {
            AppError::Configuration("payment events secret is not configured".into())
        })?;
        let amount = transaction.amount_in_cents.to_string();
        let timestamp = timestamp.to_string();
        Ok(sha256_hex(&[
            &transaction.id,
            &transaction.status,
            &amount,
            &timestamp,
            secret,
        ]))
    }

    pub fn verify(&self, event: &WebhookEvent) -> AppResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let (Some(signature), Some(timestamp)) = (&event.signature, event.timestamp) else {
            return Err(AppError::Unauthorized("event signature missing".into()));
        };
        let expected = self.checksum(&event.data.transaction, timestamp)?;
        if !constant_time_eq(&expected, &signature.checksum().to_ascii_lowercase()) {
            return Err(AppError::Unauthorized("event signature mismatch".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied {
        order_id: Uuid,
        status: OrderStatus,
    },
    /// A late event that would have regressed the order.
    Stale {
        order_id: Uuid,
        status: OrderStatus,
    },
    IgnoredEvent(String),
    UnknownOrder(String),
}

/// Apply one gateway event. Verification runs before anything is written.
pub async fn handle_event(
    store: &dyn OrderStore,
    verifier: &EventVerifier,
    event: &WebhookEvent,
) -> AppResult<WebhookOutcome> {
    verifier.verify(event)?;

    if event.event != TRANSACTION_UPDATED {
        tracing::info!(event = %event.event, "payment event ignored");
        return Ok(WebhookOutcome::IgnoredEvent(event.event.clone()));
    }

    let transaction = &event.data.transaction;
    let Ok(order_id) = Uuid::parse_str(transaction.reference.trim()) else {
        tracing::warn!(reference = %transaction.reference, "payment reference is not an order id");
        return Ok(WebhookOutcome::UnknownOrder(transaction.reference.clone()));
    };

    let mapped = transaction.gateway_status().order_status();
    let applied = store
        .apply_payment_status(order_id, &transaction.id, mapped)
        .await?;

    let outcome = match applied {
        PaymentApplied::Updated { previous, current } => {
            tracing::info!(
                order_id = %order_id,
                transaction_id = %transaction.id,
                gateway_status = %transaction.status,
                from = %previous,
                to = %current,
                "order payment status updated"
            );
            WebhookOutcome::Applied {
                order_id,
                status: current,
            }
        }
        PaymentApplied::Stale { current } => {
            tracing::warn!(
                order_id = %order_id,
                transaction_id = %transaction.id,
                gateway_status = %transaction.status,
                current = %current,
                "stale payment event ignored"
            );
            WebhookOutcome::Stale {
                order_id,
                status: current,
            }
        }
        PaymentApplied::OrderMissing => {
            tracing::warn!(order_id = %order_id, "payment event for unknown order");
            WebhookOutcome::UnknownOrder(transaction.reference.clone())
        }
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::payments::{EventSignature, WebhookData};

    fn event(status: &str) -> WebhookEvent {
        WebhookEvent {
            event: TRANSACTION_UPDATED.into(),
            data: WebhookData {
                transaction: GatewayTransaction {
                    id: "1234-1610641025-49201".into(),
                    status: status.into(),
                    reference: Uuid::new_v4().to_string(),
                    amount_in_cents: 4_490_000,
                    currency: "COP".into(),
                },
            },
            signature: None,
            timestamp: Some(1_530_291_411),
        }
    }

    #[test]
    fn disabled_verifier_accepts_unsigned_events() {
        assert!(EventVerifier::disabled().verify(&event("APPROVED")).is_ok());
    }

    #[test]
    fn enabled_verifier_checks_checksum() {
        let verifier = EventVerifier::new(true, Some("events_secret".into()));
        let mut signed = event("APPROVED");
        let checksum = verifier
            .checksum(&signed.data.transaction, 1_530_291_411)
            .expect("checksum");
        signed.signature = Some(EventSignature::Detailed {
            checksum: checksum.clone(),
            properties: vec!["transaction.id".into(), "transaction.status".into()],
        });
        assert!(verifier.verify(&signed).is_ok());

        signed.signature = Some(EventSignature::Checksum(checksum.to_uppercase()));
        assert!(verifier.verify(&signed).is_ok());

        signed.data.transaction.amount_in_cents += 1;
        assert!(matches!(
            verifier.verify(&signed),
            Err(AppError::Unauthorized(_))
        ));

        assert!(matches!(
            verifier.verify(&event("APPROVED")),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn checksum_covers_the_status_as_sent() {
        let verifier = EventVerifier::new(true, Some("events_secret".into()));
        let mut lowercase = event("approved");
        let transaction = &lowercase.data.transaction;
        let expected = sha256_hex(&[
            &transaction.id,
            "approved",
            &transaction.amount_in_cents.to_string(),
            "1530291411",
            "events_secret",
        ]);
        assert_eq!(
            verifier.checksum(transaction, 1_530_291_411).expect("checksum"),
            expected
        );
        assert_eq!(
            transaction.gateway_status().order_status(),
            OrderStatus::Approved
        );

        lowercase.signature = Some(EventSignature::Checksum(expected));
        assert!(verifier.verify(&lowercase).is_ok());
    }

    #[test]
    fn enabled_without_secret_is_a_configuration_error() {
        let verifier = EventVerifier::new(true, None);
        let mut signed = event("APPROVED");
        signed.signature = Some(EventSignature::Checksum("00".into()));
        assert!(matches!(
            verifier.verify(&signed),
            Err(AppError::Configuration(_))
        ));
    }
}

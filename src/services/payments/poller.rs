use std::time::Duration;

use async_trait::async_trait;

use crate::{
    dto::payments::{PaymentResultView, ResultState, StatusData, StatusEnvelope},
    error::{AppError, AppResult},
    models::GatewayStatus,
};

/// Reads a transaction's current status from the gateway.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    async fn transaction_status(&self, transaction_id: &str) -> AppResult<GatewayStatus>;
}

/// Looks transactions up through `GET {status_url}?id=<id>`, expecting
/// `{"data": {"status": ...}}`.
#[derive(Debug, Clone)]
pub struct HttpTransactionLookup {
    client: reqwest::Client,
    status_url: String,
}

impl HttpTransactionLookup {
    pub fn new(status_url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            status_url: status_url.into(),
        })
    }
}

#[async_trait]
impl TransactionLookup for HttpTransactionLookup {
    async fn transaction_status(&self, transaction_id: &str) -> AppResult<GatewayStatus> {
        let response = self
            .client
            .get(&self.status_url)
            .query(&[("id", transaction_id)])
            .send()
            .await
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        let response = response
            .error_for_status()
            .map_err(|e| AppError::Gateway(e.to_string()))?;

        let body: StatusEnvelope<StatusData> = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("unreadable status body: {e}")))?;
        Ok(body.data.status)
    }
}

pub fn result_state(status: &GatewayStatus) -> ResultState {
    match status {
        GatewayStatus::Approved => ResultState::Success,
        GatewayStatus::Pending => ResultState::Pending,
        GatewayStatus::Declined
        | GatewayStatus::Voided
        | GatewayStatus::Error
        | GatewayStatus::Other(_) => ResultState::Error,
    }
}

/// Resolve what the result page shows for `transaction_id`.
///
/// Up to `attempts` lookups, `interval` apart, while the answer is pending.
/// A failed lookup counts as pending: right after the redirect the gateway
/// may not know the transaction yet.
pub async fn resolve_result(
    lookup: &dyn TransactionLookup,
    transaction_id: &str,
    attempts: u32,
    interval: Duration,
) -> PaymentResultView {
    let attempts = attempts.max(1);
    let mut last_status = None;

    for attempt in 1..=attempts {
        match lookup.transaction_status(transaction_id).await {
            Ok(status) => {
                let state = result_state(&status);
                tracing::debug!(
                    transaction_id,
                    attempt,
                    status = status.as_str(),
                    "payment status looked up"
                );
                if state != ResultState::Pending {
                    return PaymentResultView {
                        state,
                        transaction_id: transaction_id.to_string(),
                        status: Some(status.as_str().to_string()),
                    };
                }
                last_status = Some(status.as_str().to_string());
            }
            Err(err) => {
                tracing::warn!(transaction_id, attempt, error = %err, "payment status lookup failed");
            }
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    PaymentResultView {
        state: ResultState::Pending,
        transaction_id: transaction_id.to_string(),
        status: last_status,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Scripted(Mutex<Vec<AppResult<GatewayStatus>>>);

    #[async_trait]
    impl TransactionLookup for Scripted {
        async fn transaction_status(&self, _id: &str) -> AppResult<GatewayStatus> {
            let mut script = self.0.lock().expect("script");
            if script.is_empty() {
                return Err(AppError::Gateway("exhausted".into()));
            }
            script.remove(0)
        }
    }

    fn scripted(answers: Vec<AppResult<GatewayStatus>>) -> Scripted {
        Scripted(Mutex::new(answers))
    }

    #[tokio::test]
    async fn maps_gateway_status_to_view_state() {
        let cases = [
            (GatewayStatus::Approved, ResultState::Success),
            (GatewayStatus::Pending, ResultState::Pending),
            (GatewayStatus::Declined, ResultState::Error),
            (GatewayStatus::Voided, ResultState::Error),
            (GatewayStatus::Error, ResultState::Error),
        ];
        for (status, expected) in cases {
            let lookup = scripted(vec![Ok(status.clone())]);
            let view = resolve_result(&lookup, "tx-1", 1, Duration::ZERO).await;
            assert_eq!(view.state, expected, "{status:?}");
            assert_eq!(view.status.as_deref(), Some(status.as_str()));
        }
    }

    #[tokio::test]
    async fn lookup_failure_is_soft_pending() {
        let lookup = scripted(vec![Err(AppError::Gateway("connection refused".into()))]);
        let view = resolve_result(&lookup, "tx-1", 1, Duration::ZERO).await;
        assert_eq!(view.state, ResultState::Pending);
        assert_eq!(view.status, None);
    }

    #[tokio::test]
    async fn repolls_while_pending_when_allowed() {
        let lookup = scripted(vec![
            Ok(GatewayStatus::Pending),
            Err(AppError::Gateway("timeout".into())),
            Ok(GatewayStatus::Approved),
        ]);
        let view = resolve_result(&lookup, "tx-1", 3, Duration::from_millis(1)).await;
        assert_eq!(view.state, ResultState::Success);
    }

    #[tokio::test]
    async fn single_attempt_does_not_repoll() {
        let lookup = scripted(vec![Ok(GatewayStatus::Pending), Ok(GatewayStatus::Approved)]);
        let view = resolve_result(&lookup, "tx-1", 1, Duration::ZERO).await;
        assert_eq!(view.state, ResultState::Pending);
        assert_eq!(lookup.0.lock().expect("script").len(), 1);
    }
}

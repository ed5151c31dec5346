use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRef, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::Url;

use crate::{
    dto::payments::{
        GatewayTransaction, IntegrityRequest, IntegrityResponse, PaymentResultView,
        SandboxCheckoutQuery, StatusEnvelope, TransactionIdQuery, WebhookAck, WebhookEvent,
    },
    error::{AppError, BareError},
    models::GatewayStatus,
    services::payments::{handle_event, resolve_result},
    state::PaymentsState,
};

/// Gateway-facing endpoints, nested under `/api`.
pub fn router<S>() -> Router<S>
where
    PaymentsState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/payments/integrity", post(integrity))
        .route("/payments/webhook", post(webhook))
}

/// Browser-facing result page and the sandbox checkout, mounted at the root.
pub fn public_router<S>() -> Router<S>
where
    PaymentsState: FromRef<S>,
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/checkout/result", get(checkout_result))
        .route("/sandbox/checkout", get(sandbox_checkout))
        .route("/sandbox/status", get(sandbox_status))
}

#[utoipa::path(
    post,
    path = "/api/payments/integrity",
    request_body = IntegrityRequest,
    responses(
        (status = 200, description = "Integrity hash for the hosted checkout", body = IntegrityResponse),
        (status = 400, description = "Malformed request"),
        (status = 500, description = "Integrity secret not configured"),
    ),
    tag = "Payments"
)]
pub async fn integrity(
    State(payments): State<PaymentsState>,
    body: Bytes,
) -> Result<Json<IntegrityResponse>, BareError> {
    let request: IntegrityRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid integrity request: {e}")))?;
    let hash = payments.signer.sign(
        &request.reference,
        request.amount_in_cents,
        &request.currency,
    )?;
    Ok(Json(IntegrityResponse { hash }))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhook",
    request_body = WebhookEvent,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed event"),
        (status = 401, description = "Signature mismatch"),
        (status = 500, description = "Event could not be applied"),
    ),
    tag = "Payments"
)]
pub async fn webhook(
    State(payments): State<PaymentsState>,
    body: Bytes,
) -> Result<Json<WebhookAck>, BareError> {
    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid payment event: {e}")))?;
    handle_event(payments.store.as_ref(), &payments.verifier, &event).await?;
    Ok(Json(WebhookAck { received: true }))
}

#[utoipa::path(
    get,
    path = "/checkout/result",
    params(("id" = String, Query, description = "Gateway transaction id")),
    responses(
        (status = 200, description = "Result page state", body = PaymentResultView),
        (status = 400, description = "Missing transaction id"),
    ),
    tag = "Payments"
)]
pub async fn checkout_result(
    State(payments): State<PaymentsState>,
    Query(query): Query<TransactionIdQuery>,
) -> Result<Json<PaymentResultView>, BareError> {
    let id = query.id.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("transaction id is required".into()).into());
    }
    let view = resolve_result(
        payments.lookup.as_ref(),
        id,
        payments.poll_attempts,
        payments.poll_interval,
    )
    .await;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/sandbox/checkout",
    params(
        ("reference" = String, Query, description = "Order id"),
        ("amount-in-cents" = i64, Query, description = "Signed amount"),
        ("currency" = String, Query, description = "ISO currency"),
        ("signature:integrity" = String, Query, description = "Integrity hash"),
        ("redirect-url" = Option<String>, Query, description = "Where to send the customer afterwards"),
        ("outcome" = Option<String>, Query, description = "APPROVED (default), DECLINED, PENDING, ..."),
    ),
    responses(
        (status = 303, description = "Redirect to the result page"),
        (status = 401, description = "Integrity hash mismatch"),
    ),
    tag = "Sandbox"
)]
pub async fn sandbox_checkout(
    State(payments): State<PaymentsState>,
    Query(query): Query<SandboxCheckoutQuery>,
) -> Result<Response, BareError> {
    if !payments.signer.verify(
        &query.reference,
        query.amount_in_cents,
        &query.currency,
        &query.integrity,
    )? {
        return Err(AppError::Unauthorized("integrity signature mismatch".into()).into());
    }

    let status = query
        .outcome
        .as_deref()
        .map(GatewayStatus::parse)
        .unwrap_or(GatewayStatus::Approved);
    let transaction = payments.sandbox.create_transaction(
        &query.reference,
        query.amount_in_cents,
        &query.currency,
        status,
    );

    let event = payments.sandbox.event_for(&transaction, &payments.verifier)?;
    let outcome = handle_event(payments.store.as_ref(), &payments.verifier, &event).await?;
    tracing::debug!(transaction_id = %transaction.id, ?outcome, "sandbox event delivered");

    let target = query
        .redirect_url
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(payments.result_url.as_str());
    let location = result_location(target, &transaction.id)?;

    Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
}

fn result_location(target: &str, transaction_id: &str) -> Result<HeaderValue, AppError> {
    let invalid =
        |e: &dyn std::fmt::Display| AppError::BadRequest(format!("invalid redirect-url: {e}"));

    let location = if target.starts_with('/') {
        // Relative targets stay relative; the base only drives the encoder.
        let mut url = Url::parse("http://localhost")
            .and_then(|base| base.join(target))
            .map_err(|e| invalid(&e))?;
        url.query_pairs_mut().append_pair("id", transaction_id);
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    } else {
        let mut url = Url::parse(target).map_err(|e| invalid(&e))?;
        url.query_pairs_mut().append_pair("id", transaction_id);
        url.to_string()
    };
    HeaderValue::from_str(&location).map_err(|e| invalid(&e))
}

#[utoipa::path(
    get,
    path = "/sandbox/status",
    params(("id" = String, Query, description = "Sandbox transaction id")),
    responses(
        (status = 200, description = "Sandbox transaction", body = StatusEnvelope<GatewayTransaction>),
        (status = 404, description = "Unknown transaction"),
    ),
    tag = "Sandbox"
)]
pub async fn sandbox_status(
    State(payments): State<PaymentsState>,
    Query(query): Query<TransactionIdQuery>,
) -> Result<Json<StatusEnvelope<GatewayTransaction>>, BareError> {
    let transaction = payments
        .sandbox
        .transaction(query.id.trim())
        .ok_or(AppError::NotFound)?;
    Ok(Json(StatusEnvelope { data: transaction }))
}

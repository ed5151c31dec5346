use axum::{
    Json, Router,
    http::{HeaderName, Request, Response, StatusCode, Uri},
    routing::get,
};
use tokio_util::sync::CancellationToken;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::{net::SocketAddr, time::Duration};

use produce_delivery_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    response::{ApiResponse, Meta},
    routes::{create_api_router, doc::scalar_docs, health, payments},
    services::picking::{SessionRegistry, changes::spawn_pg_listener, spawn_idle_sweeper},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,produce_delivery_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    if config.payments.integrity_secret.is_none() {
        tracing::warn!("PAYMENT_INTEGRITY_SECRET is not set; checkout and integrity signing will fail");
    }
    if config.payments.verify_events && config.payments.events_secret.is_none() {
        tracing::warn!("PAYMENT_VERIFY_EVENTS is on but PAYMENT_EVENTS_SECRET is not set");
    }

    let session_idle = config.picking.session_idle;
    let state = AppState::new(config, pool.clone())?;

    let shutdown = CancellationToken::new();
    let listener_task = spawn_pg_listener(pool, state.picking.feed.clone(), shutdown.clone());
    let sweeper_task = spawn_idle_sweeper(
        state.picking.sessions.clone(),
        session_idle,
        shutdown.clone(),
    );

    let api_router = create_api_router();
    let concurrency_limit_layer = ConcurrencyLimitLayer::new(100);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "request started"
            );
        })
        .on_response(|response: &Response<_>, latency: Duration, _span: &tracing::Span| {
            tracing::info!(
                status = %response.status(),
                ms = %latency.as_millis(),
                "request finished"
            );
        });

    let sessions = state.picking.sessions.clone();

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_router)
        .merge(payments::public_router())
        .merge(scalar_docs())
        .fallback(not_found)
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(concurrency_limit_layer)
        .with_state(state);

    tracing::info!("listening on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(sessions, shutdown))
        .await?;

    if let Err(err) = listener_task.await {
        tracing::warn!(error = %err, "change listener task ended abnormally");
    }
    if let Err(err) = sweeper_task.await {
        tracing::warn!(error = %err, "idle session sweeper ended abnormally");
    }
    tracing::info!("shutdown complete");

    Ok(())
}

/// Waits for ctrl-c, then ends every picking session so open SSE streams
/// finish and the server can drain.
async fn shutdown_signal(sessions: SessionRegistry, shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!(sessions = sessions.len(), "shutdown requested");
    sessions.close_all();
    shutdown.cancel();
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::success(
        "Not Found",
        serde_json::json!({ "path": uri.path() }),
        Some(Meta::empty()),
    );
    (StatusCode::NOT_FOUND, Json(body))
}

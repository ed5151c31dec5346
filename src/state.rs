use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn, orm_from_pool},
    error::AppResult,
    middleware::auth::AuthConfig,
    services::{
        payments::{
            EventVerifier, HttpTransactionLookup, IntegritySigner, SandboxGateway,
            TransactionLookup,
        },
        picking::{ChangeFeed, SessionRegistry},
        store::{OrderStore, OrmStore},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub auth: AuthConfig,
    pub picking: PickingState,
    pub payments: PaymentsState,
}

/// What the picking routes need.
#[derive(Clone)]
pub struct PickingState {
    pub store: Arc<dyn OrderStore>,
    pub feed: ChangeFeed,
    pub sessions: SessionRegistry,
    pub notice_ttl: Duration,
    pub auth: AuthConfig,
}

/// What the payment routes need.
#[derive(Clone)]
pub struct PaymentsState {
    pub store: Arc<dyn OrderStore>,
    pub signer: IntegritySigner,
    pub verifier: EventVerifier,
    pub lookup: Arc<dyn TransactionLookup>,
    pub sandbox: SandboxGateway,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
    /// Where the sandbox sends the browser when the redirect carries none.
    pub result_url: String,
}

impl AppState {
    pub fn new(config: AppConfig, pool: DbPool) -> AppResult<Self> {
        let orm = orm_from_pool(&pool);
        let store: Arc<dyn OrderStore> = Arc::new(OrmStore::new(orm.clone()));
        let auth = AuthConfig::new(config.jwt_secret.clone());

        let picking = PickingState {
            store: store.clone(),
            feed: ChangeFeed::default(),
            sessions: SessionRegistry::new(),
            notice_ttl: config.picking.notice_ttl,
            auth: auth.clone(),
        };

        let sandbox = SandboxGateway::new();
        let lookup: Arc<dyn TransactionLookup> = match &config.payments.status_url {
            Some(url) => Arc::new(HttpTransactionLookup::new(url.clone())?),
            None => Arc::new(sandbox.clone()),
        };
        let payments = PaymentsState {
            store,
            signer: IntegritySigner::new(config.payments.integrity_secret.clone()),
            verifier: EventVerifier::new(
                config.payments.verify_events,
                config.payments.events_secret.clone(),
            ),
            lookup,
            sandbox,
            poll_attempts: config.payments.poll_attempts,
            poll_interval: config.payments.poll_interval,
            result_url: config.payments.redirect_url.clone(),
        };

        Ok(Self {
            pool,
            orm,
            config: Arc::new(config),
            auth,
            picking,
            payments,
        })
    }
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for PickingState {
    fn from_ref(state: &AppState) -> Self {
        state.picking.clone()
    }
}

impl FromRef<AppState> for PaymentsState {
    fn from_ref(state: &AppState) -> Self {
        state.payments.clone()
    }
}

impl FromRef<PickingState> for AuthConfig {
    fn from_ref(state: &PickingState) -> Self {
        state.auth.clone()
    }
}

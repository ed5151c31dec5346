//! Warehouse picking terminal: per-cell task projection, optimistic pick
//! confirmation and realtime refresh.

pub mod changes;
pub mod projector;
pub mod session;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use changes::{ChangeFeed, ItemChange};
pub use projector::{PickTask, load_tasks, project_tasks};
pub use session::{PickingSession, RefreshOutcome, TaskSnapshot};

use crate::{
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN},
    services::store::OrderStore,
};

struct RegisteredSession {
    owner: Uuid,
    session: Arc<PickingSession>,
    last_seen: Instant,
}

/// Open terminal sessions by id, each bound to the user who opened it.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<Uuid, RegisteredSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(
        &self,
        owner: Uuid,
        store: Arc<dyn OrderStore>,
        feed: ChangeFeed,
        notice_ttl: Duration,
    ) -> Arc<PickingSession> {
        let session = PickingSession::new(store, feed, notice_ttl);
        self.sessions.insert(
            session.id(),
            RegisteredSession {
                owner,
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        tracing::info!(
            session = %session.id(),
            owner = %owner,
            open = self.sessions.len(),
            "picking session opened"
        );
        session
    }

    /// Look up a session for `user` and mark it as in use. Only its owner
    /// or an admin may reach it.
    pub fn get(&self, id: Uuid, user: &AuthUser) -> AppResult<Arc<PickingSession>> {
        let mut entry = self.sessions.get_mut(&id).ok_or(AppError::NotFound)?;
        if entry.owner != user.user_id && user.role != ROLE_ADMIN {
            return Err(AppError::Forbidden);
        }
        entry.last_seen = Instant::now();
        Ok(entry.session.clone())
    }

    pub fn close(&self, id: Uuid, user: &AuthUser) -> AppResult<()> {
        self.get(id, user)?;
        let (_, entry) = self.sessions.remove(&id).ok_or(AppError::NotFound)?;
        entry.session.close();
        Ok(())
    }

    pub fn close_all(&self) {
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.sessions.remove(&id) {
                entry.session.close();
            }
        }
    }

    /// Close sessions nobody has touched for `idle` and that no event stream
    /// is watching. Returns how many were closed.
    pub fn sweep_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| {
                now.duration_since(entry.last_seen) >= idle && !entry.session.has_watchers()
            })
            .map(|entry| *entry.key())
            .collect();

        let mut closed = 0;
        for id in stale {
            let removed = self.sessions.remove_if(&id, |_, entry| {
                now.duration_since(entry.last_seen) >= idle && !entry.session.has_watchers()
            });
            if let Some((_, entry)) = removed {
                entry.session.close();
                closed += 1;
            }
        }
        if closed > 0 {
            tracing::info!(closed, open = self.sessions.len(), "idle picking sessions closed");
        }
        closed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Periodically close abandoned sessions until `shutdown` fires.
pub fn spawn_idle_sweeper(
    sessions: SessionRegistry,
    idle: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = (idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    sessions.sweep_idle(idle);
                }
            }
        }
        tracing::debug!("idle session sweeper stopped");
    })
}

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use serde::Serialize;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    changes::ChangeFeed,
    projector::{PickTask, load_tasks},
};
use crate::{
    error::{AppError, AppResult},
    services::store::OrderStore,
};

/// What a terminal renders: the visible task list plus transient messages.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TaskSnapshot {
    pub cell: Option<String>,
    pub tasks: Vec<PickTask>,
    pub loading: bool,
    /// Short-lived confirmation, cleared automatically.
    pub notice: Option<String>,
    /// Blocking error the operator has to acknowledge.
    pub alert: Option<String>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The projection replaced the cached list; holds the visible task count.
    Applied(usize),
    /// A newer selection or fetch took over; the result was dropped.
    Superseded,
    /// No cell selected or the session is closed.
    Idle,
}

/// Tasks in projector order. Tombstoned ids are hidden while their write
/// is in flight.
#[derive(Debug, Default)]
struct TaskCache {
    tasks: Vec<PickTask>,
    tombstones: HashSet<Uuid>,
}

impl TaskCache {
    fn replace(&mut self, tasks: Vec<PickTask>) {
        self.tasks = tasks;
    }

    fn clear(&mut self) {
        self.tasks.clear();
        self.tombstones.clear();
    }

    fn visible(&self) -> Vec<PickTask> {
        self.tasks
            .iter()
            .filter(|t| !self.tombstones.contains(&t.item_id))
            .cloned()
            .collect()
    }

    fn visible_task(&self, item_id: Uuid) -> Option<&PickTask> {
        if self.tombstones.contains(&item_id) {
            return None;
        }
        self.tasks.iter().find(|t| t.item_id == item_id)
    }

    fn tombstone(&mut self, item_id: Uuid) {
        self.tombstones.insert(item_id);
    }

    /// The write landed: drop the task for good.
    fn settle(&mut self, item_id: Uuid) {
        self.tombstones.remove(&item_id);
        self.tasks.retain(|t| t.item_id != item_id);
    }

    /// The write failed: show the task again.
    fn revive(&mut self, item_id: Uuid) {
        self.tombstones.remove(&item_id);
    }
}

#[derive(Debug, Default)]
struct SessionState {
    cell: Option<String>,
    cache: TaskCache,
    fetch: Option<CancellationToken>,
    bridge: Option<CancellationToken>,
    loading: bool,
    notice: Option<(u64, String)>,
    notice_seq: u64,
    alert: Option<String>,
    version: u64,
}

impl SessionState {
    fn cancel_work(&mut self) {
        if let Some(fetch) = self.fetch.take() {
            fetch.cancel();
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.cancel();
        }
    }
}

/// One operator terminal: selected cell, cached tasks and the change
/// subscription that keeps them fresh.
pub struct PickingSession {
    id: Uuid,
    store: Arc<dyn OrderStore>,
    feed: ChangeFeed,
    notice_ttl: Duration,
    shutdown: CancellationToken,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<TaskSnapshot>,
}

impl PickingSession {
    pub fn new(store: Arc<dyn OrderStore>, feed: ChangeFeed, notice_ttl: Duration) -> Arc<Self> {
        let (snapshots, _) = watch::channel(TaskSnapshot::default());
        Arc::new(Self {
            id: Uuid::new_v4(),
            store,
            feed,
            notice_ttl,
            shutdown: CancellationToken::new(),
            state: Mutex::new(SessionState::default()),
            snapshots,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cell(&self) -> Option<String> {
        self.lock().cell.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.snapshots.subscribe()
    }

    /// Whether any snapshot receiver, such as an open event stream, is attached.
    pub fn has_watchers(&self) -> bool {
        self.snapshots.receiver_count() > 0
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when the session closes.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.is_closed() {
            return Err(AppError::BadRequest("picking session is closed".into()));
        }
        Ok(())
    }

    fn publish(&self, state: &mut SessionState) {
        state.version += 1;
        let snapshot = TaskSnapshot {
            cell: state.cell.clone(),
            tasks: state.cache.visible(),
            loading: state.loading,
            notice: state.notice.as_ref().map(|(_, text)| text.clone()),
            alert: state.alert.clone(),
            version: state.version,
        };
        self.snapshots.send_replace(snapshot);
    }

    /// Switch the terminal to `cell`: cancels the previous subscription and
    /// any in-flight fetch, subscribes again and loads the new cell.
    pub async fn select_cell(self: &Arc<Self>, cell: &str) -> AppResult<RefreshOutcome> {
        let cell = cell.trim();
        if cell.is_empty() {
            return Err(AppError::BadRequest("cell must not be empty".into()));
        }
        {
            let mut state = self.lock();
            self.ensure_open()?;
            state.cancel_work();
            state.cell = Some(cell.to_string());
            state.cache.clear();
            state.alert = None;
            state.notice = None;

            let bridge = self.shutdown.child_token();
            self.spawn_bridge(bridge.clone());
            state.bridge = Some(bridge);
            self.publish(&mut state);
        }
        tracing::info!(session = %self.id, cell = %cell, "cell selected");
        self.refresh().await
    }

    /// Leave the current cell; the subscription and any fetch are cancelled.
    pub fn deselect(&self) {
        let mut state = self.lock();
        state.cancel_work();
        state.cell = None;
        state.cache.clear();
        state.loading = false;
        state.notice = None;
        state.alert = None;
        self.publish(&mut state);
        tracing::info!(session = %self.id, "cell deselected");
    }

    /// Re-run the projector for the selected cell.
    ///
    /// A store failure is returned and leaves the previous list in place.
    pub async fn refresh(&self) -> AppResult<RefreshOutcome> {
        let (cell, token) = {
            let mut state = self.lock();
            if self.is_closed() {
                return Ok(RefreshOutcome::Idle);
            }
            let Some(cell) = state.cell.clone() else {
                return Ok(RefreshOutcome::Idle);
            };
            if let Some(previous) = state.fetch.take() {
                previous.cancel();
            }
            let token = self.shutdown.child_token();
            state.fetch = Some(token.clone());
            state.loading = true;
            self.publish(&mut state);
            (cell, token)
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(RefreshOutcome::Superseded),
            result = load_tasks(self.store.as_ref(), &cell) => result,
        };

        let mut state = self.lock();
        if token.is_cancelled() || state.cell.as_deref() != Some(cell.as_str()) {
            return Ok(RefreshOutcome::Superseded);
        }
        state.fetch = None;
        state.loading = false;

        match result {
            Ok(tasks) => {
                state.cache.replace(tasks);
                self.publish(&mut state);
                let visible = self.snapshots.borrow().tasks.len();
                tracing::debug!(session = %self.id, cell = %cell, visible, "tasks refreshed");
                Ok(RefreshOutcome::Applied(visible))
            }
            Err(err) => {
                self.publish(&mut state);
                tracing::error!(session = %self.id, cell = %cell, error = %err, "loading tasks failed");
                Err(err)
            }
        }
    }

    /// Record a full pick of `item_id`.
    ///
    /// The task disappears from the snapshot before the write starts. If the
    /// write fails the task comes back, an alert is raised and the cell is
    /// reloaded from the store.
    pub async fn confirm_pick(self: &Arc<Self>, item_id: Uuid) -> AppResult<PickTask> {
        let task = {
            let mut state = self.lock();
            self.ensure_open()?;
            if state.cell.is_none() {
                return Err(AppError::BadRequest("no cell selected".into()));
            }
            let task = state
                .cache
                .visible_task(item_id)
                .cloned()
                .ok_or(AppError::NotFound)?;
            state.cache.tombstone(item_id);
            state.alert = None;
            self.publish(&mut state);
            task
        };

        match self.store.record_full_pick(item_id).await {
            Ok(()) => {
                let seq = {
                    let mut state = self.lock();
                    state.cache.settle(item_id);
                    state.notice_seq += 1;
                    let seq = state.notice_seq;
                    state.notice = Some((
                        seq,
                        format!(
                            "Picked {} {} of {} for {}",
                            task.quantity, task.unit, task.product_name, task.customer_name
                        ),
                    ));
                    self.publish(&mut state);
                    seq
                };
                self.schedule_notice_clear(seq);
                tracing::info!(
                    session = %self.id,
                    item_id = %item_id,
                    quantity = task.quantity,
                    "pick recorded"
                );
                Ok(task)
            }
            Err(err) => {
                tracing::error!(session = %self.id, item_id = %item_id, error = %err, "pick write failed");
                {
                    let mut state = self.lock();
                    state.cache.revive(item_id);
                    state.alert = Some(format!(
                        "Could not record the pick of {}. The list was reloaded.",
                        task.product_name
                    ));
                    self.publish(&mut state);
                }
                if let Err(reload) = self.refresh().await {
                    tracing::warn!(session = %self.id, error = %reload, "reload after failed pick also failed");
                }
                Err(err)
            }
        }
    }

    /// Tear the session down. No callback touches it afterwards.
    pub fn close(&self) {
        self.shutdown.cancel();
        let mut state = self.lock();
        state.cancel_work();
        state.cell = None;
        state.cache.clear();
        state.loading = false;
        self.publish(&mut state);
        tracing::info!(session = %self.id, "picking session closed");
    }

    fn spawn_bridge(self: &Arc<Self>, token: CancellationToken) {
        let mut changes = self.feed.subscribe();
        let session: Weak<Self> = Arc::downgrade(self);
        let session_id = self.id;

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = changes.recv() => received,
                };
                match received {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(session = %session_id, skipped, "change feed lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
                if token.is_cancelled() {
                    break;
                }
                let Some(session) = session.upgrade() else {
                    break;
                };
                if let Err(err) = session.refresh().await {
                    tracing::warn!(session = %session_id, error = %err, "refresh after change failed");
                }
            }
            tracing::debug!(session = %session_id, "change subscription released");
        });
    }

    fn schedule_notice_clear(self: &Arc<Self>, seq: u64) {
        let session = Arc::downgrade(self);
        let token = self.shutdown.child_token();
        let ttl = self.notice_ttl;

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    if let Some(session) = session.upgrade() {
                        let mut state = session.lock();
                        if matches!(state.notice, Some((current, _)) if current == seq) {
                            state.notice = None;
                            session.publish(&mut state);
                        }
                    }
                }
            }
        });
    }
}

impl Drop for PickingSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

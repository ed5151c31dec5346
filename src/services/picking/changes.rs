//! Change notifications for `order_items`.
//!
//! The database trigger installed by the migrations publishes on
//! [`CHANNEL`]; [`spawn_pg_listener`] forwards those notifications onto the
//! in-process [`ChangeFeed`] that picking sessions subscribe to.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::DbPool;

pub const CHANNEL: &str = "order_items_changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChange {
    pub op: ChangeOp,
    pub item_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ItemChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers saw the change.
    pub fn publish(&self, change: ItemChange) -> usize {
        self.tx.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ItemChange> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Forward Postgres notifications onto `feed` until `shutdown` fires.
pub fn spawn_pg_listener(
    pool: DbPool,
    feed: ChangeFeed,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, "change listener could not connect");
                return;
            }
        };
        if let Err(err) = listener.listen(CHANNEL).await {
            tracing::error!(error = %err, channel = CHANNEL, "LISTEN failed");
            return;
        }
        tracing::info!(channel = CHANNEL, "listening for item changes");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = listener.recv() => match received {
                    Ok(notification) => {
                        match serde_json::from_str::<ItemChange>(notification.payload()) {
                            Ok(change) => {
                                let receivers = feed.publish(change);
                                tracing::debug!(receivers, "item change forwarded");
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, payload = notification.payload(), "unreadable change payload");
                            }
                        }
                    }
                    Err(err) => {
                        // PgListener reconnects on the next recv.
                        tracing::warn!(error = %err, "change listener interrupted");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
        tracing::info!("change listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_payload_parses() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"op":"UPDATE","item_id":"{id}"}}"#);
        let change: ItemChange = serde_json::from_str(&payload).expect("payload");
        assert_eq!(change.op, ChangeOp::Update);
        assert_eq!(change.item_id, Some(id));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let feed = ChangeFeed::new(4);
        assert_eq!(
            feed.publish(ItemChange {
                op: ChangeOp::Delete,
                item_id: None
            }),
            0
        );
        let mut rx = feed.subscribe();
        feed.publish(ItemChange {
            op: ChangeOp::Insert,
            item_id: None,
        });
        assert_eq!(rx.recv().await.expect("change").op, ChangeOp::Insert);
    }
}

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{OrderStore, PaymentApplied, PickRow};
use crate::{
    error::{AppError, AppResult},
    models::OrderStatus,
    services::picking::changes::{ChangeFeed, ChangeOp, ItemChange},
};

#[derive(Debug, Clone)]
struct MemOrder {
    customer_name: String,
    status: OrderStatus,
    transaction_id: Option<String>,
}

#[derive(Debug, Clone)]
struct MemProduct {
    name: String,
    category: String,
    unit: String,
    active: bool,
}

#[derive(Debug, Clone)]
struct MemItem {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    picked_quantity: i32,
}

#[derive(Default)]
struct Tables {
    orders: HashMap<Uuid, MemOrder>,
    products: HashMap<Uuid, MemProduct>,
    items: Vec<MemItem>,
    read_delays: HashMap<String, Duration>,
    write_delay: Option<Duration>,
}

/// In-process [`OrderStore`] for local runs and tests. Items keep insertion
/// order; writes publish on the attached [`ChangeFeed`] the way the
/// database trigger does.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    feed: Option<ChangeFeed>,
    fail_next_pick: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, op: ChangeOp, item_id: Uuid) {
        if let Some(feed) = &self.feed {
            feed.publish(ItemChange {
                op,
                item_id: Some(item_id),
            });
        }
    }

    pub fn add_product(&self, name: &str, category: &str, unit: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().products.insert(
            id,
            MemProduct {
                name: name.to_string(),
                category: category.to_string(),
                unit: unit.to_string(),
                active: true,
            },
        );
        id
    }

    pub fn deactivate_product(&self, product_id: Uuid) {
        if let Some(product) = self.tables().products.get_mut(&product_id) {
            product.active = false;
        }
    }

    pub fn add_order(&self, customer_name: &str, status: OrderStatus) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().orders.insert(
            id,
            MemOrder {
                customer_name: customer_name.to_string(),
                status,
                transaction_id: None,
            },
        );
        id
    }

    pub fn add_item(&self, order_id: Uuid, product_id: Uuid, quantity: i32, picked: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.tables().items.push(MemItem {
            id,
            order_id,
            product_id,
            quantity,
            picked_quantity: picked,
        });
        self.notify(ChangeOp::Insert, id);
        id
    }

    /// Write a picked quantity directly, as another terminal would.
    pub fn set_picked(&self, item_id: Uuid, picked: i32) {
        let found = {
            let mut tables = self.tables();
            match tables.items.iter_mut().find(|i| i.id == item_id) {
                Some(item) => {
                    item.picked_quantity = picked;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify(ChangeOp::Update, item_id);
        }
    }

    pub fn set_order_status(&self, order_id: Uuid, status: OrderStatus) {
        if let Some(order) = self.tables().orders.get_mut(&order_id) {
            order.status = status;
        }
    }

    /// `(quantity, picked_quantity)` of a line.
    pub fn item(&self, item_id: Uuid) -> Option<(i32, i32)> {
        self.tables()
            .items
            .iter()
            .find(|i| i.id == item_id)
            .map(|i| (i.quantity, i.picked_quantity))
    }

    pub fn order_status(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.tables().orders.get(&order_id).map(|o| o.status)
    }

    pub fn order_transaction(&self, order_id: Uuid) -> Option<String> {
        self.tables()
            .orders
            .get(&order_id)
            .and_then(|o| o.transaction_id.clone())
    }

    /// Make the next `record_full_pick` fail once.
    pub fn fail_next_pick(&self) {
        self.fail_next_pick.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Slow down reads for one cell.
    pub fn delay_reads(&self, cell: &str, delay: Duration) {
        self.tables().read_delays.insert(cell.to_string(), delay);
    }

    /// Hold every pick write in flight for `delay`.
    pub fn delay_writes(&self, delay: Duration) {
        self.tables().write_delay = Some(delay);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn pick_rows(&self, cell: &str) -> AppResult<Vec<PickRow>> {
        let delay = self.tables().read_delays.get(cell).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("memory store read failure")));
        }

        let tables = self.tables();
        let rows = tables
            .items
            .iter()
            .filter_map(|item| {
                let order = tables.orders.get(&item.order_id)?;
                let product = tables.products.get(&item.product_id)?;
                Some(PickRow {
                    item_id: item.id,
                    order_id: item.order_id,
                    order_status: order.status,
                    customer_name: order.customer_name.clone(),
                    product_name: product.name.clone(),
                    category: product.category.clone(),
                    unit: product.unit.clone(),
                    quantity: item.quantity,
                    picked_quantity: item.picked_quantity,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn record_full_pick(&self, item_id: Uuid) -> AppResult<()> {
        let delay = self.tables().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next_pick.swap(false, Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("memory store write failure")));
        }
        {
            let mut tables = self.tables();
            let item = tables
                .items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or(AppError::NotFound)?;
            item.picked_quantity = item.quantity;
        }
        self.notify(ChangeOp::Update, item_id);
        Ok(())
    }

    async fn cells(&self) -> AppResult<Vec<String>> {
        let mut cells: Vec<String> = self
            .tables()
            .products
            .values()
            .filter(|p| p.active)
            .map(|p| p.category.clone())
            .collect();
        cells.sort();
        cells.dedup();
        Ok(cells)
    }

    async fn apply_payment_status(
        &self,
        order_id: Uuid,
        transaction_id: &str,
        incoming: OrderStatus,
    ) -> AppResult<PaymentApplied> {
        let mut tables = self.tables();
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(PaymentApplied::OrderMissing);
        };
        let previous = order.status;
        let Some(next) = previous.settle_payment(incoming) else {
            return Ok(PaymentApplied::Stale { current: previous });
        };
        order.status = next;
        order.transaction_id = Some(transaction_id.to_string());
        Ok(PaymentApplied::Updated {
            previous,
            current: next,
        })
    }
}

//! Order/item data access used by the picking terminal and the payment
//! webhook. Handlers receive an `Arc<dyn OrderStore>` instead of reaching for
//! a global client.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::AppResult, models::OrderStatus};

mod memory;
mod orm;

pub use memory::MemoryStore;
pub use orm::OrmStore;

/// One order line joined with its order and product, as the picking
/// projector consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRow {
    pub item_id: Uuid,
    pub order_id: Uuid,
    pub order_status: OrderStatus,
    pub customer_name: String,
    pub product_name: String,
    pub category: String,
    pub unit: String,
    pub quantity: i32,
    pub picked_quantity: i32,
}

/// Result of applying a gateway status to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentApplied {
    Updated {
        previous: OrderStatus,
        current: OrderStatus,
    },
    /// The event would regress the order; nothing was written.
    Stale { current: OrderStatus },
    OrderMissing,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Lines that may be pending for `cell`. Implementations may pre-filter;
    /// the projector applies the full predicate regardless.
    async fn pick_rows(&self, cell: &str) -> AppResult<Vec<PickRow>>;

    /// Persist `picked_quantity = quantity` for one line.
    async fn record_full_pick(&self, item_id: Uuid) -> AppResult<()>;

    /// Distinct categories of active products.
    async fn cells(&self) -> AppResult<Vec<String>>;

    /// Mirror a gateway transaction onto its order, honouring
    /// [`OrderStatus::settle_payment`].
    async fn apply_payment_status(
        &self,
        order_id: Uuid,
        transaction_id: &str,
        incoming: OrderStatus,
    ) -> AppResult<PaymentApplied>;
}

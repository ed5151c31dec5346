use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{BillingCut, Order, OrderStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

impl UpdateOrderStatusRequest {
    pub fn parsed(&self) -> Result<OrderStatus, String> {
        self.status.parse()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillingCutRequest {
    pub label: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillingCutList {
    pub items: Vec<BillingCut>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillingCutWithOrders {
    pub cut: BillingCut,
    pub orders: Vec<Order>,
}

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingApproval,
    Approved,
    Processing,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::PendingApproval,
        OrderStatus::Approved,
        OrderStatus::Processing,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Orders whose lines show up on the picking terminal.
    pub const PICKABLE: [OrderStatus; 2] = [OrderStatus::Approved, OrderStatus::Processing];

    /// Orders that may be grouped into a billing cut.
    pub const BILLABLE: [OrderStatus; 3] = [
        OrderStatus::Approved,
        OrderStatus::Processing,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingApproval => "pending_approval",
            OrderStatus::Approved => "approved",
            OrderStatus::Processing => "processing",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_pickable(&self) -> bool {
        Self::PICKABLE.contains(self)
    }

    /// Decide what a gateway-driven status change does to an order currently
    /// in `self`. `None` means the event is stale and the order keeps its
    /// status.
    ///
    /// Only a pending order moves. Approval is sticky and cancelled orders
    /// stay cancelled; a retried payment needs a new checkout.
    pub fn settle_payment(self, incoming: OrderStatus) -> Option<OrderStatus> {
        match (self, incoming) {
            (current, incoming) if current == incoming => Some(incoming),
            (OrderStatus::PendingApproval, other) => Some(other),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status `{s}`"))
    }
}

/// Transaction status vocabulary of the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Approved,
    Declined,
    Voided,
    Error,
    Pending,
    Other(String),
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "APPROVED" => GatewayStatus::Approved,
            "DECLINED" => GatewayStatus::Declined,
            "VOIDED" => GatewayStatus::Voided,
            "ERROR" => GatewayStatus::Error,
            "PENDING" => GatewayStatus::Pending,
            _ => GatewayStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayStatus::Approved => "APPROVED",
            GatewayStatus::Declined => "DECLINED",
            GatewayStatus::Voided => "VOIDED",
            GatewayStatus::Error => "ERROR",
            GatewayStatus::Pending => "PENDING",
            GatewayStatus::Other(raw) => raw,
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            GatewayStatus::Approved => OrderStatus::Approved,
            GatewayStatus::Declined => OrderStatus::Cancelled,
            GatewayStatus::Voided
            | GatewayStatus::Error
            | GatewayStatus::Pending
            | GatewayStatus::Other(_) => OrderStatus::PendingApproval,
        }
    }
}

impl Serialize for GatewayStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for GatewayStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(GatewayStatus::parse(&raw))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub unit: String,
    pub sku: String,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub company_id: Option<Uuid>,
    pub status: OrderStatus,
    pub delivery_date: Option<NaiveDate>,
    pub total_amount: i64,
    pub currency: String,
    pub billing_cut_id: Option<Uuid>,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub picked_quantity: i32,
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillingCut {
    pub id: Uuid,
    pub label: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub order_count: i32,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Lead {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_vocabulary_maps_to_order_status() {
        assert_eq!(GatewayStatus::parse("APPROVED").order_status(), OrderStatus::Approved);
        assert_eq!(GatewayStatus::parse("DECLINED").order_status(), OrderStatus::Cancelled);
        for raw in ["VOIDED", "ERROR", "PENDING", "SOMETHING_NEW"] {
            assert_eq!(
                GatewayStatus::parse(raw).order_status(),
                OrderStatus::PendingApproval,
                "{raw}"
            );
        }
    }

    #[test]
    fn order_status_round_trips_through_text() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn approval_is_sticky_against_late_events() {
        use OrderStatus::*;
        assert_eq!(PendingApproval.settle_payment(Approved), Some(Approved));
        assert_eq!(PendingApproval.settle_payment(Cancelled), Some(Cancelled));
        assert_eq!(Approved.settle_payment(Approved), Some(Approved));
        assert_eq!(Approved.settle_payment(Cancelled), None);
        assert_eq!(Approved.settle_payment(PendingApproval), None);
        assert_eq!(Processing.settle_payment(Approved), None);
        assert_eq!(Cancelled.settle_payment(Approved), None);
        assert_eq!(Cancelled.settle_payment(Cancelled), Some(Cancelled));
        assert_eq!(Delivered.settle_payment(Approved), None);
        assert_eq!(Cancelled.settle_payment(PendingApproval), None);
    }
}

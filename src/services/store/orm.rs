use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, JoinType, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait, Set, TransactionTrait,
};
use uuid::Uuid;

use super::{OrderStore, PaymentApplied, PickRow};
use crate::{
    db::OrmConn,
    entity::{
        order_items::{self, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::OrderStatus,
};

/// [`OrderStore`] backed by PostgreSQL through SeaORM.
#[derive(Clone)]
pub struct OrmStore {
    orm: OrmConn,
}

impl OrmStore {
    pub fn new(orm: OrmConn) -> Self {
        Self { orm }
    }
}

#[derive(Debug, FromQueryResult)]
struct PickRowRecord {
    item_id: Uuid,
    order_id: Uuid,
    status: String,
    customer_name: String,
    product_name: String,
    category: String,
    unit: String,
    quantity: i32,
    picked_quantity: i32,
}

fn parse_status(raw: &str) -> AppResult<OrderStatus> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

#[async_trait]
impl OrderStore for OrmStore {
    async fn pick_rows(&self, cell: &str) -> AppResult<Vec<PickRow>> {
        let statuses: Vec<&str> = OrderStatus::PICKABLE.iter().map(|s| s.as_str()).collect();

        let records = OrderItems::find()
            .select_only()
            .column_as(OrderItemCol::Id, "item_id")
            .column_as(OrderItemCol::OrderId, "order_id")
            .column_as(OrderItemCol::Quantity, "quantity")
            .column_as(OrderItemCol::PickedQuantity, "picked_quantity")
            .join(JoinType::InnerJoin, order_items::Relation::Orders.def())
            .join(JoinType::InnerJoin, order_items::Relation::Products.def())
            .column_as(OrderCol::Status, "status")
            .column_as(OrderCol::CustomerName, "customer_name")
            .column_as(ProdCol::Name, "product_name")
            .column_as(ProdCol::Category, "category")
            .column_as(ProdCol::Unit, "unit")
            .filter(ProdCol::Category.eq(cell))
            .filter(OrderCol::Status.is_in(statuses))
            .filter(
                Expr::col((OrderItems, OrderItemCol::PickedQuantity))
                    .lt(Expr::col((OrderItems, OrderItemCol::Quantity))),
            )
            .order_by_asc(OrderCol::CreatedAt)
            .order_by_asc(OrderItemCol::CreatedAt)
            .into_model::<PickRowRecord>()
            .all(&self.orm)
            .await?;

        records
            .into_iter()
            .map(|r| {
                Ok(PickRow {
                    item_id: r.item_id,
                    order_id: r.order_id,
                    order_status: parse_status(&r.status)?,
                    customer_name: r.customer_name,
                    product_name: r.product_name,
                    category: r.category,
                    unit: r.unit,
                    quantity: r.quantity,
                    picked_quantity: r.picked_quantity,
                })
            })
            .collect()
    }

    async fn record_full_pick(&self, item_id: Uuid) -> AppResult<()> {
        let result = OrderItems::update_many()
            .col_expr(
                OrderItemCol::PickedQuantity,
                Expr::col(OrderItemCol::Quantity).into(),
            )
            .filter(OrderItemCol::Id.eq(item_id))
            .exec(&self.orm)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn cells(&self) -> AppResult<Vec<String>> {
        let cells = Products::find()
            .select_only()
            .column(ProdCol::Category)
            .distinct()
            .filter(ProdCol::Active.eq(true))
            .order_by_asc(ProdCol::Category)
            .into_tuple::<String>()
            .all(&self.orm)
            .await?;
        Ok(cells)
    }

    async fn apply_payment_status(
        &self,
        order_id: Uuid,
        transaction_id: &str,
        incoming: OrderStatus,
    ) -> AppResult<PaymentApplied> {
        let txn = self.orm.begin().await?;

        let order = Orders::find_by_id(order_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?;
        let Some(order) = order else {
            return Ok(PaymentApplied::OrderMissing);
        };

        let previous = parse_status(&order.status)?;
        let Some(next) = previous.settle_payment(incoming) else {
            return Ok(PaymentApplied::Stale { current: previous });
        };

        let mut active: OrderActive = order.into();
        active.status = Set(next.as_str().to_string());
        active.gateway_transaction_id = Set(Some(transaction_id.to_string()));
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        txn.commit().await?;

        Ok(PaymentApplied::Updated {
            previous,
            current: next,
        })
    }
}

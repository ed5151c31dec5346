use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        admin::{
            BillingCutList, BillingCutWithOrders, CreateBillingCutRequest,
            UpdateOrderStatusRequest,
        },
        orders::{OrderList, OrderWithItems},
    },
    entity::{
        billing_cuts::{ActiveModel as CutActive, Column as CutCol, Entity as BillingCuts},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{BillingCut, Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, Pagination, SortOrder},
    services::convert::{
        billing_cut_from_entity, order_from_entity, order_item_from_entity, orders_from_entities,
    },
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse().map_err(AppError::BadRequest)?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList {
            items: orders_from_entities(orders)?,
        },
        Some(meta),
    ))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let data = OrderWithItems {
        order: order_from_entity(order)?,
        items,
    };
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let status = payload.parsed().map_err(AppError::BadRequest)?;

    let existing = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = existing.status.clone();

    let mut active: OrderActive = existing.into();
    active.status = Set(status.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&state.orm).await?;

    tracing::info!(order_id = %order.id, from = %previous, to = %status, "order status changed by admin");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": previous, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

/// Group every uncut billable order delivered inside the period.
pub async fn create_billing_cut(
    state: &AppState,
    user: &AuthUser,
    payload: CreateBillingCutRequest,
) -> AppResult<ApiResponse<BillingCutWithOrders>> {
    ensure_admin(user)?;
    let label = payload.label.trim().to_string();
    if label.is_empty() {
        return Err(AppError::BadRequest("label is required".into()));
    }
    if payload.period_end < payload.period_start {
        return Err(AppError::BadRequest(
            "period_end must not precede period_start".into(),
        ));
    }

    let txn = state.orm.begin().await?;

    let billable: Vec<&str> = OrderStatus::BILLABLE.iter().map(|s| s.as_str()).collect();
    let orders = Orders::find()
        .filter(OrderCol::BillingCutId.is_null())
        .filter(OrderCol::Status.is_in(billable))
        .filter(OrderCol::DeliveryDate.between(payload.period_start, payload.period_end))
        .order_by_asc(OrderCol::DeliveryDate)
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    if orders.is_empty() {
        return Err(AppError::BadRequest(
            "No billable orders in the selected period".into(),
        ));
    }

    let total_amount = orders
        .iter()
        .try_fold(0i64, |acc, o| acc.checked_add(o.total_amount))
        .ok_or_else(|| AppError::BadRequest("Billing cut total too large".into()))?;

    let cut = CutActive {
        id: Set(Uuid::new_v4()),
        label: Set(label),
        period_start: Set(payload.period_start),
        period_end: Set(payload.period_end),
        order_count: Set(orders.len() as i32),
        total_amount: Set(total_amount),
        created_at: Set(Utc::now().into()),
    }
    .insert(&txn)
    .await?;

    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    Orders::update_many()
        .col_expr(OrderCol::BillingCutId, Expr::value(cut.id))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()))
        .filter(OrderCol::Id.is_in(ids))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(cut_id = %cut.id, orders = cut.order_count, total_amount, "billing cut created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "billing_cut_create",
        "billing_cuts",
        serde_json::json!({ "cut_id": cut.id, "order_count": cut.order_count }),
    )
    .await;

    let orders = orders
        .into_iter()
        .map(|mut o| {
            o.billing_cut_id = Some(cut.id);
            order_from_entity(o)
        })
        .collect::<AppResult<Vec<_>>>()?;

    Ok(ApiResponse::success(
        "Billing cut created",
        BillingCutWithOrders {
            cut: billing_cut_from_entity(cut),
            orders,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_billing_cuts(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<BillingCutList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = BillingCuts::find().order_by_desc(CutCol::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let items: Vec<BillingCut> = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(billing_cut_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Billing cuts",
        BillingCutList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_billing_cut(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<BillingCutWithOrders>> {
    ensure_admin(user)?;
    let cut = BillingCuts::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let orders = Orders::find()
        .filter(OrderCol::BillingCutId.eq(cut.id))
        .order_by_asc(OrderCol::DeliveryDate)
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Billing cut",
        BillingCutWithOrders {
            cut: billing_cut_from_entity(cut),
            orders: orders_from_entities(orders)?,
        },
        Some(Meta::empty()),
    ))
}

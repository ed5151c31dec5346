use std::collections::BTreeMap;

use chrono::Utc;
use reqwest::Url;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit,
    config::PaymentConfig,
    dto::checkout::{CheckoutLine, CheckoutRequest, CheckoutResponse},
    entity::{
        order_items::ActiveModel as OrderItemActive,
        orders::ActiveModel as OrderActive,
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    models::OrderStatus,
    response::{ApiResponse, Meta},
    services::convert::{order_from_entity, order_item_from_entity},
    state::AppState,
};

/// Sum quantities per product; every quantity must be positive.
pub fn merge_lines(lines: &[CheckoutLine]) -> AppResult<BTreeMap<Uuid, i32>> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    let mut merged = BTreeMap::new();
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity for product {}",
                line.product_id
            )));
        }
        let entry = merged.entry(line.product_id).or_insert(0i32);
        *entry = entry
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::BadRequest("Quantity too large".into()))?;
    }
    Ok(merged)
}

pub fn normalize_currency(raw: Option<&str>, default: &str) -> AppResult<String> {
    let currency = raw.unwrap_or(default).trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(format!("Invalid currency `{currency}`")));
    }
    Ok(currency)
}

/// Hosted-checkout URL carrying the signed amount.
pub fn gateway_redirect_url(
    payments: &PaymentConfig,
    reference: &str,
    amount_in_cents: i64,
    currency: &str,
    integrity: &str,
) -> AppResult<String> {
    let amount = amount_in_cents.to_string();
    let url = Url::parse_with_params(
        &payments.checkout_url,
        &[
            ("public-key", payments.public_key.as_str()),
            ("currency", currency),
            ("amount-in-cents", amount.as_str()),
            ("reference", reference),
            ("signature:integrity", integrity),
            ("redirect-url", payments.redirect_url.as_str()),
        ],
    )
    .map_err(|e| AppError::Configuration(format!("invalid PAYMENT_CHECKOUT_URL: {e}")))?;
    Ok(url.to_string())
}

pub async fn checkout(
    state: &AppState,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let payments = &state.config.payments;
    if !state.payments.signer.is_configured() {
        return Err(AppError::Configuration(
            "payment integrity secret is not configured".into(),
        ));
    }

    let customer_name = payload.customer_name.trim().to_string();
    if customer_name.is_empty() {
        return Err(AppError::BadRequest("customer_name is required".into()));
    }
    let lines = merge_lines(&payload.lines)?;
    let currency = normalize_currency(payload.currency.as_deref(), &payments.currency)?;

    let txn = state.orm.begin().await?;

    let products = Products::find()
        .filter(ProdCol::Id.is_in(lines.keys().copied()))
        .filter(ProdCol::Active.eq(true))
        .all(&txn)
        .await?;
    if products.len() != lines.len() {
        return Err(AppError::BadRequest(
            "Cart contains unknown or inactive products".into(),
        ));
    }

    let mut total_amount: i64 = 0;
    for product in &products {
        let quantity = lines[&product.id] as i64;
        total_amount = product
            .price_cents
            .checked_mul(quantity)
            .and_then(|line_total| total_amount.checked_add(line_total))
            .ok_or_else(|| AppError::BadRequest("Order total too large".into()))?;
    }

    let now = Utc::now();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        customer_name: Set(customer_name),
        company_id: Set(payload.company_id),
        status: Set(OrderStatus::PendingApproval.as_str().to_string()),
        delivery_date: Set(payload.delivery_date),
        total_amount: Set(total_amount),
        currency: Set(currency.clone()),
        billing_cut_id: Set(None),
        gateway_transaction_id: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(products.len());
    for product in &products {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(lines[&product.id]),
            picked_quantity: Set(0),
            unit_price_cents: Set(product.price_cents),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    let reference = order.id.to_string();
    let integrity = state
        .payments
        .signer
        .sign(&reference, total_amount, &currency)?;
    let redirect_url =
        gateway_redirect_url(payments, &reference, total_amount, &currency, &integrity)?;

    tracing::info!(order_id = %order.id, total_amount, currency = %currency, "checkout created order");
    audit::record(
        &state.pool,
        None,
        "checkout",
        "orders",
        serde_json::json!({ "order_id": order.id, "total_amount": total_amount }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout created",
        CheckoutResponse {
            order: order_from_entity(order)?,
            items,
            integrity,
            redirect_url,
        },
        Some(Meta::empty()),
    ))
}

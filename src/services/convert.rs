use chrono::Utc;

use crate::{
    entity::{billing_cuts, leads, order_items, orders, products},
    error::{AppError, AppResult},
    models::{BillingCut, Lead, Order, OrderItem, Product},
};

pub(crate) fn product_from_entity(model: products::Model) -> Product {
    Product {
        id: model.id,
        name: model.name,
        description: model.description,
        category: model.category,
        unit: model.unit,
        sku: model.sku,
        price_cents: model.price_cents,
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_from_entity(model: orders::Model) -> AppResult<Order> {
    let status = model
        .status
        .parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok(Order {
        id: model.id,
        customer_name: model.customer_name,
        company_id: model.company_id,
        status,
        delivery_date: model.delivery_date,
        total_amount: model.total_amount,
        currency: model.currency,
        billing_cut_id: model.billing_cut_id,
        gateway_transaction_id: model.gateway_transaction_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub(crate) fn orders_from_entities(models: Vec<orders::Model>) -> AppResult<Vec<Order>> {
    models.into_iter().map(order_from_entity).collect()
}

pub(crate) fn order_item_from_entity(model: order_items::Model) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        picked_quantity: model.picked_quantity,
        unit_price_cents: model.unit_price_cents,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn billing_cut_from_entity(model: billing_cuts::Model) -> BillingCut {
    BillingCut {
        id: model.id,
        label: model.label,
        period_start: model.period_start,
        period_end: model.period_end,
        order_count: model.order_count,
        total_amount: model.total_amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub(crate) fn lead_from_entity(model: leads::Model) -> Lead {
    Lead {
        id: model.id,
        company_name: model.company_name,
        contact_name: model.contact_name,
        email: model.email,
        phone: model.phone,
        city: model.city,
        message: model.message,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

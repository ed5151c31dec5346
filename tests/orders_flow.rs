use chrono::Utc;
use produce_delivery_api::{
    config::{AppConfig, PaymentConfig, PickingConfig},
    db::{create_pool, run_migrations},
    dto::{
        admin::{CreateBillingCutRequest, UpdateOrderStatusRequest},
        catalog::{CreateProductRequest, UpdateProductRequest},
        checkout::{CheckoutLine, CheckoutRequest},
        leads::CreateLeadRequest,
        payments::{GatewayTransaction, WebhookData, WebhookEvent},
    },
    error::AppError,
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_OPERATOR},
    models::OrderStatus,
    routes::params::{OrderListQuery, Pagination},
    services::{
        admin_service, catalog_service, checkout_service, lead_service,
        payments::{WebhookOutcome, handle_event},
        picking::load_tasks,
    },
    state::AppState,
};
use uuid::Uuid;

// Integration flow: checkout -> gateway approval -> picking -> billing cut.
#[tokio::test]
async fn checkout_payment_picking_and_billing_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;
    let admin = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_ADMIN.into(),
    };
    let operator = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_OPERATOR.into(),
    };

    // Catalog
    let mango = catalog_service::create_product(
        &state,
        &admin,
        CreateProductRequest {
            name: "Mango Tommy".into(),
            description: None,
            category: "Frutas".into(),
            unit: "kg".into(),
            sku: "FRU-MANGO".into(),
            price_cents: 650_000,
        },
    )
    .await?
    .data
    .expect("product");
    assert!(matches!(
        catalog_service::create_product(
            &state,
            &operator,
            CreateProductRequest {
                name: "Lulo".into(),
                description: None,
                category: "Frutas".into(),
                unit: "kg".into(),
                sku: "FRU-LULO".into(),
                price_cents: 520_000,
            },
        )
        .await,
        Err(AppError::Forbidden)
    ));

    // Checkout
    let today = Utc::now().date_naive();
    let checkout = checkout_service::checkout(
        &state,
        CheckoutRequest {
            customer_name: "Restaurante El Cielo".into(),
            company_id: None,
            delivery_date: Some(today),
            currency: None,
            lines: vec![
                CheckoutLine {
                    product_id: mango.id,
                    quantity: 6,
                },
                CheckoutLine {
                    product_id: mango.id,
                    quantity: 4,
                },
            ],
        },
    )
    .await?
    .data
    .expect("checkout");
    let order = checkout.order;
    assert_eq!(order.status, OrderStatus::PendingApproval);
    assert_eq!(order.total_amount, 6_500_000);
    assert_eq!(checkout.items.len(), 1);
    assert_eq!(checkout.items[0].quantity, 10);
    assert!(checkout.redirect_url.contains(&order.id.to_string()));
    assert_eq!(
        checkout.integrity,
        state
            .payments
            .signer
            .sign(&order.id.to_string(), 6_500_000, "COP")?
    );

    // Unpaid orders are not picked
    assert!(load_tasks(state.picking.store.as_ref(), "Frutas").await?.is_empty());

    // Gateway approval
    let event = WebhookEvent {
        event: "transaction.updated".into(),
        data: WebhookData {
            transaction: GatewayTransaction {
                id: "tx-flow-1".into(),
                status: "APPROVED".into(),
                reference: order.id.to_string(),
                amount_in_cents: 6_500_000,
                currency: "COP".into(),
            },
        },
        signature: None,
        timestamp: None,
    };
    let outcome = handle_event(
        state.payments.store.as_ref(),
        &state.payments.verifier,
        &event,
    )
    .await?;
    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            order_id: order.id,
            status: OrderStatus::Approved
        }
    );

    // Picking
    let tasks = load_tasks(state.picking.store.as_ref(), "Frutas").await?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].product_name, "Mango Tommy");
    assert_eq!(tasks[0].quantity, 10);
    state.picking.store.record_full_pick(tasks[0].item_id).await?;
    assert!(load_tasks(state.picking.store.as_ref(), "Frutas").await?.is_empty());
    assert_eq!(state.picking.store.cells().await?, vec!["Frutas".to_string()]);

    let detail = admin_service::get_order_admin(&state, &admin, order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(detail.order.gateway_transaction_id.as_deref(), Some("tx-flow-1"));
    assert_eq!(detail.items[0].picked_quantity, 10);

    // Admin listing
    let approved = admin_service::list_all_orders(
        &state,
        &admin,
        OrderListQuery {
            status: Some("approved".into()),
            ..OrderListQuery::default()
        },
    )
    .await?;
    assert_eq!(approved.meta.and_then(|m| m.total), Some(1));
    assert!(matches!(
        admin_service::list_all_orders(
            &state,
            &admin,
            OrderListQuery {
                status: Some("shipped".into()),
                ..OrderListQuery::default()
            },
        )
        .await,
        Err(AppError::BadRequest(_))
    ));

    // Billing cut
    let cut_request = || CreateBillingCutRequest {
        label: "Corte semanal".into(),
        period_start: today - chrono::Duration::days(7),
        period_end: today,
    };
    let cut = admin_service::create_billing_cut(&state, &admin, cut_request())
        .await?
        .data
        .expect("cut");
    assert_eq!(cut.cut.order_count, 1);
    assert_eq!(cut.cut.total_amount, 6_500_000);
    assert_eq!(cut.orders[0].billing_cut_id, Some(cut.cut.id));
    assert!(matches!(
        admin_service::create_billing_cut(&state, &admin, cut_request()).await,
        Err(AppError::BadRequest(_))
    ));

    let fetched = admin_service::get_billing_cut(&state, &admin, cut.cut.id)
        .await?
        .data
        .expect("cut");
    assert_eq!(fetched.orders.len(), 1);
    assert_eq!(fetched.orders[0].id, order.id);

    // Manual status change
    let delivered = admin_service::update_order_status(
        &state,
        &admin,
        order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(delivered.status, OrderStatus::Delivered);

    // Deactivated products drop out of the catalog
    catalog_service::update_product(
        &state,
        &admin,
        mango.id,
        UpdateProductRequest {
            active: Some(false),
            ..UpdateProductRequest::default()
        },
    )
    .await?;
    assert!(matches!(
        catalog_service::get_product(&state, mango.id).await,
        Err(AppError::NotFound)
    ));

    // Leads
    lead_service::create_lead(
        &state,
        CreateLeadRequest {
            company_name: "Hotel Dann".into(),
            contact_name: "Compras".into(),
            email: "compras@hoteldann.co".into(),
            phone: None,
            city: Some("Medellín".into()),
            message: None,
        },
    )
    .await?;
    let leads = lead_service::list_leads(&state, &admin, Pagination::default())
        .await?
        .data
        .expect("leads");
    assert_eq!(leads.items.len(), 1);
    assert_eq!(leads.items[0].email, "compras@hoteldann.co");

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    // Clean tables between runs
    sqlx::query(
        "TRUNCATE TABLE order_items, orders, billing_cuts, leads, audit_logs, products RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 3000,
        jwt_secret: None,
        payments: PaymentConfig {
            integrity_secret: Some("test_integrity_secret".into()),
            ..PaymentConfig::default()
        },
        picking: PickingConfig::default(),
    };
    Ok(AppState::new(config, pool)?)
}

use chrono::{Duration, Utc};
use produce_delivery_api::{
    config::AppConfig,
    db::{create_pool, run_migrations},
    models::OrderStatus,
};
use uuid::Uuid;

// (name, category, unit, sku, price in cents)
const PRODUCTS: [(&str, &str, &str, &str, i64); 8] = [
    ("Mango Tommy", "Frutas", "kg", "FRU-MANGO", 650000),
    ("Lulo", "Frutas", "kg", "FRU-LULO", 520000),
    ("Banano", "Frutas", "kg", "FRU-BANANO", 280000),
    ("Tomate chonto", "Verduras", "kg", "VER-TOMATE", 390000),
    ("Cebolla cabezona", "Verduras", "kg", "VER-CEBOLLA", 310000),
    ("Zanahoria", "Verduras", "kg", "VER-ZANAHORIA", 240000),
    ("Cilantro", "Hierbas", "atado", "HIE-CILANTRO", 150000),
    ("Hierbabuena", "Hierbas", "atado", "HIE-HIERBABUENA", 180000),
];

// (customer, [(sku, quantity)])
const ORDERS: [(&str, &[(&str, i32)]); 3] = [
    ("Restaurante El Cielo", &[("FRU-MANGO", 10), ("VER-TOMATE", 6), ("HIE-CILANTRO", 4)]),
    ("Hotel Dann", &[("FRU-LULO", 8), ("FRU-BANANO", 12), ("VER-CEBOLLA", 5)]),
    ("Cafetería La 70", &[("FRU-MANGO", 3), ("VER-ZANAHORIA", 7), ("HIE-HIERBABUENA", 2)]),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&pool).await?;

    seed_products(&pool).await?;
    let orders = seed_orders(&pool, &config.payments.currency).await?;

    println!("Seed completed. {orders} approved orders ready to pick");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    for (name, category, unit, sku, price) in PRODUCTS {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, category, unit, sku, price_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (sku) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(category)
        .bind(unit)
        .bind(sku)
        .bind(price)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}

async fn seed_orders(pool: &sqlx::PgPool, currency: &str) -> anyhow::Result<usize> {
    let delivery_date = (Utc::now() + Duration::days(1)).date_naive();
    let mut tx = pool.begin().await?;

    for (customer, lines) in ORDERS {
        let mut priced = Vec::with_capacity(lines.len());
        for (sku, quantity) in lines {
            let (product_id, price): (Uuid, i64) =
                sqlx::query_as("SELECT id, price_cents FROM products WHERE sku = $1")
                    .bind(*sku)
                    .fetch_one(&mut *tx)
                    .await?;
            priced.push((product_id, *quantity, price));
        }
        let total: i64 = priced
            .iter()
            .map(|(_, quantity, price)| *quantity as i64 * price)
            .sum();

        let order_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_name, status, delivery_date, total_amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order_id)
        .bind(customer)
        .bind(OrderStatus::Approved.as_str())
        .bind(delivery_date)
        .bind(total)
        .bind(currency)
        .execute(&mut *tx)
        .await?;

        for (product_id, quantity, price) in priced {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(product_id)
            .bind(quantity)
            .bind(price)
            .execute(&mut *tx)
            .await?;
        }
        println!("Seeded order {order_id} for {customer}");
    }

    tx.commit().await?;
    Ok(ORDERS.len())
}

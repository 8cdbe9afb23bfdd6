use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set,
};
use storefront_delivery::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, create_pool, run_migrations},
    entity::products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, 2).await?;
    // Ensure migrations are applied.
    run_migrations(&pool).await?;
    let orm = create_orm_conn(&pool);

    let inserted = seed_products(&orm).await?;

    println!("Seed completed. {inserted} new products");
    Ok(())
}

async fn seed_products(orm: &OrmConn) -> anyhow::Result<usize> {
    // (name, price in cents, stock, active)
    let products = [
        ("Sourdough Loaf", 850, 40, true),
        ("Free Range Eggs (12)", 799, 60, true),
        ("Full Cream Milk 2L", 420, 80, true),
        ("Flat White Beans 1kg", 3200, 25, true),
        ("Seasonal Fruit Box", 4500, 15, true),
        ("Discontinued Granola", 950, 0, false),
    ];

    let mut inserted = 0;
    for (name, price_cents, stock_qty, is_active) in products {
        let exists = Products::find()
            .filter(ProdCol::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        ProductActive {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price_cents: Set(price_cents),
            stock_qty: Set(stock_qty),
            is_active: Set(is_active),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(orm)
        .await?;
        inserted += 1;
        println!("Seeded {name}");
    }

    Ok(inserted)
}

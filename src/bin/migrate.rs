use marketplace_cart::{
    config::guest_cart_database_url,
    db::{create_pool, run_migrations},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let pool = create_pool(&guest_cart_database_url()).await?;
    run_migrations(&pool).await?;
    println!("Guest cart migrations applied");
    Ok(())
}

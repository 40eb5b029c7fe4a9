use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketplace_cart::{
    clock::Clock,
    config::AppConfig,
    dto::{cart::AddItemParams, delivery::DeliveryTarget},
    models::{CartSnapshot, DeliveryCapability, DeliveryType, ProductId, SellerId},
    services::{
        cart_sync::CartScope,
        checkout::CheckoutOrchestrator,
        reservation::{ReservationBadge, ReservationState},
    },
    state::AppState,
};

#[derive(Debug, Parser)]
#[command(name = "marketplace-cart", about = "Storefront cart from the command line")]
struct Cli {
    /// Restrict the cart to one seller's shop.
    #[arg(long, global = true)]
    seller: Option<SellerId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the cart with reservation countdowns.
    Show,
    /// Put a product in the cart.
    Add {
        #[arg(long)]
        product: ProductId,
        #[arg(long = "from")]
        seller_id: SellerId,
        #[arg(long)]
        seller_name: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long, default_value_t = 1)]
        quantity: i32,
        #[arg(long)]
        preorder_date: Option<NaiveDate>,
        #[arg(long)]
        delivery: Option<String>,
    },
    /// Change the quantity of a line; 0 removes it.
    Set { product: ProductId, quantity: i32 },
    Remove { product: ProductId },
    /// Ask for another five minutes on a reserved item.
    Extend { product: ProductId },
    /// Check delivery to an address and print the checkout totals.
    Quote {
        #[arg(long)]
        address: String,
        /// Sellers to pick up from instead of delivering.
        #[arg(long)]
        pickup: Vec<SellerId>,
        #[arg(long)]
        use_points: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marketplace_cart=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let state = AppState::build(config).await?;
    let scope = cli.seller.map_or(CartScope::Global, CartScope::Seller);
    let cart = state.cart(scope);
    cart.load().await?;

    tracing::info!(
        authenticated = state.session.is_authenticated(),
        ?scope,
        "cart ready"
    );

    match cli.command {
        Command::Show => {}
        Command::Add {
            product,
            seller_id,
            seller_name,
            name,
            price,
            quantity,
            preorder_date,
            delivery,
        } => {
            let seller_delivery_type = delivery.as_deref().map(parse_capability).transpose()?;
            let outcome = cart
                .add_item(AddItemParams {
                    product_id: product,
                    seller_id,
                    seller_name,
                    name,
                    price,
                    quantity,
                    is_preorder: preorder_date.is_some(),
                    preorder_date,
                    photo: None,
                    seller_delivery_type,
                    seller_city_id: None,
                })
                .await?;
            if let Some(reserved_at) = outcome.reserved_at {
                println!("reserved at {reserved_at}");
            }
        }
        Command::Set { product, quantity } => cart.update_quantity(product, quantity).await?,
        Command::Remove { product } => cart.remove_item(product).await?,
        Command::Extend { product } => {
            let reserved_at = cart.extend_reservation(product).await?;
            println!("reserved until {}", reserved_at + chrono::Duration::minutes(5));
        }
        Command::Quote {
            address,
            pickup,
            use_points,
        } => {
            let mut checkout = CheckoutOrchestrator::new(Arc::clone(&cart), Arc::clone(&state.api));
            for seller_id in pickup {
                checkout.set_delivery_type(seller_id, DeliveryType::Pickup).await?;
            }
            if state.session.is_authenticated() {
                checkout.load_loyalty().await;
            }
            checkout.set_address(DeliveryTarget::Address(address)).await;
            if use_points {
                for group in cart.snapshot().groups() {
                    checkout.use_points(group.seller_id, true);
                }
            }
            println!("{}", serde_json::to_string_pretty(&checkout.summary())?);
            return Ok(());
        }
    }

    print_cart(&cart.snapshot(), &state);
    Ok(())
}

fn parse_capability(raw: &str) -> anyhow::Result<DeliveryCapability> {
    match raw {
        "delivery" => Ok(DeliveryCapability::Delivery),
        "pickup" => Ok(DeliveryCapability::Pickup),
        "both" => Ok(DeliveryCapability::Both),
        other => anyhow::bail!("unknown delivery capability {other:?}"),
    }
}

fn print_cart(snapshot: &CartSnapshot, state: &AppState) {
    if snapshot.is_empty() {
        println!("cart is empty");
        return;
    }
    let now = state.clock.now();
    for group in snapshot.groups() {
        println!("{} (#{}): {}", group.seller_name, group.seller_id, group.subtotal());
        for item in &group.items {
            let badge = match ReservationBadge::for_item(item, now) {
                ReservationBadge::None if item.is_preorder => " [preorder]".to_string(),
                ReservationBadge::None => String::new(),
                ReservationBadge::Active(_) | ReservationBadge::Warning(_) => format!(
                    " [reserved {}]",
                    ReservationState::for_item(item, now).formatted_time()
                ),
                ReservationBadge::Expired => " [reservation expired]".to_string(),
            };
            println!(
                "  #{} {} x{} @ {}{}",
                item.product_id, item.name, item.quantity, item.price, badge
            );
        }
    }
    println!("items: {}, total: {}", snapshot.item_count(), snapshot.total());
}

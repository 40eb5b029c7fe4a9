use axum::{
    Json, Router,
    extract::Path,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::{delete, get, post},
};
use chrono::{TimeZone, Utc};
use reqwest::StatusCode as ClientStatus;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use marketplace_cart::{
    api::{HttpMarketplaceApi, MarketplaceApi, http::classify_failure},
    dto::{
        cart::AddCartItemRequest,
        checkout::{CheckoutRequest, Contact},
        delivery::DeliveryTarget,
    },
    error::AppError,
};

type Reply = (StatusCode, Json<Value>);

fn ok(data: Value) -> Reply {
    (StatusCode::OK, Json(json!({ "message": "OK", "data": data })))
}

fn failure(status: StatusCode, message: &str, code: Option<&str>) -> Reply {
    (status, Json(json!({ "message": message, "code": code })))
}

async fn cart(headers: HeaderMap) -> Reply {
    if !headers.contains_key(AUTHORIZATION) {
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized", None);
    }
    ok(json!([{
        "seller_id": 1,
        "seller_name": "Flower Lab",
        "delivery_type": "both",
        "delivery_price": "300",
        "items": [{
            "product_id": 10,
            "name": "Roses",
            "price": "500.00",
            "quantity": 2,
            "reserved_at": "2025-03-01 10:00:00"
        }]
    }]))
}

async fn add(Json(body): Json<Value>) -> Reply {
    ok(json!({ "quantity": body["quantity"], "reserved_at": "2025-03-01T10:00:00Z" }))
}

async fn extend(Path(product_id): Path<i64>) -> Reply {
    match product_id {
        10 => ok(json!({ "reserved_at": "2025-03-01T10:04:00Z" })),
        _ => failure(
            StatusCode::CONFLICT,
            "Reservation expired",
            Some("reservation_expired"),
        ),
    }
}

async fn remove(Path(_product_id): Path<i64>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn loyalty(Path(seller_id): Path<i64>) -> Reply {
    match seller_id {
        1 => ok(json!({
            "points_balance": 200,
            "max_points_discount_percent": "50",
            "points_to_ruble_rate": "1"
        })),
        _ => failure(StatusCode::NOT_FOUND, "Not Found", None),
    }
}

async fn delivery_check(Json(body): Json<Value>) -> Reply {
    if body["address"] == "Lenina 1" {
        ok(json!({ "delivers": true, "delivery_price": "300", "district_id": 5 }))
    } else {
        ok(json!({ "delivers": false, "delivery_price": "0", "message": "outside delivery zone" }))
    }
}

async fn checkout(Json(_body): Json<Value>) -> Reply {
    failure(StatusCode::UNPROCESSABLE_ENTITY, "Not enough Peonies in stock", None)
}

async fn spawn_marketplace() -> anyhow::Result<String> {
    let app = Router::new()
        .route("/api/cart", get(cart).post(add))
        .route("/api/cart/{product_id}", delete(remove))
        .route("/api/cart/{product_id}/extend", post(extend))
        .route("/api/loyalty/{seller_id}", get(loyalty))
        .route("/api/delivery/check", post(delivery_check))
        .route("/api/orders/checkout", post(checkout));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn client(base_url: &str) -> HttpMarketplaceApi {
    HttpMarketplaceApi::with_client(reqwest::Client::new(), base_url)
}

#[tokio::test]
async fn cart_requires_a_session() -> anyhow::Result<()> {
    let base_url = spawn_marketplace().await?;

    let err = client(&base_url).fetch_cart().await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let groups = client(&base_url).with_token("token").fetch_cart().await?;
    assert_eq!(groups.len(), 1);
    let roses = &groups[0].items[0];
    assert_eq!(roses.price, Decimal::new(50000, 2));
    assert_eq!(
        roses.reserved_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap())
    );
    assert_eq!(groups[0].delivery_price, Some(Decimal::from(300)));
    Ok(())
}

#[tokio::test]
async fn cart_mutations_round_trip() -> anyhow::Result<()> {
    let api = client(&spawn_marketplace().await?).with_token("token");

    let outcome = api
        .add_cart_item(AddCartItemRequest {
            product_id: 10,
            quantity: 3,
            preorder_date: None,
        })
        .await?;
    assert_eq!(outcome.quantity, 3);
    assert!(outcome.reserved_at.is_some());

    api.remove_cart_item(10).await?;

    let extended = api.extend_reservation(10).await?;
    assert_eq!(extended, Utc.with_ymd_and_hms(2025, 3, 1, 10, 4, 0).unwrap());
    let err = api.extend_reservation(11).await.unwrap_err();
    assert!(matches!(err, AppError::StaleReservation));
    Ok(())
}

#[tokio::test]
async fn missing_loyalty_account_is_none() -> anyhow::Result<()> {
    let api = client(&spawn_marketplace().await?).with_token("token");
    let account = api.get_loyalty(1).await?.unwrap();
    assert_eq!(account.points_balance, 200);
    assert!(api.get_loyalty(2).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn delivery_check_posts_the_address() -> anyhow::Result<()> {
    let api = client(&spawn_marketplace().await?);
    let near = api
        .check_delivery(1, &DeliveryTarget::Address("Lenina 1".to_string()))
        .await?;
    assert!(near.delivers);
    assert_eq!(near.district_id, Some(5));

    let far = api
        .check_delivery(1, &DeliveryTarget::Address("Tundra".to_string()))
        .await?;
    assert!(!far.delivers);
    assert_eq!(far.message, "outside delivery zone");
    Ok(())
}

#[tokio::test]
async fn checkout_stock_conflict_is_typed() -> anyhow::Result<()> {
    let api = client(&spawn_marketplace().await?).with_token("token");
    let request = CheckoutRequest {
        idempotency_key: uuid::Uuid::new_v4(),
        customer: Contact {
            name: "Anna".to_string(),
            phone: "79123456789".to_string(),
        },
        recipient: None,
        comment: None,
        orders: Vec::new(),
    };
    let err = api.submit_checkout(&request).await.unwrap_err();
    assert!(matches!(err, AppError::StockUnavailable(ref message) if message.contains("Peonies")));
    Ok(())
}

#[tokio::test]
async fn answer_without_data_is_invalid() -> anyhow::Result<()> {
    let app = Router::new().route(
        "/api/cart",
        get(|| async { Json(json!({ "message": "OK", "meta": { "page": 1 } })) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let err = client(&format!("http://{addr}")).fetch_cart().await.unwrap_err();
    assert!(matches!(err, AppError::InvalidResponse(_)));
    Ok(())
}

#[tokio::test]
async fn unreachable_marketplace_is_a_network_error() {
    let api = client("http://127.0.0.1:9");
    let err = api.fetch_cart().await.unwrap_err();
    assert!(err.is_transient());
}

#[test]
fn failures_map_onto_cart_errors() {
    assert!(matches!(
        classify_failure(ClientStatus::GONE, r#"{"message":"Reservation expired"}"#),
        AppError::StaleReservation
    ));
    assert!(matches!(
        classify_failure(ClientStatus::CONFLICT, r#"{"message":"Only 1 left"}"#),
        AppError::StockUnavailable(ref m) if m == "Only 1 left"
    ));
    assert!(matches!(
        classify_failure(ClientStatus::BAD_REQUEST, "quantity must be positive"),
        AppError::Rejected(ref m) if m == "quantity must be positive"
    ));
    assert!(matches!(
        classify_failure(ClientStatus::BAD_GATEWAY, ""),
        AppError::Network(_)
    ));
    assert!(matches!(
        classify_failure(ClientStatus::NOT_FOUND, ""),
        AppError::NotFound
    ));
}

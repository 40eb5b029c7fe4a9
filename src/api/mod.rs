//! Remote marketplace operations consumed by the cart layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    dto::{
        cart::{AddCartItemRequest, AddItemOutcome},
        checkout::{CheckoutRequest, CheckoutResponse},
        delivery::DeliveryTarget,
    },
    error::AppResult,
    models::{CartGroup, DeliveryCheckResult, DeliverySlot, LoyaltyAccount, ProductId, SellerId},
};

pub mod http;

pub use http::HttpMarketplaceApi;

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn fetch_cart(&self) -> AppResult<Vec<CartGroup>>;

    async fn add_cart_item(&self, request: AddCartItemRequest) -> AppResult<AddItemOutcome>;

    async fn update_cart_item(&self, product_id: ProductId, quantity: i32) -> AppResult<()>;

    async fn remove_cart_item(&self, product_id: ProductId) -> AppResult<()>;

    /// Fails with [`crate::error::AppError::StaleReservation`] once the hold lapsed.
    async fn extend_reservation(&self, product_id: ProductId) -> AppResult<DateTime<Utc>>;

    async fn check_delivery(
        &self,
        seller_id: SellerId,
        target: &DeliveryTarget,
    ) -> AppResult<DeliveryCheckResult>;

    /// `None` when the buyer has no loyalty account linked with this seller.
    async fn get_loyalty(&self, seller_id: SellerId) -> AppResult<Option<LoyaltyAccount>>;

    async fn delivery_slots(&self, seller_id: SellerId) -> AppResult<Vec<DeliverySlot>>;

    async fn submit_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutResponse>;
}

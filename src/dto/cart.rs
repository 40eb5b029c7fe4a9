use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{DeliveryCapability, GuestCartEntry, ProductId, SellerId};
use crate::services::reservation::parse_reserved_at;

#[derive(Debug, Serialize, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preorder_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemResponse {
    pub quantity: i32,
    #[serde(default)]
    pub reserved_at: Option<String>,
}

impl AddCartItemResponse {
    pub fn reserved_at(&self) -> Option<DateTime<Utc>> {
        self.reserved_at.as_deref().and_then(parse_reserved_at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ExtendReservationResponse {
    pub reserved_at: String,
}

/// Everything needed to put a product in either cart. The seller fields only
/// matter for the guest cart, which has no server-side join to fill them in.
#[derive(Debug, Clone)]
pub struct AddItemParams {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub seller_name: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub is_preorder: bool,
    pub preorder_date: Option<NaiveDate>,
    pub photo: Option<String>,
    pub seller_delivery_type: Option<DeliveryCapability>,
    pub seller_city_id: Option<i64>,
}

impl AddItemParams {
    pub fn to_guest_entry(&self) -> GuestCartEntry {
        GuestCartEntry {
            product_id: self.product_id,
            seller_id: self.seller_id,
            seller_name: self.seller_name.clone(),
            name: self.name.clone(),
            price: self.price,
            quantity: self.quantity,
            is_preorder: self.is_preorder,
            preorder_date: self.preorder_date,
            photo: self.photo.clone(),
            seller_delivery_type: self.seller_delivery_type,
            seller_city_id: self.seller_city_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddItemOutcome {
    pub quantity: i32,
    pub reserved_at: Option<DateTime<Utc>>,
}

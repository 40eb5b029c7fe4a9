use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DeliveryType, Order, ProductId, SellerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub idempotency_key: Uuid,
    pub customer: Contact,
    /// Set only when somebody else receives the order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub orders: Vec<SellerOrderRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerOrderRequest {
    pub seller_id: SellerId,
    pub delivery_type: DeliveryType,
    /// Shared delivery address, or `None` for pickup.
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gift_note: Option<String>,
    pub points_to_use: i64,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub orders: Vec<Order>,
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::services::reservation::parse_reserved_at;

pub type ProductId = i64;
pub type SellerId = i64;

/// What a seller is able to do with an order. Unset on the wire means `Both`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryCapability {
    Delivery,
    Pickup,
    #[default]
    Both,
}

impl DeliveryCapability {
    pub fn allows(self, delivery_type: DeliveryType) -> bool {
        match self {
            DeliveryCapability::Both => true,
            DeliveryCapability::Delivery => delivery_type == DeliveryType::Delivery,
            DeliveryCapability::Pickup => delivery_type == DeliveryType::Pickup,
        }
    }

    pub fn default_type(self) -> DeliveryType {
        match self {
            DeliveryCapability::Pickup => DeliveryType::Pickup,
            DeliveryCapability::Delivery | DeliveryCapability::Both => DeliveryType::Delivery,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Delivery,
    Pickup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub is_preorder: bool,
    #[serde(default)]
    pub preorder_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub reserved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// Only non-preorder items with a server timestamp hold stock.
    pub fn is_reserved(&self) -> bool {
        !self.is_preorder && self.reserved_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartGroup {
    pub seller_id: SellerId,
    pub seller_name: String,
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub delivery_type: Option<DeliveryCapability>,
    #[serde(default)]
    pub delivery_price: Option<Decimal>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub map_url: Option<String>,
    #[serde(default)]
    pub city_id: Option<i64>,
}

impl CartGroup {
    pub fn capability(&self) -> DeliveryCapability {
        self.delivery_type.unwrap_or_default()
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }
}

/// Everything the current actor has in the cart. Always built through
/// [`CartSnapshot::from_groups`], which enforces the group/item invariants.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CartSnapshot {
    groups: Vec<CartGroup>,
}

impl CartSnapshot {
    pub fn from_groups(groups: Vec<CartGroup>) -> Self {
        let groups = groups
            .into_iter()
            .filter_map(|mut group| {
                group.items.retain(|item| item.quantity >= 1);
                for item in group.items.iter_mut().filter(|item| item.is_preorder) {
                    item.reserved_at = None;
                }
                (!group.items.is_empty()).then_some(group)
            })
            .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[CartGroup] {
        &self.groups
    }

    pub fn into_groups(self) -> Vec<CartGroup> {
        self.groups
    }

    pub fn group(&self, seller_id: SellerId) -> Option<&CartGroup> {
        self.groups.iter().find(|group| group.seller_id == seller_id)
    }

    pub fn find_item(&self, product_id: ProductId) -> Option<(&CartGroup, &CartItem)> {
        self.groups
            .iter()
            .find_map(|group| group.item(product_id).map(|item| (group, item)))
    }

    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.groups.iter().flat_map(|group| group.items.iter())
    }

    pub fn total(&self) -> Decimal {
        self.groups.iter().map(CartGroup::subtotal).sum()
    }

    pub fn item_count(&self) -> i64 {
        self.groups.iter().map(CartGroup::item_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn has_live_reservations(&self) -> bool {
        self.items().any(CartItem::is_reserved)
    }
}

/// Locally persisted guest cart line. Carries the seller fields a server-side
/// join would otherwise provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCartEntry {
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

impl GuestCartEntry {
    pub fn to_cart_item(&self) -> CartItem {
        CartItem {
            product_id: self.product_id,
            name: self.name.clone(),
            price: self.price,
            quantity: self.quantity,
            is_preorder: self.is_preorder,
            preorder_date: self.preorder_date,
            reserved_at: None,
            photo: self.photo.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryCheckResult {
    pub delivers: bool,
    pub delivery_price: Decimal,
    #[serde(default)]
    pub district_id: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl DeliveryCheckResult {
    pub fn failed() -> Self {
        Self {
            delivers: false,
            delivery_price: Decimal::ZERO,
            district_id: None,
            message: "check failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyAccount {
    pub points_balance: i64,
    pub max_points_discount_percent: Decimal,
    pub points_to_ruble_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySlot {
    pub id: i64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub seller_id: SellerId,
    pub delivery_type: DeliveryType,
    pub status: String,
    pub total_amount: Decimal,
    #[serde(default)]
    pub points_used: i64,
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_reserved_at))
}

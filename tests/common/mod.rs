#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;

use marketplace_cart::{
    api::MarketplaceApi,
    clock::Clock,
    db::{DbPool, create_pool, run_migrations},
    dto::{
        cart::{AddCartItemRequest, AddItemOutcome, AddItemParams},
        checkout::{CheckoutRequest, CheckoutResponse},
        delivery::DeliveryTarget,
    },
    error::{AppError, AppResult},
    models::{
        CartGroup, CartItem, DeliveryCapability, DeliveryCheckResult, DeliverySlot,
        LoyaltyAccount, Order, ProductId, SellerId,
    },
    services::{
        cart_source::RemoteCartSource,
        cart_sync::{CartScope, CartSynchronizer},
    },
};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap() = at;
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

pub fn item(product_id: ProductId, name: &str, price: i64, quantity: i32) -> CartItem {
    CartItem {
        product_id,
        name: name.to_string(),
        price: Decimal::from(price),
        quantity,
        is_preorder: false,
        preorder_date: None,
        reserved_at: None,
        photo: None,
    }
}

pub fn reserved(mut item: CartItem, at: DateTime<Utc>) -> CartItem {
    item.reserved_at = Some(at);
    item
}

pub fn group(seller_id: SellerId, name: &str, items: Vec<CartItem>) -> CartGroup {
    CartGroup {
        seller_id,
        seller_name: name.to_string(),
        items,
        delivery_type: None,
        delivery_price: None,
        pickup_address: None,
        map_url: None,
        city_id: None,
    }
}

pub fn with_capability(mut group: CartGroup, capability: DeliveryCapability) -> CartGroup {
    group.delivery_type = Some(capability);
    group
}

pub fn add_params(product_id: ProductId, seller_id: SellerId, price: i64, quantity: i32) -> AddItemParams {
    AddItemParams {
        product_id,
        seller_id,
        seller_name: format!("Seller {seller_id}"),
        name: format!("Product {product_id}"),
        price: Decimal::from(price),
        quantity,
        is_preorder: false,
        preorder_date: None,
        photo: None,
        seller_delivery_type: None,
        seller_city_id: None,
    }
}

pub fn delivers(price: i64) -> DeliveryCheckResult {
    DeliveryCheckResult {
        delivers: true,
        delivery_price: Decimal::from(price),
        district_id: Some(5),
        message: String::new(),
    }
}

pub fn refuses(message: &str) -> DeliveryCheckResult {
    DeliveryCheckResult {
        delivers: false,
        delivery_price: Decimal::ZERO,
        district_id: None,
        message: message.to_string(),
    }
}

pub async fn memory_pool() -> anyhow::Result<DbPool> {
    let pool = create_pool("sqlite::memory:").await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub enum CheckoutBehavior {
    Accept,
    /// Answers with one order fewer than submitted.
    Short,
    Lapsed,
    Reject(String),
}

/// In-memory marketplace. Mutations apply to `cart` the way the server would.
pub struct FakeApi {
    pub clock: ManualClock,
    pub cart: Mutex<Vec<CartGroup>>,
    /// Products that can be added without being in the cart yet.
    pub catalog: Mutex<HashMap<ProductId, (SellerId, String, CartItem)>>,
    pub fetches: AtomicUsize,
    pub fail_next_mutation: Mutex<Option<String>>,
    /// When set, every mutation waits for a notification before answering.
    pub hold: Mutex<Option<Arc<Notify>>>,
    pub extend_lapsed: AtomicBool,
    /// Sellers missing here fail their delivery check.
    pub delivery: Mutex<HashMap<SellerId, DeliveryCheckResult>>,
    pub delivery_delays: Mutex<HashMap<String, Duration>>,
    pub delivery_calls: Mutex<Vec<(SellerId, DeliveryTarget)>>,
    pub loyalty: Mutex<HashMap<SellerId, LoyaltyAccount>>,
    pub loyalty_failures: Mutex<Vec<SellerId>>,
    pub slots: Mutex<HashMap<SellerId, Vec<DeliverySlot>>>,
    pub checkout: Mutex<CheckoutBehavior>,
    pub submitted: Mutex<Vec<CheckoutRequest>>,
}

impl FakeApi {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            cart: Mutex::new(Vec::new()),
            catalog: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            fail_next_mutation: Mutex::new(None),
            hold: Mutex::new(None),
            extend_lapsed: AtomicBool::new(false),
            delivery: Mutex::new(HashMap::new()),
            delivery_delays: Mutex::new(HashMap::new()),
            delivery_calls: Mutex::new(Vec::new()),
            loyalty: Mutex::new(HashMap::new()),
            loyalty_failures: Mutex::new(Vec::new()),
            slots: Mutex::new(HashMap::new()),
            checkout: Mutex::new(CheckoutBehavior::Accept),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cart(self, groups: Vec<CartGroup>) -> Self {
        *self.cart.lock().unwrap() = groups;
        self
    }

    pub fn set_cart(&self, groups: Vec<CartGroup>) {
        *self.cart.lock().unwrap() = groups;
    }

    pub fn server_item(&self, product_id: ProductId) -> Option<CartItem> {
        self.cart
            .lock()
            .unwrap()
            .iter()
            .flat_map(|group| group.items.iter())
            .find(|item| item.product_id == product_id)
            .cloned()
    }

    pub fn drop_server_item(&self, product_id: ProductId) {
        let mut cart = self.cart.lock().unwrap();
        for group in cart.iter_mut() {
            group.items.retain(|item| item.product_id != product_id);
        }
        cart.retain(|group| !group.items.is_empty());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> AppResult<()> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        let failure = self.fail_next_mutation.lock().unwrap().take();
        match failure {
            Some(message) => Err(AppError::StockUnavailable(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MarketplaceApi for FakeApi {
    async fn fetch_cart(&self) -> AppResult<Vec<CartGroup>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.cart.lock().unwrap().clone())
    }

    async fn add_cart_item(&self, request: AddCartItemRequest) -> AppResult<AddItemOutcome> {
        self.gate().await?;
        let now = self.clock.now();
        let mut cart = self.cart.lock().unwrap();

        if let Some(existing) = cart
            .iter_mut()
            .flat_map(|group| group.items.iter_mut())
            .find(|item| item.product_id == request.product_id)
        {
            existing.quantity += request.quantity;
            if !existing.is_preorder {
                existing.reserved_at = Some(now);
            }
            return Ok(AddItemOutcome {
                quantity: existing.quantity,
                reserved_at: existing.reserved_at,
            });
        }

        let (seller_id, seller_name, mut item) = self
            .catalog
            .lock()
            .unwrap()
            .get(&request.product_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        item.quantity = request.quantity;
        item.reserved_at = (!item.is_preorder).then_some(now);
        let outcome = AddItemOutcome {
            quantity: item.quantity,
            reserved_at: item.reserved_at,
        };
        match cart.iter_mut().find(|g| g.seller_id == seller_id) {
            Some(group) => group.items.push(item),
            None => {
                let mut new_group = group(seller_id, &seller_name, vec![item]);
                new_group.delivery_price = Some(Decimal::from(250));
                cart.push(new_group);
            }
        }
        Ok(outcome)
    }

    async fn update_cart_item(&self, product_id: ProductId, quantity: i32) -> AppResult<()> {
        self.gate().await?;
        let mut cart = self.cart.lock().unwrap();
        let item = cart
            .iter_mut()
            .flat_map(|group| group.items.iter_mut())
            .find(|item| item.product_id == product_id)
            .ok_or(AppError::NotFound)?;
        item.quantity = quantity;
        Ok(())
    }

    async fn remove_cart_item(&self, product_id: ProductId) -> AppResult<()> {
        self.gate().await?;
        self.drop_server_item(product_id);
        Ok(())
    }

    async fn extend_reservation(&self, product_id: ProductId) -> AppResult<DateTime<Utc>> {
        if self.extend_lapsed.load(Ordering::SeqCst) {
            self.drop_server_item(product_id);
            return Err(AppError::StaleReservation);
        }
        let now = self.clock.now();
        let mut cart = self.cart.lock().unwrap();
        let item = cart
            .iter_mut()
            .flat_map(|group| group.items.iter_mut())
            .find(|item| item.product_id == product_id)
            .ok_or(AppError::NotFound)?;
        item.reserved_at = Some(now);
        Ok(now)
    }

    async fn check_delivery(
        &self,
        seller_id: SellerId,
        target: &DeliveryTarget,
    ) -> AppResult<DeliveryCheckResult> {
        self.delivery_calls
            .lock()
            .unwrap()
            .push((seller_id, target.clone()));
        let delay = match target {
            DeliveryTarget::Address(address) => {
                self.delivery_delays.lock().unwrap().get(address).copied()
            }
            DeliveryTarget::DistrictId(_) => None,
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.delivery.lock().unwrap().get(&seller_id).cloned();
        result.ok_or_else(|| AppError::Network("zone service unavailable".to_string()))
    }

    async fn get_loyalty(&self, seller_id: SellerId) -> AppResult<Option<LoyaltyAccount>> {
        if self.loyalty_failures.lock().unwrap().contains(&seller_id) {
            return Err(AppError::Network("loyalty service unavailable".to_string()));
        }
        Ok(self.loyalty.lock().unwrap().get(&seller_id).cloned())
    }

    async fn delivery_slots(&self, seller_id: SellerId) -> AppResult<Vec<DeliverySlot>> {
        Ok(self
            .slots
            .lock()
            .unwrap()
            .get(&seller_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit_checkout(&self, request: &CheckoutRequest) -> AppResult<CheckoutResponse> {
        self.submitted.lock().unwrap().push(request.clone());
        let behavior = self.checkout.lock().unwrap().clone();
        let mut orders: Vec<Order> = request
            .orders
            .iter()
            .enumerate()
            .map(|(index, order)| Order {
                id: index as i64 + 1,
                seller_id: order.seller_id,
                delivery_type: order.delivery_type,
                status: "new".to_string(),
                total_amount: Decimal::ZERO,
                points_used: order.points_to_use,
            })
            .collect();
        match behavior {
            CheckoutBehavior::Accept => {
                self.cart.lock().unwrap().clear();
                Ok(CheckoutResponse { orders })
            }
            CheckoutBehavior::Short => {
                orders.pop();
                Ok(CheckoutResponse { orders })
            }
            CheckoutBehavior::Lapsed => Err(AppError::StaleReservation),
            CheckoutBehavior::Reject(message) => Err(AppError::Rejected(message)),
        }
    }
}

pub fn remote_cart(api: &Arc<FakeApi>, scope: CartScope) -> Arc<CartSynchronizer> {
    let dyn_api: Arc<dyn MarketplaceApi> = api.clone();
    Arc::new(CartSynchronizer::new(
        scope,
        Arc::new(RemoteCartSource::new(dyn_api)),
        Arc::new(api.clock.clone()),
    ))
}

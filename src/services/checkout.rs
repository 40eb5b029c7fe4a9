//! Checkout Orchestrator: turns the cart and a draft into one order per seller.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    api::MarketplaceApi,
    dto::{
        checkout::{CheckoutRequest, Contact, OrderLine, SellerOrderRequest},
        delivery::DeliveryTarget,
    },
    error::{AppError, AppResult},
    models::{CartGroup, DeliverySlot, DeliveryType, LoyaltyAccount, Order, SellerId},
    services::{
        cart_sync::CartSynchronizer,
        delivery::{DeliveryQuote, DeliveryZoneResolver, available_slots},
        loyalty::{load_accounts, max_redeemable, points_discount},
    },
    tasks::BackgroundTask,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutPhase {
    Editing,
    Validating,
    Submitting,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutDraft {
    pub customer_name: String,
    pub customer_phone: String,
    pub recipient_is_other: bool,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub delivery_types: HashMap<SellerId, DeliveryType>,
    pub address: Option<DeliveryTarget>,
    pub slots: HashMap<SellerId, i64>,
    pub points: HashMap<SellerId, i64>,
    pub gift_notes: HashMap<SellerId, String>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellerSummary {
    pub seller_id: SellerId,
    pub seller_name: String,
    pub delivery_type: DeliveryType,
    pub goods: Decimal,
    pub delivery: DeliveryQuote,
    pub points_used: i64,
    pub points_discount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSummary {
    pub sellers: Vec<SellerSummary>,
    pub total_goods: Decimal,
    /// Sum over sellers whose delivery price is known.
    pub total_delivery: Decimal,
    pub delivery_pending: Vec<SellerId>,
    pub total_points_discount: Decimal,
    pub total_to_pay: Decimal,
}

/// Digits only, 11 long, leading `7`. A leading `8` or a missing country
/// code is corrected.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => Some(format!("7{digits}")),
        11 if digits.starts_with('8') => Some(format!("7{}", digits.get(1..)?)),
        11 if digits.starts_with('7') => Some(digits),
        _ => None,
    }
}

pub struct CheckoutOrchestrator {
    cart: Arc<CartSynchronizer>,
    api: Arc<dyn MarketplaceApi>,
    resolver: Arc<DeliveryZoneResolver>,
    draft: CheckoutDraft,
    phase: CheckoutPhase,
    /// Stays the same across retries of one draft.
    idempotency_key: Uuid,
    loyalty: HashMap<SellerId, Option<LoyaltyAccount>>,
    slots: HashMap<SellerId, Vec<DeliverySlot>>,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("phase", &self.phase)
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    pub fn new(cart: Arc<CartSynchronizer>, api: Arc<dyn MarketplaceApi>) -> Self {
        let resolver = Arc::new(DeliveryZoneResolver::new(Arc::clone(&api)));
        Self {
            cart,
            api,
            resolver,
            draft: CheckoutDraft::default(),
            phase: CheckoutPhase::Editing,
            idempotency_key: Uuid::new_v4(),
            loyalty: HashMap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn phase(&self) -> &CheckoutPhase {
        &self.phase
    }

    pub fn draft(&self) -> &CheckoutDraft {
        &self.draft
    }

    pub fn idempotency_key(&self) -> Uuid {
        self.idempotency_key
    }

    pub fn resolver(&self) -> Arc<DeliveryZoneResolver> {
        Arc::clone(&self.resolver)
    }

    fn groups(&self) -> Vec<CartGroup> {
        self.cart.snapshot().into_groups()
    }

    fn group(&self, seller_id: SellerId) -> AppResult<CartGroup> {
        self.cart
            .snapshot()
            .group(seller_id)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    /// Any edit after a failed submission puts the draft back into editing.
    fn touch(&mut self) {
        if matches!(self.phase, CheckoutPhase::Failed(_) | CheckoutPhase::Validating) {
            self.phase = CheckoutPhase::Editing;
        }
    }

    pub fn delivery_type(&self, group: &CartGroup) -> DeliveryType {
        self.draft
            .delivery_types
            .get(&group.seller_id)
            .copied()
            .unwrap_or_else(|| group.capability().default_type())
    }

    fn delivery_sellers(&self) -> Vec<SellerId> {
        self.groups()
            .iter()
            .filter(|group| self.delivery_type(group) == DeliveryType::Delivery)
            .map(|group| group.seller_id)
            .collect()
    }

    pub fn set_customer(&mut self, name: impl Into<String>, phone: impl Into<String>) {
        self.touch();
        self.draft.customer_name = name.into();
        self.draft.customer_phone = phone.into();
    }

    /// `None` means the customer receives the order personally.
    pub fn set_recipient(&mut self, recipient: Option<(String, String)>) {
        self.touch();
        match recipient {
            Some((name, phone)) => {
                self.draft.recipient_is_other = true;
                self.draft.recipient_name = name;
                self.draft.recipient_phone = phone;
            }
            None => {
                self.draft.recipient_is_other = false;
                self.draft.recipient_name.clear();
                self.draft.recipient_phone.clear();
            }
        }
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.touch();
        self.draft.comment = comment.into();
    }

    pub fn set_gift_note(&mut self, seller_id: SellerId, note: impl Into<String>) {
        self.touch();
        let note = note.into();
        if note.trim().is_empty() {
            self.draft.gift_notes.remove(&seller_id);
        } else {
            self.draft.gift_notes.insert(seller_id, note);
        }
    }

    /// Switching to delivery checks the current address for that seller;
    /// switching to pickup drops its slot and verdict.
    pub async fn set_delivery_type(
        &mut self,
        seller_id: SellerId,
        delivery_type: DeliveryType,
    ) -> AppResult<()> {
        let group = self.group(seller_id)?;
        if !group.capability().allows(delivery_type) {
            return Err(AppError::Validation(format!(
                "{} does not offer {:?}",
                group.seller_name, delivery_type
            )));
        }
        self.touch();
        self.draft.delivery_types.insert(seller_id, delivery_type);
        if delivery_type == DeliveryType::Pickup {
            self.draft.slots.remove(&seller_id);
        }
        self.refresh_delivery().await;
        Ok(())
    }

    pub async fn set_address(&mut self, target: DeliveryTarget) {
        self.touch();
        self.draft.address = (!target.is_blank()).then_some(target);
        self.refresh_delivery().await;
    }

    /// Re-checks every seller that has delivery selected against the current address.
    pub async fn refresh_delivery(&mut self) {
        let Some(target) = self.draft.address.clone() else {
            self.resolver.clear();
            return;
        };
        let sellers = self.delivery_sellers();
        self.resolver.resolve(&target, &sellers).await;
    }

    /// Delivery sellers the current address has not been checked against yet,
    /// e.g. a seller group that arrived with a cart refresh.
    pub fn unchecked_sellers(&self) -> Vec<SellerId> {
        if self.draft.address.is_none() {
            return Vec::new();
        }
        let results = self.resolver.results();
        self.delivery_sellers()
            .into_iter()
            .filter(|seller_id| !results.contains_key(seller_id))
            .collect()
    }

    pub async fn load_loyalty(&mut self) {
        let sellers: Vec<SellerId> = self.groups().iter().map(|g| g.seller_id).collect();
        self.loyalty = load_accounts(self.api.as_ref(), &sellers).await;
    }

    pub async fn load_slots(&mut self) -> AppResult<()> {
        let now = self.cart.clock().now();
        for seller_id in self.delivery_sellers() {
            let slots = self.api.delivery_slots(seller_id).await?;
            self.slots.insert(seller_id, available_slots(&slots, now));
        }
        Ok(())
    }

    pub fn slots_for(&self, seller_id: SellerId) -> &[DeliverySlot] {
        self.slots.get(&seller_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_slot(&mut self, seller_id: SellerId, slot_id: Option<i64>) -> AppResult<()> {
        self.touch();
        let Some(slot_id) = slot_id else {
            self.draft.slots.remove(&seller_id);
            return Ok(());
        };
        if !self.slots_for(seller_id).iter().any(|slot| slot.id == slot_id) {
            return Err(AppError::Validation(format!(
                "slot {slot_id} is not available for seller {seller_id}"
            )));
        }
        self.draft.slots.insert(seller_id, slot_id);
        Ok(())
    }

    pub fn loyalty_account(&self, seller_id: SellerId) -> Option<&LoyaltyAccount> {
        self.loyalty.get(&seller_id).and_then(Option::as_ref)
    }

    pub fn max_points(&self, seller_id: SellerId) -> i64 {
        let subtotal = self
            .cart
            .snapshot()
            .group(seller_id)
            .map(CartGroup::subtotal)
            .unwrap_or_default();
        max_redeemable(self.loyalty_account(seller_id), subtotal)
    }

    /// Clamps to `[0, max_points]` and returns what was applied.
    pub fn set_points(&mut self, seller_id: SellerId, points: i64) -> i64 {
        self.touch();
        let applied = points.clamp(0, self.max_points(seller_id));
        if applied == 0 {
            self.draft.points.remove(&seller_id);
        } else {
            self.draft.points.insert(seller_id, applied);
        }
        applied
    }

    /// The "use points" toggle: on redeems the maximum.
    pub fn use_points(&mut self, seller_id: SellerId, enabled: bool) -> i64 {
        let points = if enabled { self.max_points(seller_id) } else { 0 };
        self.set_points(seller_id, points)
    }

    fn points_used(&self, group: &CartGroup) -> i64 {
        let requested = self.draft.points.get(&group.seller_id).copied().unwrap_or(0);
        let ceiling = max_redeemable(self.loyalty_account(group.seller_id), group.subtotal());
        requested.clamp(0, ceiling)
    }

    pub fn summary(&self) -> CheckoutSummary {
        let results = self.resolver.results();
        let sellers: Vec<SellerSummary> = self
            .groups()
            .iter()
            .map(|group| {
                let delivery_type = self.delivery_type(group);
                let points_used = self.points_used(group);
                let result = results.get(&group.seller_id);
                // with an address set only a zone verdict counts
                let delivery = if self.draft.address.is_some()
                    && delivery_type == DeliveryType::Delivery
                    && result.is_none()
                {
                    DeliveryQuote::Pending
                } else {
                    DeliveryQuote::for_group(group, delivery_type, result)
                };
                SellerSummary {
                    seller_id: group.seller_id,
                    seller_name: group.seller_name.clone(),
                    delivery_type,
                    goods: group.subtotal(),
                    delivery,
                    points_used,
                    points_discount: points_discount(
                        self.loyalty_account(group.seller_id),
                        points_used,
                    ),
                }
            })
            .collect();

        let total_goods: Decimal = sellers.iter().map(|s| s.goods).sum();
        let total_delivery: Decimal = sellers.iter().filter_map(|s| s.delivery.amount()).sum();
        let total_points_discount: Decimal = sellers.iter().map(|s| s.points_discount).sum();
        let delivery_pending = sellers
            .iter()
            .filter(|s| s.delivery == DeliveryQuote::Pending)
            .map(|s| s.seller_id)
            .collect();

        CheckoutSummary {
            total_to_pay: total_goods + total_delivery - total_points_discount,
            sellers,
            total_goods,
            total_delivery,
            delivery_pending,
            total_points_discount,
        }
    }

    /// Local preconditions; nothing here touches the network.
    pub fn build_request(&self) -> AppResult<CheckoutRequest> {
        let groups = self.groups();
        if groups.is_empty() {
            return Err(AppError::Validation("cart is empty".to_string()));
        }

        let phone = normalize_phone(&self.draft.customer_phone)
            .ok_or_else(|| AppError::Validation("a valid phone number is required".to_string()))?;
        let customer = Contact {
            name: self.draft.customer_name.trim().to_string(),
            phone,
        };
        let recipient = if self.draft.recipient_is_other {
            let name = self.draft.recipient_name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("recipient name is required".to_string()));
            }
            let phone = normalize_phone(&self.draft.recipient_phone).ok_or_else(|| {
                AppError::Validation("a valid recipient phone number is required".to_string())
            })?;
            Some(Contact {
                name: name.to_string(),
                phone,
            })
        } else {
            None
        };

        for group in &groups {
            let delivery_type = self.delivery_type(group);
            if !group.capability().allows(delivery_type) {
                return Err(AppError::Validation(format!(
                    "{} does not offer {:?}",
                    group.seller_name, delivery_type
                )));
            }
        }

        let delivery_sellers: Vec<SellerId> = groups
            .iter()
            .filter(|g| self.delivery_type(g) == DeliveryType::Delivery)
            .map(|g| g.seller_id)
            .collect();
        if !delivery_sellers.is_empty() && self.draft.address.is_none() {
            return Err(AppError::Validation(
                "a delivery address is required".to_string(),
            ));
        }

        let summary = self.summary();
        let denied: Vec<SellerId> = summary
            .sellers
            .iter()
            .filter(|s| matches!(s.delivery, DeliveryQuote::Unavailable(_)))
            .map(|s| s.seller_id)
            .collect();
        if !denied.is_empty() {
            return Err(AppError::DeliveryDenied(denied));
        }
        if !summary.delivery_pending.is_empty() {
            return Err(AppError::DeliveryPending(summary.delivery_pending));
        }

        let results = self.resolver.results();
        let address = match &self.draft.address {
            Some(DeliveryTarget::Address(address)) => Some(address.trim().to_string()),
            Some(DeliveryTarget::DistrictId(_)) | None => None,
        };

        let orders = groups
            .iter()
            .map(|group| {
                let delivery_type = self.delivery_type(group);
                let is_delivery = delivery_type == DeliveryType::Delivery;
                SellerOrderRequest {
                    seller_id: group.seller_id,
                    delivery_type,
                    address: if is_delivery { address.clone() } else { None },
                    district_id: match (&self.draft.address, is_delivery) {
                        (Some(DeliveryTarget::DistrictId(id)), true) => Some(*id),
                        (_, true) => results.get(&group.seller_id).and_then(|r| r.district_id),
                        (_, false) => None,
                    },
                    slot_id: if is_delivery {
                        self.draft.slots.get(&group.seller_id).copied()
                    } else {
                        None
                    },
                    gift_note: self.draft.gift_notes.get(&group.seller_id).cloned(),
                    points_to_use: self.points_used(group),
                    items: group
                        .items
                        .iter()
                        .map(|item| OrderLine {
                            product_id: item.product_id,
                            quantity: item.quantity,
                        })
                        .collect(),
                }
            })
            .collect();

        let comment = self.draft.comment.trim();
        Ok(CheckoutRequest {
            idempotency_key: self.idempotency_key,
            customer,
            recipient,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
            orders,
        })
    }

    /// Validates, re-checks reservations, and submits all seller orders at once.
    /// The submission is all-or-nothing; on failure the draft stays as it was.
    pub async fn submit(&mut self) -> AppResult<Vec<Order>> {
        if self.phase == CheckoutPhase::Submitting {
            return Err(AppError::Validation(
                "checkout is already being submitted".to_string(),
            ));
        }
        self.phase = CheckoutPhase::Validating;

        let unchecked = self.unchecked_sellers();
        if !unchecked.is_empty() {
            tracing::debug!(?unchecked, "seller set changed since the last delivery check");
            self.refresh_delivery().await;
        }

        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "checkout blocked by validation");
                self.phase = CheckoutPhase::Editing;
                return Err(err);
            }
        };

        let expired = self.cart.expired_items();
        if !expired.is_empty() {
            tracing::warn!(?expired, "reservations expired before checkout, refreshing cart");
            self.phase = CheckoutPhase::Editing;
            if let Err(err) = self.cart.refresh().await {
                tracing::warn!(error = %err, "cart refresh after expired reservations failed");
            }
            return Err(AppError::StaleReservation);
        }

        self.phase = CheckoutPhase::Submitting;
        let submitted = request.orders.len();
        match self.api.submit_checkout(&request).await {
            Ok(response) if response.orders.len() == submitted => {
                tracing::info!(
                    orders = submitted,
                    key = %request.idempotency_key,
                    "checkout accepted"
                );
                if let Err(err) = self.cart.complete_checkout().await {
                    tracing::warn!(error = %err, "clearing cart after checkout failed");
                }
                self.phase = CheckoutPhase::Succeeded;
                self.draft = CheckoutDraft::default();
                self.idempotency_key = Uuid::new_v4();
                self.slots.clear();
                self.resolver.clear();
                Ok(response.orders)
            }
            Ok(response) => {
                let message = format!(
                    "submitted {submitted} seller orders, got {} back",
                    response.orders.len()
                );
                tracing::warn!("{message}");
                self.phase = CheckoutPhase::Failed(message.clone());
                Err(AppError::InvalidResponse(message))
            }
            Err(AppError::StaleReservation) => {
                tracing::warn!("server reports lapsed reservations, resyncing cart");
                self.phase = CheckoutPhase::Editing;
                if let Err(err) = self.cart.refresh().await {
                    tracing::warn!(error = %err, "cart refresh after lapsed reservations failed");
                }
                Err(AppError::StaleReservation)
            }
            Err(err) => {
                tracing::warn!(error = %err, "checkout submission failed");
                self.phase = CheckoutPhase::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Refreshes the cart every `every` while the checkout screen is open.
    pub fn spawn_consistency_poll(&self, every: Duration) -> BackgroundTask {
        let cart = Arc::downgrade(&self.cart);
        BackgroundTask::new(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(cart) = cart.upgrade() else { break };
                if let Err(err) = cart.refresh().await {
                    tracing::warn!(error = %err, "checkout consistency poll failed");
                }
            }
        }))
    }
}

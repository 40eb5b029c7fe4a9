//! Delivery Zone Resolver and delivery pricing per seller.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::{FutureExt, future::join_all};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    api::MarketplaceApi,
    debounce::{Debounced, RequestGeneration},
    dto::delivery::DeliveryTarget,
    models::{CartGroup, DeliveryCheckResult, DeliverySlot, DeliveryType, SellerId},
};

/// Slots starting sooner than this are not offered.
pub const SLOT_LEAD_TIME_MINUTES: i64 = 60;

pub type DeliveryResults = HashMap<SellerId, DeliveryCheckResult>;

/// What the buyer will pay for getting one seller's goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeliveryQuote {
    /// Pickup, nothing to pay.
    NotApplicable,
    /// No price known yet, or the current address is not checked for this seller.
    Pending,
    Free,
    Fixed(Decimal),
    Unavailable(String),
}

impl DeliveryQuote {
    /// Zone result wins over the seller's flat price.
    pub fn for_group(
        group: &CartGroup,
        delivery_type: DeliveryType,
        result: Option<&DeliveryCheckResult>,
    ) -> Self {
        if delivery_type == DeliveryType::Pickup {
            return DeliveryQuote::NotApplicable;
        }
        match result {
            Some(result) if !result.delivers => DeliveryQuote::Unavailable(result.message.clone()),
            Some(result) => Self::priced(result.delivery_price),
            None => match group.delivery_price {
                Some(price) => Self::priced(price),
                None => DeliveryQuote::Pending,
            },
        }
    }

    fn priced(price: Decimal) -> Self {
        if price.is_zero() {
            DeliveryQuote::Free
        } else {
            DeliveryQuote::Fixed(price)
        }
    }

    /// `None` while the price cannot be added to a total.
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            DeliveryQuote::NotApplicable | DeliveryQuote::Free => Some(Decimal::ZERO),
            DeliveryQuote::Fixed(price) => Some(*price),
            DeliveryQuote::Pending | DeliveryQuote::Unavailable(_) => None,
        }
    }
}

/// One independent check per seller, all in flight together. A failed check
/// only marks its own seller.
pub async fn check_sellers(
    api: &dyn MarketplaceApi,
    target: &DeliveryTarget,
    sellers: &[SellerId],
) -> DeliveryResults {
    let checks = sellers.iter().map(|&seller_id| async move {
        let result = match api.check_delivery(seller_id, target).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(seller_id, error = %err, "delivery check failed");
                DeliveryCheckResult::failed()
            }
        };
        (seller_id, result)
    });
    join_all(checks).await.into_iter().collect()
}

/// Holds the latest verdicts for the current address. Every address change
/// re-checks all delivery sellers from scratch; verdicts for an address that
/// has since been replaced are discarded.
pub struct DeliveryZoneResolver {
    api: Arc<dyn MarketplaceApi>,
    generation: RequestGeneration,
    results: Mutex<DeliveryResults>,
}

impl std::fmt::Debug for DeliveryZoneResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryZoneResolver")
            .field("generation", &self.generation.current())
            .finish_non_exhaustive()
    }
}

impl DeliveryZoneResolver {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self {
            api,
            generation: RequestGeneration::new(),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `None` when a newer resolve started before this one finished.
    pub async fn resolve(
        &self,
        target: &DeliveryTarget,
        sellers: &[SellerId],
    ) -> Option<DeliveryResults> {
        let ticket = self.generation.issue();
        if target.is_blank() || sellers.is_empty() {
            self.store(HashMap::new());
            return Some(HashMap::new());
        }

        let results = check_sellers(self.api.as_ref(), target, sellers).await;
        if !self.generation.is_current(ticket) {
            tracing::debug!(ticket, "discarding delivery verdicts for a replaced address");
            return None;
        }
        self.store(results.clone());
        Some(results)
    }

    pub fn clear(&self) {
        self.generation.issue();
        self.store(HashMap::new());
    }

    pub fn results(&self) -> DeliveryResults {
        match self.results.lock() {
            Ok(results) => results.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn result_for(&self, seller_id: SellerId) -> Option<DeliveryCheckResult> {
        self.results().get(&seller_id).cloned()
    }

    fn store(&self, results: DeliveryResults) {
        match self.results.lock() {
            Ok(mut current) => *current = results,
            Err(poisoned) => *poisoned.into_inner() = results,
        }
    }

    /// Debounced address input feeding this resolver.
    pub fn debounced(
        self: &Arc<Self>,
        delay: Duration,
    ) -> Debounced<(DeliveryTarget, Vec<SellerId>), Option<DeliveryResults>> {
        let resolver = Arc::clone(self);
        Debounced::new(delay, move |(target, sellers): (DeliveryTarget, Vec<SellerId>)| {
            let resolver = Arc::clone(&resolver);
            async move { resolver.resolve(&target, &sellers).await }.boxed()
        })
    }
}

/// Slots the buyer may still pick, earliest first.
pub fn available_slots(slots: &[DeliverySlot], now: DateTime<Utc>) -> Vec<DeliverySlot> {
    let earliest = now + chrono::Duration::minutes(SLOT_LEAD_TIME_MINUTES);
    let mut available: Vec<DeliverySlot> = slots
        .iter()
        .filter(|slot| slot.starts_at >= earliest && slot.ends_at > slot.starts_at)
        .cloned()
        .collect();
    available.sort_by_key(|slot| slot.starts_at);
    available
}

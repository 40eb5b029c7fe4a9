//! Cart Synchronizer: the single writer of a cart snapshot.
//!
//! Mutations are applied to a tentative snapshot first and published at once;
//! the backing source then confirms. A failed confirmation is never retried,
//! the whole snapshot is reloaded from the source instead.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};

use crate::{
    clock::Clock,
    dto::cart::{AddItemOutcome, AddItemParams},
    error::{AppError, AppResult},
    models::{CartGroup, CartItem, CartSnapshot, ProductId, SellerId},
    services::{
        cart_source::{CartSource, SourceKind},
        reservation::ReservationState,
    },
    tasks::BackgroundTask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartScope {
    Global,
    Seller(SellerId),
}

impl CartScope {
    pub fn includes(self, seller_id: SellerId) -> bool {
        match self {
            CartScope::Global => true,
            CartScope::Seller(id) => id == seller_id,
        }
    }
}

pub struct CartSynchronizer {
    scope: CartScope,
    source: Arc<dyn CartSource>,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<CartSnapshot>,
    review_open: watch::Sender<bool>,
    item_locks: ItemLocks,
}

type LockTable = HashMap<ProductId, Arc<AsyncMutex<()>>>;
type ItemLocks = Mutex<LockTable>;

fn lock_table(locks: &ItemLocks) -> MutexGuard<'_, LockTable> {
    match locks.lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Serializes confirmations for one product. The table entry goes away with
/// the last holder.
struct ItemGuard<'a> {
    locks: &'a ItemLocks,
    product_id: ProductId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ItemGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_table(self.locks);
        if locks
            .get(&self.product_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.product_id);
        }
    }
}

impl std::fmt::Debug for CartSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSynchronizer")
            .field("scope", &self.scope)
            .field("source", &self.source.kind())
            .finish_non_exhaustive()
    }
}

impl CartSynchronizer {
    pub fn new(scope: CartScope, source: Arc<dyn CartSource>, clock: Arc<dyn Clock>) -> Self {
        let (snapshot, _) = watch::channel(CartSnapshot::default());
        let (review_open, _) = watch::channel(false);
        Self {
            scope,
            source,
            clock,
            snapshot,
            review_open,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> CartScope {
        self.scope
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn snapshot(&self) -> CartSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn open_review(&self) {
        if !self.snapshot.borrow().is_empty() {
            self.review_open.send_replace(true);
        }
    }

    pub fn close_review(&self) {
        self.review_open.send_replace(false);
    }

    pub fn is_review_open(&self) -> bool {
        *self.review_open.borrow()
    }

    pub fn subscribe_review(&self) -> watch::Receiver<bool> {
        self.review_open.subscribe()
    }

    fn publish(&self, snapshot: CartSnapshot) {
        let empty = snapshot.is_empty();
        self.snapshot.send_replace(snapshot);
        self.close_review_if_empty(empty);
    }

    fn close_review_if_empty(&self, empty: bool) {
        if empty && self.scope == CartScope::Global {
            self.review_open
                .send_if_modified(|open| std::mem::replace(open, false));
        }
    }

    fn scoped(&self, groups: Vec<CartGroup>) -> CartSnapshot {
        let scope = self.scope;
        CartSnapshot::from_groups(
            groups
                .into_iter()
                .filter(|group| scope.includes(group.seller_id))
                .collect(),
        )
    }

    /// Applies `change` to the current groups and publishes the result wholesale,
    /// all under the channel's write lock.
    fn apply_tentative(&self, change: impl FnOnce(&mut Vec<CartGroup>)) {
        let mut empty = false;
        self.snapshot.send_modify(|snapshot| {
            let mut groups = std::mem::take(snapshot).into_groups();
            change(&mut groups);
            *snapshot = CartSnapshot::from_groups(groups);
            empty = snapshot.is_empty();
        });
        self.close_review_if_empty(empty);
    }

    async fn lock_item(&self, product_id: ProductId) -> ItemGuard<'_> {
        let lock = {
            let mut locks = lock_table(&self.item_locks);
            Arc::clone(locks.entry(product_id).or_default())
        };
        ItemGuard {
            locks: &self.item_locks,
            product_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Products with a confirmation in flight or queued.
    pub fn locked_items(&self) -> Vec<ProductId> {
        let mut items: Vec<ProductId> = lock_table(&self.item_locks).keys().copied().collect();
        items.sort_unstable();
        items
    }

    /// Reads the active source and replaces the snapshot.
    pub async fn load(&self) -> AppResult<CartSnapshot> {
        let groups = self.source.load().await?;
        let snapshot = self.scoped(groups);
        tracing::debug!(
            groups = snapshot.groups().len(),
            items = snapshot.item_count(),
            "cart snapshot loaded"
        );
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn refresh(&self) -> AppResult<CartSnapshot> {
        self.load().await
    }

    /// A published tentative snapshot is always discarded; otherwise only
    /// failures that may have touched the cart trigger a reload.
    async fn resync_after(&self, err: AppError, tentative: bool) -> AppError {
        if tentative || err.forces_resync() {
            tracing::warn!(error = %err, "cart mutation failed, reloading snapshot");
            if let Err(reload) = self.load().await {
                tracing::warn!(error = %reload, "cart reload after failed mutation also failed");
            }
        }
        err
    }

    pub async fn add_item(&self, params: AddItemParams) -> AppResult<AddItemOutcome> {
        if params.quantity <= 0 {
            return Err(AppError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }
        if !self.scope.includes(params.seller_id) {
            return Err(AppError::Validation(format!(
                "product {} belongs to seller {}, outside this cart",
                params.product_id, params.seller_id
            )));
        }

        let new_seller = self.snapshot.borrow().group(params.seller_id).is_none();

        // preorder stock rules are stricter, never guess them
        if !params.is_preorder {
            self.apply_tentative(|groups| increment(groups, &params));
            tracing::debug!(product_id = params.product_id, "optimistic add applied");
        }

        let _guard = self.lock_item(params.product_id).await;

        let outcome = match self.source.add(&params).await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.resync_after(err, !params.is_preorder).await),
        };
        tracing::info!(
            product_id = params.product_id,
            quantity = outcome.quantity,
            reserved = outcome.reserved_at.is_some(),
            "cart item added"
        );

        if new_seller && self.source.kind() == SourceKind::Remote {
            // seller details (delivery price, pickup address) only come with a full load
            if let Err(err) = self.load().await {
                tracing::warn!(error = %err, "reload after add failed, keeping local snapshot");
                self.apply_tentative(|groups| confirm(groups, &params, outcome));
            }
        } else {
            self.apply_tentative(|groups| confirm(groups, &params, outcome));
        }

        Ok(outcome)
    }

    pub async fn update_quantity(&self, product_id: ProductId, quantity: i32) -> AppResult<()> {
        let seller_id = self.seller_of(product_id)?;

        self.apply_tentative(|groups| set_quantity(groups, product_id, quantity));
        tracing::debug!(product_id, quantity, "optimistic quantity applied");

        let _guard = self.lock_item(product_id).await;

        match self.source.update(product_id, seller_id, quantity).await {
            Ok(()) => {
                tracing::info!(product_id, quantity, "cart quantity confirmed");
                Ok(())
            }
            Err(err) => Err(self.resync_after(err, true).await),
        }
    }

    pub async fn remove_item(&self, product_id: ProductId) -> AppResult<()> {
        let seller_id = self.seller_of(product_id)?;

        self.apply_tentative(|groups| set_quantity(groups, product_id, 0));
        tracing::debug!(product_id, "optimistic removal applied");

        let _guard = self.lock_item(product_id).await;

        match self.source.remove(product_id, seller_id).await {
            Ok(()) => {
                tracing::info!(product_id, "cart item removed");
                Ok(())
            }
            Err(err) => Err(self.resync_after(err, true).await),
        }
    }

    /// Asks for a fresh reservation timestamp and swaps only that item's timestamp.
    pub async fn extend_reservation(&self, product_id: ProductId) -> AppResult<DateTime<Utc>> {
        {
            let snapshot = self.snapshot.borrow();
            let (_, item) = snapshot.find_item(product_id).ok_or(AppError::NotFound)?;
            if item.is_preorder {
                return Err(AppError::Unsupported("preorder items are not reserved"));
            }
        }

        let _guard = self.lock_item(product_id).await;

        match self.source.extend(product_id).await {
            Ok(reserved_at) => {
                // a sweep may have reloaded meanwhile; whatever snapshot is current wins
                self.apply_tentative(|groups| {
                    if let Some(item) = find_item_mut(groups, product_id) {
                        item.reserved_at = Some(reserved_at);
                    }
                });
                tracing::info!(product_id, %reserved_at, "reservation extended");
                Ok(reserved_at)
            }
            Err(AppError::StaleReservation) => {
                tracing::warn!(product_id, "reservation already lapsed, resyncing");
                if let Err(err) = self.load().await {
                    tracing::warn!(error = %err, "resync after lapsed reservation failed");
                }
                Err(AppError::StaleReservation)
            }
            Err(err) => Err(self.resync_after(err, false).await),
        }
    }

    /// Items whose reservation has run out according to the local clock.
    pub fn expired_items(&self) -> Vec<ProductId> {
        let now = self.clock.now();
        self.snapshot
            .borrow()
            .items()
            .filter(|item| item.is_reserved())
            .filter(|item| ReservationState::for_item(item, now).has_expired)
            .map(|item| item.product_id)
            .collect()
    }

    /// Reloads when any reservation looks expired; the server decides what was released.
    pub async fn sweep_expired(&self) -> AppResult<bool> {
        let expired = self.expired_items();
        if expired.is_empty() {
            return Ok(false);
        }
        tracing::info!(?expired, "reservations expired locally, reloading cart");
        self.load().await?;
        Ok(true)
    }

    /// Runs [`Self::sweep_expired`] every `every` while reservations are live.
    pub fn spawn_expiry_sweep(self: &Arc<Self>, every: Duration) -> BackgroundTask {
        let weak: Weak<Self> = Arc::downgrade(self);
        BackgroundTask::new(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(sync) = weak.upgrade() else { break };
                if !sync.snapshot.borrow().has_live_reservations() {
                    continue;
                }
                if let Err(err) = sync.sweep_expired().await {
                    tracing::warn!(error = %err, "expiry sweep reload failed");
                }
            }
        }))
    }

    /// Called by checkout once the orders were accepted.
    pub async fn complete_checkout(&self) -> AppResult<()> {
        self.source.clear_after_checkout().await?;
        if let Err(err) = self.load().await {
            tracing::warn!(error = %err, "reload after checkout failed, showing empty cart");
            self.publish(CartSnapshot::default());
        }
        Ok(())
    }

    fn seller_of(&self, product_id: ProductId) -> AppResult<SellerId> {
        self.snapshot
            .borrow()
            .find_item(product_id)
            .map(|(group, _)| group.seller_id)
            .ok_or(AppError::NotFound)
    }
}

fn find_item_mut(groups: &mut [CartGroup], product_id: ProductId) -> Option<&mut CartItem> {
    groups
        .iter_mut()
        .flat_map(|group| group.items.iter_mut())
        .find(|item| item.product_id == product_id)
}

fn set_quantity(groups: &mut [CartGroup], product_id: ProductId, quantity: i32) {
    for group in groups.iter_mut() {
        if quantity <= 0 {
            group.items.retain(|item| item.product_id != product_id);
        } else if let Some(item) = group.items.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity;
        }
    }
}

fn new_item(params: &AddItemParams, quantity: i32) -> CartItem {
    CartItem {
        product_id: params.product_id,
        name: params.name.clone(),
        price: params.price,
        quantity,
        is_preorder: params.is_preorder,
        preorder_date: params.preorder_date,
        reserved_at: None,
        photo: params.photo.clone(),
    }
}

fn upsert_item(groups: &mut Vec<CartGroup>, params: &AddItemParams, update: impl FnOnce(&mut CartItem)) {
    let index = match groups.iter().position(|g| g.seller_id == params.seller_id) {
        Some(index) => index,
        None => {
            groups.push(CartGroup {
                seller_id: params.seller_id,
                seller_name: params.seller_name.clone(),
                items: Vec::new(),
                delivery_type: params.seller_delivery_type,
                delivery_price: None,
                pickup_address: None,
                map_url: None,
                city_id: params.seller_city_id,
            });
            groups.len() - 1
        }
    };
    let Some(group) = groups.get_mut(index) else {
        return;
    };
    match group.items.iter_mut().find(|i| i.product_id == params.product_id) {
        Some(item) => update(item),
        None => {
            let mut item = new_item(params, 0);
            update(&mut item);
            group.items.push(item);
        }
    }
}

fn increment(groups: &mut Vec<CartGroup>, params: &AddItemParams) {
    upsert_item(groups, params, |item| item.quantity += params.quantity);
}

fn confirm(groups: &mut Vec<CartGroup>, params: &AddItemParams, outcome: AddItemOutcome) {
    upsert_item(groups, params, |item| {
        item.quantity = outcome.quantity;
        if outcome.reserved_at.is_some() {
            item.reserved_at = outcome.reserved_at;
        }
    });
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    api::MarketplaceApi,
    dto::cart::{AddCartItemRequest, AddItemOutcome, AddItemParams},
    error::{AppError, AppResult},
    models::{CartGroup, GuestCartEntry, ProductId, SellerId},
    services::guest_cart::GuestCartStore,
    session::Session,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Guest,
    Remote,
}

/// Backing store of a cart. Chosen once per synchronizer from the session.
#[async_trait]
pub trait CartSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn load(&self) -> AppResult<Vec<CartGroup>>;

    async fn add(&self, params: &AddItemParams) -> AppResult<AddItemOutcome>;

    /// `quantity <= 0` removes the line.
    async fn update(
        &self,
        product_id: ProductId,
        seller_id: SellerId,
        quantity: i32,
    ) -> AppResult<()>;

    async fn remove(&self, product_id: ProductId, seller_id: SellerId) -> AppResult<()>;

    async fn extend(&self, product_id: ProductId) -> AppResult<DateTime<Utc>>;

    /// Forget the cart after a successful checkout.
    async fn clear_after_checkout(&self) -> AppResult<()>;
}

pub fn select_source(
    session: &Session,
    api: Arc<dyn MarketplaceApi>,
    guest_store: GuestCartStore,
) -> Arc<dyn CartSource> {
    if session.is_authenticated() {
        tracing::debug!("using server cart");
        Arc::new(RemoteCartSource::new(api))
    } else {
        tracing::debug!("using guest cart");
        Arc::new(GuestCartSource::new(guest_store))
    }
}

#[derive(Debug, Clone)]
pub struct GuestCartSource {
    store: GuestCartStore,
}

impl GuestCartSource {
    pub fn new(store: GuestCartStore) -> Self {
        Self { store }
    }
}

/// Groups guest lines per seller, keeping the order sellers first appeared in.
pub fn group_guest_entries(entries: Vec<GuestCartEntry>) -> Vec<CartGroup> {
    let mut groups: Vec<CartGroup> = Vec::new();
    for entry in entries {
        let item = entry.to_cart_item();
        match groups.iter_mut().find(|g| g.seller_id == entry.seller_id) {
            Some(group) => group.items.push(item),
            None => groups.push(CartGroup {
                seller_id: entry.seller_id,
                seller_name: entry.seller_name,
                items: vec![item],
                delivery_type: entry.seller_delivery_type,
                delivery_price: None,
                pickup_address: None,
                map_url: None,
                city_id: entry.seller_city_id,
            }),
        }
    }
    groups
}

#[async_trait]
impl CartSource for GuestCartSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Guest
    }

    async fn load(&self) -> AppResult<Vec<CartGroup>> {
        Ok(group_guest_entries(self.store.get().await?))
    }

    async fn add(&self, params: &AddItemParams) -> AppResult<AddItemOutcome> {
        let quantity = self.store.add(&params.to_guest_entry()).await?;
        Ok(AddItemOutcome {
            quantity,
            reserved_at: None,
        })
    }

    async fn update(
        &self,
        product_id: ProductId,
        seller_id: SellerId,
        quantity: i32,
    ) -> AppResult<()> {
        self.store.update(product_id, seller_id, quantity).await
    }

    async fn remove(&self, product_id: ProductId, seller_id: SellerId) -> AppResult<()> {
        self.store.remove(product_id, seller_id).await
    }

    async fn extend(&self, _product_id: ProductId) -> AppResult<DateTime<Utc>> {
        Err(AppError::Unsupported("guest cart items are not reserved"))
    }

    async fn clear_after_checkout(&self) -> AppResult<()> {
        self.store.clear().await
    }
}

#[derive(Clone)]
pub struct RemoteCartSource {
    api: Arc<dyn MarketplaceApi>,
}

impl RemoteCartSource {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CartSource for RemoteCartSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    async fn load(&self) -> AppResult<Vec<CartGroup>> {
        self.api.fetch_cart().await
    }

    async fn add(&self, params: &AddItemParams) -> AppResult<AddItemOutcome> {
        self.api
            .add_cart_item(AddCartItemRequest {
                product_id: params.product_id,
                quantity: params.quantity,
                preorder_date: params.preorder_date.filter(|_| params.is_preorder),
            })
            .await
    }

    async fn update(
        &self,
        product_id: ProductId,
        _seller_id: SellerId,
        quantity: i32,
    ) -> AppResult<()> {
        if quantity <= 0 {
            return self.api.remove_cart_item(product_id).await;
        }
        self.api.update_cart_item(product_id, quantity).await
    }

    async fn remove(&self, product_id: ProductId, _seller_id: SellerId) -> AppResult<()> {
        self.api.remove_cart_item(product_id).await
    }

    async fn extend(&self, product_id: ProductId) -> AppResult<DateTime<Utc>> {
        self.api.extend_reservation(product_id).await
    }

    async fn clear_after_checkout(&self) -> AppResult<()> {
        // the server empties its own cart when it accepts the orders
        Ok(())
    }
}

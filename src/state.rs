use std::sync::Arc;

use crate::{
    api::{HttpMarketplaceApi, MarketplaceApi},
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::{DbPool, create_pool, run_migrations},
    services::{
        cart_source::select_source,
        cart_sync::{CartScope, CartSynchronizer},
        guest_cart::GuestCartStore,
    },
    session::Session,
};

/// Everything a storefront screen needs, wired once from configuration.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: DbPool,
    pub session: Session,
    pub api: Arc<dyn MarketplaceApi>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let pool = create_pool(&config.guest_cart_database_url).await?;
        run_migrations(&pool).await?;

        let session = Session::from_token(config.session_token.as_deref());
        let mut api = HttpMarketplaceApi::new(&config)?;
        if let Some(token) = session.token() {
            api = api.with_token(token);
        }

        Ok(Self {
            config,
            pool,
            session,
            api: Arc::new(api),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn guest_store(&self) -> GuestCartStore {
        GuestCartStore::new(self.pool.clone())
    }

    /// One synchronizer per scope; the cart source is fixed by the session here.
    pub fn cart(&self, scope: CartScope) -> Arc<CartSynchronizer> {
        let source = select_source(&self.session, Arc::clone(&self.api), self.guest_store());
        Arc::new(CartSynchronizer::new(scope, source, Arc::clone(&self.clock)))
    }
}

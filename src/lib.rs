//! Cart and reservation orchestration for a multi-seller storefront.
//!
//! [`services::cart_sync::CartSynchronizer`] owns the cart snapshot for one
//! scope, [`services::checkout::CheckoutOrchestrator`] turns it into one order
//! per seller. Everything remote goes through [`api::MarketplaceApi`].

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod debounce;
pub mod dto;
pub mod error;
pub mod models;
pub mod response;
pub mod services;
pub mod session;
pub mod state;
pub mod tasks;

pub mod cart_source;
pub mod cart_sync;
pub mod checkout;
pub mod delivery;
pub mod guest_cart;
pub mod loyalty;
pub mod reservation;

use thiserror::Error;

use crate::models::SellerId;

#[derive(Debug, Error)]
pub enum AppError {
    /// The 5-minute reservation window lapsed on the server side.
    #[error("Reservation expired")]
    StaleReservation,

    #[error("Stock unavailable: {0}")]
    StockUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Delivery unavailable for sellers {0:?}")]
    DeliveryDenied(Vec<SellerId>),

    #[error("Delivery price pending for sellers {0:?}")]
    DeliveryPending(Vec<SellerId>),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not Found")]
    NotFound,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("Database error")]
    Db(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Failures that are worth nothing more than a resync: the request may or
    /// may not have reached the marketplace.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Http(_))
    }

    /// Whether a failed cart mutation must be followed by a full reload.
    /// Local validation failures never touched the cart, everything else did
    /// or might have.
    pub fn forces_resync(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_) | AppError::Unsupported(_) | AppError::Unauthorized
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

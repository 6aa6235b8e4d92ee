use thiserror::Error;

/// Fetch-layer failures, classified by how the scheduler should react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeout or connection reset; worth an immediate bounded retry.
    #[error("transient fetch error: {0}")] Transient(String),

    /// Anti-automation challenge or ban; the destination group is paused
    /// for the rest of the cycle instead of retried.
    #[error("fetch blocked: {0}")] Blocked(String),

    /// Listing removed or the card is unusable; retried only on a later
    /// cycle, counted against the product.
    #[error("permanent fetch error: {0}")] Permanent(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error(transparent)] Fetch(#[from] FetchError),

    #[error("Notification error: {0}")] Notify(String),

    #[error("Invalid input: {0}")] InvalidInput(String),

    #[error("Tracked link limit reached")]
    QuotaExceeded,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Product is already tracked")]
    DuplicateProduct,

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

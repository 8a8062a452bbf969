//! Error taxonomy: infrastructure failures vs. business-rule rejections.
//!
//! [`EngineError`] is for infrastructure problems (storage, broadcast) and is
//! propagated with `?`. A rejected bid is not an error: it comes back as a
//! [`BidRejection`] inside `Ok(..)` and leaves state exactly as before the call.

use crate::types::ProductId;
use thiserror::Error;

/// Infrastructure and operator-facing errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The repository has no product under this id.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Another auction is already running; only one clock at a time.
    #[error("auction already running for product {0}")]
    AuctionInProgress(ProductId),

    /// The product repository or sale store failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The event broadcaster failed.
    #[error("broadcast failure: {0}")]
    Broadcast(String),
}

/// Why a bid did not win. Reported as a value, never thrown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidRejection {
    /// No auction state exists for this product.
    NotFound,
    /// The auction exists but is not running (idle or timed out).
    NotActive,
    /// Another buyer already won this run.
    AlreadySold,
    /// Requested quantity exceeds remaining stock.
    InsufficientStock,
}

impl std::fmt::Display for BidRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BidRejection::NotFound => "not_found",
            BidRejection::NotActive => "not_active",
            BidRejection::AlreadySold => "already_sold",
            BidRejection::InsufficientStock => "insufficient_stock",
        };
        f.write_str(s)
    }
}

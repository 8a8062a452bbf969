//! Core types and ids for the auction engine (charter data models).
//!
//! All identifiers are newtype wrappers. [`Product`] is the persisted view the
//! repository serves; [`AuctionState`] is the live clock state the engine owns.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// Product (lot) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProductId(pub u64);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier (buyer or seller).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketplace role. Tagged variants instead of user subtypes so role data
/// travels with the role.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Seller { company_name: String },
    Admin,
}

/// Lifecycle phase of one auction run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuctionPhase {
    Idle,
    Running,
    Sold,
    TimedOut,
}

/// Persisted product data served by the repository: price bounds, stock and
/// the flags that gate queue admission.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub seller_id: UserId,
    pub start_price: Decimal,
    pub min_price: Decimal,
    pub stock: u32,
    pub auctionable: bool,
    /// Earliest date this lot may be auctioned.
    pub auction_date: NaiveDate,
}

impl Product {
    /// Queue admission check: auctionable, in stock, scheduled on or before `today`.
    pub fn is_eligible(&self, today: NaiveDate) -> bool {
        self.auctionable && self.stock > 0 && self.auction_date <= today
    }
}

/// Live state of one auction run. One per product; created on first start and
/// overwritten on restart.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AuctionState {
    pub product_id: ProductId,
    pub phase: AuctionPhase,
    pub start_time: DateTime<Utc>,
    pub start_price: Decimal,
    pub min_price: Decimal,
    pub current_price: Decimal,
    pub final_price: Option<Decimal>,
    pub buyer_id: Option<UserId>,
    pub buyer_name: Option<String>,
}

impl AuctionState {
    /// Fresh Running state for `product`, clock at `start_price`, buyer cleared.
    pub fn started(product: &Product, start_time: DateTime<Utc>) -> Self {
        Self {
            product_id: product.id,
            phase: AuctionPhase::Running,
            start_time,
            start_price: product.start_price,
            min_price: product.min_price,
            current_price: product.start_price,
            final_price: None,
            buyer_id: None,
            buyer_name: None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, AuctionPhase::Running)
    }
}

/// Sale record persisted exactly once per winning bid, alongside the stock
/// decrement.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SaleRecord {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub buyer_name: String,
    pub created_at: DateTime<Utc>,
}

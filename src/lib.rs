//! # Flora Clock Engine
//!
//! Descending-price ("Dutch clock") auction engine for a flower marketplace:
//! live auction state, serialized bid arbitration against a decaying price,
//! queue advancement, and stock reconciliation.
//!
//! ## Entry point
//!
//! Use [`AuctionEngine`] as the single entry point: create with
//! [`AuctionEngine::new`], then [`AuctionEngine::start_auction`],
//! [`AuctionEngine::place_bid`], and the queue operations. Spawn
//! [`run_price_ticker`] to drive the clock.
//!
//! ## Example
//!
//! ```rust
//! use flora_clock_engine::{
//!     AuctionEngine, EngineConfig, InMemoryAuditSink, InMemoryBroadcaster,
//!     InMemoryProductStore, Product, ProductId, UserId,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryProductStore::with_products([Product {
//!     id: ProductId(1),
//!     name: "Tulip crate".into(),
//!     seller_id: UserId(70),
//!     start_price: "100".parse().unwrap(),
//!     min_price: "50".parse().unwrap(),
//!     stock: 5,
//!     auctionable: true,
//!     auction_date: chrono::Utc::now().date_naive(),
//! }]));
//! let engine = AuctionEngine::new(
//!     store.clone(),
//!     store,
//!     Arc::new(InMemoryBroadcaster::new()),
//!     Arc::new(InMemoryAuditSink::new()),
//!     EngineConfig::default(),
//! );
//! engine.start_auction(ProductId(1)).unwrap();
//! let outcome = engine.place_bid(ProductId(1), UserId(2), "florist", 2).unwrap();
//! assert!(outcome.is_won());
//! ```
//!
//! ## Lower-level API
//!
//! The shared decay function [`clock_price`] is available directly, and the
//! [`ProductRepository`]/[`SaleRecorder`]/[`Broadcaster`] traits are the seams
//! for real persistence and transports.

pub mod api;
pub mod audit;
pub mod broadcast;
pub mod engine;
pub mod error;
pub mod pricing;
pub mod queue;
pub mod repository;
pub mod sim;
pub mod ticker;
pub mod types;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, StdoutAuditSink};
pub use broadcast::{
    AuctionEvent, AuctionResultEvent, Broadcaster, ChannelBroadcaster, InMemoryBroadcaster,
};
pub use engine::{AuctionEngine, BidOutcome, EngineConfig};
pub use error::{BidRejection, EngineError};
pub use pricing::{clock_price, AUCTION_DURATION};
pub use queue::AuctionQueue;
pub use repository::{
    InMemoryProductStore, ProductCatalogFile, ProductRepository, SaleRecorder,
};
pub use sim::{BidAttempt, BidderSim, SimConfig};
pub use ticker::{run_price_ticker, TickerConfig};
pub use types::{AuctionPhase, AuctionState, Product, ProductId, Role, SaleRecord, UserId};

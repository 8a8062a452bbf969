//! Single-entry auction engine: owns the Dutch clock state, arbitrates bids,
//! advances the queue.
//!
//! All live state (auction map, queue, pending auto-advance) sits behind one
//! mutex. `place_bid` holds that lock across the whole operation (state read,
//! price computation, stock check, persistence, queue mutation), so at most
//! one bid can win a run. The price ticker reaches the same state only through
//! [`AuctionEngine::tick_price`], which takes the same lock; a timeout can
//! never fire concurrently with a winning bid.

use crate::audit::{AuditEvent, AuditSink};
use crate::broadcast::{AuctionResultEvent, Broadcaster};
use crate::error::{BidRejection, EngineError};
use crate::pricing::{clock_price, AUCTION_DURATION};
use crate::queue::AuctionQueue;
use crate::repository::{ProductRepository, SaleRecorder};
use crate::types::{AuctionPhase, AuctionState, Product, ProductId, SaleRecord, UserId};
use chrono::Utc;
use log::{error, info, warn};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Engine timing knobs. Tests shrink these; production uses the defaults.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Length of one clock run, start price down to the floor.
    pub auction_duration: Duration,
    /// Pause between an auction ending and the next queued lot starting.
    pub advance_cooldown: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auction_duration: AUCTION_DURATION,
            advance_cooldown: Duration::from_secs(5),
        }
    }
}

/// Result of a bid. Business rejections come back here, never as `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum BidOutcome {
    Won { price: Decimal },
    Rejected(BidRejection),
}

impl BidOutcome {
    pub fn is_won(&self) -> bool {
        matches!(self, BidOutcome::Won { .. })
    }
}

/// Everything mutable, owned exclusively by the engine behind one lock.
#[derive(Default)]
struct EngineInner {
    auctions: HashMap<ProductId, AuctionState>,
    active: Option<ProductId>,
    queue: AuctionQueue,
    auto_advance: bool,
    advance_task: Option<tokio::task::JoinHandle<()>>,
}

impl EngineInner {
    fn has_running(&self) -> bool {
        self.active
            .and_then(|id| self.auctions.get(&id))
            .map(AuctionState::is_running)
            .unwrap_or(false)
    }
}

/// Why persistence of a winning bid did not complete.
enum PersistFailure {
    Rejected(BidRejection),
    Infra(EngineError),
}

/// Dutch-clock auction engine. Share via `Arc`; every operation locks the
/// single inner mutex for its full duration.
pub struct AuctionEngine {
    products: Arc<dyn ProductRepository>,
    sales: Arc<dyn SaleRecorder>,
    broadcast: Arc<dyn Broadcaster>,
    audit: Arc<dyn AuditSink>,
    config: EngineConfig,
    inner: Mutex<EngineInner>,
    /// Self-handle for the deferred auto-advance task.
    weak: Weak<AuctionEngine>,
}

impl AuctionEngine {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        sales: Arc<dyn SaleRecorder>,
        broadcast: Arc<dyn Broadcaster>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            products,
            sales,
            broadcast,
            audit,
            config,
            inner: Mutex::new(EngineInner::default()),
            weak: weak.clone(),
        })
    }

    /// Starts (or restarts) the clock for `id`: loads price bounds from the
    /// repository, resets buyer and final price, publishes `AuctionStarted`.
    /// Fails with [`EngineError::AuctionInProgress`] while another lot's clock
    /// is running.
    pub fn start_auction(&self, id: ProductId) -> Result<AuctionState, EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        self.start_locked(&mut inner, id)
    }

    fn start_locked(
        &self,
        inner: &mut EngineInner,
        id: ProductId,
    ) -> Result<AuctionState, EngineError> {
        if let Some(active_id) = inner.active {
            if active_id != id && inner.has_running() {
                return Err(EngineError::AuctionInProgress(active_id));
            }
        }
        let product = self
            .products
            .get_by_id(id)?
            .ok_or(EngineError::ProductNotFound(id))?;
        let state = AuctionState::started(&product, Utc::now());
        self.broadcast
            .publish_auction_started(id, state.start_time, state.start_price)?;
        inner.auctions.insert(id, state.clone());
        inner.active = Some(id);
        info!(
            "auction started product_id={} start_price={} min_price={}",
            id, state.start_price, state.min_price
        );
        self.audit.emit(&AuditEvent::now(
            "operator",
            "auction_start",
            Some(serde_json::json!({ "product_id": id.0 })),
            "success",
        ));
        Ok(state)
    }

    /// Arbitrates one purchase attempt. The first caller to reach a Running
    /// clock wins at the price the clock shows at that instant; everyone else
    /// is rejected. Infrastructure failures roll the optimistic `Sold`
    /// transition back and propagate as `Err`.
    pub fn place_bid(
        &self,
        id: ProductId,
        buyer_id: UserId,
        buyer_name: &str,
        quantity: u32,
    ) -> Result<BidOutcome, EngineError> {
        let mut inner = self.inner.lock().expect("lock");

        let state = match inner.auctions.get_mut(&id) {
            Some(state) => state,
            None => return Ok(self.reject(id, buyer_name, BidRejection::NotFound)),
        };
        match state.phase {
            AuctionPhase::Running => {}
            AuctionPhase::Sold => {
                return Ok(self.reject(id, buyer_name, BidRejection::AlreadySold))
            }
            AuctionPhase::Idle | AuctionPhase::TimedOut => {
                return Ok(self.reject(id, buyer_name, BidRejection::NotActive))
            }
        }
        if quantity == 0 {
            return Ok(self.reject(id, buyer_name, BidRejection::InsufficientStock));
        }

        let elapsed = (Utc::now() - state.start_time).to_std().unwrap_or_default();
        let price = clock_price(
            state.start_price,
            state.min_price,
            elapsed,
            self.config.auction_duration,
        );

        // Optimistic transition; rolled back below on rejection or persistence failure.
        state.phase = AuctionPhase::Sold;
        state.final_price = Some(price);
        state.buyer_id = Some(buyer_id);
        state.buyer_name = Some(buyer_name.to_string());
        state.current_price = price;

        let (product, remaining) =
            match self.persist_sale(id, buyer_id, buyer_name, quantity, price) {
                Ok(done) => done,
                Err(PersistFailure::Rejected(rejection)) => {
                    Self::rollback_to_running(&mut inner, id);
                    return Ok(self.reject(id, buyer_name, rejection));
                }
                Err(PersistFailure::Infra(e)) => {
                    Self::rollback_to_running(&mut inner, id);
                    error!("bid persistence failed product_id={}: {}", id, e);
                    return Err(e);
                }
            };

        if remaining > 0 {
            // Partial lot: re-auction before new items.
            inner.queue.push_front(id);
        }
        inner.active = None;

        let result = AuctionResultEvent {
            product_id: id,
            sold: true,
            price,
            buyer_id: Some(buyer_id),
            buyer_name: Some(buyer_name.to_string()),
            quantity: Some(quantity),
            seller_id: Some(product.seller_id),
            product_name: Some(product.name.clone()),
        };
        if let Err(e) = self.broadcast.publish_auction_result(result) {
            // The sale is already persisted; the result event is best-effort.
            warn!("auction result broadcast failed product_id={}: {}", id, e);
        }
        info!(
            "auction sold product_id={} buyer_id={} quantity={} price={} remaining_stock={}",
            id, buyer_id, quantity, price, remaining
        );
        self.audit.emit(&AuditEvent::now(
            buyer_name,
            "bid_place",
            Some(serde_json::json!({
                "product_id": id.0,
                "quantity": quantity,
                "price": price.to_string(),
            })),
            "success",
        ));
        self.schedule_advance(&mut inner);
        Ok(BidOutcome::Won { price })
    }

    /// Stock check plus the persisted pair: sale record and stock decrement.
    /// Stock hitting zero permanently clears the auctionable flag.
    fn persist_sale(
        &self,
        id: ProductId,
        buyer_id: UserId,
        buyer_name: &str,
        quantity: u32,
        price: Decimal,
    ) -> Result<(Product, u32), PersistFailure> {
        let product = self
            .products
            .get_by_id(id)
            .map_err(PersistFailure::Infra)?
            .ok_or(PersistFailure::Rejected(BidRejection::NotFound))?;
        if product.stock < quantity {
            return Err(PersistFailure::Rejected(BidRejection::InsufficientStock));
        }
        let remaining = product.stock - quantity;
        let still_auctionable = remaining > 0 && product.auctionable;
        let sale = SaleRecord {
            product_id: id,
            product_name: product.name.clone(),
            quantity,
            unit_price: price,
            total: price * Decimal::from(quantity),
            seller_id: product.seller_id,
            buyer_id,
            buyer_name: buyer_name.to_string(),
            created_at: Utc::now(),
        };
        self.sales.insert(sale).map_err(PersistFailure::Infra)?;
        self.products
            .update_stock_and_flags(id, -(quantity as i64), still_auctionable)
            .map_err(PersistFailure::Infra)?;
        Ok((product, remaining))
    }

    fn rollback_to_running(inner: &mut EngineInner, id: ProductId) {
        if let Some(state) = inner.auctions.get_mut(&id) {
            state.phase = AuctionPhase::Running;
            state.final_price = None;
            state.buyer_id = None;
            state.buyer_name = None;
        }
    }

    fn reject(&self, id: ProductId, buyer_name: &str, rejection: BidRejection) -> BidOutcome {
        info!(
            "bid rejected product_id={} buyer={} reason={}",
            id, buyer_name, rejection
        );
        self.audit.emit(&AuditEvent::now(
            buyer_name,
            "bid_place",
            Some(serde_json::json!({ "product_id": id.0, "reason": rejection.to_string() })),
            "rejected",
        ));
        BidOutcome::Rejected(rejection)
    }

    /// One ticker beat: recompute the running clock's price with the shared
    /// decay function, publish it, and time the auction out once the floor is
    /// reached. Returns the published price, or `None` when no clock runs.
    pub fn tick_price(&self) -> Result<Option<Decimal>, EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        let Some(id) = inner.active else {
            return Ok(None);
        };
        let Some(state) = inner.auctions.get_mut(&id) else {
            return Ok(None);
        };
        if !state.is_running() {
            return Ok(None);
        }
        let elapsed = (Utc::now() - state.start_time).to_std().unwrap_or_default();
        let price = clock_price(
            state.start_price,
            state.min_price,
            elapsed,
            self.config.auction_duration,
        )
        .min(state.current_price);
        state.current_price = price;
        let floored = price <= state.min_price;
        self.broadcast.publish_price_update(price)?;
        if floored {
            self.finish_timed_out(&mut inner, id, "ticker", true)?;
        }
        Ok(Some(price))
    }

    /// Times out a Running auction: publishes `{sold:false}` and, when queue
    /// processing is on, schedules the next lot after the cool-down. Returns
    /// `false` if the auction was not running.
    pub fn timeout_auction(&self, id: ProductId) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        match inner.auctions.get(&id) {
            Some(state) if state.is_running() => {}
            _ => return Ok(false),
        }
        self.finish_timed_out(&mut inner, id, "operator", true)?;
        Ok(true)
    }

    fn finish_timed_out(
        &self,
        inner: &mut EngineInner,
        id: ProductId,
        actor: &str,
        schedule: bool,
    ) -> Result<(), EngineError> {
        let Some(state) = inner.auctions.get_mut(&id) else {
            return Ok(());
        };
        let price = state.current_price;
        self.broadcast.publish_auction_result(AuctionResultEvent {
            product_id: id,
            sold: false,
            price,
            buyer_id: None,
            buyer_name: None,
            quantity: None,
            seller_id: None,
            product_name: None,
        })?;
        if let Some(state) = inner.auctions.get_mut(&id) {
            state.phase = AuctionPhase::TimedOut;
        }
        inner.active = None;
        info!("auction timed out product_id={} price={}", id, price);
        self.audit.emit(&AuditEvent::now(
            actor,
            "auction_timeout",
            Some(serde_json::json!({ "product_id": id.0, "price": price.to_string() })),
            "success",
        ));
        if schedule {
            self.schedule_advance(inner);
        }
        Ok(())
    }

    /// The single Running state, if any.
    pub fn get_active_auction(&self) -> Option<AuctionState> {
        let inner = self.inner.lock().expect("lock");
        inner
            .active
            .and_then(|id| inner.auctions.get(&id))
            .filter(|state| state.is_running())
            .cloned()
    }

    /// Snapshot of any known auction state, running or finished.
    pub fn get_status(&self, id: ProductId) -> Option<AuctionState> {
        self.inner.lock().expect("lock").auctions.get(&id).cloned()
    }

    /// Admits eligible lots to the queue: auctionable, stock > 0, scheduled on
    /// or before today. Ineligible ids are silently dropped.
    pub fn add_to_queue(&self, ids: &[ProductId]) -> Result<(), EngineError> {
        let today = Utc::now().date_naive();
        let eligible = self.products.find_eligible_for_queue(ids, today)?;
        let mut inner = self.inner.lock().expect("lock");
        let mut added = 0usize;
        for id in &eligible {
            if inner.queue.push_back(*id) {
                added += 1;
            }
        }
        info!(
            "queue add requested={} eligible={} added={}",
            ids.len(),
            eligible.len(),
            added
        );
        self.audit.emit(&AuditEvent::now(
            "operator",
            "queue_add",
            Some(serde_json::json!({
                "requested": ids.len(),
                "added": added,
            })),
            "success",
        ));
        Ok(())
    }

    /// Idempotent removal; returns whether the id was queued.
    pub fn remove_from_queue(&self, id: ProductId) -> bool {
        let removed = self.inner.lock().expect("lock").queue.remove(id);
        if removed {
            info!("queue remove product_id={}", id);
            self.audit.emit(&AuditEvent::now(
                "operator",
                "queue_remove",
                Some(serde_json::json!({ "product_id": id.0 })),
                "success",
            ));
        }
        removed
    }

    /// Pending lots in auction order.
    pub fn queue_ids(&self) -> Vec<ProductId> {
        self.inner.lock().expect("lock").queue.ids()
    }

    /// Turns auto-advance on and, if no clock is running, starts the head of
    /// the queue immediately.
    pub fn start_queue_processing(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        inner.auto_advance = true;
        self.audit
            .emit(&AuditEvent::now("operator", "queue_process", None, "success"));
        if !inner.has_running() && inner.advance_task.is_none() {
            self.advance_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Forces any Running auction to TimedOut, cancels a pending auto-advance,
    /// and advances the queue immediately.
    pub fn force_next(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock");
        if let Some(task) = inner.advance_task.take() {
            task.abort();
        }
        if let Some(id) = inner.active {
            if inner.has_running() {
                self.finish_timed_out(&mut inner, id, "operator", false)?;
            }
        }
        self.audit
            .emit(&AuditEvent::now("operator", "force_next", None, "success"));
        self.advance_locked(&mut inner)
    }

    /// Whether the engine advances the queue on its own after each run.
    pub fn auto_advance_enabled(&self) -> bool {
        self.inner.lock().expect("lock").auto_advance
    }

    fn advance_locked(&self, inner: &mut EngineInner) -> Result<(), EngineError> {
        if inner.has_running() {
            // A stale timer may still fire after a force-next; nothing to do.
            return Ok(());
        }
        match inner.queue.pop_front() {
            Some(next) => {
                info!("advancing queue product_id={}", next);
                self.start_locked(inner, next).map(|_| ())
            }
            None => {
                inner.auto_advance = false;
                info!("queue empty, auto-advance disabled");
                Ok(())
            }
        }
    }

    /// Deferred queue advance after the cool-down. Aborted by a later
    /// `force_next` or replaced by the next scheduling.
    fn schedule_advance(&self, inner: &mut EngineInner) {
        if !inner.auto_advance {
            return;
        }
        if let Some(task) = inner.advance_task.take() {
            task.abort();
        }
        let Some(engine) = self.weak.upgrade() else {
            return;
        };
        let cooldown = self.config.advance_cooldown;
        inner.advance_task = Some(tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            engine.advance_after_cooldown();
        }));
    }

    fn advance_after_cooldown(&self) {
        let mut inner = self.inner.lock().expect("lock");
        inner.advance_task = None;
        if let Err(e) = self.advance_locked(&mut inner) {
            error!("queue advance failed: {}", e);
        }
    }

    /// Aborts any pending auto-advance. Call on shutdown.
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.lock().expect("lock").advance_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::broadcast::{AuctionEvent, InMemoryBroadcaster};
    use crate::repository::InMemoryProductStore;

    fn init_log() {
        let _ = env_logger::try_init();
    }

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn product(id: u64, stock: u32) -> Product {
        Product {
            id: ProductId(id),
            name: format!("Lot {id}"),
            seller_id: UserId(70),
            start_price: d("100"),
            min_price: d("50"),
            stock,
            auctionable: true,
            auction_date: Utc::now().date_naive(),
        }
    }

    struct Harness {
        engine: Arc<AuctionEngine>,
        store: Arc<InMemoryProductStore>,
        broadcaster: InMemoryBroadcaster,
        audit: InMemoryAuditSink,
    }

    fn harness_with(products: Vec<Product>, config: EngineConfig) -> Harness {
        init_log();
        let store = Arc::new(InMemoryProductStore::with_products(products));
        let broadcaster = InMemoryBroadcaster::new();
        let audit = InMemoryAuditSink::new();
        let engine = AuctionEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(broadcaster.clone()),
            Arc::new(audit.clone()),
            config,
        );
        Harness {
            engine,
            store,
            broadcaster,
            audit,
        }
    }

    fn harness(products: Vec<Product>) -> Harness {
        harness_with(products, EngineConfig::default())
    }

    #[test]
    fn start_sets_running_at_start_price() {
        let h = harness(vec![product(1, 5)]);
        let state = h.engine.start_auction(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::Running);
        assert_eq!(state.current_price, d("100"));
        assert_eq!(state.min_price, d("50"));
        let active = h.engine.get_active_auction().unwrap();
        assert_eq!(active.product_id, ProductId(1));
        assert!(matches!(
            h.broadcaster.events().as_slice(),
            [AuctionEvent::AuctionStarted { .. }]
        ));
    }

    #[test]
    fn start_unknown_product_errors() {
        let h = harness(vec![]);
        let err = h.engine.start_auction(ProductId(9)).unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound(ProductId(9))));
        assert!(h.engine.get_active_auction().is_none());
    }

    #[test]
    fn start_while_another_running_errors() {
        let h = harness(vec![product(1, 5), product(2, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        let err = h.engine.start_auction(ProductId(2)).unwrap_err();
        assert!(matches!(err, EngineError::AuctionInProgress(ProductId(1))));
    }

    #[test]
    fn bid_wins_at_clock_price_and_persists_one_sale() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 2)
            .unwrap();
        let BidOutcome::Won { price } = outcome else {
            panic!("expected win, got {outcome:?}");
        };
        assert!(price <= d("100") && price >= d("50"));

        let state = h.engine.get_status(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::Sold);
        assert_eq!(state.final_price, Some(price));
        assert_eq!(state.buyer_id, Some(UserId(2)));
        assert_eq!(state.buyer_name.as_deref(), Some("florist"));

        assert_eq!(h.store.product(ProductId(1)).unwrap().stock, 3);
        let sales = h.store.sales();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].quantity, 2);
        assert_eq!(sales[0].unit_price, price);
        assert_eq!(sales[0].total, price * d("2"));
        assert_eq!(sales[0].seller_id, UserId(70));

        let last = h.broadcaster.events().pop().unwrap();
        let AuctionEvent::AuctionResult(result) = last else {
            panic!("expected result event, got {last:?}");
        };
        assert!(result.sold);
        assert_eq!(result.price, price);
        assert_eq!(result.quantity, Some(2));
        assert_eq!(result.product_name.as_deref(), Some("Lot 1"));
    }

    #[test]
    fn bid_over_stock_is_rejected_and_leaves_everything_unchanged() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 10)
            .unwrap();
        assert_eq!(
            outcome,
            BidOutcome::Rejected(BidRejection::InsufficientStock)
        );
        let state = h.engine.get_status(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::Running);
        assert!(state.buyer_id.is_none());
        assert!(state.final_price.is_none());
        assert_eq!(h.store.product(ProductId(1)).unwrap().stock, 5);
        assert!(h.store.sales().is_empty());
    }

    #[test]
    fn second_bid_after_win_is_already_sold() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        assert!(h
            .engine
            .place_bid(ProductId(1), UserId(2), "first", 1)
            .unwrap()
            .is_won());
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(3), "second", 1)
            .unwrap();
        assert_eq!(outcome, BidOutcome::Rejected(BidRejection::AlreadySold));
        assert_eq!(h.store.sales().len(), 1);
    }

    #[test]
    fn bid_on_unknown_or_inactive_auction_is_rejected() {
        let h = harness(vec![product(1, 5)]);
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(2), "early", 1)
            .unwrap();
        assert_eq!(outcome, BidOutcome::Rejected(BidRejection::NotFound));

        h.engine.start_auction(ProductId(1)).unwrap();
        assert!(h.engine.timeout_auction(ProductId(1)).unwrap());
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(2), "late", 1)
            .unwrap();
        assert_eq!(outcome, BidOutcome::Rejected(BidRejection::NotActive));
    }

    #[test]
    fn timeout_publishes_unsold_result() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        assert!(h.engine.timeout_auction(ProductId(1)).unwrap());
        let state = h.engine.get_status(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::TimedOut);
        assert!(h.engine.get_active_auction().is_none());

        let last = h.broadcaster.events().pop().unwrap();
        let AuctionEvent::AuctionResult(result) = last else {
            panic!("expected result event, got {last:?}");
        };
        assert!(!result.sold);
        assert!(result.buyer_name.is_none());

        // Timing out again is a no-op.
        assert!(!h.engine.timeout_auction(ProductId(1)).unwrap());
    }

    #[test]
    fn selling_out_clears_auctionable_and_does_not_requeue() {
        let h = harness(vec![product(1, 2)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        assert!(h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 2)
            .unwrap()
            .is_won());
        let stored = h.store.product(ProductId(1)).unwrap();
        assert_eq!(stored.stock, 0);
        assert!(!stored.auctionable);
        assert!(h.engine.queue_ids().is_empty());
    }

    #[test]
    fn partial_sale_requeues_lot_at_the_front() {
        let h = harness(vec![product(1, 5), product(2, 5)]);
        h.engine.add_to_queue(&[ProductId(2)]).unwrap();
        h.engine.start_auction(ProductId(1)).unwrap();
        assert!(h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 2)
            .unwrap()
            .is_won());
        assert_eq!(h.engine.queue_ids(), vec![ProductId(1), ProductId(2)]);
    }

    #[test]
    fn restart_after_timeout_resets_the_clock() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        h.engine.timeout_auction(ProductId(1)).unwrap();
        let state = h.engine.start_auction(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::Running);
        assert_eq!(state.current_price, d("100"));
        assert!(state.buyer_id.is_none());
    }

    struct FailingSales;

    impl SaleRecorder for FailingSales {
        fn insert(&self, _sale: SaleRecord) -> Result<(), EngineError> {
            Err(EngineError::Storage("sale store unreachable".into()))
        }
    }

    #[test]
    fn persistence_failure_rolls_bid_back_to_running() {
        init_log();
        let store = Arc::new(InMemoryProductStore::with_products(vec![product(1, 5)]));
        let engine = AuctionEngine::new(
            store.clone(),
            Arc::new(FailingSales),
            Arc::new(InMemoryBroadcaster::new()),
            Arc::new(InMemoryAuditSink::new()),
            EngineConfig::default(),
        );
        engine.start_auction(ProductId(1)).unwrap();
        let err = engine
            .place_bid(ProductId(1), UserId(2), "florist", 1)
            .unwrap_err();
        assert!(matches!(err, EngineError::Storage(_)));
        let state = engine.get_status(ProductId(1)).unwrap();
        assert_eq!(state.phase, AuctionPhase::Running);
        assert!(state.buyer_id.is_none());
        assert!(state.final_price.is_none());
        assert_eq!(store.product(ProductId(1)).unwrap().stock, 5);
    }

    #[test]
    fn queue_admission_filters_ineligible_lots() {
        let today = Utc::now().date_naive();
        let mut future = product(3, 5);
        future.auction_date = today.succ_opt().unwrap();
        let mut flagged_off = product(4, 5);
        flagged_off.auctionable = false;
        let h = harness(vec![product(1, 5), product(2, 0), future, flagged_off]);
        h.engine
            .add_to_queue(&[
                ProductId(1),
                ProductId(2),
                ProductId(3),
                ProductId(4),
                ProductId(1), // duplicate
                ProductId(99), // unknown
            ])
            .unwrap();
        assert_eq!(h.engine.queue_ids(), vec![ProductId(1)]);
    }

    #[test]
    fn remove_from_queue_is_idempotent() {
        let h = harness(vec![product(1, 5)]);
        h.engine.add_to_queue(&[ProductId(1)]).unwrap();
        assert!(h.engine.remove_from_queue(ProductId(1)));
        assert!(!h.engine.remove_from_queue(ProductId(1)));
    }

    #[test]
    fn force_next_times_out_current_and_starts_next() {
        let h = harness(vec![product(1, 5), product(2, 5)]);
        h.engine.add_to_queue(&[ProductId(2)]).unwrap();
        h.engine.start_auction(ProductId(1)).unwrap();
        h.engine.force_next().unwrap();
        assert_eq!(
            h.engine.get_status(ProductId(1)).unwrap().phase,
            AuctionPhase::TimedOut
        );
        let active = h.engine.get_active_auction().unwrap();
        assert_eq!(active.product_id, ProductId(2));
        assert!(h.engine.queue_ids().is_empty());
    }

    #[test]
    fn ticks_are_monotonic_and_floored() {
        let h = harness_with(
            vec![product(1, 5)],
            EngineConfig {
                auction_duration: Duration::from_millis(200),
                ..EngineConfig::default()
            },
        );
        h.engine.start_auction(ProductId(1)).unwrap();
        let mut last = d("100");
        for _ in 0..6 {
            std::thread::sleep(Duration::from_millis(50));
            match h.engine.tick_price().unwrap() {
                Some(price) => {
                    assert!(price <= last, "price must not increase");
                    assert!(price >= d("50"), "price must not drop below the floor");
                    last = price;
                }
                None => break, // timed out, clock gone
            }
        }
        assert_eq!(
            h.engine.get_status(ProductId(1)).unwrap().phase,
            AuctionPhase::TimedOut
        );
        assert_eq!(
            h.engine.get_status(ProductId(1)).unwrap().current_price,
            d("50")
        );
    }

    #[test]
    fn bid_settles_at_or_below_last_tick() {
        let h = harness(vec![product(1, 5)]);
        h.engine.start_auction(ProductId(1)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let ticked = h.engine.tick_price().unwrap().unwrap();
        let outcome = h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 1)
            .unwrap();
        let BidOutcome::Won { price } = outcome else {
            panic!("expected win");
        };
        assert!(price <= ticked);
        assert!(price >= d("50"));
    }

    #[tokio::test]
    async fn auto_advance_moves_to_next_lot_after_cooldown() {
        let h = harness_with(
            vec![product(1, 5), product(2, 5)],
            EngineConfig {
                advance_cooldown: Duration::from_millis(20),
                ..EngineConfig::default()
            },
        );
        h.engine
            .add_to_queue(&[ProductId(1), ProductId(2)])
            .unwrap();
        h.engine.start_queue_processing().unwrap();
        assert_eq!(
            h.engine.get_active_auction().unwrap().product_id,
            ProductId(1)
        );
        assert!(h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 5)
            .unwrap()
            .is_won());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            h.engine.get_active_auction().unwrap().product_id,
            ProductId(2)
        );
    }

    #[tokio::test]
    async fn empty_queue_turns_auto_advance_off() {
        let h = harness_with(
            vec![product(1, 5)],
            EngineConfig {
                advance_cooldown: Duration::from_millis(10),
                ..EngineConfig::default()
            },
        );
        h.engine.add_to_queue(&[ProductId(1)]).unwrap();
        h.engine.start_queue_processing().unwrap();
        assert!(h.engine.auto_advance_enabled());
        h.engine.timeout_auction(ProductId(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.engine.get_active_auction().is_none());
        assert!(!h.engine.auto_advance_enabled());
    }

    #[tokio::test]
    async fn force_next_cancels_pending_auto_advance() {
        let h = harness_with(
            vec![product(1, 5), product(2, 5), product(3, 5)],
            EngineConfig {
                advance_cooldown: Duration::from_millis(100),
                ..EngineConfig::default()
            },
        );
        h.engine
            .add_to_queue(&[ProductId(1), ProductId(2), ProductId(3)])
            .unwrap();
        h.engine.start_queue_processing().unwrap();
        assert!(h
            .engine
            .place_bid(ProductId(1), UserId(2), "florist", 5)
            .unwrap()
            .is_won());
        // A deferred advance is pending; preempt it.
        h.engine.force_next().unwrap();
        assert_eq!(
            h.engine.get_active_auction().unwrap().product_id,
            ProductId(2)
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        // The cancelled timer must not have advanced past lot 2.
        assert_eq!(
            h.engine.get_active_auction().unwrap().product_id,
            ProductId(2)
        );
        assert_eq!(h.engine.queue_ids(), vec![ProductId(3)]);
    }

    #[test]
    fn operations_leave_an_audit_trail() {
        let h = harness(vec![product(1, 5)]);
        h.engine.add_to_queue(&[ProductId(1)]).unwrap();
        h.engine.start_auction(ProductId(1)).unwrap();
        h.engine
            .place_bid(ProductId(1), UserId(2), "florist", 1)
            .unwrap();
        let actions: Vec<String> = h.audit.events().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["queue_add", "auction_start", "bid_place"]);
    }
}

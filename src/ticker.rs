//! Background price ticker: one continuous loop driving the clock.
//!
//! Every tick asks the engine to recompute and publish the running auction's
//! price; the engine itself handles the timeout when the floor is reached.
//! A failed tick is logged and the loop keeps going. The loop exits only when
//! the shutdown signal flips.

use crate::engine::AuctionEngine;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Ticker timing knobs. Tests shrink these; production uses the defaults.
#[derive(Clone, Debug)]
pub struct TickerConfig {
    /// Grace period before the first tick, so dependent services can come up.
    pub startup_delay: Duration,
    /// Cadence of price recomputation.
    pub tick_interval: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Runs the ticker until `shutdown` signals. Spawn with `tokio::spawn`.
pub async fn run_price_ticker(
    engine: Arc<AuctionEngine>,
    config: TickerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(config.startup_delay) => {}
        _ = shutdown.changed() => {
            info!("price ticker stopping before first tick");
            return;
        }
    }
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(
        "price ticker running interval_ms={}",
        config.tick_interval.as_millis()
    );
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = engine.tick_price() {
                    warn!("price tick failed: {}", e);
                }
            }
            _ = shutdown.changed() => {
                info!("price ticker stopping");
                return;
            }
        }
    }
}

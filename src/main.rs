//! HTTP server for the auction engine.
//!
//! Endpoints: health, auction start/bid/status, queue management, force-next,
//! and a WebSocket event feed. Seeds products from `PRODUCTS_FILE` (JSON) when
//! set, otherwise a small demo catalog.

use flora_clock_engine::{
    api, run_price_ticker, AuctionEngine, ChannelBroadcaster, EngineConfig,
    InMemoryProductStore, Product, ProductCatalogFile, ProductId, StdoutAuditSink, TickerConfig,
    UserId,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn demo_catalog() -> Vec<Product> {
    let today = chrono::Utc::now().date_naive();
    let lot = |id: u64, name: &str, start: &str, min: &str, stock: u32| Product {
        id: ProductId(id),
        name: name.into(),
        seller_id: UserId(1),
        start_price: start.parse().expect("demo price"),
        min_price: min.parse().expect("demo price"),
        stock,
        auctionable: true,
        auction_date: today,
    };
    vec![
        lot(1, "Tulip crate (red, 50x)", "100", "50", 5),
        lot(2, "Rose bundle (20x)", "80", "35", 8),
        lot(3, "Orchid tray (12x)", "120", "60", 3),
    ]
}

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let products = match std::env::var("PRODUCTS_FILE") {
        Ok(path) => ProductCatalogFile::new(&path)
            .load()
            .expect("read products file")
            .unwrap_or_else(demo_catalog),
        Err(_) => demo_catalog(),
    };
    let store = Arc::new(InMemoryProductStore::with_products(products));

    let broadcaster = ChannelBroadcaster::new(256);
    let engine = AuctionEngine::new(
        store.clone(),
        store,
        Arc::new(broadcaster.clone()),
        Arc::new(StdoutAuditSink),
        EngineConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tokio::spawn(run_price_ticker(
        engine.clone(),
        TickerConfig::default(),
        shutdown_rx,
    ));

    let state = api::AppState::new(engine.clone(), &broadcaster);
    let app = api::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    eprintln!("listening on http://{}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("serve");

    let _ = shutdown_tx.send(true);
    engine.shutdown();
    let _ = ticker.await;
}

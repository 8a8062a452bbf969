//! REST + WebSocket surface over the auction engine.
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with
//! `into_make_service()`. Business rejections come back as 200 with
//! `{sold:false, reason}`; infrastructure failures map to 5xx.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Path, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::warn;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::broadcast::{AuctionEvent, ChannelBroadcaster};
use crate::engine::{AuctionEngine, BidOutcome};
use crate::error::EngineError;
use crate::types::{ProductId, UserId};

/// Shared app state: the engine plus the event channel the WS feed drains.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuctionEngine>,
    events: broadcast::Sender<AuctionEvent>,
}

impl AppState {
    pub fn new(engine: Arc<AuctionEngine>, broadcaster: &ChannelBroadcaster) -> Self {
        Self {
            engine,
            events: broadcaster.sender(),
        }
    }
}

/// Builds the router with state. Returns `Router<()>` so you can call
/// `.into_make_service()` for `axum::serve`.
pub fn create_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/health", get(health))
        .route("/auctions/start", post(start_auction))
        .route("/auctions/active", get(active_auction))
        .route("/auctions/bid", post(place_bid))
        .route("/auctions/force-next", post(force_next))
        .route("/auctions/:id", get(auction_status))
        .route("/queue", get(queue_list))
        .route("/queue/add", post(queue_add))
        .route("/queue/remove", post(queue_remove))
        .route("/queue/process", post(queue_process))
        .route("/ws/auction-events", get(ws_auction_events))
        .layer(Extension(state))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn error_response(e: EngineError) -> Response {
    let status = match &e {
        EngineError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AuctionInProgress(_) => StatusCode::CONFLICT,
        EngineError::Storage(_) | EngineError::Broadcast(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

#[derive(serde::Deserialize)]
struct StartRequest {
    product_id: u64,
}

async fn start_auction(
    Extension(state): Extension<AppState>,
    Json(body): Json<StartRequest>,
) -> Response {
    match state.engine.start_auction(ProductId(body.product_id)) {
        Ok(auction) => (StatusCode::OK, Json(auction)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn active_auction(Extension(state): Extension<AppState>) -> Response {
    (StatusCode::OK, Json(state.engine.get_active_auction())).into_response()
}

async fn auction_status(
    Extension(state): Extension<AppState>,
    Path(id): Path<u64>,
) -> Response {
    match state.engine.get_status(ProductId(id)) {
        Some(auction) => (StatusCode::OK, Json(auction)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no auction state for product" })),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
struct BidRequest {
    product_id: u64,
    buyer_id: u64,
    buyer_name: String,
    quantity: u32,
}

async fn place_bid(
    Extension(state): Extension<AppState>,
    Json(body): Json<BidRequest>,
) -> Response {
    let outcome = state.engine.place_bid(
        ProductId(body.product_id),
        UserId(body.buyer_id),
        &body.buyer_name,
        body.quantity,
    );
    match outcome {
        Ok(BidOutcome::Won { price }) => (
            StatusCode::OK,
            Json(serde_json::json!({ "sold": true, "price": price })),
        )
            .into_response(),
        Ok(BidOutcome::Rejected(reason)) => (
            StatusCode::OK,
            Json(serde_json::json!({ "sold": false, "reason": reason })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn force_next(Extension(state): Extension<AppState>) -> Response {
    match state.engine.force_next() {
        Ok(()) => (StatusCode::OK, Json(state.engine.get_active_auction())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn queue_list(Extension(state): Extension<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "queue": state.engine.queue_ids() })),
    )
        .into_response()
}

#[derive(serde::Deserialize)]
struct QueueAddRequest {
    product_ids: Vec<u64>,
}

async fn queue_add(
    Extension(state): Extension<AppState>,
    Json(body): Json<QueueAddRequest>,
) -> Response {
    let ids: Vec<ProductId> = body.product_ids.into_iter().map(ProductId).collect();
    match state.engine.add_to_queue(&ids) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "queue": state.engine.queue_ids() })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(serde::Deserialize)]
struct QueueRemoveRequest {
    product_id: u64,
}

async fn queue_remove(
    Extension(state): Extension<AppState>,
    Json(body): Json<QueueRemoveRequest>,
) -> Response {
    let removed = state.engine.remove_from_queue(ProductId(body.product_id));
    (
        StatusCode::OK,
        Json(serde_json::json!({ "removed": removed })),
    )
        .into_response()
}

async fn queue_process(Extension(state): Extension<AppState>) -> Response {
    match state.engine.start_queue_processing() {
        Ok(()) => (StatusCode::OK, Json(state.engine.get_active_auction())).into_response(),
        Err(e) => error_response(e),
    }
}

async fn ws_auction_events(
    Extension(state): Extension<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Sends a snapshot on connect, then forwards every engine event as one JSON
/// text frame. Exits when the client hangs up or the channel closes.
async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();
    let snapshot = serde_json::json!({
        "type": "snapshot",
        "active": state.engine.get_active_auction(),
        "queue": state.engine.queue_ids(),
    });
    if socket.send(Message::Text(snapshot.to_string())).await.is_err() {
        return;
    }
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("ws subscriber lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

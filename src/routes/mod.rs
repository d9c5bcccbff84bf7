//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the collaboration websocket endpoints and the thin REST state
//! boundary under a single Axum router. CORS stays permissive: the engine
//! runs behind the workspace's own frontend during local development.

pub mod state_api;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/notes/{id}", get(ws::handle_ws_note))
        .route("/ws/canvas/{id}", get(ws::handle_ws_canvas))
        .route(
            "/notes/{id}/content",
            get(state_api::get_note_content).put(state_api::put_note_content),
        )
        .route(
            "/canvas/boards/{id}/state",
            get(state_api::get_canvas_state).put(state_api::put_canvas_state),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

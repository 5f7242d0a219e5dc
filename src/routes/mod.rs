use axum::Router;

use crate::state::SharedState;

/// Swagger UI.
pub mod docs;
/// Health check.
pub mod health;
/// Planning-poker session endpoints.
pub mod poker;
/// Session event streams.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(poker::router())
        .merge(docs::router())
        .with_state(state)
}

//! Library crate for planning-poker-back, exposing the session engine to the binaries and tests.

pub mod config;
/// Persistence: session documents, stores and the board directory.
pub mod dao;
/// Client-facing payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Engine operations, timers, SSE and storage supervision.
pub mod services;
/// Shared application state and the session domain.
pub mod state;

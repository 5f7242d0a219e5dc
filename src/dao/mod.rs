/// Card-domain and board-membership collaborator.
pub mod board_directory;
/// Persisted document definitions.
pub mod models;
/// Session persistence with normalization on read.
pub mod session;
/// Session document storage backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;

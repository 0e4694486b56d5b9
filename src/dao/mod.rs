/// Lobby persistence backends and the transaction boundary they expose.
pub mod lobby_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;

//! Postgres persistence for memory items and the embedding cache.

pub mod db;
pub mod embedding_cache;
pub mod memory_items;
pub mod models;
pub mod schema;
pub mod vector;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

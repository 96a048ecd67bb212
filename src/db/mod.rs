// src/db/mod.rs
//! Public façade for DB helpers.

pub mod connection;
pub mod index_cache;
pub mod writer;

pub use connection::{init_database, open_db_connection};
pub use index_cache::IndexCache;
pub use writer::{BatchInsert, DbError, MatchWriter};

//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and conversions
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and the catalog / user storages

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{DbDataServer, DbUser};
pub use schema::SQLITE_INIT;
pub use sqlite::{CatalogStorage, SqlitePool, UserStorage, connect, init_schema};

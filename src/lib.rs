pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod service;
pub mod types;

pub use error::BridgeError;
pub use router::{BridgeState, bridge_router};

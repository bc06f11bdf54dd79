//! Deimos - analysis & messaging engine for security assessment orchestration
//!
//! A single-threaded JSON request/response server behind an alias
//! whitelist, a tamper-evident result store, and an online-trainable
//! recommendation engine that turns scan history into "what to run
//! next" guidance. Scanner adapters and report formats live outside
//! this crate and talk to it over the socket.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod record;
pub mod report;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use auth::AliasRegistry;
pub use config::EngineConfig;
pub use dispatch::Dispatcher;
pub use engine::RecommendEngine;
pub use error::{EngineError, Result};
pub use record::ScanRecord;
pub use store::ResultStore;
pub use transport::{Endpoint, ServeOptions};

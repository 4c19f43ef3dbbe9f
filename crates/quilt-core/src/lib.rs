//! # quilt-core
//!
//! Core crate for the Quilt market-data unification layer, providing:
//!
//! - **Types** (`types`) — markets, channels, normalized market-data records
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `FeedError` via thiserror
//! - **Flow control** (`flow`) — throttle / debounce / batch call-rate wrappers
//! - **Order book** (`book`) — incremental snapshot + diff reconstruction
//! - **Time utilities** (`time_util`) — epoch timestamps for records
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod book;
pub mod config;
pub mod error;
pub mod flow;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;

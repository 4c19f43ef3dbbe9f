//! Typed error definitions for the Quilt system.
//!
//! Provides [`FeedError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result` at the binary edges.

use thiserror::Error;

/// Domain-specific errors for the Quilt system.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Transport connection, handshake, or send error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected wire payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// Out-of-band order-book snapshot fetch error.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Subscription management error (e.g. child construction failure).
    #[error("subscribe error: {0}")]
    Subscribe(String),
}

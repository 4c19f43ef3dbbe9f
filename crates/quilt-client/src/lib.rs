//! # quilt-client
//!
//! Connection and subscription management for normalized market-data feeds.
//!
//! ## Architecture
//!
//! A [`client::FeedClient`] owns exactly one underlying transport connection
//! and the per-channel subscription sets. It drives connect / reconnect /
//! close, replays subscriptions after every reconnect, and delegates wire
//! encoding and decoding to a venue-specific [`adapter::VenueAdapter`].
//! A [`watchdog::Watchdog`] forces reconnection when the feed goes silent.
//!
//! For venues that cap subscriptions per connection,
//! [`multiplex::MultiFeedClient`] maps each market to its own dedicated
//! client, gating connection creation through a counting semaphore plus an
//! inter-creation delay ([`transport::gate`]).
//!
//! ## Shared infrastructure
//!
//! - [`transport`] — the wire-socket contract plus the default
//!   tokio-tungstenite implementation
//! - [`adapter`] — the venue adapter contract
//! - [`venues`] — reference adapter implementations

pub mod adapter;
pub mod client;
#[cfg(test)]
pub(crate) mod testkit;
pub mod multiplex;
pub mod transport;
pub mod venues;
pub mod watchdog;

pub use adapter::VenueAdapter;
pub use client::{ClientEvent, ClientOptions, FeedClient, ReconnectPolicy};
pub use multiplex::{ChildFactory, MultiFeedClient, MuxEvent, MuxOptions};
pub use transport::{Conn, Transport, TransportEvent};

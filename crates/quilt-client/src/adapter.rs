//! Venue adapter contract.
//!
//! One adapter per venue translates between that venue's wire format and
//! the normalized vocabulary. The client core depends only on this trait —
//! classic strategy substitution, no venue-specific code upstream of it.

use async_trait::async_trait;
use quilt_core::error::FeedError;
use quilt_core::types::{Capabilities, Channel, Market, MarketData};

/// A decoded record tagged with the venue-native market id it belongs to.
///
/// The client maps the id back to a [`Market`] through its subscription
/// sets, so adapters never need to track which markets are active.
pub type Decoded = (String, MarketData);

/// Wire-format strategy for one venue.
#[async_trait]
pub trait VenueAdapter: Send + 'static {
    /// Venue name for logs.
    fn name(&self) -> &str;

    /// Channels this venue supports. Recorded once at client construction;
    /// subscribe calls for anything else become no-ops before reaching the
    /// adapter.
    fn capabilities(&self) -> Capabilities;

    /// Wire payload subscribing `market` to `channel`, or `None` when the
    /// venue has no such stream. Returning `None` is the documented no-op
    /// for unsupported channels — never panic here.
    fn subscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String>;

    /// Wire payload unsubscribing `market` from `channel`.
    fn unsubscribe_request(&mut self, channel: Channel, market: &Market) -> Option<String>;

    /// Decode one inbound payload into zero or more tagged records.
    ///
    /// Non-data frames (acks, pongs, heartbeats) decode to an empty vec.
    /// Errors are surfaced as `Error` events by the client; they never tear
    /// the connection down.
    fn decode(&mut self, raw: &str) -> Result<Vec<Decoded>, FeedError>;

    /// Called immediately before the transport is opened.
    async fn before_connect(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    /// Called immediately before the client tears the connection down.
    async fn before_close(&mut self) {}
}

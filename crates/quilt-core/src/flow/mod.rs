//! Flow-control primitives governing how fast a wrapped callback runs.
//!
//! Venues disconnect clients that subscribe too fast or hammer their REST
//! endpoints, so every outbound burst in the system goes through one of
//! these wrappers:
//!
//! - [`Throttle`] — first call runs immediately, the rest drain one per
//!   `delay` in FIFO order.
//! - [`Debounce`] — only the last call in a quiet window runs.
//! - [`Batch`] — calls collect into a list and run chunked once the window
//!   closes.
//!
//! Each primitive owns a background tokio task; the handle is cheap to
//! clone and `cancel()` discards pending work without killing the task, so
//! the primitive is immediately reusable.

mod batch;
mod debounce;
mod throttle;

pub use batch::Batch;
pub use debounce::Debounce;
pub use throttle::Throttle;

/// Calls and cancels travel on one channel so their relative order is
/// preserved: a cancel never outruns the calls issued before it.
pub(crate) enum FlowMsg<T> {
    Call(T),
    Cancel,
}

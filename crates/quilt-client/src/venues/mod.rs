//! Reference venue adapters.
//!
//! Production deployments plug in one adapter per venue; this module ships
//! the Binance spot adapter so the framework is runnable end to end out of
//! the box.

pub mod binance;

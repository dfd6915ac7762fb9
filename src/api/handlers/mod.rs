//! HTTP handlers for the marketplace surface (§6).

mod figgie;

pub use figgie::*;

//! Wire types for the sweeps game round and realtime sync protocol.
//!
//! Everything in this crate is plain data: HTTP request/response bodies,
//! realtime channel envelopes, and the constants both ends agree on.

pub mod api;
pub mod casino;
pub mod realtime;

pub use casino::*;

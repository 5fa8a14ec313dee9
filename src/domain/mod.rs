//! Domain layer for logship.
//!
//! Canonical types shared across modules:
//! - `SocketAddress`: a scheme-qualified bind/forward address
//! - `Scheme`: the transports the daemon speaks

pub mod address;

pub use address::{AddressError, Scheme, SocketAddress};

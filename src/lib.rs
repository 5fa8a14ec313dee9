#![deny(warnings, rust_2018_idioms)]
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::missing_errors_doc,      // Internal API
    clippy::missing_panics_doc,      // Internal API
    clippy::module_name_repetitions, // e.g. ServerError in server module
    clippy::must_use_candidate,      // Annotated selectively on critical APIs
    clippy::doc_markdown             // Internal API
)]

pub mod app;
pub mod domain;
pub mod forwarder;
pub mod parser;
pub mod resolver;
pub mod sender;
pub mod server;
pub mod status;

// Re-export main types for easy access
pub use app::{App, Config};
pub use forwarder::{Forwarder, ForwarderConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

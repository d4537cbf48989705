//! Web interface
//!
//! Read-only HTTP query surface consumed by the dashboard and other
//! external readers.

pub mod web_server;

pub use web_server::WebServer;

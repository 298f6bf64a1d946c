//! Configuration loading for the oaproxy gateway.
//!
//! Uses figment to layer sources: built-in defaults, then an optional JSON
//! config file, then environment variables (highest precedence).

pub mod schema;

pub use schema::Config;

//! Outbound HTTP client for the Anthropic Messages API.

pub mod client;

pub use client::{UpstreamClient, UpstreamSettings};

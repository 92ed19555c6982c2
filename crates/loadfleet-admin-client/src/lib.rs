//! Client library for the LoadFleet control plane.
//!
//! Wraps the HTTP API served by `loadfleet-control-plane`.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::HttpClient;

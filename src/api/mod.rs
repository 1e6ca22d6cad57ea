//! HTTP API Module
//!
//! Read-only status API for a running election node.

mod http;

pub use http::{HttpServer, HealthResponse};

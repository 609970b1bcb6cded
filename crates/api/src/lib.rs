//! HTTP API: routing, middleware and request/response mapping for the
//! identity and access service.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod server;

// Layered boundaries: use cases and ports in app, adapters in infra
pub mod app;
pub mod infra;

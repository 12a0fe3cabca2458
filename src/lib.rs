pub mod api;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod gateway_util;
pub mod inference;
pub mod observability;
pub mod probe;
pub mod routes;
pub mod server;
pub mod state;
pub mod streaming;

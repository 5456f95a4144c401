//! Broadcast server: swap records over WebSocket and SSE, prices and pools
//! as JSON.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod server;

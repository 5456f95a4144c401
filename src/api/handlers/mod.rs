//! HTTP handlers for API endpoints.

pub mod events;
pub mod health;
pub mod pools;
pub mod prices;
pub mod stream;

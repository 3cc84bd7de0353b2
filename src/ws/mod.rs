//! WebSocket transport: wire protocol, connection hub, upgrade handler

pub mod handler;
pub mod hub;
pub mod protocol;

pub use hub::ConnectionHub;

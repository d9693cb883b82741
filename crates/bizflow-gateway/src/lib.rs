//! Reviewer-facing gateway: a WebSocket that streams workflow events and
//! accepts submissions, approval responses and cancellations, plus a few
//! read-only HTTP endpoints.

pub mod connection;
pub mod router;
pub mod server;

pub use connection::ConnectionManager;
pub use router::{InboundMessage, MessageRouter, OutboundMessage};
pub use server::GatewayServer;

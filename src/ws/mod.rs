//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The endpoint at `/ws` streams [`crate::domain::MatchEvent`]s for the
//! matches a client subscribes to.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;

//! Canonical chat types for terra.
//!
//! These types define the two wire surfaces of the chat relay: the
//! client-to-relay request accepted on `POST /proxy`, and the
//! relay-to-upstream completion request. Both sides of the system
//! (the relay server and the assistant client) depend on this crate so
//! the transcript shape is defined exactly once.

pub mod chat;

pub use chat::{
    ChatRequest, CompletionRequest, ErrorBody, Role, Turn, assistant_content,
};

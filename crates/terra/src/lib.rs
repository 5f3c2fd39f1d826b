//! Terra backend library.
//!
//! This library provides the chat relay that fronts the upstream
//! chat-completion endpoint for the country directory's travel assistant.

pub mod api;
pub mod upstream;

//! Travel assistant client library.
//!
//! This crate holds the stateful, client-side half of the chat relay: the
//! [`ConversationStore`] that owns the visible transcript and enforces the
//! single-flight submit discipline, and the [`HttpRelayClient`] it talks
//! through. It also carries the country catalog query and the signed-in
//! profile state that the directory UI renders.

pub mod account;
pub mod catalog;
pub mod conversation;
pub mod relay;

pub use account::{AccountState, Profile};
pub use catalog::{CatalogError, Country, CountryCatalog};
pub use conversation::{ContextMode, ConversationStore};
pub use relay::{HttpRelayClient, RelayError, RelayTransport};

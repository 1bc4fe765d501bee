//! Offline-tolerant client cache for kanban boards, tasks and notifications.
//!
//! The stores in [`store`] mirror an authoritative remote store, fall back
//! to local mutations when it is unreachable, and persist every committed
//! change to a [`store::PersistedCache`]. [`client::BoardSync`] wires them
//! together over a [`transport::Transport`].

pub mod client;
pub mod config;
pub mod errors;
pub mod logging;
pub mod store;
pub mod transport;

//! Client-held domain stores kept in sync with the remote store.
//!
//! ## Overview
//!
//! Each store owns an in-memory mirror of one entity domain, persists it to
//! the [`cache::PersistedCache`] after every committed change, and mediates
//! every query and mutation. Mutations go remote first; when every remote
//! candidate fails the same change is applied locally (fallback mode).
//!
//! ## Module Map
//!
//! ```text
//!   caller ──> session.rs   (SessionStore: login / register / logout)
//!                 │ starts / stops / resets
//!                 v
//!              board.rs     (BoardStore) ──fan-out──> notifications.rs
//!                 │                                     (NotificationStore)
//!                 │ FallbackChain::run()                   │
//!                 v                                        v
//!              fallback.rs ──────────> Transport <──── scheduler.rs
//!                 │ Resolution::Local                 (RefreshScheduler)
//!                 v
//!              board_ops.rs (local edits)  ──persist──> cache.rs
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | Canonical types: `Board`, `Column`, `Task`, `Notification` |
//! | `normalize` | Loose remote wire shapes and their normalization        |
//! | `flight`    | `SingleFlight` fetch gate and session `Epoch`           |
//! | `ids`       | Monotonic `<prefix><millis>` ids for local entities     |

pub mod board;
pub mod board_ops;
pub mod cache;
pub mod fallback;
pub mod flight;
pub mod ids;
pub mod models;
pub mod normalize;
pub mod notifications;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use board::BoardStore;
pub use cache::{CacheKey, MemoryCache, PersistedCache, SqliteCache};
pub use fallback::Resolution;
pub use models::{AuthOutcome, Board, Column, Identity, Notification, NotificationKind, Task};
pub use notifications::NotificationStore;
pub use scheduler::{LifecycleSignal, LifecycleSignals, RefreshToken};
pub use session::{CurrentSession, SessionStore};

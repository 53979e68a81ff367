//! upwatch-state — per-site history persistence.
//!
//! # Backends
//!
//! * [`HistoryDir`] writes `{slug}.yml` files, the format status pages and
//!   summaries read from the repository.
//! * [`StateStore`] keeps every record in one [redb](https://docs.rs/redb)
//!   database (`historyBackend: redb`), JSON values keyed by slug, with an
//!   in-memory variant for tests.
//!
//! Both implement [`HistoryStore`]. A record is only ever touched by the
//! cycle that owns its slug, so no cross-site locking is needed.

pub mod dir;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use dir::HistoryDir;
pub use error::{StateError, StateResult};
pub use store::{HistoryStore, StateStore};
pub use types::*;

//! # rowpod-cache
//!
//! Synchronized cache pods: async in-process mirrors of single-table
//! projections, with write-through updates and event hooks.
//!
//! A [`CachePod`] keeps a two-column projection of one relational table
//! (key column, value column) in memory and answers dictionary-style reads
//! from an atomically swapped snapshot. Writes go through to the backing
//! store first and touch the snapshot only on success, so the mirror never
//! claims state the store rejected.
//!
//! ## Lifecycle
//!
//! A pod moves through three states and never backwards:
//!
//! 1. **Uninitialized** - no backing store; only listener registration and
//!    introspection work.
//! 2. **Activated** - a store is bound (exactly once, ever); writes and
//!    pulls are possible but reads still refuse with `NotReady`.
//! 3. **Ready** - the first successful [`CachePod::pull`] populated the
//!    snapshot; reads answer from it from then on, even while later pulls
//!    are in flight or failing.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rowpod_cache::{CachePod, PodConfig, StatementSet};
//! use rowpod_db_memory::MemoryStore;
//!
//! let config = PodConfig::new("guild_prefixes", "guild_id", "prefix").with_statements(
//!     StatementSet::new()
//!         .with_insert("INSERT INTO guild_prefixes (guild_id, prefix) VALUES ($1, $2)")
//!         .with_update("UPDATE guild_prefixes SET prefix = $2 WHERE guild_id = $1")
//!         .with_delete("DELETE FROM guild_prefixes WHERE guild_id = $1"),
//! );
//!
//! let pod: CachePod<i64, String> = CachePod::new(config);
//! pod.activate(Arc::new(MemoryStore::new())).await?;
//! pod.pull().await?;
//!
//! pod.set(1, "!".to_string()).await?;
//! assert_eq!(pod.get(&1)?, Some("!".to_string()));
//! ```
//!
//! ## Concurrency model
//!
//! Refreshes (pull, activation) are serialized by a [`RefreshGuard`];
//! reads never touch the guard and are lock-free snapshot loads. A pod can
//! be configured to hold the guard after a failed refresh, turning repeated
//! refresh attempts into waiting instead of load on a broken store; see
//! [`CachePod::with_policy`].

pub mod config;
mod error;
pub mod events;
pub mod guard;
pub mod mapping;
mod pod;

pub use config::{PodConfig, StatementSet};
pub use error::{CacheError, CacheResult};
pub use events::{
    CacheEvent, EventDispatcher, EventListener, ListenerError, ON_ACTIVATE, ON_PULL, listener_fn,
};
pub use guard::{RefreshGuard, RefreshPermit};
pub use mapping::AsyncMapping;
pub use pod::CachePod;

// Re-export the storage boundary so pod consumers need only this crate
pub use rowpod_storage::{BackingStore, DynStore, Row, StoreError};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use rowpod_cache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{PodConfig, StatementSet};
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::events::{CacheEvent, EventListener, ListenerError, listener_fn};
    pub use crate::guard::RefreshGuard;
    pub use crate::mapping::AsyncMapping;
    pub use crate::pod::CachePod;
    pub use crate::DynStore;
}

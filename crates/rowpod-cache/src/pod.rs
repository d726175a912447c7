//! The cache pod: an in-process mirror of one table projection.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use rowpod_storage::DynStore;

use crate::config::PodConfig;
use crate::error::{CacheError, CacheResult};
use crate::events::{CacheEvent, EventDispatcher, EventListener, ON_ACTIVATE, ON_PULL};
use crate::guard::RefreshGuard;
use crate::mapping::AsyncMapping;

/// An asynchronous cache holding one two-column projection of a table.
///
/// A pod starts uninitialized: no backing store, an empty snapshot, not
/// ready. [`CachePod::activate`] binds the store (exactly once for the pod's
/// lifetime), [`CachePod::pull`] replaces the snapshot wholesale from the
/// store and flips the pod ready, and the dictionary operations then answer
/// from the snapshot while writes go through to the store first.
///
/// Reads are synchronous and lock-free; they never wait on a refresh and are
/// served from the last successfully pulled snapshot. The [`AsyncMapping`]
/// impl exposes the same operations behind a trait for generic contexts.
///
/// # Example
///
/// ```ignore
/// use rowpod_cache::{CachePod, PodConfig, StatementSet};
///
/// let config = PodConfig::new("guild_prefixes", "guild_id", "prefix").with_statements(
///     StatementSet::new()
///         .with_insert("INSERT INTO guild_prefixes (guild_id, prefix) VALUES ($1, $2)")
///         .with_update("UPDATE guild_prefixes SET prefix = $2 WHERE guild_id = $1")
///         .with_delete("DELETE FROM guild_prefixes WHERE guild_id = $1"),
/// );
///
/// let pod: CachePod<i64, String> = CachePod::new(config);
/// pod.activate(store).await?;
/// pod.pull().await?;
///
/// let prefix = pod.get_or(&guild_id, "!".to_string())?;
/// ```
pub struct CachePod<K, V> {
    config: PodConfig,
    store: OnceLock<DynStore>,
    snapshot: ArcSwap<IndexMap<K, V>>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    guard: RefreshGuard,
    events: EventDispatcher,
}

impl<K, V> CachePod<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an unbound pod with the default refresh policy.
    #[must_use]
    pub fn new(config: PodConfig) -> Self {
        Self::with_policy(config, true)
    }

    /// Creates an unbound pod with an explicit refresh failure policy.
    ///
    /// With `release_on_failure = false`, a failed pull or activation keeps
    /// the refresh guard busy until [`CachePod::reset_guard`]; further
    /// refreshes wait instead of hammering a misbehaving store.
    #[must_use]
    pub fn with_policy(config: PodConfig, release_on_failure: bool) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        Self {
            config,
            store: OnceLock::new(),
            snapshot: ArcSwap::from_pointee(IndexMap::new()),
            ready_tx,
            ready_rx,
            guard: RefreshGuard::new(release_on_failure),
            events: EventDispatcher::new(),
        }
    }

    /// Creates a pod with `store` already bound.
    ///
    /// No activation event fires; listeners registered afterwards see
    /// nothing, consistent with events never being replayed.
    #[must_use]
    pub fn with_store(config: PodConfig, store: DynStore) -> Self {
        let pod = Self::new(config);
        // A fresh OnceLock accepts exactly one value.
        let _ = pod.store.set(store);
        pod
    }

    // ==================== Introspection ====================

    /// The table this pod mirrors.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// The column whose values become cache keys.
    #[must_use]
    pub fn key_column(&self) -> &str {
        &self.config.key_column
    }

    /// The column whose values become cache values.
    #[must_use]
    pub fn value_column(&self) -> &str {
        &self.config.value_column
    }

    /// The full pod configuration.
    #[must_use]
    pub fn config(&self) -> &PodConfig {
        &self.config
    }

    /// Returns `true` once a backing store is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.store.get().is_some()
    }

    /// Returns `true` once the first successful pull has completed.
    ///
    /// Readiness is monotonic: later pull failures never clear it.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Returns `true` once any refresh has been attempted.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.guard.has_started()
    }

    /// Returns `true` while a refresh holds the guard or a failure retains it.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.guard.is_busy()
    }

    /// Frees the refresh guard after a failed refresh retained it.
    ///
    /// Only meaningful for pods created with `release_on_failure = false`.
    pub fn reset_guard(&self) {
        self.guard.reset();
    }

    /// The bound backend's name, if any.
    #[must_use]
    pub fn backend_name(&self) -> Option<&'static str> {
        self.store.get().map(|store| store.backend_name())
    }

    /// Returns the current snapshot as a cheap read-only view.
    ///
    /// The map is shared, not copied; it reflects the entries as of the last
    /// swap and never changes underneath the caller.
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexMap<K, V>> {
        self.snapshot.load_full()
    }

    // ==================== Listeners ====================

    /// Registers `listener` for the event named `event`.
    pub async fn add_listener(&self, event: impl Into<String>, listener: Arc<dyn EventListener>) {
        self.events.add_listener(event, listener).await;
    }

    /// Registers `listener` for store activation.
    pub async fn on_activate(&self, listener: Arc<dyn EventListener>) {
        self.add_listener(ON_ACTIVATE, listener).await;
    }

    /// Registers `listener` for snapshot pulls.
    pub async fn on_pull(&self, listener: Arc<dyn EventListener>) {
        self.add_listener(ON_PULL, listener).await;
    }

    // ==================== Lifecycle ====================

    /// Binds `store` as the pod's backing store.
    ///
    /// Serialized with pulls through the refresh guard. Dispatches
    /// `on_activate` with a handle to the store once bound.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::AlreadyBound` if a store is already bound; the
    /// pod keeps its original store. Returns `CacheError::Listener` if an
    /// `on_activate` listener fails; the store stays bound in that case.
    #[instrument(skip_all, fields(table = %self.config.table))]
    pub async fn activate(&self, store: DynStore) -> CacheResult<()> {
        self.activate_with(std::future::ready(Ok(store))).await
    }

    /// Binds the store produced by `make_store`, e.g. a pending pool connect.
    ///
    /// The future is awaited only after the pod is known to be unbound, so
    /// offering a store to an already-bound pod never constructs one.
    ///
    /// # Errors
    ///
    /// As [`CachePod::activate`], plus whatever error `make_store` yields.
    pub async fn activate_with<F>(&self, make_store: F) -> CacheResult<()>
    where
        F: Future<Output = CacheResult<DynStore>> + Send,
    {
        let permit = self.guard.acquire().await;
        let result = self.try_activate(make_store).await;
        permit.release(result.is_ok());
        result
    }

    async fn try_activate<F>(&self, make_store: F) -> CacheResult<()>
    where
        F: Future<Output = CacheResult<DynStore>> + Send,
    {
        if self.store.get().is_some() {
            return Err(CacheError::already_bound());
        }
        let store = make_store.await?;
        if self.store.set(store.clone()).is_err() {
            return Err(CacheError::already_bound());
        }
        info!(
            table = %self.config.table,
            backend = store.backend_name(),
            "Cache pod activated"
        );
        self.events
            .dispatch(&CacheEvent::Activated { store })
            .await?;
        Ok(())
    }

    /// Refreshes the snapshot from the backing store.
    ///
    /// Serialized with other refreshes; concurrent pulls run one at a time.
    /// Readers are never blocked and keep seeing the previous snapshot until
    /// the new one is swapped in whole. The first successful pull flips the
    /// pod ready and every pull dispatches `on_pull` afterwards.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotBound` without a store,
    /// `CacheError::KeyIntegrity` when verification finds the key column is
    /// not the table's primary key, `CacheError::Store` for backend
    /// failures, `CacheError::Codec` when a fetched key or value cannot be
    /// converted, and `CacheError::Listener` when an `on_pull` listener
    /// fails. A failed pull leaves the previous snapshot and readiness
    /// untouched.
    #[instrument(skip_all, fields(table = %self.config.table))]
    pub async fn pull(&self) -> CacheResult<()> {
        let permit = self.guard.acquire().await;
        let result = self.try_pull().await;
        permit.release(result.is_ok());
        result
    }

    async fn try_pull(&self) -> CacheResult<()> {
        let store = self.bound_store()?;

        if self.config.verify_primary_key {
            let key_columns = store.primary_key_columns(&self.config.table).await?;
            if !key_columns.iter().any(|c| c == &self.config.key_column) {
                return Err(CacheError::key_integrity(
                    &self.config.table,
                    &self.config.key_column,
                ));
            }
        }

        let statement = self.config.pull_statement();
        let rows = store.fetch(&statement, &[]).await?;

        let mut next = IndexMap::with_capacity(rows.len());
        for row in rows {
            let key: K =
                serde_json::from_value(row.try_column(&self.config.key_column)?.clone())?;
            let value: V =
                serde_json::from_value(row.try_column(&self.config.value_column)?.clone())?;
            next.insert(key, value);
        }

        let entries = next.len();
        self.snapshot.store(Arc::new(next));
        self.ready_tx.send_replace(true);
        debug!(table = %self.config.table, entries, "Cache pod pulled");

        self.events.dispatch(&CacheEvent::Pulled).await?;
        Ok(())
    }

    /// Runs the configured create template against the backing store.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotBound` without a store and
    /// `CacheError::MissingStatement` without a create template.
    #[instrument(skip_all, fields(table = %self.config.table))]
    pub async fn ensure_table(&self) -> CacheResult<()> {
        let store = self.bound_store()?;
        let statement = self
            .config
            .statements
            .create
            .as_deref()
            .ok_or_else(|| CacheError::missing_statement("create"))?;
        store.execute(statement, &[]).await?;
        Ok(())
    }

    /// Suspends until the first successful pull has populated the snapshot.
    ///
    /// Returns immediately when the pod is already ready.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready_rx.clone();
        // The sender lives on this pod, so the channel cannot close here.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    // ==================== Reads ====================

    /// Returns the cached value for `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotReady` until a pull has completed; an empty
    /// mirror and an unpulled one are different things.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.require_ready()?;
        Ok(self.snapshot.load().get(key).cloned())
    }

    /// Returns the cached value for `key`, or `default` when absent.
    pub fn get_or(&self, key: &K, default: V) -> CacheResult<V> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns the cached value for `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyNotFound` when the key is not cached.
    pub fn find(&self, key: &K) -> CacheResult<V> {
        self.get(key)?
            .ok_or_else(|| CacheError::key_not_found(format!("{key:?}")))
    }

    /// Returns `true` if `key` is cached.
    pub fn contains(&self, key: &K) -> CacheResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> CacheResult<usize> {
        self.require_ready()?;
        Ok(self.snapshot.load().len())
    }

    /// Returns `true` if the mirror is empty.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns all cached keys in row order.
    pub fn keys(&self) -> CacheResult<Vec<K>> {
        self.require_ready()?;
        Ok(self.snapshot.load().keys().cloned().collect())
    }

    /// Returns all cached values in row order, from one coherent snapshot.
    pub fn values(&self) -> CacheResult<Vec<V>> {
        self.require_ready()?;
        Ok(self.snapshot.load().values().cloned().collect())
    }

    /// Returns all cached entries in row order, from one coherent snapshot.
    pub fn items(&self) -> CacheResult<Vec<(K, V)>> {
        self.require_ready()?;
        Ok(self
            .snapshot
            .load()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    // ==================== Writes ====================

    /// Writes `value` for `key` through to the backing store, then mirrors
    /// the change in the snapshot.
    ///
    /// Runs the update template when the key is already cached, the insert
    /// template otherwise. The store write always happens first; a failed
    /// write leaves the snapshot untouched. Writes are not serialized with
    /// refreshes, and concurrent writers to the same key resolve by store
    /// write order.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotBound` without a store,
    /// `CacheError::MissingStatement` without the needed template,
    /// `CacheError::Codec` if the key or value cannot be converted to its
    /// wire form, and `CacheError::Store` when the write fails.
    #[instrument(skip_all, fields(table = %self.config.table))]
    pub async fn set(&self, key: K, value: V) -> CacheResult<()> {
        let store = self.bound_store()?;
        let exists = self.snapshot.load().contains_key(&key);
        let statement = if exists {
            self.config
                .statements
                .update
                .as_deref()
                .ok_or_else(|| CacheError::missing_statement("update"))?
        } else {
            self.config
                .statements
                .insert
                .as_deref()
                .ok_or_else(|| CacheError::missing_statement("insert"))?
        };

        let params = [serde_json::to_value(&key)?, serde_json::to_value(&value)?];
        store.execute(statement, &params).await?;

        self.snapshot.rcu(|current| {
            let mut next = IndexMap::clone(current);
            next.insert(key.clone(), value.clone());
            next
        });
        debug!(table = %self.config.table, "Cache pod entry written");
        Ok(())
    }

    /// Removes `key` from the backing store, then from the snapshot.
    ///
    /// Mirrors the write-through discipline of [`CachePod::set`]: the store
    /// delete always happens first and a failure leaves the snapshot
    /// untouched. Deleting a key the store never had is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::NotBound` without a store,
    /// `CacheError::MissingStatement` without a delete template,
    /// `CacheError::Codec` if the key cannot be converted, and
    /// `CacheError::Store` when the delete fails.
    #[instrument(skip_all, fields(table = %self.config.table))]
    pub async fn delete(&self, key: &K) -> CacheResult<()> {
        let store = self.bound_store()?;
        let statement = self
            .config
            .statements
            .delete
            .as_deref()
            .ok_or_else(|| CacheError::missing_statement("delete"))?;

        let params = [serde_json::to_value(key)?];
        store.execute(statement, &params).await?;

        self.snapshot.rcu(|current| {
            let mut next = IndexMap::clone(current);
            next.shift_remove(key);
            next
        });
        Ok(())
    }

    // ==================== Internal ====================

    fn bound_store(&self) -> CacheResult<&DynStore> {
        self.store.get().ok_or_else(CacheError::not_bound)
    }

    fn require_ready(&self) -> CacheResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CacheError::not_ready())
        }
    }
}

#[async_trait]
impl<K, V> AsyncMapping for CachePod<K, V>
where
    K: Clone + Eq + Hash + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Key = K;
    type Value = V;

    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        CachePod::get(self, key)
    }

    async fn set(&self, key: K, value: V) -> CacheResult<()> {
        CachePod::set(self, key, value).await
    }

    async fn delete(&self, key: &K) -> CacheResult<()> {
        CachePod::delete(self, key).await
    }

    async fn keys(&self) -> CacheResult<Vec<K>> {
        CachePod::keys(self)
    }

    async fn len(&self) -> CacheResult<usize> {
        CachePod::len(self)
    }

    async fn is_empty(&self) -> CacheResult<bool> {
        CachePod::is_empty(self)
    }

    async fn contains(&self, key: &K) -> CacheResult<bool> {
        CachePod::contains(self, key)
    }

    async fn get_or(&self, key: &K, default: V) -> CacheResult<V> {
        CachePod::get_or(self, key, default)
    }

    async fn find(&self, key: &K) -> CacheResult<V> {
        CachePod::find(self, key)
    }

    // Answered from one coherent snapshot instead of the per-key derivation.
    async fn values(&self) -> CacheResult<Vec<V>> {
        CachePod::values(self)
    }

    async fn items(&self) -> CacheResult<Vec<(K, V)>> {
        CachePod::items(self)
    }
}

impl<K, V> fmt::Debug for CachePod<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePod")
            .field("table", &self.config.table)
            .field("bound", &self.store.get().is_some())
            .field("ready", &*self.ready_rx.borrow())
            .field("entries", &self.snapshot.load().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatementSet;
    use rowpod_db_memory::MemoryStore;
    use serde_json::json;

    fn prefix_config() -> PodConfig {
        PodConfig::new("guild_prefixes", "guild_id", "prefix").with_statements(
            StatementSet::new()
                .with_create(
                    "CREATE TABLE IF NOT EXISTS guild_prefixes (guild_id BIGINT PRIMARY KEY, prefix TEXT)",
                )
                .with_insert("INSERT INTO guild_prefixes (guild_id, prefix) VALUES ($1, $2)")
                .with_update("UPDATE guild_prefixes SET prefix = $2 WHERE guild_id = $1")
                .with_delete("DELETE FROM guild_prefixes WHERE guild_id = $1"),
        )
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_table("guild_prefixes", &["guild_id", "prefix"], Some("guild_id"))
            .await;
        store
            .seed_rows(
                "guild_prefixes",
                vec![vec![json!(1), json!("!")], vec![json!(2), json!("?")]],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_fresh_pod_is_uninitialized() {
        let pod: CachePod<i64, String> = CachePod::new(prefix_config());
        assert!(!pod.is_bound());
        assert!(!pod.is_ready());
        assert!(!pod.has_started());
        assert_eq!(pod.table(), "guild_prefixes");
        assert_eq!(pod.key_column(), "guild_id");
        assert_eq!(pod.value_column(), "prefix");
        assert!(pod.backend_name().is_none());
    }

    #[tokio::test]
    async fn test_reads_before_pull_are_not_ready() {
        let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), seeded_store().await);
        assert!(pod.is_bound());

        assert!(pod.get(&1).unwrap_err().is_not_ready());
        assert!(pod.len().unwrap_err().is_not_ready());
        assert!(pod.keys().unwrap_err().is_not_ready());
    }

    #[tokio::test]
    async fn test_pull_without_store_is_not_bound() {
        let pod: CachePod<i64, String> = CachePod::new(prefix_config());
        assert!(pod.pull().await.unwrap_err().is_not_bound());
        assert!(pod.set(1, "!".to_string()).await.unwrap_err().is_not_bound());
        assert!(pod.ensure_table().await.unwrap_err().is_not_bound());
    }

    #[tokio::test]
    async fn test_second_activation_is_rejected() {
        let pod: CachePod<i64, String> = CachePod::new(prefix_config());
        let store = seeded_store().await;
        pod.activate(store.clone()).await.unwrap();
        assert!(pod.is_bound());
        assert_eq!(pod.backend_name(), Some("memory"));

        let err = pod.activate(store).await.unwrap_err();
        assert!(err.is_already_bound());
        // The original binding survives the rejected attempt.
        assert!(pod.is_bound());
    }

    #[tokio::test]
    async fn test_pull_then_read() {
        let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), seeded_store().await);
        pod.pull().await.unwrap();

        assert!(pod.is_ready());
        assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
        assert_eq!(pod.get(&3).unwrap(), None);
        assert_eq!(pod.len().unwrap(), 2);
        assert_eq!(pod.keys().unwrap(), vec![1, 2]);
        assert_eq!(pod.values().unwrap(), vec!["!".to_string(), "?".to_string()]);
        assert_eq!(pod.get_or(&3, "!".to_string()).unwrap(), "!".to_string());
        assert!(pod.find(&3).unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn test_readiness_survives_failed_pull() {
        let store = seeded_store().await;
        let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), store.clone());
        pod.pull().await.unwrap();

        store
            .fail_next_fetch(rowpod_storage::StoreError::connection("refused"))
            .await;
        let err = pod.pull().await.unwrap_err();
        assert!(err.is_store());

        // Still ready, still serving the last good snapshot.
        assert!(pod.is_ready());
        assert_eq!(pod.get(&2).unwrap(), Some("?".to_string()));
    }

    #[tokio::test]
    async fn test_snapshot_view_is_stable() {
        let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), seeded_store().await);
        pod.pull().await.unwrap();

        let view = pod.snapshot();
        pod.set(9, "#".to_string()).await.unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(pod.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_statement_reported() {
        let config = PodConfig::new("guild_prefixes", "guild_id", "prefix");
        let pod: CachePod<i64, String> = CachePod::with_store(config, seeded_store().await);
        pod.pull().await.unwrap();

        let err = pod.set(5, "!".to_string()).await.unwrap_err();
        assert!(matches!(err, CacheError::MissingStatement { .. }));
        let err = pod.delete(&1).await.unwrap_err();
        assert!(matches!(err, CacheError::MissingStatement { .. }));
        let err = pod.ensure_table().await.unwrap_err();
        assert!(matches!(err, CacheError::MissingStatement { .. }));
    }

    #[tokio::test]
    async fn test_debug_output() {
        let pod: CachePod<i64, String> = CachePod::new(prefix_config());
        let rendered = format!("{pod:?}");
        assert!(rendered.contains("guild_prefixes"));
        assert!(rendered.contains("ready: false"));
    }
}

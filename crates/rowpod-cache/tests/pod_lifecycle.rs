//! Integration tests for the cache pod lifecycle.
//!
//! These tests drive a [`CachePod`] against the in-memory backing store and
//! verify the full flow: activation, pulling, dictionary reads, write-through
//! updates, refresh serialization, failure policies, and lifecycle events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rowpod_cache::{
    AsyncMapping, BackingStore, CacheError, CacheEvent, CachePod, DynStore, ListenerError,
    PodConfig, StatementSet, StoreError, listener_fn,
};
use rowpod_db_memory::MemoryStore;
use serde_json::json;
use tokio_test::{assert_pending, assert_ready, task};

/// Standard configuration mirroring a `guild_prefixes` table.
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

/// A store holding `guild_prefixes` with rows `(1, "!")` and `(2, "?")`.
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

async fn ready_pod() -> (Arc<MemoryStore>, CachePod<i64, String>) {
    let store = seeded_store().await;
    let pod = CachePod::with_store(prefix_config(), store.clone());
    pod.pull().await.unwrap();
    (store, pod)
}

fn select_count(journal: &[String]) -> usize {
    journal.iter().filter(|s| s.starts_with("SELECT")).count()
}

// =============================================================================
// Cold Start and Activation
// =============================================================================

#[tokio::test]
async fn test_cold_start_refuses_reads() {
    let pod: CachePod<i64, String> = CachePod::new(prefix_config());

    // Uninitialized: no store, nothing pulled, reads refuse loudly.
    assert!(pod.get(&1).unwrap_err().is_not_ready());
    assert!(pod.contains(&1).unwrap_err().is_not_ready());
    assert!(pod.items().unwrap_err().is_not_ready());
    assert!(pod.pull().await.unwrap_err().is_not_bound());

    // Binding the store alone does not make the pod readable.
    pod.activate(seeded_store().await).await.unwrap();
    assert!(pod.is_bound());
    assert!(!pod.is_ready());
    assert!(pod.get(&1).unwrap_err().is_not_ready());
}

#[tokio::test]
async fn test_activate_pull_read_round_trip() {
    let pod: CachePod<i64, String> = CachePod::new(prefix_config());
    pod.activate(seeded_store().await).await.unwrap();
    pod.pull().await.unwrap();

    assert!(pod.is_ready());
    assert!(pod.has_started());
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
    assert_eq!(pod.find(&2).unwrap(), "?".to_string());
    assert_eq!(pod.get_or(&7, "standard".to_string()).unwrap(), "standard");
    assert_eq!(pod.keys().unwrap(), vec![1, 2]);
    assert_eq!(
        pod.items().unwrap(),
        vec![(1, "!".to_string()), (2, "?".to_string())]
    );
}

#[tokio::test]
async fn test_rejected_activation_never_builds_the_store() {
    let pod: CachePod<i64, String> = CachePod::new(prefix_config());
    pod.activate(seeded_store().await).await.unwrap();

    let constructed = Arc::new(AtomicBool::new(false));
    let flag = constructed.clone();
    let replacement = seeded_store().await;
    let err = pod
        .activate_with(async move {
            flag.store(true, Ordering::SeqCst);
            let store: DynStore = replacement;
            Ok(store)
        })
        .await
        .unwrap_err();

    assert!(err.is_already_bound());
    // The factory future was dropped unpolled.
    assert!(!constructed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_bootstrap_from_empty_table() {
    let store = Arc::new(MemoryStore::new());
    let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), store.clone());

    pod.ensure_table().await.unwrap();
    pod.pull().await.unwrap();

    // Ready and empty is a real state, distinct from not ready.
    assert!(pod.is_ready());
    assert_eq!(pod.len().unwrap(), 0);
    assert_eq!(pod.get(&1).unwrap(), None);

    pod.set(1, "!".to_string()).await.unwrap();
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
    assert_eq!(store.row_count("guild_prefixes").await, 1);
}

// =============================================================================
// Refresh Serialization
// =============================================================================

#[tokio::test]
async fn test_concurrent_pulls_run_one_at_a_time() {
    let (store, pod) = ready_pod().await;
    let pod = Arc::new(pod);
    store.set_fetch_delay(Duration::from_millis(200)).await;

    let first = tokio::spawn({
        let pod = pod.clone();
        async move { pod.pull().await }
    });
    let second = tokio::spawn({
        let pod = pod.clone();
        async move { pod.pull().await }
    });

    // One pull is inside its fetch; the other is parked on the guard.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(select_count(&store.executed_statements().await), 2);
    assert!(pod.is_refreshing());

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(select_count(&store.executed_statements().await), 3);
    assert!(!pod.is_refreshing());
}

#[tokio::test]
async fn test_reads_are_served_while_a_pull_is_in_flight() {
    let (store, pod) = ready_pod().await;
    let pod = Arc::new(pod);

    store
        .execute(
            "UPDATE guild_prefixes SET prefix = $2 WHERE guild_id = $1",
            &[json!(1), json!("$")],
        )
        .await
        .unwrap();
    store.set_fetch_delay(Duration::from_millis(200)).await;

    let refresh = tokio::spawn({
        let pod = pod.clone();
        async move { pod.pull().await }
    });

    // Mid-pull the old snapshot answers, instantly and unchanged.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
    assert_eq!(
        pod.items().unwrap(),
        vec![(1, "!".to_string()), (2, "?".to_string())]
    );

    refresh.await.unwrap().unwrap();
    assert_eq!(pod.get(&1).unwrap(), Some("$".to_string()));
}

// =============================================================================
// Write-Through
// =============================================================================

#[tokio::test]
async fn test_set_picks_insert_or_update_by_presence() {
    let (store, pod) = ready_pod().await;

    pod.set(7, "#".to_string()).await.unwrap();
    pod.set(1, "$".to_string()).await.unwrap();

    let journal = store.executed_statements().await;
    assert!(journal[journal.len() - 2].starts_with("INSERT"));
    assert!(journal[journal.len() - 1].starts_with("UPDATE"));

    assert_eq!(pod.get(&7).unwrap(), Some("#".to_string()));
    assert_eq!(pod.get(&1).unwrap(), Some("$".to_string()));
    let rows = store.table_rows("guild_prefixes").await.unwrap();
    assert!(rows.contains(&vec![json!(7), json!("#")]));
    assert!(rows.contains(&vec![json!(1), json!("$")]));
}

#[tokio::test]
async fn test_failed_write_leaves_snapshot_untouched() {
    let (store, pod) = ready_pod().await;

    store
        .fail_next_execute(StoreError::connection("refused"))
        .await;
    let err = pod.set(1, "$".to_string()).await.unwrap_err();
    assert!(err.is_store());

    // Neither side took the write.
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
    let rows = store.table_rows("guild_prefixes").await.unwrap();
    assert!(rows.contains(&vec![json!(1), json!("!")]));

    // The failure was one attempt, not a poisoned pod.
    pod.set(1, "$".to_string()).await.unwrap();
    assert_eq!(pod.get(&1).unwrap(), Some("$".to_string()));
}

#[tokio::test]
async fn test_delete_removes_from_store_then_snapshot() {
    let (store, pod) = ready_pod().await;

    pod.delete(&1).await.unwrap();
    assert_eq!(pod.get(&1).unwrap(), None);
    assert_eq!(pod.len().unwrap(), 1);
    assert_eq!(store.row_count("guild_prefixes").await, 1);

    // Deleting an absent key is quietly fine.
    pod.delete(&42).await.unwrap();
    assert_eq!(pod.len().unwrap(), 1);
}

// =============================================================================
// Primary-Key Verification
// =============================================================================

#[tokio::test]
async fn test_pull_rejects_a_non_key_column() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_table("emote_usage", &["name", "uses"], Some("name"))
        .await;
    store
        .seed_rows("emote_usage", vec![vec![json!("kappa"), json!(3)]])
        .await
        .unwrap();

    let config = PodConfig::new("emote_usage", "uses", "name");
    let pod: CachePod<i64, String> = CachePod::with_store(config, store);

    let err = pod.pull().await.unwrap_err();
    assert!(err.is_key_integrity());
    assert!(!pod.is_ready());
    assert!(pod.get(&3).unwrap_err().is_not_ready());
}

#[tokio::test]
async fn test_verification_can_be_disabled() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_table("emote_usage", &["name", "uses"], Some("name"))
        .await;
    store
        .seed_rows("emote_usage", vec![vec![json!("kappa"), json!(3)]])
        .await
        .unwrap();

    let config = PodConfig::new("emote_usage", "uses", "name").with_verify_primary_key(false);
    let pod: CachePod<i64, String> = CachePod::with_store(config, store);

    pod.pull().await.unwrap();
    assert_eq!(pod.get(&3).unwrap(), Some("kappa".to_string()));
}

// =============================================================================
// Failure Policy
// =============================================================================

#[tokio::test]
async fn test_release_policy_allows_immediate_retry() {
    let (store, pod) = ready_pod().await;

    store.fail_next_fetch(StoreError::connection("refused")).await;
    assert!(pod.pull().await.unwrap_err().is_store());

    assert!(!pod.is_refreshing());
    pod.pull().await.unwrap();
    assert!(pod.is_ready());
}

#[tokio::test]
async fn test_hold_policy_blocks_refreshes_until_reset() {
    let store = seeded_store().await;
    let pod: CachePod<i64, String> = CachePod::with_policy(prefix_config(), false);
    pod.activate(store.clone()).await.unwrap();
    pod.pull().await.unwrap();

    store.fail_next_fetch(StoreError::connection("refused")).await;
    assert!(pod.pull().await.unwrap_err().is_store());

    // The guard stays busy after the failure.
    assert!(pod.is_refreshing());
    assert!(pod.is_ready());

    {
        let mut blocked = task::spawn(pod.pull());
        assert_pending!(blocked.poll());

        pod.reset_guard();
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
    }

    assert!(!pod.is_refreshing());
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_activation_event_carries_the_store_handle() {
    let pod: CachePod<i64, String> = CachePod::new(prefix_config());

    // Listeners can be registered while the pod is still uninitialized.
    let backend = Arc::new(std::sync::Mutex::new(None));
    let seen = backend.clone();
    pod.on_activate(listener_fn(move |event: CacheEvent| {
        let seen = seen.clone();
        async move {
            if let CacheEvent::Activated { store } = event {
                *seen.lock().unwrap() = Some(store.backend_name());
            }
            Ok(())
        }
    }))
    .await;

    pod.activate(seeded_store().await).await.unwrap();
    assert_eq!(*backend.lock().unwrap(), Some("memory"));
}

#[tokio::test]
async fn test_pull_event_fires_after_the_swap() {
    let pod: Arc<CachePod<i64, String>> =
        Arc::new(CachePod::with_store(prefix_config(), seeded_store().await));

    let pulls = Arc::new(AtomicUsize::new(0));
    let observed_ready = Arc::new(AtomicBool::new(false));
    let count = pulls.clone();
    let observed = observed_ready.clone();
    let inner = pod.clone();
    pod.on_pull(listener_fn(move |_event: CacheEvent| {
        let count = count.clone();
        let observed = observed.clone();
        let pod = inner.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            // By the time the event arrives the new snapshot is in place.
            if pod.is_ready() && pod.get(&1).ok().flatten().is_some() {
                observed.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }))
    .await;

    pod.pull().await.unwrap();
    assert_eq!(pulls.load(Ordering::SeqCst), 1);
    assert!(observed_ready.load(Ordering::SeqCst));

    // Every pull announces itself, not just the first.
    pod.pull().await.unwrap();
    assert_eq!(pulls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_listener_failure_surfaces_after_the_data_lands() {
    let pod: CachePod<i64, String> = CachePod::with_store(prefix_config(), seeded_store().await);
    pod.on_pull(listener_fn(|_event: CacheEvent| async {
        Err(ListenerError::execution("hook exploded"))
    }))
    .await;

    let err = pod.pull().await.unwrap_err();
    assert!(matches!(err, CacheError::Listener(_)));

    // The refresh itself succeeded; only the notification failed.
    assert!(pod.is_ready());
    assert_eq!(pod.get(&1).unwrap(), Some("!".to_string()));
}

#[tokio::test]
async fn test_events_are_never_replayed() {
    let pod: CachePod<i64, String> = CachePod::new(prefix_config());
    pod.activate(seeded_store().await).await.unwrap();
    pod.pull().await.unwrap();

    let activations = Arc::new(AtomicUsize::new(0));
    let pulls = Arc::new(AtomicUsize::new(0));

    let count = activations.clone();
    pod.on_activate(listener_fn(move |_event: CacheEvent| {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
    .await;
    let count = pulls.clone();
    pod.on_pull(listener_fn(move |_event: CacheEvent| {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
    .await;

    // Nothing from the past is delivered.
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert_eq!(pulls.load(Ordering::SeqCst), 0);

    // Only new pulls reach the late listener.
    pod.pull().await.unwrap();
    assert_eq!(activations.load(Ordering::SeqCst), 0);
    assert_eq!(pulls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Readiness Waiting
// =============================================================================

#[tokio::test]
async fn test_wait_until_ready_wakes_on_the_first_pull() {
    let pod: Arc<CachePod<i64, String>> =
        Arc::new(CachePod::with_store(prefix_config(), seeded_store().await));

    let waiter = tokio::spawn({
        let pod = pod.clone();
        async move {
            pod.wait_until_ready().await;
            pod.get(&1).unwrap()
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    pod.pull().await.unwrap();
    assert_eq!(waiter.await.unwrap(), Some("!".to_string()));

    // Already ready: returns without suspending.
    pod.wait_until_ready().await;
}

// =============================================================================
// Mapping Trait
// =============================================================================

async fn lookup_through_trait(
    mapping: &dyn AsyncMapping<Key = i64, Value = String>,
    key: i64,
) -> String {
    mapping.get_or(&key, "standard".to_string()).await.unwrap()
}

#[tokio::test]
async fn test_pod_is_usable_as_a_mapping_object() {
    let (_store, pod) = ready_pod().await;

    assert_eq!(lookup_through_trait(&pod, 1).await, "!".to_string());
    assert_eq!(lookup_through_trait(&pod, 9).await, "standard".to_string());
}

#[tokio::test]
async fn test_derived_operations_write_through() {
    let (store, pod) = ready_pod().await;

    // pop removes from the store, not just the snapshot.
    assert_eq!(pod.pop(&1).await.unwrap(), Some("!".to_string()));
    assert_eq!(pod.pop(&1).await.unwrap(), None);
    assert_eq!(store.row_count("guild_prefixes").await, 1);

    // set_default only fills gaps.
    assert_eq!(
        pod.set_default(3, "~".to_string()).await.unwrap(),
        "~".to_string()
    );
    assert_eq!(
        pod.set_default(2, "~".to_string()).await.unwrap(),
        "?".to_string()
    );
    let rows = store.table_rows("guild_prefixes").await.unwrap();
    assert!(rows.contains(&vec![json!(3), json!("~")]));
    assert!(rows.contains(&vec![json!(2), json!("?")]));

    // update applies pairs in order, through the store.
    pod.update(&[(2, "two".to_string()), (5, "five".to_string())])
        .await
        .unwrap();
    let journal = store.executed_statements().await;
    assert!(journal[journal.len() - 2].starts_with("UPDATE"));
    assert!(journal[journal.len() - 1].starts_with("INSERT"));
    assert_eq!(pod.get(&5).unwrap(), Some("five".to_string()));

    // clear drains both sides.
    pod.clear().await.unwrap();
    assert_eq!(pod.len().unwrap(), 0);
    assert_eq!(store.row_count("guild_prefixes").await, 0);
}

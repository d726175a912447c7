//! Named-event dispatch for cache pods.
//!
//! A pod announces lifecycle transitions to registered listeners. Listeners
//! are asynchronous, fire in registration order per event name, and a
//! dispatch waits for all of them before reporting the first failure.
//! Registration after a dispatch sees nothing: events are not replayed.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use rowpod_storage::DynStore;
use tokio::sync::RwLock;
use tracing::debug;

/// Event name fired when a backing store is bound.
pub const ON_ACTIVATE: &str = "on_activate";

/// Event name fired when a pull refreshes the snapshot.
pub const ON_PULL: &str = "on_pull";

/// Error type for listener callbacks.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Listener execution failed with a message.
    #[error("Listener execution failed: {0}")]
    Execution(String),

    /// Generic error with source.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ListenerError {
    /// Create an execution error from a string.
    pub fn execution(msg: impl Into<String>) -> Self {
        ListenerError::Execution(msg.into())
    }
}

/// A pod lifecycle event delivered to listeners.
#[derive(Clone)]
pub enum CacheEvent {
    /// A backing store was bound; carries a handle to it.
    Activated {
        /// The store that was just bound.
        store: DynStore,
    },
    /// A pull replaced the snapshot.
    Pulled,
}

impl CacheEvent {
    /// Returns the registry name this event dispatches under.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Activated { .. } => ON_ACTIVATE,
            Self::Pulled => ON_PULL,
        }
    }
}

impl fmt::Debug for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activated { store } => f
                .debug_struct("Activated")
                .field("backend", &store.backend_name())
                .finish(),
            Self::Pulled => f.write_str("Pulled"),
        }
    }
}

/// An asynchronous handler for pod lifecycle events.
///
/// Being a trait over an async method, only asynchronous handlers can exist;
/// there is no way to register a blocking callback by accident.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Handles one event.
    async fn handle(&self, event: &CacheEvent) -> Result<(), ListenerError>;
}

struct FnListener<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(CacheEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send,
{
    async fn handle(&self, event: &CacheEvent) -> Result<(), ListenerError> {
        (self.f)(event.clone()).await
    }
}

/// Wraps an async closure into a shareable [`EventListener`].
///
/// # Example
///
/// ```ignore
/// use rowpod_cache::events::{listener_fn, CacheEvent};
///
/// let listener = listener_fn(|event: CacheEvent| async move {
///     println!("saw {}", event.name());
///     Ok(())
/// });
/// pod.on_pull(listener).await;
/// ```
pub fn listener_fn<F, Fut>(f: F) -> Arc<dyn EventListener>
where
    F: Fn(CacheEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    Arc::new(FnListener { f })
}

/// Registry of listeners keyed by event name.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<String, Vec<Arc<dyn EventListener>>>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` under `name`, after any listener already there.
    pub async fn add_listener(&self, name: impl Into<String>, listener: Arc<dyn EventListener>) {
        let name = name.into();
        let mut listeners = self.listeners.write().await;
        let slot = listeners.entry(name.clone()).or_default();
        slot.push(listener);
        debug!(event = %name, listeners = slot.len(), "Registered cache event listener");
    }

    /// Returns how many listeners are registered under `name`.
    pub async fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .read()
            .await
            .get(name)
            .map_or(0, |slot| slot.len())
    }

    /// Delivers `event` to every listener registered under its name.
    ///
    /// All listeners run concurrently and all of them complete before this
    /// returns. When several fail, the error of the earliest-registered
    /// failing listener is the one propagated. With no listeners registered
    /// this is a no-op.
    pub async fn dispatch(&self, event: &CacheEvent) -> Result<(), ListenerError> {
        let batch: Vec<Arc<dyn EventListener>> = {
            let listeners = self.listeners.read().await;
            match listeners.get(event.name()) {
                Some(slot) if !slot.is_empty() => slot.clone(),
                _ => return Ok(()),
            }
        };

        debug!(
            event = event.name(),
            listeners = batch.len(),
            "Dispatching cache event"
        );
        let results = join_all(batch.iter().map(|listener| listener.handle(event))).await;
        for result in results {
            result?;
        }
        Ok(())
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}

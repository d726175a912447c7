//! Dictionary-style access derived from five storage primitives.
//!
//! [`AsyncMapping`] requires implementors to supply `get`, `set`, `delete`,
//! `keys`, and `len`; everything else (`contains`, `pop`, `clear`, `update`,
//! `set_default`, ...) is derived from those and knows nothing about how the
//! entries are stored. Implementors may override a derived method when they
//! can answer it more coherently, as the cache pod does for multi-entry reads.

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;

use crate::error::{CacheError, CacheResult};

/// Asynchronous mapping over owned keys and values.
#[async_trait]
pub trait AsyncMapping: Send + Sync {
    /// Key type of the mapping.
    type Key: Clone + Eq + Hash + Debug + Send + Sync;
    /// Value type of the mapping.
    type Value: Clone + Send + Sync;

    // ==================== Primitives ====================

    /// Returns the value for `key`, or `None` when absent.
    async fn get(&self, key: &Self::Key) -> CacheResult<Option<Self::Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: Self::Key, value: Self::Value) -> CacheResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &Self::Key) -> CacheResult<()>;

    /// Returns all keys.
    async fn keys(&self) -> CacheResult<Vec<Self::Key>>;

    /// Returns the number of entries.
    async fn len(&self) -> CacheResult<usize>;

    // ==================== Derived operations ====================

    /// Returns `true` if the mapping has no entries.
    async fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Returns `true` if `key` has a value.
    async fn contains(&self, key: &Self::Key) -> CacheResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Returns the value for `key`, or `default` when absent.
    async fn get_or(&self, key: &Self::Key, default: Self::Value) -> CacheResult<Self::Value> {
        Ok(self.get(key).await?.unwrap_or(default))
    }

    /// Returns the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::KeyNotFound` when `key` is absent.
    async fn find(&self, key: &Self::Key) -> CacheResult<Self::Value> {
        self.get(key)
            .await?
            .ok_or_else(|| CacheError::key_not_found(format!("{key:?}")))
    }

    /// Returns all values, in key order.
    ///
    /// Keys that vanish between the key listing and their lookup are skipped.
    async fn values(&self) -> CacheResult<Vec<Self::Value>> {
        let mut values = Vec::new();
        for key in self.keys().await? {
            if let Some(value) = self.get(&key).await? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Returns all entries as `(key, value)` pairs, in key order.
    async fn items(&self) -> CacheResult<Vec<(Self::Key, Self::Value)>> {
        let mut items = Vec::new();
        for key in self.keys().await? {
            if let Some(value) = self.get(&key).await? {
                items.push((key, value));
            }
        }
        Ok(items)
    }

    /// Removes `key` and returns its value, or `None` when absent.
    ///
    /// An absent key mutates nothing.
    async fn pop(&self, key: &Self::Key) -> CacheResult<Option<Self::Value>> {
        match self.get(key).await? {
            Some(value) => {
                self.delete(key).await?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Removes every entry, one delete per key.
    async fn clear(&self) -> CacheResult<()> {
        for key in self.keys().await? {
            self.delete(&key).await?;
        }
        Ok(())
    }

    /// Applies `entries` in order; a later pair for the same key wins.
    async fn update(&self, entries: &[(Self::Key, Self::Value)]) -> CacheResult<()> {
        for (key, value) in entries {
            self.set(key.clone(), value.clone()).await?;
        }
        Ok(())
    }

    /// Stores `default` under `key` only when absent, returning the value
    /// that resides in the mapping afterwards.
    async fn set_default(&self, key: Self::Key, default: Self::Value) -> CacheResult<Self::Value> {
        match self.get(&key).await? {
            Some(existing) => Ok(existing),
            None => {
                self.set(key, default.clone()).await?;
                Ok(default)
            }
        }
    }
}

//! Authoritative name source.
//!
//! A name index is derived data. On startup it is reconciled against a
//! [`NameLookup`], normally the transaction log's own view of which names
//! have been assigned which values.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{IndexError, IndexResult};

/// Source of truth for `value -> name` assignments.
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// Returns the name assigned `value`, if any.
    async fn lookup_name(
        &self,
        value: u32,
        token: &CancellationToken,
    ) -> IndexResult<Option<String>>;

    /// Returns the highest assigned value, or `None` if nothing is assigned.
    async fn try_get_last_value(&self, token: &CancellationToken) -> IndexResult<Option<u32>>;
}

/// A [`NameLookup`] held in memory.
///
/// Useful as the source for a freshly created log, and in tests.
#[derive(Debug, Default)]
pub struct InMemoryNameLookup {
    names: RwLock<BTreeMap<u32, String>>,
}

impl InMemoryNameLookup {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source holding `entries`.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let names = entries
            .into_iter()
            .map(|(value, name)| (value, name.into()))
            .collect();
        Self {
            names: RwLock::new(names),
        }
    }

    /// Assigns `name` to `value`, replacing any previous name.
    pub fn insert(&self, value: u32, name: impl Into<String>) {
        self.names.write().insert(value, name.into());
    }

    /// Removes the assignment for `value`.
    pub fn remove(&self, value: u32) -> Option<String> {
        self.names.write().remove(&value)
    }

    /// Returns the number of assignments.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns true if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

#[async_trait]
impl NameLookup for InMemoryNameLookup {
    async fn lookup_name(
        &self,
        value: u32,
        token: &CancellationToken,
    ) -> IndexResult<Option<String>> {
        if token.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        Ok(self.names.read().get(&value).cloned())
    }

    async fn try_get_last_value(&self, token: &CancellationToken) -> IndexResult<Option<u32>> {
        if token.is_cancelled() {
            return Err(IndexError::Cancelled);
        }
        Ok(self.names.read().keys().next_back().copied())
    }
}

//! Generation registry
//!
//! Maps (scope, logical name) to the implementation resolution should
//! return. Implementations are held weakly: the registry never keeps a
//! generation alive on its own. Loader scopes are dropped explicitly through
//! [`GenerationRegistry::evict_loader`] once the loader is no longer
//! referenced.

use crate::scope::{GenerationRecord, LoaderId, Scope};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Weak};

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Loader scope was evicted; nothing may be stored in it again
    #[error("{0} has been evicted")]
    LoaderEvicted(LoaderId),

    /// Activation with a generation not newer than the active one
    #[error("stale generation {attempted} for {logical_name} (active: {current})")]
    StaleGeneration {
        /// Logical name
        logical_name: String,
        /// Generation currently active
        current: u64,
        /// Generation rejected
        attempted: u64,
    },

    /// Empty logical name
    #[error("empty logical name")]
    EmptyName,
}

#[derive(Debug)]
struct Entry<T> {
    internal_name: String,
    generation: Option<u64>,
    implementation: Weak<T>,
}

impl<T> Entry<T> {
    fn new(internal_name: &str, generation: Option<u64>, implementation: &Arc<T>) -> Self {
        Self {
            internal_name: internal_name.to_string(),
            generation,
            implementation: Arc::downgrade(implementation),
        }
    }

    #[inline]
    fn is_live(&self) -> bool {
        self.implementation.strong_count() > 0
    }

    fn record(&self, scope: Scope, logical_name: &str, active: bool) -> GenerationRecord {
        GenerationRecord {
            scope,
            logical_name: logical_name.to_string(),
            internal_name: self.internal_name.clone(),
            generation: self.generation,
            active,
        }
    }
}

type Key = (Scope, String);

/// Concurrent registry of active generations
///
/// Reads take a shard lock only for the lookup. A miss means "no override".
#[derive(Debug)]
pub struct GenerationRegistry<T> {
    entries: DashMap<Key, Entry<T>>,
    evicted: RwLock<HashSet<LoaderId>>,
}

impl<T> Default for GenerationRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GenerationRegistry<T> {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            evicted: RwLock::new(HashSet::new()),
        }
    }

    /// Global lookup
    #[must_use]
    pub fn get(&self, logical_name: &str) -> Option<Arc<T>> {
        self.get_scoped(Scope::Global, logical_name)
    }

    /// Global store of a resolution result
    ///
    /// # Errors
    /// Returns error if the name is empty
    pub fn put(
        &self,
        logical_name: &str,
        internal_name: &str,
        implementation: &Arc<T>,
    ) -> Result<(), RegistryError> {
        self.put_scoped(Scope::Global, logical_name, internal_name, implementation)
    }

    /// Scoped lookup
    #[must_use]
    pub fn get_scoped(&self, scope: Scope, logical_name: &str) -> Option<Arc<T>> {
        self.entries
            .get(&(scope, logical_name.to_string()))
            .and_then(|e| e.implementation.upgrade())
    }

    fn ensure_not_evicted(evicted: &HashSet<LoaderId>, scope: Scope) -> Result<(), RegistryError> {
        match scope.loader() {
            Some(id) if evicted.contains(&id) => Err(RegistryError::LoaderEvicted(id)),
            _ => Ok(()),
        }
    }

    /// Scoped store of a resolution result
    ///
    /// An active generation for the same key is kept; resolution results
    /// only fill empty or dead slots.
    ///
    /// # Errors
    /// Returns error if the loader scope was evicted or the name is empty
    pub fn put_scoped(
        &self,
        scope: Scope,
        logical_name: &str,
        internal_name: &str,
        implementation: &Arc<T>,
    ) -> Result<(), RegistryError> {
        if logical_name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let evicted = self.evicted.read();
        Self::ensure_not_evicted(&evicted, scope)?;

        let mut slot = self
            .entries
            .entry((scope, logical_name.to_string()))
            .or_insert_with(|| Entry::new(internal_name, None, implementation));
        if slot.generation.is_none() || !slot.is_live() {
            *slot = Entry::new(internal_name, None, implementation);
        }
        Ok(())
    }

    /// Make `implementation` the active generation for `logical_name`
    ///
    /// Returns the superseded record, marked inactive.
    ///
    /// # Errors
    /// Returns error if the loader scope was evicted, the name is empty, or
    /// `generation` is not newer than the live active generation
    pub fn activate(
        &self,
        scope: Scope,
        logical_name: &str,
        internal_name: &str,
        generation: u64,
        implementation: &Arc<T>,
    ) -> Result<Option<GenerationRecord>, RegistryError> {
        if logical_name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let evicted = self.evicted.read();
        Self::ensure_not_evicted(&evicted, scope)?;

        let fresh = Entry::new(internal_name, Some(generation), implementation);
        let superseded = match self.entries.entry((scope, logical_name.to_string())) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if let Some(current) = occupied.get().generation {
                    if current >= generation && occupied.get().is_live() {
                        return Err(RegistryError::StaleGeneration {
                            logical_name: logical_name.to_string(),
                            current,
                            attempted: generation,
                        });
                    }
                }
                let old = occupied.insert(fresh);
                Some(old.record(scope, logical_name, false))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                None
            }
        };

        tracing::info!(
            "activated {} -> {} (gen {}) in {}",
            logical_name,
            internal_name,
            generation,
            scope
        );
        Ok(superseded)
    }

    /// Record currently returned for a key, if its implementation is alive
    #[must_use]
    pub fn active_record(&self, scope: Scope, logical_name: &str) -> Option<GenerationRecord> {
        self.entries
            .get(&(scope, logical_name.to_string()))
            .filter(|e| e.is_live())
            .map(|e| e.record(scope, logical_name, true))
    }

    /// Drop a loader's scope and refuse further stores into it
    ///
    /// Returns the number of entries removed.
    pub fn evict_loader(&self, loader: LoaderId) -> usize {
        let mut evicted = self.evicted.write();
        evicted.insert(loader);
        let before = self.entries.len();
        self.entries.retain(|(scope, _), _| *scope != Scope::Loader(loader));
        let removed = before - self.entries.len();
        tracing::debug!("evicted {} ({} entries)", loader, removed);
        removed
    }

    /// True if the loader has been evicted
    #[must_use]
    pub fn is_evicted(&self, loader: LoaderId) -> bool {
        self.evicted.read().contains(&loader)
    }

    /// Remove entries whose implementation is gone
    ///
    /// Returns the number of entries removed.
    pub fn purge(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live());
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, live or not
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records of every entry, sorted by scope and name
    ///
    /// Entries whose implementation is gone are reported inactive.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GenerationRecord> {
        let mut records: Vec<GenerationRecord> = self
            .entries
            .iter()
            .map(|kv| {
                let (scope, name) = kv.key();
                kv.value().record(*scope, name, kv.value().is_live())
            })
            .collect();
        records.sort_by(|a, b| {
            (a.scope, &a.logical_name).cmp(&(b.scope, &b.logical_name))
        });
        records
    }
}

impl<T> Display for GenerationRegistry<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for record in self.snapshot() {
            writeln!(f, "{record}")?;
        }
        Ok(())
    }
}

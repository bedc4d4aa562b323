/*!
 * Per-project provider cache.
 *
 * Building providers means building HTTP clients, so a chapter service keeps
 * the stage providers of each project around between runs. The cache is a
 * plain object owned by its caller; nothing here is process-global.
 */

use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::StageProviders;

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Lookups served from the cache
    pub hits: usize,
    /// Lookups that had to build providers
    pub misses: usize,
    /// Projects currently cached
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Stage providers cached by project id
#[derive(Debug, Default)]
pub struct ProviderCache {
    /// Internal cache storage
    entries: RwLock<HashMap<String, StageProviders>>,
    /// Cache hit counter
    hits: AtomicUsize,
    /// Cache miss counter
    misses: AtomicUsize,
}

impl ProviderCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the providers of a project without building them
    pub fn get(&self, project_id: &str) -> Option<StageProviders> {
        self.entries.read().get(project_id).cloned()
    }

    /// Get the providers of a project, building and caching them on a miss.
    ///
    /// A failed build is not cached.
    pub fn get_or_try_insert<E, F>(&self, project_id: &str, build: F) -> Result<StageProviders, E>
    where
        F: FnOnce() -> Result<StageProviders, E>,
    {
        if let Some(providers) = self.get(project_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Provider cache hit for project {}", project_id);
            return Ok(providers);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Provider cache miss for project {}", project_id);

        let providers = build()?;
        let mut entries = self.entries.write();
        // Another caller may have filled the slot while we were building
        let cached = entries
            .entry(project_id.to_string())
            .or_insert(providers)
            .clone();

        Ok(cached)
    }

    /// Drop the providers of one project, e.g. after its settings changed.
    ///
    /// Returns whether an entry was removed.
    pub fn invalidate(&self, project_id: &str) -> bool {
        let removed = self.entries.write().remove(project_id).is_some();
        if removed {
            debug!("Invalidated cached providers for project {}", project_id);
        }
        removed
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached projects
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

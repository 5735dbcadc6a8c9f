// Development render cache

use crate::RenderResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct Inner {
    generation: u64,
    entries: LruCache<String, Arc<RenderResult>>,
}

/// Render results keyed by request URL within one build generation.
///
/// Entries are bounded by LRU eviction. Observing a newer generation
/// drops every entry; results rendered for an older generation are never
/// stored.
pub struct RenderCache {
    inner: Mutex<Inner>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                entries: LruCache::new(capacity),
            }),
        }
    }

    pub fn get(&self, generation: u64, url: &str) -> Option<Arc<RenderResult>> {
        let mut inner = self.inner.lock();
        Self::roll(&mut inner, generation);
        if inner.generation != generation {
            return None;
        }
        inner.entries.get(url).cloned()
    }

    /// Store `result`; last writer wins for concurrent misses on one URL
    pub fn insert(&self, generation: u64, url: impl Into<String>, result: RenderResult) {
        let mut inner = self.inner.lock();
        Self::roll(&mut inner, generation);
        if inner.generation != generation {
            tracing::debug!(generation, current = inner.generation, "dropping stale render");
            return;
        }
        inner.entries.put(url.into(), Arc::new(result));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    fn roll(inner: &mut Inner, generation: u64) {
        if generation > inner.generation {
            if !inner.entries.is_empty() {
                tracing::debug!(
                    from = inner.generation,
                    to = generation,
                    evicted = inner.entries.len(),
                    "build generation changed, clearing render cache"
                );
            }
            inner.entries.clear();
            inner.generation = generation;
        }
    }
}

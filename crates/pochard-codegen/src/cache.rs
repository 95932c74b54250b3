//! Bounded projection cache
//!
//! Maps canonical expression trees to compiled projections. Reads go
//! through a `RwLock` read guard; misses serialize on a single compile
//! lock with a double-check after acquisition, so two callers racing
//! on the same canonical key observe exactly one compile. Eviction is
//! least-recently-used among entries nothing else holds a reference to.

use crate::projection::Projection;
use hashbrown::HashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use pochard_common::Result;
use pochard_expr::Expr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Default number of cached projections
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

struct Entry {
    projection: Arc<Projection>,
    last_used: AtomicU64,
}

/// Canonical tree -> compiled projection, bounded
pub struct ProjectionCache {
    capacity: usize,
    entries: RwLock<HashMap<Expr, Entry>>,
    /// Serializes compilation; never held on a cache hit
    compile_lock: Mutex<()>,
    tick: AtomicU64,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        ProjectionCache {
            capacity,
            entries: RwLock::new(HashMap::new()),
            compile_lock: Mutex::new(()),
            tick: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a canonical key, refreshing its recency on a hit
    pub fn get(&self, key: &Expr) -> Option<Arc<Projection>> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        entry
            .last_used
            .store(self.tick.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        Some(entry.projection.clone())
    }

    /// Hit the cache or compile under the compile lock. `key` must
    /// already be canonical.
    pub fn get_or_compile(
        &self,
        key: Expr,
        compile: impl FnOnce(&Expr) -> Result<Projection>,
    ) -> Result<Arc<Projection>> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let _compile_guard = self.compile_lock.lock();
        // Another thread may have compiled this key while we waited.
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let start = Instant::now();
        let projection = Arc::new(compile(&key)?);
        debug!("compiled projection in {:?}", start.elapsed());

        let mut entries = self.entries.write();
        entries.insert(
            key,
            Entry {
                projection: projection.clone(),
                last_used: AtomicU64::new(self.tick.fetch_add(1, Ordering::Relaxed)),
            },
        );
        self.evict(&mut entries);
        Ok(projection)
    }

    /// Drop least-recently-used entries until within capacity, skipping
    /// entries still referenced outside the cache.
    fn evict(&self, entries: &mut HashMap<Expr, Entry>) {
        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .filter(|(_, e)| Arc::strong_count(&e.projection) == 1)
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                }
                // Everything is pinned by live references; let the map
                // run over capacity rather than drop a projection in use.
                None => break,
            }
        }
    }
}

impl Default for ProjectionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::lower;
    use pochard_common::LogicalType;
    use pochard_expr::canonicalize;

    fn expr(n: i32) -> Expr {
        canonicalize(&Expr::add(
            Expr::bound(0, LogicalType::Integer, true, "x"),
            Expr::literal(n),
        ))
    }

    fn compile_fn(key: &Expr) -> Result<Projection> {
        Ok(Projection::new(lower(key)?))
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_hit_returns_same_artifact() {
        init_logs();
        let cache = ProjectionCache::new();
        let first = cache.get_or_compile(expr(1), compile_fn).unwrap();
        let second = cache.get_or_compile(expr(1), compile_fn).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = ProjectionCache::with_capacity(4);
        for n in 0..10 {
            // Dropped immediately, so every entry is evictable.
            let _ = cache.get_or_compile(expr(n), compile_fn).unwrap();
        }
        assert!(cache.len() <= 4);
    }

    #[test]
    fn test_lru_prefers_stale_entries() {
        let cache = ProjectionCache::with_capacity(2);
        let _ = cache.get_or_compile(expr(1), compile_fn).unwrap();
        let _ = cache.get_or_compile(expr(2), compile_fn).unwrap();
        // Refresh 1, then insert 3: 2 is now least recently used.
        assert!(cache.get(&expr(1)).is_some());
        let _ = cache.get_or_compile(expr(3), compile_fn).unwrap();
        assert!(cache.get(&expr(1)).is_some());
        assert!(cache.get(&expr(2)).is_none());
    }

    #[test]
    fn test_referenced_entries_survive_eviction() {
        let cache = ProjectionCache::with_capacity(1);
        let pinned = cache.get_or_compile(expr(1), compile_fn).unwrap();
        let also_pinned = cache.get_or_compile(expr(2), compile_fn).unwrap();
        // Both entries are referenced, so the cache runs over capacity
        // rather than dropping a projection in use.
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&expr(1)).is_some());

        drop(pinned);
        drop(also_pinned);
        // The next insert can now shed the stale unreferenced entries.
        let _ = cache.get_or_compile(expr(3), compile_fn).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_artifact() {
        let cache = Arc::new(ProjectionCache::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                cache.get_or_compile(expr(7), compile_fn).unwrap()
            }));
        }
        let artifacts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for artifact in &artifacts[1..] {
            assert!(Arc::ptr_eq(&artifacts[0], artifact));
        }
        assert_eq!(cache.len(), 1);
    }
}

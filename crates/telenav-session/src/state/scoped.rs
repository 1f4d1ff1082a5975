//! Lazy-load-once provider over one persisted scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde_json::Value;
use telenav_types::{StateDef, StateItem, StateKey, StateScope};
use tracing::trace;

use super::StateProvider;
use crate::error::SessionResult;
use crate::store::StateStore;

/// Provider bound to one [`StateScope`] of a store.
///
/// The first access loads the scope's state set into an ordered map; later
/// accesses are served from it. `flush` writes the whole map back.
pub struct ScopedProvider {
    scope: StateScope,
    store: Arc<dyn StateStore>,
    cache: Mutex<Option<IndexMap<StateKey, Value>>>,
    discarded: AtomicBool,
}

impl std::fmt::Debug for ScopedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedProvider")
            .field("scope", &self.scope)
            .field("loaded", &self.cache.lock().is_some())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

impl ScopedProvider {
    pub fn new(scope: StateScope, store: Arc<dyn StateStore>) -> Self {
        Self {
            scope,
            store,
            cache: Mutex::new(None),
            discarded: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> StateScope {
        self.scope
    }

    /// Mark the scope as deleted; later flushes write nothing.
    pub fn discard(&self) {
        self.discarded.store(true, Ordering::Release);
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Lock the cache, loading it first if needed.
    fn loaded(&self) -> SessionResult<MappedMutexGuard<'_, IndexMap<StateKey, Value>>> {
        let mut guard = self.cache.lock();
        if guard.is_none() {
            let def = self.store.find_state(&self.scope)?.unwrap_or_default();
            trace!(scope = %self.scope, items = def.len(), "loaded state");
            *guard = Some(def.into_items().into_iter().map(|i| (i.key, i.value)).collect());
        }
        Ok(MutexGuard::map(guard, |cache| cache.get_or_insert_with(IndexMap::new)))
    }

    /// Run `f` against the loaded cache.
    fn with_cache<R>(&self, f: impl FnOnce(&mut IndexMap<StateKey, Value>) -> R) -> SessionResult<R> {
        let mut cache = self.loaded()?;
        Ok(f(&mut *cache))
    }
}

impl StateProvider for ScopedProvider {
    fn get(&self, key: &StateKey) -> SessionResult<Option<Value>> {
        self.with_cache(|cache| cache.get(key).cloned())
    }

    fn set(&self, key: &StateKey, value: Option<Value>) -> SessionResult<Option<Value>> {
        self.with_cache(|cache| match value {
            Some(value) => cache.insert(key.clone(), value),
            None => cache.shift_remove(key),
        })
    }

    fn get_all(&self) -> SessionResult<Vec<StateItem>> {
        self.with_cache(|cache| {
            cache
                .iter()
                .map(|(k, v)| StateItem::new(k.clone(), v.clone()))
                .collect()
        })
    }

    fn merge_all(&self, items: &[StateItem]) -> SessionResult<()> {
        self.with_cache(|cache| {
            for item in items {
                cache.insert(item.key.clone(), item.value.clone());
            }
        })
    }

    fn flush(&self) -> SessionResult<()> {
        if self.is_discarded() {
            trace!(scope = %self.scope, "scope discarded, not flushing");
            return Ok(());
        }
        // The cache stays locked until the write lands, so concurrent
        // flushes of one scope reach the store in the order of their changes.
        let cache = self.loaded()?;
        let def: StateDef = cache
            .iter()
            .map(|(k, v)| StateItem::new(k.clone(), v.clone()))
            .collect();
        trace!(scope = %self.scope, items = def.len(), "flushing state");
        self.store.save_state(&self.scope, &def)?;
        Ok(())
    }

    fn can_flush(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreResult};
    use serde_json::json;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use telenav_types::{Block, BlockId, MessageId, Page, PageId, UserId};

    fn key() -> StateKey {
        StateKey::named::<String>("filter")
    }

    #[test]
    fn test_local_item_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let scope = StateScope::Local(PageId::new(1000));
        let provider = ScopedProvider::new(scope, store.clone());

        assert_eq!(provider.get(&key()).unwrap(), None);
        assert_eq!(provider.set(&key(), Some(json!("abc"))).unwrap(), None);
        assert_eq!(provider.get(&key()).unwrap(), Some(json!("abc")));
        assert_eq!(store.stats().state_writes, 0);

        provider.flush().unwrap();
        let fresh = ScopedProvider::new(scope, store.clone());
        assert_eq!(fresh.get(&key()).unwrap(), Some(json!("abc")));
    }

    #[test]
    fn test_set_none_deletes() {
        let store = Arc::new(MemoryStore::new());
        let provider = ScopedProvider::new(StateScope::Global, store.clone());
        provider.set(&key(), Some(json!("x"))).unwrap();
        assert_eq!(provider.set(&key(), None).unwrap(), Some(json!("x")));
        provider.flush().unwrap();

        let fresh = ScopedProvider::new(StateScope::Global, store);
        assert!(fresh.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_loads_once() {
        let store = Arc::new(MemoryStore::new());
        let scope = StateScope::Global;
        let provider = ScopedProvider::new(scope, store.clone());
        provider.get(&key()).unwrap();

        // A write behind the provider's back is not seen after the first load.
        let def = StateDef::from_items([StateItem::new(key(), json!("late"))]);
        store.save_state(&scope, &def).unwrap();
        assert_eq!(provider.get(&key()).unwrap(), None);
    }

    #[test]
    fn test_discarded_scope_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let provider = ScopedProvider::new(StateScope::Local(PageId::new(1000)), store.clone());
        provider.set(&key(), Some(json!("gone"))).unwrap();
        provider.discard();
        provider.flush().unwrap();
        assert_eq!(store.stats().state_writes, 0);
    }

    #[test]
    fn test_merge_all_overrides() {
        let store = Arc::new(MemoryStore::new());
        let provider = ScopedProvider::new(StateScope::Global, store);
        provider.set(&key(), Some(json!("old"))).unwrap();
        provider
            .merge_all(&[
                StateItem::new(key(), json!("new")),
                StateItem::new(StateKey::of::<i64>(None), json!(3)),
            ])
            .unwrap();
        let all = provider.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].value, json!("new"));
    }

    /// Memory store whose first global write stalls after announcing itself.
    struct SlowGlobalWrites {
        inner: MemoryStore,
        started: Mutex<Option<mpsc::Sender<()>>>,
    }

    impl StateStore for SlowGlobalWrites {
        fn save_block(&self, block: Block) -> StoreResult<Block> {
            self.inner.save_block(block)
        }
        fn find_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
            self.inner.find_block(id)
        }
        fn find_block_by_message(&self, user: UserId, message: MessageId) -> StoreResult<Option<Block>> {
            self.inner.find_block_by_message(user, message)
        }
        fn find_last_block(&self, user: UserId) -> StoreResult<Option<Block>> {
            self.inner.find_last_block(user)
        }
        fn find_block_by_page(&self, page: PageId) -> StoreResult<Option<Block>> {
            self.inner.find_block_by_page(page)
        }
        fn last_blocks(&self, user: UserId, offset: usize, limit: usize) -> StoreResult<Vec<Block>> {
            self.inner.last_blocks(user, offset, limit)
        }
        fn blocks_count(&self, user: UserId) -> StoreResult<usize> {
            self.inner.blocks_count(user)
        }
        fn delete_block(&self, id: BlockId) -> StoreResult<()> {
            self.inner.delete_block(id)
        }
        fn save_page(&self, page: Page) -> StoreResult<Page> {
            self.inner.save_page(page)
        }
        fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
            self.inner.find_page(id)
        }
        fn find_last_page(&self, block: BlockId) -> StoreResult<Option<Page>> {
            self.inner.find_last_page(block)
        }
        fn block_pages(&self, block: BlockId) -> StoreResult<Vec<Page>> {
            self.inner.block_pages(block)
        }
        fn delete_page(&self, id: PageId) -> StoreResult<()> {
            self.inner.delete_page(id)
        }
        fn find_state(&self, scope: &StateScope) -> StoreResult<Option<StateDef>> {
            self.inner.find_state(scope)
        }
        fn save_state(&self, scope: &StateScope, state: &StateDef) -> StoreResult<()> {
            if *scope == StateScope::Global {
                if let Some(started) = self.started.lock().take() {
                    let _ = started.send(());
                    thread::sleep(Duration::from_millis(100));
                }
            }
            self.inner.save_state(scope, state)
        }
    }

    #[test]
    fn test_concurrent_flushes_keep_latest_value() {
        let (tx, rx) = mpsc::channel();
        let store = Arc::new(SlowGlobalWrites {
            inner: MemoryStore::new(),
            started: Mutex::new(Some(tx)),
        });
        let provider = Arc::new(ScopedProvider::new(StateScope::Global, store.clone()));
        let count = StateKey::named::<i64>("count");

        let first = {
            let provider = provider.clone();
            let count = count.clone();
            thread::spawn(move || {
                provider.set(&count, Some(json!(1))).unwrap();
                provider.flush().unwrap();
            })
        };
        rx.recv().unwrap();
        provider.set(&count, Some(json!(42))).unwrap();
        provider.flush().unwrap();
        first.join().unwrap();

        let stored = store.find_state(&StateScope::Global).unwrap().unwrap();
        assert_eq!(stored.get(&count), Some(&json!(42)));
        assert_eq!(provider.get(&count).unwrap(), Some(json!(42)));
    }
}

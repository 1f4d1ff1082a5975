//! In-memory store backend.
//!
//! Used for tests and for bots that do not need navigation to survive a
//! restart. All data is lost when the store is dropped.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use telenav_types::{
    Block, BlockId, MessageId, Page, PageId, StateDef, StateScope, UserId, now_millis,
};

use crate::store::error::{StoreError, StoreResult};
use crate::store::ops::StateStore;

/// First id handed out for blocks.
const FIRST_BLOCK_ID: i64 = 10_000;
/// First id handed out for pages.
const FIRST_PAGE_ID: i64 = 1_000;

/// Write counters, for diagnostics and flush assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Block inserts and updates.
    pub block_writes: u64,
    /// Page inserts and replacements.
    pub page_writes: u64,
    /// State set writes across all scopes.
    pub state_writes: u64,
}

#[derive(Debug)]
struct Inner {
    blocks: BTreeMap<BlockId, Block>,
    pages: HashMap<PageId, Page>,
    /// Page ids per block in creation order.
    order: HashMap<BlockId, Vec<PageId>>,
    local: HashMap<PageId, StateDef>,
    shared: HashMap<(UserId, MessageId), StateDef>,
    user: HashMap<UserId, StateDef>,
    global: Option<StateDef>,
    next_block: i64,
    next_page: i64,
    stats: StoreStats,
}

impl Inner {
    fn remove_page(&mut self, id: PageId) {
        if let Some(page) = self.pages.remove(&id) {
            if let Some(ids) = self.order.get_mut(&page.block_id) {
                ids.retain(|p| *p != id);
            }
        }
        self.local.remove(&id);
    }
}

/// Store backed by process memory.
#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                blocks: BTreeMap::new(),
                pages: HashMap::new(),
                order: HashMap::new(),
                local: HashMap::new(),
                shared: HashMap::new(),
                user: HashMap::new(),
                global: None,
                next_block: FIRST_BLOCK_ID,
                next_page: FIRST_PAGE_ID,
                stats: StoreStats::default(),
            }),
        }
    }

    /// Snapshot of the write counters.
    pub fn stats(&self) -> StoreStats {
        self.inner.read().stats
    }

    /// Reset the write counters to zero.
    pub fn reset_stats(&self) {
        self.inner.write().stats = StoreStats::default();
    }
}

impl StateStore for MemoryStore {
    fn save_block(&self, mut block: Block) -> StoreResult<Block> {
        block.validate()?;
        let mut inner = self.inner.write();
        inner.stats.block_writes += 1;

        let existing = inner
            .blocks
            .values()
            .find(|b| b.user_id == block.user_id && b.message_id == block.message_id)
            .map(|b| (b.id, b.created_at));

        match existing {
            Some((id, created_at)) => {
                block.id = id;
                block.created_at = created_at;
            }
            None => {
                block.id = BlockId::new(inner.next_block);
                inner.next_block += 1;
                inner.order.insert(block.id, Vec::new());
            }
        }

        inner.blocks.insert(block.id, block.clone());
        Ok(block)
    }

    fn find_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
        Ok(self.inner.read().blocks.get(&id).cloned())
    }

    fn find_block_by_message(&self, user: UserId, message: MessageId) -> StoreResult<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .blocks
            .values()
            .find(|b| b.user_id == user && b.message_id == message)
            .cloned())
    }

    fn find_last_block(&self, user: UserId) -> StoreResult<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner.blocks.values().rev().find(|b| b.user_id == user).cloned())
    }

    fn find_block_by_page(&self, page: PageId) -> StoreResult<Option<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .pages
            .get(&page)
            .and_then(|p| inner.blocks.get(&p.block_id))
            .cloned())
    }

    fn last_blocks(&self, user: UserId, offset: usize, limit: usize) -> StoreResult<Vec<Block>> {
        let inner = self.inner.read();
        Ok(inner
            .blocks
            .values()
            .rev()
            .filter(|b| b.user_id == user)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn blocks_count(&self, user: UserId) -> StoreResult<usize> {
        let inner = self.inner.read();
        Ok(inner.blocks.values().filter(|b| b.user_id == user).count())
    }

    fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let Some(block) = inner.blocks.remove(&id) else {
            return Ok(());
        };
        for page in inner.order.remove(&id).unwrap_or_default() {
            inner.pages.remove(&page);
            inner.local.remove(&page);
        }
        inner.shared.remove(&(block.user_id, block.message_id));
        Ok(())
    }

    fn save_page(&self, mut page: Page) -> StoreResult<Page> {
        page.validate()?;
        let mut inner = self.inner.write();
        if !inner.blocks.contains_key(&page.block_id) {
            return Err(StoreError::BlockNotFound(page.block_id));
        }

        if page.id.is_none() {
            page.id = PageId::new(inner.next_page);
            inner.next_page += 1;
            inner.order.entry(page.block_id).or_default().push(page.id);
        } else {
            let existing = inner
                .pages
                .get(&page.id)
                .ok_or(StoreError::PageNotFound(page.id))?;
            if existing.block_id != page.block_id {
                return Err(StoreError::PageNotInBlock {
                    page: page.id,
                    block: page.block_id,
                });
            }
            page.created_at = existing.created_at;
            page.updated_at = now_millis();
        }

        inner.stats.page_writes += 1;
        inner.pages.insert(page.id, page.clone());
        Ok(page)
    }

    fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        Ok(self.inner.read().pages.get(&id).cloned())
    }

    fn find_last_page(&self, block: BlockId) -> StoreResult<Option<Page>> {
        let inner = self.inner.read();
        Ok(inner
            .order
            .get(&block)
            .and_then(|ids| ids.last())
            .and_then(|id| inner.pages.get(id))
            .cloned())
    }

    fn block_pages(&self, block: BlockId) -> StoreResult<Vec<Page>> {
        let inner = self.inner.read();
        Ok(inner
            .order
            .get(&block)
            .map(|ids| ids.iter().filter_map(|id| inner.pages.get(id)).cloned().collect())
            .unwrap_or_default())
    }

    fn delete_page(&self, id: PageId) -> StoreResult<()> {
        self.inner.write().remove_page(id);
        Ok(())
    }

    fn find_state(&self, scope: &StateScope) -> StoreResult<Option<StateDef>> {
        let inner = self.inner.read();
        Ok(match scope {
            StateScope::Local(page) => inner.local.get(page).cloned(),
            StateScope::Shared { user, message } => inner.shared.get(&(*user, *message)).cloned(),
            StateScope::User(user) => inner.user.get(user).cloned(),
            StateScope::Global => inner.global.clone(),
        })
    }

    fn save_state(&self, scope: &StateScope, state: &StateDef) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.stats.state_writes += 1;
        match scope {
            StateScope::Local(page) => {
                inner.local.insert(*page, state.clone());
            }
            StateScope::Shared { user, message } => {
                inner.shared.insert((*user, *message), state.clone());
            }
            StateScope::User(user) => {
                inner.user.insert(*user, state.clone());
            }
            StateScope::Global => inner.global = Some(state.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use telenav_types::{CommandDef, MessageType, StateItem, StateKey};

    const USER: UserId = UserId::new(1);

    fn block(store: &MemoryStore, message: i64) -> Block {
        store
            .save_block(Block::new(USER, MessageId::new(message), MessageType::Inline))
            .unwrap()
    }

    fn page(store: &MemoryStore, block: BlockId, handler: &str) -> Page {
        store.save_page(Page::new(block, handler.into(), vec![])).unwrap()
    }

    #[test]
    fn test_ids_start_at_offsets() {
        let store = MemoryStore::new();
        let b = block(&store, 5);
        let p = page(&store, b.id, "Root");
        assert_eq!(b.id, BlockId::new(FIRST_BLOCK_ID));
        assert_eq!(p.id, PageId::new(FIRST_PAGE_ID));
    }

    #[test]
    fn test_save_block_upserts_by_message() {
        let store = MemoryStore::new();
        let first = block(&store, 5);
        let again = store
            .save_block(Block::new(USER, MessageId::new(5), MessageType::Text))
            .unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(store.blocks_count(USER).unwrap(), 1);
        assert_eq!(
            store.find_block(first.id).unwrap().unwrap().message_type,
            MessageType::Text
        );
    }

    #[test]
    fn test_last_page_and_order_survive_replace() {
        let store = MemoryStore::new();
        let b = block(&store, 5);
        let p1 = page(&store, b.id, "A");
        let p2 = page(&store, b.id, "B");
        let p3 = page(&store, b.id, "C");

        let replaced = store
            .save_page(
                Page::new(b.id, "A2".into(), vec![vec![CommandDef::new("X", "x")]]).with_id(p1.id),
            )
            .unwrap();
        assert_eq!(replaced.created_at, p1.created_at);

        let ids: Vec<_> = store.block_pages(b.id).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![p1.id, p2.id, p3.id]);
        assert_eq!(store.find_last_page(b.id).unwrap().unwrap().id, p3.id);
        assert_eq!(store.find_page(p1.id).unwrap().unwrap().handler.as_str(), "A2");
    }

    #[test]
    fn test_save_page_preconditions() {
        let store = MemoryStore::new();
        let b1 = block(&store, 5);
        let b2 = block(&store, 6);
        let p = page(&store, b1.id, "A");

        let err = store.save_page(Page::new(BlockId::new(42), "A".into(), vec![]));
        assert!(matches!(err, Err(StoreError::BlockNotFound(_))));

        let err = store.save_page(Page::new(b2.id, "A".into(), vec![]).with_id(p.id));
        assert!(matches!(err, Err(StoreError::PageNotInBlock { .. })));

        let err = store.save_page(Page::new(b1.id, "".into(), vec![]));
        assert!(matches!(err, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_delete_block_cascades() {
        let store = MemoryStore::new();
        let b = block(&store, 5);
        let p = page(&store, b.id, "A");
        let state = StateDef::from_items([StateItem::new(StateKey::new("i64", None), json!(1))]);
        store.save_state(&StateScope::Local(p.id), &state).unwrap();
        let shared = StateScope::Shared { user: USER, message: MessageId::new(5) };
        store.save_state(&shared, &state).unwrap();
        store.save_state(&StateScope::User(USER), &state).unwrap();

        store.delete_block(b.id).unwrap();

        assert!(store.find_page(p.id).unwrap().is_none());
        assert!(store.find_state(&StateScope::Local(p.id)).unwrap().is_none());
        assert!(store.find_state(&shared).unwrap().is_none());
        assert!(store.find_state(&StateScope::User(USER)).unwrap().is_some());
    }

    #[test]
    fn test_last_blocks_newest_first() {
        let store = MemoryStore::new();
        let ids: Vec<_> = (1..=4).map(|m| block(&store, m).id).collect();
        store
            .save_block(Block::new(UserId::new(2), MessageId::new(9), MessageType::Text))
            .unwrap();

        let last: Vec<_> = store.last_blocks(USER, 1, 2).unwrap().iter().map(|b| b.id).collect();
        assert_eq!(last, vec![ids[2], ids[1]]);
        assert_eq!(store.find_last_block(USER).unwrap().unwrap().id, ids[3]);
        assert_eq!(store.blocks_count(USER).unwrap(), 4);
    }

    #[test]
    fn test_stats_count_writes() {
        let store = MemoryStore::new();
        let b = block(&store, 5);
        page(&store, b.id, "A");
        store.save_state(&StateScope::Global, &StateDef::new()).unwrap();
        assert_eq!(
            store.stats(),
            StoreStats { block_writes: 1, page_writes: 1, state_writes: 1 }
        );
        store.reset_stats();
        assert_eq!(store.stats(), StoreStats::default());
    }
}

//! Per-user navigation state.
//!
//! A [`UserSession`] is the only way the engine touches a user's blocks, pages
//! and state scopes. It caches one provider per page and per message so every
//! call of a turn sees the same in-memory values, and it owns the user's turn
//! lock. The [`SessionRegistry`] hands out sessions and owns the global scope.

mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use telenav_types::{
    Block, BlockId, CommandDef, HandlerTag, MessageId, MessageType, Page, PageId, StateDef,
    StateItem, StateScope, SubCommand, SystemCommand, UserId,
};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::localize::Localizer;
use crate::state::{OverlayProvider, ScopedProvider, StateProvider, States, TempProvider};
use crate::store::StateStore;

pub use registry::SessionRegistry;

/// Exclusive hold on a user's turn. Released on drop.
pub type TurnGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Shared hold for read-only diagnostics.
pub type ReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// One user's view of the store.
pub struct UserSession {
    user_id: UserId,
    store: Arc<dyn StateStore>,
    localizer: Arc<dyn Localizer>,
    global: Arc<dyn StateProvider>,
    user: Arc<ScopedProvider>,
    shared: Mutex<HashMap<MessageId, Arc<ScopedProvider>>>,
    local: Mutex<HashMap<PageId, Arc<ScopedProvider>>>,
    turn: Arc<RwLock<()>>,
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("user_id", &self.user_id)
            .field("cached_shared", &self.shared.lock().len())
            .field("cached_local", &self.local.lock().len())
            .finish()
    }
}

impl UserSession {
    pub fn new(
        user_id: UserId,
        store: Arc<dyn StateStore>,
        localizer: Arc<dyn Localizer>,
        global: Arc<dyn StateProvider>,
    ) -> Self {
        let user = Arc::new(ScopedProvider::new(StateScope::User(user_id), store.clone()));
        Self {
            user_id,
            store,
            localizer,
            global,
            user,
            shared: Mutex::new(HashMap::new()),
            local: Mutex::new(HashMap::new()),
            turn: Arc::new(RwLock::new(())),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    // =========================================================================
    // Turn lock
    // =========================================================================

    /// Block until this user's previous turn is done, then hold the turn.
    pub fn lock_turn(&self) -> TurnGuard {
        self.turn.write_arc()
    }

    /// Shared hold for diagnostics; waits out a running turn.
    pub fn lock_read(&self) -> ReadGuard {
        self.turn.read_arc()
    }

    /// True while a turn is running.
    pub fn is_turn_active(&self) -> bool {
        self.turn.is_locked_exclusive()
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Most recently created block of this user.
    pub fn last_block(&self) -> SessionResult<Option<Block>> {
        Ok(self.store.find_last_block(self.user_id)?)
    }

    pub fn block_by_message_id(&self, message_id: MessageId) -> SessionResult<Option<Block>> {
        Ok(self.store.find_block_by_message(self.user_id, message_id)?)
    }

    /// Block by id, if it belongs to this user.
    pub fn find_block(&self, block_id: BlockId) -> SessionResult<Option<Block>> {
        Ok(self
            .store
            .find_block(block_id)?
            .filter(|b| b.user_id == self.user_id))
    }

    pub fn block_exists(&self, block_id: BlockId) -> SessionResult<bool> {
        Ok(self.find_block(block_id)?.is_some())
    }

    /// Block by id or a precondition failure.
    pub fn require_block(&self, block_id: BlockId) -> SessionResult<Block> {
        self.find_block(block_id)?
            .ok_or_else(|| SessionError::precondition(format!("block not found: {block_id}")))
    }

    pub fn find_block_by_page(&self, page_id: PageId) -> SessionResult<Option<Block>> {
        Ok(self
            .store
            .find_block_by_page(page_id)?
            .filter(|b| b.user_id == self.user_id))
    }

    pub fn find_block_id_by_page_id(&self, page_id: PageId) -> SessionResult<Option<BlockId>> {
        Ok(self.find_block_by_page(page_id)?.map(|b| b.id))
    }

    /// Newest-first page of this user's blocks.
    pub fn last_blocks(&self, offset: usize, limit: usize) -> SessionResult<Vec<Block>> {
        Ok(self.store.last_blocks(self.user_id, offset, limit)?)
    }

    pub fn blocks_count(&self) -> SessionResult<usize> {
        Ok(self.store.blocks_count(self.user_id)?)
    }

    /// Create the block bound to `message_id`, or update its type.
    pub fn save_block(&self, message_id: MessageId, message_type: MessageType) -> SessionResult<Block> {
        let block = self
            .store
            .save_block(Block::new(self.user_id, message_id, message_type))?;
        debug!(user = %self.user_id, block = %block.id, message = %message_id, "saved block");
        Ok(block)
    }

    /// Delete a block with its pages and state, and drop their cached providers.
    pub fn delete_block(&self, block_id: BlockId) -> SessionResult<()> {
        let Some(block) = self.find_block(block_id)? else {
            return Ok(());
        };
        let pages = self.store.block_pages(block.id)?;
        {
            let mut local = self.local.lock();
            for page in &pages {
                if let Some(provider) = local.remove(&page.id) {
                    provider.discard();
                }
            }
        }
        if let Some(provider) = self.shared.lock().remove(&block.message_id) {
            provider.discard();
        }
        self.store.delete_block(block.id)?;
        debug!(user = %self.user_id, block = %block.id, pages = pages.len(), "deleted block");
        Ok(())
    }

    // =========================================================================
    // Pages
    // =========================================================================

    pub fn find_page(&self, page_id: PageId) -> SessionResult<Option<Page>> {
        if self.find_block_by_page(page_id)?.is_none() {
            return Ok(None);
        }
        Ok(self.store.find_page(page_id)?)
    }

    pub fn page_exists(&self, page_id: PageId) -> SessionResult<bool> {
        Ok(self.find_page(page_id)?.is_some())
    }

    /// Current (last) page of a block.
    pub fn last_page(&self, block_id: BlockId) -> SessionResult<Option<Page>> {
        Ok(self.store.find_last_page(block_id)?)
    }

    /// Pages of a block in creation order.
    pub fn pages(&self, block_id: BlockId) -> SessionResult<Vec<Page>> {
        Ok(self.store.block_pages(block_id)?)
    }

    /// Append (`page_id` NONE) or replace a page of `block_id`.
    ///
    /// Sub-commands become persisted buttons with their titles resolved
    /// through the localizer.
    pub fn save_page(
        &self,
        block_id: BlockId,
        handler: &HandlerTag,
        sub_commands: Vec<Vec<SubCommand>>,
        page_id: PageId,
    ) -> SessionResult<Page> {
        self.require_block(block_id)?;
        if page_id.is_assigned() {
            match self.store.find_page(page_id)? {
                Some(page) if page.block_id == block_id => {}
                Some(page) => {
                    return Err(SessionError::precondition(format!(
                        "page {page_id} belongs to block {}, not {block_id}",
                        page.block_id
                    )));
                }
                None => {
                    return Err(SessionError::precondition(format!("page not found: {page_id}")));
                }
            }
        }

        let defs = self.to_command_defs(sub_commands)?;
        let page = Page::new(block_id, handler.clone(), defs).with_id(page_id);
        let saved = self.store.save_page(page)?;
        debug!(
            user = %self.user_id,
            block = %block_id,
            page = %saved.id,
            handler = %handler,
            replaced = page_id.is_assigned(),
            "saved page"
        );
        Ok(saved)
    }

    /// Remove a page. When it was the block's last page the block goes too.
    ///
    /// Returns true when the block was deleted.
    pub fn remove_page(&self, page_id: PageId) -> SessionResult<bool> {
        let Some(block) = self.find_block_by_page(page_id)? else {
            return Ok(false);
        };
        self.store.delete_page(page_id)?;
        if let Some(provider) = self.local.lock().remove(&page_id) {
            provider.discard();
        }

        if self.store.find_last_page(block.id)?.is_none() {
            self.delete_block(block.id)?;
            debug!(user = %self.user_id, page = %page_id, block = %block.id, "removed last page");
            return Ok(true);
        }
        debug!(user = %self.user_id, page = %page_id, block = %block.id, "removed page");
        Ok(false)
    }

    /// Persisted buttons for a grid of sub-commands.
    pub(crate) fn to_command_defs(&self, rows: Vec<Vec<SubCommand>>) -> SessionResult<Vec<Vec<CommandDef>>> {
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|sub| self.to_command_def(sub))
                    .collect::<SessionResult<Vec<_>>>()
            })
            .collect()
    }

    fn to_command_def(&self, sub: SubCommand) -> SessionResult<CommandDef> {
        let title_id = sub.effective_title_id();
        if title_id.is_empty() {
            return Err(SessionError::precondition(
                "button needs a title id or a handler",
            ));
        }
        if SystemCommand::is_reserved(&title_id) && (sub.handler.is_some() || sub.state.is_some()) {
            return Err(SessionError::precondition(format!(
                "title id {title_id} is reserved for system buttons"
            )));
        }
        let title = sub
            .title
            .clone()
            .unwrap_or_else(|| self.localizer.title(&title_id));
        Ok(sub.into_def(title))
    }

    // =========================================================================
    // State providers
    // =========================================================================

    /// Persisted local provider of a page, cached for the session.
    pub fn local_provider(&self, page_id: PageId) -> Arc<ScopedProvider> {
        self.local
            .lock()
            .entry(page_id)
            .or_insert_with(|| {
                Arc::new(ScopedProvider::new(StateScope::Local(page_id), self.store.clone()))
            })
            .clone()
    }

    /// Persisted shared provider of a block's message, cached for the session.
    pub fn shared_provider(&self, message_id: MessageId) -> Arc<ScopedProvider> {
        let scope = StateScope::Shared {
            user: self.user_id,
            message: message_id,
        };
        self.shared
            .lock()
            .entry(message_id)
            .or_insert_with(|| Arc::new(ScopedProvider::new(scope, self.store.clone())))
            .clone()
    }

    /// Merge items into a page's persisted local state and write it through.
    pub fn merge_local_state(&self, page_id: PageId, state: &StateDef) -> SessionResult<()> {
        let provider = self.local_provider(page_id);
        provider.merge_all(state.items())?;
        provider.flush()
    }

    /// States bound to an existing page of a block.
    pub fn states_for_page(&self, message_id: MessageId, page_id: PageId) -> States {
        States::new(
            self.local_provider(page_id),
            self.shared_provider(message_id),
            self.user.clone(),
            self.global.clone(),
        )
    }

    /// States with a button's attached state layered in.
    ///
    /// Without a page the local scope is a read-only snapshot of `state`;
    /// with one, `state` overrides the page's persisted local scope.
    pub fn states_with(&self, message_id: MessageId, state: Option<&StateDef>, page_id: PageId) -> States {
        let local: Arc<dyn StateProvider> = if page_id.is_assigned() {
            Arc::new(OverlayProvider::new(state, self.local_provider(page_id)))
        } else {
            Arc::new(TempProvider::new(state))
        };
        States::new(
            local,
            self.shared_provider(message_id),
            self.user.clone(),
            self.global.clone(),
        )
    }

    /// States for the root call: no page, no block.
    pub fn root_states(&self) -> States {
        States::new(
            Arc::new(TempProvider::empty()),
            Arc::new(TempProvider::empty()),
            self.user.clone(),
            self.global.clone(),
        )
    }

    /// Items of a page's local scope (empty for unknown pages).
    pub fn page_state(&self, page_id: PageId) -> SessionResult<Vec<StateItem>> {
        if !self.page_exists(page_id)? {
            return Ok(Vec::new());
        }
        self.local_provider(page_id).get_all()
    }

    /// Items of a block's shared scope (empty for unknown blocks).
    pub fn block_state(&self, block_id: BlockId) -> SessionResult<Vec<StateItem>> {
        match self.find_block(block_id)? {
            Some(block) => self.shared_provider(block.message_id).get_all(),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Cloning
    // =========================================================================

    /// Copy a block under a new message: same type, same pages with their
    /// buttons, same local and shared state. The source block is untouched.
    ///
    /// Returns the copy's last page. Fails if `new_message_id` already has a
    /// block or the source has no pages.
    pub fn clone_from_block(&self, block_id: BlockId, new_message_id: MessageId) -> SessionResult<Page> {
        let source = self.require_block(block_id)?;
        if let Some(bound) = self.block_by_message_id(new_message_id)? {
            return Err(SessionError::precondition(format!(
                "message {new_message_id} is already bound to block {}",
                bound.id
            )));
        }
        let pages = self.store.block_pages(source.id)?;
        if pages.is_empty() {
            return Err(SessionError::precondition(format!("block {block_id} has no pages")));
        }
        let target = self.save_block(new_message_id, source.message_type)?;

        let mut last = None;
        for page in pages {
            let copy = self
                .store
                .save_page(Page::new(target.id, page.handler.clone(), page.command_defs.clone()))?;
            let items = self.local_provider(page.id).get_all()?;
            if !items.is_empty() {
                self.merge_local_state(copy.id, &StateDef::from_items(items))?;
            }
            last = Some(copy);
        }

        let shared = self.shared_provider(source.message_id).get_all()?;
        if !shared.is_empty() {
            let provider = self.shared_provider(target.message_id);
            provider.merge_all(&shared)?;
            provider.flush()?;
        }

        debug!(user = %self.user_id, from = %source.id, to = %target.id, "cloned block");
        last.ok_or_else(|| SessionError::precondition(format!("block {block_id} has no pages")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localize::StaticLocalizer;
    use crate::store::MemoryStore;
    use serde_json::json;
    use telenav_types::{CommandBehaviour, StateKey, StateKind};

    const USER: UserId = UserId::new(11);

    fn session() -> (UserSession, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let global = Arc::new(ScopedProvider::new(StateScope::Global, store.clone()));
        let localizer = Arc::new(StaticLocalizer::with_system_defaults().with_title("NEXT", "Next"));
        (UserSession::new(USER, store.clone(), localizer, global), store)
    }

    fn tag(s: &str) -> HandlerTag {
        HandlerTag::from(s)
    }

    #[test]
    fn test_last_page_is_newest() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let p1 = s.save_page(block.id, &tag("A"), vec![], PageId::NONE).unwrap();
        let p2 = s.save_page(block.id, &tag("B"), vec![], PageId::NONE).unwrap();
        s.save_page(block.id, &tag("A2"), vec![], p1.id).unwrap();

        assert_eq!(s.last_page(block.id).unwrap().unwrap().id, p2.id);
        let ids: Vec<_> = s.pages(block.id).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![p1.id, p2.id]);
    }

    #[test]
    fn test_save_page_converts_sub_commands() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let page = s
            .save_page(
                block.id,
                &tag("Menu"),
                vec![vec![SubCommand::of("NextCommand"), SubCommand::back()]],
                PageId::NONE,
            )
            .unwrap();

        let row = &page.command_defs[0];
        assert_eq!(row[0].title_id, "NEXT");
        assert_eq!(row[0].title, "Next");
        assert_eq!(row[0].behaviour, Some(CommandBehaviour::SeparatePage));
        assert_eq!(row[1].title, "« Back");
        assert!(row[1].is_back_command());
    }

    #[test]
    fn test_save_page_preconditions() {
        let (s, _) = session();
        let b1 = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let b2 = s.save_block(MessageId::new(2), MessageType::Inline).unwrap();
        let p = s.save_page(b1.id, &tag("A"), vec![], PageId::NONE).unwrap();

        let wrong_block = s.save_page(b2.id, &tag("A"), vec![], p.id);
        assert!(matches!(wrong_block, Err(SessionError::Precondition(_))));

        let unknown = s.save_page(BlockId::new(1), &tag("A"), vec![], PageId::NONE);
        assert!(matches!(unknown, Err(SessionError::Precondition(_))));

        let reserved = s.save_page(
            b1.id,
            &tag("A"),
            vec![vec![SubCommand::new("_REFRESH").with_handler("Other")]],
            PageId::NONE,
        );
        assert!(matches!(reserved, Err(SessionError::Precondition(_))));
    }

    #[test]
    fn test_remove_last_page_deletes_block() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let p1 = s.save_page(block.id, &tag("A"), vec![], PageId::NONE).unwrap();
        let p2 = s.save_page(block.id, &tag("B"), vec![], PageId::NONE).unwrap();

        assert!(!s.remove_page(p2.id).unwrap());
        assert!(s.block_exists(block.id).unwrap());
        assert!(s.remove_page(p1.id).unwrap());
        assert!(!s.block_exists(block.id).unwrap());
    }

    #[test]
    fn test_states_with_page_overlays_persisted() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let page = s.save_page(block.id, &tag("A"), vec![], PageId::NONE).unwrap();
        let key = StateKey::named::<i64>("n");
        s.merge_local_state(page.id, &StateDef::from_items([StateItem::new(key.clone(), json!(1))]))
            .unwrap();

        let attached = StateDef::from_items([StateItem::new(key.clone(), json!(9))]);
        let states = s.states_with(block.message_id, Some(&attached), page.id);
        assert_eq!(states.get(StateKind::Local, &key).unwrap(), Some(json!(9)));

        let plain = s.states_for_page(block.message_id, page.id);
        assert_eq!(plain.get(StateKind::Local, &key).unwrap(), Some(json!(1)));

        let temp = s.states_with(block.message_id, Some(&attached), PageId::NONE);
        assert!(!temp.provider(StateKind::Local).can_flush());
    }

    #[test]
    fn test_root_states_have_no_persisted_local() {
        let (s, store) = session();
        let states = s.root_states();
        states.flush().unwrap();
        // user + global only
        assert_eq!(store.stats().state_writes, 2);
    }

    #[test]
    fn test_clone_from_block() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let p1 = s
            .save_page(block.id, &tag("A"), vec![vec![SubCommand::of("NextCommand")]], PageId::NONE)
            .unwrap();
        let p2 = s.save_page(block.id, &tag("B"), vec![], PageId::NONE).unwrap();
        let key = StateKey::named::<String>("q");
        s.merge_local_state(p1.id, &StateDef::from_items([StateItem::new(key.clone(), json!("one"))]))
            .unwrap();
        s.merge_local_state(p2.id, &StateDef::from_items([StateItem::new(key.clone(), json!("two"))]))
            .unwrap();
        let shared = s.shared_provider(block.message_id);
        shared.set(&key, Some(json!("shared"))).unwrap();
        shared.flush().unwrap();

        let last = s.clone_from_block(block.id, MessageId::new(2)).unwrap();
        let copy = s.block_by_message_id(MessageId::new(2)).unwrap().unwrap();
        assert_eq!(last.block_id, copy.id);
        assert_ne!(copy.id, block.id);
        assert_eq!(copy.message_type, block.message_type);

        let src_pages = s.pages(block.id).unwrap();
        let dst_pages = s.pages(copy.id).unwrap();
        assert_eq!(src_pages.len(), dst_pages.len());
        assert_eq!(dst_pages.last().map(|p| p.id), Some(last.id));
        for (src, dst) in src_pages.iter().zip(&dst_pages) {
            assert_eq!(src.handler, dst.handler);
            assert_eq!(src.command_defs, dst.command_defs);
            assert_eq!(s.page_state(src.id).unwrap(), s.page_state(dst.id).unwrap());
        }
        assert_eq!(s.block_state(copy.id).unwrap(), s.block_state(block.id).unwrap());
    }

    #[test]
    fn test_clone_into_bound_message_rejected() {
        let (s, _) = session();
        let block = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        s.save_page(block.id, &tag("A"), vec![], PageId::NONE).unwrap();
        let other = s.save_block(MessageId::new(2), MessageType::Inline).unwrap();
        let kept = s.save_page(other.id, &tag("B"), vec![], PageId::NONE).unwrap();

        let onto_other = s.clone_from_block(block.id, other.message_id);
        assert!(matches!(onto_other, Err(SessionError::Precondition(_))));
        let onto_self = s.clone_from_block(block.id, block.message_id);
        assert!(matches!(onto_self, Err(SessionError::Precondition(_))));

        let pages = s.pages(other.id).unwrap();
        assert_eq!(pages.iter().map(|p| p.id).collect::<Vec<_>>(), vec![kept.id]);
        assert_eq!(s.block_by_message_id(MessageId::new(2)).unwrap().unwrap().id, other.id);
    }

    #[test]
    fn test_clone_without_pages_rejected() {
        let (s, _) = session();
        let empty = s.save_block(MessageId::new(1), MessageType::Inline).unwrap();
        let result = s.clone_from_block(empty.id, MessageId::new(2));
        assert!(matches!(result, Err(SessionError::Precondition(_))));
        assert!(s.block_by_message_id(MessageId::new(2)).unwrap().is_none());
    }

    #[test]
    fn test_foreign_blocks_are_invisible() {
        let (s, store) = session();
        let other = store
            .save_block(Block::new(UserId::new(99), MessageId::new(1), MessageType::Text))
            .unwrap();
        assert!(s.find_block(other.id).unwrap().is_none());
        assert!(s.last_block().unwrap().is_none());
    }

    #[test]
    fn test_turn_lock_state() {
        let (s, _) = session();
        assert!(!s.is_turn_active());
        let guard: TurnGuard = s.lock_turn();
        assert!(s.is_turn_active());
        drop(guard);
        let first: ReadGuard = s.lock_read();
        let second: ReadGuard = s.lock_read();
        assert!(!s.is_turn_active());
        drop((first, second));
        let _turn: TurnGuard = s.lock_turn();
        assert!(s.is_turn_active());
    }
}

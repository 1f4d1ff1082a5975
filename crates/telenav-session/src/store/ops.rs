//! Store operations trait.

use telenav_types::{Block, BlockId, MessageId, Page, PageId, StateDef, StateScope, UserId};

use super::StoreResult;

/// Backing store for blocks, pages and state scopes.
///
/// All methods take `&self`; implementations guard their own data. Callers
/// that need a read-modify-write sequence to be atomic hold the user's turn
/// lock around it.
pub trait StateStore: Send + Sync {
    // ========================================================================
    // Blocks
    // ========================================================================

    /// Insert a block, or update the one already bound to the same
    /// (user, message) pair. Returns the stored block with its id.
    fn save_block(&self, block: Block) -> StoreResult<Block>;

    fn find_block(&self, id: BlockId) -> StoreResult<Option<Block>>;

    fn find_block_by_message(&self, user: UserId, message: MessageId) -> StoreResult<Option<Block>>;

    /// Most recently created block of a user.
    fn find_last_block(&self, user: UserId) -> StoreResult<Option<Block>>;

    fn find_block_by_page(&self, page: PageId) -> StoreResult<Option<Block>>;

    /// Blocks of a user, newest first, skipping `offset` and returning at
    /// most `limit`.
    fn last_blocks(&self, user: UserId, offset: usize, limit: usize) -> StoreResult<Vec<Block>>;

    fn blocks_count(&self, user: UserId) -> StoreResult<usize>;

    /// Delete a block with its pages, their local state and its shared state.
    /// Unknown ids are a no-op.
    fn delete_block(&self, id: BlockId) -> StoreResult<()>;

    // ========================================================================
    // Pages
    // ========================================================================

    /// Append a page (id `NONE`) or replace an existing one in place.
    ///
    /// Replacement keeps the page's position and `created_at`. Fails if the
    /// block is unknown or the page belongs to another block.
    fn save_page(&self, page: Page) -> StoreResult<Page>;

    fn find_page(&self, id: PageId) -> StoreResult<Option<Page>>;

    /// Last page of a block in creation order.
    fn find_last_page(&self, block: BlockId) -> StoreResult<Option<Page>>;

    /// All pages of a block in creation order.
    fn block_pages(&self, block: BlockId) -> StoreResult<Vec<Page>>;

    /// Delete a page and its local state. Unknown ids are a no-op.
    fn delete_page(&self, id: PageId) -> StoreResult<()>;

    // ========================================================================
    // State scopes
    // ========================================================================

    fn find_state(&self, scope: &StateScope) -> StoreResult<Option<StateDef>>;

    /// Replace the whole state set of a scope.
    fn save_state(&self, scope: &StateScope, state: &StateDef) -> StoreResult<()>;
}

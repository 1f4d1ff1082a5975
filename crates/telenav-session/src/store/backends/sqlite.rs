//! SQLite store backend.
//!
//! Blocks and pages are relational rows; button grids and state sets are JSON
//! text columns. Pages and local state hang off their parents with
//! `ON DELETE CASCADE`, shared state is removed explicitly with its block.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use telenav_types::{
    Block, BlockId, MessageId, MessageType, Page, PageId, StateDef, StateScope, UserId, now_millis,
};

use crate::store::error::{StoreError, StoreResult};
use crate::store::ops::StateStore;

const SCHEMA: &str = r#"
-- One row per live chat message carrying navigation
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    message_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, message_id)
);
CREATE INDEX IF NOT EXISTS idx_blocks_user ON blocks(user_id, id);

-- Pages in creation order (id ascending) under their block
CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY,
    block_id INTEGER NOT NULL,
    handler TEXT NOT NULL,
    command_defs TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (block_id) REFERENCES blocks(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_pages_block ON pages(block_id, id);

-- State scopes
CREATE TABLE IF NOT EXISTS local_states (
    page_id INTEGER PRIMARY KEY,
    items TEXT NOT NULL,
    FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS shared_states (
    user_id INTEGER NOT NULL,
    message_id INTEGER NOT NULL,
    items TEXT NOT NULL,
    PRIMARY KEY (user_id, message_id)
);

CREATE TABLE IF NOT EXISTS user_states (
    user_id INTEGER PRIMARY KEY,
    items TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS global_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    items TEXT NOT NULL
);
"#;

const BLOCK_COLUMNS: &str = "id, user_id, message_id, message_type, created_at";
const PAGE_COLUMNS: &str = "id, block_id, handler, command_defs, created_at, updated_at";

/// Raw `blocks` row before enum decoding.
struct BlockRow {
    id: i64,
    user_id: i64,
    message_id: i64,
    message_type: String,
    created_at: i64,
}

impl BlockRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            message_id: row.get(2)?,
            message_type: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_block(self) -> StoreResult<Block> {
        let message_type = MessageType::from_str(&self.message_type).ok_or_else(|| {
            StoreError::corrupt(format!("block {}: message type {:?}", self.id, self.message_type))
        })?;
        Ok(Block {
            id: BlockId::new(self.id),
            message_id: MessageId::new(self.message_id),
            user_id: UserId::new(self.user_id),
            message_type,
            created_at: self.created_at as u64,
        })
    }
}

/// Raw `pages` row before JSON decoding.
struct PageRow {
    id: i64,
    block_id: i64,
    handler: String,
    command_defs: String,
    created_at: i64,
    updated_at: i64,
}

impl PageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            block_id: row.get(1)?,
            handler: row.get(2)?,
            command_defs: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_page(self) -> StoreResult<Page> {
        Ok(Page {
            id: PageId::new(self.id),
            block_id: BlockId::new(self.block_id),
            handler: self.handler.into(),
            command_defs: serde_json::from_str(&self.command_defs)?,
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
        })
    }
}

/// Store backed by a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_blocks(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Vec<Block>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, BlockRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(BlockRow::into_block).collect()
    }

    fn query_block(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Option<Block>> {
        conn.query_row(sql, params, BlockRow::from_row)
            .optional()?
            .map(BlockRow::into_block)
            .transpose()
    }

    fn query_page(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Option<Page>> {
        conn.query_row(sql, params, PageRow::from_row)
            .optional()?
            .map(PageRow::into_page)
            .transpose()
    }

    fn query_items(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StoreResult<Option<StateDef>> {
        let items: Option<String> = conn.query_row(sql, params, |row| row.get(0)).optional()?;
        Ok(items.map(|s| serde_json::from_str(&s)).transpose()?)
    }
}

impl StateStore for SqliteStore {
    // =========================================================================
    // Blocks
    // =========================================================================

    fn save_block(&self, block: Block) -> StoreResult<Block> {
        block.validate()?;
        let conn = self.conn.lock();
        let (id, created_at): (i64, i64) = conn.query_row(
            "INSERT INTO blocks (user_id, message_id, message_type, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, message_id) DO UPDATE SET message_type = excluded.message_type
             RETURNING id, created_at",
            params![
                block.user_id.get(),
                block.message_id.get(),
                block.message_type.as_str(),
                block.created_at as i64,
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(Block {
            id: BlockId::new(id),
            created_at: created_at as u64,
            ..block
        })
    }

    fn find_block(&self, id: BlockId) -> StoreResult<Option<Block>> {
        let conn = self.conn.lock();
        Self::query_block(
            &conn,
            &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE id = ?1"),
            params![id.get()],
        )
    }

    fn find_block_by_message(&self, user: UserId, message: MessageId) -> StoreResult<Option<Block>> {
        let conn = self.conn.lock();
        Self::query_block(
            &conn,
            &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE user_id = ?1 AND message_id = ?2"),
            params![user.get(), message.get()],
        )
    }

    fn find_last_block(&self, user: UserId) -> StoreResult<Option<Block>> {
        let conn = self.conn.lock();
        Self::query_block(
            &conn,
            &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE user_id = ?1 ORDER BY id DESC LIMIT 1"),
            params![user.get()],
        )
    }

    fn find_block_by_page(&self, page: PageId) -> StoreResult<Option<Block>> {
        let conn = self.conn.lock();
        Self::query_block(
            &conn,
            "SELECT b.id, b.user_id, b.message_id, b.message_type, b.created_at
             FROM blocks b JOIN pages p ON p.block_id = b.id WHERE p.id = ?1",
            params![page.get()],
        )
    }

    fn last_blocks(&self, user: UserId, offset: usize, limit: usize) -> StoreResult<Vec<Block>> {
        let conn = self.conn.lock();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        Self::query_blocks(
            &conn,
            &format!(
                "SELECT {BLOCK_COLUMNS} FROM blocks WHERE user_id = ?1
                 ORDER BY id DESC LIMIT ?2 OFFSET ?3"
            ),
            params![user.get(), limit, offset],
        )
    }

    fn blocks_count(&self, user: UserId) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE user_id = ?1",
            params![user.get()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM shared_states WHERE (user_id, message_id) =
             (SELECT user_id, message_id FROM blocks WHERE id = ?1)",
            params![id.get()],
        )?;
        tx.execute("DELETE FROM blocks WHERE id = ?1", params![id.get()])?;
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Pages
    // =========================================================================

    fn save_page(&self, page: Page) -> StoreResult<Page> {
        page.validate()?;
        let defs = serde_json::to_string(&page.command_defs)?;
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let block_exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM blocks WHERE id = ?1)",
            params![page.block_id.get()],
            |row| row.get(0),
        )?;
        if !block_exists {
            return Err(StoreError::BlockNotFound(page.block_id));
        }

        let saved = if page.id.is_none() {
            tx.execute(
                "INSERT INTO pages (block_id, handler, command_defs, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    page.block_id.get(),
                    page.handler.as_str(),
                    defs,
                    page.created_at as i64,
                    page.updated_at as i64,
                ],
            )?;
            Page {
                id: PageId::new(tx.last_insert_rowid()),
                ..page
            }
        } else {
            let existing: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT block_id, created_at FROM pages WHERE id = ?1",
                    params![page.id.get()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (block_id, created_at) = existing.ok_or(StoreError::PageNotFound(page.id))?;
            if block_id != page.block_id.get() {
                return Err(StoreError::PageNotInBlock {
                    page: page.id,
                    block: page.block_id,
                });
            }
            let updated_at = now_millis();
            tx.execute(
                "UPDATE pages SET handler = ?1, command_defs = ?2, updated_at = ?3 WHERE id = ?4",
                params![page.handler.as_str(), defs, updated_at as i64, page.id.get()],
            )?;
            Page {
                created_at: created_at as u64,
                updated_at,
                ..page
            }
        };

        tx.commit()?;
        Ok(saved)
    }

    fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        let conn = self.conn.lock();
        Self::query_page(
            &conn,
            &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = ?1"),
            params![id.get()],
        )
    }

    fn find_last_page(&self, block: BlockId) -> StoreResult<Option<Page>> {
        let conn = self.conn.lock();
        Self::query_page(
            &conn,
            &format!("SELECT {PAGE_COLUMNS} FROM pages WHERE block_id = ?1 ORDER BY id DESC LIMIT 1"),
            params![block.get()],
        )
    }

    fn block_pages(&self, block: BlockId) -> StoreResult<Vec<Page>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE block_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![block.get()], PageRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(PageRow::into_page).collect()
    }

    fn delete_page(&self, id: PageId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM pages WHERE id = ?1", params![id.get()])?;
        Ok(())
    }

    // =========================================================================
    // State scopes
    // =========================================================================

    fn find_state(&self, scope: &StateScope) -> StoreResult<Option<StateDef>> {
        let conn = self.conn.lock();
        match scope {
            StateScope::Local(page) => Self::query_items(
                &conn,
                "SELECT items FROM local_states WHERE page_id = ?1",
                params![page.get()],
            ),
            StateScope::Shared { user, message } => Self::query_items(
                &conn,
                "SELECT items FROM shared_states WHERE user_id = ?1 AND message_id = ?2",
                params![user.get(), message.get()],
            ),
            StateScope::User(user) => Self::query_items(
                &conn,
                "SELECT items FROM user_states WHERE user_id = ?1",
                params![user.get()],
            ),
            StateScope::Global => {
                Self::query_items(&conn, "SELECT items FROM global_state WHERE id = 1", params![])
            }
        }
    }

    fn save_state(&self, scope: &StateScope, state: &StateDef) -> StoreResult<()> {
        let items = serde_json::to_string(state)?;
        let conn = self.conn.lock();
        match scope {
            StateScope::Local(page) => conn.execute(
                "INSERT INTO local_states (page_id, items) VALUES (?1, ?2)
                 ON CONFLICT (page_id) DO UPDATE SET items = excluded.items",
                params![page.get(), items],
            )?,
            StateScope::Shared { user, message } => conn.execute(
                "INSERT INTO shared_states (user_id, message_id, items) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id, message_id) DO UPDATE SET items = excluded.items",
                params![user.get(), message.get(), items],
            )?,
            StateScope::User(user) => conn.execute(
                "INSERT INTO user_states (user_id, items) VALUES (?1, ?2)
                 ON CONFLICT (user_id) DO UPDATE SET items = excluded.items",
                params![user.get(), items],
            )?,
            StateScope::Global => conn.execute(
                "INSERT INTO global_state (id, items) VALUES (1, ?1)
                 ON CONFLICT (id) DO UPDATE SET items = excluded.items",
                params![items],
            )?,
        };
        Ok(())
    }
}

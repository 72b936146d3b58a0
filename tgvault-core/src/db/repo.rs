//! Database repository layer
//!
//! Provides query and insert operations for the catalogue, categories,
//! and the per-chat stats snapshot.

use crate::error::{Error, Result};
use crate::types::*;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle (single connection behind a mutex)
///
/// A single chat's record is only ever mutated by one writer at a
/// time: every mutation runs inside one transaction while holding the
/// connection lock, so readers see either the old or the new state of
/// a row set, never a torn one.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Catalogue operations
    // ============================================

    /// Wholesale-replace the chat catalogue.
    ///
    /// Runs in one transaction so readers see either the previous or
    /// the new catalogue. Category assignments are keyed by platform
    /// id and survive the replace.
    pub fn replace_chats(&self, chats: &[ChatRef]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chats", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chats (tg_id, title, kind, participants) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for chat in chats {
                stmt.execute(params![
                    chat.id,
                    chat.title,
                    chat.kind.as_str(),
                    chat.participants,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(count = chats.len(), "Catalogue replaced");
        Ok(())
    }

    /// Get one chat by its platform id
    pub fn get_chat(&self, tg_id: i64) -> Result<Option<ChatRef>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT tg_id, title, kind, participants FROM chats WHERE tg_id = ?",
            [tg_id],
            Self::row_to_chat,
        )
        .optional()
        .map_err(Error::from)
    }

    /// All chats, ascending by platform id
    pub fn list_chats(&self) -> Result<Vec<ChatRef>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT tg_id, title, kind, participants FROM chats ORDER BY tg_id ASC")?;
        let chats = stmt
            .query_map([], Self::row_to_chat)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chats)
    }

    /// Chats with their assigned category names, for table display
    pub fn list_chats_with_categories(&self) -> Result<Vec<ChatListing>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT
                c.tg_id,
                c.title,
                c.kind,
                c.participants,
                COALESCE(GROUP_CONCAT(cat.name, ','), '') AS categories
            FROM chats c
            LEFT JOIN chat_categories cc ON c.tg_id = cc.chat_tg_id
            LEFT JOIN categories cat ON cc.category_id = cat.id
            GROUP BY c.tg_id, c.title, c.kind, c.participants
            ORDER BY c.tg_id ASC
            "#,
        )?;

        let listings = stmt
            .query_map([], |row| {
                let chat = Self::row_to_chat(row)?;
                let joined: String = row.get("categories")?;
                let categories = if joined.is_empty() {
                    Vec::new()
                } else {
                    joined.split(',').map(|s| s.to_string()).collect()
                };
                Ok(ChatListing { chat, categories })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(listings)
    }

    fn row_to_chat(row: &Row) -> rusqlite::Result<ChatRef> {
        let kind_str: String = row.get("kind")?;
        Ok(ChatRef {
            id: row.get("tg_id")?,
            title: row.get("title")?,
            // Lenient: unknown kinds read back as groups
            kind: kind_str.parse().unwrap_or(ChatKind::Group),
            participants: row.get("participants")?,
        })
    }

    // ============================================
    // Category operations
    // ============================================

    /// Create a category; fails on duplicate name
    pub fn create_category(&self, name: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
        Ok(conn.last_insert_rowid())
    }

    /// All categories, alphabetical
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name ASC")?;
        let cats = stmt
            .query_map([], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cats)
    }

    /// Case-insensitive substring search over category names
    pub fn search_categories(&self, term: &str) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name FROM categories WHERE LOWER(name) LIKE LOWER(?1) ORDER BY name ASC",
        )?;
        let cats = stmt
            .query_map([format!("%{}%", term)], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cats)
    }

    /// Assign a category to a chat. Returns false if already assigned.
    pub fn assign_category(&self, chat_tg_id: i64, category_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO chat_categories (chat_tg_id, category_id) VALUES (?1, ?2)",
            params![chat_tg_id, category_id],
        )?;
        Ok(inserted > 0)
    }

    /// Remove a category from a chat
    pub fn unassign_category(&self, chat_tg_id: i64, category_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM chat_categories WHERE chat_tg_id = ?1 AND category_id = ?2",
            params![chat_tg_id, category_id],
        )?;
        Ok(())
    }

    /// Categories assigned to a chat, alphabetical
    pub fn categories_for_chat(&self, chat_tg_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name
            FROM categories c
            JOIN chat_categories cc ON cc.category_id = c.id
            WHERE cc.chat_tg_id = ?1
            ORDER BY c.name ASC
            "#,
        )?;
        let cats = stmt
            .query_map([chat_tg_id], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cats)
    }

    /// Categories not yet assigned to a chat, optionally filtered by a
    /// case-insensitive search term
    pub fn available_categories_for_chat(
        &self,
        chat_tg_id: i64,
        search: Option<&str>,
    ) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.name
            FROM categories c
            WHERE c.id NOT IN (
                SELECT cc.category_id
                FROM chat_categories cc
                WHERE cc.chat_tg_id = ?1
            )
            AND LOWER(c.name) LIKE LOWER(?2)
            ORDER BY c.name ASC
            "#,
        )?;
        let pattern = format!("%{}%", search.unwrap_or(""));
        let cats = stmt
            .query_map(params![chat_tg_id, pattern], Self::row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cats)
    }

    fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }

    // ============================================
    // Stats snapshot operations
    // ============================================

    /// Atomically replace a chat's stats snapshot.
    ///
    /// Delete and bulk insert run in a single transaction: a
    /// concurrent reader sees the old snapshot or the new one, never a
    /// partial mix. Any failure rolls the whole replace back.
    pub fn replace_chat_stats(&self, chat_id: i64, rows: &[StatsRow]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chat_stats WHERE chat_id = ?1", [chat_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chat_stats (chat_id, message_id, date_time, text)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(params![chat_id, row.message_id, row.date_time, row.text])?;
            }
        }

        tx.commit()?;
        tracing::debug!(chat_id, rows = rows.len(), "Stats snapshot replaced");
        Ok(())
    }

    /// Per-day message counts, ascending by date.
    ///
    /// Days with zero messages are absent from the result; gap-filling
    /// belongs to the presentation layer.
    pub fn daily_counts(&self, chat_id: i64) -> Result<Vec<DailyCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT substr(date_time, 1, 10) AS day, COUNT(*) AS n
            FROM chat_stats
            WHERE chat_id = ?1
            GROUP BY day
            ORDER BY day ASC
            "#,
        )?;
        let counts = stmt
            .query_map([chat_id], |row| {
                Ok(DailyCount {
                    date: row.get("day")?,
                    count: row.get("n")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Snapshot totals for a chat: (messages, distinct days)
    pub fn stats_totals(&self, chat_id: i64) -> Result<(u64, u64)> {
        let conn = self.conn.lock().unwrap();
        let (messages, days): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT substr(date_time, 1, 10))
             FROM chat_stats WHERE chat_id = ?1",
            [chat_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((messages as u64, days as u64))
    }
}

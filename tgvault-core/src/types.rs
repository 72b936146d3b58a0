//! Core domain types for tgvault
//!
//! These types carry no transport-specific detail: everything coming
//! from the messaging platform is mapped into them by an adapter
//! behind the [`crate::source::MessengerClient`] port.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Chat** | A group or broadcast channel on the platform; private conversations are excluded from the catalogue |
//! | **Watermark** | Highest message id already durably processed for an artifact; exclusive lower bound for resumption |
//! | **Checkpoint** | Persisted export progress record enabling resumable continuation |
//! | **Artifact** | A derived output of ingestion: the text export or the stats snapshot |
//! | **Snapshot replace** | Full delete-and-reinsert of a derived dataset |

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================
// Chats
// ============================================

/// Kind of chat tracked in the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// Group or supergroup (members post)
    Group,
    /// Broadcast channel (one-way)
    Broadcast,
}

impl ChatKind {
    /// Identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Group => "group",
            ChatKind::Broadcast => "broadcast",
        }
    }

    /// Display name for table output
    pub fn display_name(&self) -> &'static str {
        match self {
            ChatKind::Group => "chat",
            ChatKind::Broadcast => "channel",
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChatKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group" | "chat" => Ok(ChatKind::Group),
            "broadcast" | "channel" => Ok(ChatKind::Broadcast),
            _ => Err(format!("unknown chat kind: {}", s)),
        }
    }
}

/// Immutable identity of a chat, resolved once per ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRef {
    /// Platform-assigned id, stable across title changes
    pub id: i64,
    /// Display title at the time of the last catalogue refresh
    pub title: String,
    /// Group vs broadcast channel
    pub kind: ChatKind,
    /// Member count, when the platform exposes it
    pub participants: Option<i32>,
}

/// Catalogue row for display: a chat plus its assigned category names.
#[derive(Debug, Clone)]
pub struct ChatListing {
    pub chat: ChatRef,
    /// Category names, alphabetical
    pub categories: Vec<String>,
}

// ============================================
// Messages
// ============================================

/// A single message as yielded by the paginated source.
///
/// Ids are monotonically increasing per chat but not globally unique.
/// Never mutated after being observed. Non-text messages arrive with an
/// empty `text`; they still advance the watermark but are neither
/// exported nor counted toward file word budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Timestamp with the platform-provided offset
    pub date: DateTime<FixedOffset>,
    /// Sender display name, when known
    pub sender: Option<String>,
    pub text: String,
}

impl Message {
    /// Whether this message carries exportable text
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

// ============================================
// Categories
// ============================================

/// A user-defined tag assignable to any number of chats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

// ============================================
// Export checkpoint
// ============================================

/// Durable export progress for one chat.
///
/// Owned exclusively by the export writer: created on first export,
/// flushed after every processed batch and on file rollover, read back
/// on every invocation to resume above `last_message_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCheckpoint {
    pub chat_id: i64,
    pub chat_title: String,
    /// Watermark: highest message id already written (or skipped as
    /// empty). `None` means no message has been processed yet.
    pub last_message_id: Option<i64>,
    /// 1-based index of the file currently being appended to
    pub last_file_index: u32,
    /// Words already written to the current file
    pub current_file_word_count: u64,
    /// Word budget the files were written against
    pub words_per_file: u64,
    pub updated_at: DateTime<Utc>,
}

impl ExportCheckpoint {
    /// Fresh checkpoint for a chat that has never been exported.
    pub fn new(chat: &ChatRef, words_per_file: u64) -> Self {
        Self {
            chat_id: chat.id,
            chat_title: chat.title.clone(),
            last_message_id: None,
            last_file_index: 1,
            current_file_word_count: 0,
            words_per_file,
            updated_at: Utc::now(),
        }
    }

    /// Exclusive lower bound for the next pull.
    pub fn watermark(&self) -> i64 {
        self.last_message_id.unwrap_or(0)
    }
}

// ============================================
// Stats snapshot
// ============================================

/// One row of the per-chat stats snapshot.
///
/// The stored set for a chat is exactly the set of message ids the
/// source returned at the time of the last full replace; it is never
/// partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub message_id: i64,
    /// RFC 3339 timestamp as observed, offset preserved
    pub date_time: String,
    pub text: String,
}

impl StatsRow {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            message_id: msg.id,
            date_time: msg.date.to_rfc3339(),
            text: msg.text.clone(),
        }
    }

    /// Calendar-day portion ("YYYY-MM-DD") of the stored timestamp.
    pub fn day(&self) -> &str {
        &self.date_time[..10.min(self.date_time.len())]
    }
}

/// Derived day bucket; days with zero messages are absent, not zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// "YYYY-MM-DD"
    pub date: String,
    pub count: i64,
}

// ============================================
// Run outcomes
// ============================================

/// Result of one export run.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Messages written to disk during this run (empty-text skips
    /// excluded)
    pub messages_written: u64,
    /// Number of distinct files touched, including the resumed one
    pub files_used: u32,
    /// Export directory for this chat
    pub directory: PathBuf,
}

/// Result of one stats refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsOutcome {
    /// Messages captured in the snapshot, empty-text ones included
    pub total_messages: u64,
    /// Distinct calendar days covered
    pub total_days: u64,
}

//! Per-chat message statistics
//!
//! Unlike the export, stats have no incremental watermark: every
//! refresh re-pulls the full history from id 0 and atomically replaces
//! the chat's snapshot, so the stored set always mirrors one
//! point-in-time view of the source. Day buckets are derived from the
//! snapshot on demand and never stored.

use crate::db::Database;
use crate::error::Result;
use crate::source::MessageStream;
use crate::types::{ChatRef, DailyCount, StatsOutcome, StatsRow};
use std::collections::BTreeSet;

/// Builds and queries the day-bucketed message-count snapshot.
pub struct StatsAggregator<'a> {
    db: &'a Database,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Re-pull the full history and replace the chat's snapshot.
    ///
    /// Collects every message, empty-text ones included (day bucketing
    /// needs no text), then performs a single delete-and-bulk-insert.
    /// A failed replace aborts the refresh; a partial snapshot is
    /// never left behind.
    pub async fn refresh(
        &self,
        chat: &ChatRef,
        stream: &mut MessageStream<'_>,
    ) -> Result<StatsOutcome> {
        let mut rows = Vec::new();
        while let Some(msg) = stream.next().await? {
            rows.push(StatsRow::from_message(&msg));
        }

        self.db.replace_chat_stats(chat.id, &rows)?;

        let days: BTreeSet<&str> = rows.iter().map(|r| r.day()).collect();
        let outcome = StatsOutcome {
            total_messages: rows.len() as u64,
            total_days: days.len() as u64,
        };

        tracing::info!(
            chat_id = chat.id,
            messages = outcome.total_messages,
            days = outcome.total_days,
            "Stats snapshot refreshed"
        );
        Ok(outcome)
    }

    /// Per-day counts for a chat, ascending by date, absent days
    /// omitted.
    pub fn daily_counts(&self, chat_id: i64) -> Result<Vec<DailyCount>> {
        self.db.daily_counts(chat_id)
    }
}

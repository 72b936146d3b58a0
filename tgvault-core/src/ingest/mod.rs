//! Ingestion coordination
//!
//! Drives one pull of a chat's history into one derived artifact:
//! either the resumable text export or the stats snapshot. A run walks
//! the phases
//!
//! ```text
//! Idle -> Connecting -> Streaming -> Finalizing -> Done
//!                          |
//!                          v (any error)
//!                      Interrupted: best-effort checkpoint flush,
//!                      error propagates to the caller
//! ```
//!
//! and occupies one logical task for its whole lifetime. Independent
//! chats (and the two artifacts of one chat) may run in parallel;
//! a second run for the same (chat, artifact) pair is rejected.

use crate::config::{Config, ExportConfig, PacingConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::export::{export_dir, CheckpointStore, ExportWriter};
use crate::source::{MessageStream, MessengerClient, RetryPolicy};
use crate::stats::StatsAggregator;
use crate::types::{ChatRef, ExportOutcome, StatsOutcome};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

/// The two derived outputs of ingestion, with independent progress
/// semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// Append-only, watermark-resumable text export
    Export,
    /// Wholesale-replaced stats snapshot
    Stats,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::Export => "export",
            Artifact::Stats => "stats",
        }
    }
}

/// Coordinates ingestion runs over the messenger port.
pub struct IngestCoordinator {
    db: Database,
    exports_root: PathBuf,
    export_cfg: ExportConfig,
    pacing: PacingConfig,
    retry: RetryPolicy,
    /// In-flight (chat, artifact) pairs
    active: Mutex<HashSet<(i64, Artifact)>>,
}

impl IngestCoordinator {
    /// Create a coordinator from loaded configuration.
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            exports_root: config.exports_dir(),
            export_cfg: config.export.clone(),
            pacing: config.pacing,
            retry: RetryPolicy::default(),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Override the transient-failure retry strategy (default:
    /// fail-fast).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Direct access to the catalogue/stats store.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Pull the chat list from the platform and wholesale-replace the
    /// local catalogue. Returns the number of chats stored.
    pub async fn sync_catalog(&self, client: &dyn MessengerClient) -> Result<usize> {
        self.ensure_authorized(client).await?;

        let chats = client.list_chats().await?;
        self.db.replace_chats(&chats)?;

        tracing::info!(count = chats.len(), "Catalogue synced");
        Ok(chats.len())
    }

    /// Export a chat's history, resuming from its checkpoint.
    pub async fn export_chat(
        &self,
        client: &dyn MessengerClient,
        chat_id: i64,
    ) -> Result<ExportOutcome> {
        self.export_chat_with_progress(client, chat_id, |_| {}).await
    }

    /// Export with a progress callback receiving the running count of
    /// processed messages.
    pub async fn export_chat_with_progress<F>(
        &self,
        client: &dyn MessengerClient,
        chat_id: i64,
        mut on_progress: F,
    ) -> Result<ExportOutcome>
    where
        F: FnMut(u64),
    {
        let _guard = self.acquire(chat_id, Artifact::Export)?;

        // Connecting
        self.ensure_authorized(client).await?;
        let chat = self.chat_from_catalogue(chat_id)?;
        let handle = client.resolve(chat_id).await?;

        // Load checkpoint; a corrupt record was already discarded with
        // a warning by the store
        let store = CheckpointStore::new(&export_dir(&self.exports_root, &chat));
        let checkpoint = store.load()?;
        let min_id = checkpoint.as_ref().map(|c| c.watermark()).unwrap_or(0);

        tracing::info!(
            chat_id,
            resume_above = min_id,
            resuming = checkpoint.is_some(),
            "Starting export run"
        );

        let mut writer = ExportWriter::open(
            &self.exports_root,
            &chat,
            checkpoint,
            self.export_cfg.words_per_file,
        )?;
        let mut stream =
            MessageStream::new(client, handle, min_id, self.pacing, self.retry);

        // Streaming
        let mut processed = 0u64;
        let mut since_flush = 0u64;
        let streamed: Result<()> = loop {
            match stream.next().await {
                Ok(Some(msg)) => {
                    if let Err(e) = writer.write_message(&msg) {
                        break Err(e);
                    }
                    processed += 1;
                    since_flush += 1;
                    on_progress(processed);

                    if since_flush >= self.export_cfg.checkpoint_every {
                        self.flush_checkpoint(&store, &writer);
                        since_flush = 0;
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = streamed {
            // Interrupted: keep whatever progress we can, then
            // propagate. The next run resumes above the last flushed
            // watermark; the unflushed tail is re-fetched.
            tracing::warn!(chat_id, error = %e, "Export interrupted");
            self.flush_checkpoint(&store, &writer);
            let _ = writer.finish();
            return Err(e);
        }

        // Finalizing: close the file and write the checkpoint
        // unconditionally, even for a zero-message run, so updated_at
        // reflects this invocation.
        let outcome = ExportOutcome {
            messages_written: writer.messages_written(),
            files_used: writer.files_used(),
            directory: writer.directory().to_path_buf(),
        };
        let final_checkpoint = writer.checkpoint();
        writer.finish()?;
        self.flush_checkpoint_record(&store, &final_checkpoint);

        tracing::info!(
            chat_id,
            messages_written = outcome.messages_written,
            files_used = outcome.files_used,
            "Export complete"
        );
        Ok(outcome)
    }

    /// Rebuild a chat's stats snapshot from a full history re-pull.
    pub async fn refresh_stats(
        &self,
        client: &dyn MessengerClient,
        chat_id: i64,
    ) -> Result<StatsOutcome> {
        let _guard = self.acquire(chat_id, Artifact::Stats)?;

        self.ensure_authorized(client).await?;
        let chat = self.chat_from_catalogue(chat_id)?;
        let handle = client.resolve(chat_id).await?;

        // Always from id 0: the snapshot is point-in-time, not
        // incremental
        let mut stream = MessageStream::new(client, handle, 0, self.pacing, self.retry);
        StatsAggregator::new(&self.db).refresh(&chat, &mut stream).await
    }

    async fn ensure_authorized(&self, client: &dyn MessengerClient) -> Result<()> {
        if client.is_authorized().await? {
            Ok(())
        } else {
            Err(Error::NotAuthorized)
        }
    }

    fn chat_from_catalogue(&self, chat_id: i64) -> Result<ChatRef> {
        self.db
            .get_chat(chat_id)?
            .ok_or(Error::ChatNotFound(chat_id))
    }

    /// Best-effort mid-run checkpoint flush: a failure costs
    /// resumability, not the run.
    fn flush_checkpoint(&self, store: &CheckpointStore, writer: &ExportWriter) {
        self.flush_checkpoint_record(store, &writer.checkpoint());
    }

    fn flush_checkpoint_record(
        &self,
        store: &CheckpointStore,
        checkpoint: &crate::types::ExportCheckpoint,
    ) {
        if let Err(e) = store.save(checkpoint) {
            tracing::warn!(
                chat_id = checkpoint.chat_id,
                error = %e,
                "Checkpoint write failed; resumability at risk"
            );
        }
    }

    fn acquire(&self, chat_id: i64, artifact: Artifact) -> Result<RunGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if !active.insert((chat_id, artifact)) {
            return Err(Error::RunInProgress {
                chat_id,
                artifact: artifact.as_str().to_string(),
            });
        }
        Ok(RunGuard {
            active: &self.active,
            key: (chat_id, artifact),
        })
    }
}

/// Releases the (chat, artifact) slot when the run ends, however it
/// ends.
struct RunGuard<'a> {
    active: &'a Mutex<HashSet<(i64, Artifact)>>,
    key: (i64, Artifact),
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.key);
    }
}

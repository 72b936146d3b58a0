//! Durable export progress records
//!
//! One JSON checkpoint file lives next to the export output of each
//! chat. Writes go through a temp file and rename so a reader (or a
//! crash) never observes a half-written record.

use crate::error::Result;
use crate::types::ExportCheckpoint;
use std::path::{Path, PathBuf};

/// File name of the checkpoint record inside an export directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Loads and persists the per-chat export checkpoint.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(export_dir: &Path) -> Self {
        Self {
            path: export_dir.join(CHECKPOINT_FILE),
        }
    }

    /// Read the checkpoint, if any.
    ///
    /// An unreadable or invalid record is recovered locally: it is
    /// discarded with a warning and the export restarts from id 0.
    pub fn load(&self) -> Result<Option<ExportCheckpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Unreadable checkpoint, restarting export from scratch"
                );
                return Ok(None);
            }
        };

        match serde_json::from_str(&content) {
            Ok(cp) => Ok(Some(cp)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Corrupt checkpoint, restarting export from scratch"
                );
                Ok(None)
            }
        }
    }

    /// Persist the checkpoint atomically (temp file + rename).
    pub fn save(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(checkpoint)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(
            chat_id = checkpoint.chat_id,
            last_message_id = ?checkpoint.last_message_id,
            "Checkpoint flushed"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatKind, ChatRef};
    use tempfile::TempDir;

    fn chat() -> ChatRef {
        ChatRef {
            id: 77,
            title: "Team".into(),
            kind: ChatKind::Group,
            participants: None,
        }
    }

    #[test]
    fn round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(store.load().unwrap().is_none());

        let mut cp = ExportCheckpoint::new(&chat(), 50_000);
        cp.last_message_id = Some(1050);
        cp.last_file_index = 3;
        cp.current_file_word_count = 12_345;
        store.save(&cp).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, cp);
    }

    #[test]
    fn corrupt_record_is_discarded() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let cp = ExportCheckpoint::new(&chat(), 100);
        store.save(&cp).unwrap();
        store.save(&cp).unwrap();

        // No temp leftovers
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![CHECKPOINT_FILE.to_string()]);
    }
}

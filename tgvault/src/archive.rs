//! Local archive backend for the messenger port
//!
//! Serves a previously captured message archive through the same
//! interface a live platform adapter would implement, so the full
//! catalogue/export/stats pipeline runs against local data. Layout:
//!
//! ```text
//! <root>/
//!   dialogs.json        index: account name + chat list
//!   <chat_id>.jsonl     one JSON message per line, ascending by id
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tgvault_core::{ChatHandle, ChatRef, Error, Message, MessengerClient, Result};

/// Archive index file name
const DIALOGS_FILE: &str = "dialogs.json";

#[derive(Debug, Deserialize)]
struct DialogsIndex {
    #[serde(default)]
    account: Option<String>,
    chats: Vec<ChatRef>,
}

/// Messenger port implementation over a local archive directory.
pub struct ArchiveClient {
    root: PathBuf,
    /// Per-chat message cache, loaded on first touch
    cache: Mutex<HashMap<i64, Arc<Vec<Message>>>>,
}

impl ArchiveClient {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn index(&self) -> Result<DialogsIndex> {
        let path = self.root.join(DIALOGS_FILE);
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load (or fetch from cache) a chat's full archived history,
    /// sorted ascending by id.
    fn history(&self, chat_id: i64) -> Result<Arc<Vec<Message>>> {
        if let Some(messages) = self.cache.lock().unwrap().get(&chat_id) {
            return Ok(Arc::clone(messages));
        }

        let path = self.root.join(format!("{}.jsonl", chat_id));
        let file = std::fs::File::open(&path).map_err(|e| Error::EntityResolution {
            chat_id,
            message: format!("no archive at {}: {}", path.display(), e),
        })?;

        let mut messages = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // The archive is a source of truth: a bad line is an
            // error, not a skip
            let msg: Message = serde_json::from_str(&line).map_err(|e| {
                Error::Transport(format!(
                    "malformed archive record {}:{}: {}",
                    path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            messages.push(msg);
        }
        messages.sort_by_key(|m| m.id);

        let messages = Arc::new(messages);
        self.cache
            .lock()
            .unwrap()
            .insert(chat_id, Arc::clone(&messages));
        Ok(messages)
    }
}

#[async_trait]
impl MessengerClient for ArchiveClient {
    async fn is_authorized(&self) -> Result<bool> {
        Ok(self.root.join(DIALOGS_FILE).exists())
    }

    async fn account_name(&self) -> Result<Option<String>> {
        Ok(self.index()?.account)
    }

    async fn list_chats(&self) -> Result<Vec<ChatRef>> {
        Ok(self.index()?.chats)
    }

    async fn resolve(&self, chat_id: i64) -> Result<ChatHandle> {
        if !self.root.join(format!("{}.jsonl", chat_id)).exists() {
            return Err(Error::EntityResolution {
                chat_id,
                message: "chat has no archived history".to_string(),
            });
        }
        Ok(ChatHandle {
            chat_id,
            reference: None,
        })
    }

    async fn fetch_messages(
        &self,
        handle: &ChatHandle,
        min_id: i64,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let history = self.history(handle.chat_id)?;
        Ok(history
            .iter()
            .filter(|m| m.id > min_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

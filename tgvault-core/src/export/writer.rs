//! Size-bounded, append-only export files
//!
//! Each chat exports into `{sanitized_title}_{id}/` as a sequence of
//! `{sanitized_title}_chatexport_{NN}.md` files. A file receives whole
//! messages until its word budget would overflow, then the writer
//! rolls to the next index. A single message is never split across
//! files, even when it alone exceeds the budget.

use crate::error::Result;
use crate::types::{ChatRef, ExportCheckpoint, Message};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Characters never allowed in export file names
const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Longest sanitized title used in names
const MAX_TITLE_LEN: usize = 64;

/// Make a chat title safe for file names: strip forbidden and control
/// characters, collapse whitespace runs to single underscores, bound
/// the length. Falls back to `"chat"` when nothing survives.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();

    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let bounded: String = joined.chars().take(MAX_TITLE_LEN).collect();

    if bounded.is_empty() {
        "chat".to_string()
    } else {
        bounded
    }
}

/// Deterministic export directory for a chat.
///
/// The numeric id keeps repeated exports targeting the same directory
/// even when the title drifts.
pub fn export_dir(exports_root: &Path, chat: &ChatRef) -> PathBuf {
    exports_root.join(format!("{}_{}", sanitize_title(&chat.title), chat.id))
}

fn file_name(sanitized_title: &str, index: u32) -> String {
    format!("{}_chatexport_{:02}.md", sanitized_title, index)
}

/// Appends formatted message records to the current export file,
/// carrying forward word-count and file-index state from a checkpoint.
pub struct ExportWriter {
    dir: PathBuf,
    sanitized_title: String,
    chat_title: String,
    checkpoint: ExportCheckpoint,
    file: Option<BufWriter<File>>,
    /// File indexes appended to during this run
    files_touched: BTreeSet<u32>,
    messages_written: u64,
}

impl ExportWriter {
    /// Open a writer for `chat`, resuming from `checkpoint` when given.
    ///
    /// `words_per_file` always comes from the caller; the checkpoint
    /// records the value for the human reading the directory.
    pub fn open(
        exports_root: &Path,
        chat: &ChatRef,
        checkpoint: Option<ExportCheckpoint>,
        words_per_file: u64,
    ) -> Result<Self> {
        let dir = export_dir(exports_root, chat);
        std::fs::create_dir_all(&dir)?;

        let mut checkpoint = checkpoint.unwrap_or_else(|| ExportCheckpoint::new(chat, words_per_file));
        checkpoint.words_per_file = words_per_file;
        checkpoint.chat_title = chat.title.clone();

        Ok(Self {
            dir,
            sanitized_title: sanitize_title(&chat.title),
            chat_title: chat.title.clone(),
            checkpoint,
            file: None,
            files_touched: BTreeSet::new(),
            messages_written: 0,
        })
    }

    /// Process one message in ascending-id order.
    ///
    /// Empty-text messages advance the watermark so they are never
    /// re-fetched, but nothing is written for them.
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        if msg.has_text() {
            let words = msg.text.split_whitespace().count() as u64;

            if self.checkpoint.current_file_word_count > 0
                && self.checkpoint.current_file_word_count + words
                    > self.checkpoint.words_per_file
            {
                self.roll_over()?;
            }

            self.append_record(msg)?;
            self.checkpoint.current_file_word_count += words;
            self.messages_written += 1;
        }

        self.checkpoint.last_message_id = Some(msg.id);
        Ok(())
    }

    /// Snapshot of current progress, stamped now.
    pub fn checkpoint(&self) -> ExportCheckpoint {
        let mut cp = self.checkpoint.clone();
        cp.updated_at = Utc::now();
        cp
    }

    /// Messages written to disk during this run
    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }

    /// Distinct files appended to during this run
    pub fn files_used(&self) -> u32 {
        self.files_touched.len() as u32
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Flush and close the active file handle.
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn roll_over(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.checkpoint.last_file_index += 1;
        self.checkpoint.current_file_word_count = 0;
        tracing::debug!(
            chat_id = self.checkpoint.chat_id,
            file_index = self.checkpoint.last_file_index,
            "Rolled over to next export file"
        );
        Ok(())
    }

    fn append_record(&mut self, msg: &Message) -> Result<()> {
        let header = match &msg.sender {
            Some(sender) => format!(
                "## {} ({})",
                msg.date.format("%Y-%m-%d %H:%M:%S %:z"),
                sender
            ),
            None => format!("## {}", msg.date.format("%Y-%m-%d %H:%M:%S %:z")),
        };
        let record = format!("{}\n[id: {}]\n\n{}\n\n---\n\n", header, msg.id, msg.text);

        let index = self.checkpoint.last_file_index;
        let file = self.ensure_file()?;
        file.write_all(record.as_bytes())?;
        self.files_touched.insert(index);
        Ok(())
    }

    /// Open the current file for append, writing the title header when
    /// the file is new or empty.
    fn ensure_file(&mut self) -> Result<&mut BufWriter<File>> {
        if self.file.is_none() {
            let path = self
                .dir
                .join(file_name(&self.sanitized_title, self.checkpoint.last_file_index));

            let handle = OpenOptions::new().create(true).append(true).open(&path)?;
            let needs_header = handle.metadata()?.len() == 0;
            let mut writer = BufWriter::new(handle);

            if needs_header {
                writeln!(writer, "# {}\n", self.chat_title)?;
            }

            self.file = Some(writer);
        }

        // Just set above when missing
        Ok(self.file.as_mut().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatKind;
    use chrono::DateTime;
    use tempfile::TempDir;

    fn chat(title: &str) -> ChatRef {
        ChatRef {
            id: 500,
            title: title.to_string(),
            kind: ChatKind::Group,
            participants: None,
        }
    }

    fn msg(id: i64, text: &str) -> Message {
        Message {
            id,
            date: DateTime::parse_from_rfc3339("2024-03-01T10:15:00+00:00").unwrap(),
            sender: Some("Alice".into()),
            text: text.to_string(),
        }
    }

    fn words(n: usize) -> String {
        vec!["w"; n].join(" ")
    }

    #[test]
    fn sanitize_strips_and_collapses() {
        assert_eq!(sanitize_title("My  Chat / 2024?"), "My_Chat_2024");
        assert_eq!(sanitize_title("a\tb\nc"), "a_b_c");
        assert_eq!(sanitize_title("///"), "chat");
        assert_eq!(sanitize_title(""), "chat");

        let long = "x".repeat(200);
        assert_eq!(sanitize_title(&long).chars().count(), 64);
    }

    #[test]
    fn directory_is_stable_across_title_drift() {
        let root = Path::new("/tmp/exports");
        let a = export_dir(root, &chat("Old Title"));
        let b = export_dir(root, &chat("New Title"));
        assert_ne!(a, b);
        // Same title, same id: identical
        assert_eq!(a, export_dir(root, &chat("Old Title")));
        assert!(a.to_string_lossy().ends_with("Old_Title_500"));
    }

    #[test]
    fn header_written_once_per_file() {
        let dir = TempDir::new().unwrap();
        let c = chat("Team");
        let mut w = ExportWriter::open(dir.path(), &c, None, 1000).unwrap();
        w.write_message(&msg(1, "hello there")).unwrap();
        w.write_message(&msg(2, "second")).unwrap();
        w.finish().unwrap();

        let content =
            std::fs::read_to_string(export_dir(dir.path(), &c).join("Team_chatexport_01.md"))
                .unwrap();
        assert_eq!(content.matches("# Team").count(), 1);
        assert!(content.contains("[id: 1]"));
        assert!(content.contains("[id: 2]"));
        assert!(content.contains("(Alice)"));
    }

    #[test]
    fn rollover_never_splits_a_message() {
        let dir = TempDir::new().unwrap();
        let c = chat("Budget");
        let mut w = ExportWriter::open(dir.path(), &c, None, 5).unwrap();
        w.write_message(&msg(1, &words(3))).unwrap();
        // 3 + 4 > 5: rolls to file 02
        w.write_message(&msg(2, &words(4))).unwrap();
        // Oversize message goes whole into the next file
        w.write_message(&msg(3, &words(50))).unwrap();
        w.finish().unwrap();

        let d = export_dir(dir.path(), &c);
        let f1 = std::fs::read_to_string(d.join("Budget_chatexport_01.md")).unwrap();
        let f2 = std::fs::read_to_string(d.join("Budget_chatexport_02.md")).unwrap();
        let f3 = std::fs::read_to_string(d.join("Budget_chatexport_03.md")).unwrap();
        assert!(f1.contains("[id: 1]") && !f1.contains("[id: 2]"));
        assert!(f2.contains("[id: 2]") && !f2.contains("[id: 3]"));
        assert!(f3.contains("[id: 3]"));
        assert_eq!(f3.matches(&words(50)).count(), 1);
    }

    #[test]
    fn oversize_first_message_stays_in_first_file() {
        let dir = TempDir::new().unwrap();
        let c = chat("Big");
        let mut w = ExportWriter::open(dir.path(), &c, None, 2).unwrap();
        // current_file_word_count == 0: no rollover even though 10 > 2
        w.write_message(&msg(1, &words(10))).unwrap();
        w.finish().unwrap();

        let d = export_dir(dir.path(), &c);
        assert!(d.join("Big_chatexport_01.md").exists());
        assert!(!d.join("Big_chatexport_02.md").exists());
    }

    #[test]
    fn empty_text_advances_watermark_without_writing() {
        let dir = TempDir::new().unwrap();
        let c = chat("Quiet");
        let mut w = ExportWriter::open(dir.path(), &c, None, 100).unwrap();
        w.write_message(&msg(10, "")).unwrap();

        assert_eq!(w.checkpoint().last_message_id, Some(10));
        assert_eq!(w.messages_written(), 0);
        assert_eq!(w.files_used(), 0);
        w.finish().unwrap();
        // No file was ever created
        assert!(!export_dir(dir.path(), &c)
            .join("Quiet_chatexport_01.md")
            .exists());
    }

    #[test]
    fn resume_appends_to_recorded_file_index() {
        let dir = TempDir::new().unwrap();
        let c = chat("Resume");
        let mut w = ExportWriter::open(dir.path(), &c, None, 4).unwrap();
        w.write_message(&msg(1, &words(3))).unwrap();
        let cp = w.checkpoint();
        w.finish().unwrap();

        let mut w = ExportWriter::open(dir.path(), &c, Some(cp), 4).unwrap();
        // 3 + 2 > 4: resumed word count forces a rollover
        w.write_message(&msg(2, &words(2))).unwrap();
        w.finish().unwrap();

        let d = export_dir(dir.path(), &c);
        assert!(d.join("Resume_chatexport_02.md").exists());
    }
}

//! Message-history export
//!
//! Materializes a chat's message stream into size-bounded sequential
//! text files plus a resumable checkpoint record, all under one
//! deterministic per-chat directory.

pub mod checkpoint;
pub mod writer;

pub use checkpoint::CheckpointStore;
pub use writer::{export_dir, sanitize_title, ExportWriter};

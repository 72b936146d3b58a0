//! # tgvault-core
//!
//! Core library for tgvault - a local catalogue and archiver for
//! Telegram group/channel history.
//!
//! This library provides:
//! - Domain types for chats, messages, categories, and checkpoints
//! - SQLite storage for the catalogue and the per-chat stats snapshot
//! - The messenger port (the platform adapter seam) with a paced,
//!   strictly ascending message stream
//! - A resumable, size-bounded text export writer
//! - The ingestion coordinator tying it all together
//!
//! ## Architecture
//!
//! Data flows from the platform adapter into two derived artifacts:
//! - **Export:** append-only text files with a watermark checkpoint,
//!   resumed incrementally across runs
//! - **Stats:** a per-chat snapshot replaced wholesale on every
//!   refresh, grouped into daily counts on demand
//!
//! ## Example
//!
//! ```rust,no_run
//! use tgvault_core::{Config, Database};
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//!
//! // Open database
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use ingest::{Artifact, IngestCoordinator};
pub use source::{ChatHandle, MessageStream, MessengerClient, RetryPolicy};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod source;
pub mod stats;
pub mod types;

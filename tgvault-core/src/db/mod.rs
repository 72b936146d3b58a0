//! Database layer for tgvault
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for catalogue, category, and stats queries
//! - Atomic per-chat snapshot replacement for the stats table

pub mod repo;
pub mod schema;

pub use repo::Database;

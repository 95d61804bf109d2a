//! SQLite persistence for settled bundles and durable state.
//!
//! This module provides:
//! - Opening the database and applying the versioned schema
//! - Per-connection SQLite pragmas
//! - Repository for settlements, pruned state snapshots and pool config versions

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{
    Checkpoint, NewSettlement, RepoError, Repository, SettlementRow, StateSnapshotRow,
    SNAPSHOT_RETENTION,
};

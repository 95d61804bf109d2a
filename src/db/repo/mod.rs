//! Repository layer for database operations.
//!
//! Raw bundles are stored lz4-compressed; durable state and receipts are
//! stored as JSON. Each mutation is written by one transactional commit.

use crate::domain::{AccountId, EpochId};
use crate::engine::{PoolConfigStore, SettlementReceipt, SettlementState};
use crate::venue::VenueState;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored bundle is corrupt: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    #[error("stored timestamp is invalid: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("a settlement for epoch {epoch} is already recorded")]
    EpochRecorded { epoch: EpochId },
}

/// Snapshots kept after each commit.
pub const SNAPSHOT_RETENTION: i64 = 64;

/// A settled bundle to record with its snapshot.
#[derive(Debug, Clone, Copy)]
pub struct NewSettlement<'a> {
    pub receipt: &'a SettlementReceipt,
    pub caller: &'a AccountId,
    pub raw_bundle: &'a [u8],
    pub executed_at: DateTime<Utc>,
}

/// Everything one mutation writes.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint<'a> {
    pub epoch: Option<EpochId>,
    pub reason: &'a str,
    pub state: &'a SettlementState,
    pub venue: &'a VenueState,
    pub settlement: Option<NewSettlement<'a>>,
    /// Also record `state.pool_configs` as a published version.
    pub publish_pool_config: bool,
}

impl<'a> Checkpoint<'a> {
    pub fn snapshot(reason: &'a str, state: &'a SettlementState, venue: &'a VenueState) -> Self {
        Self {
            epoch: None,
            reason,
            state,
            venue,
            settlement: None,
            publish_pool_config: false,
        }
    }
}

/// A persisted settlement, newest first when listed.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRow {
    pub epoch: EpochId,
    pub bundle_digest: String,
    pub executed_at: DateTime<Utc>,
    pub caller: String,
    pub receipt: SettlementReceipt,
}

#[derive(Debug, Clone)]
pub struct StateSnapshotRow {
    pub id: i64,
    pub epoch: Option<EpochId>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub state: SettlementState,
    pub venue: VenueState,
}

pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Commits
    // =========================================================================

    /// Write a snapshot, plus the settlement row and config version it
    /// carries, in one transaction. Snapshots beyond the newest
    /// `SNAPSHOT_RETENTION` are pruned in the same transaction.
    pub async fn commit(&self, checkpoint: &Checkpoint<'_>) -> Result<i64, RepoError> {
        let mut tx = self.pool.begin().await?;

        if let Some(settlement) = &checkpoint.settlement {
            insert_settlement(&mut *tx, settlement).await?;
        }
        if checkpoint.publish_pool_config {
            insert_pool_config(&mut *tx, &checkpoint.state.pool_configs).await?;
        }

        let id = sqlx::query(
            r#"
            INSERT INTO state_snapshots (epoch, reason, created_at, state_json, venue_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(checkpoint.epoch.map(|e| e as i64))
        .bind(checkpoint.reason)
        .bind(Utc::now().to_rfc3339())
        .bind(serde_json::to_string(checkpoint.state)?)
        .bind(serde_json::to_string(checkpoint.venue)?)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let pruned = sqlx::query(
            r#"
            DELETE FROM state_snapshots
            WHERE id NOT IN (SELECT id FROM state_snapshots ORDER BY id DESC LIMIT ?)
            "#,
        )
        .bind(SNAPSHOT_RETENTION)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        debug!(snapshot = id, reason = checkpoint.reason, pruned, "state committed");
        Ok(id)
    }

    /// Most recent settlements first.
    pub async fn list_settlements(&self, limit: i64) -> Result<Vec<SettlementRow>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT epoch, bundle_digest, executed_at, caller, receipt_json
            FROM settlements
            ORDER BY epoch DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let executed_at: String = row.get("executed_at");
                let receipt_json: String = row.get("receipt_json");
                Ok(SettlementRow {
                    epoch: row.get::<i64, _>("epoch") as EpochId,
                    bundle_digest: row.get("bundle_digest"),
                    executed_at: parse_timestamp(&executed_at)?,
                    caller: row.get("caller"),
                    receipt: serde_json::from_str(&receipt_json)?,
                })
            })
            .collect()
    }

    /// The raw bundle settled in `epoch`, decompressed.
    pub async fn settlement_bundle(&self, epoch: EpochId) -> Result<Option<Vec<u8>>, RepoError> {
        let row = sqlx::query("SELECT raw_bundle FROM settlements WHERE epoch = ?")
            .bind(epoch as i64)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let compressed: Vec<u8> = row.get("raw_bundle");
                Ok(Some(lz4_flex::decompress_size_prepended(&compressed)?))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    // Durable state
    // =========================================================================

    pub async fn latest_snapshot(&self) -> Result<Option<StateSnapshotRow>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT id, epoch, reason, created_at, state_json, venue_json
            FROM state_snapshots
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let created_at: String = row.get("created_at");
        let state_json: String = row.get("state_json");
        let venue_json: String = row.get("venue_json");
        Ok(Some(StateSnapshotRow {
            id: row.get("id"),
            epoch: row.get::<Option<i64>, _>("epoch").map(|e| e as EpochId),
            reason: row.get("reason"),
            created_at: parse_timestamp(&created_at)?,
            state: serde_json::from_str(&state_json)?,
            venue: serde_json::from_str(&venue_json)?,
        }))
    }

    // =========================================================================
    // Pool config versions
    // =========================================================================

    /// Every published config version is kept.
    pub async fn pool_config_version(
        &self,
        version: u64,
    ) -> Result<Option<PoolConfigStore>, RepoError> {
        let row = sqlx::query("SELECT entries_json FROM pool_configs WHERE version = ?")
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("entries_json");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|t| t.with_timezone(&Utc))
}

async fn insert_settlement(
    conn: &mut SqliteConnection,
    settlement: &NewSettlement<'_>,
) -> Result<(), RepoError> {
    let receipt = settlement.receipt;
    let compressed = lz4_flex::compress_prepend_size(settlement.raw_bundle);
    let result = sqlx::query(
        r#"
        INSERT INTO settlements (
            epoch, bundle_digest, executed_at, caller, asset_count,
            top_of_block_count, swap_count, generic_count,
            reward_update_count, ticks_crossed, receipt_json, raw_bundle
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(epoch) DO NOTHING
        "#,
    )
    .bind(receipt.epoch as i64)
    .bind(&receipt.bundle_digest)
    .bind(settlement.executed_at.to_rfc3339())
    .bind(settlement.caller.to_string())
    .bind(receipt.assets as i64)
    .bind(receipt.top_of_block_orders as i64)
    .bind(receipt.swaps as i64)
    .bind(receipt.generic_orders as i64)
    .bind(receipt.reward_updates as i64)
    .bind(receipt.ticks_crossed as i64)
    .bind(serde_json::to_string(receipt)?)
    .bind(compressed)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepoError::EpochRecorded {
            epoch: receipt.epoch,
        });
    }
    Ok(())
}

async fn insert_pool_config(
    conn: &mut SqliteConnection,
    store: &PoolConfigStore,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO pool_configs (version, created_at, entries_json)
        VALUES (?, ?, ?)
        ON CONFLICT(version) DO NOTHING
        "#,
    )
    .bind(store.version() as i64)
    .bind(Utc::now().to_rfc3339())
    .bind(serde_json::to_string(store)?)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

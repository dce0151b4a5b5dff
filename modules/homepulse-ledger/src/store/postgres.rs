//! Postgres implementation of [`LedgerStore`]. The single source of truth
//! between runs; no ledger cache survives a process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use homepulse_common::{
    ArchivedLedger, EntityLedger, ParentArchived, RegionalRollup, RunSummary,
};

use crate::error::{LedgerError, Result};

use super::LedgerStore;

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(e.into()))?;
        Ok(())
    }
}

// --- Row types ---

/// A row from the price_ledgers table.
#[derive(sqlx::FromRow)]
struct LedgerRow {
    entity_id: String,
    parent_id: String,
    region_id: String,
    status: String,
    identity: serde_json::Value,
    timeline: serde_json::Value,
    metrics: serde_json::Value,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl LedgerRow {
    fn into_ledger(self) -> Result<EntityLedger> {
        let status = self
            .status
            .parse()
            .map_err(|e: String| LedgerError::Other(anyhow::anyhow!(e)))?;
        Ok(EntityLedger {
            status,
            identity: decode(self.identity, "identity", &self.entity_id)?,
            timeline: decode(self.timeline, "timeline", &self.entity_id)?,
            metrics: decode(self.metrics, "metrics", &self.entity_id)?,
            entity_id: self.entity_id,
            parent_id: self.parent_id,
            region_id: self.region_id,
            created_at: self.created_at,
            last_updated: self.last_updated,
        })
    }
}

/// A row from the archived_ledgers table.
#[derive(sqlx::FromRow)]
struct ArchivedRow {
    entity_id: String,
    parent_id: String,
    region_id: String,
    status: String,
    identity: serde_json::Value,
    timeline: serde_json::Value,
    metrics: serde_json::Value,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    archived_at: DateTime<Utc>,
    archive_reason: String,
}

impl ArchivedRow {
    fn into_record(self) -> Result<ArchivedLedger> {
        let ledger = LedgerRow {
            entity_id: self.entity_id,
            parent_id: self.parent_id,
            region_id: self.region_id,
            status: self.status,
            identity: self.identity,
            timeline: self.timeline,
            metrics: self.metrics,
            created_at: self.created_at,
            last_updated: self.last_updated,
        }
        .into_ledger()?;
        Ok(ArchivedLedger {
            ledger,
            archived_at: self.archived_at,
            archive_reason: self.archive_reason,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RollupRow {
    region_id: String,
    location: serde_json::Value,
    current: serde_json::Value,
    daily_history: serde_json::Value,
    computed_at: DateTime<Utc>,
}

impl RollupRow {
    fn into_rollup(self) -> Result<RegionalRollup> {
        Ok(RegionalRollup {
            location: decode(self.location, "location", &self.region_id)?,
            current: decode(self.current, "current", &self.region_id)?,
            daily_history: decode(self.daily_history, "daily_history", &self.region_id)?,
            region_id: self.region_id,
            computed_at: self.computed_at,
        })
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value, column: &str, id: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| LedgerError::Other(anyhow::anyhow!("corrupt {column} for {id}: {e}")))
}

fn encode<T: Serialize>(value: &T, column: &str) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| LedgerError::Other(anyhow::anyhow!("encode {column}: {e}")))
}

const LEDGER_COLUMNS: &str =
    "entity_id, parent_id, region_id, status, identity, timeline, metrics, created_at, last_updated";

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_live(&self, entity_id: &str) -> Result<Option<EntityLedger>> {
        let row = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM price_ledgers WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LedgerRow::into_ledger).transpose()
    }

    async fn put_live(&self, ledger: &EntityLedger) -> Result<()> {
        sqlx::query(&format!(
            r#"
            INSERT INTO price_ledgers ({LEDGER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (entity_id) DO UPDATE SET
                parent_id = EXCLUDED.parent_id,
                region_id = EXCLUDED.region_id,
                status = EXCLUDED.status,
                identity = EXCLUDED.identity,
                timeline = EXCLUDED.timeline,
                metrics = EXCLUDED.metrics,
                last_updated = EXCLUDED.last_updated
            "#
        ))
        .bind(&ledger.entity_id)
        .bind(&ledger.parent_id)
        .bind(&ledger.region_id)
        .bind(ledger.status.to_string())
        .bind(encode(&ledger.identity, "identity")?)
        .bind(encode(&ledger.timeline, "timeline")?)
        .bind(encode(&ledger.metrics, "metrics")?)
        .bind(ledger.created_at)
        .bind(ledger.last_updated)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_live(&self, entity_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM price_ledgers WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_live(&self, entity_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE price_ledgers SET last_updated = $2 WHERE entity_id = $1")
            .bind(entity_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_live(&self) -> Result<Vec<EntityLedger>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM price_ledgers ORDER BY entity_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_ledger).collect()
    }

    async fn live_by_parent(&self, parent_id: &str) -> Result<Vec<EntityLedger>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM price_ledgers WHERE parent_id = $1 ORDER BY entity_id",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_ledger).collect()
    }

    async fn live_by_region(&self, region_id: &str) -> Result<Vec<EntityLedger>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM price_ledgers WHERE region_id = $1 ORDER BY entity_id",
        )
        .bind(region_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_ledger).collect()
    }

    async fn get_archived(&self, entity_id: &str) -> Result<Option<ArchivedLedger>> {
        let row = sqlx::query_as::<_, ArchivedRow>(
            "SELECT * FROM archived_ledgers WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArchivedRow::into_record).transpose()
    }

    async fn put_archived(&self, record: &ArchivedLedger) -> Result<()> {
        let ledger = &record.ledger;
        sqlx::query(&format!(
            r#"
            INSERT INTO archived_ledgers ({LEDGER_COLUMNS}, archived_at, archive_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (entity_id) DO UPDATE SET
                status = EXCLUDED.status,
                identity = EXCLUDED.identity,
                timeline = EXCLUDED.timeline,
                metrics = EXCLUDED.metrics,
                last_updated = EXCLUDED.last_updated,
                archived_at = EXCLUDED.archived_at,
                archive_reason = EXCLUDED.archive_reason
            "#
        ))
        .bind(&ledger.entity_id)
        .bind(&ledger.parent_id)
        .bind(&ledger.region_id)
        .bind(ledger.status.to_string())
        .bind(encode(&ledger.identity, "identity")?)
        .bind(encode(&ledger.timeline, "timeline")?)
        .bind(encode(&ledger.metrics, "metrics")?)
        .bind(ledger.created_at)
        .bind(ledger.last_updated)
        .bind(record.archived_at)
        .bind(&record.archive_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_archived(&self, entity_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM archived_ledgers WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn archived_by_region(&self, region_id: &str) -> Result<Vec<ArchivedLedger>> {
        let rows = sqlx::query_as::<_, ArchivedRow>(
            "SELECT * FROM archived_ledgers WHERE region_id = $1 ORDER BY entity_id",
        )
        .bind(region_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ArchivedRow::into_record).collect()
    }

    async fn prune_archived(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM archived_ledgers WHERE archived_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn record_archived_parent(&self, event: &ParentArchived) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO archived_parents (parent_id, archived_at, reason)
            VALUES ($1, $2, $3)
            ON CONFLICT (parent_id) DO NOTHING
            "#,
        )
        .bind(&event.parent_id)
        .bind(event.archived_at)
        .bind(&event.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_archived_parent(&self, parent_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM archived_parents WHERE parent_id = $1")
            .bind(parent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn archived_parents(&self) -> Result<Vec<ParentArchived>> {
        let rows = sqlx::query_as::<_, (String, DateTime<Utc>, String)>(
            "SELECT parent_id, archived_at, reason FROM archived_parents ORDER BY parent_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(parent_id, archived_at, reason)| ParentArchived {
                parent_id,
                archived_at,
                reason,
            })
            .collect())
    }

    async fn get_rollup(&self, region_id: &str) -> Result<Option<RegionalRollup>> {
        let row = sqlx::query_as::<_, RollupRow>(
            "SELECT * FROM regional_rollups WHERE region_id = $1",
        )
        .bind(region_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RollupRow::into_rollup).transpose()
    }

    async fn put_rollup(&self, rollup: &RegionalRollup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO regional_rollups (region_id, location, current, daily_history, computed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (region_id) DO UPDATE SET
                location = EXCLUDED.location,
                current = EXCLUDED.current,
                daily_history = EXCLUDED.daily_history,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(&rollup.region_id)
        .bind(encode(&rollup.location, "location")?)
        .bind(encode(&rollup.current, "current")?)
        .bind(encode(&rollup.daily_history, "daily_history")?)
        .bind(rollup.computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn region_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT region_id FROM price_ledgers
            UNION
            SELECT region_id FROM archived_ledgers
            ORDER BY region_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn put_run_summary(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_summaries (id, kind, started_at, finished_at, stats)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(summary.id)
        .bind(summary.kind.to_string())
        .bind(summary.started_at)
        .bind(summary.finished_at)
        .bind(encode(summary, "stats")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

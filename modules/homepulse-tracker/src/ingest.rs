//! One tracker run, end to end: record observations, cascade archived
//! parents, run the consistency sweep, rebuild rollups, persist the audit
//! row. Failures local to one entity are absorbed and reported; only
//! failing to reach the store at all aborts the run.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use tracing::{info, warn};

use homepulse_common::{Config, RunKind};
use homepulse_ledger::{
    AppendOutcome, CascadeEngine, EntityLocks, LedgerStore, LedgerWriter, RegionalAggregator,
    SkipReason,
};

use crate::run_log::{EventKind, RunLog};
use crate::stats::TrackerStats;
use crate::traits::ObservationSource;

pub struct Tracker<S> {
    store: Arc<S>,
    writer: LedgerWriter<S>,
    cascade: CascadeEngine<S>,
    aggregator: RegionalAggregator<S>,
    concurrency: usize,
}

impl<S: LedgerStore> Tracker<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let locks = Arc::new(EntityLocks::new());
        Self {
            writer: LedgerWriter::new(
                store.clone(),
                locks.clone(),
                config.metric_windows.clone(),
            ),
            cascade: CascadeEngine::new(
                store.clone(),
                locks,
                config.stale_after_days,
                config.archive_retention_days,
            ),
            aggregator: RegionalAggregator::new(
                store.clone(),
                config.metric_windows.clone(),
                config.daily_history_days,
                config.ingest_concurrency,
            ),
            concurrency: config.ingest_concurrency,
            store,
        }
    }

    /// Full ingest run over one upstream batch.
    pub async fn run_ingest<U: ObservationSource>(
        &self,
        upstream: &U,
        run_log: &mut RunLog,
    ) -> Result<TrackerStats> {
        let started = Utc::now();
        let mut stats = TrackerStats::default();

        let observations = upstream.observations().await?;
        stats.observed = observations.len() as u32;
        info!(observations = observations.len(), "Ingest run starting");

        // Appends fan out across entities; the writer's per-entity locks
        // serialize same-entity work.
        let writer = &self.writer;
        let results: Vec<_> = stream::iter(observations.iter().map(|obs| async move {
            (obs, writer.append_if_changed(obs).await)
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        for (obs, result) in results {
            match result {
                Ok(AppendOutcome::Created) => {
                    stats.ledgers_created += 1;
                    run_log.log(EventKind::LedgerCreated {
                        natural_key: obs.natural_key.clone(),
                        price: obs.price.unwrap_or_default(),
                    });
                }
                Ok(AppendOutcome::Appended(change)) => {
                    stats.entries_appended += 1;
                    run_log.log(EventKind::PriceRecorded {
                        natural_key: obs.natural_key.clone(),
                        price: obs.price.unwrap_or_default(),
                        change_type: change.to_string(),
                    });
                }
                Ok(AppendOutcome::Unchanged) => stats.unchanged += 1,
                Ok(AppendOutcome::Skipped(reason)) => {
                    stats.skipped += 1;
                    run_log.log(EventKind::ObservationSkipped {
                        natural_key: obs.natural_key.clone(),
                        reason: skip_label(reason).to_string(),
                    });
                }
                Err(e) => {
                    warn!(natural_key = obs.natural_key.as_str(), error = %e, "Failed to record observation");
                    stats.failed.push(obs.natural_key.clone());
                }
            }
        }

        // Immediate cascade trigger for parents upstream just retired.
        let parents = upstream.archived_parents().await?;
        if !parents.is_empty() {
            let summary = self.cascade.handle_archived_parents(&parents).await;
            run_log.log(EventKind::ParentsArchived {
                parents: summary.parents,
                entities: summary.archived,
            });
            stats.absorb_cascade(&summary);
        }

        self.finish(RunKind::Ingest, started, stats, run_log).await
    }

    /// Consistency sweep plus rollup rebuild, no fresh observations.
    pub async fn run_sweep(&self, run_log: &mut RunLog) -> Result<TrackerStats> {
        let started = Utc::now();
        self.finish(RunKind::Sweep, started, TrackerStats::default(), run_log)
            .await
    }

    async fn finish(
        &self,
        kind: RunKind,
        started: DateTime<Utc>,
        mut stats: TrackerStats,
        run_log: &mut RunLog,
    ) -> Result<TrackerStats> {
        // The sweep runs on every invocation; it catches whatever the
        // immediate trigger missed.
        let sweep = self.cascade.sweep(Utc::now()).await?;
        run_log.log(EventKind::SweepCompleted {
            archived: sweep.archived,
            stale: sweep.stale_archived,
            pruned: sweep.pruned,
        });
        stats.absorb_cascade(&sweep);

        let rollups = self.aggregator.rebuild_all(Utc::now()).await?;
        run_log.log(EventKind::RollupsRebuilt {
            rebuilt: rollups.rebuilt,
            failed: rollups.failed.len() as u32,
        });
        stats.rollups_rebuilt = rollups.rebuilt;
        stats.failed.extend(rollups.failed);

        let summary = stats.to_summary(kind, started, Utc::now());
        if let Err(e) = self.store.put_run_summary(&summary).await {
            warn!(error = %e, "Failed to persist run summary");
        }

        info!(kind = %kind, failed = stats.failed.len(), "Run complete");
        Ok(stats)
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::MissingPrice => "missing or non-positive price",
        SkipReason::InvalidKey => "empty natural key",
        SkipReason::IncompleteLocation => "incomplete location",
    }
}

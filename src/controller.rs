//! Run orchestration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregator::AggregationStore;
use crate::identity::IdentityPool;
use crate::job::Job;
use crate::pacing::Pacing;
use crate::partition::{partition, ItemLimit};
use crate::session::{SessionCookie, SessionFactory};
use crate::table::Sink;
use crate::worker::{FailurePolicy, SessionWorker, WorkerContext, WorkerReport};
use crate::{HarvestError, Record};

/// Scheduling settings of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Number of concurrent sessions.
    pub sessions: usize,
    pub limit: ItemLimit,
    pub headless: bool,
    /// With `headless = false`, how many sessions get a visible window.
    pub visible_sessions: usize,
    pub pacing: Pacing,
    pub policy: FailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sessions: 2,
            limit: ItemLimit::All,
            headless: true,
            visible_sessions: 1,
            pacing: Pacing::default(),
            policy: FailurePolicy::default(),
        }
    }
}

impl RunOptions {
    /// Whether the worker with this index runs headless.
    pub fn headless_for(&self, worker: usize) -> bool {
        self.headless || worker >= self.visible_sessions
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job: String,
    /// Records requested, `None` for everything available.
    pub requested: Option<usize>,
    /// Records in the final snapshot.
    pub stored: usize,
    pub workers: Vec<WorkerReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Items that failed across all workers.
    pub fn failed(&self) -> usize {
        self.workers.iter().map(|w| w.failed).sum()
    }

    /// Workers that stopped before finishing their partition.
    pub fn abandoned(&self) -> usize {
        self.workers.iter().filter(|w| w.failure.is_some()).count()
    }
}

/// Errors returned by [`Harvest::run`].
#[derive(Error, Debug)]
pub enum RunError {
    /// The run could not start.
    #[error(transparent)]
    Setup(#[from] HarvestError),

    /// Workers finished but the snapshot could not be persisted. The
    /// collected records are handed back so they are not lost.
    #[error("{source} ({} records kept in memory)", .records.len())]
    Persistence {
        source: HarvestError,
        records: Vec<Record>,
        summary: RunSummary,
    },
}

/// Runs jobs across several concurrent sessions.
pub struct Harvest {
    factory: Arc<dyn SessionFactory>,
    identities: Arc<IdentityPool>,
    cookies: Arc<Vec<SessionCookie>>,
    options: RunOptions,
}

impl Harvest {
    /// Creates a runner using direct egress and default options.
    pub fn new<F: SessionFactory + 'static>(factory: F) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    pub fn with_factory(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            identities: Arc::new(IdentityPool::direct()),
            cookies: Arc::new(Vec::new()),
            options: RunOptions::default(),
        }
    }

    /// Sets the identity pool.
    pub fn identities(mut self, pool: IdentityPool) -> Self {
        self.identities = Arc::new(pool);
        self
    }

    /// Sets the cookies injected into every session.
    pub fn cookies(mut self, cookies: Vec<SessionCookie>) -> Self {
        self.cookies = Arc::new(cookies);
        self
    }

    /// Sets the run options.
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn run_options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs `job` and returns the snapshot without persisting it.
    pub async fn collect(&self, job: Job) -> Result<(Vec<Record>, RunSummary), HarvestError> {
        let start = Instant::now();
        let plan = job.source().plan(self.options.limit)?;
        let partitions = partition(plan.items, self.options.sessions)?;
        let sizes: Vec<usize> = partitions.iter().map(Vec::len).collect();
        info!(
            job = job.name(),
            sessions = self.options.sessions,
            items = sizes.iter().sum::<usize>(),
            "Starting run"
        );
        debug!("Partition sizes: {:?}", sizes);

        let job_name = job.name().to_string();
        let store = Arc::new(AggregationStore::new());
        let ctx = Arc::new(WorkerContext {
            job: Arc::new(job),
            store: Arc::clone(&store),
            factory: Arc::clone(&self.factory),
            identities: Arc::clone(&self.identities),
            cookies: Arc::clone(&self.cookies),
            pacing: self.options.pacing,
            policy: self.options.policy,
            requested: plan.requested,
        });

        let handles: Vec<_> = partitions
            .into_iter()
            .enumerate()
            .map(|(id, items)| {
                let worker =
                    SessionWorker::new(id, self.options.headless_for(id), items, Arc::clone(&ctx));
                tokio::spawn(worker.run())
            })
            .collect();

        let workers: Vec<WorkerReport> = join_all(handles)
            .await
            .into_iter()
            .enumerate()
            .map(|(id, joined)| {
                joined.unwrap_or_else(|e| {
                    warn!(worker = id, "Worker task ended abnormally: {}", e);
                    WorkerReport::lost(id, e)
                })
            })
            .collect();

        let records = store.snapshot().await;
        let summary = RunSummary {
            job: job_name,
            requested: plan.requested,
            stored: records.len(),
            workers,
            elapsed: start.elapsed(),
        };
        info!(
            job = %summary.job,
            stored = summary.stored,
            failed = summary.failed(),
            abandoned = summary.abandoned(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run finished"
        );
        Ok((records, summary))
    }

    /// Runs `job` and writes the snapshot to `sink`.
    pub async fn run(&self, job: Job, sink: &dyn Sink) -> Result<RunSummary, RunError> {
        let columns = job.columns();
        let (records, summary) = self.collect(job).await?;
        match sink.write(&columns, &records) {
            Ok(()) => {
                info!("Saved {} records to {}", records.len(), sink.describe());
                Ok(summary)
            }
            Err(source) => Err(RunError::Persistence {
                source,
                records,
                summary,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_split() {
        let options = RunOptions {
            headless: false,
            visible_sessions: 2,
            ..Default::default()
        };
        assert!(!options.headless_for(0));
        assert!(!options.headless_for(1));
        assert!(options.headless_for(2));

        let all_headless = RunOptions::default();
        assert!(all_headless.headless_for(0));
    }

    #[test]
    fn test_summary_counts() {
        let mut ok = WorkerReport::lost(0, "x");
        ok.failure = None;
        ok.failed = 1;
        let summary = RunSummary {
            job: "teams".into(),
            requested: Some(3),
            stored: 2,
            workers: vec![ok, WorkerReport::lost(1, "boom")],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.abandoned(), 1);
    }

    #[test]
    fn test_persistence_error_display() {
        let err = RunError::Persistence {
            source: HarvestError::Persistence("out.csv: denied".into()),
            records: vec![Record::new()],
            summary: RunSummary {
                job: "teams".into(),
                requested: None,
                stored: 1,
                workers: vec![],
                elapsed: Duration::ZERO,
            },
        };
        assert_eq!(
            err.to_string(),
            "Failed to persist results: out.csv: denied (1 records kept in memory)"
        );
    }
}

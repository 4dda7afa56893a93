//! Session workers: one session, one partition, strictly sequential.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::aggregator::AggregationStore;
use crate::identity::IdentityPool;
use crate::job::{Emitted, Job};
use crate::pacing::Pacing;
use crate::partition::WorkItem;
use crate::session::{Session, SessionCookie, SessionFactory, SessionOptions};
use crate::{HarvestError, Record, Result};

/// Lifecycle of a session worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Init,
    Processing,
    Draining,
    Closed,
}

/// What a worker does after an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// End the worker on the first failure.
    #[default]
    Abandon,
    /// Log the failure and continue with the next item.
    Skip,
    /// End the worker after this many failures in a row.
    Consecutive(usize),
}

impl FailurePolicy {
    /// Whether a worker with `streak` consecutive failures stops.
    pub fn stops_after(self, streak: usize) -> bool {
        match self {
            FailurePolicy::Abandon => streak >= 1,
            FailurePolicy::Skip => false,
            FailurePolicy::Consecutive(limit) => streak >= limit.max(1),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = HarvestError;

    /// Parses `abandon`, `skip` or `consecutive:N`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "abandon" => Ok(FailurePolicy::Abandon),
            "skip" => Ok(FailurePolicy::Skip),
            other => other
                .strip_prefix("consecutive:")
                .and_then(|n| n.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(FailurePolicy::Consecutive)
                .ok_or_else(|| HarvestError::Config(format!("unknown failure policy '{}'", s))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abandon => f.write_str("abandon"),
            FailurePolicy::Skip => f.write_str("skip"),
            FailurePolicy::Consecutive(n) => write!(f, "consecutive:{}", n),
        }
    }
}

impl Serialize for FailurePolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FailurePolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// Outcome of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    /// Items the worker started.
    pub attempted: usize,
    /// Records this worker inserted into the store.
    pub appended: usize,
    pub failed: usize,
    pub state: WorkerState,
    /// The failure that ended the worker early, if any.
    pub failure: Option<String>,
}

impl WorkerReport {
    fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            attempted: 0,
            appended: 0,
            failed: 0,
            state: WorkerState::Init,
            failure: None,
        }
    }

    /// Report for a worker task that never returned.
    pub fn lost(worker_id: usize, reason: impl fmt::Display) -> Self {
        Self {
            state: WorkerState::Closed,
            failure: Some(reason.to_string()),
            ..Self::new(worker_id)
        }
    }
}

/// State shared by every worker of a run.
pub struct WorkerContext {
    pub job: Arc<Job>,
    pub store: Arc<AggregationStore>,
    pub factory: Arc<dyn SessionFactory>,
    pub identities: Arc<IdentityPool>,
    pub cookies: Arc<Vec<SessionCookie>>,
    pub pacing: Pacing,
    pub policy: FailurePolicy,
    /// Records requested by the run, for progress events.
    pub requested: Option<usize>,
}

/// Owns one session and processes one partition of work items.
pub struct SessionWorker {
    id: usize,
    headless: bool,
    items: Vec<WorkItem>,
    ctx: Arc<WorkerContext>,
}

impl SessionWorker {
    pub fn new(id: usize, headless: bool, items: Vec<WorkItem>, ctx: Arc<WorkerContext>) -> Self {
        Self {
            id,
            headless,
            items,
            ctx,
        }
    }

    /// Runs the worker to completion. Never fails; failures are reported.
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(self.id);
        let worker = self.id;

        let mut session = match self.open().await {
            Ok(session) => session,
            Err(e) => {
                error!(worker, error = %e, "Session setup failed");
                report.failure = Some(e.to_string());
                report.state = WorkerState::Closed;
                return report;
            }
        };

        report.state = WorkerState::Processing;
        let processed = AssertUnwindSafe(self.drive(session.as_mut(), &mut report))
            .catch_unwind()
            .await;
        if let Err(panic) = processed {
            let reason = panic_message(panic.as_ref());
            error!(worker, reason = %reason, "Worker panicked");
            report.failure = Some(format!("worker panicked: {}", reason));
        }

        report.state = WorkerState::Draining;
        if let Err(e) = session.close().await {
            warn!(worker, error = %e, "Failed to close session");
        }
        report.state = WorkerState::Closed;
        debug!(
            worker,
            attempted = report.attempted,
            appended = report.appended,
            failed = report.failed,
            "Worker finished"
        );
        report
    }

    /// Processes the partition in order until it is exhausted or the
    /// failure policy stops the worker.
    async fn drive(&self, session: &mut dyn Session, report: &mut WorkerReport) {
        let worker = self.id;
        let total = self
            .ctx
            .requested
            .map_or_else(|| "all".to_string(), |n| n.to_string());
        let mut streak = 0;

        for item in &self.items {
            report.attempted += 1;
            let start = Instant::now();

            match self.process(&mut *session, item).await {
                Ok((subject, emitted)) => {
                    let inserted = match emitted {
                        Emitted::Record(record) => usize::from(self.ctx.store.append(record).await),
                        Emitted::Records(records) => self.ctx.store.append_all(records).await,
                    };
                    report.appended += inserted;
                    streak = 0;
                    info!(
                        worker,
                        subject = %subject,
                        inserted,
                        count = self.ctx.store.size(),
                        total = %total,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Scraped {}",
                        subject
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    streak += 1;
                    warn!(worker, item = %item, error = %e, "Item failed");
                    if self.ctx.policy.stops_after(streak) {
                        warn!(
                            worker,
                            policy = %self.ctx.policy,
                            remaining = self.items.len() - report.attempted,
                            "Abandoning partition"
                        );
                        report.failure = Some(e.to_string());
                        return;
                    }
                }
            }
            self.ctx.pacing.pause().await;
        }
    }

    async fn open(&self) -> Result<Box<dyn Session>> {
        let identity = self.ctx.identities.acquire().await?;
        let description = identity.describe();
        let options = SessionOptions {
            worker_id: self.id,
            headless: self.headless,
            identity,
            cookies: self.ctx.cookies.as_ref().clone(),
        };
        let session = self.ctx.factory.open(options).await?;
        info!(
            worker = self.id,
            identity = %description,
            headless = self.headless,
            items = self.items.len(),
            "Session started"
        );
        Ok(session)
    }

    /// Runs every stage for one item and applies the emission rule.
    async fn process(
        &self,
        session: &mut dyn Session,
        item: &WorkItem,
    ) -> Result<(String, Emitted)> {
        let mut merged = Record::new();
        for stage in self.ctx.job.stages() {
            let url = stage.url_for(item)?;
            session.navigate(&url).await?;
            let markup = session.markup(stage.container()).await?;
            merged.merge(stage.extract(&markup)?);
        }
        let subject = self.ctx.job.describe(&merged, item);
        Ok((subject, self.ctx.job.emitted(merged)))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

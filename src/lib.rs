//! # a3s-harvest
//!
//! A parallel scrape orchestrator with a declarative field-extraction layer.
//!
//! A run takes an ordered list of work items, splits it across several
//! concurrent sessions and lets every session fetch, extract and store its
//! share sequentially:
//!
//! - Balanced partitioning of work items across sessions
//! - One egress identity (proxy plus fingerprint) per session, optionally single-use
//! - Declarative schemas turning a parsed fragment into a partially-nullable record
//! - A shared, deduplicating aggregation store
//! - Per-item failure containment and randomised pacing
//!
//! ## Example
//!
//! ```rust,no_run
//! use a3s_harvest::{jobs::JobKind, CsvSink, Harvest, HttpSessionFactory, ItemLimit, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let base = url::Url::parse("https://www.hltv.org")?;
//!     let job = JobKind::Teams.build(&base, None, ItemLimit::Count(10))?;
//!
//!     let harvest = Harvest::new(HttpSessionFactory::new()).options(RunOptions {
//!         sessions: 3,
//!         limit: ItemLimit::Count(10),
//!         ..Default::default()
//!     });
//!     let summary = harvest.run(job, &CsvSink::new("data/team_data.csv")).await?;
//!     println!("{} records stored", summary.stored);
//!     Ok(())
//! }
//! ```

mod aggregator;
mod controller;
mod error;
mod partition;
mod record;
mod worker;

pub mod config;
pub mod extract;
pub mod http;
pub mod identity;
pub mod job;
pub mod jobs;
pub mod pacing;
pub mod proxy;
pub mod session;
pub mod table;

#[cfg(feature = "headless")]
pub mod browser;

pub use aggregator::AggregationStore;
pub use config::{Backend, RunConfig};
pub use controller::{Harvest, RunError, RunOptions, RunSummary};
pub use error::{HarvestError, Result};
pub use http::HttpSessionFactory;
pub use identity::{Identity, IdentityMode, IdentityPool};
pub use job::{Job, Stage};
pub use pacing::Pacing;
pub use partition::{offsets, partition, ItemLimit, WorkItem};
pub use record::{Record, Value};
pub use session::{Session, SessionCookie, SessionFactory, SessionOptions};
pub use table::{CsvSink, Sink};
pub use worker::{FailurePolicy, WorkerReport, WorkerState};

#[cfg(feature = "headless")]
pub use browser::{BrowserSessionConfig, BrowserSessionFactory};

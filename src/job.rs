//! Job definitions: what a run fetches and how it turns pages into records.
//!
//! A [`Job`] bundles an item source, one or more navigation stages per item
//! and an emission rule. Every stage navigates its session to a URL derived
//! from the work item, reads one container's markup and extracts a record;
//! the records of all stages are merged into one.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::extract::{Fragment, Schema};
use crate::partition::{offsets, ItemLimit, WorkItem};
use crate::table;
use crate::{HarvestError, Record, Result, Value};

/// Maps a work item to the URL a stage navigates to.
pub type UrlFn = Arc<dyn Fn(&WorkItem) -> Result<String> + Send + Sync>;

/// Describes a merged record in progress events.
pub type SubjectFn = Arc<dyn Fn(&Record) -> Option<String> + Send + Sync>;

/// One navigation of a session while processing an item.
#[derive(Clone)]
pub struct Stage {
    name: String,
    url: UrlFn,
    container: String,
    schema: Schema,
}

impl Stage {
    /// Stage navigating to the item's own URL.
    pub fn new(name: &str, container: &str, schema: Schema) -> Self {
        Self {
            name: name.to_string(),
            url: Arc::new(|item: &WorkItem| match item {
                WorkItem::Url(url) => Ok(url.clone()),
                other => Err(HarvestError::Config(format!("{} is not a URL", other))),
            }),
            container: container.to_string(),
            schema,
        }
    }

    /// Derives the stage URL from the item.
    pub fn with_url<F>(mut self, url: F) -> Self
    where
        F: Fn(&WorkItem) -> Result<String> + Send + Sync + 'static,
    {
        self.url = Arc::new(url);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selector of the container whose markup is extracted.
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// URL to navigate to for `item`.
    pub fn url_for(&self, item: &WorkItem) -> Result<String> {
        (self.url)(item)
    }

    /// Parses container markup and extracts this stage's record.
    ///
    /// Synchronous on purpose: the parsed document must not live across an
    /// await point.
    pub fn extract(&self, markup: &str) -> Result<Record> {
        let fragment = Fragment::parse(markup);
        self.schema.extract(&fragment)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("container", &self.container)
            .field("schema", &self.schema)
            .finish()
    }
}

/// How a merged record becomes stored records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    /// The merged record itself.
    Single,
    /// One single-column record per entry of a string-list field.
    Explode {
        /// The string-list field to split.
        field: String,
        /// Column name of the emitted records.
        column: String,
        /// Maximum entries taken from one page.
        limit: ItemLimit,
    },
}

/// Result of applying the emission rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Record(Record),
    Records(Vec<Record>),
}

impl Emitted {
    pub fn len(&self) -> usize {
        match self {
            Emitted::Record(_) => 1,
            Emitted::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a job's work items come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    /// Identifiers in a named column of a CSV file.
    Column {
        path: PathBuf,
        column: String,
        /// Cells hold encoded lists that are flattened first.
        encoded_lists: bool,
        /// Items per unit of the requested limit.
        per_unit: usize,
    },
    /// Pagination offsets, `step` entries per page.
    Offsets { step: usize },
    /// A fixed list; the limit applies to emitted records instead.
    Items(Vec<WorkItem>),
}

/// Items to process plus the number of records requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub items: Vec<WorkItem>,
    /// `None` when the run takes everything available.
    pub requested: Option<usize>,
}

impl ItemSource {
    /// Resolves the source against a requested limit.
    pub fn plan(&self, limit: ItemLimit) -> Result<Plan> {
        match self {
            ItemSource::Column {
                path,
                column,
                encoded_lists,
                per_unit,
            } => {
                let cells = table::read_column(path, column)?;
                let ids = if *encoded_lists {
                    table::flatten_encoded_lists(&cells)
                } else {
                    cells
                };
                let take = match limit {
                    ItemLimit::All => ids.len(),
                    ItemLimit::Count(n) => n.saturating_mul((*per_unit).max(1)).min(ids.len()),
                };
                let items: Vec<WorkItem> = ids.into_iter().take(take).map(WorkItem::Url).collect();
                Ok(Plan {
                    requested: Some(items.len()),
                    items,
                })
            }
            ItemSource::Offsets { step } => match limit {
                ItemLimit::All => Err(HarvestError::Config(
                    "pagination needs an explicit item limit".to_string(),
                )),
                ItemLimit::Count(n) => {
                    let items = offsets(n, *step);
                    Ok(Plan {
                        requested: Some(items.len() * step),
                        items,
                    })
                }
            },
            ItemSource::Items(items) => Ok(Plan {
                items: items.clone(),
                requested: match limit {
                    ItemLimit::All => None,
                    ItemLimit::Count(n) => Some(n),
                },
            }),
        }
    }
}

/// A complete harvesting job.
#[derive(Clone)]
pub struct Job {
    name: String,
    source: ItemSource,
    stages: Vec<Stage>,
    emit: Emit,
    order: Option<Vec<String>>,
    subject: Option<SubjectFn>,
}

impl Job {
    /// Creates a job with one stage that emits the extracted record.
    pub fn new(name: &str, source: ItemSource, stage: Stage) -> Self {
        Self {
            name: name.to_string(),
            source,
            stages: vec![stage],
            emit: Emit::Single,
            order: None,
            subject: None,
        }
    }

    /// Adds a stage run after the existing ones for every item.
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the emission rule.
    pub fn emit(mut self, emit: Emit) -> Self {
        self.emit = emit;
        self
    }

    /// Fixes the output column order instead of following stage order.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Sets how progress events describe a record.
    pub fn subject<F>(mut self, subject: F) -> Self
    where
        F: Fn(&Record) -> Option<String> + Send + Sync + 'static,
    {
        self.subject = Some(Arc::new(subject));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Output columns in declaration order.
    pub fn columns(&self) -> Vec<String> {
        if let Emit::Explode { column, .. } = &self.emit {
            return vec![column.clone()];
        }
        if let Some(order) = &self.order {
            return order.clone();
        }
        let mut columns: Vec<String> = Vec::new();
        for column in self.stages.iter().flat_map(|s| s.schema.columns()) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    /// Human-readable description of a merged record.
    pub fn describe(&self, record: &Record, item: &WorkItem) -> String {
        self.subject
            .as_ref()
            .and_then(|f| f(record))
            .unwrap_or_else(|| item.to_string())
    }

    /// Applies the emission rule to a merged record.
    pub fn emitted(&self, record: Record) -> Emitted {
        match &self.emit {
            Emit::Single => Emitted::Record(record),
            Emit::Explode {
                field,
                column,
                limit,
            } => {
                let entries = match record.get(field) {
                    Some(Value::Texts(entries)) => entries.clone(),
                    Some(Value::Text(entry)) => vec![entry.clone()],
                    _ => Vec::new(),
                };
                let take = limit.resolve(entries.len());
                Emitted::Records(
                    entries
                        .into_iter()
                        .take(take)
                        .map(|entry| Record::new().with(column.as_str(), entry))
                        .collect(),
                )
            }
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("stages", &self.stages)
            .field("emit", &self.emit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{Accessor, Field};
    use std::io::Write;

    fn team_stage() -> Stage {
        Stage::new(
            "profile",
            "div.colCon",
            Schema::new().field(Field::text("team_name", "h1").unwrap()),
        )
    }

    #[test]
    fn test_stage_default_url_is_item() {
        let stage = team_stage();
        assert_eq!(
            stage.url_for(&WorkItem::from("https://example.org/team/1")).unwrap(),
            "https://example.org/team/1"
        );
        assert!(stage.url_for(&WorkItem::Offset(100)).is_err());
    }

    #[test]
    fn test_stage_custom_url() {
        let stage = team_stage().with_url(|item| match item {
            WorkItem::Offset(o) => Ok(format!("https://example.org/results?offset={}", o)),
            WorkItem::Url(u) => Ok(u.clone()),
        });
        assert_eq!(
            stage.url_for(&WorkItem::Offset(200)).unwrap(),
            "https://example.org/results?offset=200"
        );
    }

    #[test]
    fn test_stage_extract() {
        let record = team_stage().extract("<h1>Vitality</h1>").unwrap();
        assert_eq!(record.text("team_name"), Some("Vitality"));
    }

    #[test]
    fn test_columns_merge_stages() {
        let second = Stage::new(
            "stats",
            "div.columns",
            Schema::new()
                .field(Field::text("team_name", "h1").unwrap())
                .field(Field::text("rating", "span").unwrap()),
        );
        let job = Job::new("teams", ItemSource::Items(vec![]), team_stage()).then(second);
        assert_eq!(job.columns(), vec!["team_name", "rating"]);
    }

    #[test]
    fn test_fixed_column_order() {
        let job = Job::new("teams", ItemSource::Items(vec![]), team_stage())
            .with_columns(["rating", "team_name"]);
        assert_eq!(job.columns(), vec!["rating", "team_name"]);
    }

    #[test]
    fn test_explode_emission_with_limit() {
        let schema = Schema::new()
            .collect("links", "a", Accessor::Attr("href".into()), vec![])
            .unwrap();
        let job = Job::new("urls", ItemSource::Items(vec![]), Stage::new("list", "div", schema)).emit(
            Emit::Explode {
                field: "links".into(),
                column: "team_url".into(),
                limit: ItemLimit::Count(2),
            },
        );
        let record = Record::new().with(
            "links",
            Value::Texts(vec!["/a".into(), "/b".into(), "/c".into()]),
        );
        match job.emitted(record) {
            Emitted::Records(records) => {
                assert_eq!(records.len(), 2);
                assert_eq!(records[1].text("team_url"), Some("/b"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(job.columns(), vec!["team_url"]);
    }

    #[test]
    fn test_explode_missing_field_emits_nothing() {
        let job = Job::new("urls", ItemSource::Items(vec![]), team_stage()).emit(Emit::Explode {
            field: "links".into(),
            column: "url".into(),
            limit: ItemLimit::All,
        });
        assert!(job.emitted(Record::new()).is_empty());
    }

    #[test]
    fn test_describe_falls_back_to_item() {
        let job = Job::new("teams", ItemSource::Items(vec![]), team_stage())
            .subject(|r| r.text("team_name").map(str::to_string));
        let item = WorkItem::from("https://example.org/team/1");
        assert_eq!(job.describe(&Record::new().with("team_name", "G2"), &item), "G2");
        assert_eq!(job.describe(&Record::new(), &item), "https://example.org/team/1");
    }

    #[test]
    fn test_plan_offsets() {
        let plan = ItemSource::Offsets { step: 100 }
            .plan(ItemLimit::Count(250))
            .unwrap();
        assert_eq!(plan.items.len(), 3);
        assert_eq!(plan.requested, Some(300));
        assert!(ItemSource::Offsets { step: 100 }.plan(ItemLimit::All).is_err());
    }

    #[test]
    fn test_plan_column_with_units() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "team_name,player_urls").unwrap();
        writeln!(file, "A,\"['/p/1', '/p/2', '/p/3']\"").unwrap();
        writeln!(file, "B,\"['/p/4', '/p/5']\"").unwrap();
        file.flush().unwrap();

        let source = ItemSource::Column {
            path: file.path().to_path_buf(),
            column: "player_urls".into(),
            encoded_lists: true,
            per_unit: 2,
        };
        let plan = source.plan(ItemLimit::Count(1)).unwrap();
        assert_eq!(plan.items, vec![WorkItem::from("/p/1"), WorkItem::from("/p/2")]);

        let all = source.plan(ItemLimit::All).unwrap();
        assert_eq!(all.items.len(), 5);
        assert_eq!(all.requested, Some(5));
    }
}

//! Team URLs from the world ranking.

use url::Url;

use crate::extract::{Accessor, Normalize, Schema};
use crate::job::{Emit, ItemSource, Job, Stage};
use crate::partition::{ItemLimit, WorkItem};
use crate::Result;

/// Output column.
pub const OUTPUT_COLUMN: &str = "team_url";

/// Fields of the ranking page.
pub fn schema(base: &Url) -> Result<Schema> {
    Schema::new().collect(
        "team_urls",
        "a[href*='/team/']",
        Accessor::Attr("href".to_string()),
        vec![Normalize::AbsoluteUrl(base.clone())],
    )
}

/// Reads the top `limit` teams of the ranking page.
pub fn job(base: &Url, limit: ItemLimit) -> Result<Job> {
    let ranking = base.join("/ranking/teams")?;
    let stage = Stage::new("ranking", "div.ranking", schema(base)?);
    Ok(Job::new(
        "team-urls",
        ItemSource::Items(vec![WorkItem::Url(ranking.to_string())]),
        stage,
    )
    .emit(Emit::Explode {
        field: "team_urls".to_string(),
        column: OUTPUT_COLUMN.to_string(),
        limit,
    }))
}

//! Recent match URLs from the paginated results listing.

use url::Url;

use crate::extract::{Accessor, Normalize, Schema};
use crate::job::{Emit, ItemSource, Job, Stage};
use crate::partition::{ItemLimit, WorkItem};
use crate::{HarvestError, Result};

/// Output column.
pub const OUTPUT_COLUMN: &str = "match_url";

/// Results shown per listing page.
pub const PAGE_SIZE: usize = 100;

/// Fields of one results page.
pub fn schema(base: &Url) -> Result<Schema> {
    Schema::new().collect(
        "match_urls",
        "div.allres div.result-con a[href]",
        Accessor::Attr("href".to_string()),
        vec![Normalize::AbsoluteUrl(base.clone())],
    )
}

/// URL of the results page starting at `offset`.
pub fn page_url(base: &Url, offset: u64) -> Result<String> {
    let mut url = base.join("/results")?;
    url.set_query(Some(&format!("offset={}", offset)));
    Ok(url.to_string())
}

/// Collects match URLs page by page. Needs an explicit limit, rounded up to
/// whole pages.
pub fn job(base: &Url) -> Result<Job> {
    let listing = base.clone();
    let stage = Stage::new("results", "div.results", schema(base)?).with_url(move |item| match item {
        WorkItem::Offset(offset) => page_url(&listing, *offset),
        other => Err(HarvestError::Config(format!("{} is not a results page", other))),
    });
    Ok(Job::new("match-urls", ItemSource::Offsets { step: PAGE_SIZE }, stage).emit(
        Emit::Explode {
            field: "match_urls".to_string(),
            column: OUTPUT_COLUMN.to_string(),
            limit: ItemLimit::All,
        },
    ))
}

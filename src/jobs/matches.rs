//! Match pages: teams, scores, date and per-map results.

use std::path::PathBuf;

use url::Url;

use crate::extract::{Field, Normalize, Schema, Scope};
use crate::job::{ItemSource, Job, Stage};
use crate::{Result, Value};

/// Input column holding match URLs.
pub const INPUT_COLUMN: &str = "match_url";

fn team_name(n: u8) -> Result<Field> {
    Ok(Field::text(
        &format!("team_{}", n),
        &format!("div.teamsBox div.team{}-gradient div.teamName", n),
    )?
    .then(Normalize::Trim)
    .then(Normalize::RemoveSpaces))
}

fn team_score(n: u8) -> Result<Field> {
    Ok(Field::text(
        &format!("score_team_{}", n),
        &format!(
            "div.teamsBox div.team{n}-gradient div.lost, div.teamsBox div.team{n}-gradient div.won"
        ),
    )?
    .then(Normalize::Trim))
}

fn team_won(n: u8) -> Result<Field> {
    Ok(Field::flag(
        &format!("team_{}_won", n),
        &format!(
            "div.teamsBox div.team{n}-gradient.won, div.teamsBox div.team{n}-gradient div.won"
        ),
    )?
    .hidden())
}

/// Picks team 1 or team 2 by which side carries a marker.
fn side(scope: &Scope<'_>, left: &str, right: &str) -> Option<Value> {
    if scope.flag(left) {
        Some(scope.value("team_1"))
    } else if scope.flag(right) {
        Some(scope.value("team_2"))
    } else {
        None
    }
}

/// One played map.
fn map_schema() -> Result<Schema> {
    Ok(Schema::new()
        .field(Field::text("map", "div.mapname")?.then(Normalize::Trim))
        .field(Field::flag("left_pick", ".results-left.pick")?.hidden())
        .field(Field::flag("right_pick", ".results-right.pick")?.hidden())
        .field(Field::flag("left_won", ".results-left.won")?.hidden())
        .field(Field::flag("right_won", ".results-right.won")?.hidden())
        .field(
            Field::text("left_score", ".results-left div.results-team-score")?
                .then(Normalize::Trim)
                .hidden(),
        )
        .field(
            Field::text("right_score", ".results-right div.results-team-score")?
                .then(Normalize::Trim)
                .hidden(),
        )
        .derive("picked_by", |s| {
            side(s, "left_pick", "right_pick").unwrap_or_else(|| Value::from("N/A"))
        })
        .derive("winner", |s| {
            side(s, "left_won", "right_won").unwrap_or_else(|| Value::from("N/A"))
        })
        .derive("score", |s| match (s.text("left_score"), s.text("right_score")) {
            (Some(l), Some(r)) => Value::from(format!("{}:{}", l, r)),
            _ => Value::Absent,
        }))
}

/// Fields of one match page.
pub fn schema() -> Result<Schema> {
    Ok(Schema::new()
        .field(team_name(1)?)
        .field(team_name(2)?)
        .field(team_score(1)?)
        .field(team_score(2)?)
        .field(team_won(1)?)
        .field(team_won(2)?)
        .derive("winner", |s| {
            side(s, "team_1_won", "team_2_won").unwrap_or(Value::Absent)
        })
        .field(
            Field::text("date", "div.timeAndEvent div.date")?
                .then(Normalize::Trim)
                .then(Normalize::Date),
        )
        .field(Field::text("hour", "div.timeAndEvent div.time")?.then(Normalize::Hour))
        .field(
            Field::text("event", "div.timeAndEvent a[href*='/events/']")?.then(Normalize::Trim),
        )
        .field(
            Field::text("mode", "div.maps div.preformatted-text")?
                .then(Normalize::BestOf)
                .or("N/A"),
        )
        .repeated("maps", "div.maps div.mapholder", Some("div.played"), map_schema()?)?)
}

/// Scrapes every match URL listed in `input`.
pub fn job(_base: &Url, input: PathBuf) -> Result<Job> {
    let stage = Stage::new("match", "div.colCon", schema()?);
    let source = ItemSource::Column {
        path: input,
        column: INPUT_COLUMN.to_string(),
        encoded_lists: false,
        per_unit: 1,
    };
    Ok(Job::new("matches", source, stage).subject(|r| {
        Some(format!(
            "{} vs {} ({})",
            r.text("team_1")?,
            r.text("team_2")?,
            r.text("date").unwrap_or("?")
        ))
    }))
}

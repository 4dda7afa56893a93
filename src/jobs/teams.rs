//! Team profile pages.

use std::path::PathBuf;

use url::Url;

use crate::extract::{Accessor, Field, Locator, Normalize, Schema};
use crate::job::{ItemSource, Job, Stage};
use crate::Result;

/// Input column holding team URLs.
pub const INPUT_COLUMN: &str = "team_url";

/// Maps whose win rate is looked up on the profile. Only the team's best
/// maps are listed there, so most of these usually resolve absent.
pub const MAP_POOL: [&str; 9] = [
    "Ancient", "Anubis", "Dust2", "Inferno", "Mirage", "Nuke", "Overpass", "Train", "Vertigo",
];

fn highlighted_stat(name: &str, description: &str) -> Result<Field> {
    let locator = Locator::parse("#matchesBox")?.labelled(
        "div.highlighted-stat",
        "div.description",
        description,
        "div.stat",
    )?;
    Ok(Field::new(name, locator, Accessor::Text).then(Normalize::Trim))
}

fn map_winrates() -> Result<Schema> {
    let mut schema = Schema::new();
    for map in MAP_POOL {
        let locator = Locator::parse("div.map-statistics")?.labelled(
            "div.map-statistics-container",
            "div.map-statistics-row-map-mapname",
            map,
            "div.map-statistics-row-win-percentage",
        )?;
        schema = schema.field(Field::new(map, locator, Accessor::Text).then(Normalize::StripPercent));
    }
    Ok(schema)
}

/// Fields of one team profile.
pub fn schema(base: &Url) -> Result<Schema> {
    let average_age = Locator::label("div.profile-team-stat", "b", "Average player age", "span.right")?;

    Schema::new()
        .field(
            Field::text("team_name", "h1.profile-team-name")?
                .then(Normalize::Trim)
                .then(Normalize::RemoveSpaces),
        )
        .field(Field::text("team_region", "div.team-country")?.then(Normalize::Trim))
        .field(Field::text("world_ranking", "a[href*='/ranking/teams/']")?.then(Normalize::Trim))
        .field(
            Field::text("valve_ranking", "a[href*='/valve-ranking/teams']")?.then(Normalize::Trim),
        )
        .field(Field::new("avg_player_age", average_age, Accessor::Text).then(Normalize::Trim))
        .field(highlighted_stat("current_winstreak", "Current win streak")?)
        .field(highlighted_stat("winrate", "Win rate")?.then(Normalize::StripPercent))
        .nested("map_winrates", map_winrates()?)
        .field(
            Field::attr("coach_url", "a[href*='/coach/']", "href")?
                .then(Normalize::AbsoluteUrl(base.clone())),
        )
        .collect(
            "player_urls",
            "div.bodyshot-team-bg a[href*='/player/']",
            Accessor::Attr("href".to_string()),
            vec![Normalize::AbsoluteUrl(base.clone())],
        )
}

/// Scrapes every team URL listed in `input`.
pub fn job(base: &Url, input: PathBuf) -> Result<Job> {
    let stage = Stage::new("profile", "div.colCon", schema(base)?);
    let source = ItemSource::Column {
        path: input,
        column: INPUT_COLUMN.to_string(),
        encoded_lists: false,
        per_unit: 1,
    };
    Ok(Job::new("teams", source, stage).subject(|r| {
        let name = r.text("team_name")?;
        Some(match r.text("world_ranking") {
            Some(rank) => format!("{} ({} World)", name, rank),
            None => name.to_string(),
        })
    }))
}

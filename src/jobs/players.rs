//! Player statistics over the last three months.
//!
//! Every player needs two pages: the stats overview (summary, overall and
//! per-side role stats) and the individual stats page (opening duels,
//! multi-kill rounds and kills per weapon).

use std::path::PathBuf;

use chrono::{Local, Months, NaiveDate};
use url::Url;

use crate::extract::{Field, Normalize, Schema};
use crate::job::{ItemSource, Job, Stage};
use crate::partition::WorkItem;
use crate::{HarvestError, Result};

/// Input column holding each team's encoded list of player URLs.
pub const INPUT_COLUMN: &str = "player_urls";

/// Players requested per unit of the item limit (one team).
pub const PLAYERS_PER_TEAM: usize = 5;

const STATS_WINDOW_MONTHS: u32 = 3;

/// How a raw stat cell is cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Plain,
    Percent,
    Duration,
}

type StatRow = (&'static str, usize, Unit);

const FIREPOWER: &[StatRow] = &[
    ("kills_per_round", 0, Unit::Plain),
    ("rounds_with_kill_pct", 1, Unit::Percent),
    ("kills_per_round_win", 2, Unit::Plain),
    ("rating_2_1", 3, Unit::Plain),
    ("damage_per_round", 4, Unit::Plain),
    ("multi_kill_rounds_pct", 5, Unit::Percent),
    ("damage_per_round_win", 6, Unit::Plain),
    ("pistol_round_rating", 7, Unit::Plain),
];

const ENTRYING: &[StatRow] = &[
    ("saved_by_teammate_per_round", 0, Unit::Plain),
    ("traded_deaths_per_round", 1, Unit::Plain),
    ("traded_deaths_pct", 2, Unit::Percent),
    ("opening_deaths_traded_pct", 3, Unit::Percent),
    ("assists_per_round", 4, Unit::Plain),
    ("support_rounds_pct", 5, Unit::Percent),
];

const TRADING: &[StatRow] = &[
    ("saved_teammate_per_round", 0, Unit::Plain),
    ("trade_kills_per_round", 1, Unit::Plain),
    ("trade_kills_pct", 2, Unit::Percent),
    ("assisted_kills_pct", 3, Unit::Percent),
    ("damage_per_kill", 4, Unit::Plain),
];

const OPENING: &[StatRow] = &[
    ("opening_kills_per_round", 0, Unit::Plain),
    ("opening_deaths_per_round", 1, Unit::Plain),
    ("opening_attempts_pct", 2, Unit::Percent),
    ("opening_success_pct", 3, Unit::Percent),
    ("win_pct_after_opening_kill", 4, Unit::Percent),
    ("attacks_per_round", 5, Unit::Plain),
];

const CLUTCHING: &[StatRow] = &[
    ("clutch_points_per_round", 0, Unit::Plain),
    ("last_alive_pct", 1, Unit::Percent),
    ("one_vs_one_win_pct", 2, Unit::Percent),
    ("time_alive_per_round_seconds", 3, Unit::Duration),
    ("saves_per_round_loss_pct", 4, Unit::Percent),
];

const SNIPING: &[StatRow] = &[
    ("sniper_kills_per_round", 0, Unit::Plain),
    ("sniper_kills_pct", 1, Unit::Percent),
    ("rounds_with_sniper_kills_pct", 2, Unit::Percent),
    ("sniper_multi_kill_rounds", 3, Unit::Percent),
    ("sniper_opening_kills_per_round", 4, Unit::Plain),
];

const UTILITY: &[StatRow] = &[
    ("utility_damage_per_round", 0, Unit::Plain),
    ("utility_kills_per_100_rounds", 1, Unit::Plain),
    ("flashes_thrown_per_round", 2, Unit::Plain),
    ("flash_assists_per_round", 3, Unit::Plain),
    ("time_opponent_flashed_per_round", 4, Unit::Plain),
];

const ROLES: [(&str, &[StatRow]); 7] = [
    ("firepower", FIREPOWER),
    ("entrying", ENTRYING),
    ("trading", TRADING),
    ("opening", OPENING),
    ("clutching", CLUTCHING),
    ("sniping", SNIPING),
    ("utility", UTILITY),
];

fn stat(name: &str, path: &str, unit: Unit) -> Result<Field> {
    let field = Field::text(name, path)?.then(Normalize::Trim);
    Ok(match unit {
        Unit::Plain => field,
        Unit::Percent => field.then(Normalize::StripPercent),
        Unit::Duration => field.then(Normalize::DurationSeconds),
    })
}

/// `label value` rows inside the n-th `div.stats-rows`, value in the second span.
fn stats_rows(block: &str, rows: &[StatRow]) -> Result<Schema> {
    rows.iter().try_fold(Schema::new(), |schema, (name, row, unit)| {
        let path = format!("{} >> div.stats-row@{} >> span@1", block, row);
        Ok(schema.field(stat(name, &path, *unit)?))
    })
}

fn summary_breakdown(name: &str, row: usize, col: usize, unit: Unit) -> Result<Field> {
    stat(
        name,
        &format!(
            "div.summaryStatBreakdownRow@{} >> div.summaryStatBreakdown@{} >> div.summaryStatBreakdownDataValue",
            row, col
        ),
        unit,
    )
}

fn overall() -> Result<Schema> {
    let first = stats_rows(
        "div.stats-rows@0",
        &[
            ("kills", 0, Unit::Plain),
            ("hs_percentage", 1, Unit::Percent),
            ("deaths", 2, Unit::Plain),
            ("kd", 3, Unit::Plain),
            ("adr", 4, Unit::Plain),
            ("grenade_adr", 5, Unit::Plain),
            ("maps_played", 6, Unit::Plain),
        ],
    )?;
    let second = [
        ("rounds_played", 0, Unit::Plain),
        ("kpr", 1, Unit::Plain),
        ("apr", 2, Unit::Plain),
        ("dpr", 3, Unit::Plain),
        ("saved_by_teammates_pr", 4, Unit::Plain),
        ("saved_teammates_pr", 5, Unit::Plain),
    ];

    let mut schema = first
        .field(summary_breakdown("rating", 0, 0, Unit::Plain)?)
        .field(summary_breakdown("kast", 0, 2, Unit::Percent)?)
        .field(summary_breakdown("impact", 1, 0, Unit::Plain)?);
    for (name, row, unit) in second {
        let path = format!("div.stats-rows@1 >> div.stats-row@{} >> span@1", row);
        schema = schema.field(stat(name, &path, unit)?);
    }
    Ok(schema)
}

/// One role box for one side; a missing box leaves its fields absent.
fn role(role: &str, side: &str, rows: &[StatRow]) -> Result<Schema> {
    let mut schema = Schema::new()
        .within(&format!("div.role-stats-container div.role-{}", role))?
        .field(
            Field::text(
                "overall",
                &format!("div.stats-side-{} >> div.row-stats-section-score", side),
            )?
            .then(Normalize::BeforeSlash),
        );
    for (name, row, unit) in rows {
        let path = format!("div.role-stats-row.stats-side-{}@{} >> div.role-stats-data", side, row);
        schema = schema.field(stat(name, &path, *unit)?);
    }
    Ok(schema)
}

fn side(side: &str) -> Result<Vec<(&'static str, Schema)>> {
    ROLES
        .iter()
        .map(|(name, rows)| Ok((*name, role(name, side, rows)?)))
        .collect()
}

/// Fields of the stats overview page.
pub fn stats_schema() -> Result<Schema> {
    Ok(Schema::new()
        .field(
            Field::text("name", "h1.summaryNickname")?
                .then(Normalize::Trim)
                .then(Normalize::RemoveSpaces),
        )
        .field(Field::attr("country", "img.flag", "title")?)
        .field(
            Field::text("team", "div.SummaryTeamname a")?
                .then(Normalize::Trim)
                .then(Normalize::RemoveSpaces),
        )
        .field(Field::text("age", "div.summaryPlayerAge")?.then(Normalize::FirstWord))
        .nested("overall", overall()?)
        .group("ct-side", side("ct")?)
        .group("t-side", side("t")?))
}

/// Fields of the individual stats page.
pub fn individual_schema() -> Result<Schema> {
    let opening = stats_rows(
        "div.stats-rows@0 >> div.standard-box@1",
        &[
            ("kills", 0, Unit::Plain),
            ("deaths", 1, Unit::Plain),
            ("kd", 2, Unit::Plain),
            ("kill_rating", 3, Unit::Plain),
            ("win_percent_after_first_kill", 4, Unit::Percent),
            ("first_kill_in_won_rounds", 5, Unit::Percent),
        ],
    )?;
    let rounds = stats_rows(
        "div.stats-rows@1 >> div.standard-box@0",
        &[
            ("0_kill", 0, Unit::Plain),
            ("1_kill", 1, Unit::Plain),
            ("2_kill", 2, Unit::Plain),
            ("3_kill", 3, Unit::Plain),
            ("4_kill", 4, Unit::Plain),
            ("5_kill", 5, Unit::Plain),
        ],
    )?;
    let weapon = stats_rows(
        "div.stats-rows@1 >> div.standard-box@1",
        &[
            ("rifle", 0, Unit::Plain),
            ("sniper", 1, Unit::Plain),
            ("smg", 2, Unit::Plain),
            ("pistol", 3, Unit::Plain),
            ("grenade", 4, Unit::Plain),
            ("other", 5, Unit::Plain),
        ],
    )?;
    Ok(Schema::new()
        .nested("opening", opening)
        .nested("round", rounds)
        .nested("weapon", weapon))
}

/// Stats URL for a player profile URL, covering the window ending `today`.
///
/// `https://www.hltv.org/player/7998/s1mple` becomes
/// `https://www.hltv.org/stats/players/7998/s1mple?startDate=...&endDate=...`.
pub fn stats_url(profile: &str, today: NaiveDate, individual: bool) -> Result<String> {
    let mut url = Url::parse(profile)?;
    let (id, name) = {
        let mut segments = url
            .path_segments()
            .ok_or_else(|| HarvestError::Config(format!("not a player URL: {}", profile)))?;
        match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => {
                (id.to_string(), name.to_string())
            }
            _ => return Err(HarvestError::Config(format!("not a player URL: {}", profile))),
        }
    };

    let start = today
        .checked_sub_months(Months::new(STATS_WINDOW_MONTHS))
        .unwrap_or(today);
    let kind = if individual { "players/individual" } else { "players" };
    url.set_path(&format!("/stats/{}/{}/{}", kind, id, name));
    url.set_query(Some(&format!(
        "startDate={}&endDate={}",
        start.format("%Y-%m-%d"),
        today.format("%Y-%m-%d")
    )));
    Ok(url.to_string())
}

fn stage_url(item: &WorkItem, individual: bool) -> Result<String> {
    match item {
        WorkItem::Url(profile) => stats_url(profile, Local::now().date_naive(), individual),
        other => Err(HarvestError::Config(format!("{} is not a player URL", other))),
    }
}

/// Scrapes the players of the teams listed in `input`.
///
/// The item limit counts teams; each team contributes up to five players.
pub fn job(_base: &Url, input: PathBuf) -> Result<Job> {
    let stats = Stage::new("stats", "div.stats-player", stats_schema()?)
        .with_url(|item| stage_url(item, false));
    let individual = Stage::new("individual", "div.columns", individual_schema()?)
        .with_url(|item| stage_url(item, true));
    let source = ItemSource::Column {
        path: input,
        column: INPUT_COLUMN.to_string(),
        encoded_lists: true,
        per_unit: PLAYERS_PER_TEAM,
    };
    Ok(Job::new("players", source, stats)
        .then(individual)
        .with_columns([
            "name", "country", "team", "age", "overall", "opening", "round", "weapon", "ct-side",
            "t-side",
        ])
        .subject(|r| r.text("name").map(str::to_string)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, Fragment};
    use crate::{Record, Value};

    fn row(label: &str, value: &str) -> String {
        format!(r#"<div class="stats-row"><span>{}</span><span>{}</span></div>"#, label, value)
    }

    fn role_box(role: &str, ct_overall: &str, ct_values: &[&str]) -> String {
        let rows: String = ct_values
            .iter()
            .map(|v| {
                format!(
                    r#"<div class="role-stats-row stats-side-ct"><div class="role-stats-title">x</div><div class="role-stats-data">{}</div></div>
                       <div class="role-stats-row stats-side-t"><div class="role-stats-title">x</div><div class="role-stats-data">0</div></div>"#,
                    v
                )
            })
            .collect();
        format!(
            r#"<div class="role-{}">
                 <div class="stats-side-ct"><div class="row-stats-section-score">{}</div></div>
                 <div class="stats-side-t"><div class="row-stats-section-score">40/100</div></div>
                 {}
               </div>"#,
            role, ct_overall, rows
        )
    }

    fn stats_page() -> String {
        let first: String = [
            ("Kills", "1240"),
            ("Headshot %", "32.1%"),
            ("Deaths", "900"),
            ("K/D Ratio", "1.38"),
            ("Damage / Round", "85.2"),
            ("Grenade dmg / Round", "3.1"),
            ("Maps played", "55"),
        ]
        .iter()
        .map(|(l, v)| row(l, v))
        .collect();
        let second: String = [
            ("Rounds played", "1400"),
            ("Kills / round", "0.89"),
            ("Assists / round", "0.10"),
            ("Deaths / round", "0.64"),
            ("Saved by teammate / round", "0.08"),
            ("Saved teammates / round", "0.09"),
        ]
        .iter()
        .map(|(l, v)| row(l, v))
        .collect();
        format!(
            r#"
            <h1 class="summaryNickname text-ellipsis">ZywOo</h1>
            <img class="flag" title="France" src="/img/static/flags/30x20/FR.gif">
            <div class="SummaryTeamname text-ellipsis"><a href="/team/9565/vitality">Vitality</a></div>
            <div class="summaryPlayerAge">24 years</div>
            <div class="summaryStatBreakdownRow">
                <div class="summaryStatBreakdown"><div class="summaryStatBreakdownDataValue">1.36</div></div>
                <div class="summaryStatBreakdown"><div class="summaryStatBreakdownDataValue">0.60</div></div>
                <div class="summaryStatBreakdown"><div class="summaryStatBreakdownDataValue">76.3%</div></div>
            </div>
            <div class="summaryStatBreakdownRow">
                <div class="summaryStatBreakdown"><div class="summaryStatBreakdownDataValue">1.45</div></div>
            </div>
            <div class="stats-rows">{}</div>
            <div class="stats-rows">{}</div>
            <div class="role-stats-container">{}{}</div>
            "#,
            first,
            second,
            role_box("firepower", "97/100", &["0.95", "55.2%", "1.21", "1.40", "90.1", "25.0%", "110.2", "1.50"]),
            role_box("clutching", "81/100", &["0.30", "12.5%", "70.0%", "1m 4s", "5.1%"]),
        )
    }

    #[test]
    fn test_stats_url() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        assert_eq!(
            stats_url("https://www.hltv.org/player/11893/zywoo", today, false).unwrap(),
            "https://www.hltv.org/stats/players/11893/zywoo?startDate=2025-03-03&endDate=2025-06-03"
        );
        assert_eq!(
            stats_url("https://www.hltv.org/player/11893/zywoo", today, true).unwrap(),
            "https://www.hltv.org/stats/players/individual/11893/zywoo?startDate=2025-03-03&endDate=2025-06-03"
        );
    }

    #[test]
    fn test_stats_url_clamps_month_end() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 31).unwrap();
        let url = stats_url("https://www.hltv.org/player/1/a", today, false).unwrap();
        assert!(url.ends_with("startDate=2025-02-28&endDate=2025-05-31"), "{}", url);
    }

    #[test]
    fn test_stats_url_rejects_other_urls() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();
        assert!(stats_url("https://www.hltv.org/player", today, false).is_err());
        assert!(stats_url("not a url", today, false).is_err());
        assert!(stage_url(&WorkItem::Offset(0), false).is_err());
    }

    #[test]
    fn test_summary_and_overall() {
        let record = extract(&Fragment::parse(&stats_page()), &stats_schema().unwrap()).unwrap();
        assert_eq!(record.text("name"), Some("ZywOo"));
        assert_eq!(record.text("country"), Some("France"));
        assert_eq!(record.text("team"), Some("Vitality"));
        assert_eq!(record.text("age"), Some("24"));

        let overall = record.get("overall").and_then(Value::as_record).unwrap();
        assert_eq!(overall.text("rating"), Some("1.36"));
        assert_eq!(overall.text("kast"), Some("76.3"));
        assert_eq!(overall.text("impact"), Some("1.45"));
        assert_eq!(overall.text("hs_percentage"), Some("32.1"));
        assert_eq!(overall.text("maps_played"), Some("55"));
        assert_eq!(overall.text("dpr"), Some("0.64"));
        assert_eq!(overall.text("saved_teammates_pr"), Some("0.09"));
    }

    #[test]
    fn test_side_roles() {
        let record = extract(&Fragment::parse(&stats_page()), &stats_schema().unwrap()).unwrap();
        let ct = record.get("ct-side").and_then(Value::as_record).unwrap();
        let role = |name: &str| ct.get(name).and_then(Value::as_record).unwrap().clone();

        let firepower = role("firepower");
        assert_eq!(firepower.text("overall"), Some("97"));
        assert_eq!(firepower.text("rounds_with_kill_pct"), Some("55.2"));
        assert_eq!(firepower.text("pistol_round_rating"), Some("1.50"));

        let clutching = role("clutching");
        assert_eq!(clutching.text("time_alive_per_round_seconds"), Some("64"));

        let sniping: Record = role("sniping");
        assert_eq!(sniping.get("overall"), Some(&Value::Absent));

        let t = record.get("t-side").and_then(Value::as_record).unwrap();
        let t_firepower = t.get("firepower").and_then(Value::as_record).unwrap();
        assert_eq!(t_firepower.text("overall"), Some("40"));
        assert_eq!(t_firepower.text("kills_per_round"), Some("0"));
    }

    #[test]
    fn test_individual_page() {
        let opening_rows: String = ["310", "250", "1.24", "1.10", "78.4%", "21.5%"]
            .iter()
            .map(|v| row("x", v))
            .collect();
        let counts: String = ["300", "500", "350", "150", "40", "5"].iter().map(|v| row("x", v)).collect();
        let weapons: String = ["800", "600", "20", "120", "15", "3"].iter().map(|v| row("x", v)).collect();
        let html = format!(
            r#"<div class="stats-rows">
                 <div class="standard-box">{}</div>
                 <div class="standard-box">{}</div>
               </div>
               <div class="stats-rows">
                 <div class="standard-box">{}</div>
                 <div class="standard-box">{}</div>
               </div>"#,
            row("Total opening kills", "0"),
            opening_rows,
            counts,
            weapons
        );
        let record = extract(&Fragment::parse(&html), &individual_schema().unwrap()).unwrap();
        let opening = record.get("opening").and_then(Value::as_record).unwrap();
        assert_eq!(opening.text("kills"), Some("310"));
        assert_eq!(opening.text("win_percent_after_first_kill"), Some("78.4"));
        let rounds = record.get("round").and_then(Value::as_record).unwrap();
        assert_eq!(rounds.text("5_kill"), Some("5"));
        let weapon = record.get("weapon").and_then(Value::as_record).unwrap();
        assert_eq!(weapon.text("sniper"), Some("600"));
    }

    #[test]
    fn test_job_columns_follow_declared_order() {
        let base = Url::parse("https://www.hltv.org").unwrap();
        let job = job(&base, PathBuf::from("data/team_data.csv")).unwrap();
        assert_eq!(job.stages().len(), 2);
        assert_eq!(job.columns()[4], "overall");
        assert_eq!(job.columns()[9], "t-side");
    }
}

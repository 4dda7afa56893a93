//! The shipped jobs.
//!
//! | Job          | Input                          | Output                         |
//! |--------------|--------------------------------|--------------------------------|
//! | `team-urls`  | world ranking page             | `data/team_urls.csv`           |
//! | `match-urls` | paginated results listing      | `data/recent_match_urls.csv`   |
//! | `teams`      | `data/team_urls.csv`           | `data/team_data.csv`           |
//! | `matches`    | `data/recent_match_urls.csv`   | `data/recent_match_data.csv`   |
//! | `players`    | `data/team_data.csv`           | `data/player_data.csv`         |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::job::Job;
use crate::partition::ItemLimit;
use crate::{HarvestError, Result};

pub mod match_urls;
pub mod matches;
pub mod players;
pub mod team_urls;
pub mod teams;

/// Identifies one of the shipped jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    TeamUrls,
    MatchUrls,
    Teams,
    Matches,
    Players,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::TeamUrls,
        JobKind::MatchUrls,
        JobKind::Teams,
        JobKind::Matches,
        JobKind::Players,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::TeamUrls => "team-urls",
            JobKind::MatchUrls => "match-urls",
            JobKind::Teams => "teams",
            JobKind::Matches => "matches",
            JobKind::Players => "players",
        }
    }

    /// Input table read by the job, if it reads one.
    pub fn default_input(self) -> Option<&'static Path> {
        match self {
            JobKind::TeamUrls | JobKind::MatchUrls => None,
            JobKind::Teams => Some(Path::new("data/team_urls.csv")),
            JobKind::Matches => Some(Path::new("data/recent_match_urls.csv")),
            JobKind::Players => Some(Path::new("data/team_data.csv")),
        }
    }

    /// Table the job writes.
    pub fn default_output(self) -> &'static Path {
        match self {
            JobKind::TeamUrls => Path::new("data/team_urls.csv"),
            JobKind::MatchUrls => Path::new("data/recent_match_urls.csv"),
            JobKind::Teams => Path::new("data/team_data.csv"),
            JobKind::Matches => Path::new("data/recent_match_data.csv"),
            JobKind::Players => Path::new("data/player_data.csv"),
        }
    }

    /// Builds the job against the site at `base`.
    ///
    /// `input` overrides the default input table. `limit` is only consumed
    /// by `team-urls`, which reads a single page; the other jobs apply the
    /// limit when their items are planned.
    pub fn build(self, base: &Url, input: Option<PathBuf>, limit: ItemLimit) -> Result<Job> {
        let input = input
            .or_else(|| self.default_input().map(Path::to_path_buf))
            .unwrap_or_default();
        match self {
            JobKind::TeamUrls => team_urls::job(base, limit),
            JobKind::MatchUrls => match_urls::job(base),
            JobKind::Teams => teams::job(base, input),
            JobKind::Matches => matches::job(base, input),
            JobKind::Players => players::job(base, input),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JobKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| HarvestError::Config(format!("unknown job '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in JobKind::ALL {
            assert_eq!(kind.name().parse::<JobKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.name());
        }
        assert!("scoreboard".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_chained_defaults() {
        assert_eq!(
            JobKind::Teams.default_input(),
            Some(JobKind::TeamUrls.default_output())
        );
        assert_eq!(
            JobKind::Matches.default_input(),
            Some(JobKind::MatchUrls.default_output())
        );
        assert_eq!(
            JobKind::Players.default_input(),
            Some(JobKind::Teams.default_output())
        );
        assert_eq!(JobKind::TeamUrls.default_input(), None);
    }

    #[test]
    fn test_build_every_job() {
        let base = Url::parse("https://www.hltv.org").unwrap();
        for kind in JobKind::ALL {
            let job = kind.build(&base, None, ItemLimit::Count(3)).unwrap();
            assert_eq!(job.name(), kind.name());
            assert!(!job.columns().is_empty());
        }
    }

    #[test]
    fn test_build_uses_input_override() {
        let base = Url::parse("https://www.hltv.org").unwrap();
        let job = JobKind::Teams
            .build(&base, Some(PathBuf::from("custom.csv")), ItemLimit::All)
            .unwrap();
        match job.source() {
            crate::job::ItemSource::Column { path, column, .. } => {
                assert_eq!(path, &PathBuf::from("custom.csv"));
                assert_eq!(column, teams::INPUT_COLUMN);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

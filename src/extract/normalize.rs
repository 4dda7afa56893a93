//! Text normalisations applied to scalar fields.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// One step of a scalar field's normalisation chain.
///
/// Each step either rewrites the text or rejects it; a rejected value makes
/// the field absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalize {
    /// Trim surrounding whitespace.
    Trim,
    /// Remove every space (team and player names).
    RemoveSpaces,
    /// Strip `%` signs, leaving the bare number.
    StripPercent,
    /// `"3rd of June 2025"` → `"03/06/2025"`.
    Date,
    /// `"20:30"` → `"20"`.
    Hour,
    /// `"1m 4s"` → `"64"`.
    DurationSeconds,
    /// `"87/100"` → `"87"`.
    BeforeSlash,
    /// `"27 years"` → `"27"`.
    FirstWord,
    /// `"Best of 3 (LAN)"` → `"Bo3"`.
    BestOf,
    /// Rejects anything that is not a number.
    Number,
    /// Resolves a relative link against a base URL.
    AbsoluteUrl(Url),
}

impl Normalize {
    /// Applies this step.
    pub fn apply(&self, text: String) -> Option<String> {
        match self {
            Normalize::Trim => Some(text.trim().to_string()),
            Normalize::RemoveSpaces => Some(text.replace(' ', "")),
            Normalize::StripPercent => Some(text.replace('%', "").trim().to_string()),
            Normalize::Date => normalize_date(&text),
            Normalize::Hour => text
                .trim()
                .split(':')
                .next()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            Normalize::DurationSeconds => duration_seconds(&text).map(|s| s.to_string()),
            Normalize::BeforeSlash => text
                .split('/')
                .next()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            Normalize::FirstWord => text.split_whitespace().next().map(str::to_string),
            Normalize::BestOf => first_number(&text).map(|n| format!("Bo{}", n)),
            Normalize::Number => {
                let t = text.trim();
                t.parse::<f64>().ok().map(|_| t.to_string())
            }
            Normalize::AbsoluteUrl(base) => base.join(text.trim()).ok().map(String::from),
        }
    }
}

/// Runs a whole chain, stopping at the first rejection.
pub fn apply_chain(chain: &[Normalize], text: String) -> Option<String> {
    chain.iter().try_fold(text, |acc, step| step.apply(acc))
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn month_number(name: &str) -> Option<usize> {
    let name = name.trim_end_matches(['.', ',']).to_lowercase();
    if name.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| *m == name || (name.len() == 3 && m.starts_with(&name)))
        .map(|i| i + 1)
}

fn ordinal_day() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})(st|nd|rd|th)?,?$").expect("valid regex"))
}

/// Normalises a calendar date to `DD/MM/YYYY`.
pub fn normalize_date(text: &str) -> Option<String> {
    let parts: Vec<&str> = text
        .split_whitespace()
        .filter(|w| !w.eq_ignore_ascii_case("of"))
        .collect();
    let [day, month, year] = parts.as_slice() else {
        return None;
    };

    let day: u32 = ordinal_day().captures(day)?.get(1)?.as_str().parse().ok()?;
    if !(1..=31).contains(&day) {
        return None;
    }
    let month = month_number(month)?;
    let year = year.trim_end_matches(['.', ',']);
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(format!("{:02}/{:02}/{}", day, month, year))
}

fn minutes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*m").expect("valid regex"))
}

fn seconds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s*s").expect("valid regex"))
}

/// Converts a relative duration such as `"1m 4s"` to whole seconds.
pub fn duration_seconds(text: &str) -> Option<u64> {
    let grab = |re: &Regex| -> Option<u64> { re.captures(text)?.get(1)?.as_str().parse().ok() };
    let minutes = grab(minutes_re());
    let seconds = grab(seconds_re());
    if minutes.is_none() && seconds.is_none() {
        return None;
    }
    minutes
        .unwrap_or(0)
        .checked_mul(60)?
        .checked_add(seconds.unwrap_or(0))
}

fn first_number(text: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
        .find(text)
        .map(|m| m.as_str())
}

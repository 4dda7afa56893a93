//! Element locators: how a field finds its node inside a fragment.
//!
//! A locator is a path of steps, each one scoped to the node matched by the
//! previous step. Paths are written as CSS selectors joined by `>>`; a step
//! may pick the n-th match (0-based) with an `@n` suffix:
//!
//! ```text
//! div.stats-rows@1 >> div.stats-row@4 >> span@1
//! ```

use std::fmt;

use scraper::{ElementRef, Selector};

use crate::{HarvestError, Result};

/// Compiles a CSS selector.
pub fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::Selector(format!("{}: {:?}", selector, e)))
}

/// Concatenated text content of an element.
pub fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect()
}

#[derive(Debug, Clone)]
enum Step {
    Select {
        selector: Selector,
        nth: Option<usize>,
    },
    /// Among `item` matches, the first whose `label` text contains `needle`,
    /// then `value` inside it.
    Labelled {
        item: Selector,
        label: Selector,
        needle: String,
        value: Selector,
    },
}

impl Step {
    fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match self {
            Step::Select { selector, nth } => scope.select(selector).nth(nth.unwrap_or(0)),
            Step::Labelled {
                item,
                label,
                needle,
                value,
            } => scope
                .select(item)
                .find(|candidate| {
                    candidate
                        .select(label)
                        .next()
                        .is_some_and(|l| text_of(l).contains(needle.as_str()))
                })
                .and_then(|found| found.select(value).next()),
        }
    }

    fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match self {
            Step::Select {
                selector,
                nth: None,
            } => scope.select(selector).collect(),
            other => other.first(scope).into_iter().collect(),
        }
    }
}

/// Splits a trailing `@n` index off a step. An `@` inside an attribute
/// value is part of the selector.
fn split_index(raw: &str) -> Option<(&str, &str)> {
    let (sel, n) = raw.rsplit_once('@')?;
    let n = n.trim();
    (!n.is_empty() && n.chars().all(|c| c.is_ascii_digit())).then_some((sel.trim(), n))
}

/// A path of steps resolving to elements within a scope.
#[derive(Debug, Clone)]
pub struct Locator {
    source: String,
    steps: Vec<Step>,
}

impl Locator {
    /// Parses a `>>`-separated path of selectors.
    pub fn parse(path: &str) -> Result<Self> {
        let mut steps = Vec::new();
        for raw in path.split(">>") {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(HarvestError::Selector(format!("empty step in '{}'", path)));
            }
            let (selector, nth) = match split_index(raw) {
                Some((sel, n)) => {
                    let n = n.parse::<usize>().map_err(|_| {
                        HarvestError::Selector(format!("bad index '@{}' in '{}'", n, path))
                    })?;
                    (sel, Some(n))
                }
                None => (raw, None),
            };
            steps.push(Step::Select {
                selector: css(selector)?,
                nth,
            });
        }
        Ok(Self {
            source: path.trim().to_string(),
            steps,
        })
    }

    /// Locator matching the scope element itself.
    pub fn here() -> Self {
        Self {
            source: ":scope".to_string(),
            steps: Vec::new(),
        }
    }

    /// Appends a labelled lookup step.
    ///
    /// Selects, among elements matching `item`, the first whose `label`
    /// element contains `needle`, and continues at its `value` element.
    pub fn labelled(mut self, item: &str, label: &str, needle: &str, value: &str) -> Result<Self> {
        self.steps.push(Step::Labelled {
            item: css(item)?,
            label: css(label)?,
            needle: needle.to_string(),
            value: css(value)?,
        });
        if self.steps.len() == 1 {
            self.source = format!("{}[{}]", item, needle);
        } else {
            self.source = format!("{} >> {}[{}]", self.source, item, needle);
        }
        Ok(self)
    }

    /// Starts a path with a labelled lookup.
    pub fn label(item: &str, label: &str, needle: &str, value: &str) -> Result<Self> {
        Self {
            source: String::new(),
            steps: Vec::new(),
        }
        .labelled(item, label, needle, value)
    }

    /// Resolves to the first matching element.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.steps
            .iter()
            .try_fold(scope, |current, step| step.first(current))
    }

    /// Resolves to every element matched by the last step.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let Some((last, leading)) = self.steps.split_last() else {
            return vec![scope];
        };
        leading
            .iter()
            .try_fold(scope, |current, step| step.first(current))
            .map(|parent| last.all(parent))
            .unwrap_or_default()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    const STATS: &str = r#"
        <div class="stats-rows">
            <div class="stats-row"><span>Kills</span><span>1200</span></div>
            <div class="stats-row"><span>Headshot %</span><span>48.1%</span></div>
        </div>
        <div class="stats-rows">
            <div class="stats-row"><span>Rounds played</span><span>900</span></div>
        </div>
        <div class="profile-team-stat"><b>Valve ranking</b><span class="right">#3</span></div>
        <div class="profile-team-stat"><b>Average player age</b><span class="right">24.6</span></div>
    "#;

    fn text(html: &Html, path: &str) -> Option<String> {
        Locator::parse(path)
            .unwrap()
            .first(html.root_element())
            .map(text_of)
    }

    #[test]
    fn test_first_and_nth() {
        let html = Html::parse_fragment(STATS);
        assert_eq!(text(&html, "div.stats-row >> span@1").as_deref(), Some("1200"));
        assert_eq!(
            text(&html, "div.stats-rows@1 >> div.stats-row@0 >> span@1").as_deref(),
            Some("900")
        );
        assert_eq!(text(&html, "div.stats-rows@2 >> span"), None);
    }

    #[test]
    fn test_all_matches_last_step() {
        let html = Html::parse_fragment(STATS);
        let loc = Locator::parse("div.stats-rows@0 >> div.stats-row").unwrap();
        assert_eq!(loc.all(html.root_element()).len(), 2);

        let missing = Locator::parse("div.nothing >> div.stats-row").unwrap();
        assert!(missing.all(html.root_element()).is_empty());
    }

    #[test]
    fn test_labelled_lookup() {
        let html = Html::parse_fragment(STATS);
        let loc = Locator::label("div.profile-team-stat", "b", "Average player age", "span.right")
            .unwrap();
        assert_eq!(loc.first(html.root_element()).map(text_of).as_deref(), Some("24.6"));

        let absent = Locator::label("div.profile-team-stat", "b", "Coach", "span.right").unwrap();
        assert!(absent.first(html.root_element()).is_none());
    }

    #[test]
    fn test_here_is_scope() {
        let html = Html::parse_fragment(STATS);
        let root = html.root_element();
        let found = Locator::here().first(root).map(|el| el.id());
        assert_eq!(found, Some(root.id()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Locator::parse("div >> "), Err(HarvestError::Selector(_))));
        assert!(matches!(Locator::parse("div@x"), Err(HarvestError::Selector(_))));
        assert!(matches!(Locator::parse("div[[["), Err(HarvestError::Selector(_))));
    }

    #[test]
    fn test_at_sign_inside_attribute_value() {
        let html = Html::parse_fragment(
            r#"<div class="contact"><a href="mailto:team@example.org">Mail</a><a href="/x">X</a></div>"#,
        );
        assert_eq!(
            text(&html, "div.contact >> a[href*='team@example']").as_deref(),
            Some("Mail")
        );
        assert_eq!(text(&html, "div.contact >> a[href^='mailto:']@0").as_deref(), Some("Mail"));
        assert_eq!(text(&html, "div.contact >> a@1").as_deref(), Some("X"));
    }

    #[test]
    fn test_display_keeps_source() {
        let loc = Locator::parse("div.a >> span@1").unwrap();
        assert_eq!(loc.to_string(), "div.a >> span@1");
    }
}

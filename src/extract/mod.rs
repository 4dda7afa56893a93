//! Declarative field extraction.
//!
//! A [`Schema`] is an ordered list of [`FieldSpec`]s. Extracting a schema from
//! a parsed [`Fragment`] yields one [`Record`]. A field whose node is missing
//! resolves to [`Value::Absent`] without affecting its siblings; only a
//! container the schema declares as required fails the whole extraction.

mod locator;
mod normalize;

use std::fmt;
use std::sync::Arc;

use scraper::{ElementRef, Html};
use tracing::trace;

pub use locator::{css, text_of, Locator};
pub use normalize::{apply_chain, duration_seconds, normalize_date, Normalize};

use crate::{HarvestError, Record, Result, Value};

/// A parsed document fragment (the markup of one container).
pub struct Fragment {
    html: Html,
}

impl Fragment {
    /// Parses container markup.
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_fragment(markup),
        }
    }

    /// The fragment's root element.
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }
}

/// What to read from a located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Concatenated text content.
    Text,
    /// Value of an attribute; absent when the attribute is missing.
    Attr(String),
    /// `"true"` when the element exists, absent otherwise.
    Exists,
}

impl Accessor {
    fn read(&self, el: ElementRef<'_>) -> Option<String> {
        match self {
            Accessor::Text => Some(text_of(el)),
            Accessor::Attr(name) => el.value().attr(name).map(str::to_string),
            Accessor::Exists => Some("true".to_string()),
        }
    }
}

/// A scalar field: locator, accessor and normalisation chain.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    locator: Locator,
    accessor: Accessor,
    chain: Vec<Normalize>,
    fallback: Option<String>,
    hidden: bool,
}

impl Field {
    /// Text content of the node at `path`.
    pub fn text(name: &str, path: &str) -> Result<Self> {
        Ok(Self::new(name, Locator::parse(path)?, Accessor::Text))
    }

    /// Attribute of the node at `path`.
    pub fn attr(name: &str, path: &str, attr: &str) -> Result<Self> {
        Ok(Self::new(
            name,
            Locator::parse(path)?,
            Accessor::Attr(attr.to_string()),
        ))
    }

    /// `"true"` when a node matches `path`.
    pub fn flag(name: &str, path: &str) -> Result<Self> {
        Ok(Self::new(name, Locator::parse(path)?, Accessor::Exists))
    }

    /// Field over an already-built locator.
    pub fn new(name: &str, locator: Locator, accessor: Accessor) -> Self {
        Self {
            name: name.to_string(),
            locator,
            accessor,
            chain: Vec::new(),
            fallback: None,
            hidden: false,
        }
    }

    /// Appends a normalisation step.
    pub fn then(mut self, step: Normalize) -> Self {
        self.chain.push(step);
        self
    }

    /// Value used when the field resolves absent.
    pub fn or(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    /// Resolved and visible to derived fields, but not emitted.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn resolve(&self, scope: ElementRef<'_>) -> Value {
        let value = self
            .locator
            .first(scope)
            .and_then(|el| self.accessor.read(el))
            .and_then(|raw| apply_chain(&self.chain, raw));

        match (value, &self.fallback) {
            (Some(v), _) => Value::Text(v),
            (None, Some(fallback)) => Value::Text(fallback.clone()),
            (None, None) => {
                trace!(
                    field = %self.name,
                    "{}",
                    HarvestError::FieldMissing(self.locator.to_string())
                );
                Value::Absent
            }
        }
    }
}

/// Function computing a field from resolved siblings.
pub type DeriveFn = Arc<dyn Fn(&Scope<'_>) -> Value + Send + Sync>;

/// One field of a schema.
#[derive(Clone)]
pub enum FieldSpec {
    /// Scalar value read from one node.
    Scalar(Field),
    /// Value computed from fields declared earlier.
    Derived {
        name: String,
        hidden: bool,
        derive: DeriveFn,
    },
    /// One nested record per matched node.
    Repeated {
        name: String,
        locator: Locator,
        /// Nodes without a match for this locator are skipped.
        filter: Option<Locator>,
        schema: Schema,
    },
    /// Every matched node's value, deduplicated, as a string list.
    Collected {
        name: String,
        locator: Locator,
        accessor: Accessor,
        chain: Vec<Normalize>,
    },
    /// One sub-schema over the same fragment, as a nested record.
    Nested { name: String, schema: Schema },
    /// Named sub-schemas over the same fragment, as a nested record.
    Group {
        name: String,
        members: Vec<(String, Schema)>,
    },
}

impl FieldSpec {
    fn name(&self) -> &str {
        match self {
            FieldSpec::Scalar(f) => &f.name,
            FieldSpec::Derived { name, .. }
            | FieldSpec::Repeated { name, .. }
            | FieldSpec::Collected { name, .. }
            | FieldSpec::Nested { name, .. }
            | FieldSpec::Group { name, .. } => name,
        }
    }

    fn is_hidden(&self) -> bool {
        match self {
            FieldSpec::Scalar(f) => f.hidden,
            FieldSpec::Derived { hidden, .. } => *hidden,
            _ => false,
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Scalar(field) => f.debug_tuple("Scalar").field(field).finish(),
            FieldSpec::Derived { name, .. } => f.debug_struct("Derived").field("name", name).finish(),
            FieldSpec::Repeated { name, locator, .. } => f
                .debug_struct("Repeated")
                .field("name", name)
                .field("locator", &locator.to_string())
                .finish(),
            FieldSpec::Collected { name, locator, .. } => f
                .debug_struct("Collected")
                .field("name", name)
                .field("locator", &locator.to_string())
                .finish(),
            FieldSpec::Nested { name, schema } => f
                .debug_struct("Nested")
                .field("name", name)
                .field("columns", &schema.columns())
                .finish(),
            FieldSpec::Group { name, members } => f
                .debug_struct("Group")
                .field("name", name)
                .field("members", &members.iter().map(|(n, _)| n).collect::<Vec<_>>())
                .finish(),
        }
    }
}

impl From<Field> for FieldSpec {
    fn from(field: Field) -> Self {
        FieldSpec::Scalar(field)
    }
}

/// Resolved fields visible to a derived field.
///
/// Lookups fall through to the enclosing record, so a nested map entry can
/// refer to the match's team names.
pub struct Scope<'a> {
    emitted: &'a Record,
    hidden: &'a Record,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Looks a field up here, then in enclosing scopes.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.emitted
            .get(name)
            .or_else(|| self.hidden.get(name))
            .or_else(|| self.parent.and_then(|p| p.get(name)))
    }

    /// Text of a scalar field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Whether a flag field resolved.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name) == Some("true")
    }

    /// Scalar field as an owned value, absent when missing.
    pub fn value(&self, name: &str) -> Value {
        self.get(name).cloned().unwrap_or(Value::Absent)
    }
}

/// Ordered field declarations plus structural requirements.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    root: Option<(Locator, bool)>,
    required: Vec<Locator>,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates fields inside the node at `path` instead of the fragment
    /// root. A missing root yields absent fields.
    pub fn within(mut self, path: &str) -> Result<Self> {
        self.root = Some((Locator::parse(path)?, false));
        Ok(self)
    }

    /// Like [`Schema::within`], but a missing root fails extraction.
    pub fn within_required(mut self, path: &str) -> Result<Self> {
        self.root = Some((Locator::parse(path)?, true));
        Ok(self)
    }

    /// Declares a container every dependent field needs.
    pub fn require(mut self, path: &str) -> Result<Self> {
        self.required.push(Locator::parse(path)?);
        Ok(self)
    }

    /// Appends a scalar (or any prebuilt) field.
    pub fn field(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.fields.push(spec.into());
        self
    }

    /// Appends a derived field.
    pub fn derive<F>(mut self, name: &str, derive: F) -> Self
    where
        F: Fn(&Scope<'_>) -> Value + Send + Sync + 'static,
    {
        self.fields.push(FieldSpec::Derived {
            name: name.to_string(),
            hidden: false,
            derive: Arc::new(derive),
        });
        self
    }

    /// Appends a repeated field.
    pub fn repeated(
        mut self,
        name: &str,
        path: &str,
        filter: Option<&str>,
        schema: Schema,
    ) -> Result<Self> {
        self.fields.push(FieldSpec::Repeated {
            name: name.to_string(),
            locator: Locator::parse(path)?,
            filter: filter.map(Locator::parse).transpose()?,
            schema,
        });
        Ok(self)
    }

    /// Appends a collected string list.
    pub fn collect(
        mut self,
        name: &str,
        path: &str,
        accessor: Accessor,
        chain: Vec<Normalize>,
    ) -> Result<Self> {
        self.fields.push(FieldSpec::Collected {
            name: name.to_string(),
            locator: Locator::parse(path)?,
            accessor,
            chain,
        });
        Ok(self)
    }

    /// Appends a nested record built from `schema`.
    pub fn nested(mut self, name: &str, schema: Schema) -> Self {
        self.fields.push(FieldSpec::Nested {
            name: name.to_string(),
            schema,
        });
        self
    }

    /// Appends a nested group of named sub-schemas.
    pub fn group<N: Into<String>>(mut self, name: &str, members: Vec<(N, Schema)>) -> Self {
        self.fields.push(FieldSpec::Group {
            name: name.to_string(),
            members: members.into_iter().map(|(n, s)| (n.into(), s)).collect(),
        });
        self
    }

    /// Names of emitted fields in declaration order.
    pub fn columns(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.is_hidden())
            .map(|f| f.name().to_string())
            .collect()
    }

    /// Extracts a record from a fragment.
    pub fn extract(&self, fragment: &Fragment) -> Result<Record> {
        self.extract_in(fragment.root(), None)
    }

    fn extract_in(&self, scope: ElementRef<'_>, parent: Option<&Scope<'_>>) -> Result<Record> {
        let root = match &self.root {
            None => scope,
            Some((locator, required)) => match locator.first(scope) {
                Some(el) => el,
                None if *required => {
                    return Err(HarvestError::StructureMissing(locator.to_string()))
                }
                None => return Ok(self.absent_record()),
            },
        };

        if let Some(missing) = self.required.iter().find(|loc| loc.first(root).is_none()) {
            return Err(HarvestError::StructureMissing(missing.to_string()));
        }

        let mut emitted = Record::new();
        let mut hidden = Record::new();

        for spec in &self.fields {
            let value = match spec {
                FieldSpec::Scalar(field) => field.resolve(root),
                FieldSpec::Derived { derive, .. } => derive(&Scope {
                    emitted: &emitted,
                    hidden: &hidden,
                    parent,
                }),
                FieldSpec::Repeated {
                    locator,
                    filter,
                    schema,
                    ..
                } => {
                    let here = Scope {
                        emitted: &emitted,
                        hidden: &hidden,
                        parent,
                    };
                    let mut items = Vec::new();
                    for node in locator.all(root) {
                        if let Some(filter) = filter {
                            if filter.first(node).is_none() {
                                continue;
                            }
                        }
                        items.push(schema.extract_in(node, Some(&here))?);
                    }
                    Value::List(items)
                }
                FieldSpec::Collected {
                    locator,
                    accessor,
                    chain,
                    ..
                } => {
                    let mut values: Vec<String> = Vec::new();
                    for node in locator.all(root) {
                        let value = accessor
                            .read(node)
                            .and_then(|raw| apply_chain(chain, raw));
                        if let Some(v) = value {
                            if !values.contains(&v) {
                                values.push(v);
                            }
                        }
                    }
                    Value::Texts(values)
                }
                FieldSpec::Nested { schema, .. } => {
                    let here = Scope {
                        emitted: &emitted,
                        hidden: &hidden,
                        parent,
                    };
                    Value::Record(schema.extract_in(root, Some(&here))?)
                }
                FieldSpec::Group { members, .. } => {
                    let here = Scope {
                        emitted: &emitted,
                        hidden: &hidden,
                        parent,
                    };
                    let mut nested = Record::new();
                    for (member, schema) in members {
                        nested.insert(member.clone(), schema.extract_in(root, Some(&here))?);
                    }
                    Value::Record(nested)
                }
            };

            if spec.is_hidden() {
                hidden.insert(spec.name(), value);
            } else {
                emitted.insert(spec.name(), value);
            }
        }

        Ok(emitted)
    }

    fn absent_record(&self) -> Record {
        let mut record = Record::new();
        for spec in self.fields.iter().filter(|f| !f.is_hidden()) {
            let value = match spec {
                FieldSpec::Scalar(Field {
                    fallback: Some(fallback),
                    ..
                }) => Value::Text(fallback.clone()),
                FieldSpec::Repeated { .. } => Value::List(Vec::new()),
                FieldSpec::Nested { schema, .. } => Value::Record(schema.absent_record()),
                FieldSpec::Collected { .. } => Value::Texts(Vec::new()),
                FieldSpec::Group { members, .. } => {
                    let mut nested = Record::new();
                    for (member, schema) in members {
                        nested.insert(member.clone(), schema.absent_record());
                    }
                    Value::Record(nested)
                }
                _ => Value::Absent,
            };
            record.insert(spec.name(), value);
        }
        record
    }
}

/// Extracts one record from a fragment using `schema`.
pub fn extract(fragment: &Fragment, schema: &Schema) -> Result<Record> {
    schema.extract(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH: &str = r#"
        <div class="teamsBox">
            <div class="team1-gradient"><div class="teamName">Natus Vincere</div><div class="won">2</div></div>
            <div class="team2-gradient"><div class="teamName">FaZe</div><div class="lost">1</div></div>
        </div>
        <div class="maps">
            <div class="mapholder">
                <div class="played"></div>
                <div class="mapname">Mirage</div>
                <span class="results-left won pick"><div class="results-team-score">13</div></span>
                <span class="results-right lost"><div class="results-team-score">8</div></span>
            </div>
            <div class="mapholder">
                <div class="mapname">Nuke</div>
            </div>
        </div>
    "#;

    fn side(n: u8) -> Schema {
        Schema::new()
            .field(
                Field::text("team", &format!("div.team{}-gradient >> div.teamName", n))
                    .unwrap()
                    .then(Normalize::Trim)
                    .then(Normalize::RemoveSpaces),
            )
    }

    #[test]
    fn test_scalar_fields() {
        let schema = Schema::new()
            .field(Field::text("team_1", "div.team1-gradient div.teamName").unwrap())
            .field(Field::text("score_team_1", "div.team1-gradient div.won").unwrap());
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        assert_eq!(record.text("team_1"), Some("Natus Vincere"));
        assert_eq!(record.text("score_team_1"), Some("2"));
    }

    #[test]
    fn test_missing_field_is_absent_not_error() {
        let schema = Schema::new()
            .field(Field::text("name", "div.team1-gradient div.teamName").unwrap())
            .field(Field::text("event", "a.event").unwrap())
            .field(Field::text("mode", "div.format").unwrap().or("N/A"));
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        assert_eq!(record.get("event"), Some(&Value::Absent));
        assert_eq!(record.text("mode"), Some("N/A"));
        assert_eq!(record.text("name"), Some("Natus Vincere"));
    }

    #[test]
    fn test_required_container_missing_fails_item() {
        let schema = Schema::new()
            .require("div.timeAndEvent")
            .unwrap()
            .field(Field::text("date", "div.timeAndEvent div.date").unwrap());
        let err = extract(&Fragment::parse(MATCH), &schema).unwrap_err();
        assert!(matches!(err, HarvestError::StructureMissing(ref s) if s == "div.timeAndEvent"));
    }

    #[test]
    fn test_derived_reads_hidden_siblings() {
        let schema = Schema::new()
            .field(Field::text("team_1", "div.team1-gradient div.teamName").unwrap())
            .field(Field::text("team_2", "div.team2-gradient div.teamName").unwrap())
            .field(Field::flag("team_1_won", "div.team1-gradient div.won").unwrap().hidden())
            .field(Field::flag("team_2_won", "div.team2-gradient div.won").unwrap().hidden())
            .derive("winner", |s| {
                if s.flag("team_1_won") {
                    s.value("team_1")
                } else if s.flag("team_2_won") {
                    s.value("team_2")
                } else {
                    Value::Absent
                }
            });
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        assert_eq!(record.text("winner"), Some("Natus Vincere"));
        assert!(record.get("team_1_won").is_none());
        assert_eq!(schema.columns(), vec!["team_1", "team_2", "winner"]);
    }

    #[test]
    fn test_repeated_skips_filtered_and_sees_parent() {
        let map = Schema::new()
            .field(Field::text("map", "div.mapname").unwrap())
            .field(Field::flag("left_pick", "span.results-left.pick").unwrap().hidden())
            .derive("picked_by", |s| {
                if s.flag("left_pick") {
                    s.value("team_1")
                } else {
                    Value::from("N/A")
                }
            });
        let schema = Schema::new()
            .field(Field::text("team_1", "div.team1-gradient div.teamName").unwrap())
            .repeated("maps", "div.maps >> div.mapholder", Some("div.played"), map)
            .unwrap();

        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        let maps = record.get("maps").and_then(Value::as_list).unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].text("map"), Some("Mirage"));
        assert_eq!(maps[0].text("picked_by"), Some("Natus Vincere"));
    }

    #[test]
    fn test_group_builds_nested_record() {
        let schema = Schema::new().group("sides", vec![("left", side(1)), ("right", side(2))]);
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        let sides = record.get("sides").and_then(Value::as_record).unwrap();
        assert_eq!(
            sides.get("left").and_then(Value::as_record).unwrap().text("team"),
            Some("NatusVincere")
        );
        assert_eq!(
            sides.get("right").and_then(Value::as_record).unwrap().text("team"),
            Some("FaZe")
        );
    }

    #[test]
    fn test_nested_record() {
        let score = Schema::new()
            .field(Field::text("left", "div.team1-gradient div.won").unwrap())
            .field(Field::text("right", "div.team2-gradient div.lost").unwrap());
        let schema = Schema::new().nested("score", score);
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        let nested = record.get("score").and_then(Value::as_record).unwrap();
        assert_eq!(nested.text("left"), Some("2"));
        assert_eq!(nested.text("right"), Some("1"));
        assert_eq!(schema.columns(), vec!["score"]);
    }

    #[test]
    fn test_rooted_member_missing_root_is_absent() {
        let member = Schema::new()
            .within("div.role-sniping")
            .unwrap()
            .field(Field::text("overall", "div.row-stats-section-score").unwrap());
        let schema = Schema::new().group("ct", vec![("sniping", member)]);
        let record = extract(&Fragment::parse(MATCH), &schema).unwrap();
        let sniping = record
            .get("ct")
            .and_then(Value::as_record)
            .and_then(|r| r.get("sniping"))
            .and_then(Value::as_record)
            .unwrap();
        assert_eq!(sniping.get("overall"), Some(&Value::Absent));
    }

    #[test]
    fn test_rooted_required_missing_root_fails() {
        let schema = Schema::new()
            .within_required("div.role-stats-container")
            .unwrap()
            .field(Field::text("x", "div").unwrap());
        assert!(matches!(
            extract(&Fragment::parse(MATCH), &schema),
            Err(HarvestError::StructureMissing(_))
        ));
    }

    #[test]
    fn test_collected_dedupes_in_order() {
        let html = r#"
            <a href="/player/1/a">a</a><a href="/player/2/b">b</a><a href="/player/1/a">a</a>
            <a href="/coach/9/c">c</a>
        "#;
        let base = url::Url::parse("https://www.hltv.org").unwrap();
        let schema = Schema::new()
            .collect(
                "player_urls",
                "a[href*='/player/']",
                Accessor::Attr("href".into()),
                vec![Normalize::AbsoluteUrl(base)],
            )
            .unwrap();
        let record = extract(&Fragment::parse(html), &schema).unwrap();
        assert_eq!(
            record.get("player_urls"),
            Some(&Value::Texts(vec![
                "https://www.hltv.org/player/1/a".into(),
                "https://www.hltv.org/player/2/b".into(),
            ]))
        );
    }

    #[test]
    fn test_attr_accessor_missing_attribute() {
        let schema = Schema::new()
            .field(Field::attr("country", "img.flag", "title").unwrap())
            .field(Field::attr("missing", "div.teamsBox", "title").unwrap());
        let html = r#"<img class="flag" title="Ukraine"><div class="teamsBox"></div>"#;
        let record = extract(&Fragment::parse(html), &schema).unwrap();
        assert_eq!(record.text("country"), Some("Ukraine"));
        assert_eq!(record.get("missing"), Some(&Value::Absent));
    }
}

//! Core domain types for libcat.

use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default backend location when neither the config file nor the CLI names one.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

/// Length of a loan, counted in calendar months from the borrow date.
pub const LOAN_PERIOD_MONTHS: u32 = 3;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Identifier of a backend record.
///
/// Books, authors, publishers and genres carry integer ids while borrowers
/// carry UUID strings, so both JSON shapes are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(value) => EntityId(value.to_string()),
            RawId::Text(value) => EntityId(value),
        })
    }
}

/// The collections exposed by the backend under `/api/{kind}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Books,
    Author,
    Publisher,
    Genre,
    Borrower,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Books => "books",
            EntityKind::Author => "author",
            EntityKind::Publisher => "publisher",
            EntityKind::Genre => "genre",
            EntityKind::Borrower => "borrower",
        }
    }

    pub fn endpoint(&self) -> String {
        format!("api/{}", self.as_str())
    }

    /// Label the description service expects in its `type` parameter.
    pub fn description_label(&self) -> &'static str {
        match self {
            EntityKind::Books => "Books",
            EntityKind::Author => "Author",
            EntityKind::Publisher => "Publisher",
            EntityKind::Genre => "Genre",
            EntityKind::Borrower => "Borrower",
        }
    }

    /// Field holding the human-readable name of a record of this kind.
    pub fn name_field(&self) -> &'static str {
        match self {
            EntityKind::Books => "title",
            _ => "name",
        }
    }

    /// Kind referenced by a foreign-key-like book field, if any.
    pub fn from_reference_field(field: &str) -> Option<Self> {
        match field {
            "author" => Some(EntityKind::Author),
            "publisher" => Some(EntityKind::Publisher),
            "genre" => Some(EntityKind::Genre),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "book" | "books" => Ok(EntityKind::Books),
            "author" => Ok(EntityKind::Author),
            "publisher" => Ok(EntityKind::Publisher),
            "genre" => Ok(EntityKind::Genre),
            "borrower" => Ok(EntityKind::Borrower),
            _ => Err("unknown entity kind"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    Borrowed,
    Present,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Borrowed => "Borrowed",
            BookStatus::Present => "Present",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A book as returned by `/api/books`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default)]
    pub author: Option<EntityId>,
    #[serde(default)]
    pub publisher: Option<EntityId>,
    #[serde(default)]
    pub genre: Option<EntityId>,
    #[serde(default)]
    pub borrower: Option<String>,
    #[serde(default)]
    pub borrowdate: Option<String>,
    #[serde(default)]
    pub returndate: Option<String>,
}

impl Book {
    pub fn is_borrowed(&self) -> bool {
        self.borrower
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    pub fn status(&self) -> BookStatus {
        if self.is_borrowed() {
            BookStatus::Borrowed
        } else {
            BookStatus::Present
        }
    }

    pub fn loan(&self) -> Option<Loan> {
        if !self.is_borrowed() {
            return None;
        }
        Some(Loan {
            borrower: self.borrower.clone().unwrap_or_default(),
            borrow_date: self.borrowdate.clone().unwrap_or_default(),
            return_date: self.returndate.clone().unwrap_or_default(),
        })
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Borrower and dates of a book currently on loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub borrower: String,
    pub borrow_date: String,
    pub return_date: String,
}

/// An author, publisher, genre or borrower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: EntityId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

/// id → display name, rebuilt on every catalog load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupMap {
    names: HashMap<EntityId, String>,
}

impl LookupMap {
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn from_entities(entities: &[NamedEntity]) -> Self {
        let names = entities
            .iter()
            .map(|entity| (entity.id.clone(), entity.name.clone()))
            .collect();
        Self { names }
    }

    pub fn get(&self, id: &EntityId) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn name_or_unknown(&self, id: Option<&EntityId>) -> String {
        id.and_then(|id| self.get(id))
            .filter(|name| !name.is_empty())
            .unwrap_or(Self::UNKNOWN)
            .to_string()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Parameters of a viewer location such as `viewer.html?type=author&id=3`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Splits on `&`, then on the first `=` of each pair. Keys and values are
    /// percent-decoded; `+` stays a plus sign. Pairs with an empty key are
    /// dropped and later duplicates win.
    pub fn parse(input: &str) -> Self {
        let query = match input.split_once('?') {
            Some((_, query)) => query,
            None => input,
        };

        let mut params = QueryParams::default();
        for pair in query.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => (pair, ""),
            };
            if key.is_empty() {
                continue;
            }
            params.insert(decode_component(key), decode_component(value));
        }
        params
    }

    pub fn insert(&mut self, key: String, value: String) {
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`QueryParams::get`] but treats an empty value as absent.
    pub fn require(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Viewer location for a record, in the form the catalog links use.
pub fn viewer_link(kind: EntityKind, id: &EntityId) -> String {
    format!(
        "viewer.html?type={}&id={}",
        kind.as_str(),
        urlencoding::encode(id.as_str())
    )
}

/// Uppercases the first letter and replaces the first underscore with a space.
pub fn format_property_key(key: &str) -> String {
    let mut chars = key.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str().replacen('_', " ", 1);
    format!("{}{rest}", first.to_uppercase())
}

pub fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Borrow date plus [`LOAN_PERIOD_MONTHS`]. Days past the end of the target
/// month clamp to its last day.
pub fn loan_return_date(borrow_date: NaiveDate) -> NaiveDate {
    borrow_date
        .checked_add_months(Months::new(LOAN_PERIOD_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub theme: Theme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            _ => Err("unknown theme"),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            theme: Theme::Dark,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        let url = self.api_url.trim().trim_end_matches('/');
        self.api_url = if url.is_empty() {
            DEFAULT_API_URL.to_string()
        } else {
            url.to_string()
        };
    }

    pub fn cycle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(borrower: Option<&str>) -> Book {
        Book {
            id: EntityId::from(1),
            title: "Dune".to_string(),
            author: None,
            publisher: None,
            genre: None,
            borrower: borrower.map(str::to_string),
            borrowdate: None,
            returndate: None,
        }
    }

    #[test]
    fn status_follows_borrower() {
        assert_eq!(book(Some("Ada")).status(), BookStatus::Borrowed);
        assert_eq!(book(Some("")).status(), BookStatus::Present);
        assert_eq!(book(None).status(), BookStatus::Present);
    }

    #[test]
    fn entity_id_accepts_numbers_and_strings() {
        let ids: Vec<EntityId> = serde_json::from_str(r#"[7, "f3a1"]"#).unwrap();
        assert_eq!(ids, vec![EntityId::from("7"), EntityId::from("f3a1")]);
    }

    #[test]
    fn book_tolerates_nulls() {
        let json = r#"{"id": 4, "title": null, "author": null, "borrower": null, "present": true}"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.id, EntityId::from(4));
        assert_eq!(book.title, "");
        assert_eq!(book.author, None);
        assert!(!book.is_borrowed());
    }

    #[test]
    fn lookup_falls_back_to_unknown() {
        let map = LookupMap::from_entities(&[NamedEntity {
            id: EntityId::from(1),
            name: "Frank Herbert".to_string(),
        }]);
        assert_eq!(map.name_or_unknown(Some(&EntityId::from(1))), "Frank Herbert");
        assert_eq!(map.name_or_unknown(Some(&EntityId::from(2))), "Unknown");
        assert_eq!(map.name_or_unknown(None), "Unknown");
    }

    #[test]
    fn entity_kind_parses_strings() {
        assert_eq!("book".parse::<EntityKind>().unwrap(), EntityKind::Books);
        assert_eq!("Books".parse::<EntityKind>().unwrap(), EntityKind::Books);
        assert_eq!(" GENRE ".parse::<EntityKind>().unwrap(), EntityKind::Genre);
        assert!("shelf".parse::<EntityKind>().is_err());
    }

    #[test]
    fn query_params_split_on_first_equals() {
        let params = QueryParams::parse("?type=author&id=3&expr=a=b&=orphan&flag");
        assert_eq!(params.get("type"), Some("author"));
        assert_eq!(params.get("id"), Some("3"));
        assert_eq!(params.get("expr"), Some("a=b"));
        assert_eq!(params.get("flag"), Some(""));
        assert_eq!(params.require("flag"), None);
        assert_eq!(params.get(""), None);
    }

    #[test]
    fn query_params_decode_components() {
        let params = QueryParams::parse("viewer.html?type=books&name=Brave%20New%20World&op=a+b");
        assert_eq!(params.get("name"), Some("Brave New World"));
        assert_eq!(params.get("op"), Some("a+b"));
    }

    #[test]
    fn viewer_link_roundtrips_through_params() {
        let link = viewer_link(EntityKind::Borrower, &EntityId::from("a b"));
        let params = QueryParams::parse(&link);
        assert_eq!(params.get("type"), Some("borrower"));
        assert_eq!(params.get("id"), Some("a b"));
    }

    #[test]
    fn property_keys_replace_first_underscore_only() {
        assert_eq!(format_property_key("title"), "Title");
        assert_eq!(format_property_key("author_name"), "Author name");
        assert_eq!(format_property_key("a_b_c"), "A b_c");
        assert_eq!(format_property_key(""), "");
    }

    #[test]
    fn return_date_is_three_months_later() {
        let borrow = parse_date("2024-01-15").unwrap();
        assert_eq!(format_date(loan_return_date(borrow)), "2024-04-15");

        let borrow = parse_date("2024-11-30").unwrap();
        assert_eq!(format_date(loan_return_date(borrow)), "2025-02-28");

        let borrow = parse_date("2023-10-05").unwrap();
        assert_eq!(format_date(loan_return_date(borrow)), "2024-01-05");
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert!(parse_date("2024-13-01").is_none());
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date(" 2024-02-29 ").is_some());
    }

    #[test]
    fn settings_normalizes_url() {
        let mut settings = Settings {
            api_url: " http://library.local:8080/ ".to_string(),
            theme: Theme::Dark,
        };
        settings.normalize();
        assert_eq!(settings.api_url, "http://library.local:8080");

        settings.api_url = "  ".to_string();
        settings.normalize();
        assert_eq!(settings.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn cycle_theme_rotates() {
        let mut settings = Settings::default();
        assert_eq!(settings.theme, Theme::Dark);
        settings.cycle_theme();
        assert_eq!(settings.theme, Theme::Light);
        settings.cycle_theme();
        assert_eq!(settings.theme, Theme::Dark);
    }

    #[test]
    fn theme_parses_strings() {
        assert_eq!("Light".parse::<Theme>().unwrap(), Theme::Light);
        assert!("sepia".parse::<Theme>().is_err());
    }
}

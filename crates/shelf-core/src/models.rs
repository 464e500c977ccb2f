//! Records stored in the per-user document namespace.
//!
//! Collection names, field names and enum strings below are the on-disk
//! contract shared with every existing client of the database. They are
//! serialized in camelCase with the stored (Spanish) enum values, so data
//! written by other clients round-trips unchanged.
//!
//! | Collection        | Record              |
//! |-------------------|---------------------|
//! | `userBooks`       | [`Book`]            |
//! | `readingSessions` | [`ReadingSession`]  |
//! | `goals`           | [`Goal`]            |

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw document as returned by a [`Store`](crate::store::Store).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// A typed record living in one collection of the user namespace.
///
/// The document id is not part of the stored body: [`to_fields`](Record::to_fields)
/// strips it and [`from_document`](Record::from_document) restores it.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection the record lives in.
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Serialize into the stored field map (without `id`).
    fn to_fields(&self) -> Result<Map<String, Value>> {
        let mut fields = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => anyhow::bail!("record serialized to a non-object: {}", other),
        };
        fields.remove("id");
        Ok(fields)
    }

    fn from_document(doc: Document) -> Result<Self> {
        let mut record: Self = serde_json::from_value(doc.data)?;
        record.set_id(doc.id);
        Ok(record)
    }
}

/// Format a timestamp the way it is stored: RFC 3339, UTC, millisecond
/// precision. Fixed width, so stored values sort lexicographically.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for required timestamps.
pub mod ts {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional timestamps. Use with
/// `#[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]`.
pub mod ts_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format_timestamp(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

// ============ Book ============

/// Reading status of a book. Serialized with the stored strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookStatus {
    #[serde(rename = "Por Leer")]
    ToRead,
    #[serde(rename = "Leyendo")]
    Reading,
    #[serde(rename = "Leído")]
    Read,
}

impl BookStatus {
    /// Library tabs, in display order.
    pub const TABS: [BookStatus; 3] = [BookStatus::Reading, BookStatus::ToRead, BookStatus::Read];

    /// The stored string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::ToRead => "Por Leer",
            BookStatus::Reading => "Leyendo",
            BookStatus::Read => "Leído",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookStatus::ToRead => "To-Read",
            BookStatus::Reading => "Reading",
            BookStatus::Read => "Read",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BookStatus {
    type Err = anyhow::Error;

    /// Accepts the stored values as well as English aliases.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Por Leer" => return Ok(BookStatus::ToRead),
            "Leyendo" => return Ok(BookStatus::Reading),
            "Leído" => return Ok(BookStatus::Read),
            _ => {}
        }
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "to-read" | "toread" | "unread" => Ok(BookStatus::ToRead),
            "reading" => Ok(BookStatus::Reading),
            "read" | "finished" => Ok(BookStatus::Read),
            other => anyhow::bail!(
                "invalid book status: '{}'. Must be to-read, reading, or read.",
                other
            ),
        }
    }
}

fn default_status() -> BookStatus {
    BookStatus::ToRead
}

/// A book in the user's library (`userBooks`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_status")]
    pub status: BookStatus,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub current_page: u32,
    /// Set once, on the transition into [`BookStatus::Read`].
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub review: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Book {
    /// Page count used as the denominator everywhere; never zero.
    pub fn effective_total(&self) -> u32 {
        self.total_pages.max(1)
    }

    /// Rounded reading percentage for display.
    pub fn percent_read(&self) -> u32 {
        let pct = (self.current_page as f64 / self.effective_total() as f64) * 100.0;
        pct.clamp(0.0, 100.0).round() as u32
    }
}

impl Record for Book {
    const COLLECTION: &'static str = "userBooks";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

// ============ ReadingSession ============

/// Device class a session was recorded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mobile,
    #[default]
    Desktop,
}

impl Device {
    /// Classify a User-Agent header: anything mentioning `Mobi` or `Android`
    /// (case-insensitive) is mobile.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();
        if ua.contains("mobi") || ua.contains("android") {
            Device::Mobile
        } else {
            Device::Desktop
        }
    }
}

/// Title snapshot used when the timed book cannot be found.
pub const UNKNOWN_BOOK_TITLE: &str = "Desconocido";

/// A timed reading session (`readingSessions`). Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device: Device,
}

impl Record for ReadingSession {
    const COLLECTION: &'static str = "readingSessions";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

// ============ Goal ============

/// What a goal measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalUnit {
    #[serde(rename = "Libros")]
    Books,
    #[serde(rename = "Páginas")]
    Pages,
    #[serde(rename = "Horas")]
    Hours,
    #[serde(rename = "Capítulos")]
    Chapters,
}

impl GoalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalUnit::Books => "Libros",
            GoalUnit::Pages => "Páginas",
            GoalUnit::Hours => "Horas",
            GoalUnit::Chapters => "Capítulos",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GoalUnit::Books => "books",
            GoalUnit::Pages => "pages",
            GoalUnit::Hours => "hours",
            GoalUnit::Chapters => "chapters",
        }
    }

    /// Automated units derive progress from book and session records.
    pub fn is_automated(&self) -> bool {
        !matches!(self, GoalUnit::Chapters)
    }
}

impl fmt::Display for GoalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GoalUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Libros" => return Ok(GoalUnit::Books),
            "Páginas" => return Ok(GoalUnit::Pages),
            "Horas" => return Ok(GoalUnit::Hours),
            "Capítulos" => return Ok(GoalUnit::Chapters),
            _ => {}
        }
        match s.trim().to_lowercase().as_str() {
            "books" | "book" => Ok(GoalUnit::Books),
            "pages" | "page" => Ok(GoalUnit::Pages),
            "hours" | "hour" => Ok(GoalUnit::Hours),
            "chapters" | "chapter" => Ok(GoalUnit::Chapters),
            other => anyhow::bail!(
                "invalid goal unit: '{}'. Must be books, pages, hours, or chapters.",
                other
            ),
        }
    }
}

/// A reading goal with a deadline (`goals`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub unit: GoalUnit,
    /// Manual progress counter; only meaningful for [`GoalUnit::Chapters`].
    #[serde(default)]
    pub current: f64,
    /// Target quantity.
    #[serde(default)]
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "ts_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Goal {
    const COLLECTION: &'static str = "goals";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

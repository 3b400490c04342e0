//! Data model shared by the source stages and the pipeline: book id, chapter catalog,
//! normalized book metadata and per-chapter artifacts.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

const UNKNOWN_TITLE: &str = "unknown title";
const UNKNOWN_AUTHOR: &str = "unknown author";
const UNKNOWN_WORD_COUNT: &str = "unknown";
const NO_INTRODUCTION: &str = "no introduction";

/// Numeric book id. Built by [resolve_item_id](crate::source::resolve_item_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a string already known to be all digits.
    pub(crate) fn new_unchecked(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the chapter list endpoint. `id` and `chapter_sort` arrive as strings or numbers.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "chapter_sort", deserialize_with = "integer_or_numeric_string")]
    pub sort_key: i64,
}

fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn integer_or_numeric_string<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| serde::de::Error::custom(format!("sort key {} is not an integer", n))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("sort key '{}' is not an integer", s))),
        other => Err(serde::de::Error::custom(format!(
            "expected integer sort key, got {}",
            other
        ))),
    }
}

/// Chapter id to title, iterated in chapter order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    order: Vec<String>,
    titles: HashMap<String, String>,
}

impl Catalog {
    /// Stable-sort entries by sort key ascending. A repeated id keeps the position of its first
    /// occurrence and takes the title of its last.
    pub fn from_entries(mut entries: Vec<ChapterEntry>) -> Self {
        entries.sort_by_key(|e| e.sort_key);
        let mut catalog = Catalog::default();
        for entry in entries {
            if catalog
                .titles
                .insert(entry.id.clone(), entry.title)
                .is_none()
            {
                catalog.order.push(entry.id);
            }
        }
        catalog
    }

    pub fn title(&self, chapter_id: &str) -> Option<&str> {
        self.titles.get(chapter_id).map(String::as_str)
    }

    /// Catalog title, or `unknown chapter_<id>` when the id is not listed.
    pub fn resolve_title(&self, chapter_id: &str) -> String {
        self.title(chapter_id)
            .map(String::from)
            .unwrap_or_else(|| format!("unknown chapter_{}", chapter_id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// (id, title) pairs in chapter order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().map(move |id| {
            let title = self.titles.get(id).map(String::as_str).unwrap_or_default();
            (id.as_str(), title)
        })
    }
}

/// Book metadata used for the merged document header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub title: String,
    pub author: String,
    pub image_link: String,
    pub tags: Vec<String>,
    /// Display only; the API sends either a string or a number.
    pub word_count: String,
    pub id: String,
    pub introduction: String,
}

impl ItemMetadata {
    /// Normalize a raw book record (as returned by search). Never fails: every missing or
    /// malformed field falls back to its default, and the id falls back to `item_id`.
    pub fn from_record(record: &Value, item_id: &ItemId) -> Self {
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let display = |key: &str| match record.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let tags = text("ptags")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let introduction = text("intro")
            .map(|s| replace_line_breaks(&s))
            .unwrap_or_else(|| NO_INTRODUCTION.to_string());

        ItemMetadata {
            title: text("original_title").unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            author: text("author").unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            image_link: text("image_link").unwrap_or_default(),
            tags,
            word_count: display("words_num").unwrap_or_else(|| UNKNOWN_WORD_COUNT.to_string()),
            id: display("id").unwrap_or_else(|| item_id.to_string()),
            introduction,
        }
    }

    /// Defaults for a run without a book record.
    pub fn unknown(item_id: &ItemId) -> Self {
        Self::from_record(&Value::Null, item_id)
    }
}

fn replace_line_breaks(s: &str) -> String {
    s.replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("<br>", "\n")
}

/// One extracted, still encrypted chapter payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    /// File stem, used as the chapter id.
    pub id: String,
    /// Numeric value of the stem.
    pub sort_key: u64,
    pub file_name: String,
    pub path: PathBuf,
}

/// A chapter decrypted and written to its own text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedChapter {
    pub chapter_id: String,
    pub title: String,
    pub path: PathBuf,
}

impl DecryptedChapter {
    /// Numeric chapter id for ordering; non-numeric ids sort last.
    pub fn sort_key(&self) -> u64 {
        self.chapter_id.parse().unwrap_or(u64::MAX)
    }
}

//! Extraction inputs, per-URL results and the batch they accumulate into.

use std::path::PathBuf;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields requested from the structured fetch.
///
/// The JSON schema sent to the fetch service is derived from this type, so
/// adding a field here adds it to the request and to the row table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleFields {
    /// Article headline
    pub title: Option<String>,
    /// Main body text
    pub content: Option<String>,
    /// Publication date as printed on the page
    pub publish_date: Option<String>,
    /// Publishing outlet
    pub source: Option<String>,
    /// Section or category
    pub category: Option<String>,
    /// Byline
    pub author: Option<String>,
    /// Short summary
    pub summary: Option<String>,
}

impl ArticleFields {
    /// Column names, in schema order.
    pub const FIELD_NAMES: [&'static str; 7] = [
        "title",
        "content",
        "publish_date",
        "source",
        "category",
        "author",
        "summary",
    ];

    /// JSON schema for the structured fetch.
    pub fn schema() -> Value {
        serde_json::to_value(schemars::schema_for!(ArticleFields)).unwrap_or_default()
    }

    /// Read fields out of whatever the fetch service returned.
    ///
    /// Missing keys stay `None`; non-string values are kept in their JSON
    /// text form rather than rejected.
    pub fn from_json(value: &Value) -> Self {
        let field = |name: &str| match value.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        Self {
            title: field("title"),
            content: field("content"),
            publish_date: field("publish_date"),
            source: field("source"),
            category: field("category"),
            author: field("author"),
            summary: field("summary"),
        }
    }

    /// `(name, value)` pairs in schema order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 7] {
        [
            ("title", self.title.as_deref()),
            ("content", self.content.as_deref()),
            ("publish_date", self.publish_date.as_deref()),
            ("source", self.source.as_deref()),
            ("category", self.category.as_deref()),
            ("author", self.author.as_deref()),
            ("summary", self.summary.as_deref()),
        ]
    }
}

/// Outcome of extracting one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Both fetches succeeded
    Success,
    /// Structured fetch timed out; markdown only
    PartialSuccess,
    /// Nothing usable
    Failed { reason: String },
}

impl ExtractionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Where a URL came from and how it scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub note: String,
    pub validation_score: u8,
    pub validation_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    pub status: ExtractionStatus,

    #[serde(default)]
    pub markdown: String,

    #[serde(default)]
    pub structured_fields: ArticleFields,

    #[serde(default)]
    pub metadata: IndexMap<String, Value>,

    pub provenance: Provenance,
}

impl ExtractionResult {
    pub fn failed(url: impl Into<String>, provenance: Provenance, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: ExtractionStatus::Failed {
                reason: reason.into(),
            },
            markdown: String::new(),
            structured_fields: ArticleFields::default(),
            metadata: IndexMap::new(),
            provenance,
        }
    }
}

/// A validated link cleared for extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    pub url: String,
    pub source: String,
    pub note: String,
    pub score: u8,
    pub reason: String,
}

impl ExtractionCandidate {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            source: self.source.clone(),
            note: self.note.clone(),
            validation_score: self.score,
            validation_reason: self.reason.clone(),
        }
    }
}

/// Page content returned by the raw fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub markdown: String,
    pub metadata: IndexMap<String, Value>,
}

/// Files written for one extraction run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionArtifacts {
    pub full_results: PathBuf,
    pub extracted_data: PathBuf,
    pub table: PathBuf,
}

/// Result of one extraction run: url → result, in processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionBatch {
    pub results_dir: PathBuf,
    pub results: IndexMap<String, ExtractionResult>,
    pub artifacts: ExtractionArtifacts,
}

impl ExtractionBatch {
    pub fn count(&self, pred: impl Fn(&ExtractionStatus) -> bool) -> usize {
        self.results.values().filter(|r| pred(&r.status)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_lists_every_field() {
        let schema = ArticleFields::schema();
        let properties = schema["properties"].as_object().unwrap();
        for name in ArticleFields::FIELD_NAMES {
            assert!(properties.contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn test_from_json_is_tolerant() {
        let fields = ArticleFields::from_json(&json!({
            "title": "Harvest up 12%",
            "publish_date": 20240501,
            "author": null,
            "unexpected": "ignored"
        }));

        assert_eq!(fields.title.as_deref(), Some("Harvest up 12%"));
        assert_eq!(fields.publish_date.as_deref(), Some("20240501"));
        assert_eq!(fields.author, None);
        assert_eq!(fields.summary, None);
    }

    #[test]
    fn test_status_serialization() {
        let failed = ExtractionStatus::Failed {
            reason: "404".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"state": "failed", "reason": "404"})
        );
        assert_eq!(
            serde_json::to_value(ExtractionStatus::PartialSuccess).unwrap(),
            json!({"state": "partial_success"})
        );
    }
}

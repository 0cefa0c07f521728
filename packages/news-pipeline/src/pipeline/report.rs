//! Projections of extraction results for the output files.

use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::traits::Row;
use crate::types::extraction::{ExtractionResult, ExtractionStatus};

pub const PREVIEW_CHARS: usize = 500;

/// One row per URL: provenance, status, fields, metadata and a preview.
///
/// Provenance columns are `site_`-prefixed so the article's own `source`
/// field gets a column of its own.
pub fn table_rows(results: &IndexMap<String, ExtractionResult>) -> Vec<Row> {
    results.values().map(table_row).collect()
}

fn table_row(result: &ExtractionResult) -> Row {
    let mut row = Row::new();
    row.insert("URL".into(), json!(result.url));
    row.insert("site_source".into(), json!(result.provenance.source));
    row.insert("site_note".into(), json!(result.provenance.note));
    row.insert("validation_score".into(), json!(result.provenance.validation_score));
    row.insert("validation_reason".into(), json!(result.provenance.validation_reason));
    row.insert("status".into(), json!(result.status.label()));

    for (name, value) in result.structured_fields.entries() {
        row.insert(name.into(), json!(value.unwrap_or_default()));
    }

    if let ExtractionStatus::Failed { reason } = &result.status {
        row.insert("error".into(), json!(reason));
    }

    for (key, value) in &result.metadata {
        row.insert(format!("metadata_{}", key), value.clone());
    }

    row.insert("markdown_preview".into(), json!(preview(&result.markdown, PREVIEW_CHARS)));
    row
}

/// `url → {"data": fields}` for every result that is not a failure.
pub fn extracted_only(results: &IndexMap<String, ExtractionResult>) -> IndexMap<String, Value> {
    results
        .iter()
        .filter(|(_, r)| !r.status.is_failed())
        .map(|(url, r)| (url.clone(), json!({ "data": r.structured_fields })))
        .collect()
}

/// First `max` characters, with `...` appended when cut.
pub fn preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::extraction::{ArticleFields, Provenance};

    fn result(url: &str, status: ExtractionStatus) -> ExtractionResult {
        let mut metadata = IndexMap::new();
        metadata.insert("title".to_string(), json!("Page title"));
        metadata.insert("statusCode".to_string(), json!(200));

        ExtractionResult {
            url: url.into(),
            status,
            markdown: "# Soy exports rise".into(),
            structured_fields: ArticleFields {
                title: Some("Soy exports rise".into()),
                ..Default::default()
            },
            metadata,
            provenance: Provenance {
                source: "Farm News".into(),
                note: "daily".into(),
                validation_score: 88,
                validation_reason: "dated path".into(),
            },
        }
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("short", 500), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("soja é ótima", 6), "soja é...");
        assert_eq!(preview("exactly", 7), "exactly");
    }

    #[test]
    fn test_row_columns() {
        let mut results = IndexMap::new();
        results.insert(
            "https://a.example/1".to_string(),
            result("https://a.example/1", ExtractionStatus::Success),
        );
        let rows = table_rows(&results);
        let row = &rows[0];

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(&columns[..6], &["URL", "site_source", "site_note", "validation_score", "validation_reason", "status"]);
        assert_eq!(row["title"], "Soy exports rise");
        assert_eq!(row["author"], "");
        assert_eq!(row["metadata_statusCode"], 200);
        assert!(row.get("error").is_none());
        assert_eq!(columns.last(), Some(&"markdown_preview"));
    }

    #[test]
    fn test_site_source_survives_article_source() {
        let mut with_field = result("https://a.example/1", ExtractionStatus::Success);
        with_field.structured_fields.source = Some("Reuters".into());
        let partial = ExtractionResult {
            structured_fields: ArticleFields::default(),
            ..result("https://a.example/2", ExtractionStatus::PartialSuccess)
        };

        let mut results = IndexMap::new();
        results.insert(with_field.url.clone(), with_field);
        results.insert(partial.url.clone(), partial);
        let rows = table_rows(&results);

        assert_eq!(rows[0]["site_source"], "Farm News");
        assert_eq!(rows[0]["source"], "Reuters");
        assert_eq!(rows[1]["site_source"], "Farm News");
        assert_eq!(rows[1]["site_note"], "daily");
        assert_eq!(rows[1]["source"], "");
    }

    #[test]
    fn test_failed_rows_carry_error() {
        let mut results = IndexMap::new();
        results.insert(
            "https://a.example/1".to_string(),
            result(
                "https://a.example/1",
                ExtractionStatus::Failed {
                    reason: "404".into(),
                },
            ),
        );
        let rows = table_rows(&results);
        assert_eq!(rows[0]["status"], "failed");
        assert_eq!(rows[0]["error"], "404");
    }

    #[test]
    fn test_extracted_only_skips_failures() {
        let mut results = IndexMap::new();
        results.insert(
            "https://a.example/1".to_string(),
            result("https://a.example/1", ExtractionStatus::Success),
        );
        results.insert(
            "https://a.example/2".to_string(),
            result("https://a.example/2", ExtractionStatus::PartialSuccess),
        );
        results.insert(
            "https://a.example/3".to_string(),
            result(
                "https://a.example/3",
                ExtractionStatus::Failed {
                    reason: "boom".into(),
                },
            ),
        );

        let extracted = extracted_only(&results);
        assert_eq!(extracted.len(), 2);
        assert_eq!(extracted["https://a.example/1"]["data"]["title"], "Soy exports rise");
        assert!(!extracted.contains_key("https://a.example/3"));
    }
}

use serde::{Deserialize, Serialize};

/// A homepage the pipeline watches for new article links.
///
/// Deserializes from configuration rows shaped `{link, note, source}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredSite {
    #[serde(rename = "link", alias = "url")]
    pub url: String,

    #[serde(default)]
    pub note: String,

    #[serde(default)]
    pub source: String,
}

impl MonitoredSite {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            note: String::new(),
            source: String::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

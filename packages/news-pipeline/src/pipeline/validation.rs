//! Link validation: score every discovered link with the text scorer.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::validation_prompt;
use super::{run_key, Collaborators};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, Result};
use crate::stores::{StoredBatch, Stores};
use crate::traits::{Clock, Scorer};
use crate::types::batch::{
    BatchId, DiscoveryBatch, SiteValidation, ValidatedLink, ValidationBatch, ValidationRecord,
};

/// A persisted validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Store key the batch was written under
    pub key: String,
    pub batch: ValidationBatch,
}

pub struct LinkValidation {
    scorer: Arc<dyn Scorer>,
    clock: Arc<dyn Clock>,
    stores: Arc<Stores>,
    settings: PipelineSettings,
}

impl LinkValidation {
    pub fn new(collaborators: &Collaborators, stores: Arc<Stores>, settings: PipelineSettings) -> Self {
        Self {
            scorer: Arc::clone(&collaborators.scorer),
            clock: Arc::clone(&collaborators.clock),
            stores,
            settings,
        }
    }

    /// Discovery batch carrying `batch_id`, or the most recent one.
    pub fn resolve(&self, batch_id: Option<&BatchId>) -> Result<StoredBatch<DiscoveryBatch>> {
        let found = match batch_id {
            Some(id) => self.stores.discovery.scan_by_correlation_id(id)?,
            None => self.stores.discovery.latest()?,
        };

        found.ok_or_else(|| match batch_id {
            Some(id) => PipelineError::missing_batch(id.as_str()),
            None => PipelineError::missing_batch("latest discovery batch"),
        })
    }

    /// Score the links of one discovery batch and persist the verdicts.
    ///
    /// Unparseable responses become the default invalid record. A link whose
    /// scoring call fails outright is logged and left out.
    pub async fn validate(
        &self,
        batch_id: Option<&BatchId>,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome> {
        let StoredBatch {
            key: discovery_key,
            batch: discovery,
        } = self.resolve(batch_id)?;

        let batch_id = match batch_id.or_else(|| discovery.batch_id()) {
            Some(id) => id.clone(),
            None => {
                let minted = BatchId::mint(&self.clock.now());
                warn!(key = %discovery_key, batch_id = %minted, "Discovery batch has no batch id, minting one");
                minted
            }
        };

        info!(
            batch_id = %batch_id,
            discovery_key = %discovery_key,
            links = discovery.link_count(),
            "Validating links"
        );

        let mut results = IndexMap::new();
        for (homepage, entry) in &discovery.sites {
            debug!(site = %homepage, note = %entry.note, "Validating site links");

            let mut validated_links = Vec::with_capacity(entry.new_links.len());
            for url in &entry.new_links {
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled);
                }
                if let Some(validation) = self.score_link(url).await {
                    validated_links.push(ValidatedLink {
                        url: url.clone(),
                        validation,
                    });
                }
            }

            results.insert(
                homepage.clone(),
                SiteValidation {
                    note: entry.note.clone(),
                    source: entry.source.clone(),
                    validated_links,
                    original_timestamp: discovery_key.clone(),
                },
            );
        }

        let now = run_key(&self.clock.now());
        let batch = ValidationBatch {
            batch_id,
            timestamp: now.clone(),
            results,
        };

        let outcome = self.stores.validation.put(&now, batch.clone())?;
        if !outcome.was_written() {
            return Err(PipelineError::DuplicateKey {
                key: outcome.key().to_string(),
            });
        }

        info!(
            batch_id = %batch.batch_id,
            key = outcome.key(),
            scored = batch.record_count(),
            passing = batch.passing_count(self.settings.min_valid_score),
            "Validation batch saved"
        );

        Ok(ValidationOutcome {
            key: outcome.key().to_string(),
            batch,
        })
    }

    async fn score_link(&self, url: &str) -> Option<ValidationRecord> {
        // Link text is not captured by enumeration
        let prompt = validation_prompt(&self.settings.topic, url, "", &url_path(url));

        match self
            .settings
            .retry
            .call("score_link", || self.scorer.score(&prompt))
            .await
        {
            Ok(response) => {
                let record = parse_validation_response(&response);
                debug!(
                    url,
                    score = record.score,
                    is_valid = record.is_valid,
                    reason = %record.reason,
                    "Scored link"
                );
                Some(record)
            }
            Err(e) => {
                warn!(url, error = %e, "Scoring failed, dropping link");
                None
            }
        }
    }
}

fn url_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

/// Decode the JSON object between the first `{` and the last `}`.
///
/// Anything that does not decode to a full record is unparseable.
pub fn parse_validation_response(response: &str) -> ValidationRecord {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return ValidationRecord::unparseable();
    };
    if end < start {
        return ValidationRecord::unparseable();
    }

    serde_json::from_str(&response[start..=end]).unwrap_or_else(|e| {
        debug!(error = %e, "Scoring response is not a valid record");
        ValidationRecord::unparseable()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedded_object() {
        let response = "Sure! Here is my verdict:\n```json\n{\"score\": 88, \"is_valid\": true, \"reason\": \"dated article path\"}\n```";
        let record = parse_validation_response(response);
        assert_eq!(record, ValidationRecord::new(88, true, "dated article path"));
    }

    #[test]
    fn test_parse_without_object_is_unparseable() {
        assert_eq!(
            parse_validation_response("I cannot judge this link."),
            ValidationRecord::unparseable()
        );
        assert_eq!(parse_validation_response(""), ValidationRecord::unparseable());
        assert_eq!(
            parse_validation_response("} backwards {"),
            ValidationRecord::unparseable()
        );
    }

    #[test]
    fn test_parse_incomplete_record_is_unparseable() {
        assert_eq!(
            parse_validation_response(r#"{"score": 90}"#),
            ValidationRecord::unparseable()
        );
        assert_eq!(
            parse_validation_response(r#"{"score": 90, "is_valid": "yes", "reason": "r"}"#),
            ValidationRecord::unparseable()
        );
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://farm.example/2024/05/01/soy?ref=home"), "/2024/05/01/soy");
        assert_eq!(url_path("not a url"), "");
    }
}

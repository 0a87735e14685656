use std::collections::HashMap;

use fusion_protocol::{PipelineHits, RawHit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::candidate::{document_id, Candidate};
use crate::error::{FusionError, Result};

/// What to do when one pipeline returns the same candidate twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with `InvalidInput`.
    #[default]
    Reject,
    /// Keep the first occurrence and log every dropped duplicate.
    KeepFirst,
}

/// A hit as produced by some retrieval pipeline, before normalization.
pub trait RetrievalHit {
    /// Split into (identifier, native score, passthrough payload).
    fn into_parts(self) -> Result<(String, Option<f64>, Map<String, Value>)>;
}

impl RetrievalHit for RawHit {
    fn into_parts(self) -> Result<(String, Option<f64>, Map<String, Value>)> {
        if self.id.trim().is_empty() {
            return Err(FusionError::invalid("hit id must not be empty"));
        }
        Ok((self.id, self.score, self.payload))
    }
}

/// A raw database document whose native score was projected into `score_field`.
#[derive(Clone, Debug)]
pub struct DocumentHit {
    document: Value,
    score_field: String,
}

impl DocumentHit {
    pub fn new(document: Value, score_field: impl Into<String>) -> Self {
        Self {
            document,
            score_field: score_field.into(),
        }
    }
}

impl RetrievalHit for DocumentHit {
    fn into_parts(self) -> Result<(String, Option<f64>, Map<String, Value>)> {
        let Value::Object(mut payload) = self.document else {
            return Err(FusionError::invalid(format!(
                "retrieval document must be an object, got {}",
                self.document
            )));
        };

        let id = match payload.remove("_id") {
            Some(raw) => document_id(&raw)?,
            None => return Err(FusionError::invalid("retrieval document has no _id")),
        };

        let score = match payload.remove(&self.score_field) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(other) => {
                return Err(FusionError::invalid(format!(
                    "document '{id}' has non-numeric {}: {other}",
                    self.score_field
                )))
            }
        };

        Ok((id, score, payload))
    }
}

/// A candidate placed at a 1-based rank inside one pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub rank: usize,
    /// Advisory only; scales are not comparable across pipelines.
    pub native_score: f64,
}

/// One named pipeline's ordered output.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineResult {
    name: String,
    entries: Vec<RankedCandidate>,
}

impl PipelineResult {
    /// An empty pipeline, e.g. one whose retrieval failed or matched nothing.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[RankedCandidate] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|entry| entry.candidate.id == id)
            .map(|entry| entry.rank)
    }
}

/// Normalizes retrieval hits into a [`PipelineResult`].
///
/// Input order is trusted as the pipeline's own relevance order and never re-sorted.
/// Ranks are assigned over the kept entries, so they stay contiguous when
/// duplicates are dropped.
#[derive(Clone, Debug, Default)]
pub struct PipelineAdapter {
    duplicates: DuplicatePolicy,
}

impl PipelineAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_duplicates(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn duplicates(&self) -> DuplicatePolicy {
        self.duplicates
    }

    pub fn adapt<H, I>(&self, name: &str, hits: I) -> Result<PipelineResult>
    where
        H: RetrievalHit,
        I: IntoIterator<Item = H>,
    {
        if name.trim().is_empty() {
            return Err(FusionError::config("pipeline name must not be empty"));
        }

        let mut entries: Vec<RankedCandidate> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (position, hit) in hits.into_iter().enumerate() {
            let (id, score, payload) = hit.into_parts()?;
            let native_score = score.unwrap_or(0.0);
            if !native_score.is_finite() {
                return Err(FusionError::invalid(format!(
                    "pipeline '{name}' returned a non-finite score for '{id}'"
                )));
            }

            if let Some(&kept) = seen.get(&id) {
                let first = &entries[kept];
                match self.duplicates {
                    DuplicatePolicy::Reject => {
                        return Err(FusionError::invalid(format!(
                            "pipeline '{name}' returned '{id}' twice (ranks {} and {})",
                            first.rank,
                            position + 1
                        )));
                    }
                    DuplicatePolicy::KeepFirst if first.native_score != native_score => {
                        log::warn!(
                            "Pipeline '{}' returned conflicting duplicate '{}': kept score {} at rank {}, dropped score {}",
                            name,
                            id,
                            first.native_score,
                            first.rank,
                            native_score
                        );
                    }
                    DuplicatePolicy::KeepFirst => {
                        log::warn!(
                            "Pipeline '{}' returned duplicate '{}', keeping rank {}",
                            name,
                            id,
                            first.rank
                        );
                    }
                }
                continue;
            }

            let rank = entries.len() + 1;
            seen.insert(id.clone(), entries.len());
            entries.push(RankedCandidate {
                candidate: Candidate::with_payload(id, payload),
                rank,
                native_score,
            });
        }

        log::debug!("Adapted pipeline '{}': {} candidates", name, entries.len());

        Ok(PipelineResult {
            name: name.to_string(),
            entries,
        })
    }

    /// Adapt a wire-level pipeline.
    pub fn adapt_hits(&self, pipeline: &PipelineHits) -> Result<PipelineResult> {
        self.adapt(&pipeline.name, pipeline.hits.iter().cloned())
    }

    /// Adapt raw documents that carry their native score in `score_field`.
    pub fn adapt_documents(
        &self,
        name: &str,
        documents: Vec<Value>,
        score_field: &str,
    ) -> Result<PipelineResult> {
        self.adapt(
            name,
            documents
                .into_iter()
                .map(|document| DocumentHit::new(document, score_field)),
        )
    }
}

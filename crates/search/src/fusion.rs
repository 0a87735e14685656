use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::adapter::PipelineResult;
use crate::candidate::Candidate;
use crate::error::{FusionError, Result};
use crate::policy::CombinationPolicy;

/// What one pipeline added to a candidate's fused score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// 1-based rank inside the pipeline.
    pub rank: usize,
    /// Weighted RRF term `w / (rank + k)`.
    pub value: f64,
    #[serde(
        default,
        rename = "nativeScore",
        skip_serializing_if = "Option::is_none"
    )]
    pub native_score: Option<f64>,
}

/// One distinct candidate after fusion.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedResult {
    pub candidate: Candidate,
    pub score: f64,
    /// Keyed by pipeline name. Pipelines that did not retrieve the candidate
    /// are absent, never zero-filled.
    pub contributions: BTreeMap<String, Contribution>,
}

impl FusedResult {
    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    pub fn retrieved_by(&self, pipeline: &str) -> bool {
        self.contributions.contains_key(pipeline)
    }
}

/// Weighted RRF term for a candidate at `rank` (1-based).
#[inline]
pub fn rrf_contribution(weight: f64, rank: usize, k: f64) -> f64 {
    weight / (rank as f64 + k)
}

/// Total order used for every fused list: score descending, then id ascending.
pub fn sort_fused(results: &mut [FusedResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
}

/// Keep the best `limit` results. Fusion itself never truncates.
pub fn top_k(mut results: Vec<FusedResult>, limit: usize) -> Vec<FusedResult> {
    results.truncate(limit);
    results
}

/// Weighted Reciprocal Rank Fusion over any number of named pipelines.
///
/// RRF formula: score(d) = Σ weight_i / (k + rank_i(d))
///
/// Contributions are accumulated in policy order. When pipelines disagree on a
/// candidate's payload, the first pipeline in policy order that retrieved it wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct RrfCombiner;

impl RrfCombiner {
    pub fn new() -> Self {
        Self
    }

    pub fn fuse(
        &self,
        pipelines: &[PipelineResult],
        policy: &CombinationPolicy,
    ) -> Result<Vec<FusedResult>> {
        policy.validate_against(pipelines.iter().map(PipelineResult::name))?;

        let by_name: HashMap<&str, &PipelineResult> =
            pipelines.iter().map(|p| (p.name(), p)).collect();
        let k = policy.k();

        let mut fused: Vec<FusedResult> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();

        for declared in policy.pipelines() {
            let pipeline = by_name.get(declared.name.as_str()).ok_or_else(|| {
                FusionError::config(format!("pipeline '{}' not supplied", declared.name))
            })?;

            for entry in pipeline.entries() {
                let value = rrf_contribution(declared.weight, entry.rank, k);
                let slot = *slots.entry(entry.candidate.id.as_str()).or_insert_with(|| {
                    fused.push(FusedResult {
                        candidate: entry.candidate.clone(),
                        score: 0.0,
                        contributions: BTreeMap::new(),
                    });
                    fused.len() - 1
                });

                let result = &mut fused[slot];
                result.score += value;
                result.contributions.insert(
                    declared.name.clone(),
                    Contribution {
                        rank: entry.rank,
                        value,
                        native_score: Some(entry.native_score),
                    },
                );
            }
        }

        sort_fused(&mut fused);

        log::debug!(
            "RRF fusion (k={}): {} pipelines, {} candidates",
            k,
            pipelines.len(),
            fused.len()
        );

        Ok(fused)
    }
}

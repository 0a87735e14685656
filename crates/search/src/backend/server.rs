use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{AggregateExecutor, FusionBackend, HybridQuery};
use crate::candidate::{document_id, Candidate};
use crate::error::{FusionError, Result};
use crate::fusion::{rrf_contribution, sort_fused, Contribution, FusedResult};
use crate::policy::{CombinationPolicy, DEFAULT_WEIGHT};

/// The server operator's smoothing constant is not configurable.
pub const SERVER_RRF_K: f64 = 60.0;

const SCORE_DETAILS_FIELD: &str = "scoreDetails";
const RANK_FUSION_PIPELINE: &str = "$rankFusion";

/// Delegates fusion to the server's native `$rankFusion` stage.
pub struct ServerRankFusion<E> {
    executor: Arc<E>,
}

impl<E> ServerRankFusion<E>
where
    E: AggregateExecutor + 'static,
{
    pub fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    /// Build the aggregation: `$rankFusion`, the score details projection and
    /// an optional `$limit`.
    pub fn build_pipeline(query: &HybridQuery) -> Result<Vec<Value>> {
        query.validate()?;
        if query.policy.k() != SERVER_RRF_K {
            return Err(FusionError::config(format!(
                "server-side $rankFusion uses k={SERVER_RRF_K}, policy asks for k={}",
                query.policy.k()
            )));
        }

        let mut pipelines = Map::new();
        for spec in &query.pipelines {
            pipelines.insert(spec.name.clone(), Value::Array(spec.stages.clone()));
        }
        let mut weights = Map::new();
        for declared in query.policy.pipelines() {
            weights.insert(declared.name.clone(), json!(declared.weight));
        }

        let mut stages = vec![
            json!({
                "$rankFusion": {
                    "input": { "pipelines": pipelines },
                    "combination": { "weights": weights },
                    "scoreDetails": true
                }
            }),
            json!({ "$addFields": { SCORE_DETAILS_FIELD: { "$meta": "scoreDetails" } } }),
        ];
        if let Some(limit) = query.limit {
            stages.push(json!({ "$limit": limit }));
        }
        Ok(stages)
    }
}

#[async_trait]
impl<E> FusionBackend for ServerRankFusion<E>
where
    E: AggregateExecutor + 'static,
{
    fn name(&self) -> &'static str {
        "rank_fusion"
    }

    async fn search(&self, query: &HybridQuery) -> Result<Vec<FusedResult>> {
        let stages = Self::build_pipeline(query)?;
        let documents =
            self.executor
                .aggregate(stages)
                .await
                .map_err(|err| FusionError::Executor {
                    pipeline: RANK_FUSION_PIPELINE.to_string(),
                    message: err.to_string(),
                })?;
        log::debug!("$rankFusion returned {} documents", documents.len());

        let mut seen = HashSet::new();
        let mut fused = Vec::with_capacity(documents.len());
        for document in documents {
            let result = fused_from_document(document, &query.policy)?;
            if !seen.insert(result.candidate.id.clone()) {
                return Err(FusionError::invalid(format!(
                    "$rankFusion returned '{}' twice",
                    result.candidate.id
                )));
            }
            fused.push(result);
        }

        sort_fused(&mut fused);
        Ok(fused)
    }
}

fn fused_from_document(document: Value, policy: &CombinationPolicy) -> Result<FusedResult> {
    let Value::Object(mut payload) = document else {
        return Err(FusionError::invalid("$rankFusion returned a non-object document"));
    };
    let id = match payload.remove("_id") {
        Some(raw) => document_id(&raw)?,
        None => return Err(FusionError::invalid("$rankFusion document has no _id")),
    };
    let details = payload.remove(SCORE_DETAILS_FIELD).ok_or_else(|| {
        FusionError::MalformedScoreDetails(format!("document '{id}' has no {SCORE_DETAILS_FIELD}"))
    })?;
    let (score, contributions) = parse_score_details(&details, policy)?;

    Ok(FusedResult {
        candidate: Candidate::with_payload(id, payload),
        score,
        contributions,
    })
}

/// Read a server `scoreDetails` document back into a fused score and
/// per-pipeline contributions.
///
/// Two shapes are understood:
/// - `details` as an array of `{inputPipelineName, rank, weight?, value?}`,
///   where `value` is the pipeline's native score and rank 0 means "not
///   retrieved"; the contribution is recomputed from rank and weight.
/// - `details` as an object keyed by pipeline name with `{rank, value}`,
///   where `value` already is the weighted contribution.
pub fn parse_score_details(
    details: &Value,
    policy: &CombinationPolicy,
) -> Result<(f64, BTreeMap<String, Contribution>)> {
    let malformed = |message: &str| FusionError::MalformedScoreDetails(message.to_string());

    let object = details.as_object().ok_or_else(|| malformed("not an object"))?;
    let total = object
        .get("value")
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed("missing numeric value"))?;

    let mut contributions = BTreeMap::new();
    match object.get("details") {
        Some(Value::Array(items)) => {
            for item in items {
                let name = item
                    .get("inputPipelineName")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("detail without inputPipelineName"))?;
                let rank = item
                    .get("rank")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| malformed("detail without rank"))? as usize;
                if rank == 0 {
                    continue;
                }
                let weight = item
                    .get("weight")
                    .and_then(Value::as_f64)
                    .or_else(|| policy.weight(name))
                    .unwrap_or(DEFAULT_WEIGHT);
                contributions.insert(
                    name.to_string(),
                    Contribution {
                        rank,
                        value: rrf_contribution(weight, rank, SERVER_RRF_K),
                        native_score: item.get("value").and_then(Value::as_f64),
                    },
                );
            }
        }
        Some(Value::Object(by_name)) => {
            for (name, item) in by_name {
                let rank = item
                    .get("rank")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| malformed("detail without rank"))? as usize;
                if rank == 0 {
                    continue;
                }
                let value = item
                    .get("value")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| malformed("detail without value"))?;
                contributions.insert(
                    name.clone(),
                    Contribution {
                        rank,
                        value,
                        native_score: None,
                    },
                );
            }
        }
        _ => return Err(malformed("missing details")),
    }

    if contributions.is_empty() {
        return Err(malformed("no pipeline retrieved the document"));
    }
    Ok((total, contributions))
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const FUSION_SCHEMA_VERSION: u32 = 1;

/// One retrieval hit as handed over by a pipeline, in that pipeline's order.
///
/// Every field other than `id` and `score` is kept as opaque payload.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct RawHit {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RawHit {
    pub fn new(id: impl Into<String>, score: Option<f64>) -> Self {
        Self {
            id: id.into(),
            score,
            payload: Map::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct PipelineHits {
    pub name: String,
    /// Missing means the default weight of 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct FusionRequest {
    pub pipelines: Vec<PipelineHits>,
    /// RRF smoothing constant override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    /// Top-K truncation applied after fusion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct PipelineScore {
    /// 1-based rank inside the pipeline.
    pub rank: usize,
    /// Weighted RRF contribution added to the fused score.
    pub value: f64,
    #[serde(
        default,
        rename = "nativeScore",
        skip_serializing_if = "Option::is_none"
    )]
    pub native_score: Option<f64>,
}

/// Per-pipeline score breakdown. Pipelines that did not retrieve the
/// candidate are absent from `details`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ScoreDetailsReport {
    pub value: f64,
    pub details: BTreeMap<String, PipelineScore>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct FusedRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_details: Option<ScoreDetailsReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct FusionResponse {
    pub schema_version: u32,
    pub k: f64,
    pub results: Vec<FusedRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn raw_hit_keeps_unknown_fields_as_payload() {
        let hit: RawHit = serde_json::from_value(json!({
            "id": "ai_roi_1",
            "score": 0.91,
            "title": "Machine Learning ROI Analysis Q3",
            "category": "business"
        }))
        .unwrap();

        assert_eq!(hit.id, "ai_roi_1");
        assert_eq!(hit.score, Some(0.91));
        assert_eq!(hit.payload.len(), 2);
        assert_eq!(hit.payload["category"], json!("business"));
    }

    #[test]
    fn request_defaults_are_optional() {
        let request: FusionRequest = serde_json::from_value(json!({
            "pipelines": [{ "name": "textPipeline" }]
        }))
        .unwrap();

        assert_eq!(request.k, None);
        assert_eq!(request.limit, None);
        assert_eq!(request.pipelines[0].weight, None);
        assert!(request.pipelines[0].hits.is_empty());
    }

    #[test]
    fn fused_record_omits_empty_optional_parts() {
        let record = FusedRecord {
            id: "B".to_string(),
            payload: Map::new(),
            score: 0.5,
            score_details: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "id": "B", "score": 0.5 })
        );
    }
}

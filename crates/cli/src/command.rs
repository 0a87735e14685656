use anyhow::Result;
use fusion_protocol::{FusionRequest, FusionResponse, FUSION_SCHEMA_VERSION};
use fusion_search::{
    top_k, CombinationPolicy, DuplicatePolicy, FusedResult, PipelineAdapter, PipelineResult,
    RrfCombiner, DEFAULT_RRF_K, DEFAULT_WEIGHT,
};

use crate::config::FuseConfig;

/// Command-line overrides; they win over the config file and the request.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub k: Option<f64>,
    pub limit: Option<usize>,
    pub keep_first_duplicates: bool,
}

#[derive(Debug)]
pub struct FuseOutcome {
    pub k: f64,
    pub results: Vec<FusedResult>,
}

impl FuseOutcome {
    pub fn to_response(&self, with_details: bool) -> FusionResponse {
        FusionResponse {
            schema_version: FUSION_SCHEMA_VERSION,
            k: self.k,
            results: self
                .results
                .iter()
                .map(|r| r.to_record(with_details))
                .collect(),
        }
    }
}

/// Policy in request order. Weight precedence: config `[weights]`, request, default.
pub fn build_policy(
    request: &FusionRequest,
    config: &FuseConfig,
    overrides: &Overrides,
) -> Result<CombinationPolicy> {
    let k = overrides
        .k
        .or(config.k)
        .or(request.k)
        .unwrap_or(DEFAULT_RRF_K);

    let mut policy = request
        .pipelines
        .iter()
        .fold(CombinationPolicy::new().with_k(k), |policy, p| {
            policy.with_weight(p.name.clone(), p.weight.unwrap_or(DEFAULT_WEIGHT))
        });
    for (name, weight) in &config.weights {
        policy.set_weight(name, *weight)?;
    }
    Ok(policy)
}

pub fn run_fuse(
    request: &FusionRequest,
    config: &FuseConfig,
    overrides: &Overrides,
) -> Result<FuseOutcome> {
    let policy = build_policy(request, config, overrides)?;
    let duplicates = if overrides.keep_first_duplicates {
        DuplicatePolicy::KeepFirst
    } else {
        config.duplicates.unwrap_or_default()
    };
    let adapter = PipelineAdapter::new().with_duplicates(duplicates);

    let pipelines = request
        .pipelines
        .iter()
        .map(|p| adapter.adapt_hits(p))
        .collect::<fusion_search::Result<Vec<PipelineResult>>>()?;

    let fused = RrfCombiner::new().fuse(&pipelines, &policy)?;
    let limit = overrides.limit.or(config.limit).or(request.limit);
    let results = match limit {
        Some(limit) => top_k(fused, limit),
        None => fused,
    };

    log::info!(
        "Fused {} pipelines into {} results",
        pipelines.len(),
        results.len()
    );

    Ok(FuseOutcome {
        k: policy.k(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_search::FusionError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request() -> FusionRequest {
        serde_json::from_value(json!({
            "pipelines": [
                { "name": "vector", "weight": 0.7, "hits": [
                    { "id": "A", "score": 0.9, "title": "alpha" },
                    { "id": "B", "score": 0.8 }
                ]},
                { "name": "text", "weight": 0.3, "hits": [
                    { "id": "B", "score": 5.0 },
                    { "id": "C", "score": 2.0 }
                ]}
            ]
        }))
        .unwrap()
    }

    fn ids(outcome: &FuseOutcome) -> Vec<&str> {
        outcome.results.iter().map(FusedResult::id).collect()
    }

    #[test]
    fn fuses_request_with_its_own_weights() {
        let outcome = run_fuse(&request(), &FuseConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["B", "A", "C"]);
        assert_eq!(outcome.k, DEFAULT_RRF_K);

        let response = outcome.to_response(true);
        assert_eq!(response.schema_version, FUSION_SCHEMA_VERSION);
        assert_eq!(response.results[1].payload["title"], json!("alpha"));
        assert!(response.results[0].score_details.is_some());
    }

    #[test]
    fn padded_request_pipeline_names_fuse() {
        let mut req = request();
        req.pipelines[0].name = "vector ".to_string();
        let outcome = run_fuse(&req, &FuseConfig::default(), &Overrides::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["B", "A", "C"]);
        assert!(outcome.results[1].retrieved_by("vector "));
    }

    #[test]
    fn config_weights_override_request_weights() {
        let mut config = FuseConfig::default();
        config.weights.insert("vector".to_string(), 0.0);
        let policy = build_policy(&request(), &config, &Overrides::default()).unwrap();
        assert_eq!(policy.weight("vector"), Some(0.0));
        assert_eq!(policy.weight("text"), Some(0.3));

        let outcome = run_fuse(&request(), &config, &Overrides::default()).unwrap();
        assert_eq!(ids(&outcome), vec!["B", "C", "A"]);
    }

    #[test]
    fn config_weight_for_unknown_pipeline_fails() {
        let mut config = FuseConfig::default();
        config.weights.insert("graph".to_string(), 1.0);
        let err = build_policy(&request(), &config, &Overrides::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FusionError>(),
            Some(FusionError::Configuration(_))
        ));
    }

    #[test]
    fn flag_overrides_beat_config() {
        let config = FuseConfig {
            k: Some(10.0),
            limit: Some(3),
            ..FuseConfig::default()
        };
        let overrides = Overrides {
            k: Some(1.0),
            limit: Some(1),
            keep_first_duplicates: false,
        };
        let outcome = run_fuse(&request(), &config, &overrides).unwrap();
        assert_eq!(outcome.k, 1.0);
        // k=1: B = 0.7/3 + 0.3/2 beats A = 0.7/2.
        assert_eq!(ids(&outcome), vec!["B"]);
    }

    #[test]
    fn duplicate_hits_fail_unless_keep_first() {
        let mut req = request();
        let dup = req.pipelines[0].hits[0].clone();
        req.pipelines[0].hits.push(dup);

        let err = run_fuse(&req, &FuseConfig::default(), &Overrides::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FusionError>(),
            Some(FusionError::InvalidInput(_))
        ));

        let overrides = Overrides {
            keep_first_duplicates: true,
            ..Overrides::default()
        };
        let outcome = run_fuse(&req, &FuseConfig::default(), &overrides).unwrap();
        assert_eq!(outcome.results.len(), 3);
    }
}

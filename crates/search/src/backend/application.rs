use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::JoinSet;

use super::{AggregateExecutor, ExecutorError, FusionBackend, HybridQuery, PipelineSpec};
use crate::adapter::{PipelineAdapter, PipelineResult};
use crate::error::{FusionError, Result};
use crate::fusion::{top_k, FusedResult, RrfCombiner};

/// Field the native score is projected into before adaptation.
pub const NATIVE_SCORE_FIELD: &str = "_nativeScore";

/// How a sub-pipeline that failed to execute is treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineFailure {
    /// Fail the whole query.
    #[default]
    Abort,
    /// Fuse it as an empty list and log a warning.
    TreatAsEmpty,
}

/// Application-level hybrid search: run each sub-pipeline, then fuse with RRF.
pub struct ApplicationFusion<E> {
    executor: Arc<E>,
    adapter: PipelineAdapter,
    combiner: RrfCombiner,
    on_failure: PipelineFailure,
}

impl<E> ApplicationFusion<E>
where
    E: AggregateExecutor + 'static,
{
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            adapter: PipelineAdapter::new(),
            combiner: RrfCombiner::new(),
            on_failure: PipelineFailure::default(),
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: PipelineAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    #[must_use]
    pub fn with_failure_mode(mut self, on_failure: PipelineFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Sub-pipeline stages plus a projection of the native score.
    fn stages_for(spec: &PipelineSpec) -> Vec<Value> {
        let mut stages = spec.stages.clone();
        stages.push(json!({
            "$addFields": { NATIVE_SCORE_FIELD: { "$meta": spec.kind.score_meta() } }
        }));
        stages
    }

    /// Execute every sub-pipeline concurrently; outputs come back in query order.
    async fn run_all(
        &self,
        query: &HybridQuery,
    ) -> Result<Vec<std::result::Result<Vec<Value>, ExecutorError>>> {
        let mut tasks = JoinSet::new();
        for (idx, spec) in query.pipelines.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let stages = Self::stages_for(spec);
            tasks.spawn(async move { (idx, executor.aggregate(stages).await) });
        }

        let mut outputs: Vec<Option<std::result::Result<Vec<Value>, ExecutorError>>> =
            (0..query.pipelines.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (idx, output) = joined.map_err(|err| FusionError::Executor {
                pipeline: "<task>".to_string(),
                message: err.to_string(),
            })?;
            outputs[idx] = Some(output);
        }

        outputs
            .into_iter()
            .zip(&query.pipelines)
            .map(|(output, spec)| {
                output.ok_or_else(|| FusionError::Executor {
                    pipeline: spec.name.clone(),
                    message: "no output collected".to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl<E> FusionBackend for ApplicationFusion<E>
where
    E: AggregateExecutor + 'static,
{
    fn name(&self) -> &'static str {
        "application"
    }

    async fn search(&self, query: &HybridQuery) -> Result<Vec<FusedResult>> {
        query.validate()?;

        let outputs = self.run_all(query).await?;
        let mut results: Vec<PipelineResult> = Vec::with_capacity(outputs.len());
        for (spec, output) in query.pipelines.iter().zip(outputs) {
            match output {
                Ok(documents) => {
                    log::debug!("{}: {} results", spec.name, documents.len());
                    results.push(self.adapter.adapt_documents(
                        &spec.name,
                        documents,
                        NATIVE_SCORE_FIELD,
                    )?);
                }
                Err(err) if self.on_failure == PipelineFailure::TreatAsEmpty => {
                    log::warn!(
                        "Pipeline '{}' failed, fusing it as empty: {}",
                        spec.name,
                        err
                    );
                    results.push(PipelineResult::empty(spec.name.clone()));
                }
                Err(err) => {
                    return Err(FusionError::Executor {
                        pipeline: spec.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let fused = self.combiner.fuse(&results, &query.policy)?;
        Ok(match query.limit {
            Some(limit) => top_k(fused, limit),
            None => fused,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::ScriptedExecutor;
    use super::super::PipelineKind;
    use super::*;
    use crate::policy::CombinationPolicy;
    use pretty_assertions::assert_eq;

    fn query() -> HybridQuery {
        HybridQuery::new(
            vec![
                PipelineSpec::new(
                    "vectorPipeline",
                    PipelineKind::Vector,
                    vec![json!({"$vectorSearch": {"index": "vector_search_index", "limit": 20}})],
                ),
                PipelineSpec::new(
                    "textPipeline",
                    PipelineKind::Lexical,
                    vec![json!({"$search": {"index": "text_search_index"}}), json!({"$limit": 20})],
                ),
            ],
            CombinationPolicy::new()
                .with_weight("vectorPipeline", 0.7)
                .with_weight("textPipeline", 0.3),
        )
    }

    fn ids(results: &[FusedResult]) -> Vec<&str> {
        results.iter().map(FusedResult::id).collect()
    }

    #[tokio::test]
    async fn fuses_executed_pipelines_with_native_scores() {
        let executor = Arc::new(
            ScriptedExecutor::default()
                .respond(
                    "$vectorSearch",
                    vec![
                        json!({"_id": "ai_roi_1", "title": "ROI", NATIVE_SCORE_FIELD: 0.93}),
                        json!({"_id": "ml_performance_1", NATIVE_SCORE_FIELD: 0.88}),
                    ],
                )
                .respond(
                    "$search",
                    vec![json!({"_id": "ml_performance_1", NATIVE_SCORE_FIELD: 4.2})],
                ),
        );
        let backend = ApplicationFusion::new(Arc::clone(&executor));

        let fused = backend.search(&query()).await.unwrap();

        assert_eq!(ids(&fused), vec!["ml_performance_1", "ai_roi_1"]);
        let details = fused[0].score_details();
        assert_eq!(details.pipeline("textPipeline").unwrap().native_score, Some(4.2));
        assert_eq!(fused[1].candidate.payload["title"], json!("ROI"));

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for call in calls.iter() {
            let last = call.last().unwrap();
            assert!(last["$addFields"][NATIVE_SCORE_FIELD]["$meta"].is_string());
        }
    }

    #[tokio::test]
    async fn failed_pipeline_aborts_by_default() {
        let executor = Arc::new(
            ScriptedExecutor::default()
                .respond("$vectorSearch", vec![json!({"_id": "a"})])
                .fail("$search", "index text_search_index not found"),
        );
        let err = ApplicationFusion::new(executor)
            .search(&query())
            .await
            .unwrap_err();
        match err {
            FusionError::Executor { pipeline, message } => {
                assert_eq!(pipeline, "textPipeline");
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failed_pipeline_can_be_fused_as_empty() {
        let executor = Arc::new(
            ScriptedExecutor::default()
                .respond(
                    "$vectorSearch",
                    vec![json!({"_id": "a"}), json!({"_id": "b"}), json!({"_id": "c"})],
                )
                .fail("$search", "timeout"),
        );
        let fused = ApplicationFusion::new(executor)
            .with_failure_mode(PipelineFailure::TreatAsEmpty)
            .search(&query().with_limit(2))
            .await
            .unwrap();

        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert!((fused[0].score - 0.7 / 61.0).abs() < 1e-12);
    }
}

//! Interchangeable ways of answering a hybrid query.
//!
//! [`ApplicationFusion`] runs every sub-pipeline separately and fuses the lists
//! with [`RrfCombiner`](crate::RrfCombiner). [`ServerRankFusion`] hands the
//! whole query to a server that implements `$rankFusion` natively. Both return
//! the same ordered `FusedResult` list, so callers pick one from a capability
//! check they perform themselves.

mod application;
mod server;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::fusion::FusedResult;
use crate::policy::CombinationPolicy;

pub use application::{ApplicationFusion, PipelineFailure, NATIVE_SCORE_FIELD};
pub use server::{parse_score_details, ServerRankFusion, SERVER_RRF_K};

pub type ExecutorError = Box<dyn std::error::Error + Send + Sync>;

/// Runs an aggregation pipeline against the document store and returns the
/// produced documents in order.
#[async_trait]
pub trait AggregateExecutor: Send + Sync {
    async fn aggregate(&self, stages: Vec<Value>) -> std::result::Result<Vec<Value>, ExecutorError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Vector,
    Lexical,
}

impl PipelineKind {
    /// `$meta` key that exposes this pipeline's native relevance score.
    pub fn score_meta(self) -> &'static str {
        match self {
            Self::Vector => "vectorSearchScore",
            Self::Lexical => "searchScore",
        }
    }
}

/// One named retrieval sub-pipeline, as aggregation stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSpec {
    pub name: String,
    pub kind: PipelineKind,
    pub stages: Vec<Value>,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>, kind: PipelineKind, stages: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HybridQuery {
    pub pipelines: Vec<PipelineSpec>,
    pub policy: CombinationPolicy,
    /// Top-K applied after fusion.
    pub limit: Option<usize>,
}

impl HybridQuery {
    pub fn new(pipelines: Vec<PipelineSpec>, policy: CombinationPolicy) -> Self {
        Self {
            pipelines,
            policy,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.policy
            .validate_against(self.pipelines.iter().map(|p| p.name.as_str()))
    }
}

#[async_trait]
pub trait FusionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &HybridQuery) -> Result<Vec<FusedResult>>;
}

/// Result of an external server capability probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FusionCapability {
    /// The server executes `$rankFusion` itself.
    Native,
    /// Fall back to fusing in the application.
    ApplicationLevel,
}

pub fn select_backend<E>(capability: FusionCapability, executor: Arc<E>) -> Box<dyn FusionBackend>
where
    E: AggregateExecutor + 'static,
{
    log::debug!("Selecting fusion backend for {:?}", capability);
    match capability {
        FusionCapability::Native => Box::new(ServerRankFusion::new(executor)),
        FusionCapability::ApplicationLevel => Box::new(ApplicationFusion::new(executor)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by the first stage operator (`$vectorSearch`, `$search`, `$rankFusion`).
    #[derive(Default)]
    pub struct ScriptedExecutor {
        responses: HashMap<String, std::result::Result<Vec<Value>, String>>,
        pub calls: Mutex<Vec<Vec<Value>>>,
    }

    impl ScriptedExecutor {
        pub fn respond(mut self, operator: &str, docs: Vec<Value>) -> Self {
            self.responses.insert(operator.to_string(), Ok(docs));
            self
        }

        pub fn fail(mut self, operator: &str, message: &str) -> Self {
            self.responses
                .insert(operator.to_string(), Err(message.to_string()));
            self
        }
    }

    #[async_trait]
    impl AggregateExecutor for ScriptedExecutor {
        async fn aggregate(
            &self,
            stages: Vec<Value>,
        ) -> std::result::Result<Vec<Value>, ExecutorError> {
            let operator = stages
                .first()
                .and_then(Value::as_object)
                .and_then(|stage| stage.keys().next().cloned())
                .unwrap_or_default();
            self.calls.lock().unwrap().push(stages);
            match self.responses.get(&operator) {
                Some(Ok(docs)) => Ok(docs.clone()),
                Some(Err(message)) => Err(message.clone().into()),
                None => Err(format!("no scripted response for {operator}").into()),
            }
        }
    }
}

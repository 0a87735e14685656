//! Hybrid search result fusion.
//!
//! Retrieval pipelines (vector, lexical, ...) run elsewhere and hand over their
//! ranked hits. This crate normalizes them ([`PipelineAdapter`]), fuses them with
//! weighted Reciprocal Rank Fusion ([`RrfCombiner`]) and exposes a per-pipeline
//! breakdown of every fused score ([`ScoreDetails`]).

mod adapter;
pub mod backend;
mod candidate;
mod error;
mod fusion;
mod policy;
mod score_details;

pub use adapter::{
    DocumentHit, DuplicatePolicy, PipelineAdapter, PipelineResult, RankedCandidate, RetrievalHit,
};
pub use backend::{
    select_backend, AggregateExecutor, ApplicationFusion, FusionBackend, FusionCapability,
    HybridQuery, PipelineFailure, PipelineKind, PipelineSpec, ServerRankFusion,
};
pub use candidate::{document_id, Candidate};
pub use error::{FusionError, Result};
pub use fusion::{rrf_contribution, sort_fused, top_k, Contribution, FusedResult, RrfCombiner};
pub use policy::{CombinationPolicy, PipelineWeight, DEFAULT_RRF_K, DEFAULT_WEIGHT};
pub use score_details::ScoreDetails;

use std::collections::BTreeMap;
use std::fmt;

use fusion_protocol::{FusedRecord, PipelineScore, ScoreDetailsReport};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::fusion::{Contribution, FusedResult};

/// Read-only score breakdown of one fused result, for diagnostics and tests.
///
/// Serializes as `{"value": .., "details": {"<pipeline>": {"rank": .., "value": ..}}}`
/// with pipelines in name order.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ScoreDetails<'a> {
    value: f64,
    details: &'a BTreeMap<String, Contribution>,
}

impl<'a> ScoreDetails<'a> {
    pub fn of(result: &'a FusedResult) -> Self {
        Self {
            value: result.score,
            details: &result.contributions,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn pipeline(&self, name: &str) -> Option<&'a Contribution> {
        self.details.get(name)
    }

    pub fn pipelines(&self) -> impl Iterator<Item = (&'a str, &'a Contribution)> {
        let details: &'a BTreeMap<String, Contribution> = self.details;
        details.iter().map(|(name, c)| (name.as_str(), c))
    }

    /// The serialized shape as a JSON value, e.g. for embedding in diagnostics.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_report(&self) -> ScoreDetailsReport {
        ScoreDetailsReport {
            value: self.value,
            details: self
                .details
                .iter()
                .map(|(name, c)| {
                    (
                        name.clone(),
                        PipelineScore {
                            rank: c.rank,
                            value: c.value,
                            native_score: c.native_score,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl fmt::Display for ScoreDetails<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.value)?;
        for (idx, (name, c)) in self.pipelines().enumerate() {
            let sep = if idx == 0 { " = " } else { " + " };
            write!(f, "{sep}{name}#{} {:.6}", c.rank, c.value)?;
        }
        Ok(())
    }
}

impl FusedResult {
    pub fn score_details(&self) -> ScoreDetails<'_> {
        ScoreDetails::of(self)
    }

    /// Wire record for reports and API responses.
    pub fn to_record(&self, with_details: bool) -> FusedRecord {
        FusedRecord {
            id: self.candidate.id.clone(),
            payload: self.candidate.payload.clone(),
            score: self.score,
            score_details: with_details.then(|| self.score_details().to_report()),
        }
    }
}

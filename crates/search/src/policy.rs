use crate::error::{FusionError, Result};

/// RRF smoothing constant `k` in `w / (rank + k)`.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Weight of a pipeline listed without an explicit weight.
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineWeight {
    pub name: String,
    pub weight: f64,
}

/// Declares which pipelines take part in fusion and how much each counts.
///
/// Declaration order matters: it is the accumulation order and decides which
/// pipeline's payload wins when several retrieved the same candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct CombinationPolicy {
    pipelines: Vec<PipelineWeight>,
    k: f64,
    /// Names declared more than once; rejected by `validate`.
    redeclared: Vec<String>,
}

impl Default for CombinationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl CombinationPolicy {
    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
            k: DEFAULT_RRF_K,
            redeclared: Vec::new(),
        }
    }

    /// Every named pipeline at the default weight.
    pub fn uniform<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(Self::new(), |policy, name| policy.with_pipeline(name))
    }

    #[must_use]
    pub fn with_pipeline(self, name: impl Into<String>) -> Self {
        self.with_weight(name, DEFAULT_WEIGHT)
    }

    /// Declare `name` with `weight`. Declaring the same name twice makes the
    /// policy invalid; use [`set_weight`](Self::set_weight) to override.
    #[must_use]
    pub fn with_weight(mut self, name: impl Into<String>, weight: f64) -> Self {
        let name = name.into();
        if self.pipelines.iter().any(|p| p.name == name) {
            if !self.redeclared.contains(&name) {
                self.redeclared.push(name);
            }
        } else {
            self.pipelines.push(PipelineWeight { name, weight });
        }
        self
    }

    #[must_use]
    pub fn with_k(mut self, k: f64) -> Self {
        self.k = k;
        self
    }

    /// Override the weight of an already declared pipeline.
    pub fn set_weight(&mut self, name: &str, weight: f64) -> Result<()> {
        match self.pipelines.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.weight = weight;
                Ok(())
            }
            None => Err(FusionError::config(format!(
                "weight given for unknown pipeline '{name}'"
            ))),
        }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn pipelines(&self) -> &[PipelineWeight] {
        &self.pipelines
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.weight)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Check the policy on its own: non-empty, sane weights and k.
    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(FusionError::config("combination policy has no pipelines"));
        }
        if let Some(name) = self.redeclared.first() {
            return Err(FusionError::config(format!(
                "pipeline '{name}' is declared more than once in the combination policy"
            )));
        }
        if !self.k.is_finite() || self.k < 0.0 {
            return Err(FusionError::config(format!(
                "smoothing constant k must be finite and >= 0, got {}",
                self.k
            )));
        }
        for pipeline in &self.pipelines {
            if pipeline.name.trim().is_empty() {
                return Err(FusionError::config("pipeline name must not be empty"));
            }
            if !pipeline.weight.is_finite() || pipeline.weight < 0.0 {
                return Err(FusionError::config(format!(
                    "weight for '{}' must be finite and >= 0, got {}",
                    pipeline.name, pipeline.weight
                )));
            }
        }
        if self.pipelines.iter().all(|p| p.weight == 0.0) {
            return Err(FusionError::config("all pipeline weights are zero"));
        }
        Ok(())
    }

    /// Check the policy against the names of the pipelines actually supplied.
    /// Both directions must match exactly.
    pub fn validate_against<'a, I>(&self, supplied: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.validate()?;

        let supplied: Vec<&str> = supplied.into_iter().collect();
        if supplied.is_empty() {
            return Err(FusionError::config("no pipelines supplied"));
        }
        for (idx, name) in supplied.iter().enumerate() {
            if supplied[..idx].contains(name) {
                return Err(FusionError::config(format!(
                    "pipeline '{name}' supplied more than once"
                )));
            }
            if self.weight(name).is_none() {
                return Err(FusionError::config(format!(
                    "pipeline '{name}' is not declared in the combination policy"
                )));
            }
        }
        for declared in &self.pipelines {
            if !supplied.contains(&declared.name.as_str()) {
                return Err(FusionError::config(format!(
                    "combination policy references missing pipeline '{}'",
                    declared.name
                )));
            }
        }
        Ok(())
    }
}

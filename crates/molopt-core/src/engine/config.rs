use super::prompt::{PromptConfig, PromptStrategy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// Size and validation split of the candidate population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolConfig {
    pub capacity: usize,
    pub validation_fraction: f64,
}

impl PoolConfig {
    pub fn new(capacity: usize, validation_fraction: f64) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(invalid("capacity", "must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&validation_fraction) {
            return Err(invalid(
                "validation_fraction",
                format!("{validation_fraction} is outside [0, 1]"),
            ));
        }
        Ok(Self {
            capacity,
            validation_fraction,
        })
    }

    /// Number of traces held out for validation: `floor(capacity × validation_fraction)`.
    pub fn validation_quota(&self) -> usize {
        (self.capacity as f64 * self.validation_fraction).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub pool: PoolConfig,
    /// Targets more similar than this are treated as near-duplicates during a merge.
    pub diversity_threshold: f64,
    /// Number of retained traces sampled as context for a new trace or prompt.
    pub context_size: usize,
    /// Number of most similar retained targets attached to each new candidate.
    pub neighbors_per_candidate: usize,
    pub prompt: PromptConfig,
    pub strategy: PromptStrategy,
}

#[derive(Default)]
pub struct OptimizationConfigBuilder {
    capacity: Option<usize>,
    validation_fraction: Option<f64>,
    diversity_threshold: Option<f64>,
    context_size: Option<usize>,
    neighbors_per_candidate: Option<usize>,
    prompt: Option<PromptConfig>,
    strategy: Option<PromptStrategy>,
}

impl OptimizationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
    pub fn validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = Some(fraction);
        self
    }
    pub fn diversity_threshold(mut self, threshold: f64) -> Self {
        self.diversity_threshold = Some(threshold);
        self
    }
    pub fn context_size(mut self, size: usize) -> Self {
        self.context_size = Some(size);
        self
    }
    pub fn neighbors_per_candidate(mut self, n: usize) -> Self {
        self.neighbors_per_candidate = Some(n);
        self
    }
    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.prompt = Some(prompt);
        self
    }
    pub fn strategy(mut self, strategy: PromptStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn build(self) -> Result<OptimizationConfig, ConfigError> {
        let pool = PoolConfig::new(
            self.capacity
                .ok_or(ConfigError::MissingParameter("capacity"))?,
            self.validation_fraction
                .ok_or(ConfigError::MissingParameter("validation_fraction"))?,
        )?;

        let diversity_threshold = self
            .diversity_threshold
            .ok_or(ConfigError::MissingParameter("diversity_threshold"))?;
        if !(0.0..=1.0).contains(&diversity_threshold) {
            return Err(invalid(
                "diversity_threshold",
                format!("{diversity_threshold} is outside [0, 1]"),
            ));
        }

        let prompt = self.prompt.unwrap_or_default();
        let (lo, hi) = prompt.sim_range;
        if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
            return Err(invalid("sim_range", format!("({lo}, {hi}) is not a valid range")));
        }
        if !prompt.max_possible_oracle_score.is_finite() {
            return Err(invalid("max_possible_oracle_score", "must be finite"));
        }

        Ok(OptimizationConfig {
            pool,
            diversity_threshold,
            context_size: self
                .context_size
                .ok_or(ConfigError::MissingParameter("context_size"))?,
            neighbors_per_candidate: self
                .neighbors_per_candidate
                .ok_or(ConfigError::MissingParameter("neighbors_per_candidate"))?,
            prompt,
            strategy: self
                .strategy
                .ok_or(ConfigError::MissingParameter("strategy"))?,
        })
    }
}

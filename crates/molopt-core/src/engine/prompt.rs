use super::utils::sampling::{quantile, uniform_between};
use crate::core::models::candidate::{CandidateRecord, Neighbor};
use crate::core::models::trace::OptimizationTrace;
use rand::Rng;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use thiserror::Error;
use tracing::instrument;

const SIMILAR_OPEN: &str = "[SIMILAR]";
const SIMILAR_CLOSE: &str = "[/SIMILAR]";
const PROPERTY_OPEN: &str = "[PROPERTY]oracle_score ";
const PROPERTY_CLOSE: &str = "[/PROPERTY]";
const SMILES_OPEN: &str = "[START_SMILES]";
const SMILES_CLOSE: &str = "[END_SMILES]";
const ORACLE_QUANTILE: f64 = 0.9;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PromptError {
    #[error("Unknown render mode: '{0}'")]
    UnknownMode(String),
    #[error("Unknown prompt strategy: '{0}'")]
    UnknownStrategy(String),
    #[error("Candidate '{identity}' has no score but the strategy requires one")]
    MissingScore { identity: String },
}

/// Whether the prompt asks for a new molecule or replays a known one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Target similarities and score are desired values; the target slot is left open.
    Generation,
    /// Real similarities and the true score; the target is written out in full.
    Reconstruction,
}

impl FromStr for RenderMode {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generation" => Ok(Self::Generation),
            "reconstruction" => Ok(Self::Reconstruction),
            _ => Err(PromptError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Reconstruction => write!(f, "reconstruction"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PromptStrategy {
    /// Neighbor tags and molecules only.
    #[default]
    Default,
    /// Adds oracle-score property tags for rejection-sampling fine-tuning.
    RejectionSamplingV2,
}

impl FromStr for PromptStrategy {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "rej-sample-v2" => Ok(Self::RejectionSamplingV2),
            _ => Err(PromptError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::RejectionSamplingV2 => write!(f, "rej-sample-v2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    /// Marker written at the very start of every prompt.
    pub sequence_start_token: String,
    /// Range desired target similarities are drawn from in generation mode.
    pub sim_range: (f64, f64),
    /// Upper bound of the desired oracle score in generation mode.
    pub max_possible_oracle_score: f64,
    /// Whether the rejection-sampling strategy writes oracle-score tags at all.
    pub include_oracle_score: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            sequence_start_token: "</s>".to_string(),
            sim_range: (0.4, 0.9),
            max_possible_oracle_score: 1.0,
            include_oracle_score: true,
        }
    }
}

/// Serializes traces into model-facing text. Holds no state beyond its configuration.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder<'a> {
    config: &'a PromptConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a PromptConfig) -> Self {
        Self { config }
    }

    /// Renders a trace as a single prompt string.
    ///
    /// # Arguments
    ///
    /// * `trace` - The trace whose context and target are rendered.
    /// * `mode` - Generation leaves the target open; reconstruction writes it out.
    /// * `strategy` - Selects whether oracle-score tags are emitted.
    /// * `rng` - Source for desired similarities and scores; untouched in reconstruction mode.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::MissingScore`] when an oracle-score tag is required for a record
    /// without a score. Nothing is returned on error, so there is no partial render.
    #[instrument(level = "trace", skip_all, fields(target = trace.target().identity(), %mode, %strategy))]
    pub fn render<R: Rng + ?Sized>(
        &self,
        trace: &OptimizationTrace,
        mode: RenderMode,
        strategy: PromptStrategy,
        rng: &mut R,
    ) -> Result<String, PromptError> {
        let scored = strategy == PromptStrategy::RejectionSamplingV2 && self.config.include_oracle_score;
        let mut out = self.config.sequence_start_token.clone();

        for record in trace.context() {
            write_neighbors(&mut out, record, |neighbor| neighbor.similarity);
            if scored {
                write_property(&mut out, required_score(record)?);
            }
            write_molecule(&mut out, record.identity());
        }

        let target = trace.target();
        match mode {
            RenderMode::Generation => {
                let (lo, hi) = self.config.sim_range;
                write_neighbors(&mut out, target, |_| uniform_between(lo, hi, rng));
            }
            RenderMode::Reconstruction => {
                write_neighbors(&mut out, target, |neighbor| neighbor.similarity);
            }
        }

        if scored {
            let score = match mode {
                RenderMode::Generation => self.desired_score(trace, rng)?,
                RenderMode::Reconstruction => required_score(target)?,
            };
            write_property(&mut out, score);
        }

        match mode {
            RenderMode::Generation => out.push_str(SMILES_OPEN),
            RenderMode::Reconstruction => write_molecule(&mut out, target.identity()),
        }
        Ok(out)
    }

    /// Uniform draw between the 90th percentile of the context scores (0 for an empty context)
    /// and the configured maximum.
    fn desired_score<R: Rng + ?Sized>(
        &self,
        trace: &OptimizationTrace,
        rng: &mut R,
    ) -> Result<f64, PromptError> {
        let scores = trace
            .context()
            .iter()
            .map(required_score)
            .collect::<Result<Vec<_>, _>>()?;
        let floor = quantile(&scores, ORACLE_QUANTILE).unwrap_or(0.0);
        Ok(uniform_between(floor, self.config.max_possible_oracle_score, rng))
    }
}

fn required_score(record: &CandidateRecord) -> Result<f64, PromptError> {
    record.score().ok_or_else(|| PromptError::MissingScore {
        identity: record.identity().to_string(),
    })
}

fn write_neighbors(
    out: &mut String,
    record: &CandidateRecord,
    mut similarity: impl FnMut(&Neighbor) -> f64,
) {
    for neighbor in record.neighbors() {
        let _ = write!(
            out,
            "{SIMILAR_OPEN}{} {:.2}{SIMILAR_CLOSE}",
            neighbor.record.identity(),
            similarity(neighbor)
        );
    }
}

fn write_property(out: &mut String, score: f64) {
    let _ = write!(out, "{PROPERTY_OPEN}{score:.2}{PROPERTY_CLOSE}");
}

fn write_molecule(out: &mut String, identity: &str) {
    let _ = write!(out, "{SMILES_OPEN}{identity}{SMILES_CLOSE}");
}

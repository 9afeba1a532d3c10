use crate::cli::EvolveArgs;
use crate::error::{CliError, Result};
use molopt::core::chem::fingerprint::FingerprintConfig;
use molopt::engine::config::{OptimizationConfig, OptimizationConfigBuilder};
use molopt::engine::prompt::{PromptConfig, PromptStrategy};
use serde::Deserialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_VALIDATION_FRACTION: f64 = 0.2;
const DEFAULT_DIVERSITY_THRESHOLD: f64 = 1.0;
const DEFAULT_CONTEXT_SIZE: usize = 4;
const DEFAULT_NEIGHBORS_PER_CANDIDATE: usize = 1;
const DEFAULT_GENERATION_PROMPTS: usize = 16;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPopulationConfig {
    capacity: Option<usize>,
    validation_fraction: Option<f64>,
    diversity_threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPromptConfig {
    context_size: Option<usize>,
    neighbors_per_candidate: Option<usize>,
    strategy: Option<String>,
    sequence_start_token: Option<String>,
    sim_range: Option<[f64; 2]>,
    max_possible_oracle_score: Option<f64>,
    include_oracle_score: Option<bool>,
    generation_prompts: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialFingerprintConfig {
    radius: Option<usize>,
    width: Option<usize>,
}

/// The `evolve` configuration as read from TOML; every field may be absent.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    seed: Option<u64>,
    population: Option<PartialPopulationConfig>,
    prompt: Option<PartialPromptConfig>,
    fingerprint: Option<PartialFingerprintConfig>,
}

/// Fully resolved settings for one `evolve` run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub optimization: OptimizationConfig,
    pub fingerprint: FingerprintConfig,
    pub seed: u64,
    pub generation_prompts: usize,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolves the final configuration. Precedence, highest first: `-S` values, dedicated
    /// flags, the file, built-in defaults. Only the capacity has no default.
    pub fn merge_with_cli(mut self, args: &EvolveArgs) -> Result<RunConfig> {
        self.apply_flags(args);
        self.apply_set_values(&args.set_values)?;

        let population = self.population.unwrap_or_default();
        let prompt = self.prompt.unwrap_or_default();
        let fingerprint = self.fingerprint.unwrap_or_default();

        let capacity = population.capacity.ok_or_else(|| {
            CliError::Config(
                "`population.capacity` is required either in the config file or via --capacity."
                    .to_string(),
            )
        })?;

        let strategy = match prompt.strategy.as_deref() {
            Some(name) => PromptStrategy::from_str(name).map_err(|e| CliError::Config(e.to_string()))?,
            None => PromptStrategy::Default,
        };

        let defaults = PromptConfig::default();
        let prompt_config = PromptConfig {
            sequence_start_token: prompt
                .sequence_start_token
                .unwrap_or(defaults.sequence_start_token),
            sim_range: prompt
                .sim_range
                .map_or(defaults.sim_range, |[lo, hi]| (lo, hi)),
            max_possible_oracle_score: prompt
                .max_possible_oracle_score
                .unwrap_or(defaults.max_possible_oracle_score),
            include_oracle_score: prompt
                .include_oracle_score
                .unwrap_or(defaults.include_oracle_score),
        };

        let optimization = OptimizationConfigBuilder::new()
            .capacity(capacity)
            .validation_fraction(
                population
                    .validation_fraction
                    .unwrap_or(DEFAULT_VALIDATION_FRACTION),
            )
            .diversity_threshold(
                population
                    .diversity_threshold
                    .unwrap_or(DEFAULT_DIVERSITY_THRESHOLD),
            )
            .context_size(prompt.context_size.unwrap_or(DEFAULT_CONTEXT_SIZE))
            .neighbors_per_candidate(
                prompt
                    .neighbors_per_candidate
                    .unwrap_or(DEFAULT_NEIGHBORS_PER_CANDIDATE),
            )
            .prompt(prompt_config)
            .strategy(strategy)
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let fingerprint_defaults = FingerprintConfig::default();
        let fingerprint = FingerprintConfig {
            radius: fingerprint.radius.unwrap_or(fingerprint_defaults.radius),
            width: fingerprint.width.unwrap_or(fingerprint_defaults.width),
        };
        if fingerprint.width == 0 {
            return Err(CliError::Config(
                "`fingerprint.width` must be at least 1.".to_string(),
            ));
        }

        Ok(RunConfig {
            optimization,
            fingerprint,
            seed: self.seed.unwrap_or(0),
            generation_prompts: prompt
                .generation_prompts
                .unwrap_or(DEFAULT_GENERATION_PROMPTS),
        })
    }

    fn apply_flags(&mut self, args: &EvolveArgs) {
        if let Some(seed) = args.seed {
            self.seed = Some(seed);
        }
        if let Some(capacity) = args.capacity {
            self.population.get_or_insert_with(Default::default).capacity = Some(capacity);
        }
        if let Some(strategy) = &args.strategy {
            self.prompt.get_or_insert_with(Default::default).strategy = Some(strategy.clone());
        }
        if let Some(count) = args.generation_prompts {
            self.prompt
                .get_or_insert_with(Default::default)
                .generation_prompts = Some(count);
        }
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;
            match key {
                "seed" => self.seed = Some(parse_value(key, value)?),
                "population.capacity" => {
                    self.population.get_or_insert_with(Default::default).capacity =
                        Some(parse_value(key, value)?)
                }
                "population.validation-fraction" => {
                    self.population
                        .get_or_insert_with(Default::default)
                        .validation_fraction = Some(parse_value(key, value)?)
                }
                "population.diversity-threshold" => {
                    self.population
                        .get_or_insert_with(Default::default)
                        .diversity_threshold = Some(parse_value(key, value)?)
                }
                "fingerprint.radius" => {
                    self.fingerprint.get_or_insert_with(Default::default).radius =
                        Some(parse_value(key, value)?)
                }
                "fingerprint.width" => {
                    self.fingerprint.get_or_insert_with(Default::default).width =
                        Some(parse_value(key, value)?)
                }
                _ => self.apply_prompt_value(key, value)?,
            }
        }
        Ok(())
    }

    fn apply_prompt_value(&mut self, key: &str, value: &str) -> Result<()> {
        let prompt = self.prompt.get_or_insert_with(Default::default);
        match key {
            "prompt.context-size" => prompt.context_size = Some(parse_value(key, value)?),
            "prompt.neighbors-per-candidate" => {
                prompt.neighbors_per_candidate = Some(parse_value(key, value)?)
            }
            "prompt.strategy" => prompt.strategy = Some(value.to_string()),
            "prompt.sequence-start-token" => prompt.sequence_start_token = Some(value.to_string()),
            "prompt.max-possible-oracle-score" => {
                prompt.max_possible_oracle_score = Some(parse_value(key, value)?)
            }
            "prompt.include-oracle-score" => {
                prompt.include_oracle_score = Some(parse_value(key, value)?)
            }
            "prompt.generation-prompts" => {
                prompt.generation_prompts = Some(parse_value(key, value)?)
            }
            "prompt.sim-range" => {
                let (lo, hi) = value.split_once(',').ok_or_else(|| {
                    CliError::Config(format!("Expected LOW,HIGH for {}: {}", key, value))
                })?;
                prompt.sim_range = Some([parse_value(key, lo.trim())?, parse_value(key, hi.trim())?]);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| CliError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}

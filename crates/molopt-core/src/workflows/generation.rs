use crate::core::models::candidate::{Neighbor, rank_order};
use crate::core::models::trace::OptimizationTrace;
use crate::engine::config::OptimizationConfig;
use crate::engine::error::EngineError;
use crate::engine::population::PopulationManager;
use crate::engine::prompt::{PromptBuilder, RenderMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument, warn};

/// Rendered fine-tuning texts for both partitions of the population.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingTexts {
    pub train: Vec<String>,
    pub valid: Vec<String>,
}

/// Builds `count` generation prompts conditioned on random subsets of the population.
///
/// Each prompt's context is a sample of `context_size` retained targets in ascending rank. The
/// best sampled target becomes the anchor: it appears only as the similarity tag of the open
/// target slot, asking the model for something similar to and better than it.
#[instrument(skip_all, name = "generation_prompts", fields(count))]
pub fn prompts<R: Rng + ?Sized>(
    population: &PopulationManager,
    count: usize,
    config: &OptimizationConfig,
    rng: &mut R,
) -> Result<Vec<String>, EngineError> {
    if population.is_empty() {
        warn!("Population is empty; no generation prompts can be built.");
        return Ok(Vec::new());
    }

    let builder = PromptBuilder::new(&config.prompt);
    let mut prompts = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(trace) = generation_trace(population, config.context_size, rng) else {
            break;
        };
        prompts.push(builder.render(&trace, RenderMode::Generation, config.strategy, rng)?);
    }
    debug!(prompts = prompts.len(), "Built generation prompts.");
    Ok(prompts)
}

fn generation_trace<R: Rng + ?Sized>(
    population: &PopulationManager,
    context_size: usize,
    rng: &mut R,
) -> Option<OptimizationTrace> {
    let mut sampled = population.sample(context_size.max(1), rng);
    sampled.sort_by(|a, b| rank_order(a.target(), b.target()));

    let (anchor, context) = sampled.split_last()?;
    let anchor = anchor.target();
    let target = anchor
        .detached()
        .with_neighbors(vec![Neighbor::new(anchor.clone(), 1.0)]);

    let mut trace = OptimizationTrace::new(target);
    for retained in context {
        trace.push_context(retained.target().clone());
    }
    Some(trace)
}

/// Renders the train and valid partitions in reconstruction mode.
///
/// Reconstruction never draws random values; the fixed-seed generator only satisfies the
/// renderer's signature.
#[instrument(skip_all, name = "training_texts")]
pub fn training_texts(
    population: &PopulationManager,
    config: &OptimizationConfig,
) -> Result<TrainingTexts, EngineError> {
    let (train, valid) = population.split()?;
    let builder = PromptBuilder::new(&config.prompt);
    let mut rng = StdRng::seed_from_u64(0);

    let mut render_all = |traces: Vec<&OptimizationTrace>| {
        traces
            .into_iter()
            .map(|trace| builder.render(trace, RenderMode::Reconstruction, config.strategy, &mut rng))
            .collect::<Result<Vec<_>, _>>()
    };

    Ok(TrainingTexts {
        train: render_all(train)?,
        valid: render_all(valid)?,
    })
}

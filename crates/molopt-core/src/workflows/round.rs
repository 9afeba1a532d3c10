use crate::core::chem::toolkit::{MalformedStructure, StructureToolkit};
use crate::core::io::scored::ScoredProposal;
use crate::core::models::candidate::{CandidateRecord, Neighbor, rank_order};
use crate::core::models::trace::OptimizationTrace;
use crate::engine::config::OptimizationConfig;
use crate::engine::error::EngineError;
use crate::engine::population::{MergeReport, PopulationManager};
use crate::engine::progress::{Progress, ProgressReporter};
use rand::Rng;
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSummary {
    pub proposals: usize,
    pub malformed: usize,
    pub merge: MergeReport,
}

/// Runs one generate→score→merge iteration over a batch of scored proposals.
///
/// Proposals that cannot be parsed are logged and counted, not fatal. Each surviving record is
/// annotated with its most similar retained targets, wrapped in a trace whose context is sampled
/// from the current population, and the batch is merged.
#[instrument(skip_all, name = "round_workflow", fields(proposals = proposals.len()))]
pub fn run<T, R>(
    population: &mut PopulationManager,
    proposals: &[ScoredProposal],
    toolkit: &T,
    config: &OptimizationConfig,
    rng: &mut R,
    reporter: &ProgressReporter,
) -> Result<RoundSummary, EngineError>
where
    T: StructureToolkit + ?Sized,
    R: Rng + ?Sized,
{
    info!("Starting optimization round.");

    let records = reporter.phase("Canonicalization", || {
        construct_records(proposals, toolkit, reporter)
    });
    let malformed = proposals.len() - records.len();
    if malformed > 0 {
        warn!(malformed, "Skipped malformed proposals.");
    }

    let records = reporter.phase("Neighbor Search", || {
        attach_neighbors(records, population, toolkit, config.neighbors_per_candidate)
    });

    let traces: Vec<OptimizationTrace> = records
        .into_iter()
        .map(|record| assemble_trace(record, population, config.context_size, rng))
        .collect();

    let merge = reporter.phase("Merge", || population.merge(traces, config.diversity_threshold))?;
    reporter.report(Progress::Message(format!(
        "Population holds {} traces ({} new)",
        merge.retained,
        merge.newly_valid + merge.newly_train
    )));
    info!(
        retained = merge.retained,
        malformed, "Optimization round complete."
    );

    Ok(RoundSummary {
        proposals: proposals.len(),
        malformed,
        merge,
    })
}

fn construct_records<T>(
    proposals: &[ScoredProposal],
    toolkit: &T,
    reporter: &ProgressReporter,
) -> Vec<CandidateRecord>
where
    T: StructureToolkit + ?Sized,
{
    reporter.report(Progress::TaskStart {
        total_steps: proposals.len() as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = proposals.iter();

    #[cfg(feature = "parallel")]
    let iterator = proposals.par_iter();

    let results: Vec<Result<CandidateRecord, MalformedStructure>> = iterator
        .map(|proposal| {
            let result = CandidateRecord::construct(&proposal.raw, proposal.score, toolkit);
            reporter.report(Progress::TaskIncrement);
            result
        })
        .collect();
    reporter.report(Progress::TaskFinish);

    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(input = %e.input, reason = %e.reason, "Dropping malformed proposal.");
                None
            }
        })
        .collect()
}

/// Attaches to each record up to `limit` retained targets, most similar first, skipping its
/// own identity. Equal similarities fall back to rank order, best first.
fn attach_neighbors<T>(
    records: Vec<CandidateRecord>,
    population: &PopulationManager,
    toolkit: &T,
    limit: usize,
) -> Vec<CandidateRecord>
where
    T: StructureToolkit + ?Sized,
{
    if limit == 0 || population.is_empty() {
        return records;
    }

    let annotate = |record: CandidateRecord| {
        let mut scored: Vec<(&CandidateRecord, f64)> = population
            .traces()
            .iter()
            .map(|trace| trace.target())
            .filter(|target| *target != &record)
            .map(|target| (target, toolkit.similarity(record.fingerprint(), target.fingerprint())))
            .collect();
        scored.sort_by(|(a, sim_a), (b, sim_b)| {
            sim_b
                .total_cmp(sim_a)
                .then_with(|| rank_order(b, a))
        });
        let neighbors = scored
            .into_iter()
            .take(limit)
            .map(|(target, similarity)| Neighbor::new(target.clone(), similarity))
            .collect();
        record.with_neighbors(neighbors)
    };

    #[cfg(not(feature = "parallel"))]
    let annotated = records.into_iter().map(annotate).collect();

    #[cfg(feature = "parallel")]
    let annotated = records.into_par_iter().map(annotate).collect();

    annotated
}

/// Wraps a record in a trace whose context is a random sample of retained targets, worst first.
fn assemble_trace<R: Rng + ?Sized>(
    record: CandidateRecord,
    population: &PopulationManager,
    context_size: usize,
    rng: &mut R,
) -> OptimizationTrace {
    let mut sampled = population.sample(context_size, rng);
    sampled.sort_by(|a, b| rank_order(a.target(), b.target()));

    let mut trace = OptimizationTrace::new(record);
    for retained in sampled {
        trace.push_context(retained.target().clone());
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::toolkit::SmilesToolkit;
    use crate::core::models::trace::ClassificationTag;
    use crate::engine::config::OptimizationConfigBuilder;
    use crate::engine::prompt::PromptStrategy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Mutex;

    fn config(capacity: usize, context_size: usize, neighbors: usize) -> OptimizationConfig {
        OptimizationConfigBuilder::new()
            .capacity(capacity)
            .validation_fraction(0.25)
            .diversity_threshold(0.95)
            .context_size(context_size)
            .neighbors_per_candidate(neighbors)
            .strategy(PromptStrategy::Default)
            .build()
            .unwrap()
    }

    fn proposal(raw: &str, score: f64) -> ScoredProposal {
        ScoredProposal {
            raw: raw.to_string(),
            score: Some(score),
        }
    }

    fn first_round() -> Vec<ScoredProposal> {
        vec![
            proposal("CCO", 0.3),
            proposal("c1ccccc1", 0.9),
            proposal("CC(=O)O", 0.5),
            proposal("CCCCCCCC", 0.1),
        ]
    }

    #[test]
    fn malformed_proposals_are_counted_not_fatal() {
        let config = config(8, 2, 1);
        let mut population = PopulationManager::new(&config.pool);
        let mut rng = StdRng::seed_from_u64(1);
        let mut proposals = first_round();
        proposals.push(proposal("C1CC", 0.99));
        proposals.push(proposal("not a molecule", 0.5));

        let summary = run(
            &mut population,
            &proposals,
            &SmilesToolkit::new(),
            &config,
            &mut rng,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(summary.proposals, 6);
        assert_eq!(summary.malformed, 2);
        assert_eq!(population.len(), 4);
        assert_eq!(population.best().unwrap().target().identity(), "c1ccccc1");
    }

    #[test]
    fn first_round_has_no_context_or_neighbors() {
        let config = config(8, 3, 2);
        let mut population = PopulationManager::new(&config.pool);
        let mut rng = StdRng::seed_from_u64(2);
        run(
            &mut population,
            &first_round(),
            &SmilesToolkit::new(),
            &config,
            &mut rng,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert!(population.traces().iter().all(|t| t.context().is_empty()));
        assert!(population.traces().iter().all(|t| t.target().neighbors().is_empty()));
        assert!(population.traces().iter().all(|t| t.tag() != ClassificationTag::Unassigned));
    }

    #[test]
    fn later_rounds_attach_neighbors_and_ordered_context() {
        let config = config(8, 3, 2);
        let toolkit = SmilesToolkit::new();
        let mut population = PopulationManager::new(&config.pool);
        let mut rng = StdRng::seed_from_u64(3);
        let reporter = ProgressReporter::new();
        run(&mut population, &first_round(), &toolkit, &config, &mut rng, &reporter).unwrap();

        run(
            &mut population,
            &[proposal("CCCO", 0.95)],
            &toolkit,
            &config,
            &mut rng,
            &reporter,
        )
        .unwrap();

        let newest = population.best().unwrap();
        assert_eq!(newest.target().identity(), "CCCO");
        let neighbors = newest.target().neighbors();
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors[0].similarity >= neighbors[1].similarity);
        for neighbor in neighbors {
            let expected =
                toolkit.similarity(newest.target().fingerprint(), neighbor.record.fingerprint());
            assert_eq!(neighbor.similarity, expected);
            assert!(neighbor.similarity > 0.0);
            assert!(neighbor.record.neighbors().is_empty());
        }

        let context = newest.context();
        assert_eq!(context.len(), 3);
        assert!(
            context
                .windows(2)
                .all(|pair| rank_order(&pair[0], &pair[1]).is_lt())
        );
    }

    #[test]
    fn resubmitted_candidate_does_not_list_itself_as_neighbor() {
        let config = config(8, 0, 3);
        let toolkit = SmilesToolkit::new();
        let mut population = PopulationManager::new(&config.pool);
        let mut rng = StdRng::seed_from_u64(4);
        let reporter = ProgressReporter::new();
        run(&mut population, &first_round(), &toolkit, &config, &mut rng, &reporter).unwrap();
        run(&mut population, &[proposal("OCC", 0.8)], &toolkit, &config, &mut rng, &reporter).unwrap();

        let ethanol = population
            .traces()
            .iter()
            .find(|t| t.target().identity() == "CCO")
            .unwrap();
        assert_eq!(ethanol.target().score(), Some(0.8));
        assert!(ethanol.target().neighbors().iter().all(|n| n.record.identity() != "CCO"));
    }

    #[test]
    fn round_reports_phases_and_task_steps() {
        let config = config(8, 2, 1);
        let mut population = PopulationManager::new(&config.pool);
        let mut rng = StdRng::seed_from_u64(5);
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        run(
            &mut population,
            &first_round(),
            &SmilesToolkit::new(),
            &config,
            &mut rng,
            &reporter,
        )
        .unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        let increments = events
            .iter()
            .filter(|e| matches!(e, Progress::TaskIncrement))
            .count();
        assert_eq!(increments, 4);
        assert!(events.contains(&Progress::PhaseStart { name: "Merge" }));
        assert!(matches!(events.last(), Some(Progress::Message(_))));
    }
}

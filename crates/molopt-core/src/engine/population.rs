use super::config::PoolConfig;
use super::error::EngineError;
use super::utils::sampling::sample_indices;
use crate::core::models::candidate::rank_order;
use crate::core::models::trace::{ClassificationTag, OptimizationTrace};
use rand::Rng;
use tracing::{debug, error, info, instrument};

/// What a merge did with the traces it was offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeReport {
    /// New traces offered to the merge.
    pub offered: usize,
    /// Traces dropped because an accepted trace shares their target identity.
    pub duplicates: usize,
    /// Traces dropped because their target is too similar to an accepted target.
    pub too_similar: usize,
    /// Traces dropped by the capacity bound.
    pub truncated: usize,
    pub newly_valid: usize,
    pub newly_train: usize,
    /// Population size after the merge.
    pub retained: usize,
}

/// A bounded, ranked, deduplicated population of optimization traces.
///
/// After every successful [`merge`](Self::merge) the population:
///
/// - holds at most `capacity` traces, sorted best first (score, then identity, descending);
/// - has no two targets sharing an identity, nor two targets more similar than the merge threshold;
/// - has exactly `min(len, validation_quota)` traces tagged `Valid` and every other trace `Train`;
/// - never changed the tag of a trace that was already tagged.
#[derive(Debug, Clone)]
pub struct PopulationManager {
    capacity: usize,
    validation_quota: usize,
    traces: Vec<OptimizationTrace>,
}

impl PopulationManager {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            capacity: config.capacity,
            validation_quota: config.validation_quota(),
            traces: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn validation_quota(&self) -> usize {
        self.validation_quota
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Retained traces in rank order, best first.
    pub fn traces(&self) -> &[OptimizationTrace] {
        &self.traces
    }

    pub fn best(&self) -> Option<&OptimizationTrace> {
        self.traces.first()
    }

    /// Folds a batch of new traces into the population.
    ///
    /// New and retained traces are ranked together, filtered greedily for diversity, truncated
    /// to capacity and re-partitioned. The new population is assembled separately and only
    /// replaces the current one once every invariant holds; on error the population is unchanged.
    ///
    /// # Arguments
    ///
    /// * `new_traces` - Unassigned traces to insert.
    /// * `diversity_threshold` - Targets whose fingerprint similarity exceeds this are near-duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidThreshold`] for a NaN threshold,
    /// [`EngineError::PreassignedTag`] if a new trace already carries a tag, and
    /// [`EngineError::InconsistentState`] if the result would violate an invariant.
    #[instrument(level = "debug", skip_all, fields(offered = new_traces.len(), threshold = diversity_threshold))]
    pub fn merge(
        &mut self,
        new_traces: Vec<OptimizationTrace>,
        diversity_threshold: f64,
    ) -> Result<MergeReport, EngineError> {
        if diversity_threshold.is_nan() {
            return Err(EngineError::InvalidThreshold(diversity_threshold));
        }
        if let Some(tagged) = new_traces
            .iter()
            .find(|trace| trace.tag() != ClassificationTag::Unassigned)
        {
            return Err(EngineError::PreassignedTag {
                identity: tagged.target().identity().to_string(),
                tag: tagged.tag(),
            });
        }

        let mut report = MergeReport {
            offered: new_traces.len(),
            ..MergeReport::default()
        };

        // Retained first: the stable sort keeps them ahead of equal-ranked resubmissions.
        let mut ranked: Vec<OptimizationTrace> = self.traces.clone();
        ranked.extend(new_traces);
        ranked.sort_by(|a, b| rank_order(b.target(), a.target()));

        let mut accepted: Vec<OptimizationTrace> = Vec::with_capacity(ranked.len().min(self.capacity));
        for trace in ranked {
            if accepted.iter().any(|kept| kept == &trace) {
                report.duplicates += 1;
                continue;
            }
            let fingerprint = trace.target().fingerprint();
            if accepted
                .iter()
                .any(|kept| kept.target().fingerprint().tanimoto(fingerprint) > diversity_threshold)
            {
                report.too_similar += 1;
                continue;
            }
            accepted.push(trace);
        }

        report.truncated = accepted.len().saturating_sub(self.capacity);
        accepted.truncate(self.capacity);

        let target_valid = accepted.len().min(self.validation_quota);
        let mut valid = accepted
            .iter()
            .filter(|trace| trace.tag() == ClassificationTag::Valid)
            .count();
        for trace in accepted.iter_mut() {
            if trace.tag() != ClassificationTag::Unassigned {
                continue;
            }
            if valid < target_valid {
                trace.assign(ClassificationTag::Valid);
                valid += 1;
                report.newly_valid += 1;
            } else {
                trace.assign(ClassificationTag::Train);
                report.newly_train += 1;
            }
        }

        if let Err(e) = check_invariants(&accepted, self.capacity, self.validation_quota, diversity_threshold) {
            error!(error = %e, "Merge rejected; population left unchanged");
            return Err(e);
        }

        report.retained = accepted.len();
        self.traces = accepted;
        debug!(?report, "Merge complete");
        info!(
            retained = report.retained,
            added = report.newly_valid + report.newly_train,
            "Population updated"
        );
        Ok(report)
    }

    /// Partitions the population into `(train, valid)`, each in rank order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InconsistentState`] if any trace is still unassigned or the number
    /// of validation traces is not `min(len, validation_quota)`.
    pub fn split(&self) -> Result<(Vec<&OptimizationTrace>, Vec<&OptimizationTrace>), EngineError> {
        let mut train = Vec::new();
        let mut valid = Vec::new();
        for trace in &self.traces {
            match trace.tag() {
                ClassificationTag::Train => train.push(trace),
                ClassificationTag::Valid => valid.push(trace),
                ClassificationTag::Unassigned => {
                    return Err(EngineError::InconsistentState(format!(
                        "retained trace '{}' has no tag",
                        trace.target().identity()
                    )));
                }
            }
        }
        let expected = self.traces.len().min(self.validation_quota);
        if valid.len() != expected {
            return Err(EngineError::InconsistentState(format!(
                "{} validation traces, expected {}",
                valid.len(),
                expected
            )));
        }
        Ok((train, valid))
    }

    /// Draws `min(n, len)` distinct traces uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<&OptimizationTrace> {
        sample_indices(self.traces.len(), n, rng)
            .into_iter()
            .map(|i| &self.traces[i])
            .collect()
    }
}

fn check_invariants(
    traces: &[OptimizationTrace],
    capacity: usize,
    validation_quota: usize,
    diversity_threshold: f64,
) -> Result<(), EngineError> {
    let fail = |reason: String| Err(EngineError::InconsistentState(reason));

    if traces.len() > capacity {
        return fail(format!("{} traces exceed capacity {}", traces.len(), capacity));
    }
    for (i, pair) in traces.windows(2).enumerate() {
        if rank_order(pair[0].target(), pair[1].target()).is_lt() {
            return fail(format!("traces at ranks {} and {} are out of order", i, i + 1));
        }
    }
    for (i, a) in traces.iter().enumerate() {
        for b in &traces[i + 1..] {
            if a == b {
                return fail(format!("target '{}' is retained twice", a.target().identity()));
            }
            if a.target().fingerprint().tanimoto(b.target().fingerprint()) > diversity_threshold {
                return fail(format!(
                    "targets '{}' and '{}' exceed the diversity threshold",
                    a.target().identity(),
                    b.target().identity()
                ));
            }
        }
    }

    let valid = traces
        .iter()
        .filter(|trace| trace.tag() == ClassificationTag::Valid)
        .count();
    let expected = traces.len().min(validation_quota);
    if valid != expected {
        return fail(format!(
            "{valid} validation traces after merge, expected {expected}; not enough untagged traces to refill the quota"
        ));
    }
    if traces.iter().any(|trace| trace.tag() == ClassificationTag::Unassigned) {
        return fail("a retained trace was left untagged".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::fingerprint::Fingerprint;
    use crate::core::models::candidate::CandidateRecord;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    const WIDTH: usize = 256;

    /// Trace whose fingerprint occupies a disjoint block of bits, so distinct `block`s have
    /// similarity zero.
    fn trace(identity: &str, score: f64, block: usize) -> OptimizationTrace {
        let fingerprint = Fingerprint::from_indices(WIDTH, block * 8..block * 8 + 8);
        OptimizationTrace::new(CandidateRecord::from_parts(identity, Some(score), fingerprint))
    }

    fn trace_with_bits(identity: &str, score: f64, bits: std::ops::Range<usize>) -> OptimizationTrace {
        OptimizationTrace::new(CandidateRecord::from_parts(
            identity,
            Some(score),
            Fingerprint::from_indices(WIDTH, bits),
        ))
    }

    fn pool(capacity: usize, fraction: f64) -> PopulationManager {
        PopulationManager::new(&PoolConfig::new(capacity, fraction).unwrap())
    }

    fn scores(population: &PopulationManager) -> Vec<f64> {
        population
            .traces()
            .iter()
            .map(|t| t.target().score().unwrap())
            .collect()
    }

    fn tags(population: &PopulationManager) -> Vec<ClassificationTag> {
        population.traces().iter().map(|t| t.tag()).collect()
    }

    fn assert_invariants(population: &PopulationManager, threshold: f64) {
        check_invariants(
            population.traces(),
            population.capacity(),
            population.validation_quota(),
            threshold,
        )
        .unwrap();
    }

    #[test]
    fn worked_example_keeps_valid_tag_sticky() {
        use ClassificationTag::{Train, Valid};
        let mut population = pool(3, 0.34);
        assert_eq!(population.validation_quota(), 1);

        population
            .merge(vec![trace("A", 5.0, 0), trace("B", 3.0, 1), trace("C", 1.0, 2)], 0.9)
            .unwrap();
        assert_eq!(scores(&population), vec![5.0, 3.0, 1.0]);
        assert_eq!(tags(&population), vec![Valid, Train, Train]);

        let report = population.merge(vec![trace("D", 4.0, 3)], 0.9).unwrap();
        assert_eq!(scores(&population), vec![5.0, 4.0, 3.0]);
        assert_eq!(tags(&population), vec![Valid, Train, Train]);
        assert_eq!(report.truncated, 1);
        assert_eq!(report.newly_train, 1);

        let (train, valid) = population.split().unwrap();
        let valid_scores: Vec<f64> = valid.iter().map(|t| t.target().score().unwrap()).collect();
        let train_scores: Vec<f64> = train.iter().map(|t| t.target().score().unwrap()).collect();
        assert_eq!(valid_scores, vec![5.0]);
        assert_eq!(train_scores, vec![4.0, 3.0]);
    }

    #[test]
    fn better_new_trace_does_not_overshoot_the_quota() {
        use ClassificationTag::{Train, Valid};
        let mut population = pool(3, 0.34);
        population.merge(vec![trace("A", 1.0, 0)], 0.9).unwrap();
        assert_eq!(tags(&population), vec![Valid]);

        population.merge(vec![trace("B", 9.0, 1)], 0.9).unwrap();
        assert_eq!(scores(&population), vec![9.0, 1.0]);
        assert_eq!(tags(&population), vec![Train, Valid]);
    }

    #[test]
    fn merge_respects_capacity_order_and_uniqueness() {
        let mut population = pool(5, 0.2);
        let batch: Vec<_> = (0..12)
            .map(|i| trace(&format!("M{i:02}"), (i * 7 % 12) as f64, i))
            .collect();
        population.merge(batch, 0.5).unwrap();
        assert_eq!(population.len(), 5);
        assert_eq!(scores(&population), vec![11.0, 10.0, 9.0, 8.0, 7.0]);
        assert_invariants(&population, 0.5);
    }

    #[test]
    fn equal_scores_break_ties_by_identity_descending() {
        let mut population = pool(4, 0.0);
        population
            .merge(vec![trace("AA", 1.0, 0), trace("CC", 1.0, 1), trace("BB", 1.0, 2)], 0.5)
            .unwrap();
        let identities: Vec<&str> = population
            .traces()
            .iter()
            .map(|t| t.target().identity())
            .collect();
        assert_eq!(identities, vec!["CC", "BB", "AA"]);
    }

    #[test]
    fn missing_scores_rank_last() {
        let mut population = pool(4, 0.0);
        let unscored = OptimizationTrace::new(CandidateRecord::from_parts(
            "ZZ",
            None,
            Fingerprint::from_indices(WIDTH, 200..208),
        ));
        population
            .merge(vec![unscored, trace("A", -3.0, 0)], 0.5)
            .unwrap();
        assert_eq!(population.traces()[1].target().identity(), "ZZ");
    }

    #[test]
    fn near_duplicate_keeps_the_higher_score() {
        let mut population = pool(5, 0.2);
        let report = population
            .merge(
                vec![
                    trace_with_bits("LOW", 1.0, 0..10),
                    trace_with_bits("HIGH", 2.0, 0..9),
                    trace_with_bits("FAR", 0.5, 100..110),
                ],
                0.7,
            )
            .unwrap();
        let identities: Vec<&str> = population
            .traces()
            .iter()
            .map(|t| t.target().identity())
            .collect();
        assert_eq!(identities, vec!["HIGH", "FAR"]);
        assert_eq!(report.too_similar, 1);
    }

    #[test]
    fn identity_duplicates_keep_the_best_ranked_copy() {
        let mut population = pool(5, 0.2);
        population.merge(vec![trace("A", 1.0, 0)], 1.0).unwrap();
        let report = population
            .merge(vec![trace("A", 3.0, 0), trace("A", 2.0, 0)], 1.0)
            .unwrap();
        assert_eq!(population.len(), 1);
        assert_eq!(scores(&population), vec![3.0]);
        assert_eq!(report.duplicates, 2);
        assert_eq!(tags(&population), vec![ClassificationTag::Valid]);
    }

    #[test]
    fn empty_merge_is_idempotent() {
        let mut population = pool(4, 0.5);
        population
            .merge(vec![trace("A", 3.0, 0), trace("B", 2.0, 1), trace("C", 1.0, 2)], 0.5)
            .unwrap();
        let before: Vec<_> = population.traces().to_vec();
        let before_tags = tags(&population);

        let report = population.merge(Vec::new(), 0.5).unwrap();
        assert_eq!(population.traces(), before.as_slice());
        assert_eq!(tags(&population), before_tags);
        assert_eq!(report.offered, 0);
        assert_eq!(report.retained, 3);
    }

    #[test]
    fn tags_are_sticky_across_many_merges() {
        let mut population = pool(6, 0.34);
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen: Vec<(String, ClassificationTag)> = Vec::new();
        let mut merged = 0;

        for round in 0..8 {
            let mut batch: Vec<_> = (0..4)
                .map(|i| {
                    let block = round * 4 + i;
                    trace(&format!("R{round}I{i}"), rng.r#gen::<f64>(), block % 32)
                })
                .collect();
            if let Some(retained) = population.traces().get(round % population.len().max(1)) {
                let resubmitted = retained.target();
                batch.push(OptimizationTrace::new(CandidateRecord::from_parts(
                    resubmitted.identity(),
                    resubmitted.score(),
                    resubmitted.fingerprint().clone(),
                )));
            }
            if population.merge(batch, 0.5).is_err() {
                continue;
            }
            merged += 1;
            assert_invariants(&population, 0.5);
            for trace in population.traces() {
                if let Some((_, tag)) = seen.iter().find(|(id, _)| id == trace.target().identity()) {
                    assert_eq!(*tag, trace.tag(), "{}", trace.target().identity());
                }
            }
            seen = population
                .traces()
                .iter()
                .map(|t| (t.target().identity().to_string(), t.tag()))
                .collect();
        }
        assert!(merged >= 4, "only {merged} of 8 merges succeeded");
    }

    #[test]
    fn equal_score_resubmission_keeps_the_retained_trace() {
        use ClassificationTag::{Train, Valid};
        let mut population = pool(4, 0.25);
        population
            .merge(vec![trace("A", 5.0, 0), trace("B", 4.0, 1), trace("C", 3.0, 2)], 0.9)
            .unwrap();
        assert_eq!(tags(&population), vec![Valid, Train, Train]);

        let mut retained_a = population.traces()[0].clone();
        retained_a.push_context(CandidateRecord::from_parts(
            "CTX",
            Some(1.0),
            Fingerprint::from_indices(WIDTH, 250..256),
        ));
        population.traces[0] = retained_a;

        let report = population
            .merge(vec![trace("D", 6.0, 3), trace("A", 5.0, 0)], 0.9)
            .unwrap();
        let entries: Vec<(&str, ClassificationTag)> = population
            .traces()
            .iter()
            .map(|t| (t.target().identity(), t.tag()))
            .collect();
        assert_eq!(entries, vec![("D", Train), ("A", Valid), ("B", Train), ("C", Train)]);
        assert_eq!(population.traces()[1].context().len(), 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.newly_train, 1);
        assert_eq!(report.newly_valid, 0);
    }

    #[test]
    fn elitism_keeps_the_best_trace() {
        let mut population = pool(3, 0.34);
        population.merge(vec![trace("BEST", 10.0, 0)], 0.5).unwrap();
        for i in 1..6 {
            population
                .merge(vec![trace(&format!("W{i}"), i as f64, i)], 0.5)
                .unwrap();
            assert_eq!(population.best().unwrap().target().identity(), "BEST");
        }
    }

    #[test]
    fn quota_larger_than_population_saturates() {
        let mut population = pool(4, 1.0);
        population
            .merge(vec![trace("A", 2.0, 0), trace("B", 1.0, 1)], 0.5)
            .unwrap();
        let (train, valid) = population.split().unwrap();
        assert!(train.is_empty());
        assert_eq!(valid.len(), 2);
    }

    #[test]
    fn merge_that_cannot_refill_the_quota_is_rejected_atomically() {
        let mut population = pool(4, 0.5);
        population
            .merge(
                vec![
                    trace_with_bits("A", 4.0, 0..10),
                    trace_with_bits("B", 3.0, 10..20),
                    trace_with_bits("C", 2.0, 40..50),
                    trace_with_bits("D", 1.0, 60..70),
                ],
                0.4,
            )
            .unwrap();
        assert_eq!(
            tags(&population),
            vec![
                ClassificationTag::Valid,
                ClassificationTag::Valid,
                ClassificationTag::Train,
                ClassificationTag::Train
            ]
        );
        let before = population.traces().to_vec();

        let result = population.merge(vec![trace_with_bits("U", 9.0, 0..20)], 0.4);
        assert!(matches!(result, Err(EngineError::InconsistentState(_))));
        assert_eq!(population.traces(), before.as_slice());
        assert_eq!(population.traces()[0].tag(), ClassificationTag::Valid);
    }

    #[test]
    fn merge_rejects_pretagged_traces_and_nan_threshold() {
        let mut population = pool(3, 0.34);
        let tagged = trace("A", 1.0, 0).with_tag(ClassificationTag::Train);
        assert!(matches!(
            population.merge(vec![tagged], 0.5),
            Err(EngineError::PreassignedTag { .. })
        ));
        assert!(matches!(
            population.merge(vec![trace("A", 1.0, 0)], f64::NAN),
            Err(EngineError::InvalidThreshold(_))
        ));
        assert!(population.is_empty());
    }

    #[test]
    fn split_rejects_untagged_traces() {
        let population = PopulationManager {
            capacity: 2,
            validation_quota: 0,
            traces: vec![trace("A", 1.0, 0)],
        };
        assert!(matches!(
            population.split(),
            Err(EngineError::InconsistentState(_))
        ));
    }

    #[test]
    fn split_rejects_wrong_valid_count() {
        let population = PopulationManager {
            capacity: 2,
            validation_quota: 1,
            traces: vec![trace("A", 1.0, 0).with_tag(ClassificationTag::Train)],
        };
        assert!(matches!(
            population.split(),
            Err(EngineError::InconsistentState(_))
        ));
    }

    #[test]
    fn sample_returns_distinct_traces_up_to_population_size() {
        let mut population = pool(10, 0.2);
        population
            .merge((0..6).map(|i| trace(&format!("S{i}"), i as f64, i)).collect(), 0.5)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let picked = population.sample(4, &mut rng);
        assert_eq!(picked.len(), 4);
        let unique: HashSet<&str> = picked.iter().map(|t| t.target().identity()).collect();
        assert_eq!(unique.len(), 4);

        assert_eq!(population.sample(50, &mut rng).len(), 6);
        assert!(pool(3, 0.0).sample(2, &mut rng).is_empty());
    }

    #[test]
    fn sample_is_reproducible_for_a_given_seed() {
        let mut population = pool(10, 0.2);
        population
            .merge((0..8).map(|i| trace(&format!("S{i}"), i as f64, i)).collect(), 0.5)
            .unwrap();
        let identities = |seed: u64| -> Vec<Vec<String>> {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..5)
                .map(|_| {
                    population
                        .sample(3, &mut rng)
                        .iter()
                        .map(|t| t.target().identity().to_string())
                        .collect()
                })
                .collect()
        };
        assert_eq!(identities(11), identities(11));
        assert_ne!(identities(11), identities(12));
    }
}

//! Second evaluation consistency gate.

use crate::schema::{EvaluationConfig, Measure};

use super::{BestTracker, FitnessCache, FitnessRecord, Genotype, Phenotype};

/// Requires a candidate to also improve under an independent fold split
/// before it can become the externally visible best.
///
/// Keeps its own cache and tracker, keyed like the primary ones. The order
/// of checks is: the primary value must beat the primary best, then the
/// secondary evaluation must beat the secondary best, and only then is the
/// candidate offered to the primary tracker.
#[derive(Debug)]
pub struct SecondEvaluationGate<M> {
    evaluation: EvaluationConfig,
    cache: FitnessCache,
    tracker: BestTracker<M>,
}

impl<M: Clone> SecondEvaluationGate<M> {
    pub fn new(evaluation: EvaluationConfig, measure: Measure) -> Self {
        Self {
            evaluation,
            cache: FitnessCache::new(),
            tracker: BestTracker::new(measure),
        }
    }

    /// Fold count and seed of the secondary evaluation.
    pub fn evaluation(&self) -> EvaluationConfig {
        self.evaluation
    }

    /// Best adjusted fitness seen by the secondary evaluation.
    pub fn secondary_best(&self) -> f64 {
        self.tracker.best_fitness()
    }

    pub fn secondary_cache(&self) -> &FitnessCache {
        &self.cache
    }

    pub fn reset(&self) {
        self.cache.clear();
        self.tracker.reset();
    }

    /// Offer a primary result through the gate.
    ///
    /// `evaluate` runs the secondary evaluation on a cache miss. Returns true
    /// only when the primary tracker accepted the candidate.
    pub fn offer<F>(
        &self,
        primary: &BestTracker<M>,
        raw: f64,
        genotype: &Genotype,
        phenotype: &Phenotype<M>,
        evaluate: F,
    ) -> bool
    where
        F: FnOnce(&Phenotype<M>, EvaluationConfig) -> FitnessRecord,
    {
        if !primary.would_improve(raw) {
            return false;
        }

        let key = genotype.key();
        let (record, _) = self
            .cache
            .get_or_evaluate(&key, || evaluate(phenotype, self.evaluation));
        let Some(second) = record.raw() else {
            log::info!("Second evaluation of {key} failed");
            return false;
        };

        if !self.tracker.offer(second, genotype, phenotype) {
            log::info!(
                "Second evaluation of {key} not better: {}",
                self.tracker.measure().adjust(second)
            );
            return false;
        }
        log::info!(
            "Second evaluation of {key} also better: {}",
            self.tracker.measure().adjust(second)
        );

        primary.offer(raw, genotype, phenotype)
    }
}

//! Thread-safe best solution bookkeeping.

use std::sync::{Mutex, MutexGuard};

use crate::schema::Measure;

use super::{Genotype, Phenotype};

/// The current champion of a run.
#[derive(Debug, Clone)]
pub struct BestSolution<M> {
    pub raw: f64,
    pub adjusted: f64,
    pub genotype: Genotype,
    pub phenotype: Phenotype<M>,
}

#[derive(Debug)]
struct BestState<M> {
    adjusted: f64,
    solution: Option<BestSolution<M>>,
}

/// Replace-if-better holder of the best adjusted fitness.
///
/// Starts at negative infinity. Only a strictly larger adjusted fitness
/// replaces the current best, so ties never count as an improvement.
#[derive(Debug)]
pub struct BestTracker<M> {
    measure: Measure,
    state: Mutex<BestState<M>>,
}

impl<M: Clone> BestTracker<M> {
    pub fn new(measure: Measure) -> Self {
        Self {
            measure,
            state: Mutex::new(BestState {
                adjusted: f64::NEG_INFINITY,
                solution: None,
            }),
        }
    }

    pub fn measure(&self) -> Measure {
        self.measure
    }

    /// Whether `raw` would currently beat the best, without recording it.
    pub fn would_improve(&self, raw: f64) -> bool {
        self.measure.adjust(raw) > self.lock().adjusted
    }

    /// Offer a raw fitness; returns true if it became the new best.
    pub fn offer(&self, raw: f64, genotype: &Genotype, phenotype: &Phenotype<M>) -> bool {
        let adjusted = self.measure.adjust(raw);
        let mut state = self.lock();
        if adjusted.is_nan() || adjusted <= state.adjusted {
            return false;
        }
        state.adjusted = adjusted;
        state.solution = Some(BestSolution {
            raw,
            adjusted,
            genotype: genotype.clone(),
            phenotype: phenotype.clone(),
        });
        true
    }

    /// Best adjusted fitness so far (negative infinity before any offer).
    pub fn best_fitness(&self) -> f64 {
        self.lock().adjusted
    }

    pub fn best(&self) -> Option<BestSolution<M>> {
        self.lock().solution.clone()
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.adjusted = f64::NEG_INFINITY;
        state.solution = None;
    }

    fn lock(&self) -> MutexGuard<'_, BestState<M>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

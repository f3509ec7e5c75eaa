//! Fitness memoization for one search run.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::schema::Measure;

/// Outcome of evaluating one genotype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitnessRecord {
    /// Raw measure value as returned by the evaluator.
    Valid(f64),
    /// Decoding or evaluation failed; the genotype never competes.
    Invalid,
}

impl FitnessRecord {
    pub fn raw(&self) -> Option<f64> {
        match self {
            FitnessRecord::Valid(v) => Some(*v),
            FitnessRecord::Invalid => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, FitnessRecord::Valid(_))
    }

    /// Higher-is-better fitness; negative infinity for failed evaluations.
    pub fn adjusted(&self, measure: Measure) -> f64 {
        match self {
            FitnessRecord::Valid(v) => measure.adjust(*v),
            FitnessRecord::Invalid => f64::NEG_INFINITY,
        }
    }
}

/// Genotype key to fitness record map shared by the evaluation jobs.
#[derive(Debug, Default)]
pub struct FitnessCache {
    entries: Mutex<HashMap<String, FitnessRecord>>,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<FitnessRecord> {
        self.lock().get(key).copied()
    }

    /// Store a record. An existing record for the key is kept.
    pub fn put(&self, key: String, record: FitnessRecord) {
        self.lock().entry(key).or_insert(record);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy of every stored record.
    pub fn records(&self) -> Vec<(String, FitnessRecord)> {
        self.lock()
            .iter()
            .map(|(k, r)| (k.clone(), *r))
            .collect()
    }

    /// Look the key up, evaluating and storing it on a miss.
    ///
    /// The lock is not held while `evaluate` runs. Returns the record and
    /// whether it came from the cache.
    pub fn get_or_evaluate<F>(&self, key: &str, evaluate: F) -> (FitnessRecord, bool)
    where
        F: FnOnce() -> FitnessRecord,
    {
        if let Some(record) = self.get(key) {
            log::debug!("{key} already present");
            return (record, true);
        }
        let record = evaluate();
        self.put(key.to_string(), record);
        (record, false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FitnessRecord>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_hit_skips_evaluation() {
        let cache = FitnessCache::new();
        let calls = AtomicUsize::new(0);
        let eval = || {
            calls.fetch_add(1, Ordering::SeqCst);
            FitnessRecord::Valid(0.5)
        };

        assert_eq!(cache.get_or_evaluate("0101", eval), (FitnessRecord::Valid(0.5), false));
        assert_eq!(cache.get_or_evaluate("0101", eval), (FitnessRecord::Valid(0.5), true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalid_records_are_cached() {
        let cache = FitnessCache::new();
        cache.put("11".into(), FitnessRecord::Invalid);
        let (record, hit) = cache.get_or_evaluate("11", || FitnessRecord::Valid(1.0));
        assert!(hit);
        assert!(!record.is_valid());
        assert_eq!(record.adjusted(Measure::Accuracy), f64::NEG_INFINITY);
    }

    #[test]
    fn test_first_record_wins() {
        let cache = FitnessCache::new();
        cache.put("1".into(), FitnessRecord::Valid(1.0));
        cache.put("1".into(), FitnessRecord::Valid(2.0));
        assert_eq!(cache.get("1"), Some(FitnessRecord::Valid(1.0)));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_adjusted_polarity() {
        let record = FitnessRecord::Valid(0.25);
        assert_eq!(record.adjusted(Measure::MeanAbsoluteError), -0.25);
        assert_eq!(record.adjusted(Measure::CorrelationCoefficient), 0.25);
    }
}

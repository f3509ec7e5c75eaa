//! k-fold cross-validation and measure extraction.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::schema::{ClassKind, Dataset, Measure};

use super::models::{Model, ModelError, Prediction};

/// Reasons a single evaluation can fail.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluationError {
    #[error("Cannot split {rows} rows into {folds} folds")]
    InvalidFolds { folds: usize, rows: usize },
    #[error("Model failure: {0}")]
    Model(#[from] ModelError),
    #[error("Prediction does not match the class type")]
    PredictionMismatch,
    #[error("Measure {0} is undefined for this evaluation")]
    Degenerate(Measure),
    #[error("Evaluator returned non-finite value {0}")]
    NonFinite(f64),
    #[error("{0}")]
    Other(String),
}

/// The model evaluator capability: fit and score a configuration under
/// cross-validation, yielding the raw value of one measure.
pub trait ModelEvaluator<M: Model>: Send + Sync {
    fn evaluate(
        &self,
        model: &M,
        data: &Dataset,
        measure: Measure,
        folds: usize,
        seed: u64,
    ) -> Result<f64, EvaluationError>;
}

/// Assign rows to test folds.
///
/// Rows are shuffled with a seeded RNG; for a nominal class they are then
/// grouped by label before being dealt round-robin, which stratifies the folds.
pub fn fold_assignments(
    data: &Dataset,
    folds: usize,
    seed: u64,
) -> Result<Vec<Vec<usize>>, EvaluationError> {
    let rows = data.num_rows();
    if folds < 2 || folds > rows {
        return Err(EvaluationError::InvalidFolds { folds, rows });
    }

    let mut order: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    if let Ok(ClassKind::Nominal { .. }) = data.class_kind() {
        let class = data.class_index().map_err(ModelError::from)?;
        // stable: keeps the shuffled order inside each label
        order.sort_by(|&a, &b| data.rows[a][class].total_cmp(&data.rows[b][class]));
    }

    let mut out = vec![Vec::new(); folds];
    for (i, row) in order.into_iter().enumerate() {
        out[i % folds].push(row);
    }
    Ok(out)
}

/// Accumulated prediction statistics over all test folds.
#[derive(Debug, Clone, Default)]
pub struct EvaluationStats {
    count: usize,
    correct: usize,
    num_labels: usize,
    sum_abs_err: f64,
    sum_sq_err: f64,
    sum_prior_abs_err: f64,
    sum_prior_sq_err: f64,
    // numeric-only moments for the correlation coefficient
    sum_actual: f64,
    sum_predicted: f64,
    sum_actual_sq: f64,
    sum_predicted_sq: f64,
    sum_cross: f64,
}

impl EvaluationStats {
    /// Record one numeric prediction; `prior` is the training-fold class mean.
    pub fn add_numeric(&mut self, actual: f64, predicted: f64, prior: f64) {
        let err = predicted - actual;
        let prior_err = prior - actual;
        self.count += 1;
        self.sum_abs_err += err.abs();
        self.sum_sq_err += err * err;
        self.sum_prior_abs_err += prior_err.abs();
        self.sum_prior_sq_err += prior_err * prior_err;
        self.sum_actual += actual;
        self.sum_predicted += predicted;
        self.sum_actual_sq += actual * actual;
        self.sum_predicted_sq += predicted * predicted;
        self.sum_cross += actual * predicted;
    }

    /// Record one nominal prediction as a distribution over labels.
    pub fn add_nominal(&mut self, actual: usize, predicted: &[f64], prior: &[f64]) {
        let k = predicted.len();
        self.num_labels = k;
        self.count += 1;

        let (mut abs, mut sq, mut prior_abs, mut prior_sq) = (0.0, 0.0, 0.0, 0.0);
        for label in 0..k {
            let target = if label == actual { 1.0 } else { 0.0 };
            let e = predicted[label] - target;
            let p = prior.get(label).copied().unwrap_or(0.0) - target;
            abs += e.abs();
            sq += e * e;
            prior_abs += p.abs();
            prior_sq += p * p;
        }
        let k = k.max(1) as f64;
        self.sum_abs_err += abs / k;
        self.sum_sq_err += sq / k;
        self.sum_prior_abs_err += prior_abs / k;
        self.sum_prior_sq_err += prior_sq / k;

        let best = predicted
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        if best == Some(actual) {
            self.correct += 1;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Raw value of a measure.
    pub fn value(&self, measure: Measure) -> Result<f64, EvaluationError> {
        if self.count == 0 {
            return Err(EvaluationError::Degenerate(measure));
        }
        let n = self.count as f64;
        let value = match measure {
            Measure::Accuracy => 100.0 * self.correct as f64 / n,
            Measure::MeanAbsoluteError => self.sum_abs_err / n,
            Measure::RootMeanSquaredError => (self.sum_sq_err / n).sqrt(),
            Measure::RelativeAbsoluteError => {
                if self.sum_prior_abs_err <= 0.0 {
                    return Err(EvaluationError::Degenerate(measure));
                }
                100.0 * self.sum_abs_err / self.sum_prior_abs_err
            }
            Measure::RootRelativeSquaredError => {
                if self.sum_prior_sq_err <= 0.0 {
                    return Err(EvaluationError::Degenerate(measure));
                }
                100.0 * (self.sum_sq_err / self.sum_prior_sq_err).sqrt()
            }
            Measure::CorrelationCoefficient => {
                let var_a = self.sum_actual_sq - self.sum_actual * self.sum_actual / n;
                let var_p = self.sum_predicted_sq - self.sum_predicted * self.sum_predicted / n;
                let cov = self.sum_cross - self.sum_actual * self.sum_predicted / n;
                if var_a <= 0.0 || var_p <= 0.0 {
                    return Err(EvaluationError::Degenerate(measure));
                }
                cov / (var_a * var_p).sqrt()
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvaluationError::NonFinite(value))
        }
    }
}

/// Default evaluator: stratified k-fold cross-validation, run sequentially
/// inside the calling worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossValidator;

impl CrossValidator {
    /// Run the cross-validation and return the full statistics.
    pub fn run<M: Model>(
        &self,
        model: &M,
        data: &Dataset,
        folds: usize,
        seed: u64,
    ) -> Result<EvaluationStats, EvaluationError> {
        let assignments = fold_assignments(data, folds, seed)?;
        let class = data.class_index().map_err(ModelError::from)?;
        let kind = data.class_kind().map_err(ModelError::from)?;
        let mut stats = EvaluationStats::default();

        for (f, test) in assignments.iter().enumerate() {
            let train: Vec<usize> = assignments
                .iter()
                .enumerate()
                .filter(|(g, _)| *g != f)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();

            let mut fitted = model.clone();
            fitted.fit(data, &train)?;

            match &kind {
                ClassKind::Numeric => {
                    let prior =
                        train.iter().map(|&r| data.rows[r][class]).sum::<f64>() / train.len() as f64;
                    for &row in test {
                        match fitted.predict(data, row)? {
                            Prediction::Value(v) => {
                                stats.add_numeric(data.rows[row][class], v, prior)
                            }
                            Prediction::Distribution(_) => {
                                return Err(EvaluationError::PredictionMismatch);
                            }
                        }
                    }
                }
                ClassKind::Nominal { labels } => {
                    let mut prior = vec![1.0; labels.len()];
                    for &r in &train {
                        prior[data.rows[r][class] as usize] += 1.0;
                    }
                    let total: f64 = prior.iter().sum();
                    prior.iter_mut().for_each(|p| *p /= total);

                    for &row in test {
                        match fitted.predict(data, row)? {
                            Prediction::Distribution(d) if d.len() == labels.len() => {
                                stats.add_nominal(data.rows[row][class] as usize, &d, &prior)
                            }
                            _ => return Err(EvaluationError::PredictionMismatch),
                        }
                    }
                }
            }
        }
        Ok(stats)
    }
}

impl<M: Model> ModelEvaluator<M> for CrossValidator {
    fn evaluate(
        &self,
        model: &M,
        data: &Dataset,
        measure: Measure,
        folds: usize,
        seed: u64,
    ) -> Result<f64, EvaluationError> {
        self.run(model, data, folds, seed)?.value(measure)
    }
}

//! Predictive models that can be tuned and cross-validated.
//!
//! A [`Model`] is the configuration collaborator of the search: it can be
//! cloned, have named tunables set from decoded genotype bits, and be fitted
//! on a subset of rows before predicting the held-out ones.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{AttributeKind, ClassKind, ConfigError, Dataset};

/// A primitive value applied to a named tunable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Real(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

/// Output of a model for a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Numeric class prediction.
    Value(f64),
    /// Probability per nominal class label.
    Distribution(Vec<f64>),
}

/// Errors raised while configuring, fitting or applying a model.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,
    #[error("Cannot fit on an empty set of rows")]
    EmptyTrainingSet,
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Dataset problems surfaced while fitting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct DataError(pub String);

impl From<ConfigError> for ModelError {
    fn from(err: ConfigError) -> Self {
        ModelError::Data(DataError(err.to_string()))
    }
}

/// The configuration collaborator: clone, tune, fit, predict.
pub trait Model: Clone + Send + Sync + fmt::Debug {
    /// Train on the given rows.
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<(), ModelError>;

    /// Predict the class of one row.
    fn predict(&self, data: &Dataset, row: usize) -> Result<Prediction, ModelError>;

    /// Apply a value to a named tunable.
    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError>;

    /// Current value of a named tunable, if the model has it.
    fn parameter(&self, name: &str) -> Option<ParamValue>;

    /// Human-readable setup, used in setup records.
    fn describe(&self) -> String;
}

fn invalid(name: &str, value: &ParamValue) -> ModelError {
    ModelError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// Class prior learned from the training rows.
#[derive(Debug, Clone, PartialEq)]
enum Prior {
    Mean(f64),
    Distribution(Vec<f64>),
}

fn learn_prior(data: &Dataset, rows: &[usize]) -> Result<Prior, ModelError> {
    if rows.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    let class = data.class_index()?;
    Ok(match data.class_kind()? {
        ClassKind::Numeric => {
            let sum: f64 = rows.iter().map(|&r| data.rows[r][class]).sum();
            Prior::Mean(sum / rows.len() as f64)
        }
        ClassKind::Nominal { labels } => {
            // Laplace-corrected counts
            let mut counts = vec![1.0; labels.len()];
            for &r in rows {
                counts[data.rows[r][class] as usize] += 1.0;
            }
            let total: f64 = counts.iter().sum();
            Prior::Distribution(counts.into_iter().map(|c| c / total).collect())
        }
    })
}

/// Predicts the training prior: the class mean or the class distribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeroR {
    #[serde(skip)]
    prior: Option<Prior>,
}

impl Model for ZeroR {
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<(), ModelError> {
        self.prior = Some(learn_prior(data, rows)?);
        Ok(())
    }

    fn predict(&self, _data: &Dataset, _row: usize) -> Result<Prediction, ModelError> {
        match &self.prior {
            Some(Prior::Mean(m)) => Ok(Prediction::Value(*m)),
            Some(Prior::Distribution(d)) => Ok(Prediction::Distribution(d.clone())),
            None => Err(ModelError::NotFitted),
        }
    }

    fn set_parameter(&mut self, name: &str, _value: &ParamValue) -> Result<(), ModelError> {
        Err(ModelError::UnknownParameter(name.to_string()))
    }

    fn parameter(&self, _name: &str) -> Option<ParamValue> {
        None
    }

    fn describe(&self) -> String {
        "ZeroR".to_string()
    }
}

/// Neighbour vote weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    #[default]
    None,
    /// Weight by 1 / distance.
    Inverse,
    /// Weight by 1 - distance.
    Similarity,
}

impl Weighting {
    fn name(self) -> &'static str {
        match self {
            Weighting::None => "none",
            Weighting::Inverse => "inverse",
            Weighting::Similarity => "similarity",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Weighting::None),
            "inverse" => Some(Weighting::Inverse),
            "similarity" => Some(Weighting::Similarity),
            _ => None,
        }
    }

    fn weight(self, distance: f64) -> f64 {
        match self {
            Weighting::None => 1.0,
            Weighting::Inverse => 1.0 / (distance + 1e-6),
            Weighting::Similarity => (1.0 - distance).max(1e-6),
        }
    }
}

/// k-nearest-neighbour learner over the non-class attributes.
///
/// Tunables: `k` (integer >= 1), `weighting` (`none`/`inverse`/`similarity`),
/// `normalize` (scale numeric attributes to [0, 1]) and `exponent`
/// (Minkowski power, > 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearestNeighbors {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub weighting: Weighting,
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    #[serde(default = "default_exponent")]
    pub exponent: f64,
    #[serde(skip)]
    fitted: Option<NeighborIndex>,
}

fn default_k() -> usize {
    1
}
fn default_normalize() -> bool {
    true
}
fn default_exponent() -> f64 {
    2.0
}

impl Default for NearestNeighbors {
    fn default() -> Self {
        Self {
            k: default_k(),
            weighting: Weighting::default(),
            normalize: default_normalize(),
            exponent: default_exponent(),
            fitted: None,
        }
    }
}

#[derive(Debug, Clone)]
struct NeighborIndex {
    rows: Vec<usize>,
    features: Vec<usize>,
    /// (min, max) per feature; `None` for nominal features.
    ranges: Vec<Option<(f64, f64)>>,
    class: usize,
    kind: ClassKind,
}

impl NearestNeighbors {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    fn distance(&self, index: &NeighborIndex, data: &Dataset, a: usize, b: usize) -> f64 {
        let mut total = 0.0;
        for (f, range) in index.features.iter().zip(&index.ranges) {
            let (x, y) = (data.rows[a][*f], data.rows[b][*f]);
            let diff = match range {
                None => {
                    if x == y {
                        0.0
                    } else {
                        1.0
                    }
                }
                Some((lo, hi)) if self.normalize => {
                    let span = hi - lo;
                    if span > 0.0 { (x - y).abs() / span } else { 0.0 }
                }
                Some(_) => (x - y).abs(),
            };
            total += diff.powf(self.exponent);
        }
        total.powf(1.0 / self.exponent)
    }
}

impl Model for NearestNeighbors {
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<(), ModelError> {
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        let class = data.class_index()?;
        let kind = data.class_kind()?;
        let features = data.feature_indices();
        let ranges = features
            .iter()
            .map(|&f| match data.attributes[f].kind {
                AttributeKind::Nominal { .. } => None,
                AttributeKind::Numeric => {
                    let (lo, hi) = rows.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &r| {
                        let v = data.rows[r][f];
                        (lo.min(v), hi.max(v))
                    });
                    Some((lo, hi))
                }
            })
            .collect();

        self.fitted = Some(NeighborIndex {
            rows: rows.to_vec(),
            features,
            ranges,
            class,
            kind,
        });
        Ok(())
    }

    fn predict(&self, data: &Dataset, row: usize) -> Result<Prediction, ModelError> {
        let index = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;

        let mut neighbors: Vec<(f64, usize)> = index
            .rows
            .iter()
            .map(|&r| (self.distance(index, data, row, r), r))
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0));
        neighbors.truncate(self.k.max(1));

        match &index.kind {
            ClassKind::Numeric => {
                let (mut sum, mut weights) = (0.0, 0.0);
                for (d, r) in &neighbors {
                    let w = self.weighting.weight(*d);
                    sum += w * data.rows[*r][index.class];
                    weights += w;
                }
                Ok(Prediction::Value(sum / weights))
            }
            ClassKind::Nominal { labels } => {
                let mut votes = vec![0.0; labels.len()];
                for (d, r) in &neighbors {
                    votes[data.rows[*r][index.class] as usize] += self.weighting.weight(*d);
                }
                let total: f64 = votes.iter().sum();
                Ok(Prediction::Distribution(
                    votes.into_iter().map(|v| v / total).collect(),
                ))
            }
        }
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        match (name, value) {
            ("k", ParamValue::Int(k)) if *k >= 1 => self.k = *k as usize,
            ("weighting", ParamValue::Text(s)) => {
                self.weighting = Weighting::parse(s).ok_or_else(|| invalid(name, value))?;
            }
            ("normalize", ParamValue::Bool(b)) => self.normalize = *b,
            ("exponent", ParamValue::Real(p)) if *p > 0.0 => self.exponent = *p,
            ("k" | "weighting" | "normalize" | "exponent", _) => return Err(invalid(name, value)),
            _ => return Err(ModelError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "k" => Some(ParamValue::Int(self.k as i64)),
            "weighting" => Some(ParamValue::Text(self.weighting.name().to_string())),
            "normalize" => Some(ParamValue::Bool(self.normalize)),
            "exponent" => Some(ParamValue::Real(self.exponent)),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        format!(
            "NearestNeighbors -K {} -W {} -N {} -P {}",
            self.k,
            self.weighting.name(),
            self.normalize,
            self.exponent
        )
    }
}

/// Built-in models selectable from a job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ModelKind {
    ZeroR(ZeroR),
    NearestNeighbors(NearestNeighbors),
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::ZeroR(ZeroR::default())
    }
}

impl Model for ModelKind {
    fn fit(&mut self, data: &Dataset, rows: &[usize]) -> Result<(), ModelError> {
        match self {
            ModelKind::ZeroR(m) => m.fit(data, rows),
            ModelKind::NearestNeighbors(m) => m.fit(data, rows),
        }
    }

    fn predict(&self, data: &Dataset, row: usize) -> Result<Prediction, ModelError> {
        match self {
            ModelKind::ZeroR(m) => m.predict(data, row),
            ModelKind::NearestNeighbors(m) => m.predict(data, row),
        }
    }

    fn set_parameter(&mut self, name: &str, value: &ParamValue) -> Result<(), ModelError> {
        match self {
            ModelKind::ZeroR(m) => m.set_parameter(name, value),
            ModelKind::NearestNeighbors(m) => m.set_parameter(name, value),
        }
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match self {
            ModelKind::ZeroR(m) => m.parameter(name),
            ModelKind::NearestNeighbors(m) => m.parameter(name),
        }
    }

    fn describe(&self) -> String {
        match self {
            ModelKind::ZeroR(m) => m.describe(),
            ModelKind::NearestNeighbors(m) => m.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, ClassIndex};

    fn numeric() -> Dataset {
        Dataset::new(
            "line",
            vec![Attribute::numeric("x"), Attribute::numeric("y")],
            vec![
                vec![0.0, 0.0],
                vec![1.0, 10.0],
                vec![2.0, 20.0],
                vec![10.0, 100.0],
            ],
            ClassIndex::Last,
        )
        .unwrap()
    }

    fn nominal() -> Dataset {
        Dataset::new(
            "blobs",
            vec![
                Attribute::numeric("x"),
                Attribute::nominal("class", vec!["left", "right"]),
            ],
            vec![
                vec![0.0, 0.0],
                vec![0.1, 0.0],
                vec![0.9, 1.0],
                vec![1.0, 1.0],
                vec![0.95, 1.0],
            ],
            ClassIndex::Last,
        )
        .unwrap()
    }

    #[test]
    fn test_zeror_numeric_mean() {
        let data = numeric();
        let mut model = ZeroR::default();
        assert!(matches!(model.predict(&data, 0), Err(ModelError::NotFitted)));
        model.fit(&data, &[0, 1, 2]).unwrap();
        assert_eq!(model.predict(&data, 3).unwrap(), Prediction::Value(10.0));
    }

    #[test]
    fn test_zeror_nominal_distribution() {
        let data = nominal();
        let mut model = ZeroR::default();
        model.fit(&data, &[0, 2, 3]).unwrap();
        // counts (1+1, 1+2) / 5
        assert_eq!(
            model.predict(&data, 1).unwrap(),
            Prediction::Distribution(vec![0.4, 0.6])
        );
    }

    #[test]
    fn test_knn_picks_nearest() {
        let data = nominal();
        let mut model = NearestNeighbors::new(1);
        model.fit(&data, &[0, 2, 3]).unwrap();
        assert_eq!(
            model.predict(&data, 1).unwrap(),
            Prediction::Distribution(vec![1.0, 0.0])
        );
        assert_eq!(
            model.predict(&data, 4).unwrap(),
            Prediction::Distribution(vec![0.0, 1.0])
        );
    }

    #[test]
    fn test_knn_numeric_average() {
        let data = numeric();
        let mut model = NearestNeighbors::new(2);
        model.fit(&data, &[0, 1, 2]).unwrap();
        // neighbours of x=10 are x=2 and x=1
        assert_eq!(model.predict(&data, 3).unwrap(), Prediction::Value(15.0));
    }

    #[test]
    fn test_parameters() {
        let mut model = ModelKind::NearestNeighbors(NearestNeighbors::default());
        model.set_parameter("k", &ParamValue::Int(5)).unwrap();
        model
            .set_parameter("weighting", &ParamValue::Text("inverse".into()))
            .unwrap();
        assert_eq!(model.parameter("k"), Some(ParamValue::Int(5)));
        assert_eq!(
            model.parameter("weighting"),
            Some(ParamValue::Text("inverse".into()))
        );
        assert!(matches!(
            model.set_parameter("k", &ParamValue::Int(0)),
            Err(ModelError::InvalidParameter { .. })
        ));
        assert!(matches!(
            model.set_parameter("depth", &ParamValue::Int(3)),
            Err(ModelError::UnknownParameter(_))
        ));
        assert!(model.describe().starts_with("NearestNeighbors -K 5"));
    }

    #[test]
    fn test_model_kind_json() {
        let model: ModelKind =
            serde_json::from_str(r#"{"type": "NearestNeighbors", "k": 3}"#).unwrap();
        assert_eq!(model.parameter("k"), Some(ParamValue::Int(3)));
        assert_eq!(model.parameter("normalize"), Some(ParamValue::Bool(true)));
    }
}

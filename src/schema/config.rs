//! Search configuration types and setup-time validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{Dataset, Measure};

/// Top-level configuration for one genetic search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Population and genotype settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Measure used as fitness.
    #[serde(default)]
    pub measure: Measure,
    /// Primary cross-validation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Optional consistency check with a second fold split.
    #[serde(default)]
    pub second_evaluation: SecondEvaluationConfig,
    /// Seconds between fitness notifications (-1 = never, 0 = every improvement).
    #[serde(default = "default_notification_interval")]
    pub notification_interval: i64,
    /// Worker threads; `None` uses all available cores.
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// When to stop iterating.
    #[serde(default)]
    pub stopping: StoppingConfig,
    /// Artifacts written on each confirmed improvement.
    #[serde(default)]
    pub output: OutputConfig,
    /// How genotypes are turned into model configurations.
    #[serde(default)]
    pub decoder: DecoderConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig::default(),
            measure: Measure::default(),
            evaluation: EvaluationConfig::default(),
            second_evaluation: SecondEvaluationConfig::default(),
            notification_interval: default_notification_interval(),
            num_threads: None,
            stopping: StoppingConfig::default(),
            output: OutputConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

fn default_notification_interval() -> i64 {
    -1
}

/// Population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of chromosomes.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Bits per attribute gene (attribute-mask mode).
    #[serde(default = "default_bits_per_gene")]
    pub bits_per_gene: usize,
    /// Seed for the population RNG.
    #[serde(default = "default_population_seed")]
    pub seed: u64,
    /// Bits (string of 0s and 1s) used instead of the first random bits.
    #[serde(default)]
    pub initial_weights: String,
    /// Complete genotypes placed at the start of the initial population.
    #[serde(default)]
    pub initial_setups: Vec<String>,
    /// Break fitness ties in favour of genotypes with fewer set bits.
    #[serde(default)]
    pub favor_zeroes: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            bits_per_gene: default_bits_per_gene(),
            seed: default_population_seed(),
            initial_weights: String::new(),
            initial_setups: Vec::new(),
            favor_zeroes: false,
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_bits_per_gene() -> usize {
    1
}
fn default_population_seed() -> u64 {
    1
}

/// Cross-validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_cv_seed")]
    pub seed: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            folds: default_folds(),
            seed: default_cv_seed(),
        }
    }
}

fn default_folds() -> usize {
    10
}
fn default_cv_seed() -> u64 {
    55
}

/// Second evaluation gate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondEvaluationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_folds")]
    pub folds: usize,
    #[serde(default = "default_second_seed")]
    pub seed: u64,
}

impl SecondEvaluationConfig {
    pub fn evaluation(&self) -> EvaluationConfig {
        EvaluationConfig {
            folds: self.folds,
            seed: self.seed,
        }
    }
}

impl Default for SecondEvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folds: default_folds(),
            seed: default_second_seed(),
        }
    }
}

fn default_second_seed() -> u64 {
    42
}

/// Stopping criterion selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoppingConfig {
    /// Stop after a fixed number of generations.
    MaxIterations { count: usize },
    /// Stop once the wall-clock budget is spent.
    MaxSeconds { seconds: f64 },
    /// Stop when the best fitness has not improved for this many generations.
    Stagnation { iterations: usize },
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self::MaxIterations { count: 50 }
    }
}

/// Which artifacts to write on an improvement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    #[default]
    None,
    /// Setup record only.
    Setup,
    /// Evaluation dataset only.
    Data,
    /// Both artifacts.
    All,
}

impl OutputKind {
    pub fn writes_setup(self) -> bool {
        matches!(self, OutputKind::Setup | OutputKind::All)
    }

    pub fn writes_data(self) -> bool {
        matches!(self, OutputKind::Data | OutputKind::All)
    }
}

/// Prefix used for artifact file names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPrefix {
    #[default]
    None,
    /// Use the dataset's relation name.
    Relation,
    Supplied(String),
}

/// Artifact output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Target directory; nothing is written when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub kind: OutputKind,
    #[serde(default)]
    pub prefix: OutputPrefix,
}

/// Genotype decoding strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum DecoderConfig {
    /// One gene per non-class attribute; zero excludes the attribute.
    #[default]
    AttributeMask,
    /// Bit ranges packed into tunable model parameters.
    PropertyPacking { handlers: Vec<ParameterSpec> },
}

/// A tunable model parameter bound to a slice of the genotype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParameterSpec {
    /// Integer in `[min, max]`, spread over `bits` bits.
    Integer {
        name: String,
        min: i64,
        max: i64,
        bits: usize,
    },
    /// Real in `[min, max]`, spread over `bits` bits.
    Real {
        name: String,
        min: f64,
        max: f64,
        bits: usize,
    },
    /// Single-bit flag.
    Boolean { name: String },
    /// One of a fixed list of options.
    Choice { name: String, options: Vec<String> },
}

/// Largest width a single parameter may claim.
pub const MAX_PARAMETER_BITS: usize = 31;

impl ParameterSpec {
    pub fn name(&self) -> &str {
        match self {
            ParameterSpec::Integer { name, .. }
            | ParameterSpec::Real { name, .. }
            | ParameterSpec::Boolean { name }
            | ParameterSpec::Choice { name, .. } => name,
        }
    }

    /// Number of genotype bits the parameter occupies.
    pub fn width(&self) -> usize {
        match self {
            ParameterSpec::Integer { bits, .. } | ParameterSpec::Real { bits, .. } => *bits,
            ParameterSpec::Boolean { .. } => 1,
            ParameterSpec::Choice { options, .. } => {
                let n = options.len();
                if n < 2 {
                    0
                } else {
                    (usize::BITS - (n - 1).leading_zeros()) as usize
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let width = self.width();
        if width == 0 || width > MAX_PARAMETER_BITS {
            return Err(ConfigError::InvalidParameterWidth {
                name: self.name().to_string(),
                width,
            });
        }
        let bad_bounds = match self {
            ParameterSpec::Integer { min, max, .. } => min > max,
            ParameterSpec::Real { min, max, .. } => min > max || min.is_nan() || max.is_nan(),
            _ => false,
        };
        if bad_bounds {
            return Err(ConfigError::InvalidParameterBounds(self.name().to_string()));
        }
        Ok(())
    }
}

/// Setup-time configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Measure '{measure}' cannot be used with a {class_kind} class attribute")]
    MeasureNotApplicable { measure: Measure, class_kind: String },
    #[error("Class index {index} out of range for {count} attributes")]
    ClassIndexOutOfRange { index: usize, count: usize },
    #[error("Dataset needs at least two attributes, found {0}")]
    TooFewAttributes(usize),
    #[error("Row {row} has {actual} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Row {row}: value {value} is not a valid label of attribute '{attribute}'")]
    InvalidNominalValue {
        row: usize,
        attribute: String,
        value: f64,
    },
    #[error("Fold count must be at least 2, got {0}")]
    InvalidFolds(usize),
    #[error("Fold count {folds} exceeds the {rows} available rows")]
    FoldsExceedRows { folds: usize, rows: usize },
    #[error("Population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),
    #[error("Bits per gene must be between 1 and 31, got {0}")]
    InvalidBitsPerGene(usize),
    #[error("Property packing works on single bits, got {0} bits per gene")]
    PackingBitsPerGene(usize),
    #[error("No tunable parameters given")]
    NoParameters,
    #[error("Parameter '{name}' has invalid width {width}")]
    InvalidParameterWidth { name: String, width: usize },
    #[error("Parameter '{0}' has min > max")]
    InvalidParameterBounds(String),
    #[error("Parameter '{0}' is listed more than once")]
    DuplicateParameter(String),
    #[error("Parameter '{name}' rejected by model: {reason}")]
    UnknownParameter { name: String, reason: String },
    #[error("Bit width mismatch: expected {expected} bits, got {actual}")]
    BitWidthMismatch { expected: usize, actual: usize },
    #[error("Invalid bit string '{0}' (only 0 and 1 allowed)")]
    InvalidBitString(String),
    #[error("Notification interval must be -1 or larger, got {0}")]
    InvalidNotificationInterval(i64),
    #[error("Invalid stopping criterion: {0}")]
    InvalidStopping(String),
}

fn is_bit_string(s: &str) -> bool {
    s.chars().all(|c| c == '0' || c == '1')
}

impl SearchConfig {
    /// Run every setup check that does not need a decoder.
    pub fn validate(&self, data: &Dataset) -> Result<(), ConfigError> {
        data.validate()?;
        self.measure.validate(data)?;

        check_folds(self.evaluation.folds, data)?;
        if self.second_evaluation.enabled {
            check_folds(self.second_evaluation.folds, data)?;
        }

        if self.population.size < 2 {
            return Err(ConfigError::PopulationTooSmall(self.population.size));
        }
        let bits = self.population.bits_per_gene;
        if bits == 0 || bits > MAX_PARAMETER_BITS {
            return Err(ConfigError::InvalidBitsPerGene(bits));
        }
        if !is_bit_string(&self.population.initial_weights) {
            return Err(ConfigError::InvalidBitString(
                self.population.initial_weights.clone(),
            ));
        }
        if let Some(bad) = self
            .population
            .initial_setups
            .iter()
            .find(|s| !is_bit_string(s))
        {
            return Err(ConfigError::InvalidBitString(bad.clone()));
        }

        if self.notification_interval < -1 {
            return Err(ConfigError::InvalidNotificationInterval(
                self.notification_interval,
            ));
        }

        match self.stopping {
            StoppingConfig::MaxIterations { count: 0 } => {
                return Err(ConfigError::InvalidStopping(
                    "maximum iterations must be positive".into(),
                ));
            }
            StoppingConfig::MaxSeconds { seconds } if seconds <= 0.0 || seconds.is_nan() => {
                return Err(ConfigError::InvalidStopping(
                    "time budget must be positive".into(),
                ));
            }
            StoppingConfig::Stagnation { iterations: 0 } => {
                return Err(ConfigError::InvalidStopping(
                    "stagnation limit must be positive".into(),
                ));
            }
            _ => {}
        }

        if let DecoderConfig::PropertyPacking { handlers } = &self.decoder {
            if bits != 1 {
                return Err(ConfigError::PackingBitsPerGene(bits));
            }
            if handlers.is_empty() {
                return Err(ConfigError::NoParameters);
            }
            for (i, spec) in handlers.iter().enumerate() {
                spec.validate()?;
                if handlers[..i].iter().any(|h| h.name() == spec.name()) {
                    return Err(ConfigError::DuplicateParameter(spec.name().to_string()));
                }
            }
        }

        Ok(())
    }
}

fn check_folds(folds: usize, data: &Dataset) -> Result<(), ConfigError> {
    if folds < 2 {
        return Err(ConfigError::InvalidFolds(folds));
    }
    if folds > data.num_rows() {
        return Err(ConfigError::FoldsExceedRows {
            folds,
            rows: data.num_rows(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, ClassIndex};

    fn numeric_data(rows: usize) -> Dataset {
        Dataset::new(
            "numeric",
            vec![Attribute::numeric("x"), Attribute::numeric("y")],
            (0..rows).map(|i| vec![i as f64, 2.0 * i as f64]).collect(),
            ClassIndex::Last,
        )
        .unwrap()
    }

    #[test]
    fn test_default_config_valid() {
        let config = SearchConfig::default();
        assert!(config.validate(&numeric_data(20)).is_ok());
    }

    #[test]
    fn test_measure_rejected_for_class_kind() {
        let config = SearchConfig {
            measure: Measure::Accuracy,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::MeasureNotApplicable { .. })
        ));
    }

    #[test]
    fn test_fold_checks() {
        let mut config = SearchConfig::default();
        config.evaluation.folds = 1;
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::InvalidFolds(1))
        ));

        config.evaluation.folds = 30;
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::FoldsExceedRows { .. })
        ));

        config.evaluation.folds = 5;
        config.second_evaluation.enabled = true;
        config.second_evaluation.folds = 0;
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::InvalidFolds(0))
        ));
    }

    #[test]
    fn test_packing_requires_single_bits() {
        let config = SearchConfig {
            population: PopulationConfig {
                bits_per_gene: 2,
                ..Default::default()
            },
            decoder: DecoderConfig::PropertyPacking {
                handlers: vec![ParameterSpec::Boolean { name: "b".into() }],
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::PackingBitsPerGene(2))
        ));
    }

    #[test]
    fn test_parameter_widths() {
        let choice = ParameterSpec::Choice {
            name: "c".into(),
            options: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(choice.width(), 2);
        let single = ParameterSpec::Choice {
            name: "s".into(),
            options: vec!["only".into()],
        };
        assert!(single.validate().is_err());

        let real = ParameterSpec::Real {
            name: "r".into(),
            min: 1.0,
            max: 0.0,
            bits: 4,
        };
        assert!(matches!(
            real.validate(),
            Err(ConfigError::InvalidParameterBounds(_))
        ));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let config = SearchConfig {
            decoder: DecoderConfig::PropertyPacking {
                handlers: vec![
                    ParameterSpec::Boolean { name: "b".into() },
                    ParameterSpec::Boolean { name: "b".into() },
                ],
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&numeric_data(20)),
            Err(ConfigError::DuplicateParameter(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let json = r#"{
            "measure": "MAE",
            "evaluation": {"folds": 5},
            "second_evaluation": {"enabled": true, "folds": 3, "seed": 7},
            "notification_interval": 0,
            "stopping": {"type": "Stagnation", "iterations": 4},
            "decoder": {"mode": "PropertyPacking", "handlers": [
                {"type": "Integer", "name": "k", "min": 1, "max": 8, "bits": 3}
            ]}
        }"#;
        let config: SearchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.measure, Measure::MeanAbsoluteError);
        assert_eq!(config.evaluation.folds, 5);
        assert_eq!(config.evaluation.seed, 55);
        assert!(config.second_evaluation.enabled);
        assert_eq!(config.population.size, 50);
        assert_eq!(
            config.stopping,
            StoppingConfig::Stagnation { iterations: 4 }
        );

        let back = serde_json::to_string(&config).unwrap();
        let again: SearchConfig = serde_json::from_str(&back).unwrap();
        assert_eq!(again.second_evaluation.seed, 7);
    }
}

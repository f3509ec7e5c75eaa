//! Fitness measures and their polarity/applicability table.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ClassKind, ConfigError, Dataset};

/// A named scoring function extracted from a cross-validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    /// Correlation coefficient (numeric class only).
    #[serde(rename = "CC", alias = "CorrelationCoefficient")]
    CorrelationCoefficient,
    /// Root mean squared error.
    #[default]
    #[serde(rename = "RMSE", alias = "RootMeanSquaredError")]
    RootMeanSquaredError,
    /// Root relative squared error (percent).
    #[serde(rename = "RRSE", alias = "RootRelativeSquaredError")]
    RootRelativeSquaredError,
    /// Mean absolute error.
    #[serde(rename = "MAE", alias = "MeanAbsoluteError")]
    MeanAbsoluteError,
    /// Relative absolute error (percent).
    #[serde(rename = "RAE", alias = "RelativeAbsoluteError")]
    RelativeAbsoluteError,
    /// Percent correctly classified (nominal class only).
    #[serde(rename = "ACC", alias = "Accuracy")]
    Accuracy,
}

/// Static properties of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureFlags {
    /// Lower raw values are better.
    pub is_error: bool,
    pub nominal: bool,
    pub numeric: bool,
}

const fn flags(is_error: bool, nominal: bool, numeric: bool) -> MeasureFlags {
    MeasureFlags {
        is_error,
        nominal,
        numeric,
    }
}

impl Measure {
    /// All measures, in table order.
    pub const ALL: [Measure; 6] = [
        Measure::CorrelationCoefficient,
        Measure::RootMeanSquaredError,
        Measure::RootRelativeSquaredError,
        Measure::MeanAbsoluteError,
        Measure::RelativeAbsoluteError,
        Measure::Accuracy,
    ];

    /// Lookup table entry for this measure.
    pub const fn flags(self) -> MeasureFlags {
        match self {
            Measure::CorrelationCoefficient => flags(false, false, true),
            Measure::RootMeanSquaredError => flags(true, true, true),
            Measure::RootRelativeSquaredError => flags(true, true, true),
            Measure::MeanAbsoluteError => flags(true, true, true),
            Measure::RelativeAbsoluteError => flags(true, true, true),
            Measure::Accuracy => flags(false, true, false),
        }
    }

    pub const fn is_error(self) -> bool {
        self.flags().is_error
    }

    /// Short name used in logs, records and file names.
    pub const fn short_name(self) -> &'static str {
        match self {
            Measure::CorrelationCoefficient => "CC",
            Measure::RootMeanSquaredError => "RMSE",
            Measure::RootRelativeSquaredError => "RRSE",
            Measure::MeanAbsoluteError => "MAE",
            Measure::RelativeAbsoluteError => "RAE",
            Measure::Accuracy => "ACC",
        }
    }

    /// Convert a raw value into "higher is better" form.
    pub fn adjust(self, raw: f64) -> f64 {
        if self.is_error() { -raw } else { raw }
    }

    /// Whether the measure can be computed for the given class kind.
    pub fn applies_to(self, kind: &ClassKind) -> bool {
        let flags = self.flags();
        match kind {
            ClassKind::Nominal { .. } => flags.nominal,
            ClassKind::Numeric => flags.numeric,
        }
    }

    /// Check the measure against the dataset's class attribute.
    pub fn validate(self, data: &Dataset) -> Result<(), ConfigError> {
        let kind = data.class_kind()?;
        if self.applies_to(&kind) {
            Ok(())
        } else {
            Err(ConfigError::MeasureNotApplicable {
                measure: self,
                class_kind: kind.name().to_string(),
            })
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_polarity() {
        for measure in Measure::ALL {
            let adjusted = measure.adjust(0.25);
            if measure.is_error() {
                assert_eq!(adjusted, -0.25);
            } else {
                assert_eq!(adjusted, 0.25);
            }
        }
    }

    #[test]
    fn test_adjusted_ordering_prefers_better_raw() {
        // lower error wins after adjustment
        let mut errors = [0.9, 0.2, 0.5];
        errors.sort_by(|a, b| {
            Measure::MeanAbsoluteError
                .adjust(*b)
                .total_cmp(&Measure::MeanAbsoluteError.adjust(*a))
        });
        assert_eq!(errors[0], 0.2);

        // higher accuracy wins after adjustment
        let mut accs = [70.0, 95.0, 80.0];
        accs.sort_by(|a, b| Measure::Accuracy.adjust(*b).total_cmp(&Measure::Accuracy.adjust(*a)));
        assert_eq!(accs[0], 95.0);
    }

    #[test]
    fn test_applicability_table() {
        let nominal = ClassKind::Nominal {
            labels: vec!["a".into(), "b".into()],
        };
        assert!(Measure::Accuracy.applies_to(&nominal));
        assert!(!Measure::Accuracy.applies_to(&ClassKind::Numeric));
        assert!(Measure::CorrelationCoefficient.applies_to(&ClassKind::Numeric));
        assert!(!Measure::CorrelationCoefficient.applies_to(&nominal));
        assert!(Measure::RootMeanSquaredError.applies_to(&nominal));
        assert!(Measure::RootMeanSquaredError.applies_to(&ClassKind::Numeric));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Measure::RootRelativeSquaredError).unwrap();
        assert_eq!(json, "\"RRSE\"");
        let parsed: Measure = serde_json::from_str("\"Accuracy\"").unwrap();
        assert_eq!(parsed, Measure::Accuracy);
    }
}

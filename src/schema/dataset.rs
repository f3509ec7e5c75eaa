//! Tabular dataset with a designated class attribute.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Type of a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttributeKind {
    /// Real-valued attribute.
    Numeric,
    /// Categorical attribute; values are stored as label indices.
    Nominal { labels: Vec<String> },
}

/// A named column of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(flatten)]
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal<S: Into<String>>(name: impl Into<String>, labels: Vec<S>) -> Self {
        Self {
            name: name.into(),
            kind: AttributeKind::Nominal {
                labels: labels.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Position of the class attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassIndex {
    First,
    #[default]
    Last,
    /// Zero-based attribute index.
    Index(usize),
}

/// Kind of the class attribute, as far as measures are concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    Nominal { labels: Vec<String> },
    Numeric,
}

impl ClassKind {
    pub fn name(&self) -> &'static str {
        match self {
            ClassKind::Nominal { .. } => "nominal",
            ClassKind::Numeric => "numeric",
        }
    }

    /// Number of class labels (zero for numeric classes).
    pub fn num_labels(&self) -> usize {
        match self {
            ClassKind::Nominal { labels } => labels.len(),
            ClassKind::Numeric => 0,
        }
    }
}

/// In-memory dataset; nominal cells hold the label index as `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default = "default_relation")]
    pub relation: String,
    pub attributes: Vec<Attribute>,
    pub rows: Vec<Vec<f64>>,
    #[serde(default)]
    pub class: ClassIndex,
}

fn default_relation() -> String {
    "dataset".to_string()
}

impl Dataset {
    /// Build and validate a dataset.
    pub fn new(
        relation: impl Into<String>,
        attributes: Vec<Attribute>,
        rows: Vec<Vec<f64>>,
        class: ClassIndex,
    ) -> Result<Self, ConfigError> {
        let data = Self {
            relation: relation.into(),
            attributes,
            rows,
            class,
        };
        data.validate()?;
        Ok(data)
    }

    /// Check row widths, nominal label ranges and the class position.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attributes.len() < 2 {
            return Err(ConfigError::TooFewAttributes(self.attributes.len()));
        }
        self.class_index()?;

        for (r, row) in self.rows.iter().enumerate() {
            if row.len() != self.attributes.len() {
                return Err(ConfigError::RowWidth {
                    row: r,
                    expected: self.attributes.len(),
                    actual: row.len(),
                });
            }
            for (a, attr) in self.attributes.iter().enumerate() {
                if let AttributeKind::Nominal { labels } = &attr.kind {
                    let v = row[a];
                    if v.fract() != 0.0 || v < 0.0 || v as usize >= labels.len() {
                        return Err(ConfigError::InvalidNominalValue {
                            row: r,
                            attribute: attr.name.clone(),
                            value: v,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Resolve the zero-based class attribute index.
    pub fn class_index(&self) -> Result<usize, ConfigError> {
        let n = self.attributes.len();
        if n == 0 {
            return Err(ConfigError::ClassIndexOutOfRange { index: 0, count: 0 });
        }
        match self.class {
            ClassIndex::First => Ok(0),
            ClassIndex::Last => Ok(n - 1),
            ClassIndex::Index(i) if i < n => Ok(i),
            ClassIndex::Index(i) => Err(ConfigError::ClassIndexOutOfRange { index: i, count: n }),
        }
    }

    pub fn class_kind(&self) -> Result<ClassKind, ConfigError> {
        let idx = self.class_index()?;
        Ok(match &self.attributes[idx].kind {
            AttributeKind::Numeric => ClassKind::Numeric,
            AttributeKind::Nominal { labels } => ClassKind::Nominal {
                labels: labels.clone(),
            },
        })
    }

    /// Zero-based indices of every non-class attribute, in column order.
    pub fn feature_indices(&self) -> Vec<usize> {
        let class = self.class_index().ok();
        (0..self.attributes.len())
            .filter(|&a| Some(a) != class)
            .collect()
    }

    pub fn num_features(&self) -> usize {
        self.feature_indices().len()
    }

    /// Copy of the dataset with the given attributes set to zero in every row.
    pub fn with_zeroed(&self, excluded: &[usize]) -> Dataset {
        let mut copy = self.clone();
        for row in &mut copy.rows {
            for &a in excluded {
                if let Some(cell) = row.get_mut(a) {
                    *cell = 0.0;
                }
            }
        }
        copy
    }

    /// Write the dataset as CSV, preceded by a `#` comment carrying the relation name.
    pub fn write_csv<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "# relation: {}", self.relation)?;
        let header: Vec<&str> = self.attributes.iter().map(|a| a.name.as_str()).collect();
        writeln!(w, "{}", header.join(","))?;

        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .zip(&self.attributes)
                .map(|(v, attr)| match &attr.kind {
                    AttributeKind::Numeric => v.to_string(),
                    AttributeKind::Nominal { labels } => labels
                        .get(*v as usize)
                        .cloned()
                        .unwrap_or_else(|| "?".to_string()),
                })
                .collect();
            writeln!(w, "{}", cells.join(","))?;
        }
        w.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dataset {
        Dataset::new(
            "small",
            vec![
                Attribute::numeric("a"),
                Attribute::numeric("b"),
                Attribute::nominal("class", vec!["no", "yes"]),
            ],
            vec![vec![1.0, 2.0, 0.0], vec![3.0, 4.0, 1.0]],
            ClassIndex::Last,
        )
        .unwrap()
    }

    #[test]
    fn test_class_resolution() {
        let mut data = small();
        assert_eq!(data.class_index().unwrap(), 2);
        assert_eq!(data.feature_indices(), vec![0, 1]);

        data.class = ClassIndex::First;
        assert_eq!(data.class_index().unwrap(), 0);
        assert_eq!(data.feature_indices(), vec![1, 2]);

        data.class = ClassIndex::Index(7);
        assert!(matches!(
            data.class_index(),
            Err(ConfigError::ClassIndexOutOfRange { index: 7, count: 3 })
        ));
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let attrs = vec![Attribute::numeric("a"), Attribute::nominal("c", vec!["x"])];
        let err = Dataset::new("bad", attrs.clone(), vec![vec![1.0]], ClassIndex::Last);
        assert!(matches!(err, Err(ConfigError::RowWidth { row: 0, .. })));

        let err = Dataset::new("bad", attrs, vec![vec![1.0, 3.0]], ClassIndex::Last);
        assert!(matches!(err, Err(ConfigError::InvalidNominalValue { .. })));
    }

    #[test]
    fn test_with_zeroed_keeps_original() {
        let data = small();
        let zeroed = data.with_zeroed(&[1]);
        assert_eq!(zeroed.rows[1], vec![3.0, 0.0, 1.0]);
        assert_eq!(data.rows[1], vec![3.0, 4.0, 1.0]);
    }

    #[test]
    fn test_write_csv() {
        let mut buf = Vec::new();
        small().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "# relation: small\na,b,class\n1,2,no\n3,4,yes\n");
    }

    #[test]
    fn test_json_roundtrip_shape() {
        let json = r#"{
            "attributes": [
                {"name": "x", "type": "Numeric"},
                {"name": "y", "type": "Nominal", "labels": ["a", "b"]}
            ],
            "rows": [[0.5, 1]],
            "class": "last"
        }"#;
        let data: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(data.relation, "dataset");
        assert!(data.validate().is_ok());
        assert_eq!(data.class_kind().unwrap().num_labels(), 2);
    }
}

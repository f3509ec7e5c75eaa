//! Attribute subset selection.

use std::sync::Arc;

use crate::compute::{Model, RangeError, encode_ranges, parse_ranges};
use crate::schema::{ConfigError, Dataset};

use super::{DecodeError, Decoder, Phenotype, check_len};
use crate::compute::evolution::Genotype;

/// Split of the non-class attributes into kept and removed ones.
///
/// Indices are zero-based attribute positions; the class attribute is never
/// part of either list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMask {
    pub kept: Vec<usize>,
    pub removed: Vec<usize>,
}

impl AttributeMask {
    /// 1-based range string of the kept attributes, e.g. `1,3-4`.
    pub fn kept_range(&self) -> String {
        encode_ranges(&self.kept)
    }

    /// 1-based range string of the removed attributes.
    pub fn removed_range(&self) -> String {
        encode_ranges(&self.removed)
    }

    /// Rebuild a mask from a kept range string. Mentions of the class attribute
    /// are dropped.
    pub fn from_kept_range(range: &str, data: &Dataset) -> Result<Self, RangeError> {
        let selected = parse_ranges(range, data.num_attributes())?;
        let features = data.feature_indices();
        let (kept, removed): (Vec<usize>, Vec<usize>) = features
            .into_iter()
            .partition(|a| selected.contains(a));
        Ok(Self { kept, removed })
    }
}

/// One gene per non-class attribute; a zero gene excludes the attribute by
/// zeroing its column in the evaluation copy of the dataset.
#[derive(Debug, Clone)]
pub struct AttributeMaskDecoder {
    features: Vec<usize>,
    bits_per_gene: usize,
}

impl AttributeMaskDecoder {
    pub fn new(data: &Dataset, bits_per_gene: usize) -> Result<Self, ConfigError> {
        data.class_index()?;
        if bits_per_gene == 0 {
            return Err(ConfigError::InvalidBitsPerGene(bits_per_gene));
        }
        Ok(Self {
            features: data.feature_indices(),
            bits_per_gene,
        })
    }

    /// Split the attributes according to the genotype's genes.
    pub fn mask(&self, genotype: &Genotype) -> Result<AttributeMask, DecodeError> {
        check_len(self.features.len() * self.bits_per_gene, genotype)?;
        let genes = genotype.genes();
        let (kept, removed): (Vec<_>, Vec<_>) = self
            .features
            .iter()
            .zip(&genes)
            .partition(|(_, gene)| **gene != 0);
        Ok(AttributeMask {
            kept: kept.into_iter().map(|(a, _)| *a).collect(),
            removed: removed.into_iter().map(|(a, _)| *a).collect(),
        })
    }
}

impl<M: Model> Decoder<M> for AttributeMaskDecoder {
    fn name(&self) -> &'static str {
        "attribute-mask"
    }

    fn genotype_len(&self) -> usize {
        self.features.len() * self.bits_per_gene
    }

    fn decode(
        &self,
        genotype: &Genotype,
        base: &M,
        data: &Arc<Dataset>,
    ) -> Result<Phenotype<M>, DecodeError> {
        let mask = self.mask(genotype)?;
        let weights: Vec<String> = genotype.genes().iter().map(u32::to_string).collect();
        let dataset = if mask.removed.is_empty() {
            Arc::clone(data)
        } else {
            Arc::new(data.with_zeroed(&mask.removed))
        };

        Ok(Phenotype {
            model: base.clone(),
            dataset,
            details: vec![
                ("kept".to_string(), mask.kept_range()),
                ("removed".to_string(), mask.removed_range()),
                ("weights".to_string(), weights.join(",")),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::ZeroR;
    use crate::schema::{Attribute, ClassIndex};
    use proptest::prelude::*;

    fn data(features: usize, class: ClassIndex) -> Dataset {
        let mut attributes: Vec<Attribute> = (0..features)
            .map(|i| Attribute::numeric(format!("a{i}")))
            .collect();
        match class {
            ClassIndex::First => attributes.insert(0, Attribute::numeric("class")),
            _ => attributes.push(Attribute::numeric("class")),
        }
        let rows = (0..4)
            .map(|r| (0..=features).map(|c| (r * 10 + c + 1) as f64).collect())
            .collect();
        Dataset::new("mask", attributes, rows, class).unwrap()
    }

    #[test]
    fn test_kept_and_removed_ranges() {
        let data = data(4, ClassIndex::Last);
        let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
        let g = Genotype::from_bit_str("1011", 1).unwrap();
        let mask = decoder.mask(&g).unwrap();
        assert_eq!(mask.kept_range(), "1,3-4");
        assert_eq!(mask.removed_range(), "2");
    }

    #[test]
    fn test_decode_zeroes_removed_columns() {
        let data = Arc::new(data(4, ClassIndex::Last));
        let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
        let g = Genotype::from_bit_str("1011", 1).unwrap();
        let phenotype = Decoder::<ZeroR>::decode(&decoder, &g, &ZeroR::default(), &data).unwrap();
        assert_eq!(phenotype.dataset.rows[0], vec![1.0, 0.0, 3.0, 4.0, 5.0]);
        // the shared dataset is untouched
        assert_eq!(data.rows[0][1], 2.0);
        assert_eq!(phenotype.details[0], ("kept".to_string(), "1,3-4".to_string()));
    }

    #[test]
    fn test_class_first_shifts_ranges() {
        let data = data(3, ClassIndex::First);
        let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
        let mask = decoder
            .mask(&Genotype::from_bit_str("110", 1).unwrap())
            .unwrap();
        assert_eq!(mask.kept_range(), "2-3");
        assert_eq!(mask.removed_range(), "4");
    }

    #[test]
    fn test_empty_selection() {
        let data = data(4, ClassIndex::Last);
        let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
        let mask = decoder.mask(&Genotype::zeros(4, 1)).unwrap();
        assert_eq!(mask.kept_range(), "");
        assert_eq!(mask.removed_range(), "1-4");
    }

    #[test]
    fn test_multi_bit_genes() {
        let data = data(3, ClassIndex::Last);
        let decoder = AttributeMaskDecoder::new(&data, 2).unwrap();
        assert_eq!(Decoder::<ZeroR>::genotype_len(&decoder), 6);
        let mask = decoder
            .mask(&Genotype::from_genes(&[2, 0, 1], 2))
            .unwrap();
        assert_eq!(mask.kept, vec![0, 2]);
    }

    #[test]
    fn test_length_mismatch() {
        let data = data(4, ClassIndex::Last);
        let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
        assert!(matches!(
            decoder.mask(&Genotype::zeros(5, 1)),
            Err(DecodeError::LengthMismatch {
                expected: 4,
                actual: 5
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_mask_range_roundtrip(bits in proptest::collection::vec(any::<bool>(), 1..24), first in any::<bool>()) {
            let class = if first { ClassIndex::First } else { ClassIndex::Last };
            let data = data(bits.len(), class);
            let class_index = data.class_index().unwrap();
            let decoder = AttributeMaskDecoder::new(&data, 1).unwrap();
            let mask = decoder.mask(&Genotype::new(bits, 1)).unwrap();

            prop_assert!(!mask.kept.contains(&class_index));
            prop_assert!(!mask.removed.contains(&class_index));

            let rebuilt = AttributeMask::from_kept_range(&mask.kept_range(), &data).unwrap();
            prop_assert_eq!(rebuilt, mask);
        }
    }
}

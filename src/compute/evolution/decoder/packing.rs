//! Packing tunable model parameters into a single bit string.

use std::fmt;
use std::sync::Arc;

use crate::compute::evolution::Genotype;
use crate::compute::{Model, ParamValue};
use crate::schema::{ConfigError, Dataset, MAX_PARAMETER_BITS, ParameterSpec};

use super::{DecodeError, Decoder, Phenotype, check_len};

/// Binds a fixed-width bit range to one named model parameter.
pub trait DiscoveryHandler: Send + Sync + fmt::Debug {
    /// Name of the model parameter.
    fn name(&self) -> &str;

    /// Number of bits claimed in the genotype.
    fn width(&self) -> usize;

    /// Map a `width()`-long `0`/`1` string to a parameter value.
    fn decode(&self, bits: &str) -> ParamValue;

    /// Inverse of [`decode`](Self::decode), if the value is representable.
    fn encode(&self, value: &ParamValue) -> Option<String>;

    /// Setup-time check of the handler on its own.
    fn validate(&self) -> Result<(), ConfigError> {
        let width = self.width();
        if width == 0 || width > MAX_PARAMETER_BITS {
            return Err(ConfigError::InvalidParameterWidth {
                name: self.name().to_string(),
                width,
            });
        }
        Ok(())
    }
}

fn levels(width: usize) -> u64 {
    (1u64 << width) - 1
}

fn to_bits(level: u64, width: usize) -> String {
    format!("{level:0width$b}")
}

fn level_of(ratio: f64, width: usize) -> u64 {
    let max = levels(width);
    (ratio * max as f64).round().clamp(0.0, max as f64) as u64
}

impl DiscoveryHandler for ParameterSpec {
    fn name(&self) -> &str {
        ParameterSpec::name(self)
    }

    fn width(&self) -> usize {
        ParameterSpec::width(self)
    }

    fn decode(&self, bits: &str) -> ParamValue {
        let level = u64::from_str_radix(bits, 2).unwrap_or(0);
        let ratio = |w: usize| {
            let max = levels(w);
            if max == 0 { 0.0 } else { level as f64 / max as f64 }
        };
        match self {
            ParameterSpec::Integer { min, max, bits, .. } => {
                let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
                let span = hi as f64 - lo as f64;
                let v = lo as f64 + (span * ratio(*bits)).round();
                ParamValue::Int((v as i64).clamp(lo, hi))
            }
            ParameterSpec::Real { min, max, bits, .. } => {
                ParamValue::Real(min + (max - min) * ratio(*bits))
            }
            ParameterSpec::Boolean { .. } => ParamValue::Bool(level != 0),
            ParameterSpec::Choice { options, .. } => {
                let index = level as usize % options.len().max(1);
                ParamValue::Text(options.get(index).cloned().unwrap_or_default())
            }
        }
    }

    fn encode(&self, value: &ParamValue) -> Option<String> {
        let width = ParameterSpec::width(self);
        match (self, value) {
            (ParameterSpec::Integer { min, max, .. }, ParamValue::Int(v)) => {
                if v < min || v > max {
                    return None;
                }
                let span = *max as f64 - *min as f64;
                let ratio = if span > 0.0 {
                    (*v as f64 - *min as f64) / span
                } else {
                    0.0
                };
                Some(to_bits(level_of(ratio, width), width))
            }
            (ParameterSpec::Real { min, max, .. }, ParamValue::Real(v)) => {
                if v < min || v > max {
                    return None;
                }
                let ratio = if max > min { (v - min) / (max - min) } else { 0.0 };
                Some(to_bits(level_of(ratio, width), width))
            }
            (ParameterSpec::Boolean { .. }, ParamValue::Bool(b)) => {
                Some(if *b { "1" } else { "0" }.to_string())
            }
            (ParameterSpec::Choice { options, .. }, ParamValue::Text(t)) => options
                .iter()
                .position(|o| o == t)
                .map(|i| to_bits(i as u64, width)),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ParameterSpec::validate(self)
    }
}

/// Position of one handler's bits in the genotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlot {
    pub offset: usize,
    pub width: usize,
}

/// Decodes genotypes by slicing them into consecutive per-handler bit ranges.
///
/// Offsets are the running sum of the handler widths and are computed once
/// at construction.
#[derive(Debug)]
pub struct PropertyPackingDecoder {
    handlers: Vec<Box<dyn DiscoveryHandler>>,
    slots: Vec<BitSlot>,
    len: usize,
}

impl PropertyPackingDecoder {
    pub fn new(handlers: Vec<Box<dyn DiscoveryHandler>>) -> Self {
        let mut offset = 0;
        let slots = handlers
            .iter()
            .map(|h| {
                let slot = BitSlot {
                    offset,
                    width: h.width(),
                };
                offset += slot.width;
                slot
            })
            .collect();
        Self {
            handlers,
            slots,
            len: offset,
        }
    }

    pub fn from_specs(specs: Vec<ParameterSpec>) -> Self {
        Self::new(
            specs
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn DiscoveryHandler>)
                .collect(),
        )
    }

    pub fn slots(&self) -> &[BitSlot] {
        &self.slots
    }

    pub fn handlers(&self) -> &[Box<dyn DiscoveryHandler>] {
        &self.handlers
    }

    /// Decoded value of every handler, in handler order.
    pub fn values(&self, genotype: &Genotype) -> Result<Vec<(String, ParamValue)>, DecodeError> {
        check_len(self.len, genotype)?;
        Ok(self
            .handlers
            .iter()
            .zip(&self.slots)
            .map(|(h, slot)| {
                let bits = genotype.slice_str(slot.offset, slot.width);
                (h.name().to_string(), h.decode(&bits))
            })
            .collect())
    }
}

impl<M: Model> Decoder<M> for PropertyPackingDecoder {
    fn name(&self) -> &'static str {
        "property-packing"
    }

    fn genotype_len(&self) -> usize {
        self.len
    }

    fn decode(
        &self,
        genotype: &Genotype,
        base: &M,
        data: &Arc<Dataset>,
    ) -> Result<Phenotype<M>, DecodeError> {
        check_len(self.len, genotype)?;
        let mut model = base.clone();
        let mut details = Vec::with_capacity(self.handlers.len());

        for (handler, slot) in self.handlers.iter().zip(&self.slots) {
            let bits = genotype.slice_str(slot.offset, slot.width);
            let value = handler.decode(&bits);
            model.set_parameter(handler.name(), &value)?;
            details.push((handler.name().to_string(), format!("{bits} -> {value}")));
        }

        Ok(Phenotype {
            model,
            dataset: Arc::clone(data),
            details,
        })
    }

    fn validate(&self, base: &M) -> Result<(), ConfigError> {
        if self.handlers.is_empty() {
            return Err(ConfigError::NoParameters);
        }
        for (i, handler) in self.handlers.iter().enumerate() {
            handler.validate()?;
            if self.handlers[..i].iter().any(|h| h.name() == handler.name()) {
                return Err(ConfigError::DuplicateParameter(handler.name().to_string()));
            }
            if base.parameter(handler.name()).is_none() {
                return Err(ConfigError::UnknownParameter {
                    name: handler.name().to_string(),
                    reason: format!("not a parameter of {}", base.describe()),
                });
            }
        }
        Ok(())
    }

    fn seed_genotypes(&self, base: &M) -> Vec<Genotype> {
        let mut key = String::with_capacity(self.len);
        for handler in &self.handlers {
            let encoded = base
                .parameter(handler.name())
                .and_then(|v| handler.encode(&v));
            match encoded {
                Some(bits) => key.push_str(&bits),
                None => {
                    log::debug!(
                        "Current value of '{}' is not representable, no seed genotype",
                        handler.name()
                    );
                    return Vec::new();
                }
            }
        }
        Genotype::from_bit_str(&key, 1).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::NearestNeighbors;
    use crate::schema::{Attribute, ClassIndex};
    use proptest::prelude::*;

    fn boolean(name: &str) -> ParameterSpec {
        ParameterSpec::Boolean { name: name.into() }
    }

    fn integer(name: &str, min: i64, max: i64, bits: usize) -> ParameterSpec {
        ParameterSpec::Integer {
            name: name.into(),
            min,
            max,
            bits,
        }
    }

    /// Records the bits it was handed instead of mapping them.
    #[derive(Debug)]
    struct Raw(&'static str, usize);

    impl DiscoveryHandler for Raw {
        fn name(&self) -> &str {
            self.0
        }
        fn width(&self) -> usize {
            self.1
        }
        fn decode(&self, bits: &str) -> ParamValue {
            ParamValue::Text(bits.to_string())
        }
        fn encode(&self, _value: &ParamValue) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_offsets_and_slices() {
        let handlers: Vec<Box<dyn DiscoveryHandler>> =
            vec![Box::new(Raw("A", 3)), Box::new(Raw("B", 5))];
        let decoder = PropertyPackingDecoder::new(handlers);
        assert_eq!(
            decoder.slots(),
            &[
                BitSlot {
                    offset: 0,
                    width: 3
                },
                BitSlot {
                    offset: 3,
                    width: 5
                }
            ]
        );
        let g = Genotype::from_bit_str("10101010", 1).unwrap();
        let values = decoder.values(&g).unwrap();
        assert_eq!(values[0], ("A".to_string(), ParamValue::Text("101".into())));
        assert_eq!(values[1], ("B".to_string(), ParamValue::Text("01010".into())));
    }

    #[test]
    fn test_integer_mapping() {
        let k = integer("k", 1, 8, 3);
        assert_eq!(k.decode("000"), ParamValue::Int(1));
        assert_eq!(k.decode("111"), ParamValue::Int(8));
        assert_eq!(k.decode("011"), ParamValue::Int(4));
        assert_eq!(k.encode(&ParamValue::Int(4)).as_deref(), Some("011"));
        assert_eq!(k.encode(&ParamValue::Int(9)), None);
    }

    #[test]
    fn test_real_and_choice_mapping() {
        let r = ParameterSpec::Real {
            name: "p".into(),
            min: 1.0,
            max: 4.0,
            bits: 2,
        };
        assert_eq!(r.decode("00"), ParamValue::Real(1.0));
        assert_eq!(r.decode("11"), ParamValue::Real(4.0));
        assert_eq!(r.decode("10"), ParamValue::Real(3.0));

        let c = ParameterSpec::Choice {
            name: "w".into(),
            options: vec!["none".into(), "inverse".into(), "similarity".into()],
        };
        // four codes over three options wrap around
        assert_eq!(c.decode("11"), ParamValue::Text("none".into()));
        assert_eq!(c.decode("10"), ParamValue::Text("similarity".into()));
        assert_eq!(
            c.encode(&ParamValue::Text("inverse".into())).as_deref(),
            Some("01")
        );
    }

    #[test]
    fn test_decode_applies_parameters() {
        let data = Arc::new(
            Dataset::new(
                "d",
                vec![Attribute::numeric("x"), Attribute::numeric("y")],
                vec![vec![0.0, 0.0]; 4],
                ClassIndex::Last,
            )
            .unwrap(),
        );
        let decoder =
            PropertyPackingDecoder::from_specs(vec![integer("k", 1, 8, 3), boolean("normalize")]);
        let base = NearestNeighbors::default();
        let g = Genotype::from_bit_str("1100", 1).unwrap();
        let phenotype = decoder.decode(&g, &base, &data).unwrap();

        assert_eq!(phenotype.model.k, 7);
        assert!(!phenotype.model.normalize);
        assert_eq!(base.k, 1);
        assert_eq!(phenotype.details[0].1, "110 -> 7");
    }

    #[test]
    fn test_validate_against_model() {
        let base = NearestNeighbors::default();
        let good = PropertyPackingDecoder::from_specs(vec![integer("k", 1, 8, 3)]);
        assert!(Decoder::<NearestNeighbors>::validate(&good, &base).is_ok());

        let bad = PropertyPackingDecoder::from_specs(vec![boolean("depth")]);
        assert!(matches!(
            Decoder::<NearestNeighbors>::validate(&bad, &base),
            Err(ConfigError::UnknownParameter { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_handlers() {
        let base = NearestNeighbors::default();
        let reversed = PropertyPackingDecoder::from_specs(vec![integer("k", 5, 1, 3)]);
        assert!(matches!(
            Decoder::<NearestNeighbors>::validate(&reversed, &base),
            Err(ConfigError::InvalidParameterBounds(_))
        ));

        let duplicate =
            PropertyPackingDecoder::from_specs(vec![integer("k", 1, 8, 3), integer("k", 1, 4, 2)]);
        assert!(matches!(
            Decoder::<NearestNeighbors>::validate(&duplicate, &base),
            Err(ConfigError::DuplicateParameter(_))
        ));

        let handlers: Vec<Box<dyn DiscoveryHandler>> = vec![Box::new(Raw("k", 0))];
        let empty_width = PropertyPackingDecoder::new(handlers);
        assert!(matches!(
            Decoder::<NearestNeighbors>::validate(&empty_width, &base),
            Err(ConfigError::InvalidParameterWidth { .. })
        ));
    }

    #[test]
    fn test_reversed_integer_bounds_decode() {
        let k = integer("k", 5, 1, 3);
        assert_eq!(k.decode("000"), ParamValue::Int(1));
        assert_eq!(k.decode("111"), ParamValue::Int(5));
    }

    #[test]
    fn test_seed_genotype_encodes_base() {
        let base = NearestNeighbors::new(3);
        let decoder =
            PropertyPackingDecoder::from_specs(vec![integer("k", 1, 8, 3), boolean("normalize")]);
        let seeds = Decoder::<NearestNeighbors>::seed_genotypes(&decoder, &base);
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].key(), "0101");

        let out_of_range = NearestNeighbors::new(20);
        assert!(Decoder::<NearestNeighbors>::seed_genotypes(&decoder, &out_of_range).is_empty());
    }

    proptest! {
        #[test]
        fn prop_slots_partition_genotype(widths in proptest::collection::vec(1usize..12, 1..10)) {
            let specs: Vec<ParameterSpec> = widths
                .iter()
                .enumerate()
                .map(|(i, &w)| integer(&format!("p{i}"), 0, 100, w))
                .collect();
            let decoder = PropertyPackingDecoder::from_specs(specs);
            let slots = decoder.slots();

            prop_assert_eq!(slots[0].offset, 0);
            for pair in slots.windows(2) {
                prop_assert_eq!(pair[0].offset + pair[0].width, pair[1].offset);
                prop_assert!(pair[1].offset > pair[0].offset);
            }
            let total: usize = widths.iter().sum();
            prop_assert_eq!(Decoder::<NearestNeighbors>::genotype_len(&decoder), total);
        }
    }
}

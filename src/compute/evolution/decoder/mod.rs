//! Genotype to model-configuration decoding.
//!
//! Two strategies are provided:
//!
//! - [`AttributeMaskDecoder`]: one gene per non-class attribute, zero genes
//!   blank the attribute out of the evaluation dataset.
//! - [`PropertyPackingDecoder`]: consecutive bit ranges are bound to tunable
//!   model parameters through [`DiscoveryHandler`]s.

mod mask;
mod packing;

pub use mask::{AttributeMask, AttributeMaskDecoder};
pub use packing::{BitSlot, DiscoveryHandler, PropertyPackingDecoder};

use std::sync::Arc;

use crate::compute::{Model, ModelError};
use crate::schema::{ConfigError, Dataset, DecoderConfig, SearchConfig};

use super::Genotype;

/// A decoded genotype: the configured model and the data to evaluate it on.
#[derive(Debug, Clone)]
pub struct Phenotype<M> {
    pub model: M,
    pub dataset: Arc<Dataset>,
    /// Decoder specific key/value pairs for setup records.
    pub details: Vec<(String, String)>,
}

/// Failure to turn a genotype into a configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("Genotype has {actual} bits, decoder expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Capability turning genotypes into model configurations.
pub trait Decoder<M: Model>: Send + Sync {
    /// Short name used in logs and setup records.
    fn name(&self) -> &'static str;

    /// Number of bits every genotype must have.
    fn genotype_len(&self) -> usize;

    /// Decode a genotype against a base model, cloning it.
    fn decode(
        &self,
        genotype: &Genotype,
        base: &M,
        data: &Arc<Dataset>,
    ) -> Result<Phenotype<M>, DecodeError>;

    /// Setup-time check of the decoder against the base model.
    fn validate(&self, _base: &M) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Genotypes describing the base model as-is, placed into the first generation.
    fn seed_genotypes(&self, _base: &M) -> Vec<Genotype> {
        Vec::new()
    }
}

/// Build the decoder selected by the configuration.
pub fn build_decoder<M: Model + 'static>(
    config: &SearchConfig,
    data: &Dataset,
) -> Result<Box<dyn Decoder<M>>, ConfigError> {
    match &config.decoder {
        DecoderConfig::AttributeMask => Ok(Box::new(AttributeMaskDecoder::new(
            data,
            config.population.bits_per_gene,
        )?)),
        DecoderConfig::PropertyPacking { handlers } => Ok(Box::new(
            PropertyPackingDecoder::from_specs(handlers.clone()),
        )),
    }
}

fn check_len(expected: usize, genotype: &Genotype) -> Result<(), DecodeError> {
    if genotype.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: genotype.len(),
        });
    }
    Ok(())
}

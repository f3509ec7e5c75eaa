//! Fixed-length bit-string genotypes.

use std::fmt;

use rand::Rng;

use crate::schema::ConfigError;

/// A candidate solution: a fixed-length bit vector grouped into genes.
///
/// Genes are `bits_per_gene` consecutive bits read most significant bit
/// first. The canonical key is the raw bit string, so two genotypes are
/// equal exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    bits: Vec<bool>,
    bits_per_gene: usize,
}

impl Genotype {
    /// Wrap a bit vector. `bits_per_gene` is clamped to at least one.
    pub fn new(bits: Vec<bool>, bits_per_gene: usize) -> Self {
        Self {
            bits,
            bits_per_gene: bits_per_gene.max(1),
        }
    }

    /// All-zero genotype of the given length.
    pub fn zeros(len: usize, bits_per_gene: usize) -> Self {
        Self::new(vec![false; len], bits_per_gene)
    }

    /// Uniformly random genotype.
    pub fn random<R: Rng>(rng: &mut R, len: usize, bits_per_gene: usize) -> Self {
        Self::new((0..len).map(|_| rng.gen_bool(0.5)).collect(), bits_per_gene)
    }

    /// Parse a string of `0`/`1` characters.
    pub fn from_bit_str(s: &str, bits_per_gene: usize) -> Result<Self, ConfigError> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(ConfigError::InvalidBitString(s.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(bits, bits_per_gene))
    }

    /// Build from gene values; each value is truncated to `bits_per_gene` bits.
    pub fn from_genes(genes: &[u32], bits_per_gene: usize) -> Self {
        let width = bits_per_gene.max(1);
        let mut bits = Vec::with_capacity(genes.len() * width);
        for &gene in genes {
            for b in (0..width).rev() {
                bits.push((gene >> b) & 1 == 1);
            }
        }
        Self::new(bits, width)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits_per_gene(&self) -> usize {
        self.bits_per_gene
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn bit(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn set_bit(&mut self, index: usize, value: bool) {
        self.bits[index] = value;
    }

    pub fn flip(&mut self, index: usize) {
        self.bits[index] = !self.bits[index];
    }

    /// Canonical cache key.
    pub fn key(&self) -> String {
        self.slice_str(0, self.bits.len())
    }

    /// Bits `offset..offset + width` as a `0`/`1` string.
    pub fn slice_str(&self, offset: usize, width: usize) -> String {
        self.bits[offset..offset + width]
            .iter()
            .map(|&b| if b { '1' } else { '0' })
            .collect()
    }

    /// Number of complete genes.
    pub fn num_genes(&self) -> usize {
        self.bits.len() / self.bits_per_gene
    }

    /// Integer value of each gene.
    pub fn genes(&self) -> Vec<u32> {
        self.bits
            .chunks_exact(self.bits_per_gene)
            .map(|chunk| chunk.iter().fold(0u32, |acc, &b| (acc << 1) | b as u32))
            .collect()
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Swap the tails of two genotypes from `point` onwards.
    pub fn crossover(&mut self, other: &mut Genotype, point: usize) {
        let point = point.min(self.bits.len()).min(other.bits.len());
        self.bits[point..].swap_with_slice(&mut other.bits[point..]);
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_key_and_parse() {
        let g = Genotype::from_bit_str("1011", 1).unwrap();
        assert_eq!(g.key(), "1011");
        assert_eq!(g.to_string(), "1011");
        assert_eq!(g.count_ones(), 3);
        assert!(matches!(
            Genotype::from_bit_str("10x1", 1),
            Err(ConfigError::InvalidBitString(_))
        ));
    }

    #[test]
    fn test_multi_bit_genes() {
        let g = Genotype::from_genes(&[3, 0, 2], 2);
        assert_eq!(g.key(), "110010");
        assert_eq!(g.genes(), vec![3, 0, 2]);
        assert_eq!(g.num_genes(), 3);
    }

    #[test]
    fn test_slice_str() {
        let g = Genotype::from_bit_str("10101010", 1).unwrap();
        assert_eq!(g.slice_str(0, 3), "101");
        assert_eq!(g.slice_str(3, 5), "01010");
    }

    #[test]
    fn test_crossover_swaps_tails() {
        let mut a = Genotype::from_bit_str("0000", 1).unwrap();
        let mut b = Genotype::from_bit_str("1111", 1).unwrap();
        a.crossover(&mut b, 1);
        assert_eq!(a.key(), "0111");
        assert_eq!(b.key(), "1000");
    }

    #[test]
    fn test_random_is_seeded() {
        let mut r1 = StdRng::seed_from_u64(9);
        let mut r2 = StdRng::seed_from_u64(9);
        assert_eq!(
            Genotype::random(&mut r1, 32, 1),
            Genotype::random(&mut r2, 32, 1)
        );
    }

    #[test]
    fn test_flip() {
        let mut g = Genotype::zeros(3, 1);
        g.flip(1);
        assert_eq!(g.key(), "010");
        g.set_bit(1, false);
        assert_eq!(g, Genotype::zeros(3, 1));
    }
}

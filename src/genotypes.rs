//! Multi-locus diploid genotype model.
//!
//! A [`Haplotype`] is an ordered sequence of locus-presence bits, a
//! [`DiploidChromosome`] is a canonically ordered pair of haplotypes and a
//! [`Genotype`] is a fixed ordered sequence of diploid chromosomes. All three
//! are immutable value types.

use crate::errors::GeneticsError;
use bit_vec::BitVec;
use std::cmp::Ordering;
use std::fmt;

/// Ordered sequence of locus-presence bits on a single chromosome copy.
///
/// Total order: shorter haplotypes precede longer ones; among equal lengths
/// the first differing locus decides, absent (0) before present (1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Haplotype {
    loci: BitVec,
}

impl Haplotype {
    pub fn new(loci: impl IntoIterator<Item = bool>) -> Result<Self, GeneticsError> {
        let loci = BitVec::from_iter(loci);
        if loci.is_empty() {
            return Err(GeneticsError::EmptyHaplotype);
        }
        Ok(Self { loci })
    }

    /// Parses a string of '0'/'1' characters.
    ///
    /// # Panics
    ///
    /// Panics on an empty string or any other character.
    pub fn from_str(s: &str) -> Self {
        let f = |c: char| match c {
            '0' => false,
            '1' => true,
            _ => panic!("invalid character"),
        };
        Self::new(s.chars().map(f)).expect("empty haplotype string")
    }

    pub fn n_loci(&self) -> usize {
        self.loci.len()
    }

    /// Presence of the target allele at `locus`.
    pub fn get(&self, locus: usize) -> bool {
        self.loci[locus]
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.loci.iter()
    }

    /// Number of loci carrying the target allele.
    pub fn count_ones(&self) -> usize {
        self.loci.iter().filter(|b| *b).count()
    }
}

impl Ord for Haplotype {
    fn cmp(&self, other: &Self) -> Ordering {
        self.loci
            .len()
            .cmp(&other.loci.len())
            .then_with(|| self.loci.iter().cmp(other.loci.iter()))
    }
}

impl PartialOrd for Haplotype {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Haplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.loci.iter() {
            write!(f, "{}", if b { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// Pair of equal-length haplotypes, stored so that `hap1 <= hap2`.
///
/// The canonical order makes structural equality independent of the order in
/// which the haplotypes were passed to the constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiploidChromosome {
    hap1: Haplotype,
    hap2: Haplotype,
}

impl DiploidChromosome {
    pub fn new(a: Haplotype, b: Haplotype) -> Result<Self, GeneticsError> {
        if a.n_loci() != b.n_loci() {
            return Err(GeneticsError::IncompatibleHaplotypes(a.n_loci(), b.n_loci()));
        }
        let (hap1, hap2) = if a <= b { (a, b) } else { (b, a) };
        Ok(Self { hap1, hap2 })
    }

    pub fn from_strs(s1: &str, s2: &str) -> Self {
        Self::new(Haplotype::from_str(s1), Haplotype::from_str(s2))
            .expect("haplotype strings differ in length")
    }

    pub fn hap1(&self) -> &Haplotype {
        &self.hap1
    }

    pub fn hap2(&self) -> &Haplotype {
        &self.hap2
    }

    pub fn n_loci(&self) -> usize {
        self.hap1.n_loci()
    }

    pub fn is_homozygous(&self) -> bool {
        self.hap1 == self.hap2
    }

    /// Loci at which the two haplotypes carry different alleles.
    pub fn heterozygous_loci(&self) -> Vec<usize> {
        (0..self.n_loci())
            .filter(|&l| self.hap1.get(l) != self.hap2.get(l))
            .collect()
    }

    /// Number of target alleles (0, 1 or 2) at `locus`.
    pub fn allele_count(&self, locus: usize) -> u8 {
        self.hap1.get(locus) as u8 + self.hap2.get(locus) as u8
    }
}

impl fmt::Display for DiploidChromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hap1, self.hap2)
    }
}

/// Per-locus observable count of the target allele.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlleleFrequency {
    Absent,
    Once,
    Twice,
}

impl From<u8> for AlleleFrequency {
    fn from(count: u8) -> Self {
        match count {
            0 => AlleleFrequency::Absent,
            1 => AlleleFrequency::Once,
            _ => AlleleFrequency::Twice,
        }
    }
}

/// Allelic-frequency signature of a genotype: per-locus target-allele counts,
/// observable without knowing linkage phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObservableState(Vec<Vec<AlleleFrequency>>);

impl ObservableState {
    pub fn frequencies(&self) -> &[Vec<AlleleFrequency>] {
        &self.0
    }
}

/// Fixed ordered sequence of diploid chromosomes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genotype {
    chromosomes: Vec<DiploidChromosome>,
}

impl Genotype {
    pub fn new(chromosomes: Vec<DiploidChromosome>) -> Result<Self, GeneticsError> {
        if chromosomes.is_empty() {
            return Err(GeneticsError::EmptyGenotype);
        }
        Ok(Self { chromosomes })
    }

    /// Single-chromosome genotype from two haplotype strings.
    pub fn from_strs(s1: &str, s2: &str) -> Self {
        Self {
            chromosomes: vec![DiploidChromosome::from_strs(s1, s2)],
        }
    }

    pub fn n_chromosomes(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn chromosome(&self, c: usize) -> &DiploidChromosome {
        &self.chromosomes[c]
    }

    pub fn chromosomes(&self) -> &[DiploidChromosome] {
        &self.chromosomes
    }

    pub fn is_homozygous(&self) -> bool {
        self.chromosomes.iter().all(|c| c.is_homozygous())
    }

    /// Two genotypes can be crossed iff chromosome count and per-chromosome
    /// locus counts match.
    pub fn cross_compatible(&self, other: &Genotype) -> bool {
        self.n_chromosomes() == other.n_chromosomes()
            && self
                .chromosomes
                .iter()
                .zip(other.chromosomes.iter())
                .all(|(a, b)| a.n_loci() == b.n_loci())
    }

    /// Allelic-frequency signature, the bucket key of seed lots.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState(
            self.chromosomes
                .iter()
                .map(|c| {
                    (0..c.n_loci())
                        .map(|l| AlleleFrequency::from(c.allele_count(l)))
                        .collect()
                })
                .collect(),
        )
    }

    /// Total number of target alleles present.
    pub fn count_target_alleles(&self) -> usize {
        self.chromosomes
            .iter()
            .map(|c| c.hap1.count_ones() + c.hap2.count_ones())
            .sum()
    }

    /// Fraction of `ideotype`'s target alleles present in `self`, in [0, 1].
    ///
    /// Counts per locus up to the ideotype's allele count, so surplus alleles
    /// never score.
    pub fn allele_score(&self, ideotype: &Genotype) -> f64 {
        let mut have = 0usize;
        let mut want = 0usize;
        for (c, ic) in self.chromosomes.iter().zip(ideotype.chromosomes.iter()) {
            for l in 0..c.n_loci() {
                let w = ic.allele_count(l) as usize;
                want += w;
                have += w.min(c.allele_count(l) as usize);
            }
        }
        if want == 0 {
            1.0
        } else {
            have as f64 / want as f64
        }
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.chromosomes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_haplotype_rejected() {
        assert_eq!(
            Haplotype::new(std::iter::empty()),
            Err(GeneticsError::EmptyHaplotype)
        );
    }

    #[test]
    fn haplotype_order_shorter_first() {
        let short = Haplotype::from_str("11");
        let long = Haplotype::from_str("000");
        assert!(short < long);
    }

    #[test]
    fn haplotype_order_lexicographic_within_length() {
        let a = Haplotype::from_str("0101");
        let b = Haplotype::from_str("0110");
        assert!(a < b);
        assert!(b > a);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn diploid_chromosome_canonicalizes() {
        let a = Haplotype::from_str("1001");
        let b = Haplotype::from_str("0110");
        let c1 = DiploidChromosome::new(a.clone(), b.clone()).unwrap();
        let c2 = DiploidChromosome::new(b, a).unwrap();
        assert_eq!(c1, c2);
        assert!(c1.hap1() <= c1.hap2());
        // canonicalization is idempotent
        let c3 = DiploidChromosome::new(c1.hap1().clone(), c1.hap2().clone()).unwrap();
        assert_eq!(c1, c3);
    }

    #[test]
    fn mismatched_haplotypes_rejected() {
        let a = Haplotype::from_str("10");
        let b = Haplotype::from_str("100");
        assert_eq!(
            DiploidChromosome::new(a, b),
            Err(GeneticsError::IncompatibleHaplotypes(2, 3))
        );
    }

    #[test]
    fn observable_state_counts_alleles() {
        let g = Genotype::from_strs("1100", "1010");
        let state = g.observable_state();
        assert_eq!(
            state.frequencies()[0],
            vec![
                AlleleFrequency::Twice,
                AlleleFrequency::Once,
                AlleleFrequency::Once,
                AlleleFrequency::Absent,
            ]
        );
    }

    #[test]
    fn cross_compatibility() {
        let a = Genotype::from_strs("10", "01");
        let b = Genotype::from_strs("11", "00");
        let c = Genotype::from_strs("110", "000");
        assert!(a.cross_compatible(&b));
        assert!(!a.cross_compatible(&c));
    }

    #[test]
    fn allele_score_against_ideotype() {
        let ideotype = Genotype::from_strs("1111", "1111");
        let g = Genotype::from_strs("1100", "1010");
        assert!((g.allele_score(&ideotype) - 4.0 / 8.0).abs() < 1e-12);
        assert_eq!(ideotype.allele_score(&ideotype), 1.0);
    }
}

//! Crate-wide error types.
//!
//! Two levels: `GeneticsError` covers construction-invariant violations that
//! abort a single candidate (the search continues), `ConfigError` covers
//! setup problems that are fatal before any search work begins.

use thiserror::Error;

/// Construction-invariant violations in the genotype model and schedule DAG.
///
/// These are recoverable at the search level: the offending candidate is
/// dropped and the search moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneticsError {
    #[error("haplotype must contain at least one locus")]
    EmptyHaplotype,

    #[error("genotype must contain at least one chromosome")]
    EmptyGenotype,

    #[error("haplotypes of a diploid chromosome differ in locus count ({0} vs {1})")]
    IncompatibleHaplotypes(usize, usize),

    #[error("genotypes are not cross-compatible: {0}")]
    IncompatibleGenotypes(String),

    #[error("cannot cross plants recorded at generations {0} and {1}")]
    ImpossibleCrossing(usize, usize),

    #[error("genotype is not contained in the seed lot")]
    GenotypeNotInSeedLot,

    #[error("plant cannot be grown at generation {plant} from a seed lot of generation {lot}")]
    PlantBeforeSeedLot { plant: usize, lot: usize },
}

/// Configuration problems detected before the search starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("duplicate constraint id: {0}")]
    DuplicateConstraint(String),

    #[error("invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("{bounds} occurrence bounds given for {probs} event probabilities")]
    InvalidOccurrenceBounds { probs: usize, bounds: usize },

    #[error("desired success probability must lie in (0, 1], got {0}")]
    InvalidSuccessProbability(f64),

    #[error("invalid heuristic configuration: {0}")]
    InvalidHeuristics(String),

    #[error("invalid search input: {0}")]
    InvalidInput(String),
}

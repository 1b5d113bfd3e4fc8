//! Genetic linkage map: inter-locus distances and derived recombination
//! probabilities.
//!
//! Distances are given in centimorgans between consecutive loci of each
//! chromosome. The pairwise recombination table is derived once at
//! construction through a pluggable [`MapFunction`]; cross-chromosome
//! recombination is not modeled (independent assortment).

use crate::errors::ConfigError;
use crate::genotypes::Genotype;

/// Distance to recombination-probability mapping function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFunction {
    Haldane,
    Kosambi,
}

impl MapFunction {
    /// Recombination probability for a distance in centimorgans, in [0, 0.5).
    pub fn recombination_rate(&self, d_cm: f64) -> f64 {
        let d = d_cm / 100.0;
        match self {
            MapFunction::Haldane => 0.5 * (1.0 - (-2.0 * d).exp()),
            MapFunction::Kosambi => 0.5 * (2.0 * d).tanh(),
        }
    }
}

/// Immutable per-chromosome distance table with a precomputed
/// upper-triangular pairwise recombination-probability table.
#[derive(Debug, Clone)]
pub struct GeneticMap {
    /// Per chromosome: distances (cM) between consecutive loci, length
    /// `n_loci - 1`.
    distances: Vec<Vec<f64>>,
    /// Per chromosome: full symmetric recombination matrix (diagonal 0).
    recombination: Vec<Vec<Vec<f64>>>,
    map_function: MapFunction,
}

impl GeneticMap {
    pub fn new(distances: Vec<Vec<f64>>, map_function: MapFunction) -> Result<Self, ConfigError> {
        if distances.is_empty() {
            return Err(ConfigError::InvalidInput(
                "genetic map must cover at least one chromosome".into(),
            ));
        }
        for ds in &distances {
            if let Some(&d) = ds.iter().find(|d| !d.is_finite() || **d < 0.0) {
                return Err(ConfigError::InvalidInput(format!(
                    "invalid inter-locus distance: {d}"
                )));
            }
        }
        let recombination = distances
            .iter()
            .map(|ds| {
                let n = ds.len() + 1;
                let mut m = vec![vec![0.0; n]; n];
                for i in 0..n {
                    let mut total = 0.0;
                    for j in i + 1..n {
                        total += ds[j - 1];
                        let r = map_function.recombination_rate(total);
                        m[i][j] = r;
                        m[j][i] = r;
                    }
                }
                m
            })
            .collect();
        Ok(Self {
            distances,
            recombination,
            map_function,
        })
    }

    pub fn map_function(&self) -> MapFunction {
        self.map_function
    }

    pub fn n_chromosomes(&self) -> usize {
        self.distances.len()
    }

    pub fn n_loci(&self, chromosome: usize) -> usize {
        self.distances[chromosome].len() + 1
    }

    /// Recombination probability between loci `i` and `j` (any order) on
    /// `chromosome`.
    pub fn recombination_rate(&self, chromosome: usize, i: usize, j: usize) -> f64 {
        self.recombination[chromosome][i][j]
    }

    /// Whether the map's dimensions match those of `genotype`.
    pub fn matches(&self, genotype: &Genotype) -> bool {
        genotype.n_chromosomes() == self.n_chromosomes()
            && (0..self.n_chromosomes()).all(|c| genotype.chromosome(c).n_loci() == self.n_loci(c))
    }
}

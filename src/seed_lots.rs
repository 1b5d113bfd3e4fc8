//! Offspring distributions of a single crossing or selfing.
//!
//! A [`SeedLot`] partitions the possible offspring genotypes into
//! [`GenotypeGroup`] buckets keyed by their allelic-frequency signature:
//! the classes a breeder can actually distinguish by marker screening.
//! Linkage-phase ambiguity of a genotype is defined within its bucket.

pub mod construction;

use crate::genotypes::{Genotype, ObservableState};
use std::collections::HashMap;

/// One observable allelic-frequency class of a seed lot.
#[derive(Debug, Clone)]
pub struct GenotypeGroup {
    /// Aggregate probability of the whole class. Kept fixed when individual
    /// genotypes are filtered out, since the class itself is still observed
    /// with this probability.
    probability: f64,
    genotypes: HashMap<Genotype, f64>,
}

impl GenotypeGroup {
    fn new() -> Self {
        Self {
            probability: 0.0,
            genotypes: HashMap::new(),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn n_genotypes(&self) -> usize {
        self.genotypes.len()
    }

    pub fn genotype_probability(&self, g: &Genotype) -> Option<f64> {
        self.genotypes.get(g).copied()
    }

    /// LPA(g) = 1 - p(g) / p(class): the chance that an individual observed
    /// in this class is in fact some other phase-variant.
    pub fn linkage_phase_ambiguity(&self, g: &Genotype) -> Option<f64> {
        let p = self.genotype_probability(g)?;
        if self.probability <= 0.0 {
            return Some(0.0);
        }
        Some((1.0 - p / self.probability).max(0.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Genotype, f64)> {
        self.genotypes.iter().map(|(g, &p)| (g, p))
    }
}

/// Probability distribution over the offspring genotypes of one crossing or
/// selfing, bucketed by observable class.
#[derive(Debug, Clone)]
pub struct SeedLot {
    /// True iff both parents were fully homozygous, so the lot holds a
    /// single deterministic offspring genotype.
    uniform: bool,
    groups: HashMap<ObservableState, GenotypeGroup>,
}

impl SeedLot {
    pub fn new(uniform: bool, genotypes: impl IntoIterator<Item = (Genotype, f64)>) -> Self {
        let mut groups: HashMap<ObservableState, GenotypeGroup> = HashMap::new();
        for (g, p) in genotypes {
            let group = groups.entry(g.observable_state()).or_insert_with(GenotypeGroup::new);
            group.probability += p;
            *group.genotypes.entry(g).or_insert(0.0) += p;
        }
        Self { uniform, groups }
    }

    /// Lot holding exactly one genotype with probability one. Used for the
    /// founder material, which is given rather than produced by a crossing.
    pub fn uniform(genotype: Genotype) -> Self {
        Self::new(true, [(genotype, 1.0)])
    }

    pub fn is_uniform(&self) -> bool {
        self.uniform
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn n_genotypes(&self) -> usize {
        self.groups.values().map(|g| g.n_genotypes()).sum()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&ObservableState, &GenotypeGroup)> {
        self.groups.iter()
    }

    pub fn group_of(&self, g: &Genotype) -> Option<&GenotypeGroup> {
        self.groups.get(&g.observable_state())
    }

    /// Absolute probability of obtaining `g` from one seed.
    pub fn probability_of(&self, g: &Genotype) -> Option<f64> {
        self.group_of(g)?.genotype_probability(g)
    }

    pub fn ambiguity_of(&self, g: &Genotype) -> Option<f64> {
        self.group_of(g)?.linkage_phase_ambiguity(g)
    }

    /// Sum of all bucket probabilities; at most 1 (strictly less when a
    /// restricted constructor generated only part of the distribution).
    pub fn total_probability(&self) -> f64 {
        self.groups.values().map(|g| g.probability).sum()
    }

    pub fn genotypes(&self) -> impl Iterator<Item = (&Genotype, f64)> {
        self.groups.values().flat_map(|g| g.iter())
    }

    /// Overrides a bucket's aggregate probability. Restricted constructors
    /// enumerate only part of a class, but the class is still observed with
    /// its full mass, which the LPA denominator must use.
    pub(crate) fn set_class_probability(&mut self, state: &ObservableState, probability: f64) {
        if let Some(group) = self.groups.get_mut(state) {
            group.probability = probability;
        }
    }

    /// Removes a single genotype; its bucket keeps its aggregate
    /// probability but is dropped entirely once empty.
    pub fn remove_genotype(&mut self, g: &Genotype) {
        let state = g.observable_state();
        if let Some(group) = self.groups.get_mut(&state) {
            group.genotypes.remove(g);
            if group.genotypes.is_empty() {
                self.groups.remove(&state);
            }
        }
    }

    /// Retains only genotypes for which `keep` returns true. The predicate
    /// sees the whole bucket, so filters may compare genotypes within a
    /// class.
    pub fn retain(&mut self, mut keep: impl FnMut(&GenotypeGroup, &Genotype, f64) -> bool) {
        for group in self.groups.values_mut() {
            let snapshot = group.clone();
            group
                .genotypes
                .retain(|g, &mut p| keep(&snapshot, g, p));
        }
        self.groups.retain(|_, g| !g.genotypes.is_empty());
    }
}

//! Dominance relations and constraints over schedule descriptors.

use crate::errors::ConfigError;
use crate::schedules::CrossingSchemeDescriptor;
use std::collections::HashSet;

/// Partial order over schedule descriptors. Implementations must be
/// irreflexive, asymmetric and transitive.
pub trait DominatesRelation: Send + Sync {
    fn dominates(&self, a: &CrossingSchemeDescriptor, b: &CrossingSchemeDescriptor) -> bool;
}

/// Standard Pareto dominance over (population size, LPA, generation count):
/// component-wise <= with at least one strict inequality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParetoDominance;

impl DominatesRelation for ParetoDominance {
    fn dominates(&self, a: &CrossingSchemeDescriptor, b: &CrossingSchemeDescriptor) -> bool {
        let leq = a.total_population <= b.total_population
            && a.lpa <= b.lpa
            && a.generations <= b.generations;
        let strict = a.total_population < b.total_population
            || a.lpa < b.lpa
            || a.generations < b.generations;
        leq && strict
    }
}

/// Restricted relation comparing population size only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PopulationDominance;

impl DominatesRelation for PopulationDominance {
    fn dominates(&self, a: &CrossingSchemeDescriptor, b: &CrossingSchemeDescriptor) -> bool {
        a.total_population < b.total_population
    }
}

/// Keeps the elements of `items` not dominated by any other element.
pub fn filter_non_dominating<T>(items: Vec<T>, dominates: impl Fn(&T, &T) -> bool) -> Vec<T> {
    let mut keeps = vec![true; items.len()];
    for i in 0..items.len() {
        if !keeps[i] {
            continue;
        }
        for j in i + 1..items.len() {
            if !keeps[j] {
                continue;
            }
            if dominates(&items[i], &items[j]) {
                keeps[j] = false;
            } else if dominates(&items[j], &items[i]) {
                keeps[i] = false;
                break;
            }
        }
    }
    items
        .into_iter()
        .zip(keeps)
        .filter_map(|(x, keep)| keep.then_some(x))
        .collect()
}

/// Stateless predicate over schedule descriptors, identified by a unique id.
pub trait Constraint: Send + Sync {
    fn id(&self) -> &str;
    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool;
}

pub struct MaxGenerations(pub usize);

impl Constraint for MaxGenerations {
    fn id(&self) -> &str {
        "max-generations"
    }

    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool {
        d.generations <= self.0
    }
}

pub struct MaxTotalCrossings(pub u64);

impl Constraint for MaxTotalCrossings {
    fn id(&self) -> &str {
        "max-total-crossings"
    }

    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool {
        d.total_crossings <= self.0
    }
}

pub struct MaxCrossingsWithPlant(pub u64);

impl Constraint for MaxCrossingsWithPlant {
    fn id(&self) -> &str {
        "max-crossings-with-plant"
    }

    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool {
        d.max_crossings_with_plant <= self.0
    }
}

pub struct MaxPopulationPerGeneration(pub u64);

impl Constraint for MaxPopulationPerGeneration {
    fn id(&self) -> &str {
        "max-population-per-generation"
    }

    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool {
        d.population_per_generation.iter().all(|&n| n <= self.0)
    }
}

pub struct MaxLinkagePhaseAmbiguity(pub f64);

impl Constraint for MaxLinkagePhaseAmbiguity {
    fn id(&self) -> &str {
        "max-linkage-phase-ambiguity"
    }

    fn is_satisfied(&self, d: &CrossingSchemeDescriptor) -> bool {
        d.lpa <= self.0
    }
}

/// Fails with [`ConfigError::DuplicateConstraint`] if two constraints share
/// an id.
pub fn validate_unique_ids(constraints: &[Box<dyn Constraint>]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for c in constraints {
        if !seen.insert(c.id().to_owned()) {
            return Err(ConfigError::DuplicateConstraint(c.id().to_owned()));
        }
    }
    Ok(())
}

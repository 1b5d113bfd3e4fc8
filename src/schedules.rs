//! Crossing-schedule DAG.
//!
//! A schedule is a layered DAG of seed-lot, plant and crossing nodes held in
//! a [`ScheduleArena`] and addressed by typed indices. Every
//! [`CrossingScheme`] owns its arena outright, so the "deep upward copy"
//! needed before merging two schemes is plain `Clone`, and merged schemes
//! can never share mutable sub-trees.

pub mod merge;
pub mod population;

use crate::errors::GeneticsError;
use crate::genotypes::Genotype;
use crate::seed_lots::SeedLot;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeedLotId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlantId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrossingId(pub(crate) usize);

/// A seed lot available from some generation onward. Founder lots have no
/// parent crossing and are available from generation 0.
#[derive(Debug, Clone)]
pub struct SeedLotNode {
    pub lot: Arc<SeedLot>,
    pub generation: usize,
    pub parent: Option<CrossingId>,
    /// Seeds withdrawn from this lot, per generation. A lot may be drawn
    /// from across several later generations.
    pub seeds_taken: BTreeMap<usize, u64>,
    pub children: Vec<PlantId>,
}

impl SeedLotNode {
    pub fn is_founder(&self) -> bool {
        self.parent.is_none()
    }

    pub fn total_seeds_taken(&self) -> u64 {
        // unattainable demands report u64::MAX per generation, so saturate
        self.seeds_taken.values().fold(0, |a, &n| a.saturating_add(n))
    }
}

/// A concrete plant grown at some generation from a seed lot. Identical
/// plants reused across several crossings are represented once with a
/// duplicate count.
#[derive(Debug, Clone)]
pub struct PlantNode {
    pub genotype: Genotype,
    /// Phase-known probability of obtaining this genotype from one seed.
    pub probability: f64,
    pub lpa: f64,
    pub generation: usize,
    pub lot: SeedLotId,
    pub duplicates: u64,
    pub crossings: Vec<CrossingId>,
    pub label: Option<String>,
}

/// A crossing (or selfing, when both parents are the same plant) performed
/// at the parents' generation, yielding one seed lot in the next
/// generation. Repeated identical crossings for seed volume are a duplicate
/// count.
#[derive(Debug, Clone)]
pub struct CrossingNode {
    pub parents: (PlantId, PlantId),
    pub child: SeedLotId,
    pub generation: usize,
    pub duplicates: u64,
}

impl CrossingNode {
    pub fn is_selfing(&self) -> bool {
        self.parents.0 == self.parents.1
    }
}

/// Arena owning all nodes of one (partial) schedule.
#[derive(Debug, Clone, Default)]
pub struct ScheduleArena {
    seed_lots: Vec<SeedLotNode>,
    plants: Vec<PlantNode>,
    crossings: Vec<CrossingNode>,
}

impl ScheduleArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_nodes(&self) -> usize {
        self.seed_lots.len() + self.plants.len() + self.crossings.len()
    }

    pub fn n_seed_lots(&self) -> usize {
        self.seed_lots.len()
    }

    pub fn n_plants(&self) -> usize {
        self.plants.len()
    }

    pub fn n_crossings(&self) -> usize {
        self.crossings.len()
    }

    pub fn seed_lot(&self, id: SeedLotId) -> &SeedLotNode {
        &self.seed_lots[id.0]
    }

    pub fn plant(&self, id: PlantId) -> &PlantNode {
        &self.plants[id.0]
    }

    pub fn crossing(&self, id: CrossingId) -> &CrossingNode {
        &self.crossings[id.0]
    }

    pub(crate) fn seed_lot_mut(&mut self, id: SeedLotId) -> &mut SeedLotNode {
        &mut self.seed_lots[id.0]
    }

    pub(crate) fn plant_mut(&mut self, id: PlantId) -> &mut PlantNode {
        &mut self.plants[id.0]
    }

    pub(crate) fn crossing_mut(&mut self, id: CrossingId) -> &mut CrossingNode {
        &mut self.crossings[id.0]
    }

    pub fn seed_lot_ids(&self) -> impl Iterator<Item = SeedLotId> {
        (0..self.seed_lots.len()).map(SeedLotId)
    }

    pub fn plant_ids(&self) -> impl Iterator<Item = PlantId> {
        (0..self.plants.len()).map(PlantId)
    }

    pub fn crossing_ids(&self) -> impl Iterator<Item = CrossingId> {
        (0..self.crossings.len()).map(CrossingId)
    }

    /// Adds a founder seed lot (generation 0, no parent crossing).
    pub fn add_founder_lot(&mut self, lot: Arc<SeedLot>) -> SeedLotId {
        self.seed_lots.push(SeedLotNode {
            lot,
            generation: 0,
            parent: None,
            seeds_taken: BTreeMap::new(),
            children: Vec::new(),
        });
        SeedLotId(self.seed_lots.len() - 1)
    }

    /// Grows a plant of `genotype` from `lot` at `generation`.
    ///
    /// The genotype must be contained in the lot and the generation must not
    /// precede the lot's.
    pub fn add_plant(
        &mut self,
        lot: SeedLotId,
        genotype: Genotype,
        generation: usize,
        label: Option<String>,
    ) -> Result<PlantId, GeneticsError> {
        let node = &self.seed_lots[lot.0];
        if generation < node.generation {
            return Err(GeneticsError::PlantBeforeSeedLot {
                plant: generation,
                lot: node.generation,
            });
        }
        let probability = node
            .lot
            .probability_of(&genotype)
            .ok_or(GeneticsError::GenotypeNotInSeedLot)?;
        let lpa = node
            .lot
            .ambiguity_of(&genotype)
            .ok_or(GeneticsError::GenotypeNotInSeedLot)?;
        self.plants.push(PlantNode {
            genotype,
            probability,
            lpa,
            generation,
            lot,
            duplicates: 1,
            crossings: Vec::new(),
            label,
        });
        let id = PlantId(self.plants.len() - 1);
        self.seed_lots[lot.0].children.push(id);
        Ok(id)
    }

    /// Performs a crossing (selfing when `p1 == p2`) and attaches its child
    /// seed lot one generation later.
    ///
    /// Both parents must be recorded at the same generation.
    pub fn add_crossing(
        &mut self,
        p1: PlantId,
        p2: PlantId,
        child_lot: Arc<SeedLot>,
    ) -> Result<(CrossingId, SeedLotId), GeneticsError> {
        let g1 = self.plants[p1.0].generation;
        let g2 = self.plants[p2.0].generation;
        if g1 != g2 {
            return Err(GeneticsError::ImpossibleCrossing(g1, g2));
        }
        self.seed_lots.push(SeedLotNode {
            lot: child_lot,
            generation: g1 + 1,
            parent: Some(CrossingId(self.crossings.len())),
            seeds_taken: BTreeMap::new(),
            children: Vec::new(),
        });
        let lot_id = SeedLotId(self.seed_lots.len() - 1);
        self.crossings.push(CrossingNode {
            parents: (p1, p2),
            child: lot_id,
            generation: g1,
            duplicates: 1,
        });
        let crossing_id = CrossingId(self.crossings.len() - 1);
        self.plants[p1.0].crossings.push(crossing_id);
        if p1 != p2 {
            self.plants[p2.0].crossings.push(crossing_id);
        }
        Ok((crossing_id, lot_id))
    }

    /// All ancestor plants of `plant` (excluding itself), following parent
    /// crossings upward.
    pub fn ancestor_plants(&self, plant: PlantId) -> Vec<PlantId> {
        let mut out = Vec::new();
        let mut stack = vec![plant];
        while let Some(p) = stack.pop() {
            let lot = &self.seed_lots[self.plants[p.0].lot.0];
            if let Some(c) = lot.parent {
                let (a, b) = self.crossings[c.0].parents;
                for q in [a, b] {
                    if !out.contains(&q) {
                        out.push(q);
                        stack.push(q);
                    }
                }
            }
        }
        out
    }
}

/// Cheap summary of a schedule used for constraint checks and dominance
/// comparison without touching the DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingSchemeDescriptor {
    pub total_population: u64,
    pub population_per_generation: Vec<u64>,
    pub generations: usize,
    pub lpa: f64,
    pub total_crossings: u64,
    pub max_crossings_with_plant: u64,
}

impl CrossingSchemeDescriptor {
    pub fn population_at(&self, generation: usize) -> u64 {
        self.population_per_generation
            .get(generation)
            .copied()
            .unwrap_or(0)
    }
}

/// Immutable snapshot of a (partial or complete) schedule rooted at one
/// target plant.
#[derive(Debug, Clone)]
pub struct CrossingScheme {
    arena: ScheduleArena,
    root: PlantId,
    descriptor: CrossingSchemeDescriptor,
}

impl CrossingScheme {
    /// Finalizes `arena` rooted at `root`: resolves population sizes and
    /// duplicate counts, then freezes the result.
    pub fn finalize(
        mut arena: ScheduleArena,
        root: PlantId,
        settings: &population::PopulationSettings,
    ) -> Self {
        let descriptor = population::resolve(&mut arena, root, settings);
        Self {
            arena,
            root,
            descriptor,
        }
    }

    pub fn arena(&self) -> &ScheduleArena {
        &self.arena
    }

    pub fn root(&self) -> PlantId {
        self.root
    }

    pub fn root_plant(&self) -> &PlantNode {
        self.arena.plant(self.root)
    }

    pub fn root_genotype(&self) -> &Genotype {
        &self.arena.plant(self.root).genotype
    }

    pub fn generations(&self) -> usize {
        self.arena.plant(self.root).generation
    }

    pub fn descriptor(&self) -> &CrossingSchemeDescriptor {
        &self.descriptor
    }

    pub fn reaches(&self, ideotype: &Genotype) -> bool {
        self.root_genotype() == ideotype
    }
}

//! Shared search state, configuration and the seed-lot cache.
//!
//! Branch-and-bound and MCTS are two control strategies over the same
//! domain model. Everything they have in common lives here: input
//! validation, the configuration surface, cached seed-lot construction and
//! single-step schedule extension.

pub mod branch_and_bound;
pub mod mcts;

use crate::errors::{ConfigError, GeneticsError};
use crate::frontier::{FrontierCallback, ParetoFrontier};
use crate::genetic_map::GeneticMap;
use crate::genotypes::{Genotype, Haplotype};
use crate::heuristics::{
    completion_lower_bound, parent_lot_pareto_optimal, AncestorImprovement, ConstructorChoice,
    FrontierHeuristic, GenotypeFrontiers, GenotypeImprovement, HeuristicsConfig,
    ImprovementSeedLotFilter, OffspringImprovement,
};
use crate::objectives::{
    validate_unique_ids, Constraint, DominatesRelation, ParetoDominance, PopulationDominance,
};
use crate::schedules::merge::merged_parents;
use crate::schedules::population::PopulationSettings;
use crate::schedules::{CrossingScheme, ScheduleArena};
use crate::seed_lots::construction::{
    ExhaustiveSeedLotConstructor, HeuristicSeedLotConstructor, SeedLotConstructor,
};
use crate::seed_lots::SeedLot;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The problem instance: founder genotypes, the ideotype to reach and the
/// genetic map covering them.
#[derive(Clone)]
pub struct SearchInput {
    pub founders: Vec<Genotype>,
    pub ideotype: Genotype,
    pub map: Arc<GeneticMap>,
}

impl SearchInput {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.founders.is_empty() {
            return Err(ConfigError::InvalidInput("no founder genotypes".into()));
        }
        for founder in &self.founders {
            if !founder.cross_compatible(&self.ideotype) {
                return Err(ConfigError::InvalidInput(format!(
                    "founder {founder} is not cross-compatible with the ideotype"
                )));
            }
        }
        if !self.map.matches(&self.ideotype) {
            return Err(ConfigError::InvalidInput(
                "genetic map does not cover the genotypes".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DominanceVariant {
    #[default]
    Pareto,
    PopulationOnly,
}

impl DominanceVariant {
    pub fn relation(&self) -> Arc<dyn DominatesRelation> {
        match self {
            DominanceVariant::Pareto => Arc::new(ParetoDominance),
            DominanceVariant::PopulationOnly => Arc::new(PopulationDominance),
        }
    }
}

/// Engine configuration, populated by the caller.
pub struct SearchConfig {
    /// Desired overall success probability, in (0, 1].
    pub success_probability: f64,
    pub seeds_per_crossing: u64,
    pub max_crossings_with_plant: Option<u64>,
    /// Hard cap on the generation count explored by the engines.
    pub max_generations: Option<usize>,
    pub constraints: Vec<Box<dyn Constraint>>,
    pub heuristics: HeuristicsConfig,
    pub dominance: DominanceVariant,
    /// Require both parents of an ideotype plant to be homozygous.
    pub homozygous_ideotype_parents: bool,
    pub runtime_limit: Option<Duration>,
    pub num_threads: Option<usize>,
    pub frontier_callback: Option<FrontierCallback>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            success_probability: 0.9,
            seeds_per_crossing: 100,
            max_crossings_with_plant: None,
            max_generations: Some(6),
            constraints: Vec::new(),
            heuristics: HeuristicsConfig::default(),
            dominance: DominanceVariant::default(),
            homozygous_ideotype_parents: false,
            runtime_limit: None,
            num_threads: None,
            frontier_callback: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.success_probability > 0.0 && self.success_probability <= 1.0) {
            return Err(ConfigError::InvalidSuccessProbability(
                self.success_probability,
            ));
        }
        validate_unique_ids(&self.constraints)?;
        self.heuristics.validate()
    }

    pub fn population_settings(&self) -> PopulationSettings {
        PopulationSettings {
            success_probability: self.success_probability,
            seeds_per_crossing: self.seeds_per_crossing,
            max_crossings_with_plant: self.max_crossings_with_plant,
        }
    }
}

struct CacheInner {
    fingerprint: String,
    lots: HashMap<(Genotype, Genotype), Arc<SeedLot>>,
    hits: u64,
    misses: u64,
}

/// Memoizes seed-lot construction by canonical parent-genotype pair.
///
/// The cache carries the fingerprint of the constructor/filter configuration
/// it was filled under; resetting with a different fingerprint drops all
/// entries, since filtered lots are not interchangeable across filter
/// configurations.
pub struct SeedLotCache {
    inner: Mutex<CacheInner>,
}

impl SeedLotCache {
    pub fn new(fingerprint: String) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                fingerprint,
                lots: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Clears the cache if `fingerprint` differs from the one it was filled
    /// under.
    pub fn reset(&self, fingerprint: String) {
        let mut inner = self.inner.lock().expect("seed lot cache poisoned");
        if inner.fingerprint != fingerprint {
            debug!(
                "seed lot cache: filter configuration changed, dropping {} entries",
                inner.lots.len()
            );
            inner.lots.clear();
            inner.fingerprint = fingerprint;
        }
    }

    pub fn get_or_build(
        &self,
        g1: &Genotype,
        g2: &Genotype,
        build: impl FnOnce() -> Result<SeedLot, GeneticsError>,
    ) -> Result<Arc<SeedLot>, GeneticsError> {
        let key = if g1 <= g2 {
            (g1.clone(), g2.clone())
        } else {
            (g2.clone(), g1.clone())
        };
        {
            let mut inner = self.inner.lock().expect("seed lot cache poisoned");
            if let Some(lot) = inner.lots.get(&key) {
                let lot = lot.clone();
                inner.hits += 1;
                return Ok(lot);
            }
            inner.misses += 1;
        }
        // built outside the critical section; concurrent builders of the
        // same pair race benignly
        let lot = Arc::new(build()?);
        let mut inner = self.inner.lock().expect("seed lot cache poisoned");
        Ok(inner.lots.entry(key).or_insert(lot).clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("seed lot cache poisoned").lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hit_rate(&self) -> f64 {
        let inner = self.inner.lock().expect("seed lot cache poisoned");
        let total = inner.hits + inner.misses;
        if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64
        }
    }
}

/// Everything one search run shares across workers.
pub struct SearchState {
    input: SearchInput,
    settings: PopulationSettings,
    heuristics: HeuristicsConfig,
    constraints: Vec<Box<dyn Constraint>>,
    dominance: Arc<dyn DominatesRelation>,
    constructor: Arc<dyn SeedLotConstructor>,
    filter: Option<ImprovementSeedLotFilter>,
    improvement: Option<GenotypeImprovement>,
    cache: SeedLotCache,
    frontier: Arc<ParetoFrontier>,
    genotype_frontiers: Option<GenotypeFrontiers>,
    homozygous_ideotype_parents: bool,
    deadline: Option<Instant>,
    /// When set, seed lots are restricted to genotypes built solely from
    /// these haplotypes (second phase of the restricted two-phase run).
    haplotype_restriction: Option<HashSet<Haplotype>>,
}

impl SearchState {
    pub fn new(input: SearchInput, config: SearchConfig) -> Result<Self, ConfigError> {
        input.validate()?;
        config.validate()?;

        let constructor: Arc<dyn SeedLotConstructor> = match config.heuristics.constructor {
            ConstructorChoice::Exhaustive => {
                Arc::new(ExhaustiveSeedLotConstructor::new(input.map.clone()))
            }
            ConstructorChoice::Heuristic {
                consistent,
                max_crossovers,
            } => Arc::new(HeuristicSeedLotConstructor::new(
                input.map.clone(),
                input.ideotype.clone(),
                consistent,
                max_crossovers,
            )),
        };
        let improvement = config.heuristics.improvement_mode().map(|mode| {
            GenotypeImprovement::new(input.ideotype.clone(), input.map.clone(), mode)
        });
        let filter = match config.heuristics.offspring_improvement {
            OffspringImprovement::Off => None,
            _ => improvement
                .clone()
                .map(ImprovementSeedLotFilter::new),
        };

        let dominance = config.dominance.relation();
        let frontier = match &config.frontier_callback {
            Some(callback) => Arc::new(ParetoFrontier::with_callback(
                dominance.clone(),
                callback.clone(),
            )),
            None => Arc::new(ParetoFrontier::new(dominance.clone())),
        };
        let genotype_frontiers = match config.heuristics.queued_frontiers {
            FrontierHeuristic::Off => None,
            _ => Some(GenotypeFrontiers::new()),
        };

        Ok(Self {
            settings: config.population_settings(),
            heuristics: config.heuristics.clone(),
            constraints: config.constraints,
            dominance,
            constructor,
            filter,
            improvement,
            cache: SeedLotCache::new(config.heuristics.lot_fingerprint()),
            frontier,
            genotype_frontiers,
            homozygous_ideotype_parents: config.homozygous_ideotype_parents,
            deadline: config.runtime_limit.map(|limit| Instant::now() + limit),
            haplotype_restriction: None,
            input,
        })
    }

    pub fn input(&self) -> &SearchInput {
        &self.input
    }

    pub fn frontier(&self) -> &Arc<ParetoFrontier> {
        &self.frontier
    }

    pub fn cache(&self) -> &SeedLotCache {
        &self.cache
    }

    pub fn dominance(&self) -> &Arc<dyn DominatesRelation> {
        &self.dominance
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub(crate) fn disable_genotype_frontiers(&mut self) {
        self.genotype_frontiers = None;
    }

    pub(crate) fn restrict_haplotypes(&mut self, haplotypes: HashSet<Haplotype>) {
        self.haplotype_restriction = Some(haplotypes);
        // restriction filters lots, so cached unrestricted lots are stale
        self.cache
            .reset(format!("{}/restricted", self.heuristics.lot_fingerprint()));
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn satisfies_constraints(&self, scheme: &CrossingScheme) -> bool {
        self.constraints
            .iter()
            .all(|c| c.is_satisfied(scheme.descriptor()))
    }

    /// One single-plant scheme per founder, after optional founder
    /// filtering.
    pub fn founder_schemes(&self) -> Result<Vec<CrossingScheme>, GeneticsError> {
        let founders = match (&self.improvement, self.heuristics.filter_founders) {
            (Some(improvement), true) => improvement.filter_founders(&self.input.founders),
            _ => self.input.founders.clone(),
        };
        founders
            .into_iter()
            .enumerate()
            .map(|(i, founder)| {
                let mut arena = ScheduleArena::new();
                let lot = arena.add_founder_lot(Arc::new(SeedLot::uniform(founder.clone())));
                let label = Some(format!("F{}", i + 1));
                let plant = arena.add_plant(lot, founder, 0, label)?;
                Ok(CrossingScheme::finalize(arena, plant, &self.settings))
            })
            .collect()
    }

    fn offspring_lot(&self, g1: &Genotype, g2: &Genotype) -> Result<Arc<SeedLot>, GeneticsError> {
        let lot = self.cache.get_or_build(g1, g2, || {
            let mut lot = self.constructor.cross(g1, g2)?;
            if let Some(filter) = &self.filter {
                filter.apply_against_parents(&mut lot, g1, g2);
                filter.apply(&mut lot);
            }
            if let Some(haplotypes) = &self.haplotype_restriction {
                lot.retain(|_, genotype, _| {
                    genotype.chromosomes().iter().all(|c| {
                        haplotypes.contains(c.hap1()) && haplotypes.contains(c.hap2())
                    })
                });
            }
            Ok(lot)
        })?;
        Ok(lot)
    }

    /// Grows one child plant out of a prepared arena and runs it through the
    /// heuristic and constraint gauntlet. Complete schemes go straight to
    /// the frontier; partial survivors are returned for the queue.
    fn admit_offspring(
        &self,
        arena: &ScheduleArena,
        lot_id: crate::schedules::SeedLotId,
        genotype: &Genotype,
        generation: usize,
        parents_homozygous: bool,
    ) -> Option<CrossingScheme> {
        if self.homozygous_ideotype_parents
            && *genotype == self.input.ideotype
            && !parents_homozygous
        {
            return None;
        }
        let mut arena = arena.clone();
        let plant = match arena.add_plant(lot_id, genotype.clone(), generation, None) {
            Ok(plant) => plant,
            Err(err) => {
                trace!("offspring {genotype} rejected: {err}");
                return None;
            }
        };
        if let (Some(improvement), true) = (
            &self.improvement,
            self.heuristics.ancestor_improvement != AncestorImprovement::Off,
        ) {
            if !improvement.improves_on_ancestors(&arena, plant) {
                return None;
            }
        }
        if self.heuristics.pareto_optimal_parent_lots && !parent_lot_pareto_optimal(&arena, plant)
        {
            return None;
        }
        let scheme = CrossingScheme::finalize(arena, plant, &self.settings);
        if !self.satisfies_constraints(&scheme) {
            return None;
        }
        if self.heuristics.completion_bound {
            let bound =
                completion_lower_bound(scheme.descriptor(), genotype, &self.input.ideotype);
            if self.frontier.dominates(&bound) {
                return None;
            }
        }
        if scheme.reaches(&self.input.ideotype) {
            self.frontier.add(scheme);
            return None;
        }
        if let Some(frontiers) = &self.genotype_frontiers {
            if !frontiers.admit(genotype, scheme.descriptor(), self.dominance.as_ref()) {
                return None;
            }
        }
        Some(scheme)
    }

    /// All partial schedules produced by crossing the roots of two schemes,
    /// one per surviving (alignment, offspring genotype) combination.
    pub fn extend_pair(&self, a: &CrossingScheme, b: &CrossingScheme) -> Vec<CrossingScheme> {
        if self.deadline_expired() {
            return Vec::new();
        }
        let ga = a.root_genotype().clone();
        let gb = b.root_genotype().clone();
        let lot = match self.offspring_lot(&ga, &gb) {
            Ok(lot) => lot,
            Err(err) => {
                trace!("crossing {ga} x {gb} rejected: {err}");
                return Vec::new();
            }
        };
        if lot.n_genotypes() == 0 {
            return Vec::new();
        }
        let merged = match merged_parents(
            a,
            b,
            &self.settings,
            self.dominance.as_ref(),
            self.heuristics.tree_mode,
        ) {
            Ok(merged) => merged,
            Err(err) => {
                trace!("merge of {ga} x {gb} rejected: {err}");
                return Vec::new();
            }
        };
        let parents_homozygous = ga.is_homozygous() && gb.is_homozygous();
        let mut out = Vec::new();
        for pair in merged {
            if self.deadline_expired() {
                break;
            }
            let mut arena = pair.arena;
            let Ok((_, lot_id)) =
                arena.add_crossing(pair.first_parent, pair.second_parent, lot.clone())
            else {
                continue;
            };
            let generation = arena.seed_lot(lot_id).generation;
            for (genotype, _) in lot.genotypes() {
                if let Some(scheme) =
                    self.admit_offspring(&arena, lot_id, genotype, generation, parents_homozygous)
                {
                    out.push(scheme);
                }
            }
        }
        out
    }

    /// All partial schedules produced by selfing the root of `a`. In tree
    /// mode only the terminal selfing into the ideotype is allowed.
    pub fn extend_self(&self, a: &CrossingScheme) -> Vec<CrossingScheme> {
        if self.deadline_expired() {
            return Vec::new();
        }
        let g = a.root_genotype().clone();
        let lot = match self.offspring_lot(&g, &g) {
            Ok(lot) => lot,
            Err(err) => {
                trace!("selfing of {g} rejected: {err}");
                return Vec::new();
            }
        };
        let parents_homozygous = g.is_homozygous();
        let mut arena = a.arena().clone();
        let Ok((_, lot_id)) = arena.add_crossing(a.root(), a.root(), lot.clone()) else {
            return Vec::new();
        };
        let generation = arena.seed_lot(lot_id).generation;
        let mut out = Vec::new();
        for (genotype, _) in lot.genotypes() {
            if self.heuristics.tree_mode && *genotype != self.input.ideotype {
                continue;
            }
            if let Some(scheme) =
                self.admit_offspring(&arena, lot_id, genotype, generation, parents_homozygous)
            {
                out.push(scheme);
            }
        }
        out
    }
}

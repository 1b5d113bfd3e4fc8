//! Population-size resolution.
//!
//! Converts the desired overall success probability into required seed
//! counts per node of a schedule. The global probability is apportioned as
//! `gamma' = gamma^(1/T)` over the T non-uniform targets, so the per-target
//! successes multiply out to at least the requested level. Seed-lot
//! depletion is recovered locally by raising the responsible crossing's
//! duplicate count, which may in turn raise plant duplicates and seed
//! counts; the loop runs to a fixpoint.

use crate::probability::prob_min_occ;
use crate::schedules::{CrossingSchemeDescriptor, PlantId, ScheduleArena, SeedLotId};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct PopulationSettings {
    /// Desired overall success probability, in (0, 1].
    pub success_probability: f64,
    /// Seeds produced by one performed crossing.
    pub seeds_per_crossing: u64,
    /// How many crossings a single physical plant supports; `None` means
    /// unlimited, so plant duplicates stay at one.
    pub max_crossings_with_plant: Option<u64>,
}

/// Smallest `n` such that `n` Bernoulli trials with success probability `p`
/// yield at least one success with probability `target` or better. Returns
/// `u64::MAX` when no finite count certifies the target.
pub fn required_seeds_single(p: f64, target: f64) -> u64 {
    if p >= 1.0 {
        return 1;
    }
    if p <= 0.0 || target >= 1.0 {
        return u64::MAX;
    }
    let n = ((1.0 - target).ln() / (1.0 - p).ln()).ceil() as u64;
    n.max(1)
}

/// Seed counts beyond this are treated as unattainable demand; evaluating
/// the joint occurrence probability at such counts is prohibitively slow
/// and the schedule is hopeless anyway.
const SEED_CAP: u64 = 1 << 20;

/// Smallest `n` such that `n` seeds simultaneously yield at least
/// `duplicates[i]` plants of each target genotype `i` (probability
/// `probs[i]` per seed) with joint probability `target` or better.
pub fn required_seeds_joint(probs: &[f64], duplicates: &[u64], target: f64) -> u64 {
    debug_assert_eq!(probs.len(), duplicates.len());
    if probs.is_empty() {
        return 0;
    }
    let min_occ: Vec<usize> = duplicates.iter().map(|&d| d as usize).collect();
    let satisfied = |n: u64| {
        prob_min_occ(probs, &min_occ, n as usize)
            .map(|q| q >= target)
            .unwrap_or(false)
    };
    let mut lo = probs
        .iter()
        .zip(duplicates)
        .map(|(&p, &d)| required_seeds_single(p, target).max(d))
        .max()
        .unwrap_or(1);
    if lo >= SEED_CAP {
        // unattainable demand (target 1.0, or a zero-probability genotype);
        // never hand a count this size to `prob_min_occ`
        return lo;
    }
    if satisfied(lo) {
        return lo;
    }
    let mut hi = lo.max(1);
    while !satisfied(hi) {
        hi = hi.saturating_mul(2);
        if hi >= SEED_CAP {
            // pathological target; cap rather than loop forever
            return hi;
        }
    }
    // smallest satisfying count in (lo, hi]
    while lo + 1 < hi {
        let mid = lo + (hi - lo) / 2;
        if satisfied(mid) {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Resolves duplicate counts and seed withdrawals for the schedule rooted
/// at `root` and derives its descriptor.
pub fn resolve(
    arena: &mut ScheduleArena,
    root: PlantId,
    settings: &PopulationSettings,
) -> CrossingSchemeDescriptor {
    let plant_ids: Vec<PlantId> = arena.plant_ids().collect();
    let seeds_per_crossing = settings.seeds_per_crossing.max(1);

    let n_targets = plant_ids
        .iter()
        .filter(|&&p| !arena.seed_lot(arena.plant(p).lot).lot.is_uniform())
        .count();
    let per_target = if n_targets == 0 {
        settings.success_probability
    } else {
        settings
            .success_probability
            .powf(1.0 / n_targets as f64)
    };

    // duplicate counts only ever grow, so this reaches a fixpoint
    for _ in 0..64 {
        for &p in &plant_ids {
            let uses: u64 = arena
                .plant(p)
                .crossings
                .iter()
                .map(|&c| arena.crossing(c).duplicates)
                .fold(0, u64::saturating_add);
            let dups = match settings.max_crossings_with_plant {
                Some(k) if k > 0 => uses.div_ceil(k).max(1),
                _ => 1,
            };
            arena.plant_mut(p).duplicates = dups;
        }

        let lot_ids: Vec<SeedLotId> = arena.seed_lot_ids().collect();
        for &l in &lot_ids {
            arena.seed_lot_mut(l).seeds_taken.clear();
        }
        let mut grown: BTreeMap<(SeedLotId, usize), Vec<PlantId>> = BTreeMap::new();
        for &p in &plant_ids {
            let node = arena.plant(p);
            grown.entry((node.lot, node.generation)).or_default().push(p);
        }
        for ((lot_id, generation), plants) in &grown {
            let uniform = arena.seed_lot(*lot_id).lot.is_uniform();
            let seeds = if uniform {
                plants
                    .iter()
                    .map(|&p| arena.plant(p).duplicates)
                    .fold(0, u64::saturating_add)
            } else {
                let probs: Vec<f64> =
                    plants.iter().map(|&p| arena.plant(p).probability).collect();
                let dups: Vec<u64> =
                    plants.iter().map(|&p| arena.plant(p).duplicates).collect();
                let joint_target = per_target.powi(plants.len() as i32);
                required_seeds_joint(&probs, &dups, joint_target)
            };
            arena
                .seed_lot_mut(*lot_id)
                .seeds_taken
                .insert(*generation, seeds);
        }

        let mut changed = false;
        for c in 0..arena.n_crossings() {
            let c = crate::schedules::CrossingId(c);
            let child = arena.crossing(c).child;
            let taken = arena.seed_lot(child).total_seeds_taken();
            let needed = taken.div_ceil(seeds_per_crossing).max(1);
            if needed > arena.crossing(c).duplicates {
                arena.crossing_mut(c).duplicates = needed;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let generations = arena.plant(root).generation;
    let mut per_gen: BTreeMap<usize, u64> = BTreeMap::new();
    for l in arena.seed_lot_ids() {
        for (&g, &n) in &arena.seed_lot(l).seeds_taken {
            let e = per_gen.entry(g).or_insert(0);
            *e = e.saturating_add(n);
        }
    }
    let last = per_gen.keys().next_back().copied().unwrap_or(0).max(generations);
    let population_per_generation: Vec<u64> =
        (0..=last).map(|g| per_gen.get(&g).copied().unwrap_or(0)).collect();
    let total_population = population_per_generation
        .iter()
        .fold(0, |a: u64, &n| a.saturating_add(n));
    let total_crossings = arena
        .crossing_ids()
        .map(|c| arena.crossing(c).duplicates)
        .fold(0, u64::saturating_add);
    let max_crossings_with_plant = plant_ids
        .iter()
        .map(|&p| {
            arena
                .plant(p)
                .crossings
                .iter()
                .map(|&c| arena.crossing(c).duplicates)
                .fold(0, u64::saturating_add)
        })
        .max()
        .unwrap_or(0);
    let lpa = 1.0
        - plant_ids
            .iter()
            .map(|&p| 1.0 - arena.plant(p).lpa)
            .product::<f64>();

    CrossingSchemeDescriptor {
        total_population,
        population_per_generation,
        generations,
        lpa: lpa.clamp(0.0, 1.0),
        total_crossings,
        max_crossings_with_plant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_map::{GeneticMap, MapFunction};
    use crate::genotypes::Genotype;
    use crate::seed_lots::construction::{ExhaustiveSeedLotConstructor, SeedLotConstructor};
    use crate::seed_lots::SeedLot;
    use std::sync::Arc;

    #[test]
    fn single_target_closed_form() {
        // 1 - (1-p)^n >= 0.9 with p = 0.25 requires n = 9
        assert_eq!(required_seeds_single(0.25, 0.9), 9);
        assert_eq!(required_seeds_single(1.0, 0.99), 1);
        assert_eq!(required_seeds_single(0.5, 0.5), 1);
    }

    #[test]
    fn certain_success_is_reported_unattainable() {
        // no finite seed count certifies success probability 1.0 when a
        // single draw can fail; the joint search must not evaluate the
        // occurrence probability at astronomical counts
        assert_eq!(required_seeds_single(0.2, 1.0), u64::MAX);
        assert_eq!(required_seeds_joint(&[0.2], &[1], 1.0), u64::MAX);
        assert_eq!(required_seeds_joint(&[0.5, 0.2], &[1, 2], 1.0), u64::MAX);
        // a deterministic draw still needs exactly one seed
        assert_eq!(required_seeds_single(1.0, 1.0), 1);
    }

    #[test]
    fn joint_requirement_at_least_individual() {
        let joint = required_seeds_joint(&[0.25, 0.25], &[1, 1], 0.9);
        assert!(joint >= required_seeds_single(0.25, 0.9));
        // must actually satisfy the joint bound
        let q = prob_min_occ(&[0.25, 0.25], &[1, 1], joint as usize).unwrap();
        assert!(q >= 0.9);
        let q_less = prob_min_occ(&[0.25, 0.25], &[1, 1], joint as usize - 1).unwrap();
        assert!(q_less < 0.9);
    }

    #[test]
    fn duplicates_raise_the_requirement() {
        let one = required_seeds_joint(&[0.2], &[1], 0.9);
        let three = required_seeds_joint(&[0.2], &[3], 0.9);
        assert!(three > one);
        assert!(three >= 3);
    }

    #[test]
    fn depletion_raises_crossing_duplicates() {
        // a child plant with low probability needs far more seeds than one
        // crossing supplies, so the crossing duplicate count must grow
        let map = Arc::new(GeneticMap::new(vec![vec![20.0]], MapFunction::Haldane).unwrap());
        let ctor = ExhaustiveSeedLotConstructor::new(map.clone());
        let f1 = Genotype::from_strs("10", "01");
        let f2 = Genotype::from_strs("00", "00");
        let mut arena = crate::schedules::ScheduleArena::new();
        let l1 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f1.clone())));
        let l2 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f2.clone())));
        let p1 = arena.add_plant(l1, f1.clone(), 0, None).unwrap();
        let p2 = arena.add_plant(l2, f2.clone(), 0, None).unwrap();
        let (c, l3) = arena
            .add_crossing(p1, p2, Arc::new(ctor.cross(&f1, &f2).unwrap()))
            .unwrap();
        // the recombinant 11 gamete is rare, so this target is expensive
        let target = Genotype::from_strs("11", "00");
        let p3 = arena.add_plant(l3, target, 1, None).unwrap();
        let settings = PopulationSettings {
            success_probability: 0.99,
            seeds_per_crossing: 10,
            max_crossings_with_plant: None,
        };
        let d = resolve(&mut arena, p3, &settings);
        assert!(arena.seed_lot(l3).total_seeds_taken() > 10);
        assert!(arena.crossing(c).duplicates > 1);
        assert_eq!(d.generations, 1);
        assert_eq!(d.total_crossings, arena.crossing(c).duplicates);
        assert!(d.total_population > d.population_per_generation[0]);
    }

    #[test]
    fn uniform_schedule_costs_one_seed_per_plant() {
        let f1 = Genotype::from_strs("11", "11");
        let mut arena = crate::schedules::ScheduleArena::new();
        let l1 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f1.clone())));
        let p1 = arena.add_plant(l1, f1, 0, None).unwrap();
        let settings = PopulationSettings {
            success_probability: 0.9,
            seeds_per_crossing: 100,
            max_crossings_with_plant: None,
        };
        let d = resolve(&mut arena, p1, &settings);
        assert_eq!(d.total_population, 1);
        assert_eq!(d.lpa, 0.0);
        assert_eq!(d.generations, 0);
    }
}

//! Pairwise merging of partial schedules.
//!
//! Crossing the target plants of two partial schemes requires both plants
//! to sit at the same generation. The deeper scheme keeps its layout; the
//! shallower one is realigned, and every structurally distinct assignment
//! of its internal crossing generations is enumerated. Alignments that let
//! identical material coincide collapse into shared nodes with duplicate
//! counts, so alignments are finally dominance-pruned against each other.

use crate::errors::GeneticsError;
use crate::genotypes::Genotype;
use crate::objectives::{filter_non_dominating, DominatesRelation};
use crate::schedules::population::{self, PopulationSettings};
use crate::schedules::{
    CrossingId, CrossingScheme, PlantId, ScheduleArena, SeedLotId,
};
use log::debug;
use std::collections::{HashMap, VecDeque};

/// Deep schemes admit combinatorially many alignments; enumeration stops at
/// this count and logs the truncation.
const MAX_ALIGNMENTS: usize = 512;

/// One merged arena with both target plants brought to a common generation,
/// ready for the new crossing.
pub struct MergedPair {
    pub arena: ScheduleArena,
    pub first_parent: PlantId,
    pub second_parent: PlantId,
}

/// Merges two partial schemes for a crossing of their target plants,
/// returning every alignment not dominated by another alignment of the same
/// pair.
pub fn merged_parents(
    a: &CrossingScheme,
    b: &CrossingScheme,
    settings: &PopulationSettings,
    dominance: &dyn DominatesRelation,
    tree_mode: bool,
) -> Result<Vec<MergedPair>, GeneticsError> {
    let (base, aligned) = if a.generations() >= b.generations() {
        (a, b)
    } else {
        (b, a)
    };
    let target_generation = base.generations();

    let assignments =
        enumerate_alignments(aligned.arena(), aligned.root(), target_generation);

    let mut candidates = Vec::new();
    for plant_generations in assignments {
        let mut arena = base.arena().clone();
        let mut merger = Merger {
            source: aligned.arena(),
            plant_generations: &plant_generations,
            tree_mode,
            lot_map: HashMap::new(),
            plant_map: HashMap::new(),
            crossing_map: HashMap::new(),
        };
        let aligned_root = merger.insert_plant(&mut arena, aligned.root())?;
        let descriptor = population::resolve(&mut arena, base.root(), settings);
        candidates.push((
            descriptor,
            MergedPair {
                arena,
                first_parent: base.root(),
                second_parent: aligned_root,
            },
        ));
    }

    let kept = filter_non_dominating(candidates, |(da, _), (db, _)| {
        dominance.dominates(da, db)
    });
    Ok(kept.into_iter().map(|(_, pair)| pair).collect())
}

/// Enumerates every consistent assignment of generations to the plants of
/// `arena`, with `root` pinned at `target_generation`. One assignment per
/// structurally distinct choice of crossing generations.
fn enumerate_alignments(
    arena: &ScheduleArena,
    root: PlantId,
    target_generation: usize,
) -> Vec<HashMap<PlantId, usize>> {
    let order = crossing_order(arena, root);
    let heights = crossing_heights(arena);
    let mut plant_generations = HashMap::from([(root, target_generation)]);
    let mut crossing_generations = HashMap::new();
    let mut out = Vec::new();
    backtrack(
        arena,
        &order,
        0,
        &heights,
        &mut plant_generations,
        &mut crossing_generations,
        &mut out,
    );
    if out.len() >= MAX_ALIGNMENTS {
        debug!(
            "alignment enumeration truncated at {MAX_ALIGNMENTS} assignments \
             for a {}-crossing scheme",
            order.len()
        );
    }
    out
}

/// Crossings in discovery order from the root: every crossing appears after
/// the crossings consuming its offspring.
fn crossing_order(arena: &ScheduleArena, root: PlantId) -> Vec<CrossingId> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(p) = queue.pop_front() {
        if let Some(c) = arena.seed_lot(arena.plant(p).lot).parent {
            if seen.insert(c) {
                order.push(c);
                let (q1, q2) = arena.crossing(c).parents;
                queue.push_back(q1);
                if q2 != q1 {
                    queue.push_back(q2);
                }
            }
        }
    }
    order
}

/// Minimal feasible generation of each crossing: founder parents can be
/// grown at generation 0, everything else one generation after its
/// producing crossing.
fn crossing_heights(arena: &ScheduleArena) -> HashMap<CrossingId, usize> {
    fn height(
        arena: &ScheduleArena,
        c: CrossingId,
        memo: &mut HashMap<CrossingId, usize>,
    ) -> usize {
        if let Some(&h) = memo.get(&c) {
            return h;
        }
        let (q1, q2) = arena.crossing(c).parents;
        let h = [q1, q2]
            .into_iter()
            .map(|q| match arena.seed_lot(arena.plant(q).lot).parent {
                None => 0,
                Some(producer) => height(arena, producer, memo) + 1,
            })
            .max()
            .expect("crossing has two parents");
        memo.insert(c, h);
        h
    }
    let mut memo = HashMap::new();
    for c in arena.crossing_ids() {
        height(arena, c, &mut memo);
    }
    memo
}

#[allow(clippy::too_many_arguments)]
fn backtrack(
    arena: &ScheduleArena,
    order: &[CrossingId],
    idx: usize,
    heights: &HashMap<CrossingId, usize>,
    plant_generations: &mut HashMap<PlantId, usize>,
    crossing_generations: &mut HashMap<CrossingId, usize>,
    out: &mut Vec<HashMap<PlantId, usize>>,
) {
    if out.len() >= MAX_ALIGNMENTS {
        return;
    }
    if idx == order.len() {
        out.push(plant_generations.clone());
        return;
    }
    let c = order[idx];
    let node = arena.crossing(c);
    let lot = arena.seed_lot(node.child);
    let hi = lot
        .children
        .iter()
        .filter_map(|p| plant_generations.get(p))
        .map(|&g| g.saturating_sub(1))
        .min();
    let Some(hi) = hi else {
        // no consumer assigned yet; cannot happen for schemes rooted at one plant
        return;
    };
    let lo = heights[&c];
    let (q1, q2) = node.parents;
    for gc in lo..=hi {
        let mut inserted = Vec::new();
        let mut ok = true;
        for q in [q1, q2] {
            match plant_generations.get(&q) {
                Some(&gq) => {
                    if gq != gc {
                        ok = false;
                        break;
                    }
                }
                None => {
                    // a producing crossing processed earlier must stay strictly before
                    if let Some(producer) = arena.seed_lot(arena.plant(q).lot).parent {
                        if let Some(&gp) = crossing_generations.get(&producer) {
                            if gp + 1 > gc {
                                ok = false;
                                break;
                            }
                        }
                    }
                    plant_generations.insert(q, gc);
                    inserted.push(q);
                }
            }
        }
        if ok {
            crossing_generations.insert(c, gc);
            backtrack(
                arena,
                order,
                idx + 1,
                heights,
                plant_generations,
                crossing_generations,
                out,
            );
            crossing_generations.remove(&c);
        }
        for q in inserted {
            plant_generations.remove(&q);
        }
    }
}

/// Copies the aligned arena into the merged one, reusing structurally
/// identical nodes of the base (unless tree mode forbids sharing).
struct Merger<'a> {
    source: &'a ScheduleArena,
    plant_generations: &'a HashMap<PlantId, usize>,
    tree_mode: bool,
    lot_map: HashMap<SeedLotId, SeedLotId>,
    plant_map: HashMap<PlantId, PlantId>,
    crossing_map: HashMap<CrossingId, (CrossingId, SeedLotId)>,
}

impl Merger<'_> {
    fn insert_plant(
        &mut self,
        arena: &mut ScheduleArena,
        p: PlantId,
    ) -> Result<PlantId, GeneticsError> {
        if let Some(&mapped) = self.plant_map.get(&p) {
            return Ok(mapped);
        }
        let node = self.source.plant(p);
        let generation = *self
            .plant_generations
            .get(&p)
            .unwrap_or(&node.generation);
        let lot = self.insert_lot(arena, node.lot)?;
        let existing = (!self.tree_mode)
            .then(|| {
                arena.plant_ids().find(|&q| {
                    let other = arena.plant(q);
                    other.lot == lot
                        && other.generation == generation
                        && other.genotype == node.genotype
                })
            })
            .flatten();
        let mapped = match existing {
            Some(q) => q,
            None => arena.add_plant(lot, node.genotype.clone(), generation, node.label.clone())?,
        };
        self.plant_map.insert(p, mapped);
        Ok(mapped)
    }

    fn insert_lot(
        &mut self,
        arena: &mut ScheduleArena,
        l: SeedLotId,
    ) -> Result<SeedLotId, GeneticsError> {
        if let Some(&mapped) = self.lot_map.get(&l) {
            return Ok(mapped);
        }
        let node = self.source.seed_lot(l);
        let mapped = match node.parent {
            None => {
                let genotype = founder_genotype(node.lot.as_ref());
                let existing = arena.seed_lot_ids().find(|&m| {
                    let other = arena.seed_lot(m);
                    other.is_founder()
                        && founder_genotype(other.lot.as_ref()) == genotype
                });
                match existing {
                    Some(m) => m,
                    None => arena.add_founder_lot(node.lot.clone()),
                }
            }
            Some(c) => self.insert_crossing(arena, c)?.1,
        };
        self.lot_map.insert(l, mapped);
        Ok(mapped)
    }

    fn insert_crossing(
        &mut self,
        arena: &mut ScheduleArena,
        c: CrossingId,
    ) -> Result<(CrossingId, SeedLotId), GeneticsError> {
        if let Some(&mapped) = self.crossing_map.get(&c) {
            return Ok(mapped);
        }
        let (q1, q2) = self.source.crossing(c).parents;
        let m1 = self.insert_plant(arena, q1)?;
        let m2 = self.insert_plant(arena, q2)?;
        let existing = (!self.tree_mode)
            .then(|| {
                arena.crossing_ids().find(|&k| {
                    let other = arena.crossing(k).parents;
                    other == (m1, m2) || other == (m2, m1)
                })
            })
            .flatten();
        let mapped = match existing {
            Some(k) => (k, arena.crossing(k).child),
            None => {
                let lot = self.source.seed_lot(self.source.crossing(c).child).lot.clone();
                arena.add_crossing(m1, m2, lot)?
            }
        };
        self.crossing_map.insert(c, mapped);
        Ok(mapped)
    }
}

fn founder_genotype(lot: &crate::seed_lots::SeedLot) -> Option<Genotype> {
    let mut it = lot.genotypes();
    let first = it.next().map(|(g, _)| g.clone());
    if it.next().is_some() {
        return None;
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_map::{GeneticMap, MapFunction};
    use crate::objectives::ParetoDominance;
    use crate::seed_lots::construction::{ExhaustiveSeedLotConstructor, SeedLotConstructor};
    use crate::seed_lots::SeedLot;
    use std::sync::Arc;

    fn settings() -> PopulationSettings {
        PopulationSettings {
            success_probability: 0.9,
            seeds_per_crossing: 1000,
            max_crossings_with_plant: None,
        }
    }

    fn founder(s: &str) -> Genotype {
        Genotype::from_strs(s, s)
    }

    fn scheme_a(ctor: &ExhaustiveSeedLotConstructor) -> CrossingScheme {
        // F1 x F2 -> a1@1; a1 self -> a2@2; a2 self -> a3@3
        let f1 = founder("1000");
        let f2 = founder("0100");
        let mut arena = ScheduleArena::new();
        let l1 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f1.clone())));
        let l2 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f2.clone())));
        let p1 = arena.add_plant(l1, f1.clone(), 0, None).unwrap();
        let p2 = arena.add_plant(l2, f2.clone(), 0, None).unwrap();
        let (_, l3) = arena
            .add_crossing(p1, p2, Arc::new(ctor.cross(&f1, &f2).unwrap()))
            .unwrap();
        let a1 = Genotype::from_strs("1000", "0100");
        let p3 = arena.add_plant(l3, a1.clone(), 1, None).unwrap();
        let (_, l4) = arena
            .add_crossing(p3, p3, Arc::new(ctor.self_cross(&a1).unwrap()))
            .unwrap();
        let a2 = Genotype::from_strs("1100", "1100");
        let p4 = arena.add_plant(l4, a2.clone(), 2, None).unwrap();
        let (_, l5) = arena
            .add_crossing(p4, p4, Arc::new(ctor.self_cross(&a2).unwrap()))
            .unwrap();
        let p5 = arena.add_plant(l5, a2.clone(), 3, None).unwrap();
        CrossingScheme::finalize(arena, p5, &settings())
    }

    fn scheme_b(ctor: &ExhaustiveSeedLotConstructor) -> CrossingScheme {
        // F2 x F3 -> x@1; x cross F5 -> b@2 (F2 shared with scheme A)
        let f2 = founder("0100");
        let f3 = founder("0010");
        let f5 = founder("0001");
        let mut arena = ScheduleArena::new();
        let l1 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f2.clone())));
        let l2 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f3.clone())));
        let p1 = arena.add_plant(l1, f2.clone(), 0, None).unwrap();
        let p2 = arena.add_plant(l2, f3.clone(), 0, None).unwrap();
        let (_, l3) = arena
            .add_crossing(p1, p2, Arc::new(ctor.cross(&f2, &f3).unwrap()))
            .unwrap();
        let x = Genotype::from_strs("0100", "0010");
        let px = arena.add_plant(l3, x.clone(), 1, None).unwrap();
        let l4 = arena.add_founder_lot(Arc::new(SeedLot::uniform(f5.clone())));
        let p5 = arena.add_plant(l4, f5.clone(), 1, None).unwrap();
        let (_, l5) = arena
            .add_crossing(px, p5, Arc::new(ctor.cross(&x, &f5).unwrap()))
            .unwrap();
        let b = Genotype::from_strs("0110", "0001");
        let pb = arena.add_plant(l5, b, 2, None).unwrap();
        CrossingScheme::finalize(arena, pb, &settings())
    }

    #[test]
    fn alignment_enumeration_counts_shifts() {
        let map =
            Arc::new(GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap());
        let ctor = ExhaustiveSeedLotConstructor::new(map);
        let b = scheme_b(&ctor);
        // pinned at generation 3, the two internal crossings admit
        // (0,1), (0,2) and (1,2) as generation assignments
        let alignments = enumerate_alignments(b.arena(), b.root(), 3);
        assert_eq!(alignments.len(), 3);
        for a in &alignments {
            assert_eq!(a[&b.root()], 3);
        }
    }

    #[test]
    fn dominated_alignments_are_discarded() {
        let map =
            Arc::new(GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap());
        let ctor = ExhaustiveSeedLotConstructor::new(map);
        let a = scheme_a(&ctor);
        let b = scheme_b(&ctor);
        assert_eq!(a.generations(), 3);
        assert_eq!(b.generations(), 2);

        let pairs =
            merged_parents(&a, &b, &settings(), &ParetoDominance, false).unwrap();
        // of the 3 possible shifts, the two aligning scheme B's first
        // crossing at generation 0 share founder F2 with scheme A and
        // dominate the third
        assert_eq!(pairs.len(), 2);
        for pair in &pairs {
            assert_eq!(pair.arena.plant(pair.first_parent).generation, 3);
            assert_eq!(pair.arena.plant(pair.second_parent).generation, 3);
            // shared founder plant F2 appears once
            let f2 = founder("0100");
            let count = pair
                .arena
                .plant_ids()
                .filter(|&p| pair.arena.plant(p).genotype == f2 && pair.arena.plant(p).generation == 0)
                .count();
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn tree_mode_keeps_duplicated_plants_apart() {
        let map =
            Arc::new(GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap());
        let ctor = ExhaustiveSeedLotConstructor::new(map);
        let a = scheme_a(&ctor);
        let b = scheme_b(&ctor);
        let pairs = merged_parents(&a, &b, &settings(), &ParetoDominance, true).unwrap();
        let f2 = founder("0100");
        for pair in &pairs {
            let at_zero = pair
                .arena
                .plant_ids()
                .filter(|&p| {
                    pair.arena.plant(p).genotype == f2 && pair.arena.plant(p).generation == 0
                })
                .count();
            // scheme A's founder plant and scheme B's stay separate
            assert!(at_zero <= 2);
            assert!(pair.arena.plant_ids().count() >= a.arena().n_plants());
        }
    }
}

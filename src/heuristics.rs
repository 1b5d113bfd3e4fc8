//! Pruning heuristics and seed-lot filters.
//!
//! Every heuristic either prunes a candidate plant/schedule before it is
//! queued or filters genotypes out of a seed lot before expansion. They are
//! orthogonal and composable; the engine applies the configured ones in a
//! fixed order. All of them trade completeness for speed: with any heuristic
//! enabled the frontier is no longer guaranteed to be the optimal one.

use crate::errors::ConfigError;
use crate::genetic_map::GeneticMap;
use crate::genotypes::{DiploidChromosome, Genotype, Haplotype};
use crate::objectives::DominatesRelation;
use crate::schedules::{CrossingSchemeDescriptor, PlantId, ScheduleArena};
use crate::seed_lots::SeedLot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Weak improvement compares haplotype coverage only; strong improvement
/// additionally requires the per-chromosome recoverable ideotype stretch
/// (longest run reachable with at most one crossover, and its probability)
/// not to regress.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ImprovementMode {
    Weak,
    Strong,
}

/// Deterministic "is genotype `g` at least as close to the ideotype as `h`"
/// comparison underlying the founder, ancestor and seed-lot heuristics.
#[derive(Clone)]
pub struct GenotypeImprovement {
    ideotype: Genotype,
    map: Arc<GeneticMap>,
    mode: ImprovementMode,
}

impl GenotypeImprovement {
    pub fn new(ideotype: Genotype, map: Arc<GeneticMap>, mode: ImprovementMode) -> Self {
        Self {
            ideotype,
            map,
            mode,
        }
    }

    pub fn mode(&self) -> ImprovementMode {
        self.mode
    }

    /// Whether `a` carries a desired allele everywhere `b` does. Desired at a
    /// locus means matching one of the ideotype's alleles there.
    fn covers(a: &Haplotype, b: &Haplotype, target: &DiploidChromosome) -> bool {
        (0..target.n_loci()).all(|l| {
            let desired =
                |bit: bool| bit == target.hap1().get(l) || bit == target.hap2().get(l);
            !desired(b.get(l)) || desired(a.get(l))
        })
    }

    /// `g` weakly improves on `h`: on every chromosome each of `h`'s
    /// haplotypes is covered by one of `g`'s, and in strong mode the
    /// recoverable-stretch statistics do not regress either.
    pub fn weakly_improves(&self, g: &Genotype, h: &Genotype) -> bool {
        for c in 0..g.n_chromosomes() {
            let target = self.ideotype.chromosome(c);
            let gc = g.chromosome(c);
            let hc = h.chromosome(c);
            for hb in [hc.hap1(), hc.hap2()] {
                if !Self::covers(gc.hap1(), hb, target) && !Self::covers(gc.hap2(), hb, target) {
                    return false;
                }
            }
            if self.mode == ImprovementMode::Strong {
                let (len_g, p_g) = self.stretch_stats(c, gc);
                let (len_h, p_h) = self.stretch_stats(c, hc);
                if len_g < len_h || p_g < p_h - 1e-12 {
                    return false;
                }
            }
        }
        true
    }

    /// Strict improvement: `g` improves on `h` but not vice versa.
    pub fn strictly_improves(&self, g: &Genotype, h: &Genotype) -> bool {
        self.weakly_improves(g, h) && !self.weakly_improves(h, g)
    }

    /// Longest locus stretch matching the ideotype that a gamete of `chrom`
    /// can realize with at most one crossover, together with the probability
    /// of the best such gamete segment.
    pub(crate) fn stretch_stats(&self, c: usize, chrom: &DiploidChromosome) -> (usize, f64) {
        let n = chrom.n_loci();
        let ic = self.ideotype.chromosome(c);
        let mut targets = vec![ic.hap1()];
        if !ic.is_homozygous() {
            targets.push(ic.hap2());
        }
        let het = chrom.heterozygous_loci();
        let mut best = (0usize, 0.0f64);
        for target in targets {
            let can1: Vec<bool> = (0..n).map(|l| chrom.hap1().get(l) == target.get(l)).collect();
            let can2: Vec<bool> = (0..n).map(|l| chrom.hap2().get(l) == target.get(l)).collect();
            for i in 0..n {
                for j in i..n {
                    let p = self.best_window_probability(c, &can1, &can2, &het, i, j);
                    if let Some(p) = p {
                        let len = j - i + 1;
                        if len > best.0 || (len == best.0 && p > best.1) {
                            best = (len, p);
                        }
                    }
                }
            }
        }
        best
    }

    /// Probability of the most likely gamete segment realizing the window
    /// `[i, j]` with at most one origin switch, or `None` if no such segment
    /// exists.
    fn best_window_probability(
        &self,
        c: usize,
        can1: &[bool],
        can2: &[bool],
        het: &[usize],
        i: usize,
        j: usize,
    ) -> Option<f64> {
        let window_het: Vec<usize> =
            het.iter().copied().filter(|&l| l >= i && l <= j).collect();
        let mut best: Option<f64> = None;
        for (first, second) in [(can1, can2), (can2, can1)] {
            // split point m: origin = first on [i, m], second on (m, j]
            for m in i..=j + 1 {
                let feasible = (i..=j).all(|l| if l < m { first[l] } else { second[l] });
                if !feasible {
                    continue;
                }
                let mut p = 0.5;
                for t in 1..window_het.len() {
                    let (prev, cur) = (window_het[t - 1], window_het[t]);
                    // origin switches exactly when the split falls between them
                    let switch = prev < m && m <= cur;
                    let r = self.map.recombination_rate(c, prev, cur);
                    p *= if switch { r } else { 1.0 - r };
                }
                if best.map_or(true, |b| p > b) {
                    best = Some(p);
                }
            }
        }
        best
    }

    /// Drops every founder strictly dominated by another founder.
    pub fn filter_founders(&self, founders: &[Genotype]) -> Vec<Genotype> {
        founders
            .iter()
            .filter(|f| !founders.iter().any(|other| self.strictly_improves(other, f)))
            .cloned()
            .collect()
    }

    /// Ancestor pruning: a newly grown plant must weakly improve on every
    /// plant in its history.
    pub fn improves_on_ancestors(&self, arena: &ScheduleArena, plant: PlantId) -> bool {
        let genotype = &arena.plant(plant).genotype;
        arena
            .ancestor_plants(plant)
            .iter()
            .all(|&a| self.weakly_improves(genotype, &arena.plant(a).genotype))
    }
}

/// Removes, from every bucket, genotypes on which a more probable genotype of
/// the same bucket weakly improves. The bucket probability (LPA denominator)
/// is left untouched.
pub struct ImprovementSeedLotFilter {
    improvement: GenotypeImprovement,
}

impl ImprovementSeedLotFilter {
    pub fn new(improvement: GenotypeImprovement) -> Self {
        Self { improvement }
    }

    pub fn apply(&self, lot: &mut SeedLot) {
        lot.retain(|group, genotype, probability| {
            !group.iter().any(|(other, p)| {
                p > probability && self.improvement.weakly_improves(other, genotype)
            })
        });
    }

    /// Filters out offspring that do not weakly improve on the better of the
    /// two parent genotypes.
    pub fn apply_against_parents(&self, lot: &mut SeedLot, g1: &Genotype, g2: &Genotype) {
        let ideotype = &self.improvement.ideotype;
        let better = if g1.allele_score(ideotype) >= g2.allele_score(ideotype) {
            g1
        } else {
            g2
        };
        lot.retain(|_, genotype, _| self.improvement.weakly_improves(genotype, better));
    }

    pub fn fingerprint(&self) -> String {
        format!("improvement:{:?}", self.improvement.mode)
    }
}

impl std::fmt::Debug for ImprovementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ImprovementMode::Weak => "weak",
            ImprovementMode::Strong => "strong",
        })
    }
}

/// Per-genotype Pareto frontiers of queued partial schedules. A new partial
/// reaching a genotype already reached by a non-worse queued partial is
/// pruned.
#[derive(Default)]
pub struct GenotypeFrontiers {
    inner: Mutex<HashMap<Genotype, Vec<CrossingSchemeDescriptor>>>,
}

impl GenotypeFrontiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` for `genotype`. Returns false (prune) when an
    /// already-registered descriptor dominates it.
    pub fn admit(
        &self,
        genotype: &Genotype,
        descriptor: &CrossingSchemeDescriptor,
        dominance: &dyn DominatesRelation,
    ) -> bool {
        let mut inner = self.inner.lock().expect("genotype frontier poisoned");
        let entry = inner.entry(genotype.clone()).or_default();
        if entry.iter().any(|d| dominance.dominates(d, descriptor)) {
            return false;
        }
        entry.retain(|d| !dominance.dominates(descriptor, d));
        entry.push(descriptor.clone());
        true
    }
}

/// Whether `plant`'s seed lot is Pareto-optimal, over (probability of the
/// plant's genotype, its LPA), among the lots of the arena already available
/// at the plant's generation.
pub fn parent_lot_pareto_optimal(arena: &ScheduleArena, plant: PlantId) -> bool {
    let node = arena.plant(plant);
    let own = (node.probability, node.lpa);
    arena.seed_lot_ids().all(|l| {
        if l == node.lot || arena.seed_lot(l).generation > node.generation {
            return true;
        }
        let other = arena.seed_lot(l);
        let (Some(p), Some(lpa)) = (
            other.lot.probability_of(&node.genotype),
            other.lot.ambiguity_of(&node.genotype),
        ) else {
            return true;
        };
        let dominates =
            p >= own.0 && lpa <= own.1 && (p > own.0 + 1e-12 || lpa < own.1 - 1e-12);
        !dominates
    })
}

/// Optimistic descriptor for any completion of a partial schedule: crossing
/// can at best double the number of loci carrying a desired allele per
/// generation, a final selfing fixes zygosity and phase, and every extra
/// generation costs at least one seed.
pub fn completion_lower_bound(
    descriptor: &CrossingSchemeDescriptor,
    root: &Genotype,
    ideotype: &Genotype,
) -> CrossingSchemeDescriptor {
    // loci where the root holds no copy at all; a single copy is already
    // enough material, selfing doubles it
    let mut absent = 0usize;
    for (c, ic) in root.chromosomes().iter().zip(ideotype.chromosomes()) {
        for l in 0..c.n_loci() {
            if ic.allele_count(l) > 0 && c.allele_count(l) == 0 {
                absent += 1;
            }
        }
    }
    let extra_generations = if root == ideotype {
        0
    } else {
        (usize::BITS - absent.leading_zeros()) as usize + 1
    };
    let mut bound = descriptor.clone();
    bound.generations += extra_generations;
    bound.total_population += extra_generations as u64;
    bound.total_crossings += extra_generations as u64;
    bound
}

/// Phase selection for the per-genotype frontier heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontierHeuristic {
    #[default]
    Off,
    /// Prune against per-genotype frontiers during the single run.
    Single,
    /// Run twice on a split runtime budget: first with per-genotype
    /// frontiers, then without, seeded with the first run's results.
    TwoPhase,
    /// Like [`FrontierHeuristic::TwoPhase`], additionally restricting the
    /// second run's seed lots to haplotypes observed in first-run solutions.
    TwoPhaseHaplotypeRestricted,
}

/// Ancestor-improvement pruning (off, weak or strong comparison).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AncestorImprovement {
    #[default]
    Off,
    Weak,
    Strong,
}

/// Seed-lot offspring filtering against the better parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffspringImprovement {
    #[default]
    Off,
    Weak,
    Strong,
}

/// Which seed-lot constructor the search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructorChoice {
    #[default]
    Exhaustive,
    Heuristic {
        /// Direct every chromosome toward the same ideotype haplotype.
        consistent: bool,
        max_crossovers: Option<usize>,
    },
}

/// Validated heuristics configuration. Mutually exclusive choices are enums,
/// so the only runtime check left is the tree-mode interaction.
#[derive(Debug, Clone, Default)]
pub struct HeuristicsConfig {
    pub filter_founders: bool,
    pub ancestor_improvement: AncestorImprovement,
    pub offspring_improvement: OffspringImprovement,
    pub queued_frontiers: FrontierHeuristic,
    pub pareto_optimal_parent_lots: bool,
    pub constructor: ConstructorChoice,
    pub completion_bound: bool,
    /// Disallow plant reuse and non-terminal selfing.
    pub tree_mode: bool,
}

impl HeuristicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tree_mode && self.filter_founders {
            return Err(ConfigError::InvalidHeuristics(
                "tree mode requires founder filtering off".into(),
            ));
        }
        Ok(())
    }

    /// Distinguishes seed-lot cache contents across filter configurations.
    pub fn lot_fingerprint(&self) -> String {
        format!(
            "{:?}/{:?}",
            self.constructor, self.offspring_improvement
        )
    }

    pub fn improvement_mode(&self) -> Option<ImprovementMode> {
        match (self.ancestor_improvement, self.offspring_improvement) {
            (AncestorImprovement::Strong, _) | (_, OffspringImprovement::Strong) => {
                Some(ImprovementMode::Strong)
            }
            (AncestorImprovement::Weak, _) | (_, OffspringImprovement::Weak) => {
                Some(ImprovementMode::Weak)
            }
            _ if self.filter_founders => Some(ImprovementMode::Weak),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_map::MapFunction;
    use crate::objectives::ParetoDominance;

    fn improvement(mode: ImprovementMode) -> GenotypeImprovement {
        let map =
            Arc::new(GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap());
        GenotypeImprovement::new(Genotype::from_strs("1111", "1111"), map, mode)
    }

    fn improvement2(mode: ImprovementMode) -> GenotypeImprovement {
        let map = Arc::new(GeneticMap::new(vec![vec![20.0]], MapFunction::Haldane).unwrap());
        GenotypeImprovement::new(Genotype::from_strs("11", "11"), map, mode)
    }

    #[test]
    fn weak_improvement_is_phase_aware() {
        let imp = improvement2(ImprovementMode::Weak);
        let stacked = Genotype::from_strs("11", "00");
        let split = Genotype::from_strs("10", "01");
        // same allelic-frequency signature, but only the stacked genotype
        // carries a complete target haplotype
        assert!(imp.weakly_improves(&stacked, &split));
        assert!(!imp.weakly_improves(&split, &stacked));
        assert!(imp.strictly_improves(&stacked, &split));
    }

    #[test]
    fn improvement_is_reflexive() {
        let imp = improvement(ImprovementMode::Weak);
        let g = Genotype::from_strs("1010", "0101");
        assert!(imp.weakly_improves(&g, &g));
        assert!(!imp.strictly_improves(&g, &g));
    }

    #[test]
    fn stretch_statistics_favor_linked_alleles() {
        let imp = improvement(ImprovementMode::Strong);
        let linked = DiploidChromosome::from_strs("1100", "0011");
        let alternating = DiploidChromosome::from_strs("1010", "0101");
        let (len_linked, p_linked) = imp.stretch_stats(0, &linked);
        let (len_alt, _) = imp.stretch_stats(0, &alternating);
        // one crossover suffices to join 1100 and 0011 into the full target
        assert_eq!(len_linked, 4);
        assert!(p_linked > 0.0);
        assert_eq!(len_alt, 2);
    }

    #[test]
    fn strong_improvement_requires_stretch_non_regression() {
        let imp = improvement(ImprovementMode::Strong);
        let complete = Genotype::from_strs("1111", "0000");
        let split = Genotype::from_strs("1100", "0011");
        assert!(imp.weakly_improves(&complete, &split));
        assert!(!imp.weakly_improves(&split, &complete));
        let (len_c, p_c) = imp.stretch_stats(0, complete.chromosome(0));
        let (len_s, p_s) = imp.stretch_stats(0, split.chromosome(0));
        assert_eq!(len_c, 4);
        assert_eq!(len_s, 4);
        // the zero-crossover gamete is more likely than the recombined one
        assert!(p_c > p_s);
    }

    #[test]
    fn dominated_founders_are_dropped() {
        let imp = improvement2(ImprovementMode::Weak);
        let founders = vec![
            Genotype::from_strs("11", "11"),
            Genotype::from_strs("10", "10"),
            Genotype::from_strs("01", "00"),
        ];
        let kept = imp.filter_founders(&founders);
        assert_eq!(kept, vec![Genotype::from_strs("11", "11")]);
    }

    #[test]
    fn lot_filter_removes_improved_upon_genotypes() {
        let imp = improvement2(ImprovementMode::Weak);
        let filter = ImprovementSeedLotFilter::new(imp);
        let g1 = Genotype::from_strs("11", "00");
        let g2 = Genotype::from_strs("10", "01");
        let mut lot = SeedLot::new(false, [(g1.clone(), 0.4), (g2.clone(), 0.2)]);
        let bucket_probability = lot
            .groups()
            .next()
            .map(|(_, group)| group.probability())
            .unwrap();
        filter.apply(&mut lot);
        assert!(lot.probability_of(&g1).is_some());
        assert!(lot.probability_of(&g2).is_none());
        // the bucket probability (LPA denominator) is not rescaled
        let after = lot
            .groups()
            .next()
            .map(|(_, group)| group.probability())
            .unwrap();
        assert!((after - bucket_probability).abs() < 1e-12);

        // with the probabilities reversed the more probable genotype does
        // not improve on the other, so nothing is removed
        let mut lot = SeedLot::new(false, [(g1.clone(), 0.2), (g2.clone(), 0.4)]);
        filter.apply(&mut lot);
        assert!(lot.probability_of(&g1).is_some());
        assert!(lot.probability_of(&g2).is_some());
    }

    #[test]
    fn parent_filter_keeps_only_improving_offspring() {
        let imp = improvement2(ImprovementMode::Weak);
        let filter = ImprovementSeedLotFilter::new(imp);
        let p1 = Genotype::from_strs("11", "00");
        let p2 = Genotype::from_strs("00", "00");
        let mut lot = SeedLot::new(
            false,
            [
                (Genotype::from_strs("11", "00"), 0.4),
                (Genotype::from_strs("10", "00"), 0.4),
            ],
        );
        filter.apply_against_parents(&mut lot, &p1, &p2);
        assert!(lot.probability_of(&Genotype::from_strs("11", "00")).is_some());
        assert!(lot.probability_of(&Genotype::from_strs("10", "00")).is_none());
    }

    #[test]
    fn genotype_frontier_prunes_dominated_partials() {
        let frontiers = GenotypeFrontiers::new();
        let g = Genotype::from_strs("10", "01");
        let mk = |pop, gens| CrossingSchemeDescriptor {
            total_population: pop,
            population_per_generation: vec![],
            generations: gens,
            lpa: 0.0,
            total_crossings: 1,
            max_crossings_with_plant: 1,
        };
        assert!(frontiers.admit(&g, &mk(10, 2), &ParetoDominance));
        // dominated by the queued one
        assert!(!frontiers.admit(&g, &mk(12, 2), &ParetoDominance));
        // incomparable, admitted
        assert!(frontiers.admit(&g, &mk(8, 3), &ParetoDominance));
        // dominates the first, admitted
        assert!(frontiers.admit(&g, &mk(9, 2), &ParetoDominance));
        // other genotypes are unaffected
        assert!(frontiers.admit(&Genotype::from_strs("11", "00"), &mk(12, 2), &ParetoDominance));
    }

    #[test]
    fn completion_bound_counts_missing_material() {
        let d = CrossingSchemeDescriptor {
            total_population: 10,
            population_per_generation: vec![2, 8],
            generations: 1,
            lpa: 0.0,
            total_crossings: 1,
            max_crossings_with_plant: 1,
        };
        let ideotype = Genotype::from_strs("1111", "1111");
        // two loci hold no copy: ceil(log2(3)) = 2 stacking generations,
        // plus a final zygosity-fixing selfing
        let partial = Genotype::from_strs("1100", "0000");
        let bound = completion_lower_bound(&d, &partial, &ideotype);
        assert_eq!(bound.generations, 4);
        assert_eq!(bound.total_population, 13);
        // ideotype reached: nothing to add
        let done = completion_lower_bound(&d, &ideotype, &ideotype);
        assert_eq!(done.generations, 1);
        // every desired allele present at least once: a single selfing can
        // finish, whatever the copy deficit, so the bound adds exactly one
        let unphased = Genotype::from_strs("1111", "0000");
        let fix = completion_lower_bound(&d, &unphased, &ideotype);
        assert_eq!(fix.generations, 2);
        // one locus entirely absent: cross it in, then fix zygosity
        let near = Genotype::from_strs("1110", "1110");
        let two = completion_lower_bound(&d, &near, &ideotype);
        assert_eq!(two.generations, 3);
    }

    #[test]
    fn tree_mode_excludes_founder_filtering() {
        let config = HeuristicsConfig {
            tree_mode: true,
            filter_founders: true,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeuristics(_))
        ));
        let ok = HeuristicsConfig {
            tree_mode: true,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn fingerprint_tracks_filter_configuration() {
        let a = HeuristicsConfig::default();
        let b = HeuristicsConfig {
            offspring_improvement: OffspringImprovement::Weak,
            ..Default::default()
        };
        let c = HeuristicsConfig {
            constructor: ConstructorChoice::Heuristic {
                consistent: false,
                max_crossovers: Some(2),
            },
            ..Default::default()
        };
        assert_ne!(a.lot_fingerprint(), b.lot_fingerprint());
        assert_ne!(a.lot_fingerprint(), c.lot_fingerprint());
    }
}

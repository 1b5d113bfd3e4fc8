//! Seed-lot construction: enumerating the offspring distribution of a
//! crossing or selfing.
//!
//! Meiosis is modeled per chromosome. A gamete is determined by the origin
//! (first or second haplotype) chosen at each heterozygous locus; its
//! probability is `1/2 * prod over consecutive heterozygous loci of (r if
//! the origin switches else 1 - r)`, with `r` taken from the pairwise
//! recombination table. Gametes of the two parents combine into canonical
//! diploid chromosomes, chromosomes combine by cartesian product.

use crate::errors::GeneticsError;
use crate::genetic_map::GeneticMap;
use crate::genotypes::{DiploidChromosome, Genotype, Haplotype};
use crate::seed_lots::SeedLot;
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

/// Produces the offspring distribution of a crossing or selfing.
pub trait SeedLotConstructor: Send + Sync {
    fn cross(&self, g1: &Genotype, g2: &Genotype) -> Result<SeedLot, GeneticsError>;

    /// Selfing is crossing a plant with itself; the two gamete draws are
    /// independent and may coincide.
    fn self_cross(&self, g: &Genotype) -> Result<SeedLot, GeneticsError> {
        self.cross(g, g)
    }

    /// Distinguishes constructor configurations in the seed-lot cache key.
    fn fingerprint(&self) -> String;
}

fn check_cross(g1: &Genotype, g2: &Genotype, map: &GeneticMap) -> Result<(), GeneticsError> {
    if !g1.cross_compatible(g2) {
        return Err(GeneticsError::IncompatibleGenotypes(format!(
            "{g1} x {g2}"
        )));
    }
    if !map.matches(g1) {
        return Err(GeneticsError::IncompatibleGenotypes(format!(
            "genetic map does not cover {g1}"
        )));
    }
    Ok(())
}

/// Probability of the gamete selecting `origins[t]` at the t-th
/// heterozygous locus of `chromosome` (true = first haplotype).
fn origin_probability(map: &GeneticMap, c: usize, het: &[usize], origins: &[bool]) -> f64 {
    let mut p = 0.5;
    for t in 1..origins.len() {
        let r = map.recombination_rate(c, het[t - 1], het[t]);
        p *= if origins[t] != origins[t - 1] { r } else { 1.0 - r };
    }
    p
}

fn gamete_from_origins(chrom: &DiploidChromosome, het: &[usize], origins: &[bool]) -> Haplotype {
    let mut alleles: Vec<bool> = chrom.hap1().iter().collect();
    for (t, &locus) in het.iter().enumerate() {
        alleles[locus] = if origins[t] {
            chrom.hap1().get(locus)
        } else {
            chrom.hap2().get(locus)
        };
    }
    Haplotype::new(alleles).expect("chromosome has at least one locus")
}

/// All gametes of one chromosome with their exact probabilities.
fn chromosome_gametes(map: &GeneticMap, c: usize, chrom: &DiploidChromosome) -> Vec<(Haplotype, f64)> {
    let het = chrom.heterozygous_loci();
    if het.is_empty() {
        return vec![(chrom.hap1().clone(), 1.0)];
    }
    let k = het.len();
    let mut out = Vec::with_capacity(1 << k);
    for mask in 0..(1u64 << k) {
        let origins: Vec<bool> = (0..k).map(|t| mask >> t & 1 == 1).collect();
        let p = origin_probability(map, c, &het, &origins);
        out.push((gamete_from_origins(chrom, &het, &origins), p));
    }
    out
}

fn combine(
    map: &GeneticMap,
    g1: &Genotype,
    g2: &Genotype,
    gametes: impl Fn(&GeneticMap, usize, &DiploidChromosome) -> Vec<(Haplotype, f64)>,
) -> SeedLot {
    // per chromosome: accumulate probabilities of canonical diploid pairs
    let per_chromosome: Vec<Vec<(DiploidChromosome, f64)>> = (0..g1.n_chromosomes())
        .map(|c| {
            let gx = gametes(map, c, g1.chromosome(c));
            let gy = gametes(map, c, g2.chromosome(c));
            let mut acc: HashMap<DiploidChromosome, f64> = HashMap::new();
            for (hx, px) in &gx {
                for (hy, py) in &gy {
                    let chrom = DiploidChromosome::new(hx.clone(), hy.clone())
                        .expect("gametes of one chromosome share locus count");
                    *acc.entry(chrom).or_insert(0.0) += px * py;
                }
            }
            acc.into_iter().collect()
        })
        .collect();

    let offspring = per_chromosome
        .iter()
        .map(|v| v.iter())
        .multi_cartesian_product()
        .map(|combo| {
            let prob: f64 = combo.iter().map(|(_, p)| p).product();
            let chromosomes = combo.into_iter().map(|(c, _)| c.clone()).collect();
            let genotype = Genotype::new(chromosomes).expect("parents are non-empty");
            (genotype, prob)
        });

    let uniform = g1.is_homozygous() && g2.is_homozygous();
    SeedLot::new(uniform, offspring)
}

/// Exhaustive constructor: enumerates the complete offspring distribution.
#[derive(Clone)]
pub struct ExhaustiveSeedLotConstructor {
    map: Arc<GeneticMap>,
}

impl ExhaustiveSeedLotConstructor {
    pub fn new(map: Arc<GeneticMap>) -> Self {
        Self { map }
    }
}

impl SeedLotConstructor for ExhaustiveSeedLotConstructor {
    fn cross(&self, g1: &Genotype, g2: &Genotype) -> Result<SeedLot, GeneticsError> {
        check_cross(g1, g2, &self.map)?;
        Ok(combine(&self.map, g1, g2, chromosome_gametes))
    }

    fn fingerprint(&self) -> String {
        "exhaustive".into()
    }
}

/// Heuristic constructor: restricts gamete enumeration per chromosome to the
/// unrecombined parent haplotypes plus, per target haplotype of the
/// ideotype, the single gamete taking the target allele at every
/// heterozygous locus. An optional crossover bound drops directed gametes
/// that would need too many origin switches.
///
/// Probabilities of emitted gametes are computed by the same formula as the
/// exhaustive constructor, so every genotype this constructor does generate
/// carries its exact probability. Bucket probabilities are taken from the
/// full per-chromosome class masses, so LPA of every emitted genotype also
/// equals its exhaustive value even when phase variants of its class are
/// not enumerated.
#[derive(Clone)]
pub struct HeuristicSeedLotConstructor {
    map: Arc<GeneticMap>,
    ideotype: Genotype,
    /// Use the same ideotype haplotype as target on every chromosome.
    consistent: bool,
    max_crossovers: Option<usize>,
}

impl HeuristicSeedLotConstructor {
    pub fn new(
        map: Arc<GeneticMap>,
        ideotype: Genotype,
        consistent: bool,
        max_crossovers: Option<usize>,
    ) -> Self {
        Self {
            map,
            ideotype,
            consistent,
            max_crossovers,
        }
    }

    fn targets(&self, c: usize) -> Vec<&Haplotype> {
        let chrom = self.ideotype.chromosome(c);
        if self.consistent || chrom.is_homozygous() {
            vec![chrom.hap1()]
        } else {
            vec![chrom.hap1(), chrom.hap2()]
        }
    }

    fn restricted_gametes(&self, c: usize, chrom: &DiploidChromosome) -> Vec<(Haplotype, f64)> {
        let het = chrom.heterozygous_loci();
        if het.is_empty() {
            return vec![(chrom.hap1().clone(), 1.0)];
        }
        let k = het.len();
        let mut origin_sets: Vec<Vec<bool>> = vec![vec![true; k], vec![false; k]];
        for target in self.targets(c) {
            // at a heterozygous locus exactly one haplotype matches the target
            let origins: Vec<bool> = het
                .iter()
                .map(|&l| chrom.hap1().get(l) == target.get(l))
                .collect();
            let switches = origins.windows(2).filter(|w| w[0] != w[1]).count();
            if self.max_crossovers.map_or(true, |m| switches <= m) {
                origin_sets.push(origins);
            }
        }
        let mut out: HashMap<Haplotype, f64> = HashMap::new();
        for origins in origin_sets {
            let gamete = gamete_from_origins(chrom, &het, &origins);
            out.entry(gamete)
                .or_insert_with(|| origin_probability(&self.map, c, &het, &origins));
        }
        out.into_iter().collect()
    }

    /// Full mass of each observable chromosome class (per-locus allele-count
    /// vector) under exhaustive gamete enumeration. Per-chromosome cost only;
    /// the cross-chromosome product is never materialized.
    fn chromosome_class_masses(
        &self,
        c: usize,
        c1: &DiploidChromosome,
        c2: &DiploidChromosome,
    ) -> HashMap<Vec<u8>, f64> {
        let gx = chromosome_gametes(&self.map, c, c1);
        let gy = chromosome_gametes(&self.map, c, c2);
        let mut acc: HashMap<Vec<u8>, f64> = HashMap::new();
        for (hx, px) in &gx {
            for (hy, py) in &gy {
                let counts: Vec<u8> = (0..hx.n_loci())
                    .map(|l| hx.get(l) as u8 + hy.get(l) as u8)
                    .collect();
                *acc.entry(counts).or_insert(0.0) += px * py;
            }
        }
        acc
    }
}

impl SeedLotConstructor for HeuristicSeedLotConstructor {
    fn cross(&self, g1: &Genotype, g2: &Genotype) -> Result<SeedLot, GeneticsError> {
        check_cross(g1, g2, &self.map)?;
        let mut lot = combine(&self.map, g1, g2, |_, c, chrom| {
            self.restricted_gametes(c, chrom)
        });
        // the restricted lot underestimates class probabilities (and so the
        // LPA denominator) whenever a phase variant was not emitted; restore
        // the exhaustive class masses
        let class_masses: Vec<HashMap<Vec<u8>, f64>> = (0..g1.n_chromosomes())
            .map(|c| self.chromosome_class_masses(c, g1.chromosome(c), g2.chromosome(c)))
            .collect();
        let full: Vec<_> = lot
            .groups()
            .map(|(state, group)| {
                let g = group.iter().next().expect("groups are non-empty").0;
                let mass: f64 = (0..g.n_chromosomes())
                    .map(|c| {
                        let chrom = g.chromosome(c);
                        let counts: Vec<u8> =
                            (0..chrom.n_loci()).map(|l| chrom.allele_count(l)).collect();
                        class_masses[c][&counts]
                    })
                    .product();
                (state.clone(), mass)
            })
            .collect();
        for (state, mass) in full {
            lot.set_class_probability(&state, mass);
        }
        Ok(lot)
    }

    fn fingerprint(&self) -> String {
        format!(
            "heuristic:consistent={}:max_crossovers={:?}",
            self.consistent, self.max_crossovers
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_map::MapFunction;

    fn map2() -> Arc<GeneticMap> {
        Arc::new(GeneticMap::new(vec![vec![20.0]], MapFunction::Haldane).unwrap())
    }

    #[test]
    fn homozygous_cross_is_uniform() {
        let c = ExhaustiveSeedLotConstructor::new(map2());
        let lot = c
            .cross(&Genotype::from_strs("11", "11"), &Genotype::from_strs("00", "00"))
            .unwrap();
        assert!(lot.is_uniform());
        assert_eq!(lot.n_genotypes(), 1);
        let child = Genotype::from_strs("11", "00");
        assert!((lot.probability_of(&child).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn distribution_sums_to_one() {
        let c = ExhaustiveSeedLotConstructor::new(map2());
        let lot = c
            .cross(&Genotype::from_strs("10", "01"), &Genotype::from_strs("11", "00"))
            .unwrap();
        assert!((lot.total_probability() - 1.0).abs() < 1e-9);
        for (_, group) in lot.groups() {
            for (_, p) in group.iter() {
                assert!(p <= group.probability() + 1e-9);
            }
        }
    }

    #[test]
    fn recombinant_probability_follows_map() {
        // parent 10/01 produces gametes 10, 01 (parental, (1-r)/2 each)
        // and 11, 00 (recombinant, r/2 each)
        let map = map2();
        let r = map.recombination_rate(0, 0, 1);
        let c = ExhaustiveSeedLotConstructor::new(map);
        let lot = c
            .cross(&Genotype::from_strs("10", "01"), &Genotype::from_strs("00", "00"))
            .unwrap();
        let recombinant = Genotype::from_strs("11", "00");
        let parental = Genotype::from_strs("10", "00");
        assert!((lot.probability_of(&recombinant).unwrap() - r / 2.0).abs() < 1e-12);
        assert!((lot.probability_of(&parental).unwrap() - (1.0 - r) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn selfing_can_repeat_gametes() {
        let c = ExhaustiveSeedLotConstructor::new(map2());
        let lot = c.self_cross(&Genotype::from_strs("10", "01")).unwrap();
        // homozygous offspring from two identical gamete draws
        let hom = Genotype::from_strs("10", "10");
        assert!(lot.probability_of(&hom).unwrap() > 0.0);
        assert!((lot.total_probability() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn heuristic_lot_is_smaller_with_exact_probabilities() {
        let map = Arc::new(
            GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap(),
        );
        let ideotype = Genotype::from_strs("1111", "1111");
        let g1 = Genotype::from_strs("1001", "0110");
        let g2 = Genotype::from_strs("0001", "0000");
        let exhaustive = ExhaustiveSeedLotConstructor::new(map.clone());
        let heuristic =
            HeuristicSeedLotConstructor::new(map, ideotype, false, None);
        let full = exhaustive.cross(&g1, &g2).unwrap();
        let small = heuristic.cross(&g1, &g2).unwrap();
        assert!(small.n_genotypes() < full.n_genotypes());
        assert!(small.n_genotypes() > 0);
        for (g, p) in small.genotypes() {
            let p_full = full.probability_of(g).unwrap();
            assert!((p - p_full).abs() < 1e-12, "probability mismatch for {g}");
        }
    }

    #[test]
    fn heuristic_ambiguity_matches_exhaustive() {
        // selfing 10/01: the heuristic lot emits gametes 10, 01 and 11 but
        // not 00, so the class {1,1} keeps only 10/01 while its phase
        // variant 11/00 is dropped; LPA must still use the full class mass
        let map = map2();
        let ideotype = Genotype::from_strs("11", "11");
        let g = Genotype::from_strs("10", "01");
        let exhaustive = ExhaustiveSeedLotConstructor::new(map.clone());
        let heuristic = HeuristicSeedLotConstructor::new(map, ideotype, false, None);
        let full = exhaustive.self_cross(&g).unwrap();
        let small = heuristic.self_cross(&g).unwrap();
        assert!(small.n_genotypes() < full.n_genotypes());
        for (geno, _) in small.genotypes() {
            let lpa = small.ambiguity_of(geno).unwrap();
            let lpa_full = full.ambiguity_of(geno).unwrap();
            assert!(
                (lpa - lpa_full).abs() < 1e-12,
                "ambiguity mismatch for {geno}: {lpa} vs {lpa_full}"
            );
        }
        assert!(small.ambiguity_of(&g).unwrap() > 0.03);
    }

    #[test]
    fn crossover_bound_drops_expensive_directed_gametes() {
        // reaching 1111 from 1010/0101 needs 3 origin switches
        let map = Arc::new(
            GeneticMap::new(vec![vec![10.0, 10.0, 10.0]], MapFunction::Haldane).unwrap(),
        );
        let ideotype = Genotype::from_strs("1111", "1111");
        let g = Genotype::from_strs("1010", "0101");
        let other = Genotype::from_strs("0000", "0000");
        let bounded =
            HeuristicSeedLotConstructor::new(map.clone(), ideotype.clone(), false, Some(1));
        let unbounded = HeuristicSeedLotConstructor::new(map, ideotype, false, None);
        let lot_b = bounded.cross(&g, &other).unwrap();
        let lot_u = unbounded.cross(&g, &other).unwrap();
        let full_gamete = Genotype::from_strs("1111", "0000");
        assert!(lot_u.probability_of(&full_gamete).is_some());
        assert!(lot_b.probability_of(&full_gamete).is_none());
    }

    #[test]
    fn incompatible_parents_rejected() {
        let c = ExhaustiveSeedLotConstructor::new(map2());
        let err = c
            .cross(&Genotype::from_strs("10", "01"), &Genotype::from_strs("100", "000"))
            .unwrap_err();
        assert!(matches!(err, GeneticsError::IncompatibleGenotypes(_)));
    }
}

//! Generation-by-generation branch-and-bound.
//!
//! Breadth-first over generations: at generation `g` every crossing of two
//! accumulated partial schedules (at least one rooted at `g`) and every
//! selfing of a `g`-rooted schedule is extended in parallel; the generation
//! boundary is the synchronization barrier. Complete schemes land on the
//! frontier inside the extension step, partial survivors are queued for
//! `g + 1`.

use super::{SearchConfig, SearchInput, SearchState};
use crate::errors::ConfigError;
use crate::frontier::ParetoFrontier;
use crate::heuristics::FrontierHeuristic;
use crate::schedules::CrossingScheme;
use log::{debug, info};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Runs the full search and returns the resulting frontier. Honors the
/// configured runtime limit; on expiry the frontier holds whatever was
/// completed so far.
pub fn search(
    input: SearchInput,
    config: SearchConfig,
) -> Result<Arc<ParetoFrontier>, ConfigError> {
    let num_threads = config.num_threads;
    let max_generations = config.max_generations;
    let runtime_limit = config.runtime_limit;
    let two_phase = matches!(
        config.heuristics.queued_frontiers,
        FrontierHeuristic::TwoPhase | FrontierHeuristic::TwoPhaseHaplotypeRestricted
    );
    let restricted = matches!(
        config.heuristics.queued_frontiers,
        FrontierHeuristic::TwoPhaseHaplotypeRestricted
    );

    let mut state = SearchState::new(input, config)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| ConfigError::InvalidInput(e.to_string()))?;

    if two_phase {
        let start = Instant::now();
        state.set_deadline(runtime_limit.map(|limit| start + limit / 2));
        run(&pool, &state, max_generations);
        info!(
            "first phase done: {} schedules on the frontier",
            state.frontier().len()
        );
        if restricted {
            state.restrict_haplotypes(solution_haplotypes(&state));
        }
        state.disable_genotype_frontiers();
        state.set_deadline(runtime_limit.map(|limit| start + limit));
        run(&pool, &state, max_generations);
    } else {
        run(&pool, &state, max_generations);
    }
    info!(
        "search finished: {} schedules on the frontier, {} cached seed lots",
        state.frontier().len(),
        state.cache().len()
    );
    Ok(state.frontier().clone())
}

/// Haplotypes occurring anywhere in the current frontier's schedules.
fn solution_haplotypes(state: &SearchState) -> HashSet<crate::genotypes::Haplotype> {
    let mut haplotypes = HashSet::new();
    for scheme in state.frontier().schemes() {
        for p in scheme.arena().plant_ids() {
            for chrom in scheme.arena().plant(p).genotype.chromosomes() {
                haplotypes.insert(chrom.hap1().clone());
                haplotypes.insert(chrom.hap2().clone());
            }
        }
    }
    haplotypes
}

fn run(pool: &rayon::ThreadPool, state: &SearchState, max_generations: Option<usize>) {
    let founders = match state.founder_schemes() {
        Ok(founders) => founders,
        Err(err) => {
            debug!("founder construction failed: {err}");
            return;
        }
    };
    for scheme in &founders {
        if scheme.reaches(&state.input().ideotype) {
            state.frontier().add(scheme.clone());
        }
    }

    let mut accumulated: Vec<CrossingScheme> = Vec::new();
    let mut newest = founders;
    let mut g = 0usize;
    loop {
        if state.deadline_expired() {
            debug!("runtime limit reached at generation {g}");
            break;
        }
        if max_generations.is_some_and(|m| g >= m) {
            break;
        }
        accumulated.append(&mut newest);

        // candidate units: (i, Some(j)) crossings with max root generation g,
        // (i, None) selfings of g-rooted schemes
        let mut units: Vec<(usize, Option<usize>)> = Vec::new();
        for i in 0..accumulated.len() {
            if accumulated[i].generations() != g {
                continue;
            }
            for (j, other) in accumulated.iter().enumerate() {
                if j == i || (other.generations() == g && j < i) {
                    continue;
                }
                units.push((i, Some(j)));
            }
            units.push((i, None));
        }
        if units.is_empty() {
            break;
        }

        let produced: Vec<CrossingScheme> = pool.install(|| {
            units
                .par_iter()
                .flat_map_iter(|&(i, j)| match j {
                    Some(j) => state.extend_pair(&accumulated[i], &accumulated[j]),
                    None => state.extend_self(&accumulated[i]),
                })
                .collect()
        });
        debug!(
            "generation {g}: {} units, {} new partials, {} complete, cache hit rate {:.2}",
            units.len(),
            produced.len(),
            state.frontier().len(),
            state.cache().hit_rate()
        );
        if produced.is_empty() {
            break;
        }
        newest = produced;
        g += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic_map::{GeneticMap, MapFunction};
    use crate::genotypes::Genotype;
    use crate::heuristics::{HeuristicsConfig, OffspringImprovement};
    use crate::objectives::MaxLinkagePhaseAmbiguity;
    use std::time::Duration;

    fn two_founder_input() -> SearchInput {
        SearchInput {
            founders: vec![
                Genotype::from_strs("10", "10"),
                Genotype::from_strs("01", "01"),
            ],
            ideotype: Genotype::from_strs("11", "11"),
            map: Arc::new(GeneticMap::new(vec![vec![20.0]], MapFunction::Haldane).unwrap()),
        }
    }

    fn small_config() -> SearchConfig {
        SearchConfig {
            max_generations: Some(3),
            num_threads: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn finds_the_two_generation_stacking_schedule() {
        let frontier = search(two_founder_input(), small_config()).unwrap();
        assert!(!frontier.is_empty());
        let ideotype = Genotype::from_strs("11", "11");
        for scheme in frontier.schemes() {
            assert!(scheme.reaches(&ideotype));
            assert!(scheme.generations() >= 2);
        }
        // cross 10/10 x 01/01, then self the hybrid
        assert!(frontier
            .schemes()
            .iter()
            .any(|s| s.generations() == 2));
    }

    #[test]
    fn frontier_members_are_mutually_non_dominated() {
        let frontier = search(two_founder_input(), small_config()).unwrap();
        let descriptors = frontier.descriptors();
        let relation = crate::objectives::ParetoDominance;
        use crate::objectives::DominatesRelation;
        for a in &descriptors {
            for b in &descriptors {
                assert!(!relation.dominates(a, b) || !relation.dominates(b, a));
            }
        }
    }

    #[test]
    fn ideotype_founder_completes_at_generation_zero() {
        let mut input = two_founder_input();
        input.founders.push(Genotype::from_strs("11", "11"));
        let frontier = search(input, small_config()).unwrap();
        assert!(frontier
            .schemes()
            .iter()
            .any(|s| s.generations() == 0 && s.descriptor().total_population == 1));
    }

    #[test]
    fn expired_deadline_returns_a_valid_empty_frontier() {
        let config = SearchConfig {
            runtime_limit: Some(Duration::ZERO),
            ..small_config()
        };
        let frontier = search(two_founder_input(), config).unwrap();
        assert!(frontier.is_empty());
    }

    #[test]
    fn constraints_shape_the_frontier() {
        let config = SearchConfig {
            constraints: vec![Box::new(MaxLinkagePhaseAmbiguity(0.0))],
            ..small_config()
        };
        let frontier = search(two_founder_input(), config).unwrap();
        for scheme in frontier.schemes() {
            assert_eq!(scheme.descriptor().lpa, 0.0);
        }
    }

    #[test]
    fn two_phase_run_completes() {
        let config = SearchConfig {
            heuristics: HeuristicsConfig {
                queued_frontiers: FrontierHeuristic::TwoPhase,
                offspring_improvement: OffspringImprovement::Weak,
                ..Default::default()
            },
            ..small_config()
        };
        let frontier = search(two_founder_input(), config).unwrap();
        assert!(!frontier.is_empty());
    }
}

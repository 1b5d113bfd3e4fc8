//! Marker-assisted gene-stacking schedule search.
//!
//! Given founder genotypes, a target ideotype and a genetic linkage map,
//! the library searches over sequences of crossings and selfings for
//! breeding schedules that reach the ideotype with a guaranteed success
//! probability, reported as a Pareto frontier over population size,
//! linkage-phase ambiguity and generation count.
//!
//! Typical use:
//! ```
//! use genestacker::genetic_map::{GeneticMap, MapFunction};
//! use genestacker::genotypes::Genotype;
//! use genestacker::search::{branch_and_bound, SearchConfig, SearchInput};
//! use std::sync::Arc;
//!
//! let input = SearchInput {
//!     founders: vec![
//!         Genotype::from_strs("10", "10"),
//!         Genotype::from_strs("01", "01"),
//!     ],
//!     ideotype: Genotype::from_strs("11", "11"),
//!     map: Arc::new(GeneticMap::new(vec![vec![20.0]], MapFunction::Haldane).unwrap()),
//! };
//! let frontier = branch_and_bound::search(input, SearchConfig::default()).unwrap();
//! for scheme in frontier.schemes() {
//!     println!("{} generations, {} plants", scheme.generations(),
//!         scheme.descriptor().total_population);
//! }
//! ```

pub mod combinatorics;
pub mod errors;
pub mod frontier;
pub mod genetic_map;
pub mod genotypes;
pub mod heuristics;
pub mod objectives;
pub mod probability;
pub mod schedules;
pub mod search;
pub mod seed_lots;

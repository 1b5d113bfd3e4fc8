//! Monte-Carlo tree search over crossing schedules.
//!
//! An anytime alternative to the exhaustive branch-and-bound: a UCT tree
//! whose states are growing pools of partial schedules. One action extends
//! the pool by a crossing or selfing of pooled schemes; expansion
//! materializes all legal one-step extensions, rollouts extend randomly to a
//! depth bound. Complete schemes found anywhere along the way are registered
//! on the shared frontier, so the frontier is the running best estimate.

use super::{SearchConfig, SearchInput, SearchState};
use crate::errors::ConfigError;
use crate::frontier::ParetoFrontier;
use crate::schedules::CrossingScheme;
use log::{debug, info};
use rand::prelude::*;
use std::sync::Arc;

const UCT_C: f64 = std::f64::consts::SQRT_2;

/// Runs `iterations` UCT simulations and returns the frontier of complete
/// schemes encountered. Unlike branch-and-bound the result is a best-effort
/// estimate, not a certified Pareto frontier.
pub fn search(
    input: SearchInput,
    config: SearchConfig,
    iterations: usize,
) -> Result<Arc<ParetoFrontier>, ConfigError> {
    let max_generations = config.max_generations.unwrap_or(8);
    let state = SearchState::new(input, config)?;

    let founders = state
        .founder_schemes()
        .map_err(|e| ConfigError::InvalidInput(e.to_string()))?;
    for scheme in &founders {
        if scheme.reaches(&state.input().ideotype) {
            state.frontier().add(scheme.clone());
        }
    }

    let mut root = Node::new(founders);
    let mut rng = StdRng::from_entropy();
    for i in 0..iterations {
        if state.deadline_expired() {
            debug!("runtime limit reached after {i} simulations");
            break;
        }
        simulate(&mut root, &state, &mut rng, max_generations);
    }
    info!(
        "mcts finished: {} simulations requested, {} schedules on the frontier",
        iterations,
        state.frontier().len()
    );
    Ok(state.frontier().clone())
}

struct Node {
    /// Partial schedules available in this state, founders included.
    pool: Vec<CrossingScheme>,
    visits: u64,
    value: f64,
    children: Vec<Node>,
    expanded: bool,
}

impl Node {
    fn new(pool: Vec<CrossingScheme>) -> Self {
        Self {
            pool,
            visits: 0,
            value: 0.0,
            children: Vec::new(),
            expanded: false,
        }
    }

    fn uct(&self, parent_visits: u64) -> f64 {
        if self.visits == 0 {
            return f64::INFINITY;
        }
        self.value / self.visits as f64
            + UCT_C * ((parent_visits as f64).ln() / self.visits as f64).sqrt()
    }
}

/// Crossing (i, Some(j)) or selfing (i, None) of pooled schemes.
fn actions(pool: &[CrossingScheme], max_generations: usize) -> Vec<(usize, Option<usize>)> {
    let mut out = Vec::new();
    for i in 0..pool.len() {
        if pool[i].generations() >= max_generations {
            continue;
        }
        for j in i + 1..pool.len() {
            if pool[j].generations().max(pool[i].generations()) < max_generations {
                out.push((i, Some(j)));
            }
        }
        out.push((i, None));
    }
    out
}

fn apply(
    state: &SearchState,
    pool: &[CrossingScheme],
    action: (usize, Option<usize>),
) -> Vec<CrossingScheme> {
    match action {
        (i, Some(j)) => state.extend_pair(&pool[i], &pool[j]),
        (i, None) => state.extend_self(&pool[i]),
    }
}

/// One selection / expansion / rollout / backpropagation pass. Returns the
/// reward propagated to the root.
fn simulate(node: &mut Node, state: &SearchState, rng: &mut StdRng, max_generations: usize) -> f64 {
    if !node.expanded {
        node.expanded = true;
        for action in actions(&node.pool, max_generations) {
            for scheme in apply(state, &node.pool, action) {
                let mut pool = node.pool.clone();
                pool.push(scheme);
                node.children.push(Node::new(pool));
            }
        }
    }
    let reward = if node.children.is_empty() {
        evaluate(state, &node.pool)
    } else if let Some(child) = node.children.iter_mut().find(|c| c.visits == 0) {
        let reward = rollout(state, child.pool.clone(), rng, max_generations);
        child.visits = 1;
        child.value = reward;
        reward
    } else {
        let parent_visits = node.visits.max(1);
        let child = node
            .children
            .iter_mut()
            .max_by(|a, b| {
                a.uct(parent_visits)
                    .partial_cmp(&b.uct(parent_visits))
                    .expect("uct values are comparable")
            })
            .expect("children are non-empty");
        simulate(child, state, rng, max_generations)
    };
    node.visits += 1;
    node.value += reward;
    reward
}

/// Random playout: extend the pool with random actions until the frontier
/// grows or the depth bound is hit.
fn rollout(
    state: &SearchState,
    mut pool: Vec<CrossingScheme>,
    rng: &mut StdRng,
    max_generations: usize,
) -> f64 {
    let before = state.frontier().len();
    for _ in 0..max_generations {
        let actions = actions(&pool, max_generations);
        if actions.is_empty() {
            break;
        }
        let action = actions[rng.gen_range(0..actions.len())];
        let mut produced = apply(state, &pool, action);
        if state.frontier().len() > before {
            break;
        }
        if produced.is_empty() {
            continue;
        }
        let pick = rng.gen_range(0..produced.len());
        pool.push(produced.swap_remove(pick));
    }
    if state.frontier().len() > before {
        let best = state
            .frontier()
            .descriptors()
            .iter()
            .map(|d| d.total_population)
            .min()
            .unwrap_or(1);
        complete_reward(best)
    } else {
        evaluate(state, &pool)
    }
}

/// Reward of a completed playout, shrinking gently with population size but
/// always above the dead-playout ceiling of 0.2.
fn complete_reward(population: u64) -> f64 {
    0.2 + 0.8 / (1.0 + (1.0 + population as f64).log10())
}

/// Reward of a dead playout: how close the best pooled genotype got,
/// discounted below any completed playout.
fn evaluate(state: &SearchState, pool: &[CrossingScheme]) -> f64 {
    let ideotype = &state.input().ideotype;
    let best = pool
        .iter()
        .map(|s| s.root_genotype().allele_score(ideotype))
        .fold(0.0f64, f64::max);
    0.2 * best
}

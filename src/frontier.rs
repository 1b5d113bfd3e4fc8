//! The running Pareto frontier of complete schedules.

use crate::objectives::DominatesRelation;
use crate::schedules::{CrossingScheme, CrossingSchemeDescriptor};
use log::info;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Observer invoked with the descriptor of every newly registered schedule.
pub type FrontierCallback = Arc<dyn Fn(&CrossingSchemeDescriptor) + Send + Sync>;

/// Thread-safe set of non-dominated complete schedules, grouped by
/// generation count.
///
/// `add` is atomic with respect to concurrent producers: a schedule is
/// inserted only if no current member dominates it, and members it dominates
/// are evicted in the same critical section. The change callback runs after
/// the lock is released.
pub struct ParetoFrontier {
    dominance: Arc<dyn DominatesRelation>,
    inner: Mutex<BTreeMap<usize, Vec<CrossingScheme>>>,
    callback: Option<FrontierCallback>,
}

impl ParetoFrontier {
    pub fn new(dominance: Arc<dyn DominatesRelation>) -> Self {
        Self {
            dominance,
            inner: Mutex::new(BTreeMap::new()),
            callback: None,
        }
    }

    pub fn with_callback(dominance: Arc<dyn DominatesRelation>, callback: FrontierCallback) -> Self {
        Self {
            callback: Some(callback),
            ..Self::new(dominance)
        }
    }

    /// Registers a complete schedule. Returns whether it was inserted.
    pub fn add(&self, scheme: CrossingScheme) -> bool {
        let descriptor = scheme.descriptor().clone();
        {
            let mut inner = self.inner.lock().expect("frontier poisoned");
            let dominated = inner.values().flatten().any(|member| {
                self.dominance.dominates(member.descriptor(), &descriptor)
            });
            if dominated {
                return false;
            }
            for members in inner.values_mut() {
                members.retain(|member| {
                    !self.dominance.dominates(&descriptor, member.descriptor())
                });
            }
            inner.retain(|_, members| !members.is_empty());
            inner
                .entry(scheme.generations())
                .or_default()
                .push(scheme);
        }
        info!(
            "frontier: registered schedule ({} generations, population {}, LPA {:.4})",
            descriptor.generations, descriptor.total_population, descriptor.lpa
        );
        if let Some(callback) = &self.callback {
            callback(&descriptor);
        }
        true
    }

    /// Whether any registered schedule dominates `descriptor`. Used as the
    /// completion-bound pruning test.
    pub fn dominates(&self, descriptor: &CrossingSchemeDescriptor) -> bool {
        let inner = self.inner.lock().expect("frontier poisoned");
        inner
            .values()
            .flatten()
            .any(|member| self.dominance.dominates(member.descriptor(), descriptor))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().expect("frontier poisoned").is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("frontier poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Snapshot of the current members, grouped by generation count.
    pub fn schemes_by_generation(&self) -> BTreeMap<usize, Vec<CrossingScheme>> {
        self.inner.lock().expect("frontier poisoned").clone()
    }

    pub fn schemes(&self) -> Vec<CrossingScheme> {
        self.inner
            .lock()
            .expect("frontier poisoned")
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub fn descriptors(&self) -> Vec<CrossingSchemeDescriptor> {
        self.inner
            .lock()
            .expect("frontier poisoned")
            .values()
            .flatten()
            .map(|s| s.descriptor().clone())
            .collect()
    }
}

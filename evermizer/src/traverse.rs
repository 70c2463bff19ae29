use anyhow::{bail, ensure, Result};
use evermizer_game::{CheckIdx, CheckKey};
use evermizer_logic::{LogicGraph, ProgressCounts, ProgressPair};
use log::debug;

/// Checks first reached during one pass, in the order they were reached, together with
/// the counts accumulated by the end of the pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraversalStep {
    pub step_num: usize,
    pub reached: Vec<CheckIdx>,
    pub counts: ProgressCounts,
}

/// Fixpoint solver over a logic graph. Owns all of its mutable state; the graph is only
/// borrowed, so any number of traversers can run over the same graph concurrently.
///
/// Each pass walks the unreached checks in evaluation order, and a check reached during a
/// pass credits its provisions immediately, so later checks in the same pass can already
/// use them. Passes repeat until one adds nothing. The default evaluation order is
/// ascending (type, index), which fixes the acquisition order; the final reached set and
/// counts do not depend on the order.
pub struct Traverser<'a> {
    graph: &'a LogicGraph,
    extra_provides: Vec<Vec<ProgressPair>>,
    evaluation_order: Vec<CheckIdx>,
    pub initial_counts: ProgressCounts,
    pub counts: ProgressCounts,
    pub reached: Vec<bool>,
    pub reached_step: Vec<Option<usize>>,
    pub acquisition_order: Vec<CheckIdx>,
    pub past_steps: Vec<TraversalStep>,
    pub num_passes: usize,
}

impl<'a> Traverser<'a> {
    pub fn new(graph: &'a LogicGraph, initial_counts: ProgressCounts) -> Self {
        let num_checks = graph.num_checks();
        let mut evaluation_order: Vec<CheckIdx> = (0..num_checks).collect();
        evaluation_order.sort_by_key(|&i| graph.checks[i].key);
        Self {
            graph,
            extra_provides: vec![vec![]; num_checks],
            evaluation_order,
            initial_counts,
            counts: initial_counts,
            reached: vec![false; num_checks],
            reached_step: vec![None; num_checks],
            acquisition_order: vec![],
            past_steps: vec![],
            num_passes: 0,
        }
    }

    pub fn graph(&self) -> &'a LogicGraph {
        self.graph
    }

    /// Overrides the order in which checks are evaluated within a pass. `order` must be a
    /// permutation of all check indexes.
    pub fn set_evaluation_order(&mut self, order: Vec<CheckIdx>) -> Result<()> {
        let num_checks = self.graph.num_checks();
        ensure!(
            order.len() == num_checks,
            "Evaluation order has {} entries for {} checks",
            order.len(),
            num_checks
        );
        let mut seen = vec![false; num_checks];
        for &idx in &order {
            if idx >= num_checks {
                bail!("Check index {} out of range ({} checks)", idx, num_checks);
            }
            if seen[idx] {
                bail!("Check index {} listed more than once", idx);
            }
            seen[idx] = true;
        }
        self.evaluation_order = order;
        Ok(())
    }

    /// Attaches extra provisions to a check, e.g. those of an item placed there. If the check
    /// was already reached, they are credited right away.
    pub fn add_provides(&mut self, check_idx: CheckIdx, provides: &[ProgressPair]) {
        if self.reached[check_idx] {
            self.counts.collect(provides);
        }
        self.extra_provides[check_idx].extend_from_slice(provides);
    }

    /// Catalog provisions of a check together with any extra provisions attached to it.
    pub fn check_provides(&self, check_idx: CheckIdx) -> Vec<ProgressPair> {
        let mut out = self.graph.checks[check_idx].provides.clone();
        out.extend_from_slice(&self.extra_provides[check_idx]);
        out
    }

    /// Grants resources directly, as for an item handed to the player outside of any check.
    pub fn add_counts(&mut self, counts: &ProgressCounts) {
        self.counts.collect_counts(counts);
    }

    pub fn is_reached(&self, key: CheckKey) -> bool {
        match self.graph.check_idx(key) {
            Some(idx) => self.reached[idx],
            None => false,
        }
    }

    pub fn unreached(&self) -> impl Iterator<Item = CheckIdx> + '_ {
        (0..self.reached.len()).filter(|&i| !self.reached[i])
    }

    pub fn is_fully_explored(&self) -> bool {
        self.reached.iter().all(|&x| x)
    }

    /// Runs a single pass, returning the number of checks newly reached.
    pub fn step(&mut self) -> usize {
        let step_num = self.past_steps.len();
        let mut newly_reached: Vec<CheckIdx> = vec![];
        for i in 0..self.evaluation_order.len() {
            let idx = self.evaluation_order[i];
            if self.reached[idx] {
                continue;
            }
            let check = &self.graph.checks[idx];
            if !self.counts.meets(&check.requires) {
                continue;
            }
            self.reached[idx] = true;
            self.reached_step[idx] = Some(step_num);
            self.counts.collect(&check.provides);
            self.counts.collect(&self.extra_provides[idx]);
            self.acquisition_order.push(idx);
            newly_reached.push(idx);
        }
        self.num_passes += 1;
        let num_reached = newly_reached.len();
        if num_reached > 0 {
            self.past_steps.push(TraversalStep {
                step_num,
                reached: newly_reached,
                counts: self.counts,
            });
        }
        num_reached
    }

    /// Repeats passes until settled. Returns true if any new check was reached.
    pub fn traverse(&mut self) -> bool {
        let mut progress = false;
        while self.step() > 0 {
            progress = true;
        }
        debug!(
            "Traversal settled after {} passes: {}/{} checks reached, counts {:?}",
            self.num_passes,
            self.acquisition_order.len(),
            self.reached.len(),
            self.counts.counts
        );
        progress
    }
}

/// Solves the graph from the given starting counts, with no extra provisions.
pub fn traverse(graph: &LogicGraph, initial_counts: ProgressCounts) -> Traverser<'_> {
    let mut traverser = Traverser::new(graph, initial_counts);
    traverser.traverse();
    traverser
}

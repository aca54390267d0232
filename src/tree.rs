//! Many-worlds-style branching engine.
//!
//! A `QuantumTree` is an ordered set of (state, probability) branches with
//! root weight 1. `branch_out` replaces every live branch by one child per
//! distinguishable outcome of a subsystem measurement, carrying the projected
//! state and the conditional probability; a branching event exactly
//! partitions the parent's probability mass among its children. Superseded
//! branches are reset before being dropped.
//!
//! Branches own their states outright and share no storage, so per-branch
//! simulation stays valid after any split. They are processed sequentially
//! in a fixed order: children in ascending outcome value within each parent,
//! parents in order.

use std::fmt;

use crate::error::Result;
use crate::quantum_system::{dirac, QuantumSystem};
use crate::subspace::{
    overlaps_with_subspace, probability_in_subspace, project_wavefunction, Wavefunction,
};

/// Every subsystem value with nonzero overlap in the current state, together
/// with the projected wavefunction and the conditional probability.
pub fn possible_branches(
    qsys: &QuantumSystem,
    subsys: &str,
) -> Result<Vec<(u64, Wavefunction, f64)>> {
    let width = qsys.width_of(subsys)?;
    let wavefunc = qsys.wavefunction();
    let mut found = Vec::new();
    for value in 0..(1u64 << width) {
        let subspace = qsys.subspace_of_state_n(subsys, value)?;
        if !overlaps_with_subspace(&wavefunc, &subspace) {
            continue;
        }
        let probability = probability_in_subspace(&wavefunc, &subspace);
        // Overlap above tolerance guarantees a renormalizable projection.
        if let Some(projected) = project_wavefunction(&wavefunc, &subspace) {
            found.push((value, projected, probability));
        }
    }
    Ok(found)
}

/// Ordered weighted branches of a decomposed state.
pub struct QuantumTree {
    branches: Vec<(QuantumSystem, f64)>,
}

impl QuantumTree {
    /// A tree with a single root branch of weight 1.
    pub fn new(root: QuantumSystem) -> Self {
        Self {
            branches: vec![(root, 1.0)],
        }
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// The state of branch `index`.
    pub fn branch(&self, index: usize) -> &QuantumSystem {
        &self.branches[index].0
    }

    /// Absolute probability of branch `index` (relative to the root).
    pub fn probability(&self, index: usize) -> f64 {
        self.branches[index].1
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.branches.iter().map(|(_, p)| *p).collect()
    }

    /// Refine every live branch along the possible outcomes of measuring
    /// `subsys`. Children carry the projected state and the parent's
    /// probability times the conditional outcome probability; parents are
    /// reset and discarded.
    pub fn branch_out(&mut self, subsys: &str) -> Result<()> {
        let mut refined = Vec::new();
        for (branch, parent_probability) in &mut self.branches {
            for (_, wavefunc, probability) in possible_branches(branch, subsys)? {
                let mut child = QuantumSystem::new(branch.requirements())?;
                child.set_wavefunction(&wavefunc)?;
                refined.push((child, *parent_probability * probability));
            }
            branch.reset();
        }
        self.branches = refined;
        Ok(())
    }

    /// Promote branch `index` to the root of a new, independent tree (weight
    /// 1), leaving this tree untouched. Deep copy: the new tree aliases no
    /// storage of the old one.
    pub fn split_branch(&self, index: usize) -> QuantumTree {
        QuantumTree::new(self.branches[index].0.clone())
    }

    /// The per-branch tree-runner combinator: apply a single-state operation
    /// to every live branch, then optionally branch along a subsystem. This
    /// is the single mechanism by which step actions written against one
    /// state compose across the whole tree.
    pub fn apply<F>(&mut self, mut op: F, branch_on: Option<&str>) -> Result<()>
    where
        F: FnMut(&mut QuantumSystem) -> Result<()>,
    {
        for (branch, _) in &mut self.branches {
            op(branch)?;
        }
        if let Some(subsys) = branch_on {
            self.branch_out(subsys)?;
        }
        Ok(())
    }

    /// Per-branch possible values of a subsystem.
    pub fn possible_outcomes(&self, subsys: &str) -> Result<Vec<Vec<u64>>> {
        self.branches
            .iter()
            .map(|(branch, _)| branch.possible_values(subsys))
            .collect()
    }

    /// Definite value of `subsys` in branch `index`.
    pub fn readout(&self, index: usize, subsys: &str) -> Result<u64> {
        self.branches[index].0.readout(subsys)
    }

    /// Reset every branch to the all-zero label.
    pub fn reset_all(&mut self) {
        for (branch, _) in &mut self.branches {
            branch.reset();
        }
    }
}

impl fmt::Display for QuantumTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (branch, probability)) in self.branches.iter().enumerate() {
            writeln!(f, "---- Branch {index} (p = {probability:.4}) ----")?;
            writeln!(f, "{}", dirac(&branch.wavefunction()))?;
        }
        Ok(())
    }
}

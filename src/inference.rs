//! Inference-table algorithms.
//!
//! Forward inference derives what values an output subsystem can take at
//! `t_y` given the input subsystem held value i at `t_x`, by re-running the
//! protocol under hypothetical initial conditions. Two strategies are
//! provided and must agree whenever the input is a classical (decohered)
//! observable at `t_x`:
//!
//! - direct: per input value, run to `t_x`, project onto "input = i",
//!   continue to `t_y`, harvest overlaps;
//! - tree-based: run once with branching to `t_x`, read the definite input
//!   off each branch, continue each branch with branching to `t_y`, union
//!   outcomes per input value.
//!
//! Backward inference is pure set inversion of a forward table; consistency
//! composes two tables sharing a boundary (subsystem, time).

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::agent::InferenceTable;
use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::quantum_system::QuantumSystem;
use crate::tree::QuantumTree;

fn check_times(protocol: &Protocol, t_x: i64, t_y: i64) -> Result<()> {
    let times = protocol.get_times();
    if !times.contains(&t_x) || !times.contains(&t_y) {
        return Err(Error::TimeNotInProtocol { t_x, t_y });
    }
    Ok(())
}

/// Forward inference by direct per-value re-simulation with projection.
///
/// Input values whose projection has zero overlap (counterfactuals the
/// protocol never realizes) are omitted from the mapping.
pub fn forward_inference(
    protocol: &Protocol,
    subsys_x: &str,
    t_x: i64,
    subsys_y: &str,
    t_y: i64,
) -> Result<InferenceTable> {
    check_times(protocol, t_x, t_y)?;
    let mut qsys = QuantumSystem::new(protocol.requirements())?;
    let width_x = qsys.width_of(subsys_x)?;

    let mut mapping: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for i in 0..(1u64 << width_x) {
        debug!("forward inference case {subsys_x} = {i}");
        protocol.run(&mut qsys, i64::MIN, t_x)?;

        let subspace = qsys.subspace_of_state_n(subsys_x, i)?;
        if qsys.project_to_subspace(&subspace)?.is_none() {
            // This input value never occurs; no image.
            qsys.reset();
            continue;
        }

        protocol.run(&mut qsys, t_x + 1, t_y)?;
        let outcomes = qsys.possible_values(subsys_y)?;
        qsys.reset();
        mapping.insert(i, outcomes);
    }

    Ok(InferenceTable::new(subsys_x, t_x, subsys_y, t_y, mapping))
}

/// Forward inference via the branching engine.
///
/// Requires the protocol to have decohered `subsys_x` by `t_x` (each branch
/// must carry a definite input value); otherwise a `NotDefinite` error
/// surfaces the logic error in the query.
pub fn forward_inference_tree(
    protocol: &Protocol,
    subsys_x: &str,
    t_x: i64,
    subsys_y: &str,
    t_y: i64,
) -> Result<InferenceTable> {
    check_times(protocol, t_x, t_y)?;
    let mut tree = QuantumTree::new(QuantumSystem::new(protocol.requirements())?);
    protocol.run_tree(&mut tree, i64::MIN, t_x)?;

    let mut mapping: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for index in 0..tree.len() {
        let input_value = tree.readout(index, subsys_x)?;
        debug!("branch {index}: {subsys_x} = {input_value}");

        let mut subtree = tree.split_branch(index);
        protocol.run_tree(&mut subtree, t_x + 1, t_y)?;

        let entry = mapping.entry(input_value).or_default();
        for branch_outcomes in subtree.possible_outcomes(subsys_y)? {
            entry.extend(branch_outcomes);
        }
        subtree.reset_all();
    }
    tree.reset_all();

    let mapping = mapping
        .into_iter()
        .map(|(input, outputs)| (input, outputs.into_iter().collect()))
        .collect();
    Ok(InferenceTable::new(subsys_x, t_x, subsys_y, t_y, mapping))
}

/// Pure set inversion of a table: `i` appears in `inverted[o]` exactly when
/// `o` appears in `table[i]`. No re-simulation.
pub fn invert_table(table: &InferenceTable) -> InferenceTable {
    let mut inverted: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (&input, outputs) in table.table() {
        for &output in outputs {
            inverted.entry(output).or_default().push(input);
        }
    }
    let (input_var, input_time) = table.input();
    let (output_var, output_time) = table.output();
    InferenceTable::new(output_var, output_time, input_var, input_time, inverted)
}

/// Backward inference: what input values at `t_x` are compatible with an
/// observed output value at `t_y`. Derived by inverting the forward table.
pub fn backward_inference(
    protocol: &Protocol,
    subsys_x: &str,
    t_x: i64,
    subsys_y: &str,
    t_y: i64,
) -> Result<InferenceTable> {
    let forward = forward_inference(protocol, subsys_x, t_x, subsys_y, t_y)?;
    Ok(invert_table(&forward))
}

/// Chain two tables sharing a boundary (subsystem, time) into one end-to-end
/// table: `composed[x]` is the union of `post[v]` over `v` in `pre[x]`.
pub fn consistency(pre: &InferenceTable, post: &InferenceTable) -> Result<InferenceTable> {
    if pre.output() != post.input() {
        let (pre_var, pre_time) = pre.output();
        let (post_var, post_time) = post.input();
        return Err(Error::BoundaryMismatch {
            pre_var: pre_var.to_string(),
            pre_time,
            post_var: post_var.to_string(),
            post_time,
        });
    }

    let mut composed: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for (&input, boundary_values) in pre.table() {
        let mut outputs = BTreeSet::new();
        for &value in boundary_values {
            outputs.extend(post.outputs_for(value).iter().copied());
        }
        composed.insert(input, outputs.into_iter().collect());
    }

    let (input_var, input_time) = pre.input();
    let (output_var, output_time) = post.output();
    Ok(InferenceTable::new(
        input_var, input_time, output_var, output_time, composed,
    ))
}

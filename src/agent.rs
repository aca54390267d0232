//! Agents: memory, prediction, and a table-driven reversible inference.
//!
//! An agent owns a memory register (width m), a prediction register (width p,
//! p <= m) and an inference workspace of 2^m slices of p qubits; slice i holds
//! the prediction associated with memory value i. The inference operation is
//! a controlled modular-add of the active slice into the prediction register
//! and is exactly reversible: `make_inference(reverse = true)` undoes a prior
//! forward call bit-for-bit, which is what lets a protocol rewind an agent's
//! reasoning.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use log::warn;

use crate::backend::{range_qubits, StateVector};
use crate::error::{Error, Result};

/// An immutable inference-table record: which values of the output subsystem
/// at the output time are compatible with each value of the input subsystem
/// at the input time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceTable {
    input_var: String,
    input_time: i64,
    output_var: String,
    output_time: i64,
    table: BTreeMap<u64, Vec<u64>>,
}

impl InferenceTable {
    /// Build a table; output sets are sorted and de-duplicated.
    pub fn new(
        input_var: &str,
        input_time: i64,
        output_var: &str,
        output_time: i64,
        table: BTreeMap<u64, Vec<u64>>,
    ) -> Self {
        let table = table
            .into_iter()
            .map(|(input, mut outputs)| {
                outputs.sort_unstable();
                outputs.dedup();
                (input, outputs)
            })
            .collect();
        Self {
            input_var: input_var.to_string(),
            input_time,
            output_var: output_var.to_string(),
            output_time,
            table,
        }
    }

    /// The (subsystem, time) pair observed as input.
    pub fn input(&self) -> (&str, i64) {
        (&self.input_var, self.input_time)
    }

    /// The (subsystem, time) pair predicted as output.
    pub fn output(&self) -> (&str, i64) {
        (&self.output_var, self.output_time)
    }

    pub fn table(&self) -> &BTreeMap<u64, Vec<u64>> {
        &self.table
    }

    /// Compatible output values for one input value; empty if the input does
    /// not appear in the table.
    pub fn outputs_for(&self, input: u64) -> &[u64] {
        self.table.get(&input).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Display for InferenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!(
            "{:<22}|  Out: ({}:t{})",
            format!("In:({}:t{})", self.input_var, self.input_time),
            self.output_var,
            self.output_time
        );
        writeln!(f, "{header}")?;
        writeln!(f, "{}", "-".repeat(header.len()))?;
        for (input, outputs) in &self.table {
            writeln!(f, "  {:<20}|  {:?}", input, outputs)?;
        }
        Ok(())
    }
}

/// An agent's quantum registers plus its resolved inference table.
///
/// Holds qubit ranges into the owning `QuantumSystem`'s backend state, not
/// qubits themselves; all operations take the backend explicitly.
#[derive(Debug, Clone)]
pub struct Agent {
    n_memory: usize,
    n_pred: usize,
    memory: Range<usize>,
    prediction: Range<usize>,
    workspace: Range<usize>,
    /// Per-memory-value prediction, resolved from the supplied table.
    resolved: Vec<u64>,
    /// Prediction value meaning "I do not know".
    no_prediction: u64,
    prepared: bool,
    inference_made: bool,
}

impl Agent {
    /// Lay out an agent starting at `offset`: memory, then prediction, then
    /// the 2^m * p workspace. Width constraints were validated with the
    /// resource declaration.
    pub(crate) fn allocate(offset: usize, n_memory: usize, n_pred: usize) -> Self {
        debug_assert!(n_pred <= n_memory && n_pred > 0);
        let n_workspace = (1 << n_memory) * n_pred;
        let memory = offset..offset + n_memory;
        let prediction = memory.end..memory.end + n_pred;
        let workspace = prediction.end..prediction.end + n_workspace;
        Self {
            n_memory,
            n_pred,
            memory,
            prediction,
            workspace,
            resolved: vec![0; 1 << n_memory],
            no_prediction: 0,
            prepared: false,
            inference_made: false,
        }
    }

    pub fn n_memory(&self) -> usize {
        self.n_memory
    }

    pub fn n_pred(&self) -> usize {
        self.n_pred
    }

    /// Total qubits of the agent: memory + prediction + workspace.
    pub fn n_qubits(&self) -> usize {
        self.n_memory + self.n_pred + self.workspace.len()
    }

    pub fn memory_range(&self) -> Range<usize> {
        self.memory.clone()
    }

    pub fn prediction_range(&self) -> Range<usize> {
        self.prediction.clone()
    }

    /// Workspace slice holding the prediction for memory value `i`.
    fn slice(&self, i: usize) -> Range<usize> {
        let start = self.workspace.start + i * self.n_pred;
        start..start + self.n_pred
    }

    /// Whether the table-lookup operation has executed.
    pub fn inference_made(&self) -> bool {
        self.inference_made
    }

    /// Whether the inference workspace has been loaded.
    pub fn prepared(&self) -> bool {
        self.prepared
    }

    /// The resolved per-memory-value predictions.
    pub fn resolved_table(&self) -> &[u64] {
        &self.resolved
    }

    /// Load the agent's inference table.
    ///
    /// An input with more than one candidate output (or none) collapses to
    /// the "no prediction" sentinel; no disambiguation is attempted. Width
    /// violations are configuration errors and leave the table untouched.
    pub fn set_inference_table(&mut self, table: &InferenceTable) -> Result<()> {
        if table.len() > 1 << self.n_memory {
            return Err(Error::TableTooLarge {
                entries: table.len(),
                n_memory: self.n_memory,
            });
        }
        let mut resolved = vec![self.no_prediction; 1 << self.n_memory];
        for (&input, outputs) in table.table() {
            if input >= 1 << self.n_memory {
                return Err(Error::ValueOutOfRange {
                    value: input,
                    width: self.n_memory,
                });
            }
            resolved[input as usize] = match outputs {
                outputs if outputs.len() == 1 => {
                    let value = outputs[0];
                    if value >= 1 << self.n_pred {
                        return Err(Error::PredictionOutOfRange {
                            value,
                            n_pred: self.n_pred,
                        });
                    }
                    value
                }
                _ => self.no_prediction,
            };
        }
        self.resolved = resolved;
        Ok(())
    }

    /// Write the resolved prediction of each memory value into its workspace
    /// slice. Idempotent: a second call is a no-op, the workspace stays
    /// loaded.
    pub fn prep_inference(&mut self, backend: &mut StateVector) {
        if self.prepared {
            return;
        }
        for (i, &prediction) in self.resolved.iter().enumerate() {
            let slice = self.slice(i);
            for bit in 0..self.n_pred {
                if prediction >> bit & 1 == 1 {
                    backend.apply_x(slice.start + bit);
                }
            }
        }
        self.prepared = true;
    }

    /// The table-lookup operation: for every memory value i, map the memory
    /// pattern for i onto the all-ones control pattern, add workspace slice i
    /// into the prediction register controlled on the memory, and map the
    /// memory back. The bit-flip map is self-inverse and add/subtract are
    /// mutual inverses, so `reverse = true` undoes a prior forward call
    /// exactly.
    pub fn make_inference(&mut self, backend: &mut StateVector, reverse: bool) {
        if !self.prepared {
            warn!("make_inference called before prep_inference; workspace holds default values");
        }
        let memory_qubits = range_qubits(&self.memory);
        let prediction_qubits = range_qubits(&self.prediction);
        for i in 0..(1u64 << self.n_memory) {
            self.state_i_to_ones(backend, i);
            let slice_qubits = range_qubits(&self.slice(i as usize));
            backend.add_register(&slice_qubits, &prediction_qubits, reverse, &memory_qubits);
            self.state_i_to_ones(backend, i);
        }
        self.inference_made = true;
    }

    /// Map memory basis state |i> to |1...1> (self-inverse bit-flip pattern).
    fn state_i_to_ones(&self, backend: &mut StateVector, i: u64) {
        for bit in 0..self.n_memory {
            if i >> bit & 1 == 0 {
                backend.apply_x(self.memory.start + bit);
            }
        }
    }

    /// Forget prepared/inference flags after the underlying qubits were reset.
    pub(crate) fn clear_flags(&mut self) {
        self.prepared = false;
        self.inference_made = false;
    }
}

//! Composite quantum state over named subsystems.
//!
//! A `QuantumSystem` owns one backend state plus an ordered list of named
//! subsystems, each assigned a contiguous qubit range in allocation order.
//! Ranges are contiguous, non-overlapping, and jointly cover all qubits
//! exactly once; a subsystem's width is fixed at allocation.
//!
//! Construction resolves a consolidated [`Requirements`] registry; full
//! agents additionally register `{name}_memory` and `{name}_prediction`
//! aliases into their span, so protocol actions can address an agent's parts
//! by name.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use log::{debug, warn};
use rand::thread_rng;

use crate::agent::{Agent, InferenceTable};
use crate::backend::{range_qubits, Matrix2, StateVector};
use crate::error::{Error, Result};
use crate::resources::{Requirements, ResourceKind};
use crate::subspace::{
    all_basis_vectors, filter_subspace, int_to_bitstring, outer_subspace_product, overlaps_with_subspace,
    renormalize, Subspace, Wavefunction, NORM_TOL,
};

/// Bit order for rendering a readout value.
///
/// `Internal` is the MSB-first order basis labels are stored in; `Print` is
/// the reversed rendering. The two are kept distinct and never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    Internal,
    Print,
}

#[derive(Debug, Clone)]
struct Handle {
    offset: usize,
    width: usize,
}

/// Named-subsystem bookkeeping over a single backend state.
#[derive(Debug, Clone)]
pub struct QuantumSystem {
    requirements: Requirements,
    backend: StateVector,
    /// Top-level subsystems in allocation order (an agent is one entry).
    order: Vec<String>,
    handles: BTreeMap<String, Handle>,
    agents: BTreeMap<String, Agent>,
}

impl QuantumSystem {
    /// Resolve a registry into contiguously allocated subsystems on a fresh
    /// all-zero backend state.
    pub fn new(requirements: &Requirements) -> Result<Self> {
        let mut requirements = requirements.clone();
        requirements.consolidate();

        let mut order = Vec::new();
        let mut handles: BTreeMap<String, Handle> = BTreeMap::new();
        let mut agents = BTreeMap::new();
        let mut offset = 0usize;

        for (kind, name) in requirements.entries() {
            debug!("require {kind} {name}");
            match kind {
                ResourceKind::Qubit => {
                    handles.insert(name.clone(), Handle { offset, width: 1 });
                    order.push(name);
                    offset += 1;
                }
                ResourceKind::Register(width) => {
                    handles.insert(name.clone(), Handle { offset, width });
                    order.push(name);
                    offset += width;
                }
                ResourceKind::AgentMemory(width) => {
                    let label = format!("{name}_memory");
                    handles.insert(label.clone(), Handle { offset, width });
                    order.push(label);
                    offset += width;
                }
                ResourceKind::Agent { n_memory, n_pred } => {
                    let agent = Agent::allocate(offset, n_memory, n_pred);
                    handles.insert(
                        name.clone(),
                        Handle {
                            offset,
                            width: agent.n_qubits(),
                        },
                    );
                    let memory = agent.memory_range();
                    handles.insert(
                        format!("{name}_memory"),
                        Handle {
                            offset: memory.start,
                            width: memory.len(),
                        },
                    );
                    let prediction = agent.prediction_range();
                    handles.insert(
                        format!("{name}_prediction"),
                        Handle {
                            offset: prediction.start,
                            width: prediction.len(),
                        },
                    );
                    order.push(name.clone());
                    offset += agent.n_qubits();
                    agents.insert(name, agent);
                }
            }
        }

        Ok(Self {
            requirements,
            backend: StateVector::new(offset),
            order,
            handles,
            agents,
        })
    }

    pub fn n_qubits(&self) -> usize {
        self.backend.n_qubits()
    }

    /// Top-level subsystem names in allocation order (reverse of print order).
    pub fn subsystems(&self) -> &[String] {
        &self.order
    }

    /// The consolidated registry this system was built from.
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    fn handle(&self, name: &str) -> Result<&Handle> {
        self.handles
            .get(name)
            .ok_or_else(|| Error::UnknownSubsystem(name.to_string()))
    }

    /// The contiguous qubit range of a named subsystem.
    pub fn position_of(&self, name: &str) -> Result<Range<usize>> {
        let handle = self.handle(name)?;
        Ok(handle.offset..handle.offset + handle.width)
    }

    /// Qubit width of a named subsystem.
    pub fn width_of(&self, name: &str) -> Result<usize> {
        Ok(self.handle(name)?.width)
    }

    /// The current wavefunction, keyed by MSB-first basis labels.
    pub fn wavefunction(&self) -> Wavefunction {
        self.backend.wavefunction()
    }

    /// Set the system to a custom wavefunction covering the full space.
    pub fn set_wavefunction(&mut self, wavefunc: &Wavefunction) -> Result<()> {
        self.backend.set_wavefunction(wavefunc)
    }

    /// The subspace in which `name` holds value `n` while every other qubit
    /// ranges over all its values.
    pub fn subspace_of_state_n(&self, name: &str, n: u64) -> Result<Subspace> {
        let handle = self.handle(name)?;
        if n >= 1 << handle.width {
            return Err(Error::ValueOutOfRange {
                value: n,
                width: handle.width,
            });
        }
        // Labels are MSB-first: later-allocated qubits sit left of `name`'s
        // own bits, earlier-allocated qubits right of them.
        let post_len = handle.offset;
        let pre_len = self.n_qubits() - post_len - handle.width;
        let own = vec![int_to_bitstring(n, handle.width)];
        let subspace = outer_subspace_product(&all_basis_vectors(pre_len), &own, false);
        Ok(outer_subspace_product(&subspace, &all_basis_vectors(post_len), false))
    }

    /// Project the backend state onto a basis-aligned subspace.
    ///
    /// On zero overlap the state is untouched and `Ok(None)` is returned
    /// after a diagnostic; callers must branch on the sentinel.
    pub fn project_to_subspace(&mut self, subspace: &[String]) -> Result<Option<Wavefunction>> {
        let filtered = filter_subspace(&self.wavefunction(), subspace);
        match renormalize(&filtered) {
            Some(projected) => {
                self.backend.set_wavefunction(&projected)?;
                Ok(Some(projected))
            }
            None => {
                warn!("no overlap with subspace; projection skipped");
                Ok(None)
            }
        }
    }

    /// All values of `name` with amplitude above tolerance, ascending.
    pub fn possible_values(&self, name: &str) -> Result<Vec<u64>> {
        let width = self.width_of(name)?;
        let wavefunc = self.wavefunction();
        let mut values = Vec::new();
        for value in 0..(1u64 << width) {
            let subspace = self.subspace_of_state_n(name, value)?;
            if overlaps_with_subspace(&wavefunc, &subspace) {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Read the definite value of a subsystem.
    ///
    /// Precondition: exactly one value overlaps the current wavefunction,
    /// i.e. the subsystem has decohered/been measured. More than one
    /// overlapping value is a logic error in the protocol or query.
    pub fn readout(&self, name: &str) -> Result<u64> {
        let values = self.possible_values(name)?;
        match values.as_slice() {
            [value] => Ok(*value),
            _ => Err(Error::NotDefinite {
                name: name.to_string(),
                candidates: values,
            }),
        }
    }

    /// Read a definite subsystem value as a bitstring in the given order.
    pub fn readout_bits(&self, name: &str, order: BitOrder) -> Result<String> {
        let value = self.readout(name)?;
        let bits = int_to_bitstring(value, self.width_of(name)?);
        Ok(match order {
            BitOrder::Internal => bits,
            BitOrder::Print => bits.chars().rev().collect(),
        })
    }

    /// Deterministically return the system to the all-zero basis label:
    /// measure every qubit, flip measured ones back to zero, re-measure to
    /// confirm. The canonical deallocation point.
    pub fn reset(&mut self) {
        let mut rng = thread_rng();
        let all: Vec<usize> = (0..self.n_qubits()).collect();
        let outcome = self.backend.measure(&all, &mut rng);
        for qubit in 0..self.n_qubits() {
            if outcome >> qubit & 1 == 1 {
                self.backend.apply_x(qubit);
            }
        }
        let confirm = self.backend.measure(&all, &mut rng);
        debug_assert_eq!(confirm, 0, "reset must end in the all-zero label");
        for agent in self.agents.values_mut() {
            agent.clear_flags();
        }
        debug!("quantum system reset to all-zero state");
    }

    /// Reversibly record the value of `target` into `memory` by modular
    /// addition; `reverse` applies the exact algebraic inverse (modular
    /// subtraction) to the same operands.
    ///
    /// The two operands must occupy disjoint qubit ranges; an agent's
    /// aliases (`{name}_memory` inside `{name}`) make overlap reachable by
    /// name, and an aliased add would not be a basis permutation.
    pub fn observe(&mut self, memory: &str, target: &str, reverse: bool) -> Result<()> {
        let memory_range = self.position_of(memory)?;
        let target_range = self.position_of(target)?;
        if ranges_overlap(&memory_range, &target_range) {
            return Err(Error::OverlappingSubsystems {
                first: memory.to_string(),
                second: target.to_string(),
            });
        }
        if memory_range.len() < target_range.len() {
            return Err(Error::MemoryTooSmall {
                memory: memory_range.len(),
                observed: target_range.len(),
            });
        }
        self.backend.add_register(
            &range_qubits(&target_range),
            &range_qubits(&memory_range),
            reverse,
            &[],
        );
        Ok(())
    }

    /// Apply a single-qubit unitary to a width-1 subsystem.
    pub fn apply_unitary(&mut self, name: &str, u: &Matrix2) -> Result<()> {
        let handle = self.handle(name)?;
        if handle.width != 1 {
            return Err(Error::NotSingleQubit {
                name: name.to_string(),
                width: handle.width,
            });
        }
        self.backend.apply(u, handle.offset);
        Ok(())
    }

    /// Apply a single-qubit unitary to `target`, controlled on every qubit
    /// of the `control` subsystem. Target and control ranges must be
    /// disjoint.
    pub fn apply_controlled_unitary(&mut self, target: &str, control: &str, u: &Matrix2) -> Result<()> {
        let target_range = self.position_of(target)?;
        if target_range.len() != 1 {
            return Err(Error::NotSingleQubit {
                name: target.to_string(),
                width: target_range.len(),
            });
        }
        let control_range = self.position_of(control)?;
        if ranges_overlap(&target_range, &control_range) {
            return Err(Error::OverlappingSubsystems {
                first: target.to_string(),
                second: control.to_string(),
            });
        }
        let controls = range_qubits(&control_range);
        self.backend.apply_controlled(u, target_range.start, &controls);
        Ok(())
    }

    /// XOR the bit pattern of `n` into a subsystem (prepares value `n` from
    /// the all-zero state).
    pub fn prepare_state(&mut self, name: &str, n: u64) -> Result<()> {
        let range = self.position_of(name)?;
        if n >= 1 << range.len() {
            return Err(Error::ValueOutOfRange {
                value: n,
                width: range.len(),
            });
        }
        for bit in 0..range.len() {
            if n >> bit & 1 == 1 {
                self.backend.apply_x(range.start + bit);
            }
        }
        Ok(())
    }

    // --- agent operations ---

    pub fn agent(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| Error::UnknownSubsystem(name.to_string()))
    }

    /// Load an agent's inference table (validated, applied atomically).
    pub fn set_inference_table(&mut self, name: &str, table: &InferenceTable) -> Result<()> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| Error::UnknownSubsystem(name.to_string()))?
            .set_inference_table(table)
    }

    /// Write an agent's resolved table into its inference workspace.
    pub fn prep_inference(&mut self, name: &str) -> Result<()> {
        let agent = self
            .agents
            .get_mut(name)
            .ok_or_else(|| Error::UnknownSubsystem(name.to_string()))?;
        agent.prep_inference(&mut self.backend);
        Ok(())
    }

    /// Run an agent's reversible table-lookup operation.
    pub fn make_inference(&mut self, name: &str, reverse: bool) -> Result<()> {
        let agent = self
            .agents
            .get_mut(name)
            .ok_or_else(|| Error::UnknownSubsystem(name.to_string()))?;
        agent.make_inference(&mut self.backend, reverse);
        Ok(())
    }

    /// The definite (memory, prediction) values of an agent.
    pub fn agent_readout(&self, name: &str) -> Result<(u64, u64)> {
        self.agent(name)?;
        let memory = self.readout(&format!("{name}_memory"))?;
        let prediction = self.readout(&format!("{name}_prediction"))?;
        Ok((memory, prediction))
    }
}

fn ranges_overlap(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

impl fmt::Display for QuantumSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QuantumSystem: {} qubits", self.n_qubits())?;
        let print_order: Vec<&str> = self.order.iter().rev().map(|s| s.as_str()).collect();
        writeln!(f, "{:<14}{:?}", "Print order:", print_order)?;
        write!(f, "{}", dirac(&self.wavefunction()))
    }
}

/// Render a wavefunction in Dirac notation, skipping zero amplitudes.
pub fn dirac(wavefunc: &Wavefunction) -> String {
    let mut out = String::new();
    for (label, amp) in wavefunc {
        if amp.norm() < NORM_TOL {
            continue;
        }
        if !out.is_empty() {
            out.push_str(" + ");
        }
        if amp.im.abs() < NORM_TOL {
            out.push_str(&format!("{:.2}", amp.re));
        } else if amp.re.abs() < NORM_TOL {
            out.push_str(&format!("{:.2}i", amp.im));
        } else {
            out.push_str(&format!("({:.2}+{:.2}i)", amp.re, amp.im));
        }
        out.push_str(&format!("|{label}>"));
    }
    out
}

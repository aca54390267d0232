//! # quantum-thought-sim
//!
//! Simulation of quantum thought experiments (Frauchiger–Renner style):
//! named subsystems — qubits, registers, and agents that observe and reason
//! about them — evolve under a sequence of timed protocol steps, and the
//! crate answers counterfactual questions of the form "given X was observed
//! to have value i at time t_x, what values could Y take at a later t_y?".
//!
//! ## Architecture
//!
//! - [`subspace`]: pure arithmetic over basis labels and wavefunctions
//!   (overlap, filtering, renormalization, projection, outer products).
//! - [`backend`]: the dense statevector the rest of the crate drives.
//! - [`resources`]: declarative resource requests, merged and de-duplicated
//!   across a protocol.
//! - [`quantum_system`]: named-subsystem bookkeeping over one backend state.
//! - [`agent`]: memory + prediction + a reversible table-driven inference.
//! - [`protocol`]: ordered timed steps with windowed replay.
//! - [`tree`]: many-worlds branching at measurement points, preserving the
//!   probability partition exactly.
//! - [`inference`]: forward/backward inference tables and their composition.
//!
//! Everything is single-threaded and synchronous; the branching engine is
//! the only source of combinatorial growth, and protocols here use
//! single-digit qubit counts.

pub mod agent;
pub mod backend;
pub mod error;
pub mod inference;
pub mod protocol;
pub mod quantum_system;
pub mod resources;
pub mod subspace;
pub mod tree;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::agent::{Agent, InferenceTable};
    pub use crate::backend::{amplitude_rotation, hadamard, pauli_x, Matrix2, StateVector};
    pub use crate::error::{Error, Result};
    pub use crate::inference::{
        backward_inference, consistency, forward_inference, forward_inference_tree, invert_table,
    };
    pub use crate::protocol::{Protocol, ProtocolStep};
    pub use crate::quantum_system::{dirac, BitOrder, QuantumSystem};
    pub use crate::resources::{Requirements, ResourceKind};
    pub use crate::subspace::{
        all_basis_vectors, bitstring_to_index, filter_subspace, int_to_bitstring, norm,
        outer_subspace_product, overlap,
        overlaps_with_subspace, probability_in_subspace, project_wavefunction, renormalize,
        Subspace, Wavefunction, NORM_TOL,
    };
    pub use crate::tree::{possible_branches, QuantumTree};
}

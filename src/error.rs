//! Error taxonomy for the simulator.
//!
//! Configuration errors are raised at construction/validation time and are
//! never partially applied. Precondition violations indicate a logic error in
//! a protocol or query and are surfaced as typed errors, not retried.
//! Numerical degeneracy (zero-norm renormalization, zero-overlap projection)
//! is deliberately *not* in this enum: those paths return `Option`-style
//! sentinels plus a `log::warn!` and leave the state untouched.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // --- configuration errors ---
    #[error("invalid width {width} for resource kind {kind}")]
    InvalidWidth { kind: &'static str, width: usize },

    #[error("agent cannot make more predictions than it has memory states ({n_pred} > {n_memory})")]
    TooManyPredictions { n_memory: usize, n_pred: usize },

    #[error("inference table with {entries} entries does not fit into {n_memory} memory qubits")]
    TableTooLarge { entries: usize, n_memory: usize },

    #[error("predicted value {value} does not fit into {n_pred} prediction qubits")]
    PredictionOutOfRange { value: u64, n_pred: usize },

    // --- precondition violations ---
    #[error("quantum system has no subsystem `{0}`")]
    UnknownSubsystem(String),

    #[error("subsystem `{name}` is not in a definite basis state (overlapping values: {candidates:?})")]
    NotDefinite { name: String, candidates: Vec<u64> },

    #[error("subsystem `{name}` spans {width} qubits, expected a single qubit")]
    NotSingleQubit { name: String, width: usize },

    #[error("value {value} does not fit into a register of {width} qubits")]
    ValueOutOfRange { value: u64, width: usize },

    #[error("times t_x={t_x}, t_y={t_y} do not both occur in the protocol")]
    TimeNotInProtocol { t_x: i64, t_y: i64 },

    #[error(
        "output of pre table ({pre_var}:t{pre_time}) does not match input of post table ({post_var}:t{post_time})"
    )]
    BoundaryMismatch {
        pre_var: String,
        pre_time: i64,
        post_var: String,
        post_time: i64,
    },

    #[error("observed register ({observed} qubits) is larger than the agent memory ({memory} qubits)")]
    MemoryTooSmall { memory: usize, observed: usize },

    #[error("subsystems `{first}` and `{second}` share qubits; operands must be disjoint")]
    OverlappingSubsystems { first: String, second: String },

    #[error("cannot take overlap: |psi| has {psi} populated labels, fewer than |phi| with {phi}")]
    StateSizeMismatch { psi: usize, phi: usize },

    #[error("wavefunction must enumerate all {expected} basis states, got {got}")]
    IncompleteWavefunction { expected: usize, got: usize },

    #[error("invalid basis label `{0}`")]
    InvalidBasisLabel(String),

    #[error("wavefunction norm is below tolerance, state is not renormalizable")]
    ZeroNorm,
}

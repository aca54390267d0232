//! Declarative resource requests for protocols.
//!
//! A protocol step declares the resources it touches; the registry merges and
//! de-duplicates those declarations across a whole protocol, and the resolved
//! set drives subsystem allocation in a `QuantumSystem`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};

/// The closed set of resource kinds a protocol can request.
///
/// Ordering is derivation order: it fixes the allocation order of subsystems
/// (kinds in declaration order here, names alphabetically within a kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// A single qubit.
    Qubit,
    /// A multi-qubit register of the given width.
    Register(usize),
    /// A bare agent memory register of the given width; the owning subsystem
    /// is named `{name}_memory`.
    AgentMemory(usize),
    /// A full agent: memory, prediction, and inference workspace.
    Agent { n_memory: usize, n_pred: usize },
}

impl ResourceKind {
    /// Validate the declaration shape. Errors here are fatal configuration
    /// errors and are never partially applied.
    pub fn validate(&self) -> Result<()> {
        match *self {
            ResourceKind::Qubit => Ok(()),
            ResourceKind::Register(width) if width == 0 => Err(Error::InvalidWidth {
                kind: "Register",
                width,
            }),
            ResourceKind::AgentMemory(width) if width == 0 => Err(Error::InvalidWidth {
                kind: "AgentMemory",
                width,
            }),
            ResourceKind::Agent { n_memory, n_pred } if n_memory == 0 || n_pred == 0 => {
                Err(Error::InvalidWidth {
                    kind: "Agent",
                    width: n_memory.min(n_pred),
                })
            }
            ResourceKind::Agent { n_memory, n_pred } if n_pred > n_memory => {
                Err(Error::TooManyPredictions { n_memory, n_pred })
            }
            _ => Ok(()),
        }
    }

    /// Number of qubits one named resource of this kind occupies.
    pub fn n_qubits(&self) -> usize {
        match *self {
            ResourceKind::Qubit => 1,
            ResourceKind::Register(width) => width,
            ResourceKind::AgentMemory(width) => width,
            ResourceKind::Agent { n_memory, n_pred } => {
                n_memory + n_pred + (1 << n_memory) * n_pred
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ResourceKind::Qubit => write!(f, "Qubit"),
            ResourceKind::Register(width) => write!(f, "Register({width})"),
            ResourceKind::AgentMemory(width) => write!(f, "AgentMemory({width})"),
            ResourceKind::Agent { n_memory, n_pred } => write!(f, "Agent({n_memory},{n_pred})"),
        }
    }
}

/// Merged, de-duplicated resource declarations of a protocol.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    reqs: BTreeMap<ResourceKind, BTreeSet<String>>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union a declaration into the registry; same-kind declarations merge by
    /// set union of names. Invalid shapes are rejected before any mutation.
    pub fn add(&mut self, kind: ResourceKind, names: &[&str]) -> Result<()> {
        kind.validate()?;
        self.reqs
            .entry(kind)
            .or_default()
            .extend(names.iter().map(|n| n.to_string()));
        Ok(())
    }

    /// Chainable form of [`Requirements::add`].
    pub fn require(mut self, kind: ResourceKind, names: &[&str]) -> Result<Self> {
        self.add(kind, names)?;
        Ok(self)
    }

    /// Union another registry into this one (both already validated).
    pub fn merge(&mut self, other: &Requirements) {
        for (kind, names) in &other.reqs {
            self.reqs.entry(*kind).or_default().extend(names.iter().cloned());
        }
    }

    /// Drop every bare `AgentMemory` name that is also declared as a full
    /// `Agent`: the agent's own memory absorbs it. Idempotent.
    ///
    /// Known limitation: name collisions are resolved regardless of memory
    /// width, so only one agent-memory width per colliding name is
    /// meaningful.
    pub fn consolidate(&mut self) {
        let agent_names: BTreeSet<String> = self
            .reqs
            .iter()
            .filter(|(kind, _)| matches!(kind, ResourceKind::Agent { .. }))
            .flat_map(|(_, names)| names.iter().cloned())
            .collect();

        self.reqs.retain(|kind, names| {
            if matches!(kind, ResourceKind::AgentMemory(_)) {
                names.retain(|name| !agent_names.contains(name));
                !names.is_empty()
            } else {
                true
            }
        });
    }

    /// Iterate declarations in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, &BTreeSet<String>)> {
        self.reqs.iter()
    }

    /// Flattened (kind, name) pairs in allocation order.
    pub fn entries(&self) -> Vec<(ResourceKind, String)> {
        self.reqs
            .iter()
            .flat_map(|(kind, names)| names.iter().map(move |name| (*kind, name.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reqs.is_empty()
    }

    /// Total qubit count of the declarations as they stand (consolidate
    /// first for an allocation-accurate figure).
    pub fn total_qubits(&self) -> usize {
        self.reqs
            .iter()
            .map(|(kind, names)| kind.n_qubits() * names.len())
            .sum()
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requirements:")?;
        writeln!(f, "{}", "-".repeat(30))?;
        for (kind, names) in &self.reqs {
            let names: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
            writeln!(f, "{:<18}{:?}", kind.to_string(), names)?;
        }
        Ok(())
    }
}

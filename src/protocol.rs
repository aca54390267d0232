//! Timed protocol steps and windowed replay.
//!
//! A protocol is an append-only sequence of validated steps. Each step
//! declares the resources it touches, a description, an integer time and an
//! opaque action over a `QuantumSystem`. Steps execute in ascending time
//! order with ties broken by insertion order; replay over any window leaves
//! the protocol itself untouched, so the same protocol can be re-run against
//! fresh states arbitrarily often.
//!
//! A step written against a single state composes across a whole
//! [`QuantumTree`](crate::tree::QuantumTree) through the tree's per-branch
//! combinator; a step that amounts to a measurement declares the subsystem to
//! branch along via [`ProtocolStep::with_branching`].

use std::fmt;

use log::debug;

use crate::error::Result;
use crate::quantum_system::QuantumSystem;
use crate::resources::Requirements;
use crate::tree::QuantumTree;

/// An opaque, re-runnable step action.
pub type StepAction = Box<dyn Fn(&mut QuantumSystem) -> Result<()>>;

/// One timed step of a protocol. Immutable once constructed.
pub struct ProtocolStep {
    domain: Requirements,
    descr: String,
    time: i64,
    action: StepAction,
    branch_on: Option<String>,
}

impl ProtocolStep {
    pub fn new(
        domain: Requirements,
        descr: &str,
        time: i64,
        action: impl Fn(&mut QuantumSystem) -> Result<()> + 'static,
    ) -> Self {
        Self {
            domain,
            descr: descr.to_string(),
            time,
            action: Box::new(action),
            branch_on: None,
        }
    }

    /// Declare that, when run against a tree, this step decoheres the named
    /// subsystem: after the per-branch action, the tree branches along it.
    pub fn with_branching(mut self, subsys: &str) -> Self {
        self.branch_on = Some(subsys.to_string());
        self
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn descr(&self) -> &str {
        &self.descr
    }

    pub fn domain(&self) -> &Requirements {
        &self.domain
    }

    pub fn branch_on(&self) -> Option<&str> {
        self.branch_on.as_deref()
    }
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(t:{})", self.descr, self.time)
    }
}

/// Ordered timed steps plus the union of their resource declarations.
#[derive(Default)]
pub struct Protocol {
    steps: Vec<ProtocolStep>,
    requires: Requirements,
}

impl Protocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, merging its domain into the protocol's registry.
    /// Returns the step's sequential id.
    pub fn add_step(&mut self, step: ProtocolStep) -> usize {
        let id = self.steps.len();
        self.requires.merge(step.domain());
        debug!("step {id} added: {step}");
        self.steps.push(step);
        id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The union of all step domains.
    pub fn requirements(&self) -> &Requirements {
        &self.requires
    }

    /// The multiset of scheduled times, in insertion order.
    pub fn get_times(&self) -> Vec<i64> {
        self.steps.iter().map(|s| s.time).collect()
    }

    /// Step indices in execution order: ascending time, ties by insertion.
    fn schedule(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.steps.len()).collect();
        order.sort_by_key(|&i| self.steps[i].time);
        order
    }

    /// Execute every step with time in `[t_start, t_end]` against a single
    /// state. Steps outside the window are skipped, not queued.
    pub fn run(&self, qsys: &mut QuantumSystem, t_start: i64, t_end: i64) -> Result<()> {
        for i in self.schedule() {
            let step = &self.steps[i];
            if step.time < t_start || step.time > t_end {
                continue;
            }
            debug!("step {i}: {step}");
            (step.action)(qsys)?;
        }
        Ok(())
    }

    /// Execute the window against every live branch of a tree, branching
    /// where steps declare it.
    pub fn run_tree(&self, tree: &mut QuantumTree, t_start: i64, t_end: i64) -> Result<()> {
        for i in self.schedule() {
            let step = &self.steps[i];
            if step.time < t_start || step.time > t_end {
                continue;
            }
            debug!("step {i} (tree, {} branches): {step}", tree.len());
            tree.apply(|branch| (step.action)(branch), step.branch_on())?;
        }
        Ok(())
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, step) in self.steps.iter().enumerate() {
            writeln!(f, "Step {id}: {step}")?;
        }
        writeln!(f)?;
        write!(f, "{}", self.requires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;

    fn flip_step(name: &'static str, time: i64) -> ProtocolStep {
        let domain = Requirements::new()
            .require(ResourceKind::Qubit, &[name])
            .unwrap();
        ProtocolStep::new(domain, &format!("flip {name}"), time, move |qsys| {
            qsys.prepare_state(name, 1)
        })
    }

    #[test]
    fn test_steps_merge_requirements() {
        let mut protocol = Protocol::new();
        assert_eq!(protocol.add_step(flip_step("a", 0)), 0);
        assert_eq!(protocol.add_step(flip_step("b", 1)), 1);
        assert_eq!(protocol.requirements().entries().len(), 2);
        assert_eq!(protocol.get_times(), vec![0, 1]);
    }

    #[test]
    fn test_window_skips_steps_outside() {
        let mut protocol = Protocol::new();
        protocol.add_step(flip_step("a", 0));
        protocol.add_step(flip_step("b", 5));
        let mut qsys = QuantumSystem::new(protocol.requirements()).unwrap();
        protocol.run(&mut qsys, 0, 4).unwrap();
        assert_eq!(qsys.readout("a").unwrap(), 1);
        assert_eq!(qsys.readout("b").unwrap(), 0, "step at t=5 is outside the window");
    }

    #[test]
    fn test_steps_run_in_time_order() {
        // Insertion order deliberately disagrees with time order: the t=1
        // step observes "a" after the t=0 step flipped it.
        let domain = Requirements::new()
            .require(ResourceKind::Qubit, &["a"])
            .unwrap()
            .require(ResourceKind::AgentMemory(1), &["M"])
            .unwrap();
        let mut protocol = Protocol::new();
        protocol.add_step(ProtocolStep::new(domain.clone(), "observe a", 1, |qsys| {
            qsys.observe("M_memory", "a", false)
        }));
        protocol.add_step(flip_step("a", 0));
        let mut qsys = QuantumSystem::new(protocol.requirements()).unwrap();
        protocol.run(&mut qsys, i64::MIN, i64::MAX).unwrap();
        assert_eq!(qsys.readout("M_memory").unwrap(), 1);
    }

    #[test]
    fn test_replay_is_reentrant() {
        let mut protocol = Protocol::new();
        protocol.add_step(flip_step("a", 0));
        for _ in 0..3 {
            let mut qsys = QuantumSystem::new(protocol.requirements()).unwrap();
            protocol.run(&mut qsys, 0, 10).unwrap();
            assert_eq!(qsys.readout("a").unwrap(), 1);
        }
        assert_eq!(protocol.len(), 1, "replay must not mutate the protocol");
    }
}

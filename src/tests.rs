//! End-to-end thought-experiment scenarios: full protocols run through both
//! inference strategies, agent reasoning, and the branching engine.

use std::collections::BTreeMap;

use crate::prelude::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A qubit `s` put into an even superposition at t=0, then recorded into the
/// one-qubit memory of `alice` at t=1. The preparation step decoheres `s` when run
/// against a tree.
fn measurement_protocol() -> Result<Protocol> {
    let mut protocol = Protocol::new();
    protocol.add_step(
        ProtocolStep::new(
            Requirements::new().require(ResourceKind::Qubit, &["s"])?,
            "prepare s in even superposition",
            0,
            |q| q.apply_unitary("s", &hadamard()),
        )
        .with_branching("s"),
    );
    protocol.add_step(ProtocolStep::new(
        Requirements::new()
            .require(ResourceKind::Qubit, &["s"])?
            .require(ResourceKind::AgentMemory(1), &["alice"])?,
        "alice observes s",
        1,
        |q| q.observe("alice_memory", "s", false),
    ));
    Ok(protocol)
}

/// Two-stage measurement chain: `s` is recorded into alice's memory at t=1
/// and alice's memory into bob's at t=2.
fn chain_protocol() -> Result<Protocol> {
    let mut protocol = Protocol::new();
    protocol.add_step(ProtocolStep::new(
        Requirements::new().require(ResourceKind::Qubit, &["s"])?,
        "prepare s in even superposition",
        0,
        |q| q.apply_unitary("s", &hadamard()),
    ));
    protocol.add_step(ProtocolStep::new(
        Requirements::new()
            .require(ResourceKind::Qubit, &["s"])?
            .require(ResourceKind::AgentMemory(1), &["alice"])?,
        "alice observes s",
        1,
        |q| q.observe("alice_memory", "s", false),
    ));
    protocol.add_step(ProtocolStep::new(
        Requirements::new().require(ResourceKind::AgentMemory(1), &["alice", "bob"])?,
        "bob observes alice",
        2,
        |q| q.observe("bob_memory", "alice_memory", false),
    ));
    Ok(protocol)
}

#[test]
fn test_forward_inference_tracks_measurement() -> Result<()> {
    init_logging();
    let protocol = measurement_protocol()?;

    let table = forward_inference(&protocol, "s", 0, "alice_memory", 1)?;
    assert_eq!(table.input(), ("s", 0));
    assert_eq!(table.output(), ("alice_memory", 1));
    assert_eq!(table.outputs_for(0), &[0], "memory must mirror s = 0");
    assert_eq!(table.outputs_for(1), &[1], "memory must mirror s = 1");
    Ok(())
}

#[test]
fn test_inference_strategies_agree() -> Result<()> {
    init_logging();
    let protocol = measurement_protocol()?;

    let direct = forward_inference(&protocol, "s", 0, "alice_memory", 1)?;
    let tree = forward_inference_tree(&protocol, "s", 0, "alice_memory", 1)?;
    assert_eq!(
        direct.table(),
        tree.table(),
        "direct and tree strategies must produce the same mapping"
    );
    Ok(())
}

#[test]
fn test_backward_inference_inverts_forward() -> Result<()> {
    init_logging();
    let protocol = measurement_protocol()?;

    let backward = backward_inference(&protocol, "s", 0, "alice_memory", 1)?;
    assert_eq!(backward.input(), ("alice_memory", 1));
    assert_eq!(backward.output(), ("s", 0));
    assert_eq!(backward.outputs_for(0), &[0]);
    assert_eq!(backward.outputs_for(1), &[1]);
    Ok(())
}

#[test]
fn test_consistency_matches_end_to_end_inference() -> Result<()> {
    init_logging();
    let protocol = chain_protocol()?;

    let first = forward_inference(&protocol, "s", 0, "alice_memory", 1)?;
    let second = forward_inference(&protocol, "alice_memory", 1, "bob_memory", 2)?;
    let composed = consistency(&first, &second)?;

    let end_to_end = forward_inference(&protocol, "s", 0, "bob_memory", 2)?;
    assert_eq!(composed.input(), ("s", 0));
    assert_eq!(composed.output(), ("bob_memory", 2));
    assert_eq!(
        composed.table(),
        end_to_end.table(),
        "chaining stage tables must match direct end-to-end inference"
    );
    Ok(())
}

#[test]
fn test_agent_inference_and_reversal() -> Result<()> {
    init_logging();
    let reqs = Requirements::new().require(
        ResourceKind::Agent {
            n_memory: 1,
            n_pred: 1,
        },
        &["alice"],
    )?;
    let mut qsys = QuantumSystem::new(&reqs)?;

    let identity = InferenceTable::new(
        "alice_memory",
        0,
        "alice_prediction",
        1,
        BTreeMap::from([(0, vec![0]), (1, vec![1])]),
    );
    qsys.set_inference_table("alice", &identity)?;
    qsys.prepare_state("alice_memory", 1)?;
    qsys.prep_inference("alice")?;

    qsys.make_inference("alice", false)?;
    assert_eq!(
        qsys.agent_readout("alice")?,
        (1, 1),
        "memory 1 must produce prediction 1 under the identity table"
    );

    qsys.make_inference("alice", true)?;
    assert_eq!(
        qsys.agent_readout("alice")?,
        (1, 0),
        "reversed inference must restore the empty prediction"
    );
    Ok(())
}

#[test]
fn test_observe_then_reverse_is_identity() -> Result<()> {
    init_logging();
    let reqs = Requirements::new()
        .require(ResourceKind::Qubit, &["s"])?
        .require(ResourceKind::AgentMemory(1), &["alice"])?;
    let mut qsys = QuantumSystem::new(&reqs)?;
    qsys.apply_unitary("s", &hadamard())?;

    let before = qsys.wavefunction();
    qsys.observe("alice_memory", "s", false)?;
    qsys.observe("alice_memory", "s", true)?;
    let after = qsys.wavefunction();

    for (label, amp) in &before {
        assert!(
            (amp - after[label]).norm() < 1e-12,
            "amplitude of |{}> changed under observe + reverse",
            label
        );
    }
    Ok(())
}

#[test]
fn test_branch_probabilities_partition_unity() -> Result<()> {
    init_logging();
    let reqs = Requirements::new().require(ResourceKind::Qubit, &["s"])?;
    let mut tree = QuantumTree::new(QuantumSystem::new(&reqs)?);

    tree.apply(|q| q.apply_unitary("s", &hadamard()), Some("s"))?;
    assert_eq!(tree.len(), 2, "even superposition must split into 2 branches");

    let total: f64 = tree.probabilities().iter().sum();
    assert!(
        (total - 1.0).abs() < 1e-6,
        "branch probabilities must sum to 1, got {}",
        total
    );
    assert!((tree.probability(0) - 0.5).abs() < 1e-6);
    assert!((tree.probability(1) - 0.5).abs() < 1e-6);
    assert_eq!(tree.readout(0, "s")?, 0, "branches in ascending outcome order");
    assert_eq!(tree.readout(1, "s")?, 1);
    Ok(())
}

#[test]
fn test_inference_rejects_times_outside_protocol() -> Result<()> {
    init_logging();
    let protocol = measurement_protocol()?;

    let err = forward_inference(&protocol, "s", 0, "alice_memory", 5).unwrap_err();
    assert!(
        matches!(err, Error::TimeNotInProtocol { .. }),
        "expected TimeNotInProtocol, got {:?}",
        err
    );
    Ok(())
}

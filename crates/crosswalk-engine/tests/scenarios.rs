//! End-to-end coverage, conflict and escalation scenarios

use crosswalk_common::{ControlId, CrosswalkError, FrameworkId};
use crosswalk_engine::{CrosswalkEngine, EngineConfig};
use crosswalk_graph::{
    AssessmentPhase, Basis, Control, ControlState, Disposition, EvidenceSubmission,
    FrameworkDefinition, GraphStore, Mapping, RelationshipKind,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn fw(id: &str) -> FrameworkId {
    FrameworkId::new(id).unwrap()
}

fn cid(s: &str) -> ControlId {
    ControlId::new(s).unwrap()
}

fn evidence(id: &str, confidence: f64) -> EvidenceSubmission {
    EvidenceSubmission::new(id, "policy-manual.pdf", confidence).unwrap()
}

/// X{C1,C2}, Y{D1}, Z{E1}, W{M1}
///
/// C1 ─equivalent 0.9─▶ D1
/// C2 ─conflicting────▶ E1
fn store() -> GraphStore {
    let store = GraphStore::new();
    for (f, codes) in [
        ("x", vec!["C1", "C2"]),
        ("y", vec!["D1", "D2"]),
        ("z", vec!["E1"]),
        ("w", vec!["M1"]),
    ] {
        store.put_framework(FrameworkDefinition::new(f, f, "1").unwrap()).unwrap();
        for code in codes {
            store.put_control(Control::new(&fw(f), code, code, "test", 1.0).unwrap()).unwrap();
        }
        store.publish_framework(&fw(f)).unwrap();
    }
    map(&store, "c1-d1", "x/C1", "y/D1", RelationshipKind::Equivalent, 0.9);
    map(&store, "c2-e1", "x/C2", "z/E1", RelationshipKind::Conflicting, 1.0);
    store
}

fn map(
    store: &GraphStore,
    id: &str,
    from: &str,
    to: &str,
    kind: RelationshipKind,
    confidence: f64,
) {
    let mapping = Mapping::new(id, &cid(from), &cid(to), kind, confidence).unwrap();
    store.put_mapping(mapping).unwrap();
}

fn engine_with(store: GraphStore, config: EngineConfig) -> CrosswalkEngine {
    CrosswalkEngine::new(Arc::new(store), config).unwrap()
}

fn engine() -> CrosswalkEngine {
    engine_with(store(), EngineConfig::default())
}

#[test]
fn test_scenario_a_inferred_auto_accept() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.95)).unwrap();

    let outcome = session.finalize().unwrap();
    let d1 = &outcome.verdicts[&cid("y/D1")];
    assert_eq!(d1.basis, Basis::Inferred);
    assert!((d1.confidence.value() - 0.855).abs() < 1e-9);
    assert_eq!(d1.state, ControlState::Implemented);
    assert_eq!(d1.disposition, Disposition::AutoAccept);

    let provenance = d1.provenance.as_ref().unwrap();
    assert_eq!(provenance.seed, cid("x/C1"));
    assert_eq!(provenance.hops.len(), 1);
    assert_eq!(provenance.hops[0].mapping.as_str(), "c1-d1");

    let c1 = &outcome.verdicts[&cid("x/C1")];
    assert_eq!(c1.basis, Basis::Direct);
    assert_eq!(c1.confidence.value(), 0.95);
    assert!(outcome.escalations.is_empty());

    let y = outcome.coverage_for(&fw("y")).unwrap();
    assert!((y.coverage_percent - 50.0).abs() < 1e-9);
}

#[test]
fn test_scenario_b_conflicting_edge() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x"), fw("z")]).unwrap();
    session.submit(&cid("x/C2"), evidence("ev-1", 0.9)).unwrap();
    session.submit(&cid("z/E1"), evidence("ev-2", 0.9)).unwrap();

    let outcome = session.finalize().unwrap();
    assert_eq!(outcome.conflicts.len(), 1);
    let finding = &outcome.conflicts[0];
    assert_eq!(finding.controls, [cid("x/C2"), cid("z/E1")].into_iter().collect());
    assert_eq!(finding.rule.as_str(), "builtin.conflicting-mapping");
    assert!(!finding.inferred);
}

#[test]
fn test_scenario_c_below_floor_is_gap_not_escalation() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.4)).unwrap();

    let outcome = session.finalize().unwrap();
    let c1 = &outcome.verdicts[&cid("x/C1")];
    assert_eq!(c1.state, ControlState::Gap);
    assert_eq!(c1.disposition, Disposition::Gap);
    assert!(outcome.escalations.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_d_concurrent_same_control() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x")]).unwrap();

    let a = {
        let session = session.clone();
        tokio::task::spawn_blocking(move || session.submit(&cid("x/C1"), evidence("ev-a", 0.6)))
    };
    let b = {
        let session = session.clone();
        tokio::task::spawn_blocking(move || session.submit(&cid("x/C1"), evidence("ev-b", 0.7)))
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let status = session.control_status(&cid("x/C1")).unwrap();
    assert_eq!(status.history.len(), 2);
    // Combination of both, not the last writer
    assert!((status.confidence.value() - 0.88).abs() < 1e-9);
}

#[test]
fn test_finalize_is_idempotent() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x"), fw("y"), fw("z")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.7)).unwrap();
    session.submit(&cid("x/C2"), evidence("ev-2", 0.9)).unwrap();
    session.submit(&cid("z/E1"), evidence("ev-3", 0.9)).unwrap();

    let first = session.finalize().unwrap();
    let second = session.finalize().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.to_canonical_json().unwrap(), second.to_canonical_json().unwrap());
    let reread = engine.session(session.id()).unwrap().outcome().unwrap();
    assert_eq!(first.fingerprint().unwrap(), reread.fingerprint().unwrap());
}

#[test]
fn test_conflicting_edges_never_carry_coverage() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x"), fw("z")]).unwrap();
    session.submit(&cid("x/C2"), evidence("ev-1", 1.0)).unwrap();

    let outcome = session.finalize().unwrap();
    let e1 = &outcome.verdicts[&cid("z/E1")];
    assert_eq!(e1.basis, Basis::None);
    assert_eq!(e1.derived_confidence.value(), 0.0);
    assert!(outcome.conflicts.is_empty());
}

#[test]
fn test_two_hop_path_decays() {
    let store = store();
    map(&store, "c1-m1", "x/C1", "w/M1", RelationshipKind::Equivalent, 0.9);
    map(&store, "m1-d2", "w/M1", "y/D2", RelationshipKind::Equivalent, 0.9);
    let engine = engine_with(store, EngineConfig::default());
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.95)).unwrap();

    let outcome = session.finalize().unwrap();
    let one_hop = &outcome.verdicts[&cid("y/D1")];
    let two_hop = &outcome.verdicts[&cid("y/D2")];
    assert!(two_hop.confidence <= one_hop.confidence);
    assert_eq!(two_hop.provenance.as_ref().unwrap().hops.len(), 2);

    // 0.95 × 0.9 × 0.9 = 0.7695: implemented by threshold but below the ceiling
    assert_eq!(two_hop.disposition, Disposition::Escalate);
    let item = outcome
        .escalations
        .iter()
        .find(|e| e.subject.control() == &cid("y/D2"))
        .unwrap();
    assert_eq!(item.reason, crosswalk_graph::ReasonCode::TransitiveInference);
    assert_eq!(item.reviewer_role, "lead-auditor");
}

#[test]
fn test_conflict_through_intermediate_framework() {
    // W is not assessed; M1 is only reached by inference from C1
    let store = store();
    map(&store, "c1-m1", "x/C1", "w/M1", RelationshipKind::Equivalent, 0.95);
    map(&store, "m1-d1", "w/M1", "y/D1", RelationshipKind::Conflicting, 1.0);
    let engine = engine_with(store, EngineConfig::default());
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.99)).unwrap();
    session.submit(&cid("y/D1"), evidence("ev-2", 0.99)).unwrap();

    let outcome = session.finalize().unwrap();
    assert_eq!(outcome.conflicts.len(), 1);
    let finding = &outcome.conflicts[0];
    assert_eq!(finding.controls, [cid("w/M1"), cid("y/D1")].into_iter().collect());
    assert_eq!(finding.rule.as_str(), "builtin.conflicting-mapping");
    assert!(finding.inferred);

    // The intermediate control is not part of the assessment's results
    assert!(!outcome.verdicts.contains_key(&cid("w/M1")));
    assert!(outcome.coverage_for(&fw("w")).is_none());
    assert!(outcome.escalations.iter().all(|e| e.subject.control() != &cid("w/M1")));
    assert_eq!(outcome.coverage_for(&fw("y")).unwrap().coverage_percent, 50.0);
}

#[test]
fn test_weak_intermediate_inference_raises_no_conflict() {
    let store = store();
    map(&store, "c1-m1", "x/C1", "w/M1", RelationshipKind::Equivalent, 0.95);
    map(&store, "m1-d1", "w/M1", "y/D1", RelationshipKind::Conflicting, 1.0);
    let mut config = EngineConfig::default();
    config.resolver.max_hops = 1;
    // M1 is one hop out, so a single-hop bound still reaches it
    let engine = engine_with(store, config);
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.99)).unwrap();
    session.submit(&cid("y/D1"), evidence("ev-2", 0.99)).unwrap();
    assert_eq!(session.finalize().unwrap().conflicts.len(), 1);

    // A weak seed leaves the intermediate control below the review floor
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.45)).unwrap();
    session.submit(&cid("y/D1"), evidence("ev-2", 0.99)).unwrap();
    assert!(session.finalize().unwrap().conflicts.is_empty());
}

#[test]
fn test_conflict_with_inferred_end_is_flagged() {
    let store = store();
    map(&store, "d1-e1", "y/D1", "z/E1", RelationshipKind::Conflicting, 1.0);
    let engine = engine_with(store, EngineConfig::default());
    let session = engine.create_assessment(&[fw("x"), fw("y"), fw("z")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.95)).unwrap();
    session.submit(&cid("z/E1"), evidence("ev-2", 0.9)).unwrap();

    let outcome = session.finalize().unwrap();
    // D1 has no evidence of its own
    assert_eq!(outcome.verdicts[&cid("y/D1")].basis, Basis::Inferred);
    assert_eq!(outcome.verdicts[&cid("z/E1")].basis, Basis::Direct);

    assert_eq!(outcome.conflicts.len(), 1);
    let finding = &outcome.conflicts[0];
    assert_eq!(finding.controls, [cid("y/D1"), cid("z/E1")].into_iter().collect());
    assert!(finding.inferred);
}

/// Two frameworks of `size` controls, chained by equivalent and subset edges
fn wide_engine(size: usize) -> CrosswalkEngine {
    let store = GraphStore::new();
    for f in ["a", "b"] {
        store.put_framework(FrameworkDefinition::new(f, f, "1").unwrap()).unwrap();
        for i in 0..size {
            let code = format!("C{}", i);
            store.put_control(Control::new(&fw(f), &code, &code, "test", 1.0).unwrap()).unwrap();
        }
        store.publish_framework(&fw(f)).unwrap();
    }
    for i in 0..size {
        let from = format!("a/C{}", i);
        let (to, next) = (format!("b/C{}", i), format!("b/C{}", (i + 1) % size));
        map(&store, &format!("eq-{}", i), &from, &to, RelationshipKind::Equivalent, 0.9);
        map(&store, &format!("sub-{}", i), &from, &next, RelationshipKind::Subset, 0.8);
    }
    engine_with(store, EngineConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_during_finalize_keeps_nothing() {
    let engine = wide_engine(300);
    let mut cancelled_rounds = 0;

    for round in 0..20 {
        let session = engine.create_assessment(&[fw("a"), fw("b")]).unwrap();
        for i in 0..300 {
            // Below the ceiling so every control escalates when finalized
            let id = format!("ev-{}-{}", round, i);
            session.submit(&cid(&format!("a/C{}", i)), evidence(&id, 0.7)).unwrap();
        }

        let done = Arc::new(AtomicBool::new(false));
        let canceller = {
            let (session, done) = (session.clone(), done.clone());
            tokio::task::spawn_blocking(move || {
                while !done.load(Ordering::Acquire) {
                    if session.cancel_finalize() {
                        return true;
                    }
                    std::hint::spin_loop();
                }
                false
            })
        };
        let finalizer = {
            let (session, done) = (session.clone(), done.clone());
            tokio::task::spawn_blocking(move || {
                let result = session.finalize();
                done.store(true, Ordering::Release);
                result
            })
        };

        let result = finalizer.await.unwrap();
        let acknowledged = canceller.await.unwrap();
        if acknowledged {
            cancelled_rounds += 1;
            assert!(matches!(result, Err(CrosswalkError::Cancelled(_))), "round {}", round);
            assert_eq!(session.phase().unwrap(), AssessmentPhase::Open);
            assert!(session.outcome().is_err());
            assert!(session.escalations().is_err());
            assert!(session.review_states().is_err());

            // Nothing from the cancelled pass leaks into the next one
            let outcome = session.finalize().unwrap();
            assert_eq!(outcome.escalations.len(), 600);
        } else {
            assert_eq!(result.unwrap().escalations.len(), 600);
        }
    }
    assert!(cancelled_rounds > 0);
}

#[test]
fn test_inference_is_rejected_with_full_automation() {
    let mut config = EngineConfig::default();
    config.escalation.auto_accept_ceiling = 1.0;
    let engine = engine_with(store(), config);
    let session = engine.create_assessment(&[fw("x"), fw("y")]).unwrap();
    session.submit(&cid("x/C1"), evidence("ev-1", 0.95)).unwrap();

    assert!(matches!(session.finalize(), Err(CrosswalkError::Config(_))));
    assert_eq!(session.phase().unwrap(), AssessmentPhase::Open);

    // Without a second framework there is nothing to infer
    let direct_only = engine.create_assessment(&[fw("x")]).unwrap();
    direct_only.submit(&cid("x/C1"), evidence("ev-1", 0.95)).unwrap();
    assert!(direct_only.finalize().is_ok());
}

#[test]
fn test_partial_claims_do_not_count_as_coverage() {
    let engine = engine();
    let session = engine.create_assessment(&[fw("x")]).unwrap();
    session
        .submit(
            &cid("x/C1"),
            evidence("ev-1", 0.95).claiming(crosswalk_graph::EvidenceClaim::Partial),
        )
        .unwrap();
    let outcome = session.finalize().unwrap();
    assert_eq!(outcome.verdicts[&cid("x/C1")].state, ControlState::Partial);
    assert_eq!(outcome.coverage_for(&fw("x")).unwrap().coverage_percent, 0.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_more_evidence_never_lowers_coverage(base in 0.0f64..=1.0, extra in 0.0f64..=1.0) {
        let engine = engine();
        let frameworks = [fw("x"), fw("y")];

        let before = engine.create_assessment(&frameworks).unwrap();
        before.submit(&cid("x/C1"), evidence("ev-1", base)).unwrap();
        let before = before.finalize().unwrap();

        let after = engine.create_assessment(&frameworks).unwrap();
        after.submit(&cid("x/C1"), evidence("ev-1", base)).unwrap();
        after.submit(&cid("x/C1"), evidence("ev-2", extra)).unwrap();
        let after = after.finalize().unwrap();

        let c = cid("x/C1");
        prop_assert!(after.verdicts[&c].confidence >= before.verdicts[&c].confidence);
        for f in &frameworks {
            prop_assert!(
                after.coverage_for(f).unwrap().coverage_percent
                    >= before.coverage_for(f).unwrap().coverage_percent
            );
        }
    }
}

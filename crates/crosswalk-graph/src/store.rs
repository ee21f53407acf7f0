//! Graph Store
//!
//! Reference data (frameworks, controls, mappings, rules) is an immutable
//! `KnowledgeGraph` behind an `ArcSwap`: readers load the current snapshot
//! lock-free, curation builds a modified copy under a writer mutex and swaps
//! it in whole.
//!
//! Mutable per-assessment state is keyed by assessment id and never shares
//! locks across assessments:
//!
//! ```text
//!   assessments: DashMap<AssessmentId, Arc<AssessmentRecord>>
//!                                         │
//!            ┌────────────────────────────┼──────────────────────────┐
//!            ▼                            ▼                          ▼
//!   gate: RwLock<PhaseState>   statuses: ControlId → Mutex   reviews: Mutex
//!   (read: evidence writers     (one lock per control;       (escalation
//!    write: phase changes)       same-key writes serialize)   workflow)
//! ```
//!
//! Evidence writers hold the gate for reading while they update a single
//! control, so writes to different controls run in parallel. A finalize
//! takes the gate for writing, which waits for in-flight writers, flips the
//! phase to `computing`, and copies every status: the pass sees one
//! consistent view and later writers are turned away.

use crate::assessment::*;
use crate::catalog::CatalogBundle;
use crate::knowledge::KnowledgeGraph;
use crate::model::*;
use crate::outcome::{AssessmentOutcome, Resolution, ReviewState};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use crosswalk_common::{
    AssessmentId, ControlId, CrosswalkError, CrosswalkResult, EscalationId, FrameworkId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct PhaseState {
    phase: AssessmentPhase,
    outcome: Option<Arc<AssessmentOutcome>>,
}

#[derive(Debug)]
struct AssessmentRecord {
    id: AssessmentId,
    frameworks: Vec<FrameworkId>,
    created_at: DateTime<Utc>,
    gate: RwLock<PhaseState>,
    statuses: BTreeMap<ControlId, Mutex<ControlStatus>>,
    reviews: Mutex<BTreeMap<EscalationId, ReviewState>>,
}

impl AssessmentRecord {
    fn status_slot(&self, control: &ControlId) -> CrosswalkResult<&Mutex<ControlStatus>> {
        self.statuses.get(control).ok_or_else(|| {
            CrosswalkError::NotFound(format!("control {} in assessment {}", control, self.id))
        })
    }
}

/// Consistent copy of an assessment taken at the start of a finalize
#[derive(Debug, Clone)]
pub struct AssessmentSnapshot {
    pub assessment: AssessmentId,
    pub frameworks: Vec<FrameworkId>,
    pub created_at: DateTime<Utc>,
    pub knowledge: Arc<KnowledgeGraph>,
    pub statuses: BTreeMap<ControlId, ControlStatus>,
}

/// Result of asking to start a finalize
#[derive(Debug, Clone)]
pub enum FinalizeStart {
    /// Phase moved to `computing`; run the passes over this snapshot
    Snapshot(AssessmentSnapshot),
    /// Already finalized; here is the frozen result
    AlreadyFinalized(Arc<AssessmentOutcome>),
}

/// Result of an evidence upsert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub outcome: RecordOutcome,
    pub status: ControlStatus,
}

/// Controls of one framework, in curated order
///
/// Holds the snapshot it was read from, so it can be iterated any number of
/// times and always yields the same sequence.
#[derive(Debug, Clone)]
pub struct FrameworkControls {
    knowledge: Arc<KnowledgeGraph>,
    framework: FrameworkId,
}

impl FrameworkControls {
    /// Iterate controls
    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.knowledge
            .framework(&self.framework)
            .into_iter()
            .flat_map(|fw| fw.controls.iter())
            .filter_map(|id| self.knowledge.control(id))
    }

    /// Number of controls
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Summary of a bulk catalog load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub frameworks: usize,
    pub controls: usize,
    pub mappings: usize,
    pub rules: usize,
    pub knowledge_version: u64,
}

/// Graph store
pub struct GraphStore {
    knowledge: ArcSwap<KnowledgeGraph>,
    curation: Mutex<()>,
    assessments: DashMap<AssessmentId, Arc<AssessmentRecord>>,
}

impl GraphStore {
    /// Create empty store
    pub fn new() -> Self {
        Self {
            knowledge: ArcSwap::from_pointee(KnowledgeGraph::new()),
            curation: Mutex::new(()),
            assessments: DashMap::new(),
        }
    }

    /// Create store preloaded with a catalog bundle
    pub fn with_bundle(bundle: CatalogBundle) -> CrosswalkResult<Self> {
        let store = Self::new();
        store.load_bundle(bundle)?;
        Ok(store)
    }

    // === Reference data ===

    /// Current reference-data snapshot
    #[inline]
    pub fn knowledge(&self) -> Arc<KnowledgeGraph> {
        self.knowledge.load_full()
    }

    /// Current reference-data version
    pub fn knowledge_version(&self) -> u64 {
        self.knowledge.load().version()
    }

    /// Apply a curation edit to a private copy and swap it in if it changed
    fn curate<F>(&self, edit: F) -> CrosswalkResult<bool>
    where
        F: FnOnce(&mut KnowledgeGraph) -> CrosswalkResult<bool>,
    {
        let _writer = self.curation.lock();
        let mut next = KnowledgeGraph::clone(&self.knowledge.load());
        let changed = edit(&mut next)?;
        if changed {
            next.bump_version();
            tracing::debug!(version = next.version(), "reference data updated");
            self.knowledge.store(Arc::new(next));
        }
        Ok(changed)
    }

    /// Upsert a framework definition
    pub fn put_framework(&self, def: FrameworkDefinition) -> CrosswalkResult<()> {
        self.curate(|g| g.put_framework(def)).map(|_| ())
    }

    /// Seal a framework so its control list can no longer change
    pub fn publish_framework(&self, id: &FrameworkId) -> CrosswalkResult<()> {
        let changed = self.curate(|g| g.publish_framework(id))?;
        if changed {
            tracing::info!(framework = %id, "framework published");
        }
        Ok(())
    }

    /// Upsert a control
    pub fn put_control(&self, control: Control) -> CrosswalkResult<()> {
        self.curate(|g| g.put_control(control)).map(|_| ())
    }

    /// Upsert a mapping; fails if either endpoint is unknown
    pub fn put_mapping(&self, mapping: Mapping) -> CrosswalkResult<()> {
        self.curate(|g| g.put_mapping(mapping)).map(|_| ())
    }

    /// Upsert a conflict rule
    pub fn put_conflict_rule(&self, rule: ConflictRule) -> CrosswalkResult<()> {
        self.curate(|g| g.put_conflict_rule(rule)).map(|_| ())
    }

    /// Apply a whole bundle, all-or-nothing, publishing its frameworks
    pub fn load_bundle(&self, bundle: CatalogBundle) -> CrosswalkResult<BundleSummary> {
        let mut summary = BundleSummary {
            frameworks: bundle.frameworks.len(),
            controls: bundle.controls.len(),
            mappings: bundle.mappings.len(),
            rules: bundle.rules.len(),
            knowledge_version: 0,
        };
        self.curate(|g| {
            let ids: Vec<_> = bundle.frameworks.iter().map(|f| f.id.clone()).collect();
            for def in bundle.frameworks {
                g.put_framework(def)?;
            }
            for control in bundle.controls {
                g.put_control(control)?;
            }
            for id in &ids {
                g.publish_framework(id)?;
            }
            for mapping in bundle.mappings {
                g.put_mapping(mapping)?;
            }
            for rule in bundle.rules {
                g.put_conflict_rule(rule)?;
            }
            Ok(true)
        })?;
        summary.knowledge_version = self.knowledge_version();
        tracing::info!(
            frameworks = summary.frameworks,
            controls = summary.controls,
            mappings = summary.mappings,
            rules = summary.rules,
            version = summary.knowledge_version,
            "catalog bundle loaded"
        );
        Ok(summary)
    }

    /// Controls of a framework
    pub fn controls_for(&self, framework: &FrameworkId) -> CrosswalkResult<FrameworkControls> {
        let knowledge = self.knowledge();
        if knowledge.framework(framework).is_none() {
            return Err(CrosswalkError::not_found("framework", framework));
        }
        Ok(FrameworkControls {
            knowledge,
            framework: framework.clone(),
        })
    }

    /// Outbound mapping edges of a control
    pub fn mappings_from(&self, control: &ControlId) -> CrosswalkResult<Vec<MappingEdge>> {
        let knowledge = self.knowledge.load();
        Ok(knowledge.edges_from(control)?.into_iter().cloned().collect())
    }

    /// Inbound mapping edges of a control
    pub fn mappings_to(&self, control: &ControlId) -> CrosswalkResult<Vec<MappingEdge>> {
        let knowledge = self.knowledge.load();
        Ok(knowledge.edges_to(control)?.into_iter().cloned().collect())
    }

    // === Assessments ===

    fn record(&self, id: &AssessmentId) -> CrosswalkResult<Arc<AssessmentRecord>> {
        self.assessments
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| CrosswalkError::not_found("assessment", id))
    }

    /// Create an assessment over published frameworks
    pub fn create_assessment(&self, frameworks: &[FrameworkId]) -> CrosswalkResult<AssessmentId> {
        if frameworks.is_empty() {
            return Err(CrosswalkError::validation("assessment needs at least one framework"));
        }
        let mut targets = frameworks.to_vec();
        targets.sort();
        targets.dedup();
        if targets.len() != frameworks.len() {
            return Err(CrosswalkError::validation("assessment lists a framework twice"));
        }

        let knowledge = self.knowledge();
        let id = AssessmentId::generate();
        let mut statuses = BTreeMap::new();
        for fw_id in frameworks {
            let fw = knowledge
                .framework(fw_id)
                .ok_or_else(|| CrosswalkError::not_found("framework", fw_id))?;
            if !fw.published {
                return Err(CrosswalkError::validation(format!(
                    "framework {} is not published",
                    fw_id
                )));
            }
            for control in &fw.controls {
                statuses.insert(
                    control.clone(),
                    Mutex::new(ControlStatus::not_assessed(&id, control, fw_id)),
                );
            }
        }

        let record = AssessmentRecord {
            id: id.clone(),
            frameworks: frameworks.to_vec(),
            created_at: Utc::now(),
            gate: RwLock::new(PhaseState {
                phase: AssessmentPhase::Open,
                outcome: None,
            }),
            statuses,
            reviews: Mutex::new(BTreeMap::new()),
        };
        self.assessments.insert(id.clone(), Arc::new(record));
        tracing::info!(assessment = %id, frameworks = frameworks.len(), "assessment created");
        Ok(id)
    }

    /// Frameworks an assessment covers
    pub fn assessment_frameworks(&self, id: &AssessmentId) -> CrosswalkResult<Vec<FrameworkId>> {
        Ok(self.record(id)?.frameworks.clone())
    }

    /// Current phase
    pub fn phase(&self, id: &AssessmentId) -> CrosswalkResult<AssessmentPhase> {
        Ok(self.record(id)?.gate.read().phase)
    }

    /// Record evidence for one control
    ///
    /// Same-control writes serialize on that control's lock; different
    /// controls proceed in parallel. Rejected once a finalize has started.
    pub fn upsert_control_status(
        &self,
        id: &AssessmentId,
        control: &ControlId,
        evidence: EvidenceSubmission,
    ) -> CrosswalkResult<StatusUpdate> {
        evidence.validate()?;
        let record = self.record(id)?;
        let slot = record.status_slot(control)?;

        let gate = record.gate.read();
        ensure_open(&record.id, gate.phase)?;
        let update = apply_evidence(slot, evidence);
        drop(gate);

        tracing::debug!(
            assessment = %id,
            control = %control,
            outcome = ?update.outcome,
            confidence = %update.status.confidence,
            "evidence recorded"
        );
        Ok(update)
    }

    /// Record a batch of extractor records, all-or-nothing
    ///
    /// Every affected assessment's gate is held for reading from the first
    /// check to the last write, so a finalize either sees the whole batch or
    /// none of it. Updates are returned in input order.
    pub fn upsert_batch(
        &self,
        records: Vec<ExtractedEvidence>,
    ) -> CrosswalkResult<Vec<StatusUpdate>> {
        let mut targets: BTreeMap<AssessmentId, Arc<AssessmentRecord>> = BTreeMap::new();
        for r in &records {
            r.evidence.validate()?;
            if !targets.contains_key(&r.assessment_id) {
                targets.insert(r.assessment_id.clone(), self.record(&r.assessment_id)?);
            }
        }

        // Sorted acquisition; writers only ever hold one gate
        let gates: BTreeMap<&AssessmentId, _> = targets
            .iter()
            .map(|(id, record)| (id, record.gate.read()))
            .collect();
        for (id, gate) in &gates {
            ensure_open(id, gate.phase)?;
        }
        let mut slots = Vec::with_capacity(records.len());
        for r in &records {
            let record = targets
                .get(&r.assessment_id)
                .ok_or_else(|| CrosswalkError::not_found("assessment", &r.assessment_id))?;
            slots.push(record.status_slot(&r.control_id)?);
        }

        let updates: Vec<StatusUpdate> = records
            .into_iter()
            .zip(slots)
            .map(|(r, slot)| apply_evidence(slot, r.evidence))
            .collect();
        drop(gates);

        tracing::debug!(
            records = updates.len(),
            assessments = targets.len(),
            "evidence batch recorded"
        );
        Ok(updates)
    }

    /// Current status of one control
    pub fn control_status(
        &self,
        id: &AssessmentId,
        control: &ControlId,
    ) -> CrosswalkResult<ControlStatus> {
        let record = self.record(id)?;
        let status = record.status_slot(control)?.lock().clone();
        Ok(status)
    }

    /// Current status of every control
    pub fn control_statuses(
        &self,
        id: &AssessmentId,
    ) -> CrosswalkResult<BTreeMap<ControlId, ControlStatus>> {
        let record = self.record(id)?;
        Ok(record
            .statuses
            .iter()
            .map(|(k, v)| (k.clone(), v.lock().clone()))
            .collect())
    }

    /// Start a finalize: `open → computing` plus a consistent snapshot
    pub fn begin_finalize(&self, id: &AssessmentId) -> CrosswalkResult<FinalizeStart> {
        let record = self.record(id)?;
        let mut gate = record.gate.write();
        match gate.phase {
            AssessmentPhase::Finalized => {
                let outcome = gate.outcome.clone().ok_or_else(|| {
                    CrosswalkError::state(format!("assessment {} finalized without outcome", id))
                })?;
                return Ok(FinalizeStart::AlreadyFinalized(outcome));
            }
            AssessmentPhase::Computing => {
                return Err(CrosswalkError::state(format!(
                    "assessment {} is already being finalized",
                    id
                )))
            }
            AssessmentPhase::Abandoned => {
                return Err(CrosswalkError::state(format!("assessment {} is abandoned", id)))
            }
            AssessmentPhase::Open => {}
        }

        gate.phase = AssessmentPhase::Computing;
        let statuses = record
            .statuses
            .iter()
            .map(|(k, v)| (k.clone(), v.lock().clone()))
            .collect();
        tracing::info!(assessment = %id, "finalize started");
        Ok(FinalizeStart::Snapshot(AssessmentSnapshot {
            assessment: record.id.clone(),
            frameworks: record.frameworks.clone(),
            created_at: record.created_at,
            knowledge: self.knowledge(),
            statuses,
        }))
    }

    /// Complete a finalize: `computing → finalized`, freezing the outcome
    pub fn commit_finalize(
        &self,
        id: &AssessmentId,
        outcome: AssessmentOutcome,
    ) -> CrosswalkResult<Arc<AssessmentOutcome>> {
        let record = self.record(id)?;
        let mut gate = record.gate.write();
        if gate.phase != AssessmentPhase::Computing {
            return Err(CrosswalkError::state(format!(
                "assessment {} is {}, not computing",
                id, gate.phase
            )));
        }
        let outcome = Arc::new(outcome);
        {
            let mut reviews = record.reviews.lock();
            for item in &outcome.escalations {
                reviews.insert(item.id.clone(), ReviewState::Pending);
            }
        }
        gate.phase = AssessmentPhase::Finalized;
        gate.outcome = Some(Arc::clone(&outcome));
        tracing::info!(
            assessment = %id,
            conflicts = outcome.conflicts.len(),
            escalations = outcome.escalations.len(),
            "assessment finalized"
        );
        Ok(outcome)
    }

    /// Abort a finalize: `computing → open`, nothing persisted
    pub fn reopen(&self, id: &AssessmentId) -> CrosswalkResult<()> {
        let record = self.record(id)?;
        let mut gate = record.gate.write();
        if gate.phase != AssessmentPhase::Computing {
            return Err(CrosswalkError::state(format!(
                "assessment {} is {}, not computing",
                id, gate.phase
            )));
        }
        gate.phase = AssessmentPhase::Open;
        tracing::warn!(assessment = %id, "finalize aborted; assessment reopened");
        Ok(())
    }

    /// `open → abandoned`
    pub fn abandon(&self, id: &AssessmentId) -> CrosswalkResult<()> {
        let record = self.record(id)?;
        let mut gate = record.gate.write();
        ensure_open(id, gate.phase)?;
        gate.phase = AssessmentPhase::Abandoned;
        tracing::info!(assessment = %id, "assessment abandoned");
        Ok(())
    }

    /// Frozen outcome of a finalized assessment
    pub fn outcome(&self, id: &AssessmentId) -> CrosswalkResult<Arc<AssessmentOutcome>> {
        let record = self.record(id)?;
        let gate = record.gate.read();
        match (&gate.phase, &gate.outcome) {
            (AssessmentPhase::Finalized, Some(outcome)) => Ok(Arc::clone(outcome)),
            (phase, _) => Err(CrosswalkError::state(format!(
                "assessment {} is {}; results are only readable once finalized",
                id, phase
            ))),
        }
    }

    // === Review workflow ===

    /// Review state of every escalation item
    pub fn review_states(
        &self,
        id: &AssessmentId,
    ) -> CrosswalkResult<BTreeMap<EscalationId, ReviewState>> {
        self.outcome(id)?;
        Ok(self.record(id)?.reviews.lock().clone())
    }

    /// Claim an escalation item for a reviewer
    pub fn claim_escalation(
        &self,
        id: &AssessmentId,
        escalation: &EscalationId,
        reviewer: &str,
    ) -> CrosswalkResult<ReviewState> {
        if reviewer.trim().is_empty() {
            return Err(CrosswalkError::validation("reviewer cannot be empty"));
        }
        self.outcome(id)?;
        let record = self.record(id)?;
        let mut reviews = record.reviews.lock();
        let state = reviews
            .get_mut(escalation)
            .ok_or_else(|| CrosswalkError::not_found("escalation", escalation))?;
        match &*state {
            ReviewState::Pending => {}
            ReviewState::Claimed { reviewer: current, .. } if current == reviewer => {
                return Ok(state.clone());
            }
            ReviewState::Claimed { reviewer: current, .. } => {
                return Err(CrosswalkError::state(format!(
                    "escalation {} is claimed by {}",
                    escalation, current
                )))
            }
            ReviewState::Resolved { .. } => {
                return Err(CrosswalkError::state(format!(
                    "escalation {} is already resolved",
                    escalation
                )))
            }
        }
        *state = ReviewState::Claimed {
            reviewer: reviewer.to_string(),
            claimed_at: Utc::now(),
        };
        Ok(state.clone())
    }

    /// Resolve a claimed escalation item and record the override on its
    /// control status
    pub fn resolve_escalation(
        &self,
        id: &AssessmentId,
        escalation: &EscalationId,
        reviewer: &str,
        resolution: Resolution,
    ) -> CrosswalkResult<ReviewOverride> {
        let outcome = self.outcome(id)?;
        let item = outcome
            .escalation(escalation)
            .ok_or_else(|| CrosswalkError::not_found("escalation", escalation))?;
        let record = self.record(id)?;
        let slot = record.status_slot(item.subject.control())?;

        let mut reviews = record.reviews.lock();
        let state = reviews
            .get_mut(escalation)
            .ok_or_else(|| CrosswalkError::not_found("escalation", escalation))?;
        match &*state {
            ReviewState::Claimed { reviewer: current, .. } if current == reviewer => {}
            ReviewState::Claimed { reviewer: current, .. } => {
                return Err(CrosswalkError::state(format!(
                    "escalation {} is claimed by {}",
                    escalation, current
                )))
            }
            ReviewState::Pending => {
                return Err(CrosswalkError::state(format!(
                    "escalation {} must be claimed before it is resolved",
                    escalation
                )))
            }
            ReviewState::Resolved { .. } => {
                return Err(CrosswalkError::state(format!(
                    "escalation {} is already resolved",
                    escalation
                )))
            }
        }

        let now = Utc::now();
        let (determined, confidence) = resolution.determination(item.proposed_state);
        let review_override = ReviewOverride {
            escalation: escalation.clone(),
            reviewer: reviewer.to_string(),
            state: determined,
            confidence,
            recorded_at: now,
        };
        {
            let mut status = slot.lock();
            status.review_override = Some(review_override.clone());
            status.updated_at = Some(now);
        }
        *state = ReviewState::Resolved {
            reviewer: reviewer.to_string(),
            resolution,
            resolved_at: now,
        };
        tracing::info!(
            assessment = %id,
            escalation = %escalation,
            state = ?determined,
            "escalation resolved"
        );
        Ok(review_override)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_evidence(slot: &Mutex<ControlStatus>, evidence: EvidenceSubmission) -> StatusUpdate {
    let mut status = slot.lock();
    let outcome = status.record(evidence, Utc::now());
    StatusUpdate {
        outcome,
        status: status.clone(),
    }
}

fn ensure_open(id: &AssessmentId, phase: AssessmentPhase) -> CrosswalkResult<()> {
    if phase == AssessmentPhase::Open {
        Ok(())
    } else {
        Err(CrosswalkError::state(format!(
            "assessment {} is {}; evidence is not accepted",
            id, phase
        )))
    }
}

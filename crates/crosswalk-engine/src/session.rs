//! Assessment Sessions
//!
//! `CrosswalkEngine` is the entry point: it owns the graph store and the
//! configuration and hands out `AssessmentSession` handles. A session drives
//! one assessment through its lifecycle:
//!
//! ```text
//!            finalize                passes ok
//!   open ──────────────▶ computing ─────────────▶ finalized
//!    │  ◀──────────────────┘
//!    │   pass failed / cancelled
//!    ▼
//!   abandoned
//! ```
//!
//! A finalize runs resolver, aggregation, conflict detection and escalation
//! over one snapshot. The outcome is committed only when every pass
//! succeeds; otherwise the assessment reopens and nothing is kept.

use crate::audit::{AuditEvent, AuditEventType, AuditFilter, AuditTrail, IntegrityResult};
use crate::config::EngineConfig;
use crate::conflict::ConflictDetector;
use crate::escalation::EscalationEngine;
use crate::report::AssessmentReport;
use crate::resolver::{DerivedScore, MappingResolver, Seed};
use chrono::Utc;
use crosswalk_common::{
    AssessmentId, ControlId, CrosswalkError, CrosswalkResult, EscalationId, EvidenceId, FrameworkId,
};
use crosswalk_graph::{
    AssessmentOutcome, AssessmentPhase, AssessmentSnapshot, CatalogBundle, ControlStatus,
    CoverageSummary, EvidenceSubmission, ExtractedEvidence, FinalizeStart, GraphStore,
    RecordOutcome, Resolution, ReviewOverride, ReviewState, StatusUpdate,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag for a finalize pass
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self, step: &str) -> CrosswalkResult<()> {
        if self.is_cancelled() {
            return Err(CrosswalkError::Cancelled(format!("finalize cancelled before {}", step)));
        }
        Ok(())
    }
}

struct SessionState {
    audit: AuditTrail,
    in_flight: Mutex<Option<CancelToken>>,
}

struct EngineShared {
    store: Arc<GraphStore>,
    config: EngineConfig,
    sessions: DashMap<AssessmentId, Arc<SessionState>>,
}

/// Compliance crosswalk engine
#[derive(Clone)]
pub struct CrosswalkEngine {
    shared: Arc<EngineShared>,
}

impl CrosswalkEngine {
    /// Create engine over a store
    pub fn new(store: Arc<GraphStore>, config: EngineConfig) -> CrosswalkResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(EngineShared {
                store,
                config,
                sessions: DashMap::new(),
            }),
        })
    }

    /// Create engine with the built-in catalog loaded
    pub fn with_builtin_catalog(config: EngineConfig) -> CrosswalkResult<Self> {
        let store = GraphStore::with_bundle(CatalogBundle::builtin()?)?;
        Self::new(Arc::new(store), config)
    }

    /// Graph store
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.shared.store
    }

    /// Configuration in use
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Start an assessment over the given frameworks
    pub fn create_assessment(
        &self,
        frameworks: &[FrameworkId],
    ) -> CrosswalkResult<AssessmentSession> {
        let id = self.shared.store.create_assessment(frameworks)?;
        let state = Arc::new(SessionState {
            audit: AuditTrail::new(id.clone()),
            in_flight: Mutex::new(None),
        });
        let names: Vec<_> = frameworks.iter().map(FrameworkId::as_str).collect();
        state.audit.log(
            AuditEventType::AssessmentCreated,
            "system",
            id.as_str(),
            &format!("frameworks={}", names.join(";")),
        );
        self.shared.sessions.insert(id.clone(), Arc::clone(&state));
        Ok(AssessmentSession {
            id,
            shared: Arc::clone(&self.shared),
            state,
        })
    }

    /// Handle to an existing assessment
    pub fn session(&self, id: &AssessmentId) -> CrosswalkResult<AssessmentSession> {
        let state = self
            .shared
            .sessions
            .get(id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| CrosswalkError::not_found("assessment", id))?;
        Ok(AssessmentSession {
            id: id.clone(),
            shared: Arc::clone(&self.shared),
            state,
        })
    }

    /// Route one extractor record to its assessment
    pub fn ingest(&self, record: ExtractedEvidence) -> CrosswalkResult<StatusUpdate> {
        self.session(&record.assessment_id)?
            .submit(&record.control_id, record.evidence)
    }

    /// Ingest a batch; nothing is applied unless every record is acceptable
    pub fn ingest_batch(
        &self,
        records: Vec<ExtractedEvidence>,
    ) -> CrosswalkResult<Vec<StatusUpdate>> {
        let mut sessions = BTreeMap::new();
        for record in &records {
            if !sessions.contains_key(&record.assessment_id) {
                sessions.insert(record.assessment_id.clone(), self.session(&record.assessment_id)?);
            }
        }
        let keys: Vec<_> = records
            .iter()
            .map(|r| {
                let evidence_id = r.evidence.evidence_id.clone();
                (r.assessment_id.clone(), r.control_id.clone(), evidence_id)
            })
            .collect();

        let updates = self.shared.store.upsert_batch(records)?;
        for ((assessment, control, evidence), update) in keys.iter().zip(&updates) {
            if let Some(session) = sessions.get(assessment) {
                session.log_update(control, evidence, update);
            }
        }
        tracing::debug!(records = updates.len(), "evidence batch ingested");
        Ok(updates)
    }
}

/// Handle to one assessment
#[derive(Clone)]
pub struct AssessmentSession {
    id: AssessmentId,
    shared: Arc<EngineShared>,
    state: Arc<SessionState>,
}

impl AssessmentSession {
    /// Assessment id
    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    /// Current phase
    pub fn phase(&self) -> CrosswalkResult<AssessmentPhase> {
        self.shared.store.phase(&self.id)
    }

    /// Target frameworks
    pub fn frameworks(&self) -> CrosswalkResult<Vec<FrameworkId>> {
        self.shared.store.assessment_frameworks(&self.id)
    }

    /// Current status of a control
    pub fn control_status(&self, control: &ControlId) -> CrosswalkResult<ControlStatus> {
        self.shared.store.control_status(&self.id, control)
    }

    /// Submit evidence for a control
    pub fn submit(
        &self,
        control: &ControlId,
        evidence: EvidenceSubmission,
    ) -> CrosswalkResult<StatusUpdate> {
        let evidence_id = evidence.evidence_id.clone();
        let update = self.shared.store.upsert_control_status(&self.id, control, evidence)?;
        self.log_update(control, &evidence_id, &update);
        Ok(update)
    }

    fn log_update(&self, control: &ControlId, evidence_id: &EvidenceId, update: &StatusUpdate) {
        let event = match update.outcome {
            RecordOutcome::Recorded => AuditEventType::EvidenceRecorded,
            RecordOutcome::Corrected => AuditEventType::EvidenceCorrected,
            RecordOutcome::Unchanged => return,
        };
        let hash = update
            .status
            .history
            .last()
            .map(|r| r.content_hash.as_str())
            .unwrap_or_default();
        self.state.audit.log(
            event,
            "extractor",
            control.as_str(),
            &format!("evidence={} sha256={}", evidence_id, hash),
        );
    }

    /// Finalize, or return the existing result if already finalized
    pub fn finalize(&self) -> CrosswalkResult<Arc<AssessmentOutcome>> {
        self.finalize_with(CancelToken::new())
    }

    /// Finalize under a caller-held cancellation token
    pub fn finalize_with(&self, token: CancelToken) -> CrosswalkResult<Arc<AssessmentOutcome>> {
        // The token is visible to `cancel_finalize` from the moment the
        // phase leaves `open`
        let snapshot = {
            let mut in_flight = self.state.in_flight.lock();
            match self.shared.store.begin_finalize(&self.id)? {
                FinalizeStart::AlreadyFinalized(outcome) => return Ok(outcome),
                FinalizeStart::Snapshot(snapshot) => {
                    *in_flight = Some(token.clone());
                    snapshot
                }
            }
        };
        self.state.audit.log(
            AuditEventType::FinalizeStarted,
            "system",
            self.id.as_str(),
            &format!("knowledge_version={}", snapshot.knowledge.version()),
        );

        let result = self.run_passes(&snapshot, &token);
        // A cancel acknowledged before this point always wins
        let result = {
            let mut in_flight = self.state.in_flight.lock();
            *in_flight = None;
            result.and_then(|outcome| token.checkpoint("commit").map(|()| outcome))
        };

        match result {
            Ok(outcome) => {
                let frozen = self.shared.store.commit_finalize(&self.id, outcome)?;
                let details = match frozen.fingerprint() {
                    Ok(fingerprint) => format!("fingerprint={}", fingerprint),
                    Err(err) => format!("fingerprint unavailable: {}", err),
                };
                self.state
                    .audit
                    .log(AuditEventType::Finalized, "system", self.id.as_str(), &details);
                Ok(frozen)
            }
            Err(err) => {
                self.shared.store.reopen(&self.id)?;
                let event = match err {
                    CrosswalkError::Cancelled(_) => AuditEventType::FinalizeCancelled,
                    _ => AuditEventType::FinalizeFailed,
                };
                self.state.audit.log(event, "system", self.id.as_str(), &err.to_string());
                tracing::warn!(assessment = %self.id, error = %err, "finalize did not complete");
                Err(err)
            }
        }
    }

    /// Signal an in-flight finalize to stop; returns whether one was running
    pub fn cancel_finalize(&self) -> bool {
        match self.state.in_flight.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn run_passes(
        &self,
        snapshot: &AssessmentSnapshot,
        token: &CancelToken,
    ) -> CrosswalkResult<AssessmentOutcome> {
        let config = &self.shared.config;
        let knowledge = &snapshot.knowledge;

        // Asserted controls seed inference; an override replaces the
        // extracted determination
        let seeds: BTreeMap<ControlId, Seed> = snapshot
            .statuses
            .iter()
            .filter_map(|(id, status)| {
                let (state, confidence) = match &status.review_override {
                    Some(o) => (o.state, o.confidence),
                    None => (status.state, status.confidence),
                };
                state.is_asserted().then(|| (id.clone(), Seed { state, confidence }))
            })
            .collect();

        token.checkpoint("mapping resolution")?;
        let resolver = MappingResolver::new(knowledge, &config.resolver);
        let mut derived: BTreeMap<ControlId, DerivedScore> = BTreeMap::new();
        for framework in &snapshot.frameworks {
            derived.extend(resolver.resolve(framework, &seeds)?.derived);
        }
        // Controls between target frameworks take part in conflict detection only
        let intermediate = resolver.reachable(&snapshot.frameworks, &seeds)?;
        tracing::debug!(
            assessment = %self.id,
            derived = derived.len(),
            intermediate = intermediate.len(),
            "mapping resolution complete"
        );

        token.checkpoint("confidence aggregation")?;
        let escalation = EscalationEngine::new(config.escalation.clone());
        let mut verdicts = BTreeMap::new();
        for (id, status) in &snapshot.statuses {
            let control = knowledge
                .control(id)
                .ok_or_else(|| CrosswalkError::not_found("control", id))?;
            verdicts.insert(id.clone(), escalation.verdict(control, status, derived.get(id)));
        }

        token.checkpoint("conflict detection")?;
        let mut reached = verdicts.clone();
        for (id, score) in &intermediate {
            let control = knowledge
                .control(id)
                .ok_or_else(|| CrosswalkError::not_found("control", id))?;
            let status = ControlStatus::not_assessed(&self.id, id, &control.framework);
            reached.insert(id.clone(), escalation.verdict(control, &status, Some(score)));
        }
        let conflicts = ConflictDetector::new(knowledge).detect(&self.id, &reached)?;

        token.checkpoint("escalation")?;
        let escalations = escalation.escalate(&self.id, &verdicts)?;

        token.checkpoint("coverage")?;
        let coverage = snapshot
            .frameworks
            .iter()
            .map(|fw| CoverageSummary::from_verdicts(fw, verdicts.values()))
            .collect();
        let mut reuse = Vec::new();
        for source in &snapshot.frameworks {
            for target in snapshot.frameworks.iter().filter(|t| *t != source) {
                reuse.push(resolver.reuse(source, target, &seeds)?);
            }
        }

        Ok(AssessmentOutcome {
            assessment: self.id.clone(),
            frameworks: snapshot.frameworks.clone(),
            knowledge_version: knowledge.version(),
            created_at: snapshot.created_at,
            completed_at: Utc::now(),
            coverage,
            verdicts,
            conflicts,
            escalations,
            reuse,
        })
    }

    /// Withdraw an open assessment
    pub fn abandon(&self) -> CrosswalkResult<()> {
        self.shared.store.abandon(&self.id)?;
        self.state
            .audit
            .log(AuditEventType::Abandoned, "system", self.id.as_str(), "");
        Ok(())
    }

    /// Frozen outcome; only available once finalized
    pub fn outcome(&self) -> CrosswalkResult<Arc<AssessmentOutcome>> {
        self.shared.store.outcome(&self.id)
    }

    /// Escalation items of the finalized outcome
    pub fn escalations(&self) -> CrosswalkResult<Vec<crosswalk_graph::EscalationItem>> {
        Ok(self.outcome()?.escalations.clone())
    }

    /// Review state of every escalation item
    pub fn review_states(&self) -> CrosswalkResult<BTreeMap<EscalationId, ReviewState>> {
        self.shared.store.review_states(&self.id)
    }

    /// Claim an escalation item
    pub fn claim(&self, escalation: &EscalationId, reviewer: &str) -> CrosswalkResult<ReviewState> {
        let state = self.shared.store.claim_escalation(&self.id, escalation, reviewer)?;
        self.state
            .audit
            .log(AuditEventType::EscalationClaimed, reviewer, escalation.as_str(), "");
        Ok(state)
    }

    /// Resolve a claimed escalation item
    pub fn resolve(
        &self,
        escalation: &EscalationId,
        reviewer: &str,
        resolution: Resolution,
    ) -> CrosswalkResult<ReviewOverride> {
        let review = self
            .shared
            .store
            .resolve_escalation(&self.id, escalation, reviewer, resolution)?;
        self.state.audit.log(
            AuditEventType::EscalationResolved,
            reviewer,
            escalation.as_str(),
            &format!("state={:?} confidence={}", review.state, review.confidence),
        );
        Ok(review)
    }

    /// Report over the finalized outcome with review results applied
    pub fn report(&self) -> CrosswalkResult<AssessmentReport> {
        let outcome = self.outcome()?;
        let reviews = self.review_states()?;
        let overrides: BTreeMap<_, _> = self
            .shared
            .store
            .control_statuses(&self.id)?
            .into_iter()
            .filter_map(|(id, status)| status.review_override.map(|o| (id, o)))
            .collect();
        let knowledge = self.shared.store.knowledge();
        AssessmentReport::build(&outcome, &knowledge, &reviews, &overrides)
    }

    /// Audit events, optionally filtered
    pub fn audit_events(&self, filter: Option<&AuditFilter>) -> Vec<AuditEvent> {
        self.state.audit.events(filter)
    }

    /// Verify the audit hash chain
    pub fn verify_audit(&self) -> IntegrityResult {
        self.state.audit.verify_integrity()
    }
}

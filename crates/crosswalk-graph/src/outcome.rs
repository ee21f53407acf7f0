//! Finalized Assessment Output
//!
//! Everything a finalize pass produces. An `AssessmentOutcome` is built once,
//! frozen behind an `Arc` by the store, and handed back unchanged on every
//! later read, so two reads are byte-identical.

use crate::assessment::ControlState;
use crate::model::{RelationshipKind, Severity};
use chrono::{DateTime, Utc};
use crosswalk_common::{
    AssessmentId, Confidence, ControlId, CrosswalkError, CrosswalkResult, EscalationId, EvidenceId,
    FrameworkId, MappingId, RuleId,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// One traversed mapping edge in an inference path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub mapping: MappingId,
    pub from: ControlId,
    pub to: ControlId,
    pub kind: RelationshipKind,
    pub edge_confidence: Confidence,
    pub kind_factor: f64,
}

/// Explanation of an inferred score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Asserted control the path starts from
    pub seed: ControlId,
    pub seed_confidence: Confidence,
    pub hops: Vec<Hop>,
    /// `seed_confidence × Π(edge_confidence × kind_factor)`
    pub score: Confidence,
}

impl Provenance {
    /// Number of edges walked
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Whether the path crosses an intermediate control
    pub fn is_transitive(&self) -> bool {
        self.hops.len() > 1
    }
}

/// Where a verdict's confidence came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Basis {
    /// No evidence and no inference
    None,
    /// Extraction confidence of the control's own evidence
    Direct,
    /// Derived through mapping edges
    Inferred,
    /// Human reviewer determination
    Override,
}

/// Escalation policy partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    Gap,
    Escalate,
    AutoAccept,
}

/// Final per-control determination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub control: ControlId,
    pub framework: FrameworkId,
    pub criticality: f64,
    /// State before the escalation partition
    pub asserted_state: ControlState,
    /// State after the escalation partition
    pub state: ControlState,
    pub confidence: Confidence,
    pub basis: Basis,
    pub direct_confidence: Confidence,
    pub derived_confidence: Confidence,
    pub evidence: Vec<EvidenceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub disposition: Disposition,
}

impl Verdict {
    /// Counts towards coverage
    pub fn is_satisfied(&self) -> bool {
        self.state == ControlState::Implemented && self.disposition == Disposition::AutoAccept
    }
}

/// Weighted coverage of one framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub framework: FrameworkId,
    pub control_count: usize,
    pub implemented: usize,
    pub partial: usize,
    pub gap: usize,
    pub pending_review: usize,
    pub total_weight: f64,
    pub satisfied_weight: f64,
    pub coverage_percent: f64,
}

impl CoverageSummary {
    /// Compute weighted coverage from verdicts of one framework
    pub fn from_verdicts<'a>(
        framework: &FrameworkId,
        verdicts: impl IntoIterator<Item = &'a Verdict>,
    ) -> Self {
        let mut summary = Self {
            framework: framework.clone(),
            control_count: 0,
            implemented: 0,
            partial: 0,
            gap: 0,
            pending_review: 0,
            total_weight: 0.0,
            satisfied_weight: 0.0,
            coverage_percent: 0.0,
        };
        for v in verdicts.into_iter().filter(|v| &v.framework == framework) {
            summary.control_count += 1;
            summary.total_weight += v.criticality;
            if v.disposition == Disposition::Escalate {
                summary.pending_review += 1;
            }
            match v.state {
                ControlState::Implemented => summary.implemented += 1,
                ControlState::Partial => summary.partial += 1,
                ControlState::Gap | ControlState::NotAssessed => summary.gap += 1,
            }
            if v.is_satisfied() {
                summary.satisfied_weight += v.criticality;
            }
        }
        summary.coverage_percent = if summary.total_weight > 0.0 {
            summary.satisfied_weight / summary.total_weight * 100.0
        } else {
            0.0
        };
        summary
    }
}

/// Conflict detected between asserted controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub id: String,
    pub assessment: AssessmentId,
    pub rule: RuleId,
    pub severity: Severity,
    pub controls: BTreeSet<ControlId>,
    pub rationale: String,
    /// At least one involved control is asserted only by inference
    pub inferred: bool,
}

/// Why an assertion was routed to review
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    /// Direct evidence whose extraction confidence is inconclusive
    LowExtractionConfidence,
    /// Single-hop inference from another framework
    InferredCoverage,
    /// Multi-hop inference through an intermediate framework
    TransitiveInference,
}

/// What the reviewer is asked to confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationSubject {
    Control { control: ControlId },
    Mapping { mapping: MappingId, control: ControlId },
}

impl EscalationSubject {
    /// Control whose status the resolution is written onto
    pub fn control(&self) -> &ControlId {
        match self {
            Self::Control { control } | Self::Mapping { control, .. } => control,
        }
    }
}

/// Assertion routed to human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationItem {
    pub id: EscalationId,
    pub assessment: AssessmentId,
    pub subject: EscalationSubject,
    pub proposed_state: ControlState,
    pub confidence: Confidence,
    pub reason: ReasonCode,
    pub reviewer_role: String,
}

/// Coverage of a target framework derived from a single source framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReuseEntry {
    pub source: FrameworkId,
    pub target: FrameworkId,
    pub satisfied_controls: usize,
    pub coverage_percent: f64,
}

/// Frozen result of a finalize pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutcome {
    pub assessment: AssessmentId,
    pub frameworks: Vec<FrameworkId>,
    pub knowledge_version: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub coverage: Vec<CoverageSummary>,
    pub verdicts: BTreeMap<ControlId, Verdict>,
    pub conflicts: Vec<ConflictFinding>,
    pub escalations: Vec<EscalationItem>,
    pub reuse: Vec<ReuseEntry>,
}

impl AssessmentOutcome {
    /// Canonical JSON encoding
    pub fn to_canonical_json(&self) -> CrosswalkResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CrosswalkError::validation(format!("outcome not encodable: {}", e)))
    }

    /// SHA-256 of the canonical encoding
    pub fn fingerprint(&self) -> CrosswalkResult<String> {
        Ok(hex::encode(Sha256::digest(self.to_canonical_json()?.as_bytes())))
    }

    /// Coverage of one framework
    pub fn coverage_for(&self, framework: &FrameworkId) -> Option<&CoverageSummary> {
        self.coverage.iter().find(|c| &c.framework == framework)
    }

    /// Escalation item by id
    pub fn escalation(&self, id: &EscalationId) -> Option<&EscalationItem> {
        self.escalations.iter().find(|e| &e.id == id)
    }
}

/// Reviewer's determination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    /// The proposed state is confirmed
    Accepted,
    /// The assertion is rejected; the control is a gap
    Rejected,
    /// The reviewer sets the state explicitly
    Overridden { state: ControlState },
}

impl Resolution {
    /// State and override confidence this resolution records
    pub fn determination(&self, proposed: ControlState) -> (ControlState, Confidence) {
        let state = match self {
            Self::Accepted => proposed,
            Self::Rejected => ControlState::Gap,
            Self::Overridden { state } => *state,
        };
        let confidence = if state.is_asserted() {
            Confidence::ONE
        } else {
            Confidence::ZERO
        };
        (state, confidence)
    }
}

/// Review workflow state of an escalation item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewState {
    Pending,
    Claimed {
        reviewer: String,
        claimed_at: DateTime<Utc>,
    },
    Resolved {
        reviewer: String,
        resolution: Resolution,
        resolved_at: DateTime<Utc>,
    },
}

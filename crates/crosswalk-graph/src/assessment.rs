//! Assessment State
//!
//! Evidence records and the per-(assessment, control) `ControlStatus`, the
//! only mutable per-assessment entity. Evidence is append-only: a
//! resubmission under the same evidence id supersedes the earlier record for
//! display and aggregation, but the earlier record stays in history.

use chrono::{DateTime, Utc};
use crosswalk_common::{
    AssessmentId, Confidence, ControlId, CrosswalkError, CrosswalkResult, EscalationId, EvidenceId,
    FrameworkId,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Assessment lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentPhase {
    /// Accepting evidence
    Open,
    /// Finalize pass in progress; evidence rejected
    Computing,
    /// Immutable snapshot delivered
    Finalized,
    /// Terminal; organization withdrew
    Abandoned,
}

impl std::fmt::Display for AssessmentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Computing => write!(f, "computing"),
            Self::Finalized => write!(f, "finalized"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Per-control determination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlState {
    NotAssessed,
    Gap,
    Partial,
    Implemented,
}

impl ControlState {
    /// Implemented or partial
    pub fn is_asserted(&self) -> bool {
        matches!(self, Self::Implemented | Self::Partial)
    }
}

/// What the extractor claims a piece of evidence shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceClaim {
    #[default]
    Implemented,
    Partial,
}

/// Location of an extracted span inside its source document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub start: u64,
    pub end: u64,
}

impl LocationSpan {
    /// Span on a page
    pub fn on_page(page: u32, start: u64, end: u64) -> Self {
        Self { page: Some(page), start, end }
    }
}

/// Evidence as submitted for one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    pub evidence_id: EvidenceId,
    pub source_document: String,
    pub extracted_confidence: Confidence,
    pub location: LocationSpan,
    #[serde(default)]
    pub claim: EvidenceClaim,
}

impl EvidenceSubmission {
    /// Create submission
    pub fn new(
        evidence_id: &str,
        source_document: &str,
        extracted_confidence: f64,
    ) -> CrosswalkResult<Self> {
        let submission = Self {
            evidence_id: EvidenceId::new(evidence_id)?,
            source_document: source_document.to_string(),
            extracted_confidence: Confidence::new(extracted_confidence)?,
            location: LocationSpan::default(),
            claim: EvidenceClaim::Implemented,
        };
        submission.validate()?;
        Ok(submission)
    }

    /// Set location
    pub fn at(mut self, location: LocationSpan) -> Self {
        self.location = location;
        self
    }

    /// Set claim
    pub fn claiming(mut self, claim: EvidenceClaim) -> Self {
        self.claim = claim;
        self
    }

    /// Check boundary invariants
    pub fn validate(&self) -> CrosswalkResult<()> {
        if self.source_document.trim().is_empty() {
            return Err(CrosswalkError::validation(format!(
                "evidence {} has no source document reference",
                self.evidence_id
            )));
        }
        if self.location.start > self.location.end {
            return Err(CrosswalkError::validation(format!(
                "evidence {} location span starts after it ends",
                self.evidence_id
            )));
        }
        Ok(())
    }

    /// SHA-256 over the submission payload
    pub fn content_hash(&self) -> String {
        let data = format!(
            "{}|{}|{}|{:?}|{}|{}|{:?}",
            self.evidence_id,
            self.source_document,
            self.extracted_confidence.value(),
            self.location.page,
            self.location.start,
            self.location.end,
            self.claim,
        );
        hex::encode(Sha256::digest(data.as_bytes()))
    }
}

/// Record emitted by the external evidence extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEvidence {
    pub assessment_id: AssessmentId,
    pub control_id: ControlId,
    #[serde(flatten)]
    pub evidence: EvidenceSubmission,
}

/// Evidence held in a control's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub evidence_id: EvidenceId,
    pub source_document: String,
    pub extracted_confidence: Confidence,
    pub location: LocationSpan,
    pub claim: EvidenceClaim,
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
    /// Position in the control's history
    pub sequence: u64,
    /// Sequence of the record this one corrects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
}

/// Human determination recorded back from the review workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOverride {
    pub escalation: EscalationId,
    pub reviewer: String,
    pub state: ControlState,
    /// Always exactly 1.0 or 0.0
    pub confidence: Confidence,
    pub recorded_at: DateTime<Utc>,
}

/// Effect of recording a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOutcome {
    /// First record for this evidence id
    Recorded,
    /// Replaced an earlier record with the same id
    Corrected,
    /// Identical to the current record; nothing written
    Unchanged,
}

/// Per-(assessment, control) status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStatus {
    pub assessment: AssessmentId,
    pub control: ControlId,
    pub framework: FrameworkId,
    pub state: ControlState,
    /// Current supporting evidence (latest record per id)
    pub evidence: Vec<EvidenceId>,
    /// Every record ever accepted, oldest first
    pub history: Vec<EvidenceRecord>,
    /// Aggregate extraction confidence over current evidence
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_override: Option<ReviewOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ControlStatus {
    /// Fresh not-assessed status
    pub fn not_assessed(
        assessment: &AssessmentId,
        control: &ControlId,
        framework: &FrameworkId,
    ) -> Self {
        Self {
            assessment: assessment.clone(),
            control: control.clone(),
            framework: framework.clone(),
            state: ControlState::NotAssessed,
            evidence: Vec::new(),
            history: Vec::new(),
            confidence: Confidence::ZERO,
            review_override: None,
            updated_at: None,
        }
    }

    /// Current record for each evidence id
    pub fn current_evidence(&self) -> impl Iterator<Item = &EvidenceRecord> {
        let mut latest: BTreeMap<&EvidenceId, &EvidenceRecord> = BTreeMap::new();
        for record in &self.history {
            latest.insert(&record.evidence_id, record);
        }
        latest.into_values()
    }

    /// Append a submission and recompute state and aggregate confidence
    pub fn record(&mut self, submission: EvidenceSubmission, now: DateTime<Utc>) -> RecordOutcome {
        let hash = submission.content_hash();
        let previous = self
            .history
            .iter()
            .rev()
            .find(|r| r.evidence_id == submission.evidence_id);

        let (outcome, supersedes) = match previous {
            Some(prev) if prev.content_hash == hash => return RecordOutcome::Unchanged,
            Some(prev) => (RecordOutcome::Corrected, Some(prev.sequence)),
            None => (RecordOutcome::Recorded, None),
        };

        self.history.push(EvidenceRecord {
            evidence_id: submission.evidence_id,
            source_document: submission.source_document,
            extracted_confidence: submission.extracted_confidence,
            location: submission.location,
            claim: submission.claim,
            content_hash: hash,
            recorded_at: now,
            sequence: self.history.len() as u64,
            supersedes,
        });
        self.recompute();
        self.updated_at = Some(now);
        outcome
    }

    fn recompute(&mut self) {
        let current: Vec<_> = self.current_evidence().cloned().collect();
        self.evidence = current.iter().map(|r| r.evidence_id.clone()).collect();
        self.confidence = Confidence::noisy_or(current.iter().map(|r| r.extracted_confidence));
        self.state = if current.is_empty() {
            ControlState::NotAssessed
        } else if current.iter().any(|r| r.claim == EvidenceClaim::Implemented) {
            ControlState::Implemented
        } else {
            ControlState::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> ControlStatus {
        ControlStatus::not_assessed(
            &AssessmentId::new("a1").unwrap(),
            &ControlId::new("x/C1").unwrap(),
            &FrameworkId::new("x").unwrap(),
        )
    }

    #[test]
    fn test_submission_validation() {
        assert!(EvidenceSubmission::new("e1", "doc-1", 0.5).is_ok());
        assert!(EvidenceSubmission::new("e1", "", 0.5).is_err());
        assert!(EvidenceSubmission::new("e1", "doc-1", 1.5).is_err());
        let bad_span = EvidenceSubmission::new("e1", "doc-1", 0.5)
            .unwrap()
            .at(LocationSpan::on_page(1, 10, 5));
        assert!(bad_span.validate().is_err());
    }

    #[test]
    fn test_record_and_aggregate() {
        let mut s = status();
        let now = Utc::now();
        let submit = |id: &str, c: f64| EvidenceSubmission::new(id, "doc", c).unwrap();
        assert_eq!(s.record(submit("e1", 0.6), now), RecordOutcome::Recorded);
        assert_eq!(s.record(submit("e2", 0.7), now), RecordOutcome::Recorded);
        assert_eq!(s.state, ControlState::Implemented);
        assert!((s.confidence.value() - 0.88).abs() < 1e-9);
        assert_eq!(s.evidence.len(), 2);
    }

    #[test]
    fn test_same_payload_is_idempotent() {
        let mut s = status();
        let now = Utc::now();
        let e = EvidenceSubmission::new("e1", "doc", 0.6).unwrap();
        s.record(e.clone(), now);
        assert_eq!(s.record(e, now), RecordOutcome::Unchanged);
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn test_correction_keeps_history() {
        let mut s = status();
        let now = Utc::now();
        s.record(EvidenceSubmission::new("e1", "doc", 0.6).unwrap(), now);
        let outcome = s.record(EvidenceSubmission::new("e1", "doc", 0.9).unwrap(), now);
        assert_eq!(outcome, RecordOutcome::Corrected);
        assert_eq!(s.history.len(), 2);
        assert_eq!(s.history[1].supersedes, Some(0));
        assert_eq!(s.evidence.len(), 1);
        assert_eq!(s.confidence.value(), 0.9);
    }

    #[test]
    fn test_partial_claims() {
        let mut s = status();
        let e = EvidenceSubmission::new("e1", "doc", 0.8)
            .unwrap()
            .claiming(EvidenceClaim::Partial);
        s.record(e, Utc::now());
        assert_eq!(s.state, ControlState::Partial);
    }

    #[test]
    fn test_extracted_evidence_flattened() {
        let json = r#"{
            "assessment_id": "a1",
            "control_id": "x/C1",
            "evidence_id": "e1",
            "source_document": "doc-7",
            "extracted_confidence": 0.4,
            "location": {"page": 3, "start": 10, "end": 42}
        }"#;
        let rec: ExtractedEvidence = serde_json::from_str(json).unwrap();
        assert_eq!(rec.evidence.claim, EvidenceClaim::Implemented);
        assert_eq!(rec.evidence.location.page, Some(3));
    }
}

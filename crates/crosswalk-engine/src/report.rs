//! Reporting Views
//!
//! Read-only projections of a finalized assessment for downstream consumers.
//! The frozen outcome is never modified; review results are applied as an
//! overlay (`reviewed_coverage`) next to the computed figures.

use chrono::{DateTime, Utc};
use crosswalk_common::{
    AssessmentId, Confidence, ControlId, CrosswalkError, CrosswalkResult, EscalationId, FrameworkId,
};
use crosswalk_graph::{
    AssessmentOutcome, Basis, ConflictFinding, ControlState, CoverageSummary, Disposition,
    EscalationItem, KnowledgeGraph, ReuseEntry, ReviewOverride, ReviewState, Verdict,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control that does not count towards coverage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub control: ControlId,
    pub framework: FrameworkId,
    pub name: String,
    pub criticality: f64,
    pub state: ControlState,
    pub disposition: Disposition,
    pub confidence: Confidence,
}

/// Escalation item with its review progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationView {
    pub item: EscalationItem,
    pub review: ReviewState,
}

/// Assessment report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub assessment: AssessmentId,
    pub frameworks: Vec<FrameworkId>,
    pub knowledge_version: u64,
    pub completed_at: DateTime<Utc>,
    /// SHA-256 of the frozen outcome
    pub fingerprint: String,
    pub coverage: Vec<CoverageSummary>,
    /// Coverage with reviewer determinations applied
    pub reviewed_coverage: Vec<CoverageSummary>,
    pub verdicts: Vec<Verdict>,
    /// Unsatisfied controls, most critical first
    pub gaps: Vec<GapEntry>,
    pub conflicts: Vec<ConflictFinding>,
    pub escalations: Vec<EscalationView>,
    pub reuse: Vec<ReuseEntry>,
}

impl AssessmentReport {
    /// Build report from a frozen outcome and the current review state
    pub fn build(
        outcome: &AssessmentOutcome,
        knowledge: &KnowledgeGraph,
        reviews: &BTreeMap<EscalationId, ReviewState>,
        overrides: &BTreeMap<ControlId, ReviewOverride>,
    ) -> CrosswalkResult<Self> {
        let mut gaps: Vec<GapEntry> = outcome
            .verdicts
            .values()
            .filter(|v| !v.is_satisfied())
            .map(|v| GapEntry {
                control: v.control.clone(),
                framework: v.framework.clone(),
                name: knowledge.control(&v.control).map(|c| c.name.clone()).unwrap_or_default(),
                criticality: v.criticality,
                state: v.state,
                disposition: v.disposition,
                confidence: v.confidence,
            })
            .collect();
        gaps.sort_by(|a, b| {
            b.criticality
                .total_cmp(&a.criticality)
                .then_with(|| a.control.cmp(&b.control))
        });

        let escalations = outcome
            .escalations
            .iter()
            .map(|item| EscalationView {
                item: item.clone(),
                review: reviews.get(&item.id).cloned().unwrap_or(ReviewState::Pending),
            })
            .collect();

        let reviewed: Vec<Verdict> = outcome
            .verdicts
            .values()
            .map(|v| match overrides.get(&v.control) {
                Some(o) => apply_override(v, o),
                None => v.clone(),
            })
            .collect();
        let reviewed_coverage = outcome
            .frameworks
            .iter()
            .map(|fw| CoverageSummary::from_verdicts(fw, &reviewed))
            .collect();

        Ok(Self {
            assessment: outcome.assessment.clone(),
            frameworks: outcome.frameworks.clone(),
            knowledge_version: outcome.knowledge_version,
            completed_at: outcome.completed_at,
            fingerprint: outcome.fingerprint()?,
            coverage: outcome.coverage.clone(),
            reviewed_coverage,
            verdicts: outcome.verdicts.values().cloned().collect(),
            gaps,
            conflicts: outcome.conflicts.clone(),
            escalations,
            reuse: outcome.reuse.clone(),
        })
    }

    /// Computed coverage percentage for a framework
    pub fn coverage_percent(&self, framework: &FrameworkId) -> Option<f64> {
        self.coverage
            .iter()
            .find(|c| &c.framework == framework)
            .map(|c| c.coverage_percent)
    }

    /// Coverage percentage after reviewer determinations
    pub fn reviewed_coverage_percent(&self, framework: &FrameworkId) -> Option<f64> {
        self.reviewed_coverage
            .iter()
            .find(|c| &c.framework == framework)
            .map(|c| c.coverage_percent)
    }

    /// Escalations still awaiting a determination
    pub fn open_escalations(&self) -> impl Iterator<Item = &EscalationView> {
        self.escalations
            .iter()
            .filter(|e| !matches!(e.review, ReviewState::Resolved { .. }))
    }

    /// Pretty JSON
    pub fn to_json(&self) -> CrosswalkResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CrosswalkError::validation(format!("cannot encode report: {}", e)))
    }
}

fn apply_override(verdict: &Verdict, review: &ReviewOverride) -> Verdict {
    let mut v = verdict.clone();
    v.basis = Basis::Override;
    v.state = review.state;
    v.asserted_state = review.state;
    v.confidence = review.confidence;
    v.disposition = if review.state.is_asserted() {
        Disposition::AutoAccept
    } else {
        Disposition::Gap
    };
    v
}

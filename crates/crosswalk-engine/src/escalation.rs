//! Confidence & Escalation Engine
//!
//! Folds direct extraction confidence, derived inference scores and human
//! overrides into one confidence per control, then partitions it:
//!
//! ```text
//!   0 ────────── floor ─────────── ceiling ────────── 1
//!   │    gap      │    escalate     │   auto-accept   │
//!   [0, floor)      [floor, ceiling)   [ceiling, 1]
//! ```

use crate::config::EscalationPolicy;
use crate::resolver::DerivedScore;
use crosswalk_common::{
    AssessmentId, Confidence, ControlId, CrosswalkError, CrosswalkResult, EscalationId,
};
use crosswalk_graph::{
    Basis, Control, ControlState, ControlStatus, Disposition, EscalationItem, EscalationSubject,
    ReasonCode, ReviewOverride, Verdict,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Aggregate confidence for one control
///
/// The larger of direct and derived confidence; an override replaces both.
/// Non-decreasing in each input and bounded to [0, 1].
#[inline]
pub fn aggregate(
    direct: Confidence,
    derived: Confidence,
    review: Option<&ReviewOverride>,
) -> Confidence {
    match review {
        Some(o) => o.confidence,
        None => direct.max(derived),
    }
}

/// Escalation engine
#[derive(Debug, Clone)]
pub struct EscalationEngine {
    policy: EscalationPolicy,
}

impl EscalationEngine {
    /// Create engine
    pub fn new(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Map a confidence onto exactly one disposition
    #[inline]
    pub fn partition(&self, confidence: Confidence) -> Disposition {
        let c = confidence.value();
        if c < self.policy.review_floor {
            Disposition::Gap
        } else if c < self.policy.auto_accept_ceiling {
            Disposition::Escalate
        } else {
            Disposition::AutoAccept
        }
    }

    /// Final verdict for a control
    pub fn verdict(
        &self,
        control: &Control,
        status: &ControlStatus,
        derived: Option<&DerivedScore>,
    ) -> Verdict {
        let direct = if status.state.is_asserted() {
            status.confidence
        } else {
            Confidence::ZERO
        };
        let derived_confidence = derived.map_or(Confidence::ZERO, |d| d.score());

        let mut verdict = Verdict {
            control: control.id.clone(),
            framework: control.framework.clone(),
            criticality: control.criticality,
            asserted_state: status.state,
            state: status.state,
            confidence: aggregate(direct, derived_confidence, status.review_override.as_ref()),
            basis: Basis::None,
            direct_confidence: direct,
            derived_confidence,
            evidence: status.evidence.clone(),
            provenance: None,
            disposition: Disposition::Gap,
        };

        if let Some(review) = &status.review_override {
            verdict.basis = Basis::Override;
            verdict.asserted_state = review.state;
            verdict.state = review.state;
            verdict.disposition = if review.state.is_asserted() {
                Disposition::AutoAccept
            } else {
                Disposition::Gap
            };
            return verdict;
        }

        match derived {
            Some(d) if d.score() > direct => {
                verdict.basis = Basis::Inferred;
                verdict.asserted_state = d.state;
                verdict.provenance = Some(d.provenance.clone());
            }
            _ if direct > Confidence::ZERO => verdict.basis = Basis::Direct,
            _ => {}
        }

        verdict.disposition = if verdict.asserted_state.is_asserted() {
            self.partition(verdict.confidence)
        } else {
            Disposition::Gap
        };
        verdict.state = match verdict.disposition {
            Disposition::Gap if verdict.basis == Basis::None => ControlState::NotAssessed,
            Disposition::Gap => ControlState::Gap,
            Disposition::Escalate | Disposition::AutoAccept => verdict.asserted_state,
        };
        verdict
    }

    /// Refuse a fully automatic ceiling when inference produced any score,
    /// whether or not it won over direct evidence
    pub fn check_policy(&self, verdicts: &BTreeMap<ControlId, Verdict>) -> CrosswalkResult<()> {
        if self.policy.auto_accept_ceiling < 1.0 {
            return Ok(());
        }
        let inferred = verdicts
            .values()
            .find(|v| v.basis == Basis::Inferred || v.derived_confidence > Confidence::ZERO);
        if let Some(v) = inferred {
            return Err(CrosswalkError::config(format!(
                "auto_accept_ceiling is 1.0 but control {} has an inferred score; \
                 inferred coverage must remain reviewable",
                v.control
            )));
        }
        Ok(())
    }

    /// Escalation items for every verdict in the escalate band
    pub fn escalate(
        &self,
        assessment: &AssessmentId,
        verdicts: &BTreeMap<ControlId, Verdict>,
    ) -> CrosswalkResult<Vec<EscalationItem>> {
        self.check_policy(verdicts)?;

        let mut items = Vec::new();
        for v in verdicts.values().filter(|v| v.disposition == Disposition::Escalate) {
            let (subject, reason) = match &v.provenance {
                Some(p) if v.basis == Basis::Inferred => {
                    let reason = if p.is_transitive() {
                        ReasonCode::TransitiveInference
                    } else {
                        ReasonCode::InferredCoverage
                    };
                    let subject = match p.hops.last() {
                        Some(hop) => EscalationSubject::Mapping {
                            mapping: hop.mapping.clone(),
                            control: v.control.clone(),
                        },
                        None => EscalationSubject::Control {
                            control: v.control.clone(),
                        },
                    };
                    (subject, reason)
                }
                _ => (
                    EscalationSubject::Control {
                        control: v.control.clone(),
                    },
                    ReasonCode::LowExtractionConfidence,
                ),
            };
            items.push(EscalationItem {
                id: escalation_id(assessment, &v.control, reason)?,
                assessment: assessment.clone(),
                subject,
                proposed_state: v.asserted_state,
                confidence: v.confidence,
                reason,
                reviewer_role: self.policy.reviewer_roles.role_for(reason).to_string(),
            });
        }
        Ok(items)
    }
}

fn escalation_id(
    assessment: &AssessmentId,
    control: &ControlId,
    reason: ReasonCode,
) -> CrosswalkResult<EscalationId> {
    let digest = Sha256::digest(format!("{}|{}|{:?}", assessment, control, reason).as_bytes());
    EscalationId::new(format!("esc-{}", &hex::encode(digest)[..16]))
}

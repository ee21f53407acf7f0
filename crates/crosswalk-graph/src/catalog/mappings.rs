//! Curated Crosswalk
//!
//! Mappings between the built-in frameworks and the conflict rules that go
//! with them. Confidence weights are curation judgements, not per-assessment.

use super::{essential_eight, gdpr, iso27001, nist_csf, soc2};
use crate::model::{ConflictRule, Mapping, RelationshipKind, RuleKind, Severity};
use crosswalk_common::{ControlId, CrosswalkResult, FrameworkId, RuleId};
use RelationshipKind::*;

fn cid(framework: &str, code: &str) -> CrosswalkResult<ControlId> {
    ControlId::scoped(&FrameworkId::new(framework)?, code)
}

fn link(
    id: &str,
    source: (&str, &str),
    target: (&str, &str),
    kind: RelationshipKind,
    confidence: f64,
) -> CrosswalkResult<Mapping> {
    Mapping::new(id, &cid(source.0, source.1)?, &cid(target.0, target.1)?, kind, confidence)
}

/// Built-in mappings
pub fn mappings() -> CrosswalkResult<Vec<Mapping>> {
    const ISO: &str = iso27001::ID;
    const SOC: &str = soc2::ID;
    const CSF: &str = nist_csf::ID;
    const E8: &str = essential_eight::ID;
    const GDPR: &str = gdpr::ID;

    Ok(vec![
        // ISO 27001 <-> SOC 2
        link("iso-soc2-access", (ISO, "A.5.15"), (SOC, "CC6.1"), Equivalent, 0.9)?
            .with_reverse(Equivalent, 0.9)?,
        link("iso-soc2-auth", (ISO, "A.8.5"), (SOC, "CC6.1"), Subset, 0.8)?,
        link("iso-soc2-malware", (ISO, "A.8.7"), (SOC, "CC6.8"), Equivalent, 0.95)?
            .with_reverse(Equivalent, 0.95)?,
        link("iso-soc2-vuln", (ISO, "A.8.8"), (SOC, "CC7.1"), Equivalent, 0.85)?
            .with_reverse(PartialOverlap, 0.7)?,
        link("iso-soc2-logging", (ISO, "A.8.15"), (SOC, "CC7.2"), PartialOverlap, 0.8)?,
        link("iso-soc2-incident", (ISO, "A.5.24"), (SOC, "CC7.4"), Equivalent, 0.9)?
            .with_reverse(Equivalent, 0.9)?,
        link("iso-soc2-backup", (ISO, "A.8.13"), (SOC, "A1.2"), Subset, 0.85)?,
        link("iso-soc2-crypto", (ISO, "A.8.24"), (SOC, "CC6.7"), PartialOverlap, 0.75)?,
        link("iso-soc2-awareness", (ISO, "A.6.3"), (SOC, "CC1.4"), PartialOverlap, 0.6)?,
        // ISO 27001 <-> NIST CSF
        link("iso-csf-policy", (ISO, "A.5.1"), (CSF, "GV.PO-01"), Equivalent, 0.9)?
            .with_reverse(Equivalent, 0.9)?,
        link("iso-csf-auth", (ISO, "A.8.5"), (CSF, "PR.AA-03"), Equivalent, 0.9)?
            .with_reverse(Equivalent, 0.9)?,
        link("iso-csf-access", (ISO, "A.5.15"), (CSF, "PR.AA-05"), Equivalent, 0.85)?,
        link("iso-csf-awareness", (ISO, "A.6.3"), (CSF, "PR.AT-01"), Equivalent, 0.95)?
            .with_reverse(Equivalent, 0.95)?,
        link("iso-csf-vuln", (ISO, "A.8.8"), (CSF, "ID.RA-01"), Subset, 0.8)?,
        link("iso-csf-backup", (ISO, "A.8.13"), (CSF, "PR.DS-11"), Equivalent, 0.95)?
            .with_reverse(Equivalent, 0.95)?,
        link("iso-csf-crypto", (ISO, "A.8.24"), (CSF, "PR.DS-01"), PartialOverlap, 0.7)?,
        link("iso-csf-incident", (ISO, "A.5.24"), (CSF, "RS.MA-01"), Equivalent, 0.85)?,
        // SOC 2 -> NIST CSF
        link("soc2-csf-monitoring", (SOC, "CC7.2"), (CSF, "DE.CM-01"), Equivalent, 0.85)?,
        link("soc2-csf-vuln", (SOC, "CC7.1"), (CSF, "ID.RA-01"), Equivalent, 0.85)?,
        // NIST CSF / ISO -> Essential Eight
        link("csf-e8-mfa", (CSF, "PR.AA-03"), (E8, "E8.7"), Subset, 0.7)?,
        link("csf-e8-privilege", (CSF, "PR.AA-05"), (E8, "E8.5"), PartialOverlap, 0.75)?,
        link("csf-e8-patch-os", (CSF, "PR.PS-02"), (E8, "E8.6"), Subset, 0.8)?,
        link("csf-e8-patch-apps", (CSF, "PR.PS-02"), (E8, "E8.2"), Subset, 0.8)?,
        link("iso-e8-backup", (ISO, "A.8.13"), (E8, "E8.8"), Equivalent, 0.9)?,
        link("iso-e8-malware", (ISO, "A.8.7"), (E8, "E8.1"), PartialOverlap, 0.6)?,
        // ISO 27001 / SOC 2 -> GDPR
        link("iso-gdpr-security", (ISO, "A.5.1"), (GDPR, "Art.32"), PartialOverlap, 0.7)?,
        link("iso-gdpr-crypto", (ISO, "A.8.24"), (GDPR, "Art.32.1a"), Equivalent, 0.85)?,
        link("iso-gdpr-breach", (ISO, "A.5.24"), (GDPR, "Art.33"), PartialOverlap, 0.7)?,
        link("soc2-gdpr-security", (SOC, "CC6.1"), (GDPR, "Art.32"), PartialOverlap, 0.65)?,
        // Long record retention cannot honour erasure requests for the same data
        link("gdpr-iso-erasure-records", (GDPR, "Art.17"), (ISO, "A.5.33"), Conflicting, 0.8)?,
    ])
}

/// Built-in conflict rules
pub fn rules() -> CrosswalkResult<Vec<ConflictRule>> {
    Ok(vec![
        ConflictRule {
            id: RuleId::new("retention-vs-storage-limitation")?,
            severity: Severity::High,
            rationale: "rule {rule}: {controls} require retention_days >= {min} but at most {max} \
                        on overlapping data scope"
                .into(),
            kind: RuleKind::ParameterRange {
                parameter: "retention_days".into(),
            },
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_self_framework_mappings() {
        for m in mappings().unwrap() {
            assert_ne!(m.source.framework_part(), m.target.framework_part(), "{}", m.id);
        }
    }

    #[test]
    fn test_conflicting_mappings_are_one_directional() {
        let conflicting: Vec<_> = mappings()
            .unwrap()
            .into_iter()
            .filter(|m| m.kind.is_conflicting())
            .collect();
        assert_eq!(conflicting.len(), 1);
        assert!(conflicting[0].reverse.is_none());
    }
}

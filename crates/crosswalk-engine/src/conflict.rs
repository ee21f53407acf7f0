//! Conflict Detector
//!
//! Interprets the conflict rules held in the knowledge graph. A rule is data
//! (`RuleKind` plus a rationale template); this module is the only place
//! that gives rule kinds meaning.
//!
//! Every rule is checked for well-formedness before any rule is evaluated.
//! One malformed rule fails the whole pass with `ConflictEngine`; a partial
//! conflict set is never returned.

use crosswalk_common::{AssessmentId, ControlId, CrosswalkError, CrosswalkResult, RuleId};
use crosswalk_graph::{
    Basis, ConflictFinding, ConflictRule, Control, Disposition, KnowledgeGraph, RuleKind, Verdict,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Values a rationale template may reference
#[derive(Debug, Default)]
struct TemplateValues<'a> {
    rule: &'a str,
    controls: String,
    parameter: Option<&'a str>,
    min: Option<f64>,
    max: Option<f64>,
}

/// Render a rationale template
///
/// Supported placeholders: `{rule}`, `{controls}`, and for parameter rules
/// `{parameter}`, `{min}`, `{max}`. `{{` and `}}` are literal braces.
fn render(template: &str, values: &TemplateValues<'_>) -> CrosswalkResult<String> {
    let malformed =
        |msg: String| CrosswalkError::conflict_engine(format!("rule {}: {}", values.rule, msg));
    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(malformed("unterminated placeholder in rationale".into()))
                        }
                    }
                }
                let value = match name.as_str() {
                    "rule" => Some(values.rule.to_string()),
                    "controls" => Some(values.controls.clone()),
                    "parameter" => values.parameter.map(str::to_string),
                    "min" => values.min.map(|v| v.to_string()),
                    "max" => values.max.map(|v| v.to_string()),
                    _ => return Err(malformed(format!("unknown placeholder {{{}}}", name))),
                };
                match value {
                    Some(v) => out.push_str(&v),
                    None => {
                        return Err(malformed(format!(
                            "placeholder {{{}}} is not available for this rule kind",
                            name
                        )))
                    }
                }
            }
            '}' => return Err(malformed("unbalanced '}' in rationale".into())),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Placeholder values used to dry-run a template for validation
fn sample_values(rule: &ConflictRule) -> TemplateValues<'_> {
    let mut values = TemplateValues {
        rule: rule.id.as_str(),
        controls: String::new(),
        ..Default::default()
    };
    if let RuleKind::ParameterRange { parameter } = &rule.kind {
        values.parameter = Some(parameter.as_str());
        values.min = Some(0.0);
        values.max = Some(0.0);
    }
    values
}

/// Check a rule's data before evaluation
pub fn validate_rule(rule: &ConflictRule) -> CrosswalkResult<()> {
    render(&rule.rationale, &sample_values(rule))?;
    match &rule.kind {
        RuleKind::ParameterRange { parameter } if parameter.trim().is_empty() => Err(
            CrosswalkError::conflict_engine(format!("rule {}: empty parameter name", rule.id)),
        ),
        RuleKind::MutuallyExclusive { controls } if controls.len() < 2 => Err(
            CrosswalkError::conflict_engine(format!("rule {}: fewer than two controls", rule.id)),
        ),
        _ => Ok(()),
    }
}

/// Conflict detector over one knowledge snapshot
pub struct ConflictDetector<'a> {
    knowledge: &'a KnowledgeGraph,
}

impl<'a> ConflictDetector<'a> {
    /// Create detector
    pub fn new(knowledge: &'a KnowledgeGraph) -> Self {
        Self { knowledge }
    }

    /// Evaluate every rule against the asserted controls
    ///
    /// A control is asserted when its verdict is implemented or partial and
    /// not dismissed as a gap, whether the assertion is direct or inferred.
    pub fn detect(
        &self,
        assessment: &AssessmentId,
        verdicts: &BTreeMap<ControlId, Verdict>,
    ) -> CrosswalkResult<Vec<ConflictFinding>> {
        let rules: Vec<&ConflictRule> = self.knowledge.rules().collect();
        for rule in &rules {
            validate_rule(rule)?;
        }

        let asserted: BTreeMap<&ControlId, &Verdict> = verdicts
            .iter()
            .filter(|(_, v)| v.asserted_state.is_asserted() && v.disposition != Disposition::Gap)
            .collect();

        let mut findings: BTreeMap<(RuleId, BTreeSet<ControlId>), ConflictFinding> =
            BTreeMap::new();
        for rule in rules {
            let fired = match &rule.kind {
                RuleKind::ConflictingMapping => self.conflicting_mappings(rule, &asserted)?,
                RuleKind::ParameterRange { parameter } => {
                    self.parameter_ranges(rule, parameter, &asserted)?
                }
                RuleKind::MutuallyExclusive { controls } => {
                    self.mutually_exclusive(rule, controls, &asserted)?
                }
            };
            for (controls, rationale) in fired {
                let key = (rule.id.clone(), controls.clone());
                if findings.contains_key(&key) {
                    continue;
                }
                let inferred = controls
                    .iter()
                    .any(|c| asserted.get(c).map_or(false, |v| v.basis == Basis::Inferred));
                findings.insert(
                    key,
                    ConflictFinding {
                        id: finding_id(assessment, &rule.id, &controls),
                        assessment: assessment.clone(),
                        rule: rule.id.clone(),
                        severity: rule.severity,
                        controls,
                        rationale,
                        inferred,
                    },
                );
            }
        }

        let findings: Vec<_> = findings.into_values().collect();
        if !findings.is_empty() {
            tracing::info!(assessment = %assessment, count = findings.len(), "conflicts detected");
        }
        Ok(findings)
    }

    fn conflicting_mappings(
        &self,
        rule: &ConflictRule,
        asserted: &BTreeMap<&ControlId, &Verdict>,
    ) -> CrosswalkResult<Vec<(BTreeSet<ControlId>, String)>> {
        let mut fired = Vec::new();
        for edge in self.knowledge.edges().iter().filter(|e| e.kind.is_conflicting()) {
            if asserted.contains_key(&edge.from) && asserted.contains_key(&edge.to) {
                let controls: BTreeSet<_> =
                    [edge.from.clone(), edge.to.clone()].into_iter().collect();
                let rationale = render(
                    &rule.rationale,
                    &TemplateValues {
                        rule: rule.id.as_str(),
                        controls: join(&controls),
                        ..Default::default()
                    },
                )?;
                fired.push((controls, rationale));
            }
        }
        Ok(fired)
    }

    fn parameter_ranges(
        &self,
        rule: &ConflictRule,
        parameter: &str,
        asserted: &BTreeMap<&ControlId, &Verdict>,
    ) -> CrosswalkResult<Vec<(BTreeSet<ControlId>, String)>> {
        let mut lower: Vec<(&Control, f64)> = Vec::new();
        let mut upper: Vec<(&Control, f64)> = Vec::new();
        for id in asserted.keys() {
            let Some(control) = self.knowledge.control(id) else {
                continue;
            };
            let Some(bound) = control.parameters.get(parameter) else {
                continue;
            };
            for (value, side) in [(bound.min, &mut lower), (bound.max, &mut upper)] {
                if let Some(v) = value {
                    if !v.is_finite() {
                        return Err(CrosswalkError::conflict_engine(format!(
                            "rule {}: control {} has non-finite bound for {}",
                            rule.id, control.id, parameter
                        )));
                    }
                    side.push((control, v));
                }
            }
        }

        let mut fired = Vec::new();
        for (low_ctl, min) in &lower {
            for (high_ctl, max) in &upper {
                if low_ctl.id == high_ctl.id || min <= max || !low_ctl.scope_overlaps(high_ctl) {
                    continue;
                }
                let controls: BTreeSet<_> =
                    [low_ctl.id.clone(), high_ctl.id.clone()].into_iter().collect();
                let rationale = render(
                    &rule.rationale,
                    &TemplateValues {
                        rule: rule.id.as_str(),
                        controls: join(&controls),
                        parameter: Some(parameter),
                        min: Some(*min),
                        max: Some(*max),
                    },
                )?;
                fired.push((controls, rationale));
            }
        }
        Ok(fired)
    }

    fn mutually_exclusive(
        &self,
        rule: &ConflictRule,
        listed: &[ControlId],
        asserted: &BTreeMap<&ControlId, &Verdict>,
    ) -> CrosswalkResult<Vec<(BTreeSet<ControlId>, String)>> {
        let hit: BTreeSet<ControlId> =
            listed.iter().filter(|c| asserted.contains_key(c)).cloned().collect();
        if hit.len() < 2 {
            return Ok(Vec::new());
        }
        let rationale = render(
            &rule.rationale,
            &TemplateValues {
                rule: rule.id.as_str(),
                controls: join(&hit),
                ..Default::default()
            },
        )?;
        Ok(vec![(hit, rationale)])
    }
}

fn join(controls: &BTreeSet<ControlId>) -> String {
    controls.iter().map(ControlId::as_str).collect::<Vec<_>>().join(", ")
}

fn finding_id(assessment: &AssessmentId, rule: &RuleId, controls: &BTreeSet<ControlId>) -> String {
    let digest = Sha256::digest(format!("{}|{}|{}", assessment, rule, join(controls)).as_bytes());
    format!("cf-{}", &hex::encode(digest)[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosswalk_common::{Confidence, FrameworkId};
    use crosswalk_graph::{
        ControlState, FrameworkDefinition, GraphStore, Mapping, ParameterBound, RelationshipKind,
        Severity,
    };
    use std::sync::Arc;

    fn fw(id: &str) -> FrameworkId {
        FrameworkId::new(id).unwrap()
    }

    fn cid(s: &str) -> ControlId {
        ControlId::new(s).unwrap()
    }

    fn store() -> GraphStore {
        let store = GraphStore::new();
        store.put_framework(FrameworkDefinition::new("x", "x", "1").unwrap()).unwrap();
        store.put_framework(FrameworkDefinition::new("z", "z", "1").unwrap()).unwrap();
        store.put_control(Control::new(&fw("x"), "C2", "C2", "t", 1.0).unwrap()).unwrap();
        store
            .put_control(
                Control::new(&fw("x"), "R1", "Keep records", "t", 1.0)
                    .unwrap()
                    .with_parameter("retention_days", ParameterBound::at_least(2555.0))
                    .with_scope("personal-data"),
            )
            .unwrap();
        store.put_control(Control::new(&fw("z"), "E1", "E1", "t", 1.0).unwrap()).unwrap();
        store
            .put_control(
                Control::new(&fw("z"), "R2", "Storage limit", "t", 1.0)
                    .unwrap()
                    .with_parameter("retention_days", ParameterBound::at_most(1095.0))
                    .with_scope("personal-data"),
            )
            .unwrap();
        store.publish_framework(&fw("x")).unwrap();
        store.publish_framework(&fw("z")).unwrap();
        let conflicting = RelationshipKind::Conflicting;
        let mapping = Mapping::new("m-conf", &cid("x/C2"), &cid("z/E1"), conflicting, 1.0)
            .and_then(|m| m.with_reverse(conflicting, 1.0))
            .unwrap();
        store.put_mapping(mapping).unwrap();
        store
    }

    fn verdict(id: &str, state: ControlState, disposition: Disposition) -> (ControlId, Verdict) {
        let control = cid(id);
        let framework = fw(control.framework_part());
        (
            control.clone(),
            Verdict {
                control,
                framework,
                criticality: 1.0,
                asserted_state: state,
                state,
                confidence: Confidence::new(0.9).unwrap(),
                basis: Basis::Direct,
                direct_confidence: Confidence::new(0.9).unwrap(),
                derived_confidence: Confidence::ZERO,
                evidence: vec![],
                provenance: None,
                disposition,
            },
        )
    }

    fn detect(
        store: &GraphStore,
        verdicts: BTreeMap<ControlId, Verdict>,
    ) -> CrosswalkResult<Vec<ConflictFinding>> {
        let k: Arc<KnowledgeGraph> = store.knowledge();
        ConflictDetector::new(&k).detect(&AssessmentId::new("a1").unwrap(), &verdicts)
    }

    #[test]
    fn test_render() {
        let values = TemplateValues {
            rule: "r1",
            controls: "a, b".into(),
            parameter: Some("retention_days"),
            min: Some(2555.0),
            max: Some(1095.0),
        };
        assert_eq!(
            render("{rule}: {controls} {parameter} {min}>{max} {{x}}", &values).unwrap(),
            "r1: a, b retention_days 2555>1095 {x}"
        );
        assert!(render("{nope}", &values).is_err());
        assert!(render("{rule", &values).is_err());
        assert!(render("a } b", &values).is_err());

        let no_params = TemplateValues {
            rule: "r1",
            ..Default::default()
        };
        assert!(matches!(render("{min}", &no_params), Err(CrosswalkError::ConflictEngine(_))));
    }

    #[test]
    fn test_conflicting_edge_fires_once() {
        let store = store();
        let verdicts = [
            verdict("x/C2", ControlState::Implemented, Disposition::AutoAccept),
            verdict("z/E1", ControlState::Implemented, Disposition::AutoAccept),
        ]
        .into_iter()
        .collect();
        let findings = detect(&store, verdicts).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].controls, [cid("x/C2"), cid("z/E1")].into_iter().collect());
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[0].id.starts_with("cf-"));
        assert!(findings[0].rationale.contains("x/C2, z/E1"));
    }

    #[test]
    fn test_gap_controls_do_not_conflict() {
        let store = store();
        let verdicts = [
            verdict("x/C2", ControlState::Implemented, Disposition::AutoAccept),
            verdict("z/E1", ControlState::Implemented, Disposition::Gap),
        ]
        .into_iter()
        .collect();
        assert!(detect(&store, verdicts).unwrap().is_empty());
    }

    #[test]
    fn test_parameter_range() {
        let store = store();
        store
            .put_conflict_rule(ConflictRule {
                id: RuleId::new("retention").unwrap(),
                severity: Severity::Medium,
                rationale: "{controls}: {parameter} needs >= {min} but <= {max}".into(),
                kind: RuleKind::ParameterRange {
                    parameter: "retention_days".into(),
                },
            })
            .unwrap();
        let verdicts = [
            verdict("x/R1", ControlState::Implemented, Disposition::AutoAccept),
            verdict("z/R2", ControlState::Partial, Disposition::Escalate),
        ]
        .into_iter()
        .collect();
        let findings = detect(&store, verdicts).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule.as_str(), "retention");
        assert_eq!(findings[0].rationale, "x/R1, z/R2: retention_days needs >= 2555 but <= 1095");
    }

    #[test]
    fn test_mutually_exclusive() {
        let store = store();
        store
            .put_conflict_rule(ConflictRule {
                id: RuleId::new("exclusive").unwrap(),
                severity: Severity::Low,
                rationale: "only one of {controls}".into(),
                kind: RuleKind::MutuallyExclusive {
                    controls: vec![cid("x/C2"), cid("z/R2"), cid("z/E1")],
                },
            })
            .unwrap();
        let verdicts = [
            verdict("x/C2", ControlState::Implemented, Disposition::AutoAccept),
            verdict("z/R2", ControlState::Implemented, Disposition::AutoAccept),
        ]
        .into_iter()
        .collect();
        let findings = detect(&store, verdicts).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].controls.len(), 2);
    }

    #[test]
    fn test_malformed_rule_fails_closed() {
        let store = store();
        store
            .put_conflict_rule(ConflictRule {
                id: RuleId::new("broken").unwrap(),
                severity: Severity::Low,
                rationale: "{controls} exceed {max}".into(),
                kind: RuleKind::ConflictingMapping,
            })
            .unwrap();
        // Fails even though nothing is asserted
        assert!(matches!(detect(&store, BTreeMap::new()), Err(CrosswalkError::ConflictEngine(_))));
    }
}

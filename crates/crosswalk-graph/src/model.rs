//! Reference Data Model
//!
//! Frameworks, controls, mappings and conflict rules. These are authored by
//! curation and shared read-only by every assessment.

use crosswalk_common::{
    Confidence, ControlId, CrosswalkError, CrosswalkResult, FrameworkId, MappingId, RuleId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Framework as supplied by curation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkDefinition {
    pub id: FrameworkId,
    pub name: String,
    pub version: String,
}

impl FrameworkDefinition {
    /// Create framework definition
    pub fn new(id: &str, name: &str, version: &str) -> CrosswalkResult<Self> {
        Ok(Self {
            id: FrameworkId::new(id)?,
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Framework held by the graph
///
/// Controls are listed in the order they were curated. Once published the
/// control list is frozen; a new version is a new framework id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub id: FrameworkId,
    pub name: String,
    pub version: String,
    pub controls: Vec<ControlId>,
    pub published: bool,
}

impl Framework {
    pub(crate) fn from_definition(def: FrameworkDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name,
            version: def.version,
            controls: Vec::new(),
            published: false,
        }
    }

    pub(crate) fn matches(&self, def: &FrameworkDefinition) -> bool {
        self.id == def.id && self.name == def.name && self.version == def.version
    }
}

/// Numeric bound a control places on a parameter (e.g. retention days)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ParameterBound {
    /// Lower bound only
    pub fn at_least(min: f64) -> Self {
        Self { min: Some(min), max: None }
    }

    /// Upper bound only
    pub fn at_most(max: f64) -> Self {
        Self { min: None, max: Some(max) }
    }
}

/// Control definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub id: ControlId,
    pub framework: FrameworkId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    /// Criticality weight used for coverage (0.0 - 1.0)
    pub criticality: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterBound>,
    /// Data/asset scope tags; empty means unscoped
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scope: BTreeSet<String>,
}

impl Control {
    /// Create control scoped to a framework
    pub fn new(
        framework: &FrameworkId,
        code: &str,
        name: &str,
        category: &str,
        criticality: f64,
    ) -> CrosswalkResult<Self> {
        let control = Self {
            id: ControlId::scoped(framework, code)?,
            framework: framework.clone(),
            name: name.to_string(),
            description: String::new(),
            category: category.to_string(),
            criticality,
            parameters: BTreeMap::new(),
            scope: BTreeSet::new(),
        };
        control.validate()?;
        Ok(control)
    }

    /// Set description
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Add a parameter bound
    pub fn with_parameter(mut self, name: &str, bound: ParameterBound) -> Self {
        self.parameters.insert(name.to_string(), bound);
        self
    }

    /// Add a scope tag
    pub fn with_scope(mut self, tag: &str) -> Self {
        self.scope.insert(tag.to_string());
        self
    }

    /// Check structural invariants
    pub fn validate(&self) -> CrosswalkResult<()> {
        if !self.id.belongs_to(&self.framework) {
            return Err(CrosswalkError::validation(format!(
                "control {} is not scoped to framework {}",
                self.id, self.framework
            )));
        }
        if self.criticality.is_nan() || !(0.0..=1.0).contains(&self.criticality) {
            return Err(CrosswalkError::validation(format!(
                "control {} criticality must be 0.0-1.0, got {}",
                self.id, self.criticality
            )));
        }
        if self.name.trim().is_empty() {
            return Err(CrosswalkError::validation(format!("control {} has no name", self.id)));
        }
        Ok(())
    }

    /// Whether two controls' scopes overlap (unscoped overlaps everything)
    pub fn scope_overlaps(&self, other: &Control) -> bool {
        self.scope.is_empty()
            || other.scope.is_empty()
            || self.scope.intersection(&other.scope).next().is_some()
    }
}

/// Relationship kind carried by a mapping edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    Equivalent,
    Subset,
    PartialOverlap,
    Conflicting,
}

impl RelationshipKind {
    /// Conflicting edges are reserved for the conflict detector
    pub fn is_conflicting(&self) -> bool {
        matches!(self, Self::Conflicting)
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equivalent => write!(f, "equivalent"),
            Self::Subset => write!(f, "subset"),
            Self::PartialOverlap => write!(f, "partial-overlap"),
            Self::Conflicting => write!(f, "conflicting"),
        }
    }
}

/// Relationship in the reverse direction of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverseRelation {
    pub kind: RelationshipKind,
    pub confidence: Confidence,
}

/// Curated mapping from a source control to a target control
///
/// A mapping is one-directional unless `reverse` is set, in which case the
/// target also relates back to the source with its own kind and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub source: ControlId,
    pub target: ControlId,
    pub kind: RelationshipKind,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<ReverseRelation>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

impl Mapping {
    /// Create one-directional mapping
    pub fn new(
        id: &str,
        source: &ControlId,
        target: &ControlId,
        kind: RelationshipKind,
        confidence: f64,
    ) -> CrosswalkResult<Self> {
        Ok(Self {
            id: MappingId::new(id)?,
            source: source.clone(),
            target: target.clone(),
            kind,
            confidence: Confidence::new(confidence)?,
            reverse: None,
            note: String::new(),
        })
    }

    /// Add the reverse relation
    pub fn with_reverse(
        mut self,
        kind: RelationshipKind,
        confidence: f64,
    ) -> CrosswalkResult<Self> {
        self.reverse = Some(ReverseRelation {
            kind,
            confidence: Confidence::new(confidence)?,
        });
        Ok(self)
    }

    /// Directed edges this mapping contributes to the graph
    pub fn edges(&self) -> impl Iterator<Item = MappingEdge> + '_ {
        let forward = MappingEdge {
            mapping: self.id.clone(),
            from: self.source.clone(),
            to: self.target.clone(),
            kind: self.kind,
            confidence: self.confidence,
            reversed: false,
        };
        let backward = self.reverse.map(|rev| MappingEdge {
            mapping: self.id.clone(),
            from: self.target.clone(),
            to: self.source.clone(),
            kind: rev.kind,
            confidence: rev.confidence,
            reversed: true,
        });
        std::iter::once(forward).chain(backward)
    }
}

/// Directed view of a mapping used for traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEdge {
    pub mapping: MappingId,
    pub from: ControlId,
    pub to: ControlId,
    pub kind: RelationshipKind,
    pub confidence: Confidence,
    /// True when this edge is the reverse half of its mapping
    pub reversed: bool,
}

/// Severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Conflict rule kind (tagged data evaluated by a fixed interpreter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Both endpoints of a conflicting mapping are asserted
    ConflictingMapping,
    /// One asserted control's minimum exceeds another's maximum on a shared
    /// parameter, with overlapping scope
    ParameterRange { parameter: String },
    /// At most one of the listed controls may be asserted
    MutuallyExclusive { controls: Vec<ControlId> },
}

/// Conflict rule definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub id: RuleId,
    pub severity: Severity,
    /// Rationale template; see the conflict detector for placeholders
    pub rationale: String,
    pub kind: RuleKind,
}

/// Id of the rule that evaluates conflicting mapping edges
pub const CONFLICTING_MAPPING_RULE: &str = RuleId::CONFLICTING_MAPPING;

impl ConflictRule {
    /// Default rule for conflicting mapping edges
    pub fn conflicting_mapping() -> Self {
        Self {
            id: RuleId::conflicting_mapping(),
            severity: Severity::High,
            rationale: "controls {controls} are curated as conflicting but both are asserted"
                .into(),
            kind: RuleKind::ConflictingMapping,
        }
    }
}

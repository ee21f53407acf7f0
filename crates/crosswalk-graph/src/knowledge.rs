//! Knowledge Graph - immutable snapshot of curated reference data
//!
//! Controls live in an arena indexed by `NodeIx`; mapping edges live in a
//! flat edge list and every node keeps the indices of its outbound and
//! inbound edges. Traversals walk indices, never references into the map,
//! so a bounded-hop walk over cyclic cross-framework data is a plain loop.
//!
//! Curation mutates a private copy and the store swaps the finished copy in
//! atomically; readers only ever see a complete snapshot.

use crate::model::*;
use crosswalk_common::{ControlId, CrosswalkError, CrosswalkResult, FrameworkId, MappingId, RuleId};
use std::collections::{BTreeMap, HashMap};

/// Index of a control node in the arena
pub type NodeIx = usize;
/// Index of a directed edge in the edge list
pub type EdgeIx = usize;

#[derive(Debug, Clone)]
struct ControlNode {
    control: Control,
    outbound: Vec<EdgeIx>,
    inbound: Vec<EdgeIx>,
}

/// Curated cross-framework graph
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    version: u64,
    frameworks: BTreeMap<FrameworkId, Framework>,
    nodes: Vec<ControlNode>,
    node_index: HashMap<ControlId, NodeIx>,
    mappings: BTreeMap<MappingId, Mapping>,
    edges: Vec<MappingEdge>,
    rules: BTreeMap<RuleId, ConflictRule>,
}

impl KnowledgeGraph {
    /// Create empty graph carrying the default conflicting-mapping rule
    pub fn new() -> Self {
        let default_rule = ConflictRule::conflicting_mapping();
        let mut rules = BTreeMap::new();
        rules.insert(default_rule.id.clone(), default_rule);
        Self {
            version: 0,
            frameworks: BTreeMap::new(),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            mappings: BTreeMap::new(),
            edges: Vec::new(),
            rules,
        }
    }

    /// Snapshot version (increments with every effective curation write)
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    // === Queries ===

    /// Get framework
    pub fn framework(&self, id: &FrameworkId) -> Option<&Framework> {
        self.frameworks.get(id)
    }

    /// All frameworks, ordered by id
    pub fn frameworks(&self) -> impl Iterator<Item = &Framework> {
        self.frameworks.values()
    }

    /// Get control
    pub fn control(&self, id: &ControlId) -> Option<&Control> {
        self.node_ix(id).map(|ix| &self.nodes[ix].control)
    }

    /// Arena index of a control
    pub fn node_ix(&self, id: &ControlId) -> Option<NodeIx> {
        self.node_index.get(id).copied()
    }

    /// Control at an arena index
    pub fn node(&self, ix: NodeIx) -> &Control {
        &self.nodes[ix].control
    }

    /// Number of control nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Controls of a framework in curated order
    pub fn controls_for(&self, framework: &FrameworkId) -> CrosswalkResult<Vec<&Control>> {
        let fw = self
            .frameworks
            .get(framework)
            .ok_or_else(|| CrosswalkError::not_found("framework", framework))?;
        Ok(fw
            .controls
            .iter()
            .filter_map(|id| self.control(id))
            .collect())
    }

    /// Get mapping
    pub fn mapping(&self, id: &MappingId) -> Option<&Mapping> {
        self.mappings.get(id)
    }

    /// All mappings, ordered by id
    pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.values()
    }

    /// Edge at an index
    pub fn edge(&self, ix: EdgeIx) -> &MappingEdge {
        &self.edges[ix]
    }

    /// All directed edges
    pub fn edges(&self) -> &[MappingEdge] {
        &self.edges
    }

    /// Outbound edge indices of a node
    pub fn outbound(&self, ix: NodeIx) -> &[EdgeIx] {
        &self.nodes[ix].outbound
    }

    /// Inbound edge indices of a node
    pub fn inbound(&self, ix: NodeIx) -> &[EdgeIx] {
        &self.nodes[ix].inbound
    }

    /// Outbound edges of a control
    pub fn edges_from(&self, id: &ControlId) -> CrosswalkResult<Vec<&MappingEdge>> {
        let ix = self
            .node_ix(id)
            .ok_or_else(|| CrosswalkError::not_found("control", id))?;
        Ok(self.nodes[ix].outbound.iter().map(|&e| &self.edges[e]).collect())
    }

    /// Inbound edges of a control
    pub fn edges_to(&self, id: &ControlId) -> CrosswalkResult<Vec<&MappingEdge>> {
        let ix = self
            .node_ix(id)
            .ok_or_else(|| CrosswalkError::not_found("control", id))?;
        Ok(self.nodes[ix].inbound.iter().map(|&e| &self.edges[e]).collect())
    }

    /// Get conflict rule
    pub fn rule(&self, id: &RuleId) -> Option<&ConflictRule> {
        self.rules.get(id)
    }

    /// All conflict rules, ordered by id
    pub fn rules(&self) -> impl Iterator<Item = &ConflictRule> {
        self.rules.values()
    }

    // === Curation (applied to a private copy by the store) ===

    /// Upsert a framework definition. Returns whether anything changed.
    pub(crate) fn put_framework(&mut self, def: FrameworkDefinition) -> CrosswalkResult<bool> {
        match self.frameworks.get_mut(&def.id) {
            Some(existing) if existing.matches(&def) => Ok(false),
            Some(existing) if existing.published => Err(CrosswalkError::validation(format!(
                "framework {} is published and immutable; publish a new version id instead",
                def.id
            ))),
            Some(existing) => {
                existing.name = def.name;
                existing.version = def.version;
                Ok(true)
            }
            None => {
                self.frameworks
                    .insert(def.id.clone(), Framework::from_definition(def));
                Ok(true)
            }
        }
    }

    /// Seal a framework's control list
    pub(crate) fn publish_framework(&mut self, id: &FrameworkId) -> CrosswalkResult<bool> {
        let fw = self
            .frameworks
            .get_mut(id)
            .ok_or_else(|| CrosswalkError::not_found("framework", id))?;
        if fw.published {
            return Ok(false);
        }
        if fw.controls.is_empty() {
            return Err(CrosswalkError::validation(format!(
                "framework {} has no controls to publish",
                id
            )));
        }
        fw.published = true;
        Ok(true)
    }

    /// Upsert a control into an unpublished framework
    pub(crate) fn put_control(&mut self, control: Control) -> CrosswalkResult<bool> {
        control.validate()?;
        let published = self
            .frameworks
            .get(&control.framework)
            .ok_or_else(|| {
                CrosswalkError::validation(format!(
                    "control {} references unknown framework {}",
                    control.id, control.framework
                ))
            })?
            .published;

        if let Some(ix) = self.node_ix(&control.id) {
            if self.nodes[ix].control == control {
                return Ok(false);
            }
            if published {
                return Err(CrosswalkError::validation(format!(
                    "framework {} is published; control {} cannot change",
                    control.framework, control.id
                )));
            }
            self.nodes[ix].control = control;
            return Ok(true);
        }

        if published {
            return Err(CrosswalkError::validation(format!(
                "framework {} is published; cannot add control {}",
                control.framework, control.id
            )));
        }

        let ix = self.nodes.len();
        self.node_index.insert(control.id.clone(), ix);
        if let Some(fw) = self.frameworks.get_mut(&control.framework) {
            fw.controls.push(control.id.clone());
        }
        self.nodes.push(ControlNode {
            control,
            outbound: Vec::new(),
            inbound: Vec::new(),
        });
        Ok(true)
    }

    /// Upsert a mapping keyed by its id
    pub(crate) fn put_mapping(&mut self, mapping: Mapping) -> CrosswalkResult<bool> {
        for endpoint in [&mapping.source, &mapping.target] {
            if self.node_ix(endpoint).is_none() {
                return Err(CrosswalkError::validation(format!(
                    "mapping {} references unknown control {}",
                    mapping.id, endpoint
                )));
            }
        }
        if mapping.source == mapping.target {
            return Err(CrosswalkError::validation(format!(
                "mapping {} maps control {} onto itself",
                mapping.id, mapping.source
            )));
        }
        if let Some(rev) = &mapping.reverse {
            if rev.kind.is_conflicting() != mapping.kind.is_conflicting() {
                return Err(CrosswalkError::validation(format!(
                    "mapping {} mixes conflicting and non-conflicting directions",
                    mapping.id
                )));
            }
        }
        if self.mappings.get(&mapping.id) == Some(&mapping) {
            return Ok(false);
        }
        self.mappings.insert(mapping.id.clone(), mapping);
        self.reindex_edges();
        Ok(true)
    }

    /// Upsert a conflict rule
    pub(crate) fn put_conflict_rule(&mut self, rule: ConflictRule) -> CrosswalkResult<bool> {
        if rule.rationale.trim().is_empty() {
            return Err(CrosswalkError::validation(format!("rule {} has no rationale", rule.id)));
        }
        match &rule.kind {
            RuleKind::ConflictingMapping => {}
            RuleKind::ParameterRange { parameter } => {
                if parameter.trim().is_empty() {
                    return Err(CrosswalkError::validation(format!(
                        "rule {} names no parameter",
                        rule.id
                    )));
                }
            }
            RuleKind::MutuallyExclusive { controls } => {
                let mut distinct = controls.clone();
                distinct.sort();
                distinct.dedup();
                if distinct.len() < 2 {
                    return Err(CrosswalkError::validation(format!(
                        "rule {} needs at least two distinct controls",
                        rule.id
                    )));
                }
                if let Some(unknown) = distinct.iter().find(|c| self.node_ix(c).is_none()) {
                    return Err(CrosswalkError::validation(format!(
                        "rule {} references unknown control {}",
                        rule.id, unknown
                    )));
                }
            }
        }
        if self.rules.get(&rule.id) == Some(&rule) {
            return Ok(false);
        }
        self.rules.insert(rule.id.clone(), rule);
        Ok(true)
    }

    fn reindex_edges(&mut self) {
        for node in &mut self.nodes {
            node.outbound.clear();
            node.inbound.clear();
        }
        self.edges = self.mappings.values().flat_map(|m| m.edges()).collect();
        for (ix, edge) in self.edges.iter().enumerate() {
            // Endpoints were validated on insert and controls are never removed
            if let Some(&from) = self.node_index.get(&edge.from) {
                self.nodes[from].outbound.push(ix);
            }
            if let Some(&to) = self.node_index.get(&edge.to) {
                self.nodes[to].inbound.push(ix);
            }
        }
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(id: &str) -> FrameworkId {
        FrameworkId::new(id).unwrap()
    }

    fn seeded() -> KnowledgeGraph {
        let mut g = KnowledgeGraph::new();
        g.put_framework(FrameworkDefinition::new("x", "X", "1").unwrap()).unwrap();
        g.put_framework(FrameworkDefinition::new("y", "Y", "1").unwrap()).unwrap();
        for (f, code) in [("x", "C1"), ("x", "C2"), ("y", "D1")] {
            g.put_control(Control::new(&fw(f), code, code, "test", 0.5).unwrap()).unwrap();
        }
        g
    }

    fn cid(s: &str) -> ControlId {
        ControlId::new(s).unwrap()
    }

    fn mapping(id: &str, from: &str, to: &str, kind: RelationshipKind, c: f64) -> Mapping {
        Mapping::new(id, &cid(from), &cid(to), kind, c).unwrap()
    }

    #[test]
    fn test_controls_in_curated_order() {
        let g = seeded();
        let controls = g.controls_for(&fw("x")).unwrap();
        let ids: Vec<_> = controls.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["x/C1", "x/C2"]);
        assert!(g.controls_for(&fw("nope")).is_err());
    }

    #[test]
    fn test_put_mapping_validates_endpoints() {
        let mut g = seeded();
        let bad = mapping("m1", "x/C1", "z/E1", RelationshipKind::Equivalent, 0.9);
        assert!(matches!(g.put_mapping(bad), Err(CrosswalkError::Validation(_))));

        let selfmap = mapping("m2", "x/C1", "x/C1", RelationshipKind::Equivalent, 0.9);
        assert!(g.put_mapping(selfmap).is_err());
    }

    #[test]
    fn test_adjacency_tracks_upserts() {
        let mut g = seeded();
        let m = mapping("m1", "x/C1", "y/D1", RelationshipKind::Equivalent, 0.9);
        assert!(g.put_mapping(m.clone()).unwrap());
        assert!(!g.put_mapping(m.clone()).unwrap());
        assert_eq!(g.edges_from(&cid("x/C1")).unwrap().len(), 1);
        assert_eq!(g.edges_to(&cid("y/D1")).unwrap().len(), 1);

        // Re-pointing the mapping moves the edge
        let moved = mapping("m1", "x/C2", "y/D1", RelationshipKind::Subset, 0.6);
        g.put_mapping(moved).unwrap();
        assert!(g.edges_from(&cid("x/C1")).unwrap().is_empty());
        assert_eq!(g.edges_from(&cid("x/C2")).unwrap()[0].kind, RelationshipKind::Subset);
    }

    #[test]
    fn test_reverse_edges_indexed() {
        let mut g = seeded();
        let m = Mapping::new("m1", &cid("x/C1"), &cid("y/D1"), RelationshipKind::Equivalent, 0.9)
            .unwrap()
            .with_reverse(RelationshipKind::PartialOverlap, 0.5)
            .unwrap();
        g.put_mapping(m).unwrap();
        let back = g.edges_from(&cid("y/D1")).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].to, cid("x/C1"));
        assert!(back[0].reversed);
    }

    #[test]
    fn test_mixed_conflicting_reverse_rejected() {
        let mut g = seeded();
        let m = Mapping::new("m1", &cid("x/C1"), &cid("y/D1"), RelationshipKind::Conflicting, 0.9)
            .unwrap()
            .with_reverse(RelationshipKind::Equivalent, 0.9)
            .unwrap();
        assert!(g.put_mapping(m).is_err());
    }

    #[test]
    fn test_published_framework_is_frozen() {
        let mut g = seeded();
        assert!(g.publish_framework(&fw("x")).unwrap());
        assert!(!g.publish_framework(&fw("x")).unwrap());

        let extra = Control::new(&fw("x"), "C3", "C3", "test", 0.5).unwrap();
        assert!(g.put_control(extra).is_err());

        let changed = Control::new(&fw("x"), "C1", "renamed", "test", 0.5).unwrap();
        assert!(g.put_control(changed).is_err());

        // Identical re-put stays idempotent
        let same = Control::new(&fw("x"), "C1", "C1", "test", 0.5).unwrap();
        assert!(!g.put_control(same).unwrap());

        let renamed = FrameworkDefinition::new("x", "X", "2").unwrap();
        assert!(g.put_framework(renamed).is_err());
    }

    #[test]
    fn test_publish_requires_controls() {
        let mut g = KnowledgeGraph::new();
        g.put_framework(FrameworkDefinition::new("empty", "Empty", "1").unwrap()).unwrap();
        assert!(g.publish_framework(&fw("empty")).is_err());
    }

    #[test]
    fn test_rule_validation() {
        let mut g = seeded();
        assert!(g.rule(&RuleId::new(CONFLICTING_MAPPING_RULE).unwrap()).is_some());

        let bad = ConflictRule {
            id: RuleId::new("r1").unwrap(),
            severity: Severity::Medium,
            rationale: "x".into(),
            kind: RuleKind::MutuallyExclusive { controls: vec![cid("x/C1"), cid("x/C1")] },
        };
        assert!(g.put_conflict_rule(bad).is_err());

        let unknown = ConflictRule {
            id: RuleId::new("r2").unwrap(),
            severity: Severity::Medium,
            rationale: "x".into(),
            kind: RuleKind::MutuallyExclusive { controls: vec![cid("x/C1"), cid("z/Q")] },
        };
        assert!(g.put_conflict_rule(unknown).is_err());

        let ok = ConflictRule {
            id: RuleId::new("r3").unwrap(),
            severity: Severity::Low,
            rationale: "{controls}".into(),
            kind: RuleKind::MutuallyExclusive { controls: vec![cid("x/C1"), cid("x/C2")] },
        };
        assert!(g.put_conflict_rule(ok).unwrap());
    }
}

//! Mapping Resolver
//!
//! Derives coverage of a target framework from controls asserted elsewhere.
//! Walks non-conflicting mapping edges from every seed with a bounded,
//! iterative depth-first search over the graph's node arena:
//!
//! ```text
//!   seed ──edge×factor──▶ intermediate ──edge×factor──▶ target control
//!   score = seed_confidence × Π(edge_confidence × kind_factor)
//! ```
//!
//! Every factor is ≤ 1, so a longer path never scores above its prefix.
//! A path ends at the first control of the target framework and never
//! revisits a node, so cycles between frameworks terminate on their own.

use crate::config::ResolverConfig;
use crosswalk_common::{Confidence, ControlId, CrosswalkError, CrosswalkResult, FrameworkId};
use crosswalk_graph::{ControlState, EdgeIx, Hop, KnowledgeGraph, NodeIx, Provenance, ReuseEntry};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Asserted control used as a starting point for inference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seed {
    pub state: ControlState,
    pub confidence: Confidence,
}

/// Best inference for one target control
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedScore {
    pub control: ControlId,
    /// State implied by the score thresholds, capped at partial when the
    /// seed itself is only partial
    pub state: ControlState,
    pub provenance: Provenance,
}

impl DerivedScore {
    /// Derived confidence
    pub fn score(&self) -> Confidence {
        self.provenance.score
    }
}

/// Inference results for one target framework
#[derive(Debug, Clone, PartialEq)]
pub struct FrameworkResolution {
    pub target: FrameworkId,
    pub derived: BTreeMap<ControlId, DerivedScore>,
}

impl FrameworkResolution {
    /// Derived result for a control
    pub fn get(&self, control: &ControlId) -> Option<&DerivedScore> {
        self.derived.get(control)
    }
}

struct Frame {
    node: NodeIx,
    score: f64,
    path: Vec<EdgeIx>,
    visited: Vec<NodeIx>,
}

struct Candidate {
    seed: ControlId,
    seed_state: ControlState,
    seed_confidence: Confidence,
    score: f64,
    path: Vec<EdgeIx>,
}

/// Mapping resolver over one knowledge snapshot
pub struct MappingResolver<'a> {
    knowledge: &'a KnowledgeGraph,
    config: &'a ResolverConfig,
}

impl<'a> MappingResolver<'a> {
    /// Create resolver
    pub fn new(knowledge: &'a KnowledgeGraph, config: &'a ResolverConfig) -> Self {
        Self { knowledge, config }
    }

    /// State implied by a derived score
    pub fn classify(&self, score: Confidence) -> ControlState {
        if score.value() >= self.config.implemented_threshold {
            ControlState::Implemented
        } else if score.value() >= self.config.partial_threshold {
            ControlState::Partial
        } else {
            ControlState::Gap
        }
    }

    /// Derive the target framework's controls from seeds outside it
    ///
    /// Seeds inside the target framework are ignored; they are direct
    /// evidence, not inference.
    pub fn resolve(
        &self,
        target: &FrameworkId,
        seeds: &BTreeMap<ControlId, Seed>,
    ) -> CrosswalkResult<FrameworkResolution> {
        if self.knowledge.framework(target).is_none() {
            return Err(CrosswalkError::not_found("framework", target));
        }

        let mut best: BTreeMap<NodeIx, Candidate> = BTreeMap::new();
        for (seed_id, seed) in seeds {
            if seed_id.belongs_to(target) || !seed.state.is_asserted() {
                continue;
            }
            let seed_ix = self
                .knowledge
                .node_ix(seed_id)
                .ok_or_else(|| CrosswalkError::not_found("control", seed_id))?;
            let in_target = |c: &ControlId| c.belongs_to(target);
            self.walk(seed_id, seed_ix, *seed, &in_target, false, &mut best);
        }

        let derived = best
            .into_values()
            .map(|c| self.finish(c))
            .map(|d| (d.control.clone(), d))
            .collect();
        Ok(FrameworkResolution {
            target: target.clone(),
            derived,
        })
    }

    /// Controls outside `targets` reached from the seeds by inference
    ///
    /// Paths stop at the first control of any target framework, as in
    /// `resolve`. These controls carry no coverage; they exist so conflicts
    /// introduced through intermediate frameworks are still evaluated.
    pub fn reachable(
        &self,
        targets: &[FrameworkId],
        seeds: &BTreeMap<ControlId, Seed>,
    ) -> CrosswalkResult<BTreeMap<ControlId, DerivedScore>> {
        let is_target = |c: &ControlId| targets.iter().any(|t| c.belongs_to(t));
        let mut best: BTreeMap<NodeIx, Candidate> = BTreeMap::new();
        for (seed_id, seed) in seeds.iter().filter(|(_, s)| s.state.is_asserted()) {
            let seed_ix = self
                .knowledge
                .node_ix(seed_id)
                .ok_or_else(|| CrosswalkError::not_found("control", seed_id))?;
            self.walk(seed_id, seed_ix, *seed, &is_target, true, &mut best);
        }
        Ok(best
            .into_values()
            .map(|c| self.finish(c))
            .map(|d| (d.control.clone(), d))
            .collect())
    }

    /// Depth-first walk from one seed
    ///
    /// Controls matching `stop` end a path and are recorded. With
    /// `record_between` set, the controls a path passes through are recorded
    /// instead and stopping controls are not.
    fn walk(
        &self,
        seed_id: &ControlId,
        seed_ix: NodeIx,
        seed: Seed,
        stop: &dyn Fn(&ControlId) -> bool,
        record_between: bool,
        best: &mut BTreeMap<NodeIx, Candidate>,
    ) {
        let mut stack = vec![Frame {
            node: seed_ix,
            score: seed.confidence.value(),
            path: Vec::new(),
            visited: vec![seed_ix],
        }];

        while let Some(frame) = stack.pop() {
            for &edge_ix in self.knowledge.outbound(frame.node) {
                let edge = self.knowledge.edge(edge_ix);
                let Some(factor) = self.config.kind_factors.factor(edge.kind) else {
                    continue;
                };
                let Some(next) = self.knowledge.node_ix(&edge.to) else {
                    continue;
                };
                if frame.visited.contains(&next) {
                    continue;
                }

                let score = frame.score * edge.confidence.value() * factor;
                let mut path = frame.path.clone();
                path.push(edge_ix);
                let stopped = stop(&edge.to);

                if stopped != record_between {
                    let candidate = Candidate {
                        seed: seed_id.clone(),
                        seed_state: seed.state,
                        seed_confidence: seed.confidence,
                        score,
                        path: path.clone(),
                    };
                    let preferred = best
                        .get(&next)
                        .map_or(true, |current| self.rank(&candidate, current) == Ordering::Less);
                    if preferred {
                        best.insert(next, candidate);
                    }
                }
                if !stopped && path.len() < self.config.max_hops {
                    let mut visited = frame.visited.clone();
                    visited.push(next);
                    stack.push(Frame { node: next, score, path, visited });
                }
            }
        }
    }

    /// `Less` when `a` is preferred over `b`: higher score, then fewer hops,
    /// then lexicographically smaller seed and mapping ids
    fn rank(&self, a: &Candidate, b: &Candidate) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.path.len().cmp(&b.path.len()))
            .then_with(|| a.seed.cmp(&b.seed))
            .then_with(|| {
                let ids = |c: &Candidate| -> Vec<_> {
                    c.path.iter().map(|&e| self.knowledge.edge(e).mapping.clone()).collect()
                };
                ids(a).cmp(&ids(b))
            })
    }

    fn finish(&self, candidate: Candidate) -> DerivedScore {
        let hops: Vec<Hop> = candidate
            .path
            .iter()
            .map(|&e| {
                let edge = self.knowledge.edge(e);
                Hop {
                    mapping: edge.mapping.clone(),
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    kind: edge.kind,
                    edge_confidence: edge.confidence,
                    // Conflicting edges never enter a path
                    kind_factor: self.config.kind_factors.factor(edge.kind).unwrap_or(0.0),
                }
            })
            .collect();
        let control = hops
            .last()
            .map(|h| h.to.clone())
            .unwrap_or_else(|| candidate.seed.clone());
        let score = Confidence::clamped(candidate.score);
        let mut state = self.classify(score);
        if candidate.seed_state == ControlState::Partial && state == ControlState::Implemented {
            state = ControlState::Partial;
        }
        DerivedScore {
            control,
            state,
            provenance: Provenance {
                seed: candidate.seed,
                seed_confidence: candidate.seed_confidence,
                hops,
                score,
            },
        }
    }

    /// Coverage of `target` obtainable from the controls of `source` alone
    ///
    /// A target control counts when its derived state is implemented.
    pub fn reuse(
        &self,
        source: &FrameworkId,
        target: &FrameworkId,
        seeds: &BTreeMap<ControlId, Seed>,
    ) -> CrosswalkResult<ReuseEntry> {
        let from_source: BTreeMap<_, _> = seeds
            .iter()
            .filter(|(id, _)| id.belongs_to(source))
            .map(|(id, seed)| (id.clone(), *seed))
            .collect();
        let resolution = self.resolve(target, &from_source)?;

        let mut total = 0.0;
        let mut satisfied = 0.0;
        let mut satisfied_controls = 0;
        for control in self.knowledge.controls_for(target)? {
            total += control.criticality;
            if resolution
                .get(&control.id)
                .map_or(false, |d| d.state == ControlState::Implemented)
            {
                satisfied += control.criticality;
                satisfied_controls += 1;
            }
        }
        Ok(ReuseEntry {
            source: source.clone(),
            target: target.clone(),
            satisfied_controls,
            coverage_percent: if total > 0.0 { satisfied / total * 100.0 } else { 0.0 },
        })
    }
}

//! Crosswalk Graph - cross-framework control graph and assessment state
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         GraphStore                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ArcSwap<KnowledgeGraph>         DashMap<AssessmentId, ..>   │
//! │  ┌────────────────────────┐      ┌────────────────────────┐  │
//! │  │ frameworks  (sealed)   │      │ phase gate (RwLock)    │  │
//! │  │ control arena + edges  │      │ ControlStatus (Mutex)  │  │
//! │  │ conflict rules         │      │ review states          │  │
//! │  └────────────────────────┘      └────────────────────────┘  │
//! │   shared, read-only, versioned    keyed per assessment       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reference data is curated through the store (or in bulk from a
//! `CatalogBundle`) and read as immutable snapshots. Each assessment owns its
//! control statuses; nothing mutable is shared between assessments.

#![warn(clippy::all)]

pub mod assessment;
pub mod catalog;
pub mod knowledge;
pub mod model;
pub mod outcome;
pub mod store;

pub use assessment::{
    AssessmentPhase, ControlState, ControlStatus, EvidenceClaim, EvidenceRecord, EvidenceSubmission,
    ExtractedEvidence, LocationSpan, RecordOutcome, ReviewOverride,
};
pub use catalog::CatalogBundle;
pub use knowledge::{EdgeIx, KnowledgeGraph, NodeIx};
pub use model::{
    ConflictRule, Control, Framework, FrameworkDefinition, Mapping, MappingEdge, ParameterBound,
    RelationshipKind, ReverseRelation, RuleKind, Severity, CONFLICTING_MAPPING_RULE,
};
pub use outcome::{
    AssessmentOutcome, Basis, ConflictFinding, CoverageSummary, Disposition, EscalationItem,
    EscalationSubject, Hop, Provenance, ReasonCode, Resolution, ReuseEntry, ReviewState, Verdict,
};
pub use store::{
    AssessmentSnapshot, BundleSummary, FinalizeStart, FrameworkControls, GraphStore, StatusUpdate,
};

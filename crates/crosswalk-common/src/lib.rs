//! Crosswalk Common - shared primitives for the cross-framework compliance graph
//!
//! This crate provides:
//! - Validated identifiers for frameworks, controls, mappings, rules, evidence
//!   and assessments
//! - The `Confidence` value object and its monotonic combination functions
//! - The error taxonomy shared by every crate in the workspace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod confidence;
pub mod error;
pub mod ids;

pub use confidence::Confidence;
pub use error::{CrosswalkError, CrosswalkResult};
pub use ids::{AssessmentId, ControlId, EscalationId, EvidenceId, FrameworkId, MappingId, RuleId};

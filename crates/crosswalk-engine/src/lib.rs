//! Crosswalk Engine - cross-framework coverage, conflicts and escalation
//!
//! # Finalize pipeline
//!
//! ```text
//! ┌────────────┐   ┌────────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  snapshot  │──▶│ MappingResolver│──▶│  aggregate + │──▶│   Conflict   │
//! │ (computing)│   │ bounded-hop    │   │  partition   │   │   Detector   │
//! └────────────┘   └────────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 ▼
//!                    ┌────────────┐     ┌──────────────────────────────────┐
//!                    │ finalized  │◀────│ EscalationEngine (review queue)  │
//!                    └────────────┘     └──────────────────────────────────┘
//! ```
//!
//! Any failed or cancelled pass returns the assessment to `open`.
//!
//! # Example
//!
//! ```no_run
//! use crosswalk_engine::{CrosswalkEngine, EngineConfig};
//! use crosswalk_common::{ControlId, FrameworkId};
//! use crosswalk_graph::EvidenceSubmission;
//!
//! # fn main() -> crosswalk_common::CrosswalkResult<()> {
//! let engine = CrosswalkEngine::with_builtin_catalog(EngineConfig::default())?;
//! let session = engine.create_assessment(&[
//!     FrameworkId::new("iso27001-2022")?,
//!     FrameworkId::new("soc2-2017")?,
//! ])?;
//! session.submit(
//!     &ControlId::new("iso27001-2022/A.5.15")?,
//!     EvidenceSubmission::new("ev-1", "access-policy.pdf", 0.93)?,
//! )?;
//! let report = session.finalize().and_then(|_| session.report())?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod conflict;
pub mod escalation;
pub mod report;
pub mod resolver;
pub mod session;

pub use audit::{AuditEvent, AuditEventType, AuditFilter, AuditTrail, ExportFormat, IntegrityResult};
pub use config::{EngineConfig, EscalationPolicy, KindFactors, ResolverConfig, ReviewerRoles};
pub use conflict::{validate_rule, ConflictDetector};
pub use escalation::{aggregate, EscalationEngine};
pub use report::{AssessmentReport, EscalationView, GapEntry};
pub use resolver::{DerivedScore, FrameworkResolution, MappingResolver, Seed};
pub use session::{AssessmentSession, CancelToken, CrosswalkEngine};

//! Identifiers - validated, immutable value objects
//!
//! Every id is:
//! - Non-empty
//! - At most 128 characters
//! - Alphanumeric plus `-`, `_`, `.` and `:`
//!
//! Control ids are additionally scoped to their framework
//! (`<framework>/<code>`), so the same control code may exist in two
//! frameworks without clashing.

use crate::error::{CrosswalkError, CrosswalkResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_ID_LEN: usize = 128;

fn validate_token(kind: &str, value: &str) -> CrosswalkResult<()> {
    if value.is_empty() {
        return Err(CrosswalkError::validation(format!("{} cannot be empty", kind)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(CrosswalkError::validation(format!(
            "{} exceeds {} characters",
            kind, MAX_ID_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(CrosswalkError::validation(format!(
            "{} '{}' contains invalid characters",
            kind, value
        )));
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create with validation
            pub fn new(id: impl Into<String>) -> CrosswalkResult<Self> {
                let id = id.into();
                validate_token($kind, &id)?;
                Ok(Self(id))
            }

            /// Get inner value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CrosswalkError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

string_id!(
    /// Framework identifier, including its version (e.g. `iso27001-2022`)
    FrameworkId,
    "framework id"
);
string_id!(
    /// Mapping identifier (curated natural key)
    MappingId,
    "mapping id"
);
string_id!(
    /// Conflict rule identifier
    RuleId,
    "rule id"
);
string_id!(
    /// Evidence identifier assigned by the extractor
    EvidenceId,
    "evidence id"
);
string_id!(
    /// Escalation item identifier
    EscalationId,
    "escalation id"
);
string_id!(
    /// Assessment identifier
    AssessmentId,
    "assessment id"
);

impl RuleId {
    /// Id of the built-in rule that evaluates conflicting mapping edges
    pub const CONFLICTING_MAPPING: &'static str = "builtin.conflicting-mapping";

    /// The built-in conflicting-mapping rule id
    pub fn conflicting_mapping() -> Self {
        Self(Self::CONFLICTING_MAPPING.to_string())
    }
}

impl AssessmentId {
    /// Generate a fresh random assessment id
    pub fn generate() -> Self {
        Self(format!("asmt-{}", uuid::Uuid::new_v4()))
    }
}

/// Control identifier, scoped to a framework
///
/// # Invariants
/// - Formatted as `<framework>/<code>`
/// - Both parts satisfy the id token rules
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlId(String);

impl ControlId {
    /// Build a control id from its framework and framework-local code
    pub fn scoped(framework: &FrameworkId, code: &str) -> CrosswalkResult<Self> {
        validate_token("control code", code)?;
        Ok(Self(format!("{}/{}", framework, code)))
    }

    /// Parse a fully qualified control id
    pub fn new(id: impl Into<String>) -> CrosswalkResult<Self> {
        let id = id.into();
        match id.split_once('/') {
            Some((framework, code)) => {
                validate_token("framework id", framework)?;
                validate_token("control code", code)?;
                Ok(Self(id))
            }
            None => Err(CrosswalkError::validation(format!(
                "control id '{}' must be <framework>/<code>",
                id
            ))),
        }
    }

    /// Framework part of the id
    pub fn framework_part(&self) -> &str {
        self.0.split_once('/').map(|(f, _)| f).unwrap_or_default()
    }

    /// Framework-local code
    pub fn code(&self) -> &str {
        self.0.split_once('/').map(|(_, c)| c).unwrap_or_default()
    }

    /// Whether the id belongs to the given framework
    pub fn belongs_to(&self, framework: &FrameworkId) -> bool {
        self.framework_part() == framework.as_str()
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ControlId {
    type Error = CrosswalkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ControlId> for String {
    fn from(id: ControlId) -> String {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_id_validation() {
        assert!(FrameworkId::new("iso27001-2022").is_ok());
        assert!(FrameworkId::new("").is_err());
        assert!(FrameworkId::new("nist csf").is_err());
        assert!(FrameworkId::new("a".repeat(129)).is_err());
    }

    #[test]
    fn test_control_id_scoping() {
        let fw = FrameworkId::new("soc2-2017").unwrap();
        let id = ControlId::scoped(&fw, "CC6.1").unwrap();
        assert_eq!(id.as_str(), "soc2-2017/CC6.1");
        assert_eq!(id.framework_part(), "soc2-2017");
        assert_eq!(id.code(), "CC6.1");
        assert!(id.belongs_to(&fw));
        assert!(!id.belongs_to(&FrameworkId::new("gdpr-2016").unwrap()));
    }

    #[test]
    fn test_control_id_parse() {
        assert!(ControlId::new("gdpr-2016/Art.17").is_ok());
        assert!(ControlId::new("Art.17").is_err());
        assert!(ControlId::new("gdpr-2016/").is_err());
        assert!(ControlId::new("gdpr-2016/Art/17").is_err());
    }

    #[test]
    fn test_id_serde_validates() {
        let ok: Result<MappingId, _> = serde_json::from_str("\"m-1\"");
        assert!(ok.is_ok());
        let bad: Result<MappingId, _> = serde_json::from_str("\"m 1\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_builtin_rule_id_is_valid() {
        let parsed = RuleId::new(RuleId::CONFLICTING_MAPPING).unwrap();
        assert_eq!(parsed, RuleId::conflicting_mapping());
    }

    #[test]
    fn test_generated_assessment_ids_unique() {
        assert_ne!(AssessmentId::generate(), AssessmentId::generate());
    }
}

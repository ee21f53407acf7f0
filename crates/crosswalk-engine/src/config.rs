//! Engine Configuration
//!
//! Thresholds are organization policy, so they come from configuration. Every
//! load path ends in `validate()`.

use crosswalk_common::{CrosswalkError, CrosswalkResult};
use crosswalk_graph::{ReasonCode, RelationshipKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Relationship-kind factors applied per hop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindFactors {
    pub equivalent: f64,
    pub subset: f64,
    pub partial_overlap: f64,
}

impl Default for KindFactors {
    fn default() -> Self {
        Self {
            equivalent: 1.0,
            subset: 0.5,
            partial_overlap: 0.5,
        }
    }
}

impl KindFactors {
    /// Factor for a kind; `None` for conflicting, which never carries coverage
    #[inline]
    pub fn factor(&self, kind: RelationshipKind) -> Option<f64> {
        match kind {
            RelationshipKind::Equivalent => Some(self.equivalent),
            RelationshipKind::Subset => Some(self.subset),
            RelationshipKind::PartialOverlap => Some(self.partial_overlap),
            RelationshipKind::Conflicting => None,
        }
    }
}

/// Mapping resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Longest inference path, in edges
    pub max_hops: usize,
    pub implemented_threshold: f64,
    pub partial_threshold: f64,
    pub kind_factors: KindFactors,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hops: 2,
            implemented_threshold: 0.75,
            partial_threshold: 0.40,
            kind_factors: KindFactors::default(),
        }
    }
}

/// Reviewer role required per reason code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerRoles {
    pub low_extraction_confidence: String,
    pub inferred_coverage: String,
    pub transitive_inference: String,
}

impl Default for ReviewerRoles {
    fn default() -> Self {
        Self {
            low_extraction_confidence: "control-owner".into(),
            inferred_coverage: "compliance-analyst".into(),
            transitive_inference: "lead-auditor".into(),
        }
    }
}

impl ReviewerRoles {
    /// Role for a reason
    pub fn role_for(&self, reason: ReasonCode) -> &str {
        match reason {
            ReasonCode::LowExtractionConfidence => &self.low_extraction_confidence,
            ReasonCode::InferredCoverage => &self.inferred_coverage,
            ReasonCode::TransitiveInference => &self.transitive_inference,
        }
    }
}

/// Escalation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Below this an assertion is a gap
    pub review_floor: f64,
    /// At or above this an assertion is auto-accepted
    pub auto_accept_ceiling: f64,
    pub reviewer_roles: ReviewerRoles,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            review_floor: 0.5,
            auto_accept_ceiling: 0.85,
            reviewer_roles: ReviewerRoles::default(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub escalation: EscalationPolicy,
}

impl EngineConfig {
    /// Parse TOML and validate
    pub fn from_toml_str(content: &str) -> CrosswalkResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CrosswalkError::config(format!("invalid TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON and validate
    pub fn from_json_str(content: &str) -> CrosswalkResult<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| CrosswalkError::config(format!("invalid JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file; `.toml` is read as TOML, anything else as JSON
    pub fn load(path: impl AsRef<Path>) -> CrosswalkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CrosswalkError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&content)?,
            _ => Self::from_json_str(&content)?,
        };
        tracing::info!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> CrosswalkResult<String> {
        toml::to_string_pretty(self).map_err(|e| CrosswalkError::config(e.to_string()))
    }

    /// Check every threshold
    pub fn validate(&self) -> CrosswalkResult<()> {
        let r = &self.resolver;
        if !(1..=4).contains(&r.max_hops) {
            return Err(CrosswalkError::config(format!("max_hops must be 1-4, got {}", r.max_hops)));
        }
        unit_interval("implemented_threshold", r.implemented_threshold)?;
        unit_interval("partial_threshold", r.partial_threshold)?;
        if r.partial_threshold >= r.implemented_threshold {
            return Err(CrosswalkError::config(format!(
                "partial_threshold {} must be below implemented_threshold {}",
                r.partial_threshold, r.implemented_threshold
            )));
        }
        for (name, factor) in [
            ("equivalent", r.kind_factors.equivalent),
            ("subset", r.kind_factors.subset),
            ("partial_overlap", r.kind_factors.partial_overlap),
        ] {
            if factor.is_nan() || factor <= 0.0 || factor > 1.0 {
                return Err(CrosswalkError::config(format!(
                    "kind factor {} must be in (0, 1], got {}",
                    name, factor
                )));
            }
        }

        let e = &self.escalation;
        unit_interval("review_floor", e.review_floor)?;
        unit_interval("auto_accept_ceiling", e.auto_accept_ceiling)?;
        if e.review_floor >= e.auto_accept_ceiling {
            return Err(CrosswalkError::config(format!(
                "review_floor {} must be below auto_accept_ceiling {}",
                e.review_floor, e.auto_accept_ceiling
            )));
        }
        for reason in [
            ReasonCode::LowExtractionConfidence,
            ReasonCode::InferredCoverage,
            ReasonCode::TransitiveInference,
        ] {
            if e.reviewer_roles.role_for(reason).trim().is_empty() {
                return Err(CrosswalkError::config(format!("no reviewer role for {:?}", reason)));
            }
        }
        Ok(())
    }
}

fn unit_interval(name: &str, value: f64) -> CrosswalkResult<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(CrosswalkError::config(format!("{} must be 0.0-1.0, got {}", name, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.resolver.max_hops, 2);
        assert_eq!(config.escalation.auto_accept_ceiling, 0.85);
        assert_eq!(config.resolver.kind_factors.factor(RelationshipKind::Conflicting), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [escalation]
            review_floor = 0.6

            [escalation.reviewer_roles]
            transitive_inference = "ciso"
            "#,
        )
        .unwrap();
        assert_eq!(config.escalation.review_floor, 0.6);
        assert_eq!(config.escalation.auto_accept_ceiling, 0.85);
        let roles = &config.escalation.reviewer_roles;
        assert_eq!(roles.role_for(ReasonCode::TransitiveInference), "ciso");
        assert_eq!(roles.role_for(ReasonCode::InferredCoverage), "compliance-analyst");
    }

    #[test]
    fn test_invalid_thresholds() {
        let bad = [
            "[resolver]\nmax_hops = 0",
            "[resolver]\nmax_hops = 9",
            "[resolver]\npartial_threshold = 0.8",
            "[resolver.kind_factors]\nsubset = 0.0",
            "[escalation]\nreview_floor = 0.9",
            "[escalation]\nauto_accept_ceiling = 1.5",
        ];
        for content in bad {
            assert!(
                matches!(EngineConfig::from_toml_str(content), Err(CrosswalkError::Config(_))),
                "{}",
                content
            );
        }
    }

    #[test]
    fn test_ceiling_of_one_is_loadable() {
        // Rejected later, and only when inference is present
        let config =
            EngineConfig::from_toml_str("[escalation]\nauto_accept_ceiling = 1.0").unwrap();
        assert_eq!(config.escalation.auto_accept_ceiling, 1.0);
    }

    #[test]
    fn test_load_by_extension() {
        let mut toml_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        toml_file.write_all(b"[resolver]\nmax_hops = 3\n").unwrap();
        assert_eq!(EngineConfig::load(toml_file.path()).unwrap().resolver.max_hops, 3);

        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json_file
            .write_all(br#"{"escalation": {"auto_accept_ceiling": 0.9}}"#)
            .unwrap();
        let config = EngineConfig::load(json_file.path()).unwrap();
        assert_eq!(config.escalation.auto_accept_ceiling, 0.9);
        assert_eq!(config.resolver.max_hops, 2);

        assert!(EngineConfig::load("/nonexistent/crosswalk.toml").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&rendered).unwrap(), config);
    }
}

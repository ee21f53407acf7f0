//! Reference Data Catalog
//!
//! A `CatalogBundle` is the unit of bulk curation: frameworks, controls,
//! mappings and conflict rules loaded together and applied all-or-nothing.
//! The built-in bundle seeds five frameworks and the crosswalk between them.

pub mod essential_eight;
pub mod gdpr;
pub mod iso27001;
pub mod mappings;
pub mod nist_csf;
pub mod soc2;

use crate::model::{ConflictRule, Control, FrameworkDefinition, Mapping};
use crosswalk_common::{CrosswalkError, CrosswalkResult, FrameworkId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Bulk reference-data load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogBundle {
    #[serde(default)]
    pub frameworks: Vec<FrameworkDefinition>,
    #[serde(default)]
    pub controls: Vec<Control>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub rules: Vec<ConflictRule>,
}

impl CatalogBundle {
    /// Parse a bundle from JSON
    pub fn from_json_str(json: &str) -> CrosswalkResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CrosswalkError::validation(format!("invalid catalog bundle: {}", e)))
    }

    /// Read a bundle from a JSON file
    pub fn load(path: impl AsRef<Path>) -> CrosswalkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CrosswalkError::validation(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> CrosswalkResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CrosswalkError::validation(format!("cannot encode catalog bundle: {}", e)))
    }

    /// Append another bundle's contents
    pub fn merge(&mut self, other: CatalogBundle) {
        self.frameworks.extend(other.frameworks);
        self.controls.extend(other.controls);
        self.mappings.extend(other.mappings);
        self.rules.extend(other.rules);
    }

    /// Built-in catalog: ISO 27001:2022, SOC 2, NIST CSF 2.0, Essential Eight
    /// and GDPR with curated mappings and conflict rules
    pub fn builtin() -> CrosswalkResult<Self> {
        let mut bundle = Self::default();
        for (definition, controls) in [
            (iso27001::definition()?, iso27001::controls()?),
            (soc2::definition()?, soc2::controls()?),
            (nist_csf::definition()?, nist_csf::controls()?),
            (essential_eight::definition()?, essential_eight::controls()?),
            (gdpr::definition()?, gdpr::controls()?),
        ] {
            bundle.frameworks.push(definition);
            bundle.controls.extend(controls);
        }
        bundle.mappings = mappings::mappings()?;
        bundle.rules = mappings::rules()?;
        Ok(bundle)
    }
}

/// Shorthand used by the framework modules
pub(crate) fn control(
    framework: &FrameworkId,
    code: &str,
    name: &str,
    description: &str,
    category: &str,
    criticality: f64,
) -> CrosswalkResult<Control> {
    Ok(Control::new(framework, code, name, category, criticality)?.with_description(description))
}

//! GDPR (EU 2016/679)

use super::control;
use crate::model::{Control, FrameworkDefinition, ParameterBound};
use crosswalk_common::{CrosswalkResult, FrameworkId};

/// Framework id
pub const ID: &str = "gdpr-2016";

/// Framework definition
pub fn definition() -> CrosswalkResult<FrameworkDefinition> {
    FrameworkDefinition::new(ID, "General Data Protection Regulation", "2016/679")
}

/// Articles treated as controls
pub fn controls() -> CrosswalkResult<Vec<Control>> {
    let fw = FrameworkId::new(ID)?;
    Ok(vec![
        // Storage limitation
        control(&fw, "Art.5.1e", "Storage Limitation",
            "Personal data is kept no longer than necessary for its purposes", "Principles", 0.9)?
            .with_parameter("retention_days", ParameterBound::at_most(1095.0))
            .with_scope("personal-data"),
        control(&fw, "Art.17", "Right to Erasure",
            "Data subjects can obtain erasure of personal data without undue delay",
            "Data Subject Rights", 0.8)?
            .with_scope("personal-data"),
        control(&fw, "Art.25", "Data Protection by Design",
            "Appropriate technical measures implement data-protection principles by design",
            "Controller Obligations", 0.7)?,
        control(&fw, "Art.30", "Records of Processing",
            "Records of processing activities are maintained", "Controller Obligations", 0.6)?,
        control(&fw, "Art.32", "Security of Processing",
            "Appropriate technical and organisational security measures are implemented",
            "Security", 1.0)?,
        control(&fw, "Art.32.1a", "Pseudonymisation and Encryption",
            "Personal data is pseudonymised and encrypted where appropriate", "Security", 0.8)?
            .with_scope("personal-data"),
        control(&fw, "Art.33", "Breach Notification",
            "Personal data breaches are notified to the supervisory authority within 72 hours",
            "Security", 0.9)?,
        control(&fw, "Art.35", "Impact Assessment",
            "High-risk processing is preceded by a data protection impact assessment",
            "Controller Obligations", 0.6)?,
    ])
}

//! ISO 27001:2022 Annex A

use super::control;
use crate::model::{Control, FrameworkDefinition, ParameterBound};
use crosswalk_common::{CrosswalkResult, FrameworkId};

/// Framework id
pub const ID: &str = "iso27001-2022";

/// Framework definition
pub fn definition() -> CrosswalkResult<FrameworkDefinition> {
    FrameworkDefinition::new(ID, "ISO/IEC 27001:2022", "2022")
}

/// Annex A controls
pub fn controls() -> CrosswalkResult<Vec<Control>> {
    let fw = FrameworkId::new(ID)?;
    Ok(vec![
        // A.5 - Organizational Controls
        control(&fw, "A.5.1", "Information Security Policies",
            "Policies for information security shall be defined and approved",
            "Organizational", 0.8)?,
        control(&fw, "A.5.15", "Access Control",
            "Rules to control access to information shall be established", "Organizational", 0.9)?,
        control(&fw, "A.5.23", "Cloud Services Security",
            "Processes for cloud service acquisition, use and exit shall be established",
            "Organizational", 0.6)?,
        control(&fw, "A.5.24", "Incident Management Planning",
            "Incident management processes, roles and responsibilities shall be defined",
            "Organizational", 0.8)?,
        control(&fw, "A.5.33", "Protection of Records",
            "Records shall be protected from loss, destruction and unauthorized release",
            "Organizational", 0.7)?
            .with_parameter("retention_days", ParameterBound::at_least(2555.0))
            .with_scope("financial-records")
            .with_scope("personal-data"),
        // A.6 - People Controls
        control(&fw, "A.6.3", "Information Security Awareness",
            "Personnel shall receive appropriate security awareness education and training",
            "People", 0.6)?,
        // A.8 - Technological Controls
        control(&fw, "A.8.5", "Secure Authentication",
            "Secure authentication technologies shall be implemented", "Technological", 1.0)?,
        control(&fw, "A.8.7", "Protection Against Malware",
            "Protection against malware shall be implemented", "Technological", 0.8)?,
        control(&fw, "A.8.8", "Management of Technical Vulnerabilities",
            "Technical vulnerabilities shall be identified and remediated in a timely way",
            "Technological", 0.9)?,
        control(&fw, "A.8.13", "Information Backup",
            "Backup copies of information shall be maintained and regularly tested",
            "Technological", 0.8)?,
        control(&fw, "A.8.15", "Logging",
            "Logs recording activities and events shall be produced, stored and analysed",
            "Technological", 0.7)?,
        control(&fw, "A.8.24", "Use of Cryptography",
            "Rules for the effective use of cryptography shall be defined and implemented",
            "Technological", 0.8)?,
    ])
}

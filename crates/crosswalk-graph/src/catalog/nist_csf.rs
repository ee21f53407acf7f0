//! NIST Cybersecurity Framework 2.0

use super::control;
use crate::model::{Control, FrameworkDefinition};
use crosswalk_common::{CrosswalkResult, FrameworkId};

/// Framework id
pub const ID: &str = "nist-csf-2.0";

/// Framework definition
pub fn definition() -> CrosswalkResult<FrameworkDefinition> {
    FrameworkDefinition::new(ID, "NIST Cybersecurity Framework", "2.0")
}

/// Subcategories
pub fn controls() -> CrosswalkResult<Vec<Control>> {
    let fw = FrameworkId::new(ID)?;
    Ok(vec![
        control(&fw, "GV.PO-01", "Cybersecurity Policy",
            "Policy for managing cybersecurity risks is established and communicated",
            "Govern", 0.7)?,
        control(&fw, "ID.RA-01", "Vulnerability Identification",
            "Vulnerabilities in assets are identified, validated and recorded", "Identify", 0.8)?,
        control(&fw, "PR.AA-03", "Authentication",
            "Users, services and hardware are authenticated", "Protect", 1.0)?,
        control(&fw, "PR.AA-05", "Access Permissions",
            "Access permissions are defined, managed and enforced with least privilege",
            "Protect", 0.9)?,
        control(&fw, "PR.AT-01", "Awareness and Training",
            "Personnel are provided with awareness and training", "Protect", 0.5)?,
        control(&fw, "PR.DS-01", "Data-at-Rest Protection",
            "The confidentiality, integrity and availability of data-at-rest are protected",
            "Protect", 0.8)?,
        control(&fw, "PR.DS-11", "Backups",
            "Backups of data are created, protected, maintained and tested", "Protect", 0.8)?,
        control(&fw, "PR.PS-02", "Software Maintenance",
            "Software is maintained, replaced and removed commensurate with risk", "Protect", 0.8)?,
        control(&fw, "DE.CM-01", "Network Monitoring",
            "Networks and network services are monitored to find adverse events", "Detect", 0.7)?,
        control(&fw, "RS.MA-01", "Incident Response Execution",
            "The incident response plan is executed in coordination with relevant parties",
            "Respond", 0.8)?,
    ])
}

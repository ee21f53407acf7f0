//! SOC 2 Trust Services Criteria (2017)

use super::control;
use crate::model::{Control, FrameworkDefinition};
use crosswalk_common::{CrosswalkResult, FrameworkId};

/// Framework id
pub const ID: &str = "soc2-2017";

/// Framework definition
pub fn definition() -> CrosswalkResult<FrameworkDefinition> {
    FrameworkDefinition::new(ID, "SOC 2 Trust Services Criteria", "2017")
}

/// Common criteria
pub fn controls() -> CrosswalkResult<Vec<Control>> {
    let fw = FrameworkId::new(ID)?;
    Ok(vec![
        // CC1 - Control Environment
        control(&fw, "CC1.4", "Commitment to Competence",
            "The entity attracts, develops and retains competent individuals",
            "Control Environment", 0.5)?,
        // CC5 - Control Activities
        control(&fw, "CC5.2", "Technology General Controls",
            "The entity selects and develops general control activities over technology",
            "Control Activities", 0.7)?,
        // CC6 - Logical and Physical Access
        control(&fw, "CC6.1", "Logical Access Security",
            "Logical access security software, infrastructure and architectures are implemented",
            "Logical Access", 1.0)?,
        control(&fw, "CC6.6", "External Threat Protection",
            "Security measures protect against threats from sources outside system boundaries",
            "Logical Access", 0.8)?,
        control(&fw, "CC6.7", "Transmission Protection",
            "Transmission, movement and removal of information is restricted and protected",
            "Logical Access", 0.7)?,
        control(&fw, "CC6.8", "Malicious Software Prevention",
            "Controls prevent or detect the introduction of unauthorized or malicious software",
            "Logical Access", 0.8)?,
        // CC7 - System Operations
        control(&fw, "CC7.1", "Vulnerability Detection",
            "Detection and monitoring procedures identify new vulnerabilities",
            "System Operations", 0.9)?,
        control(&fw, "CC7.2", "Security Event Monitoring",
            "System components are monitored for anomalies indicative of malicious acts",
            "System Operations", 0.8)?,
        control(&fw, "CC7.4", "Incident Response",
            "The entity responds to identified security incidents with a defined program",
            "System Operations", 0.8)?,
        // A1 - Availability
        control(&fw, "A1.2", "Backup and Recovery Infrastructure",
            "Environmental protections, backups and recovery infrastructure are maintained",
            "Availability", 0.7)?,
    ])
}

//! ASD Essential Eight (Maturity Level One)

use super::control;
use crate::model::{Control, FrameworkDefinition};
use crosswalk_common::{CrosswalkResult, FrameworkId};

/// Framework id
pub const ID: &str = "essential-eight-ml1";

/// Framework definition
pub fn definition() -> CrosswalkResult<FrameworkDefinition> {
    FrameworkDefinition::new(ID, "ASD Essential Eight", "ML1-2023")
}

/// Mitigation strategies
pub fn controls() -> CrosswalkResult<Vec<Control>> {
    let fw = FrameworkId::new(ID)?;
    Ok(vec![
        control(&fw, "E8.1", "Application Control",
            "Execution of unapproved programs is prevented on workstations", "Prevent", 0.9)?,
        control(&fw, "E8.2", "Patch Applications",
            "Security vulnerabilities in applications are patched in a timely manner",
            "Prevent", 0.9)?,
        control(&fw, "E8.3", "Configure Macro Settings",
            "Microsoft Office macros from the internet are blocked", "Prevent", 0.6)?,
        control(&fw, "E8.4", "User Application Hardening",
            "Web browsers do not process web advertisements or Java from the internet",
            "Prevent", 0.5)?,
        control(&fw, "E8.5", "Restrict Administrative Privileges",
            "Privileged access is validated on request and restricted to required duties",
            "Limit", 1.0)?,
        control(&fw, "E8.6", "Patch Operating Systems",
            "Security vulnerabilities in operating systems are patched in a timely manner",
            "Limit", 0.9)?,
        control(&fw, "E8.7", "Multi-Factor Authentication",
            "Multi-factor authentication is used to authenticate users", "Limit", 1.0)?,
        control(&fw, "E8.8", "Regular Backups",
            "Backups of important data, software and settings are performed and tested",
            "Recover", 0.8)?,
    ])
}

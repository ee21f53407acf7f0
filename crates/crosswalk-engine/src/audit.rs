//! Assessment Audit Trail (Tamper-Evident)
//!
//! One SHA-256 hash chain per assessment. Each event's hash covers its own
//! fields and the previous event's hash, so editing or dropping an event
//! breaks verification from that point on.

use chrono::{DateTime, Utc};
use crosswalk_common::AssessmentId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const GENESIS: &str = "genesis";

/// Audit trail for one assessment
pub struct AuditTrail {
    assessment: AssessmentId,
    events: RwLock<Vec<AuditEvent>>,
}

impl AuditTrail {
    /// Create empty trail
    pub fn new(assessment: AssessmentId) -> Self {
        Self {
            assessment,
            events: RwLock::new(Vec::new()),
        }
    }

    /// Assessment this trail belongs to
    pub fn assessment(&self) -> &AssessmentId {
        &self.assessment
    }

    /// Append an event
    pub fn log(&self, event_type: AuditEventType, actor: &str, target: &str, details: &str) {
        let mut events = self.events.write();
        let prev_hash = events.last().map_or(GENESIS, |e| e.hash.as_str()).to_string();
        let event = AuditEvent::new(event_type, actor, target, details, &prev_hash);
        events.push(event);
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events, optionally filtered
    pub fn events(&self, filter: Option<&AuditFilter>) -> Vec<AuditEvent> {
        let events = self.events.read();
        match filter {
            Some(f) => events.iter().filter(|e| f.matches(e)).cloned().collect(),
            None => events.clone(),
        }
    }

    /// Verify chain integrity
    pub fn verify_integrity(&self) -> IntegrityResult {
        verify_chain(&self.events.read())
    }

    /// Export events
    pub fn export(&self, format: ExportFormat) -> String {
        let events = self.events.read();
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&*events).unwrap_or_default(),
            ExportFormat::Csv => to_csv(&events),
        }
    }
}

/// Verify a sequence of events as a chain starting from genesis
pub fn verify_chain(events: &[AuditEvent]) -> IntegrityResult {
    let mut prev_hash = GENESIS.to_string();
    let mut checked = 0;

    for event in events {
        if event.prev_hash != prev_hash {
            return IntegrityResult {
                valid: false,
                checked_count: checked,
                error: Some(format!("hash chain broken at event {}", event.id)),
            };
        }
        if event.compute_hash(&prev_hash) != event.hash {
            return IntegrityResult {
                valid: false,
                checked_count: checked,
                error: Some(format!("event {} hash mismatch", event.id)),
            };
        }
        prev_hash = event.hash.clone();
        checked += 1;
    }

    IntegrityResult {
        valid: true,
        checked_count: checked,
        error: None,
    }
}

fn to_csv(events: &[AuditEvent]) -> String {
    let mut csv = "timestamp,event_type,actor,target,details,hash\n".to_string();
    for e in events {
        let fields = [
            e.timestamp.to_rfc3339(),
            format!("{:?}", e.event_type),
            e.actor.clone(),
            e.target.clone(),
            e.details.clone(),
            e.hash.clone(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    csv
}

/// RFC 4180 quoting: fields with a separator, quote or line break are
/// wrapped in quotes with inner quotes doubled
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: String,
    pub target: String,
    pub details: String,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEvent {
    fn new(
        event_type: AuditEventType,
        actor: &str,
        target: &str,
        details: &str,
        prev_hash: &str,
    ) -> Self {
        let mut event = Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: actor.to_string(),
            target: target.to_string(),
            details: details.to_string(),
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        event.hash = event.compute_hash(prev_hash);
        event
    }

    fn compute_hash(&self, prev_hash: &str) -> String {
        let data = format!(
            "{}|{}|{:?}|{}|{}|{}|{}",
            self.id,
            self.timestamp.to_rfc3339(),
            self.event_type,
            self.actor,
            self.target,
            self.details,
            prev_hash
        );
        hex::encode(Sha256::digest(data.as_bytes()))
    }
}

/// Audit event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AssessmentCreated,
    EvidenceRecorded,
    EvidenceCorrected,
    FinalizeStarted,
    FinalizeFailed,
    FinalizeCancelled,
    Finalized,
    Abandoned,
    EscalationClaimed,
    EscalationResolved,
}

/// Audit filter
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub actor: Option<String>,
    pub target: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if self.event_type.map_or(false, |t| t != event.event_type) {
            return false;
        }
        if let Some(a) = &self.actor {
            if !event.actor.contains(a.as_str()) {
                return false;
            }
        }
        if let Some(t) = &self.target {
            if &event.target != t {
                return false;
            }
        }
        if let Some(s) = &self.start_time {
            if event.timestamp < *s {
                return false;
            }
        }
        if let Some(e) = &self.end_time {
            if event.timestamp > *e {
                return false;
            }
        }
        true
    }
}

/// Integrity check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityResult {
    pub valid: bool,
    pub checked_count: usize,
    pub error: Option<String>,
}

/// Export format
#[derive(Debug, Clone, Copy)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trail() -> AuditTrail {
        let t = AuditTrail::new(AssessmentId::new("a1").unwrap());
        t.log(AuditEventType::AssessmentCreated, "system", "a1", "frameworks=x");
        t.log(AuditEventType::EvidenceRecorded, "extractor", "x/C1", "evidence=e1");
        t.log(AuditEventType::EscalationClaimed, "alice", "esc-1", "");
        t
    }

    #[test]
    fn test_chain_verifies() {
        let t = trail();
        let result = t.verify_integrity();
        assert!(result.valid);
        assert_eq!(result.checked_count, 3);
    }

    #[test]
    fn test_tampering_detected() {
        let t = trail();
        let mut events = t.events(None);
        events[1].details = "evidence=e2".into();
        let result = verify_chain(&events);
        assert!(!result.valid);
        assert_eq!(result.checked_count, 1);

        let mut events = t.events(None);
        events.remove(1);
        assert!(!verify_chain(&events).valid);
    }

    #[test]
    fn test_filter() {
        let t = trail();
        let filter = AuditFilter {
            event_type: Some(AuditEventType::EvidenceRecorded),
            ..Default::default()
        };
        assert_eq!(t.events(Some(&filter)).len(), 1);
        let filter = AuditFilter {
            actor: Some("ali".into()),
            ..Default::default()
        };
        assert_eq!(t.events(Some(&filter))[0].target, "esc-1");
    }

    #[test]
    fn test_export() {
        let t = trail();
        let csv = t.export(ExportFormat::Csv);
        assert_eq!(csv.lines().count(), 4);
        let json: Vec<AuditEvent> = serde_json::from_str(&t.export(ExportFormat::Json)).unwrap();
        assert_eq!(json.len(), 3);
    }

    #[test]
    fn test_csv_quotes_every_field() {
        let t = AuditTrail::new(AssessmentId::new("a1").unwrap());
        t.log(
            AuditEventType::EscalationResolved,
            "Doe, Jane",
            "esc-1",
            "note=\"see, p.4\"\nsigned",
        );
        let csv = t.export(ExportFormat::Csv);
        let row = csv.split_once('\n').map(|(_, rest)| rest).unwrap();
        assert!(row.contains(",\"Doe, Jane\",esc-1,"));
        assert!(row.contains("\"note=\"\"see, p.4\"\"\nsigned\""));
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a\rb"), "\"a\rb\"");
    }
}

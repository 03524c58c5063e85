//! Operational intent attached to every request.
//!
//! Intent captures WHY a request is being made, orthogonal to the identity
//! making it. It is extracted once at the edge from a fixed header set and
//! threaded through service calls; the audit pipeline persists it with every
//! decision.

use serde::{Deserialize, Serialize};

/// Why the operation is being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationIntent {
    #[default]
    Standard,
    Manual,
    Automation,
    Test,
    Migration,
    IncidentResponse,
    Scheduled,
    System,
}

impl OperationIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationIntent::Standard => "standard",
            OperationIntent::Manual => "manual",
            OperationIntent::Automation => "automation",
            OperationIntent::Test => "test",
            OperationIntent::Migration => "migration",
            OperationIntent::IncidentResponse => "incident_response",
            OperationIntent::Scheduled => "scheduled",
            OperationIntent::System => "system",
        }
    }

    /// Parse a header value; `None` for anything outside the enum so the
    /// caller can warn and fall back to the default.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(OperationIntent::Standard),
            "manual" => Some(OperationIntent::Manual),
            "automation" => Some(OperationIntent::Automation),
            "test" => Some(OperationIntent::Test),
            "migration" => Some(OperationIntent::Migration),
            "incident_response" => Some(OperationIntent::IncidentResponse),
            "scheduled" => Some(OperationIntent::Scheduled),
            "system" => Some(OperationIntent::System),
            _ => None,
        }
    }
}

/// How the request is being made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Interactive,
    Api,
    Batch,
    Scheduled,
    System,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Interactive => "interactive",
            SessionMode::Api => "api",
            SessionMode::Batch => "batch",
            SessionMode::Scheduled => "scheduled",
            SessionMode::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "interactive" => Some(SessionMode::Interactive),
            "api" => Some(SessionMode::Api),
            "batch" => Some(SessionMode::Batch),
            "scheduled" => Some(SessionMode::Scheduled),
            "system" => Some(SessionMode::System),
            _ => None,
        }
    }
}

/// Operation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    #[default]
    Standard,
    Low,
}

impl Criticality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::Standard => "standard",
            Criticality::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(Criticality::Critical),
            "standard" => Some(Criticality::Standard),
            "low" => Some(Criticality::Low),
            _ => None,
        }
    }
}

/// Structured operational intent for one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestIntent {
    pub operation_intent: OperationIntent,
    pub session_mode: SessionMode,
    pub request_purpose: Option<String>,
    pub batch_id: Option<String>,
    pub is_test: bool,
    pub criticality: Criticality,
    pub client_type: Option<String>,
    pub idempotency_key: Option<String>,
}

impl RequestIntent {
    /// Request originated from software, not a human at a keyboard
    pub fn is_automated(&self) -> bool {
        matches!(
            self.operation_intent,
            OperationIntent::Automation | OperationIntent::Scheduled | OperationIntent::System
        ) || matches!(
            self.session_mode,
            SessionMode::Batch | SessionMode::Scheduled | SessionMode::System
        )
    }

    /// Production traffic: not flagged as test in either dimension
    pub fn is_production(&self) -> bool {
        !self.is_test && self.operation_intent != OperationIntent::Test
    }

    pub fn is_high_priority(&self) -> bool {
        self.criticality == Criticality::Critical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let intent = RequestIntent::default();
        assert_eq!(intent.operation_intent, OperationIntent::Standard);
        assert_eq!(intent.session_mode, SessionMode::Interactive);
        assert_eq!(intent.criticality, Criticality::Standard);
        assert!(!intent.is_test);
        assert!(intent.is_production());
        assert!(!intent.is_automated());
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert_eq!(OperationIntent::parse("nonsense"), None);
        assert_eq!(SessionMode::parse("nonsense"), None);
        assert_eq!(Criticality::parse("urgent"), None);
    }

    #[test]
    fn test_parse_roundtrip() {
        for v in [
            "standard",
            "manual",
            "automation",
            "test",
            "migration",
            "incident_response",
            "scheduled",
            "system",
        ] {
            assert_eq!(OperationIntent::parse(v).unwrap().as_str(), v);
        }
        for v in ["interactive", "api", "batch", "scheduled", "system"] {
            assert_eq!(SessionMode::parse(v).unwrap().as_str(), v);
        }
    }

    #[test]
    fn test_is_automated() {
        let mut intent = RequestIntent {
            operation_intent: OperationIntent::Automation,
            ..Default::default()
        };
        assert!(intent.is_automated());

        intent.operation_intent = OperationIntent::Standard;
        intent.session_mode = SessionMode::Batch;
        assert!(intent.is_automated());
    }

    #[test]
    fn test_test_intent_is_not_production() {
        let intent = RequestIntent {
            operation_intent: OperationIntent::Test,
            ..Default::default()
        };
        assert!(!intent.is_production());

        let intent = RequestIntent {
            is_test: true,
            ..Default::default()
        };
        assert!(!intent.is_production());
    }
}

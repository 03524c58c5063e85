use uuid::Uuid;

use crate::models::intent::RequestIntent;

/// Per-request context assembled at the edge and threaded through service
/// calls.
///
/// Replaces framework-magic request state with an explicit value: the
/// correlation id, caller network metadata, and the operational intent.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub intent: RequestIntent,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
            session_id: None,
            intent: RequestIntent::default(),
        }
    }
}

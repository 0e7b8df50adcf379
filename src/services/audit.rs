use serde_json::Value;

use crate::models::session::Session;

/// Records a successful privileged action on the `audit` target.
pub fn log_event(event: &str, session: Option<&Session>, ip: &str, details: Value) {
    let (actor, role) = actor_fields(session);
    tracing::info!(
        target: "audit",
        event,
        actor,
        role,
        ip,
        details = %details,
        "audit_event"
    );
}

/// Records a privileged action that failed after authorization.
pub fn log_failure(event: &str, error: &str, session: Option<&Session>, ip: &str, details: Value) {
    let (actor, role) = actor_fields(session);
    tracing::error!(
        target: "audit",
        event,
        error,
        actor,
        role,
        ip,
        details = %details,
        "audit_event_failed"
    );
}

fn actor_fields(session: Option<&Session>) -> (&str, &str) {
    match session {
        Some(session) => (session.username.as_str(), session.role.as_str()),
        None => ("unknown", "unknown"),
    }
}

//! Shared pieces of the permission-check-then-CRUD handler shape.

use okr_copilot_common::{FunctionExecutionResult, IntentRequest, UserContext};
use okr_copilot_core::boundary::{FieldMap, PermissionChecker, PermissionDecision};
use uuid::Uuid;

/// Runs the permission check; on denial returns the denial message as the
/// whole result and the handler stops there.
pub async fn ensure_allowed(
    permissions: &dyn PermissionChecker,
    permission_key: &str,
    user: &UserContext,
) -> Option<FunctionExecutionResult> {
    match permissions.check(permission_key, user).await {
        PermissionDecision::Allowed => None,
        PermissionDecision::Denied(message) => Some(FunctionExecutionResult::fail(message)),
    }
}

/// Pulls a required parameter, or the failure result naming what's missing.
pub fn require<'a>(
    intent: &'a IntentRequest,
    key: &str,
    description: &str,
) -> Result<&'a str, FunctionExecutionResult> {
    match intent.parameter(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim()),
        _ => Err(FunctionExecutionResult::fail(format!(
            "I need {} to do that.",
            description
        ))),
    }
}

/// An explicit id parameter, when the user (or the recent-context block)
/// supplied one.
pub fn id_param(intent: &IntentRequest) -> Option<Uuid> {
    intent.parameter("id").and_then(|raw| Uuid::parse_str(raw).ok())
}

/// Copies the intent's parameters into the field map handed to the CRUD
/// boundary, dropping routing-only keys.
pub fn fields_from(intent: &IntentRequest) -> FieldMap {
    intent
        .parameters
        .iter()
        .filter(|(key, _)| {
            !matches!(
                key.as_str(),
                "id" | "team" | "session" | "objective" | "key_result" | "assignee"
            )
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// An empty result set answers the search; it is not a failure, so a
/// multi-intent batch carrying the search still succeeds.
pub fn empty_search_message(entity_kind: &str, query: &str) -> String {
    if query.is_empty() {
        format!("No {}s found.", entity_kind)
    } else {
        format!("No {}s matched '{}'.", entity_kind, query)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank_values() {
        let intent = IntentRequest::new("CreateTeam").with_parameter("name", "  ");
        assert!(require(&intent, "name", "the team's name").is_err());

        let intent = IntentRequest::new("CreateTeam").with_parameter("name", " Growth ");
        assert_eq!(require(&intent, "name", "the team's name").unwrap(), "Growth");
    }

    #[test]
    fn test_fields_from_drops_routing_keys() {
        let intent = IntentRequest::new("CreateObjective")
            .with_parameter("title", "Grow ARR")
            .with_parameter("session", "Q3 Plan")
            .with_parameter("id", "not-an-id");
        let fields = fields_from(&intent);
        assert_eq!(fields.get("title").map(String::as_str), Some("Grow ARR"));
        assert!(!fields.contains_key("session"));
        assert!(!fields.contains_key("id"));
    }
}

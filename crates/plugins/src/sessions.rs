use crate::support::{empty_search_message, ensure_allowed, fields_from, id_param, require};
use async_trait::async_trait;
use okr_copilot_common::{
    EntityOperation, EntityType, FunctionExecutionResult, IntentRequest, UserContext,
};
use okr_copilot_core::boundary::{EntityGateway, PermissionChecker};
use okr_copilot_core::dispatch::IntentHandler;
use okr_copilot_core::resolver::{
    ambiguous_message, not_found_message, resolve_first_with_warning, resolve_unique, Resolution,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct OkrSessionHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl OkrSessionHandler {
    pub fn new(gateway: Arc<dyn EntityGateway>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { gateway, permissions }
    }

    async fn resolve_target(
        &self,
        intent: &IntentRequest,
        lenient: bool,
    ) -> Result<Uuid, FunctionExecutionResult> {
        if let Some(id) = id_param(intent) {
            return Ok(id);
        }
        let title = require(intent, "name", "the session's title or id")?;
        let candidates = self
            .gateway
            .search_sessions(title)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("Session lookup failed: {}", e)))?;
        let resolution = if lenient {
            resolve_first_with_warning(title, &candidates)
        } else {
            resolve_unique(title, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => {
                Err(FunctionExecutionResult::fail(not_found_message("session", title)))
            }
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("session", title, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let title = match require(intent, "title", "a title for the session") {
            Ok(title) => title,
            Err(failure) => return failure,
        };
        let team_name = match require(intent, "team", "the owning team's name") {
            Ok(team) => team,
            Err(failure) => return failure,
        };
        let teams = match self.gateway.search_teams(team_name).await {
            Ok(teams) => teams,
            Err(e) => return FunctionExecutionResult::fail(format!("Team lookup failed: {}", e)),
        };
        let team_id = match resolve_unique(team_name, &teams) {
            Resolution::Resolved(id) => id,
            Resolution::NotFound => {
                return FunctionExecutionResult::fail(not_found_message("team", team_name))
            }
            Resolution::Ambiguous(candidates) => {
                return FunctionExecutionResult::fail(ambiguous_message("team", team_name, &candidates))
            }
        };

        match self.gateway.create_session(team_id, &fields_from(intent)).await {
            Ok(session) => {
                let payload = serde_json::to_value(&session).ok();
                let mut result = FunctionExecutionResult::ok(format!(
                    "Created OKR session '{}' ({} to {}).",
                    session.title, session.start_date, session.end_date
                ))
                .with_entity(
                    EntityType::OkrSession,
                    session.id,
                    &session.title,
                    EntityOperation::Created,
                );
                if let Some(payload) = payload {
                    result = result.with_payload(payload);
                }
                result
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't create session '{}': {}", title, e))
            }
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_session(id, &fields_from(intent)).await {
            Ok(session) => FunctionExecutionResult::ok(format!("Updated session '{}'.", session.title))
                .with_entity(
                    EntityType::OkrSession,
                    session.id,
                    &session.title,
                    EntityOperation::Updated,
                ),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't update session {}: {}", id, e)),
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_session(id).await {
            Ok(session) => FunctionExecutionResult::ok(format!("Deleted session '{}'.", session.title))
                .with_entity(
                    EntityType::OkrSession,
                    session.id,
                    &session.title,
                    EntityOperation::Deleted,
                ),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't delete session {}: {}", id, e)),
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_sessions(query).await {
            Ok(sessions) if sessions.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("session", query))
            }
            Ok(sessions) => {
                let listing = sessions
                    .iter()
                    .map(|session| session.title.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut result = FunctionExecutionResult::ok(format!(
                    "Found {} session(s): {}.",
                    sessions.len(),
                    listing
                ));
                if let [session] = sessions.as_slice() {
                    result = result.with_entity(
                        EntityType::OkrSession,
                        session.id,
                        &session.title,
                        EntityOperation::Searched,
                    );
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Session search failed: {}", e)),
        }
    }
}

#[async_trait]
impl IntentHandler for OkrSessionHandler {
    fn intents(&self) -> &[&str] {
        &[
            "CreateOkrSession",
            "UpdateOkrSession",
            "DeleteOkrSession",
            "SearchOkrSessions",
        ]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        let permission_key = match intent.intent.as_str() {
            "CreateOkrSession" => "sessions.create",
            "UpdateOkrSession" => "sessions.update",
            "DeleteOkrSession" => "sessions.delete",
            _ => "sessions.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateOkrSession" => self.create(intent).await,
            "UpdateOkrSession" => self.update(intent).await,
            "DeleteOkrSession" => self.delete(intent).await,
            "SearchOkrSessions" => self.search(intent).await,
            other => {
                FunctionExecutionResult::fail(format!("Unsupported session intent '{}'.", other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::{AllowAll, StaticGateway};
    use okr_copilot_common::{Team, UserRole};

    fn user() -> UserContext {
        UserContext::new(Uuid::new_v4(), "Avery", UserRole::TeamLead)
    }

    #[tokio::test]
    async fn test_create_session_for_named_team() {
        let gateway = Arc::new(StaticGateway {
            teams: vec![Team {
                id: Uuid::new_v4(),
                name: "Growth".to_string(),
                description: None,
            }],
            ..Default::default()
        });
        let handler = OkrSessionHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateOkrSession")
            .with_parameter("title", "Q3 Plan")
            .with_parameter("team", "Growth")
            .with_parameter("start_date", "2025-07-01")
            .with_parameter("end_date", "2025-09-30");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        assert!(result.message.contains("Q3 Plan"));
        assert!(result.message.contains("2025-07-01"));
        assert_eq!(result.operation, Some(EntityOperation::Created));
    }

    #[tokio::test]
    async fn test_create_session_requires_team() {
        let gateway = Arc::new(StaticGateway::default());
        let handler = OkrSessionHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateOkrSession").with_parameter("title", "Q3 Plan");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(!result.success);
        assert!(result.message.contains("owning team"));
    }

    #[tokio::test]
    async fn test_create_session_with_duplicate_team_names_asks_for_id() {
        let duplicate = || Team {
            id: Uuid::new_v4(),
            name: "Growth".to_string(),
            description: None,
        };
        let gateway = Arc::new(StaticGateway {
            teams: vec![duplicate(), duplicate()],
            ..Default::default()
        });
        let handler = OkrSessionHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateOkrSession")
            .with_parameter("title", "Q3 Plan")
            .with_parameter("team", "Growth");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(!result.success);
        assert!(result.message.contains("specify which one"));
    }
}

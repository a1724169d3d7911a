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

pub struct ObjectiveHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl ObjectiveHandler {
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
        let title = require(intent, "name", "the objective's title or id")?;
        let candidates = self
            .gateway
            .search_objectives(title)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("Objective lookup failed: {}", e)))?;
        let resolution = if lenient {
            resolve_first_with_warning(title, &candidates)
        } else {
            resolve_unique(title, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => {
                Err(FunctionExecutionResult::fail(not_found_message("objective", title)))
            }
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("objective", title, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let title = match require(intent, "title", "a title for the objective") {
            Ok(title) => title,
            Err(failure) => return failure,
        };
        let session_title = match require(intent, "session", "the owning session's title") {
            Ok(session) => session,
            Err(failure) => return failure,
        };
        let sessions = match self.gateway.search_sessions(session_title).await {
            Ok(sessions) => sessions,
            Err(e) => return FunctionExecutionResult::fail(format!("Session lookup failed: {}", e)),
        };
        let session_id = match resolve_unique(session_title, &sessions) {
            Resolution::Resolved(id) => id,
            Resolution::NotFound => {
                return FunctionExecutionResult::fail(not_found_message("session", session_title))
            }
            Resolution::Ambiguous(candidates) => {
                return FunctionExecutionResult::fail(ambiguous_message(
                    "session",
                    session_title,
                    &candidates,
                ))
            }
        };

        match self.gateway.create_objective(session_id, &fields_from(intent)).await {
            Ok(objective) => {
                FunctionExecutionResult::ok(format!("Added objective '{}'.", objective.title))
                    .with_entity(
                        EntityType::Objective,
                        objective.id,
                        &objective.title,
                        EntityOperation::Created,
                    )
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't add objective '{}': {}", title, e))
            }
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_objective(id, &fields_from(intent)).await {
            Ok(objective) => {
                FunctionExecutionResult::ok(format!("Updated objective '{}'.", objective.title))
                    .with_entity(
                        EntityType::Objective,
                        objective.id,
                        &objective.title,
                        EntityOperation::Updated,
                    )
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't update objective {}: {}", id, e))
            }
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_objective(id).await {
            Ok(objective) => {
                FunctionExecutionResult::ok(format!("Deleted objective '{}'.", objective.title))
                    .with_entity(
                        EntityType::Objective,
                        objective.id,
                        &objective.title,
                        EntityOperation::Deleted,
                    )
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't delete objective {}: {}", id, e))
            }
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        // Listing a session's objectives takes precedence over a title query.
        if let Some(session_title) = intent.parameter("session") {
            let sessions = match self.gateway.search_sessions(session_title).await {
                Ok(sessions) => sessions,
                Err(e) => {
                    return FunctionExecutionResult::fail(format!("Session lookup failed: {}", e))
                }
            };
            let session_id = match resolve_unique(session_title, &sessions) {
                Resolution::Resolved(id) => id,
                Resolution::NotFound => {
                    return FunctionExecutionResult::fail(not_found_message("session", session_title))
                }
                Resolution::Ambiguous(candidates) => {
                    return FunctionExecutionResult::fail(ambiguous_message(
                        "session",
                        session_title,
                        &candidates,
                    ))
                }
            };
            return match self.gateway.objectives_by_session(session_id).await {
                Ok(objectives) => FunctionExecutionResult::ok(format!(
                    "Session '{}' has {} objective(s): {}.",
                    session_title,
                    objectives.len(),
                    objectives
                        .iter()
                        .map(|objective| objective.title.clone())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                Err(e) => {
                    FunctionExecutionResult::fail(format!("Couldn't list objectives: {}", e))
                }
            };
        }

        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_objectives(query).await {
            Ok(objectives) if objectives.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("objective", query))
            }
            Ok(objectives) => {
                let listing = objectives
                    .iter()
                    .map(|objective| objective.title.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut result = FunctionExecutionResult::ok(format!(
                    "Found {} objective(s): {}.",
                    objectives.len(),
                    listing
                ));
                if let [objective] = objectives.as_slice() {
                    result = result.with_entity(
                        EntityType::Objective,
                        objective.id,
                        &objective.title,
                        EntityOperation::Searched,
                    );
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Objective search failed: {}", e)),
        }
    }
}

#[async_trait]
impl IntentHandler for ObjectiveHandler {
    fn intents(&self) -> &[&str] {
        &[
            "CreateObjective",
            "UpdateObjective",
            "DeleteObjective",
            "SearchObjectives",
        ]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        let permission_key = match intent.intent.as_str() {
            "CreateObjective" => "objectives.create",
            "UpdateObjective" => "objectives.update",
            "DeleteObjective" => "objectives.delete",
            _ => "objectives.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateObjective" => self.create(intent).await,
            "UpdateObjective" => self.update(intent).await,
            "DeleteObjective" => self.delete(intent).await,
            "SearchObjectives" => self.search(intent).await,
            other => {
                FunctionExecutionResult::fail(format!("Unsupported objective intent '{}'.", other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::{AllowAll, StaticGateway};
    use chrono::NaiveDate;
    use okr_copilot_common::{Objective, OkrSession, UserRole};

    fn user() -> UserContext {
        UserContext::new(Uuid::new_v4(), "Avery", UserRole::TeamLead)
    }

    fn session(title: &str) -> OkrSession {
        OkrSession {
            id: Uuid::new_v4(),
            title: title.to_string(),
            team_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_objective_in_named_session() {
        let gateway = Arc::new(StaticGateway {
            sessions: vec![session("Q3 Plan")],
            ..Default::default()
        });
        let handler = ObjectiveHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateObjective")
            .with_parameter("title", "Grow ARR")
            .with_parameter("session", "Q3 Plan");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        assert_eq!(result.entity_type, Some(EntityType::Objective));
    }

    #[tokio::test]
    async fn test_list_objectives_by_session() {
        let owning = session("Q3 Plan");
        let objective = Objective {
            id: Uuid::new_v4(),
            title: "Grow ARR".to_string(),
            session_id: owning.id,
            description: None,
        };
        let gateway = Arc::new(StaticGateway {
            sessions: vec![owning],
            objectives: vec![objective],
            ..Default::default()
        });
        let handler = ObjectiveHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("SearchObjectives").with_parameter("session", "Q3 Plan");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        assert!(result.message.contains("Grow ARR"));
    }
}

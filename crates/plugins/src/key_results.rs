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

pub struct KeyResultHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl KeyResultHandler {
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
        let title = require(intent, "name", "the key result's title or id")?;
        let candidates = self
            .gateway
            .search_key_results(title)
            .await
            .map_err(|e| {
                FunctionExecutionResult::fail(format!("Key result lookup failed: {}", e))
            })?;
        let resolution = if lenient {
            resolve_first_with_warning(title, &candidates)
        } else {
            resolve_unique(title, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => {
                Err(FunctionExecutionResult::fail(not_found_message("key result", title)))
            }
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("key result", title, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let title = match require(intent, "title", "a title for the key result") {
            Ok(title) => title,
            Err(failure) => return failure,
        };
        let objective_title = match require(intent, "objective", "the owning objective's title") {
            Ok(objective) => objective,
            Err(failure) => return failure,
        };
        let objectives = match self.gateway.search_objectives(objective_title).await {
            Ok(objectives) => objectives,
            Err(e) => {
                return FunctionExecutionResult::fail(format!("Objective lookup failed: {}", e))
            }
        };
        let objective_id = match resolve_unique(objective_title, &objectives) {
            Resolution::Resolved(id) => id,
            Resolution::NotFound => {
                return FunctionExecutionResult::fail(not_found_message(
                    "objective",
                    objective_title,
                ))
            }
            Resolution::Ambiguous(candidates) => {
                return FunctionExecutionResult::fail(ambiguous_message(
                    "objective",
                    objective_title,
                    &candidates,
                ))
            }
        };

        match self
            .gateway
            .create_key_result(objective_id, &fields_from(intent))
            .await
        {
            Ok(key_result) => FunctionExecutionResult::ok(format!(
                "Added key result '{}' ({} to {}).",
                key_result.title, key_result.start_date, key_result.end_date
            ))
            .with_entity(
                EntityType::KeyResult,
                key_result.id,
                &key_result.title,
                EntityOperation::Created,
            ),
            Err(e) => FunctionExecutionResult::fail(format!(
                "Couldn't add key result '{}': {}",
                title, e
            )),
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_key_result(id, &fields_from(intent)).await {
            Ok(key_result) => {
                FunctionExecutionResult::ok(format!("Updated key result '{}'.", key_result.title))
                    .with_entity(
                        EntityType::KeyResult,
                        key_result.id,
                        &key_result.title,
                        EntityOperation::Updated,
                    )
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't update key result {}: {}", id, e))
            }
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_key_result(id).await {
            Ok(key_result) => {
                FunctionExecutionResult::ok(format!("Deleted key result '{}'.", key_result.title))
                    .with_entity(
                        EntityType::KeyResult,
                        key_result.id,
                        &key_result.title,
                        EntityOperation::Deleted,
                    )
            }
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't delete key result {}: {}", id, e))
            }
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_key_results(query).await {
            Ok(key_results) if key_results.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("key result", query))
            }
            Ok(key_results) => {
                let listing = key_results
                    .iter()
                    .map(|key_result| key_result.title.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut result = FunctionExecutionResult::ok(format!(
                    "Found {} key result(s): {}.",
                    key_results.len(),
                    listing
                ));
                if let [key_result] = key_results.as_slice() {
                    result = result.with_entity(
                        EntityType::KeyResult,
                        key_result.id,
                        &key_result.title,
                        EntityOperation::Searched,
                    );
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Key result search failed: {}", e)),
        }
    }
}

#[async_trait]
impl IntentHandler for KeyResultHandler {
    fn intents(&self) -> &[&str] {
        &[
            "CreateKeyResult",
            "UpdateKeyResult",
            "DeleteKeyResult",
            "SearchKeyResults",
        ]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        let permission_key = match intent.intent.as_str() {
            "CreateKeyResult" => "key_results.create",
            "UpdateKeyResult" => "key_results.update",
            "DeleteKeyResult" => "key_results.delete",
            _ => "key_results.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateKeyResult" => self.create(intent).await,
            "UpdateKeyResult" => self.update(intent).await,
            "DeleteKeyResult" => self.delete(intent).await,
            "SearchKeyResults" => self.search(intent).await,
            other => {
                FunctionExecutionResult::fail(format!("Unsupported key result intent '{}'.", other))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::{AllowAll, StaticGateway};
    use okr_copilot_common::{Objective, UserRole};

    fn user() -> UserContext {
        UserContext::new(Uuid::new_v4(), "Avery", UserRole::TeamLead)
    }

    #[tokio::test]
    async fn test_create_key_result_under_named_objective() {
        let objective = Objective {
            id: Uuid::new_v4(),
            title: "Grow ARR".to_string(),
            session_id: Uuid::new_v4(),
            description: None,
        };
        let gateway = Arc::new(StaticGateway {
            objectives: vec![objective],
            ..Default::default()
        });
        let handler = KeyResultHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateKeyResult")
            .with_parameter("title", "Close 20 enterprise deals")
            .with_parameter("objective", "Grow ARR")
            .with_parameter("start_date", "2025-07-01")
            .with_parameter("end_date", "2025-09-30");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        assert!(result.message.contains("2025-07-01"));
        assert_eq!(result.operation, Some(EntityOperation::Created));
    }

    #[tokio::test]
    async fn test_create_without_objective_asks_for_it() {
        let handler =
            KeyResultHandler::new(Arc::new(StaticGateway::default()), Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateKeyResult").with_parameter("title", "Ship v2");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(!result.success);
        assert!(result.message.contains("owning objective"));
    }
}

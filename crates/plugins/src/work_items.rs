use crate::support::{empty_search_message, ensure_allowed, fields_from, id_param, require};
use async_trait::async_trait;
use okr_copilot_common::{
    EntityOperation, EntityType, FunctionExecutionResult, IntentRequest, UserContext,
};
use okr_copilot_core::boundary::{EntityGateway, FieldMap, PermissionChecker};
use okr_copilot_core::dispatch::IntentHandler;
use okr_copilot_core::resolver::{
    ambiguous_message, not_found_message, resolve_first_with_warning, resolve_unique, Resolution,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct WorkItemHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl WorkItemHandler {
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
        let title = require(intent, "name", "the task's title or id")?;
        let candidates = self
            .gateway
            .search_tasks(title)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("Task lookup failed: {}", e)))?;
        let resolution = if lenient {
            resolve_first_with_warning(title, &candidates)
        } else {
            resolve_unique(title, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => {
                Err(FunctionExecutionResult::fail(not_found_message("task", title)))
            }
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("task", title, &candidates),
            )),
        }
    }

    async fn resolve_assignee(&self, name: &str) -> Result<Uuid, FunctionExecutionResult> {
        let members = self
            .gateway
            .search_members(name)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("User lookup failed: {}", e)))?;
        match resolve_unique(name, &members) {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => {
                Err(FunctionExecutionResult::fail(not_found_message("user", name)))
            }
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("user", name, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let title = match require(intent, "title", "a title for the task") {
            Ok(title) => title,
            Err(failure) => return failure,
        };
        let key_result_title = match require(intent, "key_result", "the owning key result's title")
        {
            Ok(key_result) => key_result,
            Err(failure) => return failure,
        };
        let key_results = match self.gateway.search_key_results(key_result_title).await {
            Ok(key_results) => key_results,
            Err(e) => {
                return FunctionExecutionResult::fail(format!("Key result lookup failed: {}", e))
            }
        };
        let key_result_id = match resolve_unique(key_result_title, &key_results) {
            Resolution::Resolved(id) => id,
            Resolution::NotFound => {
                return FunctionExecutionResult::fail(not_found_message(
                    "key result",
                    key_result_title,
                ))
            }
            Resolution::Ambiguous(candidates) => {
                return FunctionExecutionResult::fail(ambiguous_message(
                    "key result",
                    key_result_title,
                    &candidates,
                ))
            }
        };

        let mut fields = fields_from(intent);
        if let Some(assignee_name) = intent.parameter("assignee") {
            let assignee_id = match self.resolve_assignee(assignee_name).await {
                Ok(id) => id,
                Err(failure) => return failure,
            };
            fields.insert("assignee_id".to_string(), assignee_id.to_string());
        }

        match self.gateway.create_task(key_result_id, &fields).await {
            Ok(task) => FunctionExecutionResult::ok(format!("Created task '{}'.", task.title))
                .with_entity(
                    EntityType::WorkItem,
                    task.id,
                    &task.title,
                    EntityOperation::Created,
                ),
            Err(e) => {
                FunctionExecutionResult::fail(format!("Couldn't create task '{}': {}", title, e))
            }
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_task(id, &fields_from(intent)).await {
            Ok(task) => FunctionExecutionResult::ok(format!("Updated task '{}'.", task.title))
                .with_entity(
                    EntityType::WorkItem,
                    task.id,
                    &task.title,
                    EntityOperation::Updated,
                ),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't update task {}: {}", id, e)),
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_task(id).await {
            Ok(task) => FunctionExecutionResult::ok(format!("Deleted task '{}'.", task.title))
                .with_entity(
                    EntityType::WorkItem,
                    task.id,
                    &task.title,
                    EntityOperation::Deleted,
                ),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't delete task {}: {}", id, e)),
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_tasks(query).await {
            Ok(tasks) if tasks.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("task", query))
            }
            Ok(tasks) => {
                let listing = tasks
                    .iter()
                    .map(|task| task.title.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut result =
                    FunctionExecutionResult::ok(format!("Found {} task(s): {}.", tasks.len(), listing));
                if let [task] = tasks.as_slice() {
                    result = result.with_entity(
                        EntityType::WorkItem,
                        task.id,
                        &task.title,
                        EntityOperation::Searched,
                    );
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Task search failed: {}", e)),
        }
    }

    // Assignment reuses the lenient update path for the task itself but
    // insists on an unambiguous assignee.
    async fn assign(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        let assignee_name = match require(intent, "assignee", "who to assign the task to") {
            Ok(assignee) => assignee,
            Err(failure) => return failure,
        };
        let assignee_id = match self.resolve_assignee(assignee_name).await {
            Ok(assignee_id) => assignee_id,
            Err(failure) => return failure,
        };

        let mut fields = FieldMap::new();
        fields.insert("assignee_id".to_string(), assignee_id.to_string());
        match self.gateway.update_task(id, &fields).await {
            Ok(task) => FunctionExecutionResult::ok(format!(
                "Assigned task '{}' to {}.",
                task.title, assignee_name
            ))
            .with_entity(
                EntityType::WorkItem,
                task.id,
                &task.title,
                EntityOperation::Updated,
            ),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't assign task {}: {}", id, e)),
        }
    }
}

#[async_trait]
impl IntentHandler for WorkItemHandler {
    fn intents(&self) -> &[&str] {
        &[
            "CreateTask",
            "UpdateTask",
            "DeleteTask",
            "SearchTasks",
            "AssignTask",
        ]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        let permission_key = match intent.intent.as_str() {
            "CreateTask" => "tasks.create",
            "UpdateTask" | "AssignTask" => "tasks.update",
            "DeleteTask" => "tasks.delete",
            _ => "tasks.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateTask" => self.create(intent).await,
            "UpdateTask" => self.update(intent).await,
            "DeleteTask" => self.delete(intent).await,
            "SearchTasks" => self.search(intent).await,
            "AssignTask" => self.assign(intent).await,
            other => FunctionExecutionResult::fail(format!("Unsupported task intent '{}'.", other)),
        }
    }
}

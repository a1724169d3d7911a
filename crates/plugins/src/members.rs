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

/// Handles user-account intents. The catalog speaks of "users"; the domain
/// type is `Member` to keep it distinct from the actor's `UserContext`.
pub struct MemberHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl MemberHandler {
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
        let name = require(intent, "name", "the user's name or id")?;
        let candidates = self
            .gateway
            .search_members(name)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("User lookup failed: {}", e)))?;
        let resolution = if lenient {
            resolve_first_with_warning(name, &candidates)
        } else {
            resolve_unique(name, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => Err(FunctionExecutionResult::fail(not_found_message("user", name))),
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("user", name, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let name = match require(intent, "name", "a name for the user") {
            Ok(name) => name,
            Err(failure) => return failure,
        };
        let mut fields = fields_from(intent);
        // A team mentioned by name becomes a resolved team_id field.
        if let Some(team_name) = intent.parameter("team") {
            let teams = match self.gateway.search_teams(team_name).await {
                Ok(teams) => teams,
                Err(e) => {
                    return FunctionExecutionResult::fail(format!("Team lookup failed: {}", e))
                }
            };
            match resolve_unique(team_name, &teams) {
                Resolution::Resolved(team_id) => {
                    fields.insert("team_id".to_string(), team_id.to_string());
                }
                Resolution::NotFound => {
                    return FunctionExecutionResult::fail(not_found_message("team", team_name))
                }
                Resolution::Ambiguous(candidates) => {
                    return FunctionExecutionResult::fail(ambiguous_message(
                        "team", team_name, &candidates,
                    ))
                }
            }
        }
        match self.gateway.create_member(&fields).await {
            Ok(member) => FunctionExecutionResult::ok(format!("Registered user '{}'.", member.name))
                .with_entity(EntityType::Member, member.id, &member.name, EntityOperation::Created),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't register user '{}': {}", name, e)),
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_member(id, &fields_from(intent)).await {
            Ok(member) => FunctionExecutionResult::ok(format!("Updated user '{}'.", member.name))
                .with_entity(EntityType::Member, member.id, &member.name, EntityOperation::Updated),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't update user {}: {}", id, e)),
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_member(id).await {
            Ok(member) => FunctionExecutionResult::ok(format!("Removed user '{}'.", member.name))
                .with_entity(EntityType::Member, member.id, &member.name, EntityOperation::Deleted),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't remove user {}: {}", id, e)),
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_members(query).await {
            Ok(members) if members.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("user", query))
            }
            Ok(members) => {
                let listing = members
                    .iter()
                    .map(|member| member.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut result = FunctionExecutionResult::ok(format!(
                    "Found {} user(s): {}.",
                    members.len(),
                    listing
                ));
                if let [member] = members.as_slice() {
                    result = result.with_entity(
                        EntityType::Member,
                        member.id,
                        &member.name,
                        EntityOperation::Searched,
                    );
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("User search failed: {}", e)),
        }
    }
}

#[async_trait]
impl IntentHandler for MemberHandler {
    fn intents(&self) -> &[&str] {
        &["CreateUser", "UpdateUser", "DeleteUser", "SearchUsers"]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        let permission_key = match intent.intent.as_str() {
            "CreateUser" => "users.create",
            "UpdateUser" => "users.update",
            "DeleteUser" => "users.delete",
            _ => "users.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateUser" => self.create(intent).await,
            "UpdateUser" => self.update(intent).await,
            "DeleteUser" => self.delete(intent).await,
            "SearchUsers" => self.search(intent).await,
            other => FunctionExecutionResult::fail(format!("Unsupported user intent '{}'.", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::{AllowAll, StaticGateway};
    use okr_copilot_common::{Team, UserRole};

    fn user() -> UserContext {
        UserContext::new(Uuid::new_v4(), "Avery", UserRole::Admin)
    }

    #[tokio::test]
    async fn test_create_user_resolves_team_by_name() {
        let gateway = Arc::new(StaticGateway {
            teams: vec![Team {
                id: Uuid::new_v4(),
                name: "Growth".to_string(),
                description: None,
            }],
            ..Default::default()
        });
        let handler = MemberHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateUser")
            .with_parameter("name", "Rin")
            .with_parameter("team", "Growth");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        assert_eq!(result.entity_type, Some(EntityType::Member));
    }

    #[tokio::test]
    async fn test_create_user_with_unknown_team_fails() {
        let gateway = Arc::new(StaticGateway::default());
        let handler = MemberHandler::new(gateway, Arc::new(AllowAll));
        let intent = IntentRequest::new("CreateUser")
            .with_parameter("name", "Rin")
            .with_parameter("team", "Sales");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(!result.success);
        assert!(result.message.contains("couldn't find"));
    }
}

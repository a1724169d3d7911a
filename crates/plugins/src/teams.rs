use crate::support::{empty_search_message, ensure_allowed, fields_from, id_param, require};
use async_trait::async_trait;
use okr_copilot_common::{
    EntityOperation, EntityType, FunctionExecutionResult, IntentRequest, Named, UserContext,
};
use okr_copilot_core::boundary::{EntityGateway, PermissionChecker};
use okr_copilot_core::dispatch::IntentHandler;
use okr_copilot_core::resolver::{
    ambiguous_message, not_found_message, resolve_first_with_warning, resolve_unique, Resolution,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct TeamHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
}

impl TeamHandler {
    pub fn new(gateway: Arc<dyn EntityGateway>, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { gateway, permissions }
    }

    /// Resolves the target team from an explicit id or a supplied name.
    /// Update flows pass `lenient = true` (first match on duplicates); delete
    /// flows require a unique match.
    async fn resolve_target(
        &self,
        intent: &IntentRequest,
        lenient: bool,
    ) -> Result<Uuid, FunctionExecutionResult> {
        if let Some(id) = id_param(intent) {
            return Ok(id);
        }
        let name = require(intent, "name", "the team's name or id")?;
        let candidates = self
            .gateway
            .search_teams(name)
            .await
            .map_err(|e| FunctionExecutionResult::fail(format!("Team lookup failed: {}", e)))?;
        let resolution = if lenient {
            resolve_first_with_warning(name, &candidates)
        } else {
            resolve_unique(name, &candidates)
        };
        match resolution {
            Resolution::Resolved(id) => Ok(id),
            Resolution::NotFound => Err(FunctionExecutionResult::fail(not_found_message("team", name))),
            Resolution::Ambiguous(candidates) => Err(FunctionExecutionResult::fail(
                ambiguous_message("team", name, &candidates),
            )),
        }
    }

    async fn create(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let name = match require(intent, "name", "a name for the team") {
            Ok(name) => name,
            Err(failure) => return failure,
        };
        match self.gateway.create_team(&fields_from(intent)).await {
            Ok(team) => {
                let payload = serde_json::to_value(&team).ok();
                let mut result = FunctionExecutionResult::ok(format!("Created team '{}'.", team.name))
                    .with_entity(EntityType::Team, team.id, &team.name, EntityOperation::Created);
                if let Some(payload) = payload {
                    result = result.with_payload(payload);
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't create team '{}': {}", name, e)),
        }
    }

    async fn update(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, true).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.update_team(id, &fields_from(intent)).await {
            Ok(team) => FunctionExecutionResult::ok(format!("Updated team '{}'.", team.name))
                .with_entity(EntityType::Team, team.id, &team.name, EntityOperation::Updated),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't update team {}: {}", id, e)),
        }
    }

    async fn delete(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let id = match self.resolve_target(intent, false).await {
            Ok(id) => id,
            Err(failure) => return failure,
        };
        match self.gateway.delete_team(id).await {
            Ok(team) => FunctionExecutionResult::ok(format!("Deleted team '{}'.", team.name))
                .with_entity(EntityType::Team, team.id, &team.name, EntityOperation::Deleted),
            Err(e) => FunctionExecutionResult::fail(format!("Couldn't delete team {}: {}", id, e)),
        }
    }

    async fn search(&self, intent: &IntentRequest) -> FunctionExecutionResult {
        let query = intent.parameter("query").unwrap_or("").trim();
        match self.gateway.search_teams(query).await {
            Ok(teams) if teams.is_empty() => {
                FunctionExecutionResult::ok(empty_search_message("team", query))
            }
            Ok(teams) => {
                let listing = teams
                    .iter()
                    .map(|team| team.display_name().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                let payload = serde_json::to_value(&teams).ok();
                let mut result = FunctionExecutionResult::ok(format!(
                    "Found {} team(s): {}.",
                    teams.len(),
                    listing
                ));
                // A unique hit becomes referenceable in later turns.
                if let [team] = teams.as_slice() {
                    result = result.with_entity(
                        EntityType::Team,
                        team.id,
                        &team.name,
                        EntityOperation::Searched,
                    );
                }
                if let Some(payload) = payload {
                    result = result.with_payload(payload);
                }
                result
            }
            Err(e) => FunctionExecutionResult::fail(format!("Team search failed: {}", e)),
        }
    }
}

#[async_trait]
impl IntentHandler for TeamHandler {
    fn intents(&self) -> &[&str] {
        &["CreateTeam", "UpdateTeam", "DeleteTeam", "SearchTeams"]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        debug!("TeamHandler handling {}", intent.intent);
        let permission_key = match intent.intent.as_str() {
            "CreateTeam" => "teams.create",
            "UpdateTeam" => "teams.update",
            "DeleteTeam" => "teams.delete",
            _ => "teams.read",
        };
        if let Some(denied) = ensure_allowed(self.permissions.as_ref(), permission_key, user).await {
            return denied;
        }

        match intent.intent.as_str() {
            "CreateTeam" => self.create(intent).await,
            "UpdateTeam" => self.update(intent).await,
            "DeleteTeam" => self.delete(intent).await,
            "SearchTeams" => self.search(intent).await,
            other => FunctionExecutionResult::fail(format!("Unsupported team intent '{}'.", other)),
        }
    }
}

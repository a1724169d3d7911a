use async_trait::async_trait;
use okr_copilot_common::{
    KeyResult, Member, Objective, OkrSession, Result, Team, UserContext, WorkItem,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Field map used for create/update calls; keys follow the intent catalog's
/// parameter names.
pub type FieldMap = HashMap<String, String>;

/// External CRUD boundary over the OKR application. The copilot never owns
/// these entities; it forwards operations and holds results transiently.
#[async_trait]
pub trait EntityGateway: Send + Sync {
    // Team operations
    async fn search_teams(&self, query: &str) -> Result<Vec<Team>>;
    async fn create_team(&self, fields: &FieldMap) -> Result<Team>;
    async fn update_team(&self, id: Uuid, fields: &FieldMap) -> Result<Team>;
    async fn delete_team(&self, id: Uuid) -> Result<Team>;
    async fn get_team(&self, id: Uuid) -> Result<Team>;

    // Member operations
    async fn search_members(&self, query: &str) -> Result<Vec<Member>>;
    async fn create_member(&self, fields: &FieldMap) -> Result<Member>;
    async fn update_member(&self, id: Uuid, fields: &FieldMap) -> Result<Member>;
    async fn delete_member(&self, id: Uuid) -> Result<Member>;
    async fn get_member(&self, id: Uuid) -> Result<Member>;

    // OKR session operations
    async fn search_sessions(&self, query: &str) -> Result<Vec<OkrSession>>;
    async fn create_session(&self, team_id: Uuid, fields: &FieldMap) -> Result<OkrSession>;
    async fn update_session(&self, id: Uuid, fields: &FieldMap) -> Result<OkrSession>;
    async fn delete_session(&self, id: Uuid) -> Result<OkrSession>;
    async fn get_session(&self, id: Uuid) -> Result<OkrSession>;

    // Objective operations
    async fn search_objectives(&self, query: &str) -> Result<Vec<Objective>>;
    async fn objectives_by_session(&self, session_id: Uuid) -> Result<Vec<Objective>>;
    async fn create_objective(&self, session_id: Uuid, fields: &FieldMap) -> Result<Objective>;
    async fn update_objective(&self, id: Uuid, fields: &FieldMap) -> Result<Objective>;
    async fn delete_objective(&self, id: Uuid) -> Result<Objective>;
    async fn get_objective(&self, id: Uuid) -> Result<Objective>;

    // Key result operations
    async fn search_key_results(&self, query: &str) -> Result<Vec<KeyResult>>;
    async fn key_results_by_objective(&self, objective_id: Uuid) -> Result<Vec<KeyResult>>;
    async fn create_key_result(&self, objective_id: Uuid, fields: &FieldMap) -> Result<KeyResult>;
    async fn update_key_result(&self, id: Uuid, fields: &FieldMap) -> Result<KeyResult>;
    async fn delete_key_result(&self, id: Uuid) -> Result<KeyResult>;
    async fn get_key_result(&self, id: Uuid) -> Result<KeyResult>;

    // Task operations
    async fn search_tasks(&self, query: &str) -> Result<Vec<WorkItem>>;
    async fn tasks_by_key_result(&self, key_result_id: Uuid) -> Result<Vec<WorkItem>>;
    async fn tasks_by_assignee(&self, assignee_id: Uuid) -> Result<Vec<WorkItem>>;
    async fn create_task(&self, key_result_id: Uuid, fields: &FieldMap) -> Result<WorkItem>;
    async fn update_task(&self, id: Uuid, fields: &FieldMap) -> Result<WorkItem>;
    async fn delete_task(&self, id: Uuid) -> Result<WorkItem>;
    async fn get_task(&self, id: Uuid) -> Result<WorkItem>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allowed,
    Denied(String),
}

/// Authorization boundary; keys are `"<entity>.<operation>"` strings.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(&self, permission_key: &str, user: &UserContext) -> PermissionDecision;
}

/// Prompt templating boundary. `render_or` tolerates a missing template by
/// substituting into the caller-supplied default.
#[async_trait]
pub trait PromptTemplateStore: Send + Sync {
    async fn render(&self, template_key: &str, values: &FieldMap) -> Result<String>;

    async fn render_or(&self, template_key: &str, values: &FieldMap, default: &str) -> String {
        match self.render(template_key, values).await {
            Ok(text) => text,
            Err(_) => {
                let mut text = default.to_string();
                for (key, value) in values {
                    text = text.replace(&format!("{{{}}}", key), value);
                }
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okr_copilot_common::CopilotError;

    struct EmptyTemplates;

    #[async_trait]
    impl PromptTemplateStore for EmptyTemplates {
        async fn render(&self, template_key: &str, _values: &FieldMap) -> Result<String> {
            Err(CopilotError::Template(format!(
                "no template {}",
                template_key
            )))
        }
    }

    #[tokio::test]
    async fn test_render_or_falls_back_with_substitution() {
        let store = EmptyTemplates;
        let mut values = FieldMap::new();
        values.insert("name".to_string(), "Growth".to_string());

        let text = store
            .render_or("team.created", &values, "Created team {name}.")
            .await;
        assert_eq!(text, "Created team Growth.");
    }
}

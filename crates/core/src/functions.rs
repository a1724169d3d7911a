//! Chat-tool wrappers over the entity boundary's listing operations. Mounted
//! on a gateway with `OpenAiGateway::with_functions(entity_functions(..))` so
//! analysis phases can pull structure on demand instead of relying solely on
//! the data digest.

use crate::boundary::EntityGateway;
use crate::gateway::CallableFunction;
use async_trait::async_trait;
use okr_copilot_common::{CopilotError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

/// The standard function set: one wrapper per listing operation.
pub fn entity_functions(gateway: Arc<dyn EntityGateway>) -> Vec<Arc<dyn CallableFunction>> {
    vec![
        Arc::new(ListOkrSessions {
            gateway: gateway.clone(),
        }),
        Arc::new(ListObjectives {
            gateway: gateway.clone(),
        }),
        Arc::new(ListKeyResults {
            gateway: gateway.clone(),
        }),
        Arc::new(ListTasks {
            gateway: gateway.clone(),
        }),
        Arc::new(ListTasksByAssignee { gateway }),
    ]
}

fn id_argument(arguments: &Value, key: &str) -> Result<Uuid> {
    let raw = arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CopilotError::Crud(format!("missing argument '{}'", key)))?;
    Uuid::parse_str(raw).map_err(|e| CopilotError::Crud(format!("bad id in '{}': {}", key, e)))
}

fn serialized<T: Serialize>(items: &[T]) -> Result<String> {
    serde_json::to_string(items).map_err(|e| CopilotError::Internal(e.to_string()))
}

fn id_schema(key: &str, hint: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            key: { "type": "string", "description": hint }
        },
        "required": [key]
    })
}

struct ListOkrSessions {
    gateway: Arc<dyn EntityGateway>,
}

#[async_trait]
impl CallableFunction for ListOkrSessions {
    fn name(&self) -> &str {
        "list_okr_sessions"
    }

    fn description(&self) -> &str {
        "Lists OKR sessions whose title matches the query; empty query lists all."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Substring of the session title." }
            }
        })
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or("");
        serialized(&self.gateway.search_sessions(query).await?)
    }
}

struct ListObjectives {
    gateway: Arc<dyn EntityGateway>,
}

#[async_trait]
impl CallableFunction for ListObjectives {
    fn name(&self) -> &str {
        "list_objectives"
    }

    fn description(&self) -> &str {
        "Lists the objectives of one OKR session."
    }

    fn parameters(&self) -> Value {
        id_schema("session_id", "UUID of the OKR session.")
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let session_id = id_argument(arguments, "session_id")?;
        serialized(&self.gateway.objectives_by_session(session_id).await?)
    }
}

struct ListKeyResults {
    gateway: Arc<dyn EntityGateway>,
}

#[async_trait]
impl CallableFunction for ListKeyResults {
    fn name(&self) -> &str {
        "list_key_results"
    }

    fn description(&self) -> &str {
        "Lists the key results of one objective."
    }

    fn parameters(&self) -> Value {
        id_schema("objective_id", "UUID of the objective.")
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let objective_id = id_argument(arguments, "objective_id")?;
        serialized(&self.gateway.key_results_by_objective(objective_id).await?)
    }
}

struct ListTasks {
    gateway: Arc<dyn EntityGateway>,
}

#[async_trait]
impl CallableFunction for ListTasks {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "Lists the tasks of one key result."
    }

    fn parameters(&self) -> Value {
        id_schema("key_result_id", "UUID of the key result.")
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let key_result_id = id_argument(arguments, "key_result_id")?;
        serialized(&self.gateway.tasks_by_key_result(key_result_id).await?)
    }
}

struct ListTasksByAssignee {
    gateway: Arc<dyn EntityGateway>,
}

#[async_trait]
impl CallableFunction for ListTasksByAssignee {
    fn name(&self) -> &str {
        "list_tasks_by_assignee"
    }

    fn description(&self) -> &str {
        "Lists the tasks assigned to one person."
    }

    fn parameters(&self) -> Value {
        id_schema("member_id", "UUID of the assignee.")
    }

    async fn call(&self, arguments: &Value) -> Result<String> {
        let member_id = id_argument(arguments, "member_id")?;
        serialized(&self.gateway.tasks_by_assignee(member_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::FieldMap;
    use chrono::NaiveDate;
    use okr_copilot_common::{KeyResult, Member, Objective, OkrSession, Team, WorkItem};

    fn off_limits<T>() -> Result<T> {
        Err(CopilotError::Internal("not part of this test".to_string()))
    }

    /// Listing-only boundary; every mutating or by-id operation errors.
    #[derive(Default)]
    struct ListingGateway {
        sessions: Vec<OkrSession>,
        objectives: Vec<Objective>,
        tasks: Vec<WorkItem>,
    }

    #[async_trait]
    impl EntityGateway for ListingGateway {
        async fn search_teams(&self, _query: &str) -> Result<Vec<Team>> {
            off_limits()
        }
        async fn create_team(&self, _fields: &FieldMap) -> Result<Team> {
            off_limits()
        }
        async fn update_team(&self, _id: Uuid, _fields: &FieldMap) -> Result<Team> {
            off_limits()
        }
        async fn delete_team(&self, _id: Uuid) -> Result<Team> {
            off_limits()
        }
        async fn get_team(&self, _id: Uuid) -> Result<Team> {
            off_limits()
        }

        async fn search_members(&self, _query: &str) -> Result<Vec<Member>> {
            off_limits()
        }
        async fn create_member(&self, _fields: &FieldMap) -> Result<Member> {
            off_limits()
        }
        async fn update_member(&self, _id: Uuid, _fields: &FieldMap) -> Result<Member> {
            off_limits()
        }
        async fn delete_member(&self, _id: Uuid) -> Result<Member> {
            off_limits()
        }
        async fn get_member(&self, _id: Uuid) -> Result<Member> {
            off_limits()
        }

        async fn search_sessions(&self, query: &str) -> Result<Vec<OkrSession>> {
            Ok(self
                .sessions
                .iter()
                .filter(|session| session.title.contains(query))
                .cloned()
                .collect())
        }
        async fn create_session(&self, _team_id: Uuid, _fields: &FieldMap) -> Result<OkrSession> {
            off_limits()
        }
        async fn update_session(&self, _id: Uuid, _fields: &FieldMap) -> Result<OkrSession> {
            off_limits()
        }
        async fn delete_session(&self, _id: Uuid) -> Result<OkrSession> {
            off_limits()
        }
        async fn get_session(&self, _id: Uuid) -> Result<OkrSession> {
            off_limits()
        }

        async fn search_objectives(&self, _query: &str) -> Result<Vec<Objective>> {
            off_limits()
        }
        async fn objectives_by_session(&self, session_id: Uuid) -> Result<Vec<Objective>> {
            Ok(self
                .objectives
                .iter()
                .filter(|objective| objective.session_id == session_id)
                .cloned()
                .collect())
        }
        async fn create_objective(&self, _session_id: Uuid, _fields: &FieldMap) -> Result<Objective> {
            off_limits()
        }
        async fn update_objective(&self, _id: Uuid, _fields: &FieldMap) -> Result<Objective> {
            off_limits()
        }
        async fn delete_objective(&self, _id: Uuid) -> Result<Objective> {
            off_limits()
        }
        async fn get_objective(&self, _id: Uuid) -> Result<Objective> {
            off_limits()
        }

        async fn search_key_results(&self, _query: &str) -> Result<Vec<KeyResult>> {
            off_limits()
        }
        async fn key_results_by_objective(&self, _objective_id: Uuid) -> Result<Vec<KeyResult>> {
            Ok(Vec::new())
        }
        async fn create_key_result(
            &self,
            _objective_id: Uuid,
            _fields: &FieldMap,
        ) -> Result<KeyResult> {
            off_limits()
        }
        async fn update_key_result(&self, _id: Uuid, _fields: &FieldMap) -> Result<KeyResult> {
            off_limits()
        }
        async fn delete_key_result(&self, _id: Uuid) -> Result<KeyResult> {
            off_limits()
        }
        async fn get_key_result(&self, _id: Uuid) -> Result<KeyResult> {
            off_limits()
        }

        async fn search_tasks(&self, _query: &str) -> Result<Vec<WorkItem>> {
            off_limits()
        }
        async fn tasks_by_key_result(&self, _key_result_id: Uuid) -> Result<Vec<WorkItem>> {
            Ok(Vec::new())
        }
        async fn tasks_by_assignee(&self, assignee_id: Uuid) -> Result<Vec<WorkItem>> {
            Ok(self
                .tasks
                .iter()
                .filter(|task| task.assignee_id == Some(assignee_id))
                .cloned()
                .collect())
        }
        async fn create_task(&self, _key_result_id: Uuid, _fields: &FieldMap) -> Result<WorkItem> {
            off_limits()
        }
        async fn update_task(&self, _id: Uuid, _fields: &FieldMap) -> Result<WorkItem> {
            off_limits()
        }
        async fn delete_task(&self, _id: Uuid) -> Result<WorkItem> {
            off_limits()
        }
        async fn get_task(&self, _id: Uuid) -> Result<WorkItem> {
            off_limits()
        }
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

    #[test]
    fn test_standard_set_names_are_unique() {
        let functions = entity_functions(Arc::new(ListingGateway::default()));
        assert_eq!(functions.len(), 5);
        for (index, function) in functions.iter().enumerate() {
            assert!(
                !functions[index + 1..]
                    .iter()
                    .any(|other| other.name() == function.name()),
                "duplicate function name {}",
                function.name()
            );
        }
    }

    #[tokio::test]
    async fn test_list_sessions_filters_by_query() {
        let gateway = Arc::new(ListingGateway {
            sessions: vec![session("Q3 Plan"), session("Annual Review")],
            ..Default::default()
        });
        let functions = entity_functions(gateway);
        let lister = functions
            .iter()
            .find(|function| function.name() == "list_okr_sessions")
            .unwrap();

        let output = lister.call(&json!({"query": "Q3"})).await.unwrap();
        assert!(output.contains("Q3 Plan"));
        assert!(!output.contains("Annual Review"));
    }

    #[tokio::test]
    async fn test_list_objectives_requires_session_id() {
        let id = Uuid::new_v4();
        let gateway = Arc::new(ListingGateway {
            objectives: vec![Objective {
                id: Uuid::new_v4(),
                title: "Grow ARR".to_string(),
                session_id: id,
                description: None,
            }],
            ..Default::default()
        });
        let functions = entity_functions(gateway);
        let lister = functions
            .iter()
            .find(|function| function.name() == "list_objectives")
            .unwrap();

        let output = lister
            .call(&json!({"session_id": id.to_string()}))
            .await
            .unwrap();
        assert!(output.contains("Grow ARR"));

        let missing = lister.call(&json!({})).await;
        assert!(matches!(missing, Err(CopilotError::Crud(_))));
    }
}

use crate::support::ensure_allowed;
use async_trait::async_trait;
use futures::future;
use okr_copilot_common::{
    CopilotError, EntityOperation, EntityType, FunctionExecutionResult, IntentRequest, OkrSession,
    Result, UserContext,
};
use okr_copilot_core::analysis::{
    AnalysisData, AnalysisOrchestrator, KeyResultProgress, MemberLoad,
};
use okr_copilot_core::boundary::{EntityGateway, FieldMap, PermissionChecker, PromptTemplateStore};
use okr_copilot_core::dispatch::IntentHandler;
use okr_copilot_core::resolver::{ambiguous_message, not_found_message, resolve_unique, Resolution};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Gathers a session's full objective tree plus per-member task loads, then
/// hands the snapshot to the analysis orchestrator.
pub struct RiskReportHandler {
    gateway: Arc<dyn EntityGateway>,
    permissions: Arc<dyn PermissionChecker>,
    analysis: Arc<AnalysisOrchestrator>,
    templates: Option<Arc<dyn PromptTemplateStore>>,
}

/// Default wording for the analysis request; a mounted template store can
/// override it under the `report.request` key.
const REQUEST_TEMPLATE_KEY: &str = "report.request";
const REQUEST_TEMPLATE_DEFAULT: &str =
    "{user} analyzes the OKR session '{session}' ({start} to {end}).";

impl RiskReportHandler {
    pub fn new(
        gateway: Arc<dyn EntityGateway>,
        permissions: Arc<dyn PermissionChecker>,
        analysis: Arc<AnalysisOrchestrator>,
    ) -> Self {
        Self {
            gateway,
            permissions,
            analysis,
            templates: None,
        }
    }

    pub fn with_templates(mut self, templates: Arc<dyn PromptTemplateStore>) -> Self {
        self.templates = Some(templates);
        self
    }

    async fn request_line(&self, user: &UserContext, session: &OkrSession) -> String {
        let mut values = FieldMap::new();
        values.insert("user".to_string(), user.display_name.clone());
        values.insert("session".to_string(), session.title.clone());
        values.insert("start".to_string(), session.start_date.to_string());
        values.insert("end".to_string(), session.end_date.to_string());
        match &self.templates {
            Some(store) => {
                store
                    .render_or(REQUEST_TEMPLATE_KEY, &values, REQUEST_TEMPLATE_DEFAULT)
                    .await
            }
            None => format!(
                "{} analyzes the OKR session '{}' ({} to {}).",
                user.display_name, session.title, session.start_date, session.end_date
            ),
        }
    }

    async fn gather(&self, session_id: Uuid) -> Result<AnalysisData> {
        let mut key_results = Vec::new();
        for objective in self.gateway.objectives_by_session(session_id).await? {
            for key_result in self.gateway.key_results_by_objective(objective.id).await? {
                let tasks = self.gateway.tasks_by_key_result(key_result.id).await?;
                key_results.push(KeyResultProgress::from_tasks(key_result, &tasks));
            }
        }

        let everyone = self.gateway.search_members("").await?;
        let members = future::try_join_all(everyone.into_iter().map(|member| async move {
            let tasks = self.gateway.tasks_by_assignee(member.id).await?;
            Ok::<MemberLoad, CopilotError>(MemberLoad::from_tasks(member, &tasks))
        }))
        .await?;

        info!(
            key_results = key_results.len(),
            members = members.len(),
            "Collected analysis snapshot"
        );
        Ok(AnalysisData {
            key_results,
            members,
        })
    }

    async fn generate(&self, intent: &IntentRequest, user: &UserContext) -> FunctionExecutionResult {
        let session_title = match intent.parameter("session") {
            Some(title) if !title.trim().is_empty() => title.trim(),
            _ => {
                return FunctionExecutionResult::fail(
                    "I need to know which OKR session to analyze. Which session did you mean?",
                )
            }
        };
        let sessions = match self.gateway.search_sessions(session_title).await {
            Ok(sessions) => sessions,
            Err(e) => return FunctionExecutionResult::fail(format!("Session lookup failed: {}", e)),
        };
        let session = match resolve_unique(session_title, &sessions) {
            Resolution::Resolved(id) => match sessions.into_iter().find(|s| s.id == id) {
                Some(session) => session,
                None => {
                    return FunctionExecutionResult::fail(not_found_message(
                        "session",
                        session_title,
                    ))
                }
            },
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

        let data = match self.gather(session.id).await {
            Ok(data) => data,
            Err(e) => {
                return FunctionExecutionResult::fail(format!(
                    "Couldn't collect data for session '{}': {}",
                    session.title, e
                ))
            }
        };

        let request = self.request_line(user, &session).await;
        let report = self.analysis.run(&request, &data).await;
        FunctionExecutionResult::ok(report).with_entity(
            EntityType::OkrSession,
            session.id,
            &session.title,
            EntityOperation::Viewed,
        )
    }
}

#[async_trait]
impl IntentHandler for RiskReportHandler {
    fn intents(&self) -> &[&str] {
        &["GenerateRiskReport"]
    }

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        _conversation_id: &str,
    ) -> FunctionExecutionResult {
        if let Some(denied) =
            ensure_allowed(self.permissions.as_ref(), "reports.generate", user).await
        {
            return denied;
        }
        self.generate(intent, user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tests_support::{AllowAll, StaticGateway};
    use chrono::NaiveDate;
    use okr_copilot_core::gateway::{ChatCompletionGateway, ChatMessage, CompletionOutcome};
    use okr_copilot_common::{
        KeyResult, Objective, UserRole, WorkItem, WorkItemPriority, WorkItemStatus,
    };

    struct EchoGateway;

    #[async_trait]
    impl ChatCompletionGateway for EchoGateway {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _allow_function_calls: bool,
        ) -> Result<CompletionOutcome> {
            Ok(CompletionOutcome::text_only("phase output"))
        }

        fn provider_name(&self) -> &str {
            "echo"
        }
    }

    fn user() -> UserContext {
        UserContext::new(Uuid::new_v4(), "Avery", UserRole::TeamLead)
    }

    fn fixture() -> StaticGateway {
        let session = OkrSession {
            id: Uuid::new_v4(),
            title: "Q3 Plan".to_string(),
            team_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
        };
        let objective = Objective {
            id: Uuid::new_v4(),
            title: "Grow ARR".to_string(),
            session_id: session.id,
            description: None,
        };
        let key_result = KeyResult {
            id: Uuid::new_v4(),
            title: "Close 20 deals".to_string(),
            objective_id: objective.id,
            start_date: session.start_date,
            end_date: session.end_date,
        };
        let task = WorkItem {
            id: Uuid::new_v4(),
            title: "Draft outreach emails".to_string(),
            key_result_id: key_result.id,
            assignee_id: None,
            status: WorkItemStatus::InProgress,
            priority: WorkItemPriority::High,
            due_date: None,
        };
        StaticGateway {
            sessions: vec![session],
            objectives: vec![objective],
            key_results: vec![key_result],
            tasks: vec![task],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_report_covers_all_four_sections() {
        let analysis = Arc::new(AnalysisOrchestrator::new(Arc::new(EchoGateway)));
        let handler = RiskReportHandler::new(Arc::new(fixture()), Arc::new(AllowAll), analysis);
        let intent = IntentRequest::new("GenerateRiskReport").with_parameter("session", "Q3 Plan");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(result.success);
        for title in [
            "## Overview",
            "## Risk Analysis",
            "## Overload Analysis",
            "## Task Redistribution",
        ] {
            assert!(result.message.contains(title), "missing section {}", title);
        }
        assert_eq!(result.operation, Some(EntityOperation::Viewed));
    }

    struct FixedTemplates;

    #[async_trait]
    impl PromptTemplateStore for FixedTemplates {
        async fn render(&self, template_key: &str, values: &FieldMap) -> Result<String> {
            match (template_key, values.get("session")) {
                ("report.request", Some(session)) => {
                    Ok(format!("Please review session {} end to end.", session))
                }
                _ => Err(CopilotError::Template(format!(
                    "no template {}",
                    template_key
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_mounted_template_store_overrides_request_wording() {
        let analysis = Arc::new(AnalysisOrchestrator::new(Arc::new(EchoGateway)));
        let handler = RiskReportHandler::new(Arc::new(fixture()), Arc::new(AllowAll), analysis)
            .with_templates(Arc::new(FixedTemplates));
        let session = fixture().sessions.remove(0);

        let line = handler.request_line(&user(), &session).await;
        assert_eq!(line, "Please review session Q3 Plan end to end.");
    }

    #[tokio::test]
    async fn test_missing_session_asks_which_one() {
        let analysis = Arc::new(AnalysisOrchestrator::new(Arc::new(EchoGateway)));
        let handler = RiskReportHandler::new(
            Arc::new(StaticGateway::default()),
            Arc::new(AllowAll),
            analysis,
        );
        let intent = IntentRequest::new("GenerateRiskReport");

        let result = handler.handle(&intent, &user(), "conv-1").await;
        assert!(!result.success);
        assert!(result.message.contains("Which session"));
    }
}

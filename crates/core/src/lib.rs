pub mod analysis;
pub mod boundary;
pub mod catalog;
pub mod classifier;
pub mod consolidator;
pub mod dispatch;
pub mod functions;
pub mod gateway;
pub mod history;
pub mod resolver;

use classifier::{ClassifierConfig, IntentClassifier};
use consolidator::ResponseConsolidator;
use dispatch::{DispatchEngine, ExecutionOutcome, HandlerRegistry, IntentHandler};
use gateway::ChatCompletionGateway;
use history::HistoryStore;
use okr_copilot_common::{Message, UserContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub system_prompt: String,
    /// Budget for ordinary single-shot calls (classification, consolidation).
    pub turn_timeout: Duration,
    /// Budget for each multi-step analysis phase call.
    pub analysis_timeout: Duration,
    pub condensed_catalog: bool,
    pub condensed_providers: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are an assistant for an OKR management application. \
                            You help users manage teams, users, OKR sessions, \
                            objectives, key results and tasks."
                .to_string(),
            turn_timeout: Duration::from_secs(20),
            analysis_timeout: Duration::from_secs(90),
            condensed_catalog: false,
            condensed_providers: vec!["cohere".to_string()],
        }
    }
}

/// Fully wired conversational core: classification, dispatch, history and the
/// analysis pipeline behind one handle. Constructed once at process start;
/// no runtime mutation of the handler table.
pub struct CopilotCore {
    pub history: HistoryStore,
    pub classifier: IntentClassifier,
    pub dispatch: DispatchEngine,
    pub analysis: analysis::AnalysisOrchestrator,
}

impl CopilotCore {
    pub fn new(
        gateway: Arc<dyn ChatCompletionGateway>,
        handlers: Vec<Arc<dyn IntentHandler>>,
        config: CoreConfig,
    ) -> Self {
        let history = HistoryStore::new(&config.system_prompt);
        let classifier = IntentClassifier::new(gateway.clone(), history.clone()).with_config(
            ClassifierConfig {
                condensed_catalog: config.condensed_catalog,
                condensed_providers: config.condensed_providers.clone(),
                timeout: config.turn_timeout,
            },
        );
        let registry = Arc::new(HandlerRegistry::build(handlers));
        let consolidator =
            ResponseConsolidator::new(gateway.clone()).with_timeout(config.turn_timeout);
        let dispatch = DispatchEngine::new(registry, history.clone(), consolidator);
        let analysis =
            analysis::AnalysisOrchestrator::new(gateway).with_timeout(config.analysis_timeout);

        Self {
            history,
            classifier,
            dispatch,
            analysis,
        }
    }

    /// One conversational turn: classify, execute in order, record the
    /// user/assistant exchange, return the aggregated outcome.
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        user: &UserContext,
        provider_hint: Option<&str>,
    ) -> ExecutionOutcome {
        self.history
            .append(conversation_id, Message::user(user_text))
            .await;

        let intents = self
            .classifier
            .classify(conversation_id, user_text, provider_hint)
            .await;
        debug!("Turn classified into {} intent(s)", intents.len());

        let outcome = self.dispatch.execute(conversation_id, &intents, user).await;

        self.history
            .append(conversation_id, Message::assistant(&outcome.message))
            .await;
        outcome
    }
}

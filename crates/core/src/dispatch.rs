use crate::consolidator::ResponseConsolidator;
use crate::history::{function_result_message, HistoryStore};
use async_trait::async_trait;
use okr_copilot_common::{
    FunctionExecutionResult, FunctionResultItem, IntentRequest, UserContext,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOTHING_TO_DO_MESSAGE: &str =
    "I didn't find an operation to perform in that request. Could you rephrase it?";

/// One registered intent handler. A handler claims a fixed set of intent
/// names and executes them against the external boundaries.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    fn intents(&self) -> &[&str];

    async fn handle(
        &self,
        intent: &IntentRequest,
        user: &UserContext,
        conversation_id: &str,
    ) -> FunctionExecutionResult;
}

/// Immutable intent-name → handler map, built once at startup. First
/// registration of a name wins; duplicates are logged and ignored.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn IntentHandler>>,
}

impl HandlerRegistry {
    pub fn build(handlers: Vec<Arc<dyn IntentHandler>>) -> Self {
        let mut map: HashMap<String, Arc<dyn IntentHandler>> = HashMap::new();
        for handler in handlers {
            for intent in handler.intents() {
                if map.contains_key(*intent) {
                    warn!("Intent {} already registered; keeping first handler", intent);
                    continue;
                }
                map.insert((*intent).to_string(), handler.clone());
            }
        }
        info!("Handler registry built with {} intents", map.len());
        Self { handlers: map }
    }

    pub fn handler_for(&self, intent: &str) -> Option<&Arc<dyn IntentHandler>> {
        self.handlers.get(intent)
    }

    pub fn registered_intents(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: String,
    pub results: Vec<FunctionResultItem>,
}

/// Executes classified intents sequentially, in input order, isolating
/// individual failures, recording successes into the history and picking the
/// turn's reply per the aggregation rules.
pub struct DispatchEngine {
    registry: Arc<HandlerRegistry>,
    history: HistoryStore,
    consolidator: ResponseConsolidator,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        history: HistoryStore,
        consolidator: ResponseConsolidator,
    ) -> Self {
        Self {
            registry,
            history,
            consolidator,
        }
    }

    pub async fn execute(
        &self,
        conversation_id: &str,
        intents: &[IntentRequest],
        user: &UserContext,
    ) -> ExecutionOutcome {
        let mut results: Vec<FunctionResultItem> = Vec::new();
        let mut failures: Vec<String> = Vec::new();
        let mut saw_actionable = false;

        for intent in intents {
            if intent.is_general() {
                debug!("Skipping General intent");
                continue;
            }
            saw_actionable = true;

            let result = match self.registry.handler_for(&intent.intent) {
                Some(handler) => handler.handle(intent, user, conversation_id).await,
                None => FunctionExecutionResult::fail(format!(
                    "I don't know how to handle '{}' yet.",
                    intent.intent
                )),
            };

            if result.success {
                self.record_success(conversation_id, &intent.intent, &result)
                    .await;
                results.push(FunctionResultItem::from_result(&intent.intent, &result));
            } else {
                debug!("Intent {} failed: {}", intent.intent, result.message);
                failures.push(result.message);
            }
        }

        let success = failures.is_empty() && !results.is_empty();
        let message = if !failures.is_empty() {
            let mut parts = failures;
            for item in &results {
                parts.push(item.message.clone());
            }
            parts.join(" ")
        } else if results.len() == 1 {
            results[0].message.clone()
        } else if results.len() > 1 {
            self.consolidator.consolidate(&results).await
        } else if saw_actionable {
            // All actionable intents failed without a message (unreachable in
            // practice; failures always carry one).
            "Nothing could be completed for that request.".to_string()
        } else {
            NOTHING_TO_DO_MESSAGE.to_string()
        };

        ExecutionOutcome {
            success,
            message,
            results,
        }
    }

    async fn record_success(
        &self,
        conversation_id: &str,
        intent_name: &str,
        result: &FunctionExecutionResult,
    ) {
        let (Some(entity_type), Some(entity_id), Some(operation)) =
            (result.entity_type, result.entity_id, result.operation)
        else {
            // Nothing to index; still a success, just not referenceable later.
            return;
        };
        let message = function_result_message(
            intent_name,
            &result.message,
            entity_type,
            entity_id,
            result.entity_name.as_deref(),
            operation,
            result.payload.as_ref(),
        );
        self.history.append(conversation_id, message).await;
    }
}

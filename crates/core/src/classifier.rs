use crate::catalog::{render_condensed_catalog, render_full_catalog};
use crate::gateway::{timed_complete, ChatCompletionGateway, ChatMessage};
use crate::history::HistoryStore;
use okr_copilot_common::IntentRequest;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Always use the one-line-per-intent catalog.
    pub condensed_catalog: bool,
    /// Providers that get the condensed catalog even when the flag is off.
    pub condensed_providers: Vec<String>,
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            condensed_catalog: false,
            condensed_providers: vec!["cohere".to_string()],
            timeout: Duration::from_secs(20),
        }
    }
}

/// Classifies free-text user input into ordered `IntentRequest`s via one
/// single-shot completion. Never errors: anything unparseable degrades to a
/// single `General` intent.
pub struct IntentClassifier {
    gateway: Arc<dyn ChatCompletionGateway>,
    history: HistoryStore,
    config: ClassifierConfig,
}

#[derive(Debug, Deserialize)]
struct IntentsEnvelope {
    intents: Vec<IntentShape>,
}

#[derive(Debug, Deserialize)]
struct IntentShape {
    intent: String,
    #[serde(default)]
    parameters: HashMap<String, String>,
}

impl From<IntentShape> for IntentRequest {
    fn from(shape: IntentShape) -> Self {
        IntentRequest {
            intent: shape.intent,
            parameters: shape.parameters,
        }
    }
}

impl IntentClassifier {
    pub fn new(gateway: Arc<dyn ChatCompletionGateway>, history: HistoryStore) -> Self {
        Self {
            gateway,
            history,
            config: ClassifierConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn classify(
        &self,
        conversation_id: &str,
        user_text: &str,
        provider_hint: Option<&str>,
    ) -> Vec<IntentRequest> {
        let system_prompt = self.build_system_prompt(conversation_id, provider_hint).await;

        // Single-shot call, never appended to the main history, plain text only.
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(user_text)];
        let outcome =
            timed_complete(self.gateway.as_ref(), &messages, false, self.config.timeout).await;

        let text = match outcome {
            Ok(outcome) => outcome.text,
            Err(e) => {
                warn!("Classification call failed, degrading to General: {}", e);
                return vec![IntentRequest::general()];
            }
        };

        let intents = parse_intents(&text);
        if intents.is_empty() {
            warn!("Classifier output yielded no intents, degrading to General");
            return vec![IntentRequest::general()];
        }
        debug!(
            "Classified {:?} into {} intent(s)",
            user_text,
            intents.len()
        );
        intents
    }

    async fn build_system_prompt(
        &self,
        conversation_id: &str,
        provider_hint: Option<&str>,
    ) -> String {
        let condensed = self.config.condensed_catalog
            || provider_hint.is_some_and(|hint| {
                self.config
                    .condensed_providers
                    .iter()
                    .any(|provider| provider == hint)
            });
        let catalog = if condensed {
            render_condensed_catalog()
        } else {
            render_full_catalog()
        };

        let mut prompt = String::from(
            "You classify a user's request against the intent catalog below. \
             Reply with JSON only, shaped as \
             {\"intents\":[{\"intent\":\"<name>\",\"parameters\":{...}}]}. \
             Emit one entry per requested operation, in the order the user \
             stated them. Use the General intent when nothing else matches.\n\n",
        );
        prompt.push_str("## Intents\n");
        prompt.push_str(&catalog);

        let recent = self.history.recent_entities(conversation_id).await;
        if !recent.is_empty() {
            prompt.push_str("\n## Recent context\n");
            prompt.push_str(
                "Entities from this conversation; use their ids when the user says \
                 \"it\", \"that team\" and similar:\n",
            );
            for entity in recent {
                let name = entity.entity_name.as_deref().unwrap_or("unnamed");
                let operation = entity
                    .operation
                    .map(|op| op.as_str())
                    .unwrap_or("referenced");
                prompt.push_str(&format!(
                    "- {} \"{}\" (id {}, last {})\n",
                    entity.entity_type, name, entity.entity_id, operation
                ));
            }
        }

        prompt
    }
}

/// Tolerant parse of the classifier reply: strips code fences, tries the
/// multi-intent envelope, then the legacy single-intent shape.
fn parse_intents(raw: &str) -> Vec<IntentRequest> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Vec::new();
    }

    if let Ok(envelope) = serde_json::from_str::<IntentsEnvelope>(cleaned) {
        return envelope.intents.into_iter().map(IntentRequest::from).collect();
    }

    // Legacy single-intent shape.
    if let Ok(single) = serde_json::from_str::<IntentShape>(cleaned) {
        return vec![single.into()];
    }

    Vec::new()
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence, then the closing fence.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.trim_end_matches('`').trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CompletionOutcome;
    use async_trait::async_trait;
    use okr_copilot_common::{CopilotError, Result};

    struct CannedGateway {
        reply: Result<String>,
    }

    impl CannedGateway {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(CopilotError::Gateway("boom".to_string())),
            })
        }
    }

    #[async_trait]
    impl ChatCompletionGateway for CannedGateway {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            allow_function_calls: bool,
        ) -> Result<CompletionOutcome> {
            assert!(!allow_function_calls, "classification must not enable tools");
            match &self.reply {
                Ok(text) => Ok(CompletionOutcome::text_only(text.clone())),
                Err(CopilotError::Gateway(message)) => {
                    Err(CopilotError::Gateway(message.clone()))
                }
                Err(_) => unreachable!(),
            }
        }

        fn provider_name(&self) -> &str {
            "canned"
        }
    }

    fn classifier(gateway: Arc<CannedGateway>) -> IntentClassifier {
        IntentClassifier::new(gateway, HistoryStore::new("system"))
    }

    #[tokio::test]
    async fn test_multi_intent_classification_preserves_order() {
        let gateway = CannedGateway::replying(
            r#"{"intents":[
                {"intent":"CreateTeam","parameters":{"name":"Growth"}},
                {"intent":"CreateOkrSession","parameters":{"title":"Q3 Plan","team":"Growth"}}
            ]}"#,
        );
        let intents = classifier(gateway)
            .classify("conv-1", "create team Growth then session Q3 Plan", None)
            .await;

        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].intent, "CreateTeam");
        assert_eq!(intents[0].parameter("name"), Some("Growth"));
        assert_eq!(intents[1].intent, "CreateOkrSession");
    }

    #[tokio::test]
    async fn test_markdown_fences_are_stripped() {
        let gateway = CannedGateway::replying(
            "```json\n{\"intents\":[{\"intent\":\"SearchTeams\",\"parameters\":{\"query\":\"growth\"}}]}\n```",
        );
        let intents = classifier(gateway)
            .classify("conv-1", "find growth teams", None)
            .await;

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].intent, "SearchTeams");
    }

    #[tokio::test]
    async fn test_legacy_single_intent_shape() {
        let gateway =
            CannedGateway::replying(r#"{"intent":"DeleteTeam","parameters":{"name":"Growth"}}"#);
        let intents = classifier(gateway)
            .classify("conv-1", "delete the growth team", None)
            .await;

        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].intent, "DeleteTeam");
    }

    #[tokio::test]
    async fn test_unparseable_output_degrades_to_general() {
        let gateway = CannedGateway::replying("Sure! I'd be happy to help with that.");
        let intents = classifier(gateway).classify("conv-1", "hello", None).await;

        assert_eq!(intents.len(), 1);
        assert!(intents[0].is_general());
    }

    #[tokio::test]
    async fn test_gateway_failure_degrades_to_general() {
        let gateway = CannedGateway::failing();
        let intents = classifier(gateway)
            .classify("conv-1", "create a team", None)
            .await;

        assert_eq!(intents.len(), 1);
        assert!(intents[0].is_general());
    }

    #[tokio::test]
    async fn test_condensed_provider_hint_selects_condensed_catalog() {
        let classifier = classifier(CannedGateway::replying("{}"));

        let condensed = classifier.build_system_prompt("conv-1", Some("cohere")).await;
        assert!(condensed.contains("CreateOkrSession(title, team, start_date, end_date)"));
        assert!(!condensed.contains("### CreateOkrSession"));

        let full = classifier.build_system_prompt("conv-1", None).await;
        assert!(full.contains("### CreateOkrSession"));
    }

    #[test]
    fn test_strip_code_fences_variants() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}

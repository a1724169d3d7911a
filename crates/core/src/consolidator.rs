use crate::gateway::{timed_complete, ChatCompletionGateway, ChatMessage};
use okr_copilot_common::FunctionResultItem;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const FALLBACK_MESSAGE: &str =
    "All requested operations completed successfully. Let me know if you need anything else.";

/// Merges the outcomes of a multi-intent turn into one natural reply.
/// Consolidation never errors; any gateway trouble falls back to a fixed
/// success sentence.
pub struct ResponseConsolidator {
    gateway: Arc<dyn ChatCompletionGateway>,
    timeout: Duration,
}

impl ResponseConsolidator {
    pub fn new(gateway: Arc<dyn ChatCompletionGateway>) -> Self {
        Self {
            gateway,
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn consolidate(&self, results: &[FunctionResultItem]) -> String {
        let summary = bullet_summary(results);
        let messages = [
            ChatMessage::system(
                "You summarize completed operations for the user. Rewrite the \
                 bullet list below as one natural, non-repetitive paragraph \
                 confirming what was done, and invite a follow-up. Do not \
                 invent operations that are not listed.",
            ),
            ChatMessage::user(summary),
        ];

        match timed_complete(self.gateway.as_ref(), &messages, false, self.timeout).await {
            Ok(outcome) if !outcome.text.trim().is_empty() => outcome.text,
            Ok(_) => FALLBACK_MESSAGE.to_string(),
            Err(e) => {
                warn!("Consolidation call failed, using fallback: {}", e);
                FALLBACK_MESSAGE.to_string()
            }
        }
    }
}

fn bullet_summary(results: &[FunctionResultItem]) -> String {
    let mut summary = String::from("Completed operations:\n");
    for item in results {
        let operation = item
            .operation
            .map(|op| op.as_str())
            .unwrap_or("performed");
        let entity_type = item
            .entity_type
            .map(|t| t.as_str())
            .unwrap_or("item");
        let name = item.entity_name.as_deref().unwrap_or("(unnamed)");
        match item.entity_id {
            Some(id) => summary.push_str(&format!(
                "- {} {} \"{}\" (id {})\n",
                operation, entity_type, name, id
            )),
            None => summary.push_str(&format!("- {} {} \"{}\"\n", operation, entity_type, name)),
        }
    }
    summary
}

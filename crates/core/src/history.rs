use okr_copilot_common::{
    metadata_keys, CopilotError, EntityOperation, EntityType, Message, MessageRole, Result,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Per-conversation ordered message log.
///
/// Invariant: a history always begins with exactly one System message; reset
/// clears everything and re-seeds it.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

impl ConversationHistory {
    fn seeded(conversation_id: &str, system_prompt: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            messages: vec![Message::system(system_prompt)],
        }
    }
}

/// An entity reference recovered from the history, newest occurrence wins.
#[derive(Debug, Clone)]
pub struct RecentEntity {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub entity_name: Option<String>,
    pub operation: Option<EntityOperation>,
}

/// In-memory conversation history store.
///
/// Cheap to clone; independent conversations may be mutated concurrently.
/// Look-ups on an unknown conversation ID auto-create an empty seeded history
/// rather than erroring.
#[derive(Clone)]
pub struct HistoryStore {
    conversations: Arc<RwLock<HashMap<String, ConversationHistory>>>,
    system_prompt: String,
}

impl HistoryStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            system_prompt: system_prompt.into(),
        }
    }

    /// Returns a snapshot of the conversation, creating a seeded history on
    /// first access.
    pub async fn get(&self, conversation_id: &str) -> ConversationHistory {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!("Creating history for conversation {}", conversation_id);
                ConversationHistory::seeded(conversation_id, &self.system_prompt)
            })
            .clone()
    }

    pub async fn append(&self, conversation_id: &str, message: Message) {
        let mut conversations = self.conversations.write().await;
        let history = conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| ConversationHistory::seeded(conversation_id, &self.system_prompt));
        history.messages.push(message);
        debug!(
            "Appended message to conversation {} ({} total)",
            conversation_id,
            history.messages.len()
        );
    }

    /// Clears the conversation and re-seeds the System message.
    pub async fn reset(&self, conversation_id: &str) {
        let mut conversations = self.conversations.write().await;
        conversations.insert(
            conversation_id.to_string(),
            ConversationHistory::seeded(conversation_id, &self.system_prompt),
        );
        info!("Reset conversation {}", conversation_id);
    }

    /// Newest-first scan for the most recent message tagged with the given
    /// entity type.
    pub async fn most_recent_entity_id(
        &self,
        conversation_id: &str,
        entity_type: EntityType,
    ) -> Option<Uuid> {
        self.most_recent_entity(conversation_id, entity_type)
            .await
            .map(|entity| entity.entity_id)
    }

    pub async fn most_recent_entity(
        &self,
        conversation_id: &str,
        entity_type: EntityType,
    ) -> Option<RecentEntity> {
        let conversations = self.conversations.read().await;
        let history = conversations.get(conversation_id)?;
        history
            .messages
            .iter()
            .rev()
            .find_map(|message| recent_entity_from(message, Some(entity_type)))
    }

    /// One entry per entity type seen in FunctionResult messages, newest
    /// occurrence wins, deduplicated by entity id.
    pub async fn recent_entities(&self, conversation_id: &str) -> Vec<RecentEntity> {
        let conversations = self.conversations.read().await;
        let Some(history) = conversations.get(conversation_id) else {
            return Vec::new();
        };

        let mut seen_types: Vec<EntityType> = Vec::new();
        let mut seen_ids: Vec<Uuid> = Vec::new();
        let mut entities = Vec::new();
        for message in history.messages.iter().rev() {
            let Some(entity) = recent_entity_from(message, None) else {
                continue;
            };
            if seen_types.contains(&entity.entity_type) || seen_ids.contains(&entity.entity_id) {
                continue;
            }
            seen_types.push(entity.entity_type);
            seen_ids.push(entity.entity_id);
            entities.push(entity);
        }
        entities
    }

    /// Newest-first scan for the last FunctionResult produced by the named
    /// function, deserialized into `T`.
    pub async fn last_function_result<T: DeserializeOwned>(
        &self,
        conversation_id: &str,
        function_name: &str,
    ) -> Result<T> {
        let conversations = self.conversations.read().await;
        let history = conversations.get(conversation_id).ok_or_else(|| {
            CopilotError::NotFound(format!(
                "No result of {} recorded for conversation {}",
                function_name, conversation_id
            ))
        })?;

        let payload = history
            .messages
            .iter()
            .rev()
            .filter(|message| message.role == MessageRole::FunctionResult)
            .find(|message| message.metadata_value(metadata_keys::FUNCTION) == Some(function_name))
            .and_then(|message| message.metadata_value(metadata_keys::PAYLOAD))
            .ok_or_else(|| {
                CopilotError::NotFound(format!(
                    "No result of {} recorded for conversation {}",
                    function_name, conversation_id
                ))
            })?;

        serde_json::from_str(payload).map_err(|e| {
            CopilotError::Internal(format!(
                "Stored result of {} no longer matches the expected shape: {}",
                function_name, e
            ))
        })
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

fn recent_entity_from(message: &Message, wanted: Option<EntityType>) -> Option<RecentEntity> {
    if message.role != MessageRole::FunctionResult {
        return None;
    }
    let entity_type = EntityType::parse(message.metadata_value(metadata_keys::ENTITY_TYPE)?)?;
    if wanted.is_some_and(|w| w != entity_type) {
        return None;
    }
    let entity_id = Uuid::parse_str(message.metadata_value(metadata_keys::ENTITY_ID)?).ok()?;
    Some(RecentEntity {
        entity_type,
        entity_id,
        entity_name: message
            .metadata_value(metadata_keys::ENTITY_NAME)
            .map(|v| v.to_string()),
        operation: message
            .metadata_value(metadata_keys::OPERATION)
            .and_then(EntityOperation::parse),
    })
}

/// Builds the FunctionResult message recorded after a successful handler run.
pub fn function_result_message(
    function_name: &str,
    summary: &str,
    entity_type: EntityType,
    entity_id: Uuid,
    entity_name: Option<&str>,
    operation: EntityOperation,
    payload: Option<&serde_json::Value>,
) -> Message {
    let mut message = Message::function_result(summary)
        .with_metadata(metadata_keys::FUNCTION, function_name)
        .with_metadata(metadata_keys::ENTITY_TYPE, entity_type.as_str())
        .with_metadata(metadata_keys::ENTITY_ID, entity_id.to_string())
        .with_metadata(metadata_keys::OPERATION, operation.as_str());
    if let Some(name) = entity_name {
        message = message.with_metadata(metadata_keys::ENTITY_NAME, name);
    }
    if let Some(payload) = payload {
        message = message.with_metadata(metadata_keys::PAYLOAD, payload.to_string());
    }
    message
}

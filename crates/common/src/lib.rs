use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// Conversation message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    FunctionResult,
}

/// Standard metadata keys attached to history messages.
pub mod metadata_keys {
    pub const ENTITY_TYPE: &str = "EntityType";
    pub const ENTITY_ID: &str = "EntityId";
    pub const ENTITY_NAME: &str = "EntityName";
    pub const OPERATION: &str = "Operation";
    pub const FUNCTION: &str = "Function";
    pub const PROVIDER: &str = "Provider";
    pub const PAYLOAD: &str = "Payload";
}

/// One turn in a conversation. Immutable once appended to a history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn function_result(content: impl Into<String>) -> Self {
        Self::new(MessageRole::FunctionResult, content)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|v| v.as_str())
    }
}

// Intent types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub intent: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl IntentRequest {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            parameters: HashMap::new(),
        }
    }

    pub fn general() -> Self {
        Self::new(GENERAL_INTENT)
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(|v| v.as_str())
    }

    pub fn is_general(&self) -> bool {
        self.intent == GENERAL_INTENT
    }
}

/// Conversational no-op intent; the classifier degrades to this on any
/// unparseable model output.
pub const GENERAL_INTENT: &str = "General";

// Entity taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Team,
    Member,
    OkrSession,
    Objective,
    KeyResult,
    WorkItem,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Team => "Team",
            EntityType::Member => "Member",
            EntityType::OkrSession => "OkrSession",
            EntityType::Objective => "Objective",
            EntityType::KeyResult => "KeyResult",
            EntityType::WorkItem => "WorkItem",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Team" => Some(EntityType::Team),
            "Member" => Some(EntityType::Member),
            "OkrSession" => Some(EntityType::OkrSession),
            "Objective" => Some(EntityType::Objective),
            "KeyResult" => Some(EntityType::KeyResult),
            "WorkItem" => Some(EntityType::WorkItem),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityOperation {
    Created,
    Updated,
    Deleted,
    Viewed,
    Searched,
}

impl EntityOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityOperation::Created => "created",
            EntityOperation::Updated => "updated",
            EntityOperation::Deleted => "deleted",
            EntityOperation::Viewed => "viewed",
            EntityOperation::Searched => "searched",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(EntityOperation::Created),
            "updated" => Some(EntityOperation::Updated),
            "deleted" => Some(EntityOperation::Deleted),
            "viewed" => Some(EntityOperation::Viewed),
            "searched" => Some(EntityOperation::Searched),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Execution result types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionExecutionResult {
    pub success: bool,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub entity_name: Option<String>,
    pub operation: Option<EntityOperation>,
}

impl FunctionExecutionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
            entity_type: None,
            entity_id: None,
            entity_name: None,
            operation: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
            entity_type: None,
            entity_id: None,
            entity_name: None,
            operation: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_entity(
        mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        entity_name: impl Into<String>,
        operation: EntityOperation,
    ) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id);
        self.entity_name = Some(entity_name.into());
        self.operation = Some(operation);
        self
    }
}

/// The slice of a `FunctionExecutionResult` retained across a multi-intent
/// turn for consolidation.
#[derive(Debug, Clone)]
pub struct FunctionResultItem {
    pub intent: String,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<Uuid>,
    pub entity_name: Option<String>,
    pub operation: Option<EntityOperation>,
}

impl FunctionResultItem {
    pub fn from_result(intent: &str, result: &FunctionExecutionResult) -> Self {
        Self {
            intent: intent.to_string(),
            message: result.message.clone(),
            payload: result.payload.clone(),
            entity_type: result.entity_type,
            entity_id: result.entity_id,
            entity_name: result.entity_name.clone(),
            operation: result.operation,
        }
    }
}

// User context for permission checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    TeamLead,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: UserRole,
}

impl UserContext {
    pub fn new(user_id: Uuid, display_name: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role,
        }
    }
}

// Domain entities exchanged with the external CRUD boundary. The copilot
// only holds these long enough to disambiguate and build replies.
pub trait Named {
    fn display_name(&self) -> &str;
    fn entity_id(&self) -> Uuid;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub team_id: Option<Uuid>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkrSession {
    pub id: Uuid,
    pub title: String,
    pub team_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: Uuid,
    pub title: String,
    pub session_id: Uuid,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResult {
    pub id: Uuid,
    pub title: String,
    pub objective_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemStatus {
    Todo,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub title: String,
    pub key_result_id: Uuid,
    pub assignee_id: Option<Uuid>,
    pub status: WorkItemStatus,
    pub priority: WorkItemPriority,
    pub due_date: Option<NaiveDate>,
}

impl WorkItem {
    pub fn is_active(&self) -> bool {
        self.status != WorkItemStatus::Completed
    }
}

macro_rules! impl_named {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(impl Named for $ty {
            fn display_name(&self) -> &str {
                &self.$field
            }

            fn entity_id(&self) -> Uuid {
                self.id
            }
        })*
    };
}

impl_named!(
    Team => name,
    Member => name,
    OkrSession => title,
    Objective => title,
    KeyResult => title,
    WorkItem => title,
);

// Error types
#[derive(Debug, thiserror::Error)]
pub enum CopilotError {
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous reference: {0}")]
    Ambiguous(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation failed: {0}")]
    Crud(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CopilotError>;

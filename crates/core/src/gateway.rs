use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        FunctionObjectArgs,
    },
    Client,
};
use async_trait::async_trait;
use okr_copilot_common::{CopilotError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Function,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A named operation the model invoked during a function-calling turn,
/// together with its output, as reported by the provider.
#[derive(Debug, Clone)]
pub struct InvokedFunction {
    pub name: String,
    pub arguments: serde_json::Value,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub text: String,
    pub invoked_functions: Vec<InvokedFunction>,
}

impl CompletionOutcome {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            invoked_functions: Vec::new(),
        }
    }
}

/// A data-gathering operation the model may invoke mid-completion. Mounted
/// on a gateway via `with_functions`; `parameters` is a JSON Schema object.
#[async_trait]
pub trait CallableFunction: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;
    async fn call(&self, arguments: &serde_json::Value) -> Result<String>;
}

/// Provider-agnostic chat completion seam. Classification calls pass
/// `allow_function_calls = false` and expect plain text; analysis phases pass
/// `true` so the model may call its registered data-gathering functions.
#[async_trait]
pub trait ChatCompletionGateway: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        allow_function_calls: bool,
    ) -> Result<CompletionOutcome>;

    fn provider_name(&self) -> &str;
}

/// Rounds of tool execution per completion before the call is abandoned.
const MAX_TOOL_ROUNDS: usize = 4;

/// OpenAI-compatible gateway backed by `async-openai`. Covers any provider
/// exposing the OpenAI chat API shape. When functions are mounted and the
/// caller allows calls, completions run a bounded tool loop: tool calls are
/// executed locally, their outputs fed back, and every invocation recorded
/// on the outcome.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u16,
    temperature: f32,
    functions: Vec<Arc<dyn CallableFunction>>,
}

impl OpenAiGateway {
    pub fn new(api_key: Option<String>) -> Self {
        let config = match api_key {
            Some(key) => OpenAIConfig::new().with_api_key(key),
            // Falls back to the OPENAI_API_KEY environment variable.
            None => OpenAIConfig::new(),
        };

        Self {
            client: Client::with_config(config),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 800,
            temperature: 0.2,
            functions: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u16) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_functions(mut self, functions: Vec<Arc<dyn CallableFunction>>) -> Self {
        self.functions = functions;
        self
    }

    fn tool_definitions(&self) -> Result<Vec<ChatCompletionTool>> {
        let mut tools = Vec::with_capacity(self.functions.len());
        for function in &self.functions {
            let definition = FunctionObjectArgs::default()
                .name(function.name())
                .description(function.description())
                .parameters(function.parameters())
                .build()
                .map_err(|e| CopilotError::Gateway(e.to_string()))?;
            tools.push(
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(definition)
                    .build()
                    .map_err(|e| CopilotError::Gateway(e.to_string()))?,
            );
        }
        Ok(tools)
    }

    async fn execute_call(&self, call: &ChatCompletionMessageToolCall) -> InvokedFunction {
        let arguments: serde_json::Value =
            serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
        let output = match self
            .functions
            .iter()
            .find(|function| function.name() == call.function.name)
        {
            Some(function) => match function.call(&arguments).await {
                Ok(output) => output,
                Err(e) => format!("error: {}", e),
            },
            None => format!("unknown function '{}'", call.function.name),
        };
        InvokedFunction {
            name: call.function.name.clone(),
            arguments,
            output,
        }
    }

    fn build_request(
        &self,
        request_messages: Vec<ChatCompletionRequestMessage>,
        tools: &[ChatCompletionTool],
    ) -> Result<CreateChatCompletionRequest> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(request_messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature);
        if !tools.is_empty() {
            builder
                .tools(tools.to_vec())
                .tool_choice(ChatCompletionToolChoiceOption::Auto);
        }
        builder
            .build()
            .map_err(|e| CopilotError::Gateway(e.to_string()))
    }
}

fn request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let converted = match message.role {
        ChatRole::System => ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| CopilotError::Gateway(e.to_string()))?,
        ),
        ChatRole::User => ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| CopilotError::Gateway(e.to_string()))?,
        ),
        ChatRole::Assistant | ChatRole::Function => ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .map_err(|e| CopilotError::Gateway(e.to_string()))?,
        ),
    };
    Ok(converted)
}

#[async_trait]
impl ChatCompletionGateway for OpenAiGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        allow_function_calls: bool,
    ) -> Result<CompletionOutcome> {
        let mut request_messages = messages
            .iter()
            .map(request_message)
            .collect::<Result<Vec<_>>>()?;
        let tools = if allow_function_calls {
            self.tool_definitions()?
        } else {
            Vec::new()
        };
        let mut invoked = Vec::new();

        for _ in 0..MAX_TOOL_ROUNDS {
            let request = self.build_request(request_messages.clone(), &tools)?;
            debug!(
                "Sending completion request ({} messages, {} tools)",
                request_messages.len(),
                tools.len()
            );
            let response = self.client.chat().create(request).await.map_err(|e| {
                error!("Completion request failed: {}", e);
                CopilotError::Gateway(e.to_string())
            })?;

            let message = match response.choices.into_iter().next() {
                Some(choice) => choice.message,
                None => {
                    return Ok(CompletionOutcome {
                        text: String::new(),
                        invoked_functions: invoked,
                    })
                }
            };

            let tool_calls = message.tool_calls.unwrap_or_default();
            if tool_calls.is_empty() {
                return Ok(CompletionOutcome {
                    text: message.content.unwrap_or_default(),
                    invoked_functions: invoked,
                });
            }

            request_messages.push(ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .tool_calls(tool_calls.clone())
                    .build()
                    .map_err(|e| CopilotError::Gateway(e.to_string()))?,
            ));
            for call in &tool_calls {
                let record = self.execute_call(call).await;
                request_messages.push(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(call.id.clone())
                        .content(record.output.clone())
                        .build()
                        .map_err(|e| CopilotError::Gateway(e.to_string()))?,
                ));
                invoked.push(record);
            }
        }

        Err(CopilotError::Gateway(format!(
            "tool-call loop did not settle within {} rounds",
            MAX_TOOL_ROUNDS
        )))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

/// Runs a gateway call under a time budget. Timeouts surface as a
/// `Gateway` error so call sites can degrade to their fixed fallback text.
pub async fn timed_complete(
    gateway: &dyn ChatCompletionGateway,
    messages: &[ChatMessage],
    allow_function_calls: bool,
    budget: Duration,
) -> Result<CompletionOutcome> {
    match timeout(budget, gateway.complete(messages, allow_function_calls)).await {
        Ok(result) => result,
        Err(_) => Err(CopilotError::Gateway(format!(
            "{} completion timed out after {:?}",
            gateway.provider_name(),
            budget
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::FunctionCall;
    use serde_json::json;

    struct SlowGateway;

    #[async_trait]
    impl ChatCompletionGateway for SlowGateway {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _allow_function_calls: bool,
        ) -> Result<CompletionOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(CompletionOutcome::text_only("too late"))
        }

        fn provider_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_complete_times_out() {
        let gateway = SlowGateway;
        let result = timed_complete(
            &gateway,
            &[ChatMessage::user("hello")],
            false,
            Duration::from_millis(50),
        )
        .await;

        match result {
            Err(CopilotError::Gateway(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other.map(|o| o.text)),
        }
    }

    struct SessionLister;

    #[async_trait]
    impl CallableFunction for SessionLister {
        fn name(&self) -> &str {
            "list_okr_sessions"
        }

        fn description(&self) -> &str {
            "Lists OKR sessions matching a query."
        }

        fn parameters(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Substring filter." }
                }
            })
        }

        async fn call(&self, arguments: &serde_json::Value) -> Result<String> {
            let query = arguments["query"].as_str().unwrap_or("");
            Ok(format!("sessions matching '{}': Q3 Plan", query))
        }
    }

    fn gateway_with_functions() -> OpenAiGateway {
        OpenAiGateway::new(Some("test-key".to_string()))
            .with_functions(vec![Arc::new(SessionLister)])
    }

    #[test]
    fn test_tools_attached_only_when_calls_allowed() {
        let gateway = gateway_with_functions();
        let messages = vec![request_message(&ChatMessage::user("analyze Q3")).unwrap()];

        let with_tools = gateway
            .build_request(messages.clone(), &gateway.tool_definitions().unwrap())
            .unwrap();
        let tools = with_tools.tools.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].function.name, "list_okr_sessions");

        let without_tools = gateway.build_request(messages, &[]).unwrap();
        assert!(without_tools.tools.is_none());
    }

    #[tokio::test]
    async fn test_execute_call_records_arguments_and_output() {
        let gateway = gateway_with_functions();
        let call = ChatCompletionMessageToolCall {
            id: "call-1".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: "list_okr_sessions".to_string(),
                arguments: r#"{"query":"Q3"}"#.to_string(),
            },
        };

        let invoked = gateway.execute_call(&call).await;
        assert_eq!(invoked.name, "list_okr_sessions");
        assert_eq!(invoked.arguments["query"], "Q3");
        assert_eq!(invoked.output, "sessions matching 'Q3': Q3 Plan");
    }

    #[tokio::test]
    async fn test_execute_call_reports_unknown_function() {
        let gateway = gateway_with_functions();
        let call = ChatCompletionMessageToolCall {
            id: "call-2".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: "launch_rocket".to_string(),
                arguments: "{}".to_string(),
            },
        };

        let invoked = gateway.execute_call(&call).await;
        assert!(invoked.output.contains("unknown function"));
    }
}

//! OpenAI chat-completions backend.

use super::{ChatMessage, ChatModel, CompletionRequest, ModelReply, ModelToolCall, ToolDefinition};
use crate::error::{BaristaError, Result};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
    FunctionObject,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat model served by the OpenAI API.
pub struct OpenAIChatModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAIChatModel {
    /// Create a model client with the given request timeout.
    pub fn new(model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        let messages = request
            .messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(&self.model).messages(messages);
        if !request.tools.is_empty() {
            builder.tools(request.tools.iter().map(to_tool).collect::<Vec<_>>());
        }
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }
        let api_request = builder
            .build()
            .map_err(|e| BaristaError::Model(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(|e| BaristaError::OpenAI(format!("Chat API error: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BaristaError::Model("No response from model".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ModelToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect::<Vec<_>>();

        debug!("Model replied with {} tool call(s)", tool_calls.len());

        Ok(ModelReply {
            content: choice.message.content,
            tool_calls,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let converted: ChatCompletionRequestMessage = match message {
        ChatMessage::System { content } => ChatCompletionRequestSystemMessageArgs::default()
            .content(content.as_str())
            .build()
            .map_err(|e| BaristaError::Model(e.to_string()))?
            .into(),
        ChatMessage::User { content } => ChatCompletionRequestUserMessageArgs::default()
            .content(content.as_str())
            .build()
            .map_err(|e| BaristaError::Model(e.to_string()))?
            .into(),
        ChatMessage::Assistant { content } => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content.as_str())
            .build()
            .map_err(|e| BaristaError::Model(e.to_string()))?
            .into(),
        ChatMessage::ToolCall { id, name, arguments } => {
            ChatCompletionRequestAssistantMessageArgs::default()
                .tool_calls(vec![ChatCompletionMessageToolCall {
                    id: id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    },
                }])
                .build()
                .map_err(|e| BaristaError::Model(e.to_string()))?
                .into()
        }
        ChatMessage::ToolResult { id, content } => ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(id.as_str())
            .content(content.as_str())
            .build()
            .map_err(|e| BaristaError::Model(e.to_string()))?
            .into(),
    };
    Ok(converted)
}

fn to_tool(definition: &ToolDefinition) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: definition.name.clone(),
            description: Some(definition.description.clone()),
            parameters: Some(definition.parameters.clone()),
            strict: None,
        },
    }
}

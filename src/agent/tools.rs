//! Tool definitions and implementations for the agent system.
//!
//! Every tool takes a single string input and returns a string observation.
//! Tools never fail: errors are turned into observation text the model can
//! read and narrate.

use crate::config::{Prompts, Settings};
use crate::error::{BaristaError, Result};
use crate::llm::{ChatMessage, ChatModel, CompletionRequest, ToolDefinition};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// The tools the agent can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Calculator,
    ProductLookup,
    OutletLookup,
}

impl ToolKind {
    /// Name the model uses to call this tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "calculator",
            ToolKind::ProductLookup => "product_lookup",
            ToolKind::OutletLookup => "outlet_lookup",
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            ToolKind::Calculator => {
                "Evaluate an arithmetic expression or word problem. \
                Use this for any calculation; input is the expression, e.g. '12 * 7'."
            }
            ToolKind::ProductLookup => {
                "Answer questions about ZUS Coffee products such as drinkware, tumblers and mugs. \
                Input is the customer's product question."
            }
            ToolKind::OutletLookup => {
                "Answer questions about ZUS Coffee outlets: locations, addresses, opening hours \
                and services. Input must name an outlet or area, e.g. 'outlets in Petaling Jaya'."
            }
        }
    }

    /// Question to ask the user when the model calls this tool with no input.
    pub fn clarifying_question(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "Which calculation would you like me to work out?",
            ToolKind::ProductLookup => "Which product would you like to know about?",
            ToolKind::OutletLookup => {
                "Which outlet or area are you asking about? For example, 'outlets in Petaling Jaya'."
            }
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Name and description the model sees for a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub kind: ToolKind,
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(kind: ToolKind) -> Self {
        Self {
            kind,
            name: kind.name().to_string(),
            description: kind.default_description().to_string(),
        }
    }

    /// Function definition sent with each model request.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The input for the tool"
                    }
                },
                "required": ["query"]
            }),
        }
    }
}

/// A capability the agent can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool. Failures are reported in the returned observation.
    async fn call(&self, input: &str) -> String;
}

/// Calculator backed by a secondary model call.
pub struct Calculator {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl Calculator {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: &str) -> Self {
        Self {
            model,
            system_prompt: system_prompt.to_string(),
        }
    }

    async fn evaluate(&self, input: &str) -> Result<String> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(input),
        ])
        .with_temperature(0.0);

        let reply = self.model.complete(&request).await?;
        let text = reply
            .content
            .ok_or_else(|| BaristaError::Model("Empty response from calculator model".to_string()))?;

        parse_number(&text)
    }
}

#[async_trait]
impl Tool for Calculator {
    #[instrument(skip(self))]
    async fn call(&self, input: &str) -> String {
        match self.evaluate(input).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Calculator failed on '{}': {}", input, e);
                format!("Calculator tool failed: {}", e)
            }
        }
    }
}

/// Validate a numeric model reply and normalise it.
///
/// Whole numbers are rendered without a fractional part.
fn parse_number(text: &str) -> Result<String> {
    let cleaned: String = text
        .trim()
        .trim_end_matches('.')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let value: f64 = cleaned
        .parse()
        .map_err(|_| BaristaError::InvalidInput(format!("not a numeric result: '{}'", text.trim())))?;

    if !value.is_finite() {
        return Err(BaristaError::InvalidInput(format!(
            "result is not a finite number: '{}'",
            text.trim()
        )));
    }

    if value.fract() == 0.0 && value.abs() < 1e15 {
        Ok(format!("{}", value as i64))
    } else {
        Ok(format!("{}", value))
    }
}

/// Which sibling service a lookup tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupService {
    Products,
    Outlets,
}

impl LookupService {
    /// JSON field holding the answer.
    fn field(&self) -> &'static str {
        match self {
            LookupService::Products => "summary",
            LookupService::Outlets => "results",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LookupService::Products => "product knowledge base",
            LookupService::Outlets => "outlet database",
        }
    }
}

/// Tool that forwards the query to an HTTP endpoint and extracts one field.
pub struct LookupTool {
    client: reqwest::Client,
    endpoint: Url,
    service: LookupService,
}

impl LookupTool {
    pub fn new(client: reqwest::Client, endpoint: &str, service: LookupService) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            service,
        })
    }

    fn connection_error(&self, detail: impl std::fmt::Display) -> String {
        format!(
            "API Error: Could not connect to the {}: {}",
            self.service.label(),
            detail
        )
    }
}

#[async_trait]
impl Tool for LookupTool {
    #[instrument(skip(self), fields(service = ?self.service))]
    async fn call(&self, input: &str) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("query", input);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} request failed: {}", self.service.label(), e);
                return self.connection_error(e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned status {}", self.service.label(), status);
            return self.connection_error(format!("service responded with status {}", status.as_u16()));
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return self.connection_error(format!("unreadable response ({})", e)),
        };

        if let Some(sql) = body.get("sql_query").and_then(|v| v.as_str()) {
            debug!("Outlet service ran SQL: {}", sql);
        }

        match body.get(self.service.field()) {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => self.connection_error(format!(
                "response had no '{}' field",
                self.service.field()
            )),
        }
    }
}

/// A tool together with the spec the model sees.
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub tool: Arc<dyn Tool>,
}

/// Fixed set of tools available to the agent.
pub struct ToolRegistry {
    tools: HashMap<ToolKind, RegisteredTool>,
    order: Vec<ToolKind>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Build the calculator, product and outlet tools from settings.
    pub fn standard(
        settings: &Settings,
        prompts: &Prompts,
        calculator_model: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.services.timeout_secs))
            .build()?;

        Self::builder()
            .register(
                ToolSpec::new(ToolKind::Calculator),
                Arc::new(Calculator::new(calculator_model, &prompts.calculator.system)),
            )
            .register(
                ToolSpec::new(ToolKind::ProductLookup),
                Arc::new(LookupTool::new(
                    client.clone(),
                    &settings.services.products_url,
                    LookupService::Products,
                )?),
            )
            .register(
                ToolSpec::new(ToolKind::OutletLookup),
                Arc::new(LookupTool::new(
                    client,
                    &settings.services.outlets_url,
                    LookupService::Outlets,
                )?),
            )
            .build()
    }

    /// Validate a model-supplied name against the registered tools.
    pub fn resolve(&self, name: &str) -> Option<ToolKind> {
        let name = name.trim();
        self.order
            .iter()
            .copied()
            .find(|kind| self.tools.get(kind).is_some_and(|t| t.spec.name == name))
    }

    /// Function definitions for the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|kind| self.tools.get(kind))
            .map(|t| t.spec.definition())
            .collect()
    }

    /// Invoke a registered tool.
    pub async fn invoke(&self, kind: ToolKind, input: &str) -> String {
        match self.tools.get(&kind) {
            Some(registered) => {
                info!("Calling tool {} with input: {}", registered.spec.name, input);
                registered.tool.call(input).await
            }
            // resolve() only hands out registered kinds
            None => format!("Tool error: {} is not available", kind),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Collects tools and checks the set is consistent.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    entries: Vec<RegisteredTool>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, spec: ToolSpec, tool: Arc<dyn Tool>) -> Self {
        self.entries.push(RegisteredTool { spec, tool });
        self
    }

    /// Fails on an empty set, a repeated tool, or a repeated name.
    pub fn build(self) -> Result<ToolRegistry> {
        if self.entries.is_empty() {
            return Err(BaristaError::Registry("no tools registered".to_string()));
        }

        let mut names = HashSet::new();
        let mut tools = HashMap::new();
        let mut order = Vec::new();

        for entry in self.entries {
            if entry.spec.name.trim().is_empty() {
                return Err(BaristaError::Registry(format!(
                    "{:?} has an empty name",
                    entry.spec.kind
                )));
            }
            if !names.insert(entry.spec.name.clone()) {
                return Err(BaristaError::Registry(format!(
                    "duplicate tool name '{}'",
                    entry.spec.name
                )));
            }
            let kind = entry.spec.kind;
            if tools.insert(kind, entry).is_some() {
                return Err(BaristaError::Registry(format!(
                    "{:?} registered twice",
                    kind
                )));
            }
            order.push(kind);
        }

        Ok(ToolRegistry { tools, order })
    }
}

/// Extract the string input from a tool call's raw arguments.
///
/// Accepts `{"query": "..."}`, a JSON string, or plain text. An object with no
/// usable field yields an empty input.
pub fn parse_tool_input(arguments: &str) -> Result<String> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => {
            let value = ["query", "input", "expression"]
                .iter()
                .find_map(|key| map.get(*key))
                .or_else(|| if map.len() == 1 { map.values().next() } else { None });
            match value {
                Some(serde_json::Value::String(s)) => Ok(s.trim().to_string()),
                Some(serde_json::Value::Null) | None => Ok(String::new()),
                Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
                Some(other) => Err(BaristaError::InvalidInput(format!(
                    "unsupported tool argument: {}",
                    other
                ))),
            }
        }
        Ok(serde_json::Value::String(s)) => Ok(s.trim().to_string()),
        Ok(serde_json::Value::Number(n)) => Ok(n.to_string()),
        Ok(other) => Err(BaristaError::InvalidInput(format!(
            "unsupported tool arguments: {}",
            other
        ))),
        Err(_) => Ok(trimmed.to_string()),
    }
}

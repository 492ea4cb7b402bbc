//! Agent runner with tool calling loop.

use super::tools::{parse_tool_input, ToolKind, ToolRegistry};
use crate::config::AgentPrompts;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest, ModelReply};
use crate::memory::Session;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Default maximum model calls per turn.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Answer used when the model's reply is neither a tool call nor an answer.
pub const FALLBACK_MESSAGE: &str =
    "I'm having trouble with that request. Could you rephrase it?";

/// Answer used when a turn runs out of iterations.
pub const ITERATION_LIMIT_MESSAGE: &str = "I'm having trouble with that request. \
Could you rephrase it or tell me a bit more about what you need?";

/// Answer used when the language model cannot be reached.
pub const MODEL_UNAVAILABLE_MESSAGE: &str =
    "Sorry, I can't reach my language service right now. Please try again in a moment.";

/// What the model decided to do in one step.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    FinalAnswer(String),
    ToolInvocations(Vec<ToolInvocation>),
}

/// A validated request to run a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: ToolKind,
    /// Arguments exactly as the model sent them.
    pub arguments: String,
    pub input: String,
}

/// Interpret a model reply. The tool names in it are untrusted and are
/// checked against the registry.
pub fn parse_step(reply: &ModelReply, tools: &ToolRegistry) -> Result<AgentStep, String> {
    if reply.tool_calls.is_empty() {
        return match reply.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(AgentStep::FinalAnswer(text.to_string())),
            _ => Err("empty reply".to_string()),
        };
    }

    let mut invocations = Vec::with_capacity(reply.tool_calls.len());
    for (index, call) in reply.tool_calls.iter().enumerate() {
        let tool = tools
            .resolve(&call.name)
            .ok_or_else(|| format!("unknown tool '{}'", call.name))?;
        let input = parse_tool_input(&call.arguments)
            .map_err(|e| format!("bad arguments for {}: {}", tool, e))?;
        let call_id = if call.id.is_empty() {
            format!("call_{}", index)
        } else {
            call.id.clone()
        };
        invocations.push(ToolInvocation {
            call_id,
            tool,
            arguments: call.arguments.clone(),
            input,
        });
    }
    Ok(AgentStep::ToolInvocations(invocations))
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced a final answer.
    Answered,
    /// A tool was called without the input it needs; the user was asked for it.
    Clarification,
    /// The model's reply could not be interpreted.
    MalformedOutput,
    /// The iteration cap was reached.
    IterationLimit,
    /// The model call itself failed.
    ModelUnavailable,
}

/// One tool call and its observation within a turn.
#[derive(Debug, Clone)]
pub struct ScratchpadEntry {
    pub call_id: String,
    pub tool: ToolKind,
    pub arguments: String,
    pub input: String,
    pub observation: String,
}

impl ScratchpadEntry {
    /// Whether the observation reports a tool failure.
    pub fn failed(&self) -> bool {
        self.observation.starts_with("API Error:")
            || self.observation.starts_with("Calculator tool failed:")
            || self.observation.starts_with("Tool error:")
    }
}

impl std::fmt::Display for ScratchpadEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.tool, self.input)
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text shown to the user and stored in memory.
    pub answer: String,
    /// Tool calls made during the turn, in order.
    pub scratchpad: Vec<ScratchpadEntry>,
    /// Number of model calls made.
    pub iterations: usize,
    pub stop_reason: StopReason,
}

/// Tool-routing conversational agent.
///
/// Holds no conversation state; each turn runs against the [`Session`] passed in.
pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    max_iterations: usize,
    system_prompt: String,
    temperature: Option<f32>,
}

impl Agent {
    /// Create a new agent with the given model and tools.
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: AgentPrompts::default().system,
            temperature: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    /// Set maximum iterations for the agent loop. Zero is treated as one.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn. Always completes: failures become the answer text, and
    /// the user message plus answer are appended to the session memory.
    #[instrument(skip(self, session), fields(session = %session.id()))]
    pub async fn run_turn(&self, session: &mut Session, input: &str) -> TurnOutcome {
        info!("User: {}", input);

        let mut scratchpad: Vec<ScratchpadEntry> = Vec::new();
        let mut iterations = 0;

        let (answer, stop_reason) = loop {
            if iterations >= self.max_iterations {
                warn!("Turn exceeded maximum iterations ({})", self.max_iterations);
                break (ITERATION_LIMIT_MESSAGE.to_string(), StopReason::IterationLimit);
            }
            iterations += 1;
            debug!("Agent iteration {}, {} scratchpad entries", iterations, scratchpad.len());

            let request = self.build_request(session, input, &scratchpad);
            let reply = match self.model.complete(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Model call failed: {}", e);
                    break (MODEL_UNAVAILABLE_MESSAGE.to_string(), StopReason::ModelUnavailable);
                }
            };

            let invocations = match parse_step(&reply, &self.tools) {
                Ok(AgentStep::FinalAnswer(text)) => break (text, StopReason::Answered),
                Ok(AgentStep::ToolInvocations(invocations)) => invocations,
                Err(reason) => {
                    warn!("Malformed model output: {}", reason);
                    break (FALLBACK_MESSAGE.to_string(), StopReason::MalformedOutput);
                }
            };

            if let Some(missing) = invocations.iter().find(|inv| inv.input.is_empty()) {
                info!("{} called without input, asking for clarification", missing.tool);
                break (
                    missing.tool.clarifying_question().to_string(),
                    StopReason::Clarification,
                );
            }

            for invocation in invocations {
                let observation = self.tools.invoke(invocation.tool, &invocation.input).await;
                debug!("{} -> {}", invocation.tool, observation);
                scratchpad.push(ScratchpadEntry {
                    call_id: invocation.call_id,
                    tool: invocation.tool,
                    arguments: invocation.arguments,
                    input: invocation.input,
                    observation,
                });
            }
        };

        session.memory.record_turn(input, &answer);
        info!("Turn finished after {} iteration(s): {:?}", iterations, stop_reason);

        TurnOutcome {
            answer,
            scratchpad,
            iterations,
            stop_reason,
        }
    }

    fn build_request(
        &self,
        session: &Session,
        input: &str,
        scratchpad: &[ScratchpadEntry],
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(session.memory.len() + scratchpad.len() * 2 + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(session.memory.to_chat_messages());
        messages.push(ChatMessage::user(input));

        for entry in scratchpad {
            messages.push(ChatMessage::ToolCall {
                id: entry.call_id.clone(),
                name: entry.tool.name().to_string(),
                arguments: entry.arguments.clone(),
            });
            messages.push(ChatMessage::ToolResult {
                id: entry.call_id.clone(),
                content: entry.observation.clone(),
            });
        }

        let request = CompletionRequest::new(messages).with_tools(self.tools.definitions());
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::{Calculator, LookupService, LookupTool, Tool, ToolSpec};
    use crate::llm::scripted::ScriptedModel;
    use crate::memory::{Retention, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        calls: AtomicUsize,
        observation: String,
    }

    impl CountingTool {
        fn new(observation: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                observation: observation.to_string(),
            })
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        async fn call(&self, _input: &str) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.observation.clone()
        }
    }

    fn registry_with(kind: ToolKind, tool: Arc<dyn Tool>) -> ToolRegistry {
        ToolRegistry::builder()
            .register(ToolSpec::new(kind), tool)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_calculator_turn() {
        let agent_model = Arc::new(ScriptedModel::new(vec![
            ModelReply::tool_call("call_1", "calculator", r#"{"query": "12 * 7"}"#),
            ModelReply::text("12 * 7 is 84."),
        ]));
        let calculator_model = Arc::new(ScriptedModel::new(vec![ModelReply::text("84")]));
        let tools = registry_with(
            ToolKind::Calculator,
            Arc::new(Calculator::new(calculator_model, "numbers only")),
        );
        let agent = Agent::new(agent_model.clone(), tools);
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "What is 12 * 7?").await;

        assert_eq!(outcome.stop_reason, StopReason::Answered);
        assert!(outcome.answer.contains("84"));
        assert_eq!(outcome.scratchpad.len(), 1);
        assert_eq!(outcome.scratchpad[0].tool, ToolKind::Calculator);
        assert_eq!(outcome.scratchpad[0].observation, "84");
        assert_eq!(outcome.iterations, 2);

        // The second request carries the call and its observation.
        let requests = agent_model.requests();
        let last = requests[1].messages.last().unwrap();
        assert_eq!(
            last,
            &ChatMessage::ToolResult {
                id: "call_1".to_string(),
                content: "84".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_memory_grows_by_two_per_turn() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelReply::text("Hello!"),
            ModelReply::tool_call("c1", "product_lookup", r#"{"query": "tumbler"}"#),
            ModelReply::text("The tumbler keeps drinks cold."),
        ]));
        let tool = CountingTool::new("Insulated tumbler");
        let agent = Agent::new(model.clone(), registry_with(ToolKind::ProductLookup, tool));
        let mut session = Session::new(Retention::Unbounded);

        agent.run_turn(&mut session, "Hi").await;
        assert_eq!(session.memory.len(), 2);

        agent.run_turn(&mut session, "Tell me about the tumbler").await;
        assert_eq!(session.memory.len(), 4);

        let roles: Vec<_> = session.memory.messages().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        // Tool traffic stays out of memory.
        assert!(session
            .memory
            .messages()
            .all(|m| m.content() != "Insulated tumbler"));

        // Prior turns are sent back to the model.
        let requests = model.requests();
        assert_eq!(requests[1].messages[1], ChatMessage::user("Hi"));
        assert_eq!(requests[1].messages[2], ChatMessage::assistant("Hello!"));
    }

    #[tokio::test]
    async fn test_each_tool_call_adds_one_scratchpad_entry() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelReply::tool_call("c1", "outlet_lookup", r#"{"query": "SS2"}"#),
            ModelReply::tool_call("c2", "outlet_lookup", r#"{"query": "Damansara"}"#),
            ModelReply::text("Both areas have outlets."),
        ]));
        let tool = CountingTool::new("[('ZUS Coffee SS2',)]");
        let agent = Agent::new(model, registry_with(ToolKind::OutletLookup, tool.clone()));
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "Outlets in SS2 and Damansara?").await;

        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.scratchpad.len(), 2);
        assert_eq!(outcome.scratchpad[1].input, "Damansara");
        assert_eq!(format!("{}", outcome.scratchpad[0]), "outlet_lookup(SS2)");
    }

    #[tokio::test]
    async fn test_missing_parameter_asks_for_clarification() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::tool_call(
            "c1",
            "outlet_lookup",
            "{}",
        )]));
        let tool = CountingTool::new("unused");
        let agent = Agent::new(model, registry_with(ToolKind::OutletLookup, tool.clone()));
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "Tell me about outlets").await;

        assert_eq!(outcome.stop_reason, StopReason::Clarification);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.answer.to_lowercase().contains("which outlet"));
        assert_eq!(session.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_falls_back() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::tool_call(
            "c1",
            "drop_tables",
            r#"{"query": "all"}"#,
        )]));
        let tool = CountingTool::new("unused");
        let agent = Agent::new(model.clone(), registry_with(ToolKind::Calculator, tool.clone()));
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "hmm").await;

        assert_eq!(outcome.stop_reason, StopReason::MalformedOutput);
        assert_eq!(outcome.answer, FALLBACK_MESSAGE);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        // Not retried.
        assert_eq!(model.requests().len(), 1);
        assert_eq!(session.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back() {
        let model = Arc::new(ScriptedModel::new(vec![ModelReply::text("   ")]));
        let agent = Agent::new(
            model,
            registry_with(ToolKind::Calculator, CountingTool::new("unused")),
        );
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "?").await;
        assert_eq!(outcome.answer, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_iteration_limit_fails_closed() {
        let replies = (0..5)
            .map(|i| ModelReply::tool_call(format!("c{}", i), "calculator", r#"{"query": "1+1"}"#))
            .collect();
        let model = Arc::new(ScriptedModel::new(replies));
        let tool = CountingTool::new("2");
        let agent = Agent::new(model.clone(), registry_with(ToolKind::Calculator, tool.clone()))
            .with_max_iterations(3);
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "loop forever").await;

        assert_eq!(outcome.stop_reason, StopReason::IterationLimit);
        assert_eq!(outcome.answer, ITERATION_LIMIT_MESSAGE);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(model.requests().len(), 3);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 3);
        assert_eq!(session.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_model_outage_completes_turn() {
        let model = Arc::new(ScriptedModel::failing("503 Service Unavailable"));
        let agent = Agent::new(
            model,
            registry_with(ToolKind::Calculator, CountingTool::new("unused")),
        );
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent.run_turn(&mut session, "Hello").await;

        assert_eq!(outcome.stop_reason, StopReason::ModelUnavailable);
        assert!(!outcome.answer.contains("503"));
        assert_eq!(session.memory.len(), 2);
    }

    #[tokio::test]
    async fn test_product_service_down() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelReply::tool_call(
                "c1",
                "product_lookup",
                r#"{"query": "ZUS All-Can Tumbler"}"#,
            ),
            ModelReply::text(
                "I apologise, I could not connect to the product knowledge base right now.",
            ),
        ]));
        let tool = LookupTool::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/products",
            LookupService::Products,
        )
        .unwrap();
        let agent = Agent::new(model.clone(), registry_with(ToolKind::ProductLookup, Arc::new(tool)));
        let mut session = Session::new(Retention::Unbounded);

        let outcome = agent
            .run_turn(&mut session, "Tell me about the ZUS All-Can Tumbler")
            .await;

        assert_eq!(outcome.stop_reason, StopReason::Answered);
        assert!(outcome.scratchpad[0].observation.contains("Could not connect"));
        assert!(outcome.answer.contains("knowledge base"));

        // The failure was surfaced to the model as an observation.
        let requests = model.requests();
        match requests[1].messages.last() {
            Some(ChatMessage::ToolResult { content, .. }) => {
                assert!(content.contains("Could not connect"))
            }
            other => panic!("Expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelReply::text("one"),
            ModelReply::text("two"),
        ]));
        let agent = Agent::new(
            model.clone(),
            registry_with(ToolKind::Calculator, CountingTool::new("unused")),
        );
        let mut first = Session::new(Retention::Unbounded);
        let mut second = Session::new(Retention::Unbounded);

        agent.run_turn(&mut first, "first session").await;
        agent.run_turn(&mut second, "second session").await;

        assert_eq!(first.memory.len(), 2);
        assert_eq!(second.memory.len(), 2);
        // System prompt then the new user message: nothing from the other session.
        assert_eq!(model.requests()[1].messages.len(), 2);
    }
}

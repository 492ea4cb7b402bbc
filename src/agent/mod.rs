//! Agent system for routing questions to tools.
//!
//! Provides an LLM agent that decides, turn by turn, whether to answer
//! directly, call the calculator, product or outlet tools, or ask the user
//! for a missing detail.

mod runner;
mod tools;

pub use runner::{
    parse_step, Agent, AgentStep, ScratchpadEntry, StopReason, ToolInvocation, TurnOutcome,
    DEFAULT_MAX_ITERATIONS, FALLBACK_MESSAGE, ITERATION_LIMIT_MESSAGE, MODEL_UNAVAILABLE_MESSAGE,
};
pub use tools::{
    parse_tool_input, Calculator, LookupService, LookupTool, RegisteredTool, Tool, ToolKind,
    ToolRegistry, ToolRegistryBuilder, ToolSpec,
};

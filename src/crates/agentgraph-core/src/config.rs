//! Per-invocation run configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::examples::ExamplePolicy;
use crate::executor::Node;

pub const DEFAULT_MAX_STEPS: usize = 25;
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Step strategy used by a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Tool schemas bound to the model, structured tool calls
    #[default]
    ToolCalling,
    /// Tool use described in the prompt, calls parsed from XML tags
    Xml,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ToolCalling => "tool_calling",
            AgentType::Xml => "xml",
        }
    }
}

impl FromStr for AgentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tool_calling" => Ok(AgentType::ToolCalling),
            "xml" => Ok(AgentType::Xml),
            other => Err(AgentError::invalid_config(format!("unknown agent type '{}'", other))),
        }
    }
}

/// Payload shape of `step_complete` events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// The whole transcript after the step
    #[default]
    Full,
    /// Only the messages the step added or replaced
    Delta,
}

/// Parameters of one invocation
///
/// ```rust
/// use agentgraph_core::config::RunConfig;
/// use agentgraph_core::executor::Node;
///
/// let config = RunConfig::new("thread-1", "gpt")
///     .with_tools(["search"])
///     .with_max_steps(10)
///     .with_interrupt_before([Node::Action]);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub thread_id: String,
    pub assistant_id: Option<String>,
    pub scope: Option<String>,
    /// Model id resolved through the model registry
    pub model: String,
    /// Tool names resolved through the tool registry
    pub tools: Vec<String>,
    pub agent_type: AgentType,
    pub system_message: String,
    pub max_steps: usize,
    pub max_time: Option<Duration>,
    pub interrupt_before: Vec<Node>,
    pub verbosity: Verbosity,
    pub examples: Option<ExamplePolicy>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: String::new(),
            assistant_id: None,
            scope: None,
            model: String::new(),
            tools: Vec::new(),
            agent_type: AgentType::default(),
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_time: None,
            interrupt_before: Vec::new(),
            verbosity: Verbosity::default(),
            examples: None,
        }
    }
}

impl RunConfig {
    pub fn new(thread_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_interrupt_before(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        self.interrupt_before = nodes.into_iter().collect();
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_examples(mut self, policy: ExamplePolicy) -> Self {
        self.examples = Some(policy);
        self
    }

    pub fn interrupts_before(&self, node: Node) -> bool {
        self.interrupt_before.contains(&node)
    }

    /// Reject configurations a run cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.thread_id.trim().is_empty() {
            return Err(AgentError::invalid_input("thread id must not be empty"));
        }
        if self.max_steps == 0 {
            return Err(AgentError::invalid_input("max_steps must be at least 1"));
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::invalid_input("no model configured"));
        }
        if let Some(policy) = &self.examples {
            policy.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = RunConfig::new("t1", "m");
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.system_message, "You are a helpful assistant.");
        assert_eq!(config.agent_type, AgentType::ToolCalling);
        assert!(!config.interrupts_before(Node::Action));
    }

    #[test]
    fn test_validation() {
        assert!(RunConfig::new("", "m").validate().is_err());
        assert!(RunConfig::new("t", "m").with_max_steps(0).validate().is_err());
        assert!(RunConfig::new("t", " ").validate().is_err());
        assert!(RunConfig::new("t", "m").with_max_steps(1).validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RunConfig = serde_json::from_value(json!({
            "thread_id": "t1",
            "model": "m",
            "agent_type": "xml",
            "interrupt_before": ["action"],
            "verbosity": "delta"
        }))
        .unwrap();

        assert_eq!(config.agent_type, AgentType::Xml);
        assert!(config.interrupts_before(Node::Action));
        assert_eq!(config.verbosity, Verbosity::Delta);
        assert_eq!(config.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_agent_type_from_str() {
        assert_eq!("xml".parse::<AgentType>().unwrap(), AgentType::Xml);
        assert!("react".parse::<AgentType>().is_err());
    }
}

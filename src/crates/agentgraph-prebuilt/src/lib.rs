//! # agentgraph-prebuilt - Ready-made Agent Steps
//!
//! Concrete [`AgentStep`](agentgraph_core::AgentStep) strategies and the
//! [`DefaultStepFactory`] that picks one per run from
//! [`RunConfig::agent_type`](agentgraph_core::RunConfig).
//!
//! ## Modules
//!
//! - [`agents`] - native tool calling and XML prompt tool calling
//! - [`prompt`] - system prompt assembly (base, few-shot block, tool protocol)
//! - [`messages`] - transcript conversion per model family
//! - [`factory`] - strategy selection
//!
//! ## Example
//!
//! ```rust
//! use agentgraph_checkpoint::InMemoryCheckpointSaver;
//! use agentgraph_core::testing::ScriptedModel;
//! use agentgraph_core::{AgentType, AiMessage, GraphExecutor, ModelRegistry, RunConfig};
//! use agentgraph_prebuilt::DefaultStepFactory;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> agentgraph_core::Result<()> {
//! let models = Arc::new(ModelRegistry::new());
//! models.register_instance(
//!     "demo",
//!     Arc::new(ScriptedModel::new(vec![AiMessage::new("<final_answer>4</final_answer>")])),
//! );
//!
//! let executor = GraphExecutor::new(Arc::new(InMemoryCheckpointSaver::new()), Arc::new(DefaultStepFactory))
//!     .with_models(models);
//!
//! let config = RunConfig::new("thread-1", "demo").with_agent_type(AgentType::Xml);
//! let outcome = executor.invoke(config, Some("2+2?".into())).await?;
//! assert_eq!(outcome.messages.last().unwrap().text(), "4");
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod error;
pub mod factory;
pub mod messages;
pub mod prompt;

pub use agents::{parse_xml_output, ToolCallingStep, XmlToolStep, XML_STOP_SEQUENCE};
pub use error::{PrebuiltError, Result};
pub use factory::DefaultStepFactory;
pub use prompt::SystemPrompt;

use agentgraph_core::{AgentStep, AgentType, ChatModel, RunConfig, StepFactory, ToolSet};
use std::sync::Arc;
use tracing::debug;

use crate::agents::{ToolCallingStep, XmlToolStep};

/// Picks the step strategy from `RunConfig::agent_type`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStepFactory;

impl StepFactory for DefaultStepFactory {
    fn build(
        &self,
        config: &RunConfig,
        model: Arc<dyn ChatModel>,
        tools: &ToolSet,
    ) -> agentgraph_core::Result<Arc<dyn AgentStep>> {
        debug!(agent_type = config.agent_type.as_str(), model = %config.model, "Building agent step");
        let step: Arc<dyn AgentStep> = match config.agent_type {
            AgentType::ToolCalling => Arc::new(ToolCallingStep::new(model, tools.clone())?),
            AgentType::Xml => Arc::new(XmlToolStep::new(model, tools.clone())),
        };
        Ok(step)
    }
}

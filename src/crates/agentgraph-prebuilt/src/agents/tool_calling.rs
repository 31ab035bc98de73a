use agentgraph_core::{
    call_model, AgentState, AgentStep, AiMessage, ChatModel, ChatRequest, Message, StepContext, ToolSet, Transcript,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{PrebuiltError, Result};
use crate::messages::for_model;
use crate::prompt::SystemPrompt;

/// Step that binds the run's tools to the model natively
pub struct ToolCallingStep {
    model: Arc<dyn ChatModel>,
    tools: ToolSet,
}

impl ToolCallingStep {
    /// Fails when tools are configured but the model cannot bind them
    pub fn new(model: Arc<dyn ChatModel>, tools: ToolSet) -> Result<Self> {
        if !tools.is_empty() && !model.capabilities().tool_binding {
            return Err(PrebuiltError::Unsupported {
                model: model.name().to_string(),
                capability: "tool binding".to_string(),
            });
        }
        Ok(Self { model, tools })
    }

    fn request(&self, transcript: &Transcript, state: &AgentState, ctx: &StepContext) -> ChatRequest {
        let system = SystemPrompt::new(&ctx.config.system_message)
            .with_examples(&state.examples)
            .render();

        let mut messages = vec![Message::system(system)];
        messages.extend(for_model(transcript, self.model.capabilities()));
        ChatRequest::new(messages).with_tools(self.tools.definitions())
    }
}

#[async_trait]
impl AgentStep for ToolCallingStep {
    fn name(&self) -> &str {
        "tool_calling"
    }

    async fn step(
        &self,
        transcript: &Transcript,
        state: &AgentState,
        ctx: &StepContext,
    ) -> agentgraph_core::Result<AiMessage> {
        let request = self.request(transcript, state, ctx);
        debug!(
            run_id = %ctx.run_id,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling model with bound tools"
        );
        call_model(self.model.as_ref(), request, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_core::testing::{echo_tool, ScriptedModel};
    use agentgraph_core::{Example, MessageKind, ModelCapabilities, RunConfig, ToolRegistry};

    fn tools() -> ToolSet {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool());
        registry.select(&["echo".to_string()]).unwrap()
    }

    fn ctx() -> StepContext {
        StepContext::new(Arc::new(RunConfig::new("t", "m").with_system_message("Base")), "run")
    }

    #[test]
    fn test_model_without_binding_is_rejected() {
        let model = ScriptedModel::new(vec![]).with_capabilities(ModelCapabilities {
            tool_binding: false,
            ..Default::default()
        });
        let err = ToolCallingStep::new(Arc::new(model), tools()).err().unwrap();
        assert!(matches!(err, PrebuiltError::Unsupported { .. }));
    }

    #[test]
    fn test_model_without_binding_is_fine_without_tools() {
        let model = ScriptedModel::new(vec![]).with_capabilities(ModelCapabilities {
            tool_binding: false,
            ..Default::default()
        });
        assert!(ToolCallingStep::new(Arc::new(model), ToolSet::empty()).is_ok());
    }

    #[tokio::test]
    async fn test_request_shape() {
        let model = Arc::new(ScriptedModel::new(vec![AiMessage::new("ok")]));
        let step = ToolCallingStep::new(model.clone(), tools()).unwrap();

        let mut transcript = Transcript::new();
        transcript.merge(vec![Message::human("hi")]);
        let state = AgentState {
            messages: transcript.clone(),
            examples: vec![Example::new("q", "a")],
        };

        let reply = step.step(&transcript, &state, &ctx()).await.unwrap();
        assert_eq!(reply.content, "ok");

        let request = &model.requests()[0];
        assert_eq!(request.messages[0].kind(), MessageKind::System);
        assert!(request.messages[0].text().starts_with("Base\n\n"));
        assert!(request.messages[0].text().contains("Input: q"));
        assert_eq!(request.tools[0].name, "echo");
        assert!(request.stop_sequences.is_empty());
    }
}

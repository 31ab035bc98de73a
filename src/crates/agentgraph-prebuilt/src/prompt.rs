//! System prompt assembly
//!
//! ```text
//!  base system message
//!  + few-shot block        (when the run carries examples)
//!  + tool-use instructions (prompt-based tool calling only)
//! ```
//!
//! Sections are separated by a blank line. An empty section is left out
//! entirely, so a run without examples or prompt tools sends the base
//! message unchanged.

use agentgraph_core::{Example, ToolSet};

/// Heading of the few-shot block
pub const EXAMPLES_HEADING: &str = "Here are some examples of previous successful interactions:";

/// Builder for the effective system prompt of one model call
#[derive(Debug, Clone)]
pub struct SystemPrompt<'a> {
    base: &'a str,
    examples: &'a [Example],
    tool_instructions: Option<String>,
}

impl<'a> SystemPrompt<'a> {
    pub fn new(base: &'a str) -> Self {
        Self {
            base,
            examples: &[],
            tool_instructions: None,
        }
    }

    pub fn with_examples(mut self, examples: &'a [Example]) -> Self {
        self.examples = examples;
        self
    }

    /// Append the XML tool protocol for `tools`
    pub fn with_xml_tools(mut self, tools: &ToolSet) -> Self {
        self.tool_instructions = Some(xml_tool_instructions(tools));
        self
    }

    pub fn render(&self) -> String {
        let mut sections = vec![self.base.trim_end().to_string()];
        if !self.examples.is_empty() {
            sections.push(render_examples(self.examples));
        }
        if let Some(instructions) = &self.tool_instructions {
            sections.push(instructions.clone());
        }
        sections.retain(|s| !s.is_empty());
        sections.join("\n\n")
    }
}

/// Render the few-shot block
pub fn render_examples(examples: &[Example]) -> String {
    let mut out = String::from(EXAMPLES_HEADING);
    for example in examples {
        out.push_str("\n<example>\nInput: ");
        out.push_str(example.input.trim());
        out.push_str("\nOutput: ");
        out.push_str(example.output.trim());
        out.push_str("\n</example>");
    }
    out
}

/// Instructions for the prompt-based tool protocol
pub fn xml_tool_instructions(tools: &ToolSet) -> String {
    let listing = if tools.is_empty() {
        "(no tools available)".to_string()
    } else {
        tools
            .definitions()
            .iter()
            .map(|t| format!("{}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You have access to the following tools:\n\n\
         {listing}\n\n\
         In order to use a tool, you can use <tool></tool> and <tool_input></tool_input> tags. \
         You will then get back a response in the form <observation></observation>\n\
         For example, if you have a tool called 'search' that could run a web search, \
         in order to search for the weather in SF you would respond:\n\n\
         <tool>search</tool><tool_input>weather in SF</tool_input>\n\
         <observation>64 degrees</observation>\n\n\
         When you are done, respond with a final answer between <final_answer></final_answer>. \
         For example:\n\n\
         <final_answer>The weather in SF is 64 degrees</final_answer>"
    )
}

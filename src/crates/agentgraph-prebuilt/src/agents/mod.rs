//! Agent step strategies
//!
//! | Strategy           | `agent_type`   | Tools reach the model as      | Tool calls come back as      |
//! |--------------------|----------------|-------------------------------|------------------------------|
//! | [`ToolCallingStep`] | `tool_calling` | bound schemas                 | structured `tool_calls`      |
//! | [`XmlToolStep`]     | `xml`          | instructions in the prompt    | `<tool>` blocks in the text  |
//!
//! Both prepend the assembled system prompt (base message plus the run's
//! few-shot examples) and return exactly one ai message per step.

mod tool_calling;
mod xml;

pub use tool_calling::ToolCallingStep;
pub use xml::{parse_xml_output, XmlToolStep, XML_STOP_SEQUENCE};

//! LLM tool: text generation toward a target thought kind, and
//! embedding of arbitrary input

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::llm::{parse_output, LlmClient, OutputFormat};
use crate::term::Term;
use crate::tools::{
    result_metadata, Requirement, Tool, ToolParameterType, ToolParams, ToolSchema,
};
use crate::types::{Thought, ThoughtKind, ThoughtStatus, ToolError};

pub struct LlmTool {
    llm: Arc<dyn LlmClient>,
    schema: ToolSchema,
}

impl LlmTool {
    pub const NAME: &'static str = "llm";

    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let schema = ToolSchema::new()
            .param(
                "action",
                ToolParameterType::String,
                Requirement::Always,
                "generate or embed",
            )
            .param(
                "input",
                ToolParameterType::String,
                Requirement::Always,
                "prompt or text to embed",
            )
            .param(
                "kind",
                ToolParameterType::String,
                Requirement::Optional,
                "thought kind produced by generation (default OUTCOME)",
            )
            .param(
                "format",
                ToolParameterType::String,
                Requirement::Optional,
                "json or text (default json)",
            )
            .param(
                "hints",
                ToolParameterType::String,
                Requirement::Optional,
                "tool-definition hints appended to the prompt",
            );
        Self { llm, schema }
    }

    fn required_str<'a>(&self, params: &'a ToolParams, key: &str) -> Result<&'a str, ToolError> {
        params
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: format!("missing string parameter '{}'", key),
            })
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "generate text toward a thought kind, or embed input"
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(
        &self,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Result<Thought, ToolError> {
        let action = self.required_str(params, "action")?;
        let input = self.required_str(params, "input")?;

        match action {
            "generate" => {
                let kind = params
                    .get("kind")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<ThoughtKind>().ok())
                    .unwrap_or(ThoughtKind::Outcome);
                let format = match params.get("format").and_then(Value::as_str) {
                    Some("text") => OutputFormat::Text,
                    _ => OutputFormat::Json,
                };
                // A trigger carrying an explicit generation prompt (e.g. a
                // failure-synthesis strategy) overrides the bound input.
                let base = parent
                    .metadata
                    .generation_prompt()
                    .unwrap_or(input)
                    .to_string();
                let prompt = match params.get("hints").and_then(Value::as_str) {
                    Some(hints) => format!("{}\n\nAvailable tools:\n{}", base, hints),
                    None => base,
                };

                let raw = self.llm.generate(&prompt, format).await?;
                let content = parse_output(&raw, kind);
                Ok(Thought::new(
                    kind,
                    content,
                    result_metadata(parent, agent_id),
                ))
            }
            "embed" => {
                let vector = self.llm.embed(input).await?;
                let mut metadata = result_metadata(parent, agent_id);
                metadata.set_embedding(&vector);
                let mut thought =
                    Thought::new(ThoughtKind::Outcome, Term::atom("embedded"), metadata);
                thought.status = ThoughtStatus::Done;
                Ok(thought)
            }
            other => Err(ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: format!("unknown action '{}'", other),
            }),
        }
    }
}

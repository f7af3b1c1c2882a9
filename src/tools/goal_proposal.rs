//! Goal proposal: ask the model for one next goal grounded in recent
//! memory

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::llm::{parse_output, LlmClient, OutputFormat};
use crate::store::MemoryStore;
use crate::tools::{
    result_metadata, Requirement, Tool, ToolParameterType, ToolParams, ToolSchema,
};
use crate::types::{Thought, ThoughtKind, ToolError};

/// Priority given to proposed goals so they are picked up promptly.
const PROPOSED_GOAL_PRIORITY: f64 = 1.5;

/// How many recent memory entries feed the proposal prompt.
const CONTEXT_ENTRIES: usize = 5;

pub struct GoalProposalTool {
    memory: Arc<MemoryStore>,
    llm: Arc<dyn LlmClient>,
    schema: ToolSchema,
}

impl GoalProposalTool {
    pub const NAME: &'static str = "goal_proposal";

    pub fn new(memory: Arc<MemoryStore>, llm: Arc<dyn LlmClient>) -> Self {
        let schema = ToolSchema::new().param(
            "context",
            ToolParameterType::String,
            Requirement::Optional,
            "extra context for the proposal",
        );
        Self { memory, llm, schema }
    }
}

#[async_trait]
impl Tool for GoalProposalTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "propose one next goal from recent memory"
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
        let recent: Vec<String> = self
            .memory
            .recent(CONTEXT_ENTRIES)
            .into_iter()
            .map(|entry| format!("- {}", entry.content))
            .collect();

        let mut prompt = String::from(
            "Propose exactly one concrete next goal as JSON {\"name\": ..., \"args\": [...]}.",
        );
        if !recent.is_empty() {
            prompt.push_str("\nRecent activity:\n");
            prompt.push_str(&recent.join("\n"));
        }
        if let Some(context) = params.get("context").and_then(Value::as_str) {
            prompt.push_str("\nCurrent focus: ");
            prompt.push_str(context);
        }

        let raw = self.llm.generate(&prompt, OutputFormat::Json).await?;
        let content = parse_output(&raw, ThoughtKind::Input);

        let mut metadata = result_metadata(parent, agent_id);
        metadata.set_priority(PROPOSED_GOAL_PRIORITY);
        Ok(Thought::new(ThoughtKind::Input, content, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;
    use crate::types::{LlmError, MemoryEntry, Metadata, ThoughtStatus};
    use parking_lot::Mutex;

    struct CapturingLlm {
        last_prompt: Mutex<String>,
        response: String,
    }

    #[async_trait]
    impl LlmClient for CapturingLlm {
        async fn generate(&self, prompt: &str, _format: OutputFormat) -> Result<String, LlmError> {
            *self.last_prompt.lock() = prompt.to_string();
            Ok(self.response.clone())
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn test_proposal_is_boosted_pending_input() {
        let memory = Arc::new(MemoryStore::new());
        memory.add(MemoryEntry::new(
            "visited the louvre",
            vec![1.0],
            Metadata::new(),
        ));
        let llm = Arc::new(CapturingLlm {
            last_prompt: Mutex::new(String::new()),
            response: r#"{"name": "book_museum_pass", "args": []}"#.to_string(),
        });
        let tool = GoalProposalTool::new(memory, llm.clone());

        let parent = Thought::new(ThoughtKind::Goal, Term::atom("paris"), Metadata::new());
        let result = tool
            .execute(&ToolParams::new(), &parent, "agent")
            .await
            .unwrap();

        assert_eq!(result.kind, ThoughtKind::Input);
        assert_eq!(result.status, ThoughtStatus::Pending);
        assert_eq!(result.metadata.priority(), Some(PROPOSED_GOAL_PRIORITY));
        assert_eq!(result.content, Term::structure("book_museum_pass", vec![]));
        assert!(llm.last_prompt.lock().contains("visited the louvre"));
    }
}

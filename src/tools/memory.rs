//! Memory tool: append facts and traces, search by similarity

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::llm::LlmClient;
use crate::store::{MemoryFilter, MemoryStore};
use crate::term::Term;
use crate::tools::{
    result_metadata, Requirement, Tool, ToolParameterType, ToolParams, ToolSchema,
};
use crate::types::{
    MemoryEntry, Metadata, Thought, ThoughtId, ThoughtKind, ThoughtStatus, ToolError,
};

pub struct MemoryTool {
    memory: Arc<MemoryStore>,
    llm: Arc<dyn LlmClient>,
    default_limit: usize,
    schema: ToolSchema,
}

impl MemoryTool {
    pub const NAME: &'static str = "memory";

    pub fn new(memory: Arc<MemoryStore>, llm: Arc<dyn LlmClient>, default_limit: usize) -> Self {
        let schema = ToolSchema::new()
            .param(
                "action",
                ToolParameterType::String,
                Requirement::Always,
                "add or search",
            )
            .param(
                "content",
                ToolParameterType::String,
                Requirement::ForActions(vec!["add"]),
                "text stored, required when adding",
            )
            .param(
                "query",
                ToolParameterType::String,
                Requirement::ForActions(vec!["search"]),
                "similarity query, required when searching",
            )
            .param(
                "type",
                ToolParameterType::String,
                Requirement::Optional,
                "entry type tag (default fact)",
            )
            .param(
                "limit",
                ToolParameterType::Number,
                Requirement::Optional,
                "maximum results",
            )
            .param(
                "metadata",
                ToolParameterType::Object,
                Requirement::Optional,
                "extra metadata merged onto the entry",
            )
            .param(
                "filter",
                ToolParameterType::Object,
                Requirement::Optional,
                "search filter: type, related_to, entities",
            );
        Self {
            memory,
            llm,
            default_limit,
            schema,
        }
    }

    fn parse_filter(value: &Value) -> MemoryFilter {
        let mut filter = MemoryFilter::default();
        let Some(object) = value.as_object() else {
            return filter;
        };
        filter.required_type = object
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        filter.related_to_id = object
            .get("related_to")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<ThoughtId>().ok());
        filter.required_entities = object
            .get("entities")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        filter
    }

    async fn add(
        &self,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Result<Thought, ToolError> {
        let content = params
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: "missing string parameter 'content'".to_string(),
            })?;
        let entry_type = params
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("fact");

        let embedding = self.llm.embed(content).await?;

        let mut entry_metadata = Metadata::new();
        if let Some(extra) = params.get("metadata").and_then(Value::as_object) {
            for (key, value) in extra {
                entry_metadata.insert(key.clone(), value.clone());
            }
        }
        entry_metadata.set_entry_type(entry_type);
        entry_metadata.add_related_id(parent.id);
        for id in parent.metadata.provenance() {
            entry_metadata.push_provenance(id);
        }

        let entry = MemoryEntry::new(content, embedding, entry_metadata);
        let entry_id = entry.id;
        self.memory.add(entry);
        tracing::debug!(entry_id = %entry_id, entry_type = %entry_type, "memory entry stored");

        let mut thought = Thought::new(
            ThoughtKind::Outcome,
            Term::structure("memory_added", vec![Term::atom(entry_id.to_string())]),
            result_metadata(parent, agent_id),
        );
        thought.status = ThoughtStatus::Done;
        Ok(thought)
    }

    async fn search(
        &self,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Result<Thought, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: "missing string parameter 'query'".to_string(),
            })?;
        let limit = params
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.default_limit);
        let filter = params.get("filter").map(Self::parse_filter);

        let query_embedding = self.llm.embed(query).await?;
        let results = self
            .memory
            .find_similar(&query_embedding, limit, filter.as_ref());

        let content = if results.is_empty() {
            Term::atom("no_memory_results")
        } else {
            Term::list(
                results
                    .into_iter()
                    .map(|entry| {
                        let entry_type = entry.metadata.entry_type().unwrap_or("unknown").to_string();
                        Term::structure(
                            "memory_result",
                            vec![
                                Term::atom(entry.content),
                                Term::atom(entry.id.to_string()),
                                Term::atom(entry_type),
                            ],
                        )
                    })
                    .collect(),
            )
        };

        let mut thought = Thought::new(
            ThoughtKind::Outcome,
            content,
            result_metadata(parent, agent_id),
        );
        thought.status = ThoughtStatus::Done;
        Ok(thought)
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "append to or search the vector memory"
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
        match params.get("action").and_then(Value::as_str) {
            Some("add") => self.add(params, parent, agent_id).await,
            Some("search") => self.search(params, parent, agent_id).await,
            other => Err(ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: format!("unknown action '{}'", other.unwrap_or("<missing>")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OutputFormat;
    use crate::types::LlmError;

    struct HashEmbedder;

    #[async_trait]
    impl LlmClient for HashEmbedder {
        async fn generate(&self, _prompt: &str, _format: OutputFormat) -> Result<String, LlmError> {
            Err(LlmError::Transport("not wired".to_string()))
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            // Orthogonal-ish vectors keyed on the first byte.
            let first = text.bytes().next().unwrap_or(0) as f32;
            Ok(vec![first, 1.0])
        }
    }

    fn tool() -> MemoryTool {
        MemoryTool::new(Arc::new(MemoryStore::new()), Arc::new(HashEmbedder), 5)
    }

    fn parent() -> Thought {
        Thought::new(ThoughtKind::Strategy, Term::atom("remember"), Metadata::new())
    }

    fn params(pairs: &[(&str, Value)]) -> ToolParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_add_then_search_round_trip() {
        let tool = tool();
        let parent = parent();

        let added = tool
            .execute(
                &params(&[
                    ("action", Value::from("add")),
                    ("content", Value::from("paris is lovely in spring")),
                ]),
                &parent,
                "agent",
            )
            .await
            .unwrap();
        assert_eq!(added.status, ThoughtStatus::Done);
        assert_eq!(added.content.name(), Some("memory_added"));

        let found = tool
            .execute(
                &params(&[
                    ("action", Value::from("search")),
                    ("query", Value::from("paris weather")),
                ]),
                &parent,
                "agent",
            )
            .await
            .unwrap();
        let results = found.content.as_list().unwrap();
        assert_eq!(results.len(), 1);
        let (name, fields) = results[0].as_struct().unwrap();
        assert_eq!(name, "memory_result");
        assert_eq!(fields[0], Term::atom("paris is lovely in spring"));
        assert_eq!(fields[2], Term::atom("fact"));
    }

    #[tokio::test]
    async fn test_search_empty_returns_marker_atom() {
        let tool = tool();
        let result = tool
            .execute(
                &params(&[
                    ("action", Value::from("search")),
                    ("query", Value::from("anything")),
                ]),
                &parent(),
                "agent",
            )
            .await
            .unwrap();
        assert_eq!(result.content, Term::atom("no_memory_results"));
    }

    #[tokio::test]
    async fn test_search_with_type_filter() {
        let tool = tool();
        let parent = parent();
        for (content, entry_type) in [("alpha fact", "fact"), ("alpha trace", "execution_trace")] {
            tool.execute(
                &params(&[
                    ("action", Value::from("add")),
                    ("content", Value::from(content)),
                    ("type", Value::from(entry_type)),
                ]),
                &parent,
                "agent",
            )
            .await
            .unwrap();
        }

        let found = tool
            .execute(
                &params(&[
                    ("action", Value::from("search")),
                    ("query", Value::from("alpha")),
                    ("filter", serde_json::json!({"type": "execution_trace"})),
                ]),
                &parent,
                "agent",
            )
            .await
            .unwrap();
        let results = found.content.as_list().unwrap();
        assert_eq!(results.len(), 1);
        let (_, fields) = results[0].as_struct().unwrap();
        assert_eq!(fields[2], Term::atom("execution_trace"));
    }
}

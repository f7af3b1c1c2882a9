//! Tool registry: named tools with parameter schemas, validation, and
//! dispatch
//!
//! Tool failures never escape as errors from the registry; every failure
//! mode is encapsulated as a FAILED outcome thought so the reasoning
//! loop can observe and react to it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::llm::LlmClient;
use crate::term::Term;
use crate::types::{Metadata, Thought, ThoughtKind, ThoughtStatus, ToolError};

pub mod goal_proposal;
pub mod llm;
pub mod memory;
pub mod user_interaction;
pub mod web_search;

pub use goal_proposal::GoalProposalTool;
pub use llm::LlmTool;
pub use memory::MemoryTool;
pub use user_interaction::{PendingPrompt, UserInteractionTool};
pub use web_search::WebSearchTool;

/// Parameters handed to a tool, extracted from the action term.
pub type ToolParams = HashMap<String, Value>;

/// Value types a tool parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// Opaque term payload; accepted as-is.
    Term,
}

impl ToolParameterType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
            ToolParameterType::Term => true,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
            ToolParameterType::Term => "term",
        }
    }
}

/// When a parameter must be present. `ForActions` makes requiredness a
/// predicate over the full parameter map, keyed on the `action` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Always,
    Optional,
    ForActions(Vec<&'static str>),
}

impl Requirement {
    fn is_required(&self, params: &ToolParams) -> bool {
        match self {
            Requirement::Always => true,
            Requirement::Optional => false,
            Requirement::ForActions(actions) => params
                .get("action")
                .and_then(Value::as_str)
                .is_some_and(|action| actions.contains(&action)),
        }
    }
}

/// Schema entry for one parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub param_type: ToolParameterType,
    pub required: Requirement,
    pub item_type: Option<ToolParameterType>,
    pub description: &'static str,
}

/// Parameter schema for a tool. Unknown parameters pass through
/// unvalidated.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    parameters: BTreeMap<&'static str, ParameterSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(
        mut self,
        name: &'static str,
        param_type: ToolParameterType,
        required: Requirement,
        description: &'static str,
    ) -> Self {
        self.parameters.insert(
            name,
            ParameterSpec {
                param_type,
                required,
                item_type: None,
                description,
            },
        );
        self
    }

    pub fn array_param(
        mut self,
        name: &'static str,
        item_type: ToolParameterType,
        required: Requirement,
        description: &'static str,
    ) -> Self {
        self.parameters.insert(
            name,
            ParameterSpec {
                param_type: ToolParameterType::Array,
                required,
                item_type: Some(item_type),
                description,
            },
        );
        self
    }

    /// Check `params` against this schema. Requiredness predicates are
    /// evaluated over the whole map before any type checking.
    pub fn validate(&self, tool_name: &str, params: &ToolParams) -> Result<(), ToolError> {
        for (name, spec) in &self.parameters {
            if spec.required.is_required(params) && !params.contains_key(*name) {
                return Err(ToolError::InvalidParams {
                    name: tool_name.to_string(),
                    reason: format!("missing required parameter '{}'", name),
                });
            }
        }
        for (name, spec) in &self.parameters {
            let Some(value) = params.get(*name) else {
                continue;
            };
            if !spec.param_type.accepts(value) {
                return Err(ToolError::InvalidParams {
                    name: tool_name.to_string(),
                    reason: format!(
                        "parameter '{}' must be a {}",
                        name,
                        spec.param_type.label()
                    ),
                });
            }
            if let (Some(item_type), Some(items)) = (spec.item_type, value.as_array()) {
                if let Some(position) = items.iter().position(|item| !item_type.accepts(item)) {
                    return Err(ToolError::InvalidParams {
                        name: tool_name.to_string(),
                        reason: format!(
                            "parameter '{}' item {} must be a {}",
                            name,
                            position,
                            item_type.label()
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A named, schema-described capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> &ToolSchema;

    /// Run the tool. The returned thought is the raw result; the
    /// registry merges standard metadata and attaches an embedding.
    async fn execute(
        &self,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Result<Thought, ToolError>;
}

/// A tool definition discovered at runtime, parsed from a `tool_spec`
/// structure. Only a closed set of adapter kinds is instantiable.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicToolSpec {
    pub name: String,
    pub kind: String,
    pub endpoint: Option<String>,
    pub description: Option<String>,
}

impl DynamicToolSpec {
    /// Read a `tool_spec(name(…), type(…), endpoint(…)?, …)` structure.
    pub fn from_term(term: &Term) -> Option<Self> {
        let ("tool_spec", fields) = term.as_struct()? else {
            return None;
        };
        let mut spec = DynamicToolSpec {
            name: String::new(),
            kind: String::new(),
            endpoint: None,
            description: None,
        };
        for field in fields {
            let Some((key, args)) = field.as_struct() else {
                continue;
            };
            let Some(value) = args.first().and_then(Term::as_atom) else {
                continue;
            };
            match key {
                "name" => spec.name = value.to_string(),
                "type" => spec.kind = value.to_string(),
                "endpoint" => spec.endpoint = Some(value.to_string()),
                "description" => spec.description = Some(value.to_string()),
                _ => {}
            }
        }
        (!spec.name.is_empty() && !spec.kind.is_empty()).then_some(spec)
    }
}

/// Keyed map from tool name to schema + invoker.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    llm: Arc<dyn LlmClient>,
    validate_schemas: bool,
}

impl ToolRegistry {
    pub fn new(llm: Arc<dyn LlmClient>, validate_schemas: bool) -> Self {
        Self {
            tools: DashMap::new(),
            llm,
            validate_schemas,
        }
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Instantiate and register a discovered tool. Unknown adapter kinds
    /// are logged and skipped; no dynamic code loading.
    pub fn register_dynamic(&self, spec: &DynamicToolSpec) -> bool {
        match spec.kind.as_str() {
            "web_search" | "http_get" => {
                let Some(endpoint) = spec.endpoint.clone() else {
                    tracing::warn!(tool = %spec.name, "discovered tool has no endpoint, skipping");
                    return false;
                };
                let description = spec
                    .description
                    .clone()
                    .unwrap_or_else(|| "HTTP GET query tool".to_string());
                self.register(Arc::new(WebSearchTool::new(
                    spec.name.clone(),
                    endpoint,
                    description,
                )));
                tracing::info!(tool = %spec.name, "registered discovered tool");
                true
            }
            other => {
                tracing::warn!(tool = %spec.name, kind = %other, "unknown tool adapter kind, skipping");
                false
            }
        }
    }

    /// Execute a tool by name. Failures of every kind come back as a
    /// FAILED outcome thought; successful results get standard metadata
    /// merged and a content embedding attached when missing.
    pub async fn execute(
        &self,
        name: &str,
        params: &ToolParams,
        parent: &Thought,
        agent_id: &str,
    ) -> Thought {
        let Some(tool) = self.get(name) else {
            let error = ToolError::NotFound {
                name: name.to_string(),
            };
            return self.failed_outcome(parent, agent_id, &error);
        };

        if self.validate_schemas {
            if let Err(error) = tool.schema().validate(name, params) {
                return self.failed_outcome(parent, agent_id, &error);
            }
        }

        match tool.execute(params, parent, agent_id).await {
            Ok(mut result) => {
                self.merge_standard_metadata(&mut result, parent, agent_id);
                if result.metadata.embedding().is_none() {
                    match self.llm.embed(&result.content.to_string()).await {
                        Ok(vector) => result.metadata.set_embedding(&vector),
                        Err(e) => {
                            tracing::debug!(tool = %name, "result embedding skipped: {}", e);
                        }
                    }
                }
                result
            }
            Err(error) => {
                tracing::warn!(tool = %name, "tool execution failed: {}", error);
                self.failed_outcome(parent, agent_id, &error)
            }
        }
    }

    fn merge_standard_metadata(&self, result: &mut Thought, parent: &Thought, agent_id: &str) {
        if result.metadata.agent_id().is_none() {
            result.metadata.set_agent_id(agent_id);
        }
        if result.metadata.parent_id().is_none() {
            result.metadata.set_parent_id(parent.id);
        }
        if result.metadata.root_id().is_none() {
            result.metadata.set_root_id(parent.root_id());
        }
        result.metadata.add_related_id(parent.id);
        if result.metadata.workflow_id().is_none() {
            if let Some(workflow_id) = parent.metadata.workflow_id() {
                result.metadata.set_workflow_id(workflow_id);
            }
        }
        let provenance = parent.metadata.provenance();
        for id in provenance {
            result.metadata.push_provenance(id);
        }
    }

    /// Encapsulate a tool failure as a FAILED outcome thought carrying
    /// the error kind and a compact UI hint.
    pub fn failed_outcome(&self, parent: &Thought, agent_id: &str, error: &ToolError) -> Thought {
        let kind = error.kind_label();
        let message = error.to_string();
        let mut thought = Thought::child_of(
            parent,
            ThoughtKind::Outcome,
            Term::structure(
                "error",
                vec![Term::atom(kind), Term::atom(message.clone())],
            ),
        );
        thought.status = ThoughtStatus::Failed;
        thought.metadata.set_agent_id(agent_id);
        thought.metadata.set_error(&format!("{}: {}", kind, message));
        thought.metadata.set_ui_context(&format!("Failed: {}", kind));
        thought
    }
}

/// Metadata template for tool results that keeps workflow bookkeeping
/// out of individual tool implementations.
pub fn result_metadata(parent: &Thought, agent_id: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.set_agent_id(agent_id);
    metadata.set_parent_id(parent.id);
    metadata.set_root_id(parent.root_id());
    metadata.add_related_id(parent.id);
    metadata
}

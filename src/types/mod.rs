//! Core types and data structures for the reasoning engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::term::Term;

pub mod belief;
pub mod error;

pub use belief::Belief;
pub use error::*;

/// Unique identifier for thoughts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThoughtId(pub Uuid);

impl ThoughtId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ThoughtId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThoughtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ThoughtId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub Uuid);

impl RuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for memory entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for workflow instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of work a thought represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThoughtKind {
    Input,
    Goal,
    Strategy,
    Outcome,
    Query,
    Rule,
    Tools,
    WorkflowStep,
}

impl ThoughtKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtKind::Input => "INPUT",
            ThoughtKind::Goal => "GOAL",
            ThoughtKind::Strategy => "STRATEGY",
            ThoughtKind::Outcome => "OUTCOME",
            ThoughtKind::Query => "QUERY",
            ThoughtKind::Rule => "RULE",
            ThoughtKind::Tools => "TOOLS",
            ThoughtKind::WorkflowStep => "WORKFLOW_STEP",
        }
    }
}

impl std::fmt::Display for ThoughtKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThoughtKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INPUT" => Ok(ThoughtKind::Input),
            "GOAL" => Ok(ThoughtKind::Goal),
            "STRATEGY" => Ok(ThoughtKind::Strategy),
            "OUTCOME" => Ok(ThoughtKind::Outcome),
            "QUERY" => Ok(ThoughtKind::Query),
            "RULE" => Ok(ThoughtKind::Rule),
            "TOOLS" => Ok(ThoughtKind::Tools),
            "WORKFLOW_STEP" => Ok(ThoughtKind::WorkflowStep),
            other => Err(format!("unknown thought kind: {}", other)),
        }
    }
}

/// Processing state of a thought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThoughtStatus {
    Pending,
    Active,
    Waiting,
    Done,
    Failed,
}

impl ThoughtStatus {
    /// `Done` and `Failed` are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ThoughtStatus::Done | ThoughtStatus::Failed)
    }
}

impl std::fmt::Display for ThoughtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThoughtStatus::Pending => "PENDING",
            ThoughtStatus::Active => "ACTIVE",
            ThoughtStatus::Waiting => "WAITING",
            ThoughtStatus::Done => "DONE",
            ThoughtStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Recognized metadata keys. Anything outside this set is preserved on
/// round-trips but ignored by the engine.
pub mod keys {
    pub const ROOT_ID: &str = "root_id";
    pub const AGENT_ID: &str = "agent_id";
    pub const PARENT_ID: &str = "parent_id";
    pub const TIMESTAMP: &str = "timestamp";
    pub const ERROR: &str = "error";
    pub const PROVENANCE: &str = "provenance";
    pub const UI_CONTEXT: &str = "ui_context";
    pub const PRIORITY: &str = "priority";
    pub const EMBEDDING: &str = "embedding";
    pub const RETRY_COUNT: &str = "retry_count";
    pub const RELATED_IDS: &str = "related_ids";
    pub const EXTRACTED_ENTITIES: &str = "extracted_entities";
    pub const TYPE: &str = "type";
    pub const WORKFLOW_ID: &str = "workflow_id";
    pub const WORKFLOW_STEP: &str = "workflow_step";
    pub const WORKFLOW_RESULTS: &str = "workflow_results";
    pub const INTERACTION_DETAILS: &str = "interaction_details";
    pub const ANSWERED_PROMPT_ID: &str = "answered_prompt_id";
    pub const RESPONSE_THOUGHT_ID: &str = "response_thought_id";
    pub const GENERATION_PROMPT: &str = "generation_prompt";
}

/// Position of a workflow-step thought inside its workflow: a plain
/// sequence index, or `parent.arm` for one arm of a parallel fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Index(u64),
    Sub { parent: u64, arm: u64 },
}

impl WorkflowStep {
    fn to_value(self) -> Value {
        match self {
            WorkflowStep::Index(i) => Value::from(i),
            WorkflowStep::Sub { parent, arm } => Value::from(format!("{}.{}", parent, arm)),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(WorkflowStep::Index),
            Value::String(s) => {
                let (parent, arm) = s.split_once('.')?;
                Some(WorkflowStep::Sub {
                    parent: parent.parse().ok()?,
                    arm: arm.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStep::Index(i) => write!(f, "{}", i),
            WorkflowStep::Sub { parent, arm } => write!(f, "{}.{}", parent, arm),
        }
    }
}

/// A pending user prompt as shown to the front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionDetails {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Keyed metadata with typed accessors for the recognized key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(HashMap<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn get_uuid(&self, key: &str) -> Option<Uuid> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    fn set_uuid(&mut self, key: &str, id: Uuid) {
        self.0.insert(key.to_string(), Value::from(id.to_string()));
    }

    fn get_uuid_list(&self, key: &str) -> Vec<Uuid> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_uuid_list(&mut self, key: &str, ids: &[Uuid]) {
        let values: Vec<Value> = ids.iter().map(|id| Value::from(id.to_string())).collect();
        self.0.insert(key.to_string(), Value::from(values));
    }

    pub fn root_id(&self) -> Option<ThoughtId> {
        self.get_uuid(keys::ROOT_ID).map(ThoughtId)
    }

    pub fn set_root_id(&mut self, id: ThoughtId) {
        self.set_uuid(keys::ROOT_ID, id.0);
    }

    pub fn parent_id(&self) -> Option<ThoughtId> {
        self.get_uuid(keys::PARENT_ID).map(ThoughtId)
    }

    pub fn set_parent_id(&mut self, id: ThoughtId) {
        self.set_uuid(keys::PARENT_ID, id.0);
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.0.get(keys::AGENT_ID).and_then(Value::as_str)
    }

    pub fn set_agent_id(&mut self, agent_id: &str) {
        self.0
            .insert(keys::AGENT_ID.to_string(), Value::from(agent_id));
    }

    pub fn timestamp_millis(&self) -> Option<i64> {
        self.0.get(keys::TIMESTAMP).and_then(Value::as_i64)
    }

    pub fn set_timestamp_millis(&mut self, millis: i64) {
        self.0.insert(keys::TIMESTAMP.to_string(), Value::from(millis));
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get(keys::ERROR).and_then(Value::as_str)
    }

    pub fn set_error(&mut self, error: &str) {
        self.0.insert(keys::ERROR.to_string(), Value::from(error));
    }

    pub fn ui_context(&self) -> Option<&str> {
        self.0.get(keys::UI_CONTEXT).and_then(Value::as_str)
    }

    pub fn set_ui_context(&mut self, context: &str) {
        self.0
            .insert(keys::UI_CONTEXT.to_string(), Value::from(context));
    }

    pub fn priority(&self) -> Option<f64> {
        self.0.get(keys::PRIORITY).and_then(Value::as_f64)
    }

    pub fn set_priority(&mut self, priority: f64) {
        self.0.insert(keys::PRIORITY.to_string(), Value::from(priority));
    }

    pub fn embedding(&self) -> Option<Vec<f32>> {
        self.0.get(keys::EMBEDDING).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_f64)
                .map(|v| v as f32)
                .collect()
        })
    }

    pub fn set_embedding(&mut self, embedding: &[f32]) {
        let values: Vec<Value> = embedding
            .iter()
            .map(|v| Value::from(f64::from(*v)))
            .collect();
        self.0.insert(keys::EMBEDDING.to_string(), Value::from(values));
    }

    pub fn retry_count(&self) -> u32 {
        self.0
            .get(keys::RETRY_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    }

    pub fn set_retry_count(&mut self, count: u32) {
        self.0
            .insert(keys::RETRY_COUNT.to_string(), Value::from(count));
    }

    /// Rule and thought ids that causally contributed to this record.
    pub fn provenance(&self) -> Vec<Uuid> {
        self.get_uuid_list(keys::PROVENANCE)
    }

    pub fn set_provenance(&mut self, ids: &[Uuid]) {
        self.set_uuid_list(keys::PROVENANCE, ids);
    }

    pub fn push_provenance(&mut self, id: Uuid) {
        let mut ids = self.provenance();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.set_uuid_list(keys::PROVENANCE, &ids);
    }

    pub fn related_ids(&self) -> Vec<ThoughtId> {
        self.get_uuid_list(keys::RELATED_IDS)
            .into_iter()
            .map(ThoughtId)
            .collect()
    }

    pub fn set_related_ids(&mut self, ids: &[ThoughtId]) {
        let raw: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        self.set_uuid_list(keys::RELATED_IDS, &raw);
    }

    pub fn add_related_id(&mut self, id: ThoughtId) {
        let mut ids = self.related_ids();
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.set_related_ids(&ids);
    }

    pub fn extracted_entities(&self) -> Vec<String> {
        self.0
            .get(keys::EXTRACTED_ENTITIES)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_extracted_entities(&mut self, entities: &[String]) {
        let values: Vec<Value> = entities.iter().map(|e| Value::from(e.as_str())).collect();
        self.0
            .insert(keys::EXTRACTED_ENTITIES.to_string(), Value::from(values));
    }

    /// The `type` tag on memory entries (`execution_trace`, `fact`, …).
    pub fn entry_type(&self) -> Option<&str> {
        self.0.get(keys::TYPE).and_then(Value::as_str)
    }

    pub fn set_entry_type(&mut self, entry_type: &str) {
        self.0.insert(keys::TYPE.to_string(), Value::from(entry_type));
    }

    pub fn workflow_id(&self) -> Option<WorkflowId> {
        self.get_uuid(keys::WORKFLOW_ID).map(WorkflowId)
    }

    pub fn set_workflow_id(&mut self, id: WorkflowId) {
        self.set_uuid(keys::WORKFLOW_ID, id.0);
    }

    pub fn workflow_step(&self) -> Option<WorkflowStep> {
        self.0.get(keys::WORKFLOW_STEP).and_then(WorkflowStep::from_value)
    }

    pub fn set_workflow_step(&mut self, step: WorkflowStep) {
        self.0
            .insert(keys::WORKFLOW_STEP.to_string(), step.to_value());
    }

    pub fn interaction_details(&self) -> Option<InteractionDetails> {
        self.0
            .get(keys::INTERACTION_DETAILS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_interaction_details(&mut self, details: &InteractionDetails) {
        if let Ok(value) = serde_json::to_value(details) {
            self.0.insert(keys::INTERACTION_DETAILS.to_string(), value);
        }
    }

    pub fn answered_prompt_id(&self) -> Option<ThoughtId> {
        self.get_uuid(keys::ANSWERED_PROMPT_ID).map(ThoughtId)
    }

    pub fn set_answered_prompt_id(&mut self, id: ThoughtId) {
        self.set_uuid(keys::ANSWERED_PROMPT_ID, id.0);
    }

    pub fn response_thought_id(&self) -> Option<ThoughtId> {
        self.get_uuid(keys::RESPONSE_THOUGHT_ID).map(ThoughtId)
    }

    pub fn set_response_thought_id(&mut self, id: ThoughtId) {
        self.set_uuid(keys::RESPONSE_THOUGHT_ID, id.0);
    }

    pub fn generation_prompt(&self) -> Option<&str> {
        self.0.get(keys::GENERATION_PROMPT).and_then(Value::as_str)
    }

    pub fn set_generation_prompt(&mut self, prompt: &str) {
        self.0
            .insert(keys::GENERATION_PROMPT.to_string(), Value::from(prompt));
    }
}

/// The unit of work: a typed term with a belief, a processing status,
/// and keyed metadata. Updates replace the full record; `version` is the
/// compare-and-set token bumped on every committed replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub kind: ThoughtKind,
    pub content: Term,
    pub belief: Belief,
    pub status: ThoughtStatus,
    pub metadata: Metadata,
    #[serde(default)]
    pub version: u64,
}

impl Thought {
    /// A fresh PENDING thought with its creation time stamped.
    pub fn new(kind: ThoughtKind, content: Term, mut metadata: Metadata) -> Self {
        if metadata.timestamp_millis().is_none() {
            metadata.set_timestamp_millis(Utc::now().timestamp_millis());
        }
        Self {
            id: ThoughtId::new(),
            kind,
            content,
            belief: Belief::new(),
            status: ThoughtStatus::Pending,
            metadata,
            version: 0,
        }
    }

    /// A fresh PENDING child: parent/root links, agent id, and provenance
    /// are inherited from `parent`.
    pub fn child_of(parent: &Thought, kind: ThoughtKind, content: Term) -> Self {
        let mut metadata = Metadata::new();
        metadata.set_parent_id(parent.id);
        metadata.set_root_id(parent.root_id());
        if let Some(agent_id) = parent.metadata.agent_id() {
            metadata.set_agent_id(agent_id);
        }
        let provenance = parent.metadata.provenance();
        if !provenance.is_empty() {
            metadata.set_provenance(&provenance);
        }
        Self::new(kind, content, metadata)
    }

    /// The root of this thought's tree: the recorded `root_id`, or the
    /// thought itself when it is a root.
    pub fn root_id(&self) -> ThoughtId {
        self.metadata.root_id().unwrap_or(self.id)
    }

    /// Base sampling weight: explicit positive priority wins, otherwise
    /// the (read-time decayed) belief score.
    pub fn sampling_weight(&self, decay_rate_per_milli: f64, now: DateTime<Utc>) -> f64 {
        match self.metadata.priority() {
            Some(priority) if priority > 0.0 => priority,
            _ => self.belief.decayed_score(decay_rate_per_milli, now),
        }
    }
}

/// A pattern → action entry. The pattern is unified against thought
/// content; the action is a tool-call structure or a workflow control
/// structure (`sequence(…)` / `parallel(…)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub pattern: Term,
    pub action: Term,
    pub belief: Belief,
    pub metadata: Metadata,
}

impl Rule {
    pub fn new(pattern: Term, action: Term) -> Self {
        Self {
            id: RuleId::new(),
            pattern,
            action,
            belief: Belief::new(),
            metadata: Metadata::new(),
        }
    }

    /// The string form a rule embedding is derived from. Replacing the
    /// pattern or action invalidates any cached vector.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let text = format!("{} {}", self.pattern, self.action);
        match text.char_indices().nth(max_chars) {
            Some((cut, _)) => text[..cut].to_string(),
            None => text,
        }
    }
}

/// An append-only vector memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub embedding: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: MemoryId::new(),
            embedding,
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

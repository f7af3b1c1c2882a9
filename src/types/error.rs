//! Error types for the reasoning engine
//!
//! Tool-local failures are additionally encapsulated as FAILED outcome
//! thoughts; these enums are the signatures the Rust call graph carries.
//! `kind_label` values are the compact strings recorded in thought
//! metadata and surfaced to the front-end.

use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Clone)]
pub enum FlowMindError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration validation errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Store lookup errors. Optimistic conflicts are not errors; `update`
/// reports them through its return value and callers restart.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Thought not found: {id}")]
    ThoughtNotFound { id: String },

    #[error("Thought {id} is {status}, expected {expected}")]
    UnexpectedStatus {
        id: String,
        status: String,
        expected: String,
    },
}

/// LLM transport and parsing errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn kind_label(&self) -> &'static str {
        match self {
            LlmError::Transport(_) | LlmError::Api { .. } => "llm_transport",
            LlmError::Parse(_) => "llm_parse",
        }
    }
}

/// Tool registry and execution errors
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Invalid parameters for {name}: {reason}")]
    InvalidParams { name: String, reason: String },

    #[error("Tool execution failed: {reason}")]
    Execution { reason: String },

    #[error("Memory access failed: {reason}")]
    Memory { reason: String },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl ToolError {
    pub fn kind_label(&self) -> &'static str {
        match self {
            ToolError::NotFound { .. } => "tool_not_found",
            ToolError::InvalidParams { .. } => "invalid_params",
            ToolError::Execution { .. } => "tool_execution",
            ToolError::Memory { .. } => "memory_transport",
            ToolError::Llm(inner) => inner.kind_label(),
        }
    }
}

/// Workflow structure errors
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Malformed workflow action: {reason}")]
    Malformed { reason: String },

    #[error("Malformed synthesized rule: {reason}")]
    SynthesisMalformed { reason: String },
}

impl WorkflowError {
    pub fn kind_label(&self) -> &'static str {
        match self {
            WorkflowError::Malformed { .. } => "workflow_malformed",
            WorkflowError::SynthesisMalformed { .. } => "rule_synthesis_malformed",
        }
    }
}

/// Snapshot save/restore errors
#[derive(Error, Debug, Clone)]
pub enum PersistenceError {
    #[error("Snapshot I/O failed: {0}")]
    Io(String),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("Unsupported snapshot format version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Result type for engine operations
pub type FlowMindResult<T> = Result<T, FlowMindError>;

/// The reason a thought's processing attempt failed, carried into retry
/// bookkeeping and the metadata `error` field.
#[derive(Debug, Clone)]
pub struct ProcessingFailure {
    pub kind: String,
    pub message: String,
}

impl ProcessingFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Rebuild from the compact `kind: message` metadata form.
    pub fn from_label(label: &str) -> Self {
        match label.split_once(": ") {
            Some((kind, message)) => Self::new(kind, message),
            None => Self::new("tool_execution", label),
        }
    }

    pub fn timeout(timeout_millis: u64) -> Self {
        Self::new(
            "processing_timeout",
            format!("processing exceeded {}ms", timeout_millis),
        )
    }

    pub fn from_tool(error: &ToolError) -> Self {
        Self::new(error.kind_label(), error.to_string())
    }

    pub fn from_workflow(error: &WorkflowError) -> Self {
        Self::new(error.kind_label(), error.to_string())
    }

    /// Compact `kind: message` form recorded in thought metadata.
    pub fn label(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

impl std::fmt::Display for ProcessingFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

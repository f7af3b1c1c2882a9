//! FlowMind — an autonomous reasoning engine
//!
//! FlowMind turns user notes into resolved goals by repeatedly drawing a
//! unit of pending work (a *thought*), unifying it against a rule base,
//! executing the selected action — an LLM call, a memory operation, a
//! user prompt, or a composed workflow — and feeding the results back as
//! new thoughts until the top-level work completes.
//!
//! The engine is built from a few explicitly-owned pieces:
//!
//! - [`term`]: the term grammar and occurs-checked unification
//! - [`types`]: thoughts, rules, memory entries, beliefs, metadata
//! - [`store`]: shared state with optimistic compare-and-set updates
//! - [`llm`]: the generation/embeddings transport and output parsing
//! - [`tools`]: the schema-validated tool registry and built-in tools
//! - [`engine`]: the action executor, workers, and the agent loop
//! - [`persistence`]: versioned snapshot/restore of everything above
//!
//! There is no global state: [`engine::FlowMindAgent`] owns the stores
//! and passes them explicitly to its workers.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod llm;
pub mod persistence;
pub mod store;
pub mod term;
pub mod tools;
pub mod types;

pub use config::FlowMindConfig;
pub use engine::{bootstrap_rules, ActionExecutor, FlowMindAgent, Worker};
pub use llm::{HttpLlmClient, LlmClient, OutputFormat};
pub use persistence::{FileSnapshotStorage, Snapshot, SnapshotStorage};
pub use store::{MemoryFilter, MemoryStore, RuleStore, ThoughtStore};
pub use term::{apply, find_and_sample, unify, Bindings, RuleMatch, Term};
pub use tools::{
    GoalProposalTool, LlmTool, MemoryTool, PendingPrompt, Tool, ToolRegistry, UserInteractionTool,
};
pub use types::*;

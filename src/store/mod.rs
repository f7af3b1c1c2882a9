//! Shared in-memory state: thoughts, rules, and vector memory
//!
//! All three stores are safe to share across workers. Mutation goes
//! through versioned compare-and-set (thoughts), belief-only replacement
//! (rules), or append-only inserts (memory); callers that lose a race
//! restart their cycle instead of blocking.

pub mod memory;
pub mod rules;
pub mod thoughts;

pub use memory::{MemoryFilter, MemoryStore};
pub use rules::RuleStore;
pub use thoughts::ThoughtStore;

//! The reasoning engine: executor, workers, agent loop, and seed rules

pub mod agent;
pub mod bootstrap;
pub mod executor;
pub mod worker;

pub use agent::FlowMindAgent;
pub use bootstrap::bootstrap_rules;
pub use executor::ActionExecutor;
pub use worker::Worker;

//! The agent loop: owns the stores, the workers, and persistence
//!
//! `FlowMindAgent` is the assembly point. It restores a prior snapshot,
//! seeds the bootstrap rules, runs N workers against the shared stores,
//! snapshots on an interval and at shutdown, and exposes the narrow
//! surface a front-end needs: list thoughts, inject input, answer
//! prompts, save/load, adjust priorities.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::FlowMindConfig;
use crate::engine::bootstrap::bootstrap_rules;
use crate::engine::executor::ActionExecutor;
use crate::engine::worker::Worker;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::persistence::{FileSnapshotStorage, Snapshot, SnapshotStorage};
use crate::store::{MemoryStore, RuleStore, ThoughtStore};
use crate::term::Term;
use crate::tools::{
    GoalProposalTool, LlmTool, MemoryTool, PendingPrompt, Tool, ToolRegistry, UserInteractionTool,
};
use crate::types::{
    FlowMindResult, Metadata, PersistenceError, StoreError, Thought, ThoughtId, ThoughtKind,
};

pub struct FlowMindAgent {
    config: Arc<FlowMindConfig>,
    agent_id: String,
    llm: Arc<dyn LlmClient>,
    thoughts: Arc<ThoughtStore>,
    rules: Arc<RuleStore>,
    memory: Arc<MemoryStore>,
    registry: Arc<ToolRegistry>,
    executor: Arc<ActionExecutor>,
    user_interaction: Arc<UserInteractionTool>,
    storage: Arc<dyn SnapshotStorage>,
    running: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FlowMindAgent {
    /// Build an agent against the configured HTTP LLM endpoint and
    /// snapshot file.
    pub fn new(config: FlowMindConfig) -> FlowMindResult<Self> {
        let llm = HttpLlmClient::new(
            config.ollama_api_base_url.clone(),
            config.ollama_model.clone(),
            config.llm_request_timeout(),
        )?;
        let storage = FileSnapshotStorage::new(config.persistence_file_path.clone());
        Self::with_components(config, Arc::new(llm), Arc::new(storage))
    }

    /// Build an agent with explicit LLM and snapshot backends. This is
    /// the seam tests and embedders use.
    pub fn with_components(
        config: FlowMindConfig,
        llm: Arc<dyn LlmClient>,
        storage: Arc<dyn SnapshotStorage>,
    ) -> FlowMindResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let agent_id = format!("flowmind-{}", Uuid::new_v4());

        let thoughts = Arc::new(ThoughtStore::new());
        let rules = Arc::new(RuleStore::new(Arc::clone(&llm)));
        let memory = Arc::new(MemoryStore::new());

        let registry = Arc::new(ToolRegistry::new(
            Arc::clone(&llm),
            config.enable_schema_validation,
        ));
        let user_interaction = Arc::new(UserInteractionTool::new());
        registry.register(Arc::new(LlmTool::new(Arc::clone(&llm))));
        registry.register(Arc::new(MemoryTool::new(
            Arc::clone(&memory),
            Arc::clone(&llm),
            config.memory_search_limit,
        )));
        registry.register(Arc::new(GoalProposalTool::new(
            Arc::clone(&memory),
            Arc::clone(&llm),
        )));
        registry.register(Arc::clone(&user_interaction) as Arc<dyn Tool>);

        let executor = Arc::new(ActionExecutor::new(
            Arc::clone(&thoughts),
            Arc::clone(&rules),
            Arc::clone(&memory),
            Arc::clone(&registry),
            Arc::clone(&llm),
            agent_id.clone(),
        ));

        Ok(Self {
            config,
            agent_id,
            llm,
            thoughts,
            rules,
            memory,
            registry,
            executor,
            user_interaction,
            storage,
            running: Arc::new(AtomicBool::new(false)),
            wakeup: Arc::new(Notify::new()),
            shutdown: watch::channel(false).0,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Restore persisted state, seed bootstrap rules into an empty rule
    /// store, and spawn the workers and the persistence interval.
    pub async fn start(&self) -> FlowMindResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.send_replace(false);
        tracing::info!(agent_id = %self.agent_id, workers = self.config.num_workers, "agent starting");

        match self.storage.load().await {
            Ok(Some(snapshot)) => {
                snapshot.apply(&self.thoughts, &self.rules, &self.memory)?;
                self.rules.ensure_embeddings().await;
            }
            Ok(None) => {
                tracing::info!("no prior snapshot, starting fresh");
            }
            Err(e) => {
                tracing::warn!("snapshot restore failed, starting fresh: {}", e);
            }
        }

        if self.rules.is_empty() {
            let seeds = bootstrap_rules();
            tracing::info!(count = seeds.len(), "installing bootstrap rules");
            for rule in seeds {
                self.rules.add(rule);
            }
        }

        let mut tasks = self.tasks.lock();
        for index in 0..self.config.num_workers {
            let worker = Worker::new(
                index,
                Arc::clone(&self.thoughts),
                Arc::clone(&self.rules),
                Arc::clone(&self.executor),
                Arc::clone(&self.config),
            );
            tasks.push(tokio::spawn(
                worker.run(Arc::clone(&self.running), Arc::clone(&self.wakeup)),
            ));
        }
        tasks.push(self.spawn_persistence_loop());
        Ok(())
    }

    fn spawn_persistence_loop(&self) -> JoinHandle<()> {
        let config = Arc::clone(&self.config);
        let thoughts = Arc::clone(&self.thoughts);
        let rules = Arc::clone(&self.rules);
        let memory = Arc::clone(&self.memory);
        let storage = Arc::clone(&self.storage);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.persistence_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick is immediate; skip it, start has just run.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = Snapshot::capture(&config, &thoughts, &rules, &memory);
                        if let Err(e) = storage.save(&snapshot).await {
                            tracing::warn!("periodic snapshot failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("persistence loop stopped");
        })
    }

    /// Cooperative shutdown: workers finish or time out their in-flight
    /// thought, then a final snapshot is written.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(agent_id = %self.agent_id, "agent shutting down");
        self.shutdown.send_replace(true);
        self.wakeup.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!("task join failed during shutdown: {}", e);
            }
        }

        if let Err(e) = self.save().await {
            tracing::warn!("final snapshot failed: {}", e);
        }
    }

    /// Write a snapshot now.
    pub async fn save(&self) -> Result<(), PersistenceError> {
        let snapshot = Snapshot::capture(&self.config, &self.thoughts, &self.rules, &self.memory);
        self.storage.save(&snapshot).await
    }

    /// Replace in-memory state from the stored snapshot. Returns false
    /// when no snapshot exists.
    pub async fn load(&self) -> Result<bool, PersistenceError> {
        match self.storage.load().await? {
            Some(snapshot) => {
                snapshot.apply(&self.thoughts, &self.rules, &self.memory)?;
                self.rules.ensure_embeddings().await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All thoughts, for display.
    pub fn thoughts(&self) -> Vec<Thought> {
        self.thoughts.all()
    }

    /// Open user prompts, reconciled against the thought store.
    pub fn pending_prompts(&self) -> Vec<PendingPrompt> {
        self.user_interaction.pending(&self.thoughts)
    }

    /// Feed a user note in as a new PENDING input thought.
    pub fn inject_input(&self, text: &str) -> ThoughtId {
        let mut metadata = Metadata::new();
        metadata.set_agent_id(&self.agent_id);
        let thought = Thought::new(ThoughtKind::Input, Term::atom(text), metadata);
        let id = thought.id;
        self.thoughts.add(thought);
        self.wakeup.notify_waiters();
        tracing::info!(thought_id = %id, "input injected");
        id
    }

    /// Deliver the user's answer for an open prompt.
    pub fn respond(&self, prompt_id: ThoughtId, response: &str) -> Option<ThoughtId> {
        let answer = self
            .user_interaction
            .handle_response(prompt_id, response, &self.thoughts);
        if answer.is_some() {
            self.wakeup.notify_waiters();
        }
        answer
    }

    /// Withdraw an open prompt; the request thought becomes FAILED.
    pub fn cancel_prompt(&self, prompt_id: ThoughtId, reason: &str) -> bool {
        self.user_interaction
            .cancel(prompt_id, reason, &self.thoughts)
    }

    /// Pin an explicit sampling priority on a thought.
    pub fn set_priority(&self, id: ThoughtId, priority: f64) -> Result<(), StoreError> {
        loop {
            let Some(current) = self.thoughts.get(id) else {
                return Err(StoreError::ThoughtNotFound { id: id.to_string() });
            };
            let mut next = current.clone();
            next.metadata.set_priority(priority);
            if self.thoughts.update(&current, next) {
                self.wakeup.notify_waiters();
                return Ok(());
            }
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn config(&self) -> &FlowMindConfig {
        &self.config
    }

    pub fn thought_store(&self) -> &Arc<ThoughtStore> {
        &self.thoughts
    }

    pub fn rule_store(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }
}

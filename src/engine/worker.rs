//! Worker: the sample → claim → match → execute cycle
//!
//! Each worker repeatedly draws a PENDING thought (biased toward the
//! last thing it processed), claims it ACTIVE via compare-and-set,
//! selects a rule by unification, and hands execution to the executor
//! under a processing timeout. Losing any race just restarts the cycle.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::FlowMindConfig;
use crate::engine::executor::ActionExecutor;
use crate::store::{RuleStore, ThoughtStore};
use crate::term::{find_and_sample, Term};
use crate::types::{
    ProcessingFailure, Thought, ThoughtKind, ThoughtStatus, WorkflowStep,
};

/// Priority of failure-synthesis strategies; they should outrank routine
/// work.
const FAILURE_SYNTHESIS_PRIORITY: f64 = 2.0;

pub struct Worker {
    index: usize,
    thoughts: Arc<ThoughtStore>,
    rules: Arc<RuleStore>,
    executor: Arc<ActionExecutor>,
    config: Arc<FlowMindConfig>,
    last_processed: Option<Thought>,
    rng: StdRng,
}

impl Worker {
    pub fn new(
        index: usize,
        thoughts: Arc<ThoughtStore>,
        rules: Arc<RuleStore>,
        executor: Arc<ActionExecutor>,
        config: Arc<FlowMindConfig>,
    ) -> Self {
        Self {
            index,
            thoughts,
            rules,
            executor,
            config,
            last_processed: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Run until the shared flag drops. In-flight processing finishes or
    /// times out before the worker exits.
    pub async fn run(mut self, running: Arc<AtomicBool>, wakeup: Arc<Notify>) {
        tracing::debug!(worker = self.index, "worker started");
        while running.load(Ordering::SeqCst) {
            if !self.step().await {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                    _ = wakeup.notified() => {}
                }
            }
        }
        tracing::debug!(worker = self.index, "worker stopped");
    }

    /// One full cycle. Returns false when there was nothing to claim —
    /// either no PENDING thought existed or another worker won the race.
    pub async fn step(&mut self) -> bool {
        let Some(candidate) =
            self.thoughts
                .sample_pending(self.last_processed.as_ref(), &self.config, &mut self.rng)
        else {
            return false;
        };

        // Re-read the stored version; the sample is a stale snapshot.
        let Some(current) = self.thoughts.get(candidate.id) else {
            return false;
        };
        if current.status != ThoughtStatus::Pending {
            return false;
        }
        let Some(claimed) = self
            .thoughts
            .transition(current.id, ThoughtStatus::Pending, |t| {
                t.status = ThoughtStatus::Active;
                t.metadata.set_ui_context("Processing…");
            })
        else {
            return false;
        };

        let timeout = self.config.thought_processing_timeout();
        match tokio::time::timeout(timeout, self.process(&claimed)).await {
            Ok(Ok(())) => {
                self.last_processed = Some(claimed);
            }
            Ok(Err(failure)) => {
                self.handle_failure(&claimed, failure);
            }
            Err(_) => {
                tracing::warn!(thought_id = %claimed.id, "thought processing timed out");
                self.handle_failure(
                    &claimed,
                    ProcessingFailure::timeout(self.config.thought_processing_timeout_millis),
                );
            }
        }
        true
    }

    async fn process(&mut self, thought: &Thought) -> Result<(), ProcessingFailure> {
        // Workflow steps and parallel arms carry their action as content.
        if thought.kind == ThoughtKind::WorkflowStep || self.is_parallel_arm(thought) {
            return self.executor.execute(thought, None).await;
        }

        let rules = self.rules.all();
        let embeddings = self.rules.embeddings();
        let matched = find_and_sample(
            thought,
            &rules,
            self.config.context_similarity_boost_factor,
            &embeddings,
            self.config.belief_decay_rate_per_millis,
            &mut self.rng,
        );
        match matched {
            Some(selected) => {
                tracing::debug!(
                    thought_id = %thought.id,
                    rule_id = %selected.rule.id,
                    "rule matched"
                );
                self.executor.execute(thought, Some(&selected)).await
            }
            None => self.default_action(thought).await,
        }
    }

    fn is_parallel_arm(&self, thought: &Thought) -> bool {
        matches!(
            thought.metadata.workflow_step(),
            Some(WorkflowStep::Sub { .. })
        ) && thought.kind == ThoughtKind::Strategy
            && thought.content.as_struct().is_some()
    }

    /// Canonical per-kind behavior when no rule matches.
    async fn default_action(&mut self, thought: &Thought) -> Result<(), ProcessingFailure> {
        match thought.kind {
            ThoughtKind::Input => {
                let prompt = format!(
                    "Given the input \"{}\", state one concrete goal as JSON {{\"name\": ..., \"args\": [...]}}.",
                    thought.content
                );
                let action = llm_generate_action(&prompt, ThoughtKind::Goal);
                self.executor.execute_action(thought, &action, None).await
            }
            ThoughtKind::Goal => {
                let proposal = Thought::child_of(
                    thought,
                    ThoughtKind::Strategy,
                    Term::structure("propose_related_goal", vec![thought.content.clone()]),
                );
                self.thoughts.add(proposal);

                let prompt = format!(
                    "For the goal \"{}\", state one strategy to pursue it as JSON {{\"name\": ..., \"args\": [...]}}.",
                    thought.content
                );
                let action = llm_generate_action(&prompt, ThoughtKind::Strategy);
                self.executor.execute_action(thought, &action, None).await
            }
            ThoughtKind::Strategy => {
                let discovery = Thought::child_of(
                    thought,
                    ThoughtKind::Strategy,
                    Term::structure("discover_tools_for", vec![thought.content.clone()]),
                );
                self.thoughts.add(discovery);

                let prompt = format!(
                    "Execute the strategy \"{}\" and report the outcome as JSON {{\"value\": ...}}.",
                    thought.content
                );
                let action = llm_generate_action(&prompt, ThoughtKind::Outcome);
                self.executor.execute_action(thought, &action, None).await
            }
            ThoughtKind::Outcome => {
                // Outcomes need no further action; completing them may
                // complete their parents.
                self.thoughts
                    .transition(thought.id, ThoughtStatus::Active, |t| {
                        t.status = ThoughtStatus::Done;
                        t.metadata.set_ui_context("Completed");
                        t.belief.update(true);
                    });
                self.executor.check_completion(thought.metadata.parent_id());
                Ok(())
            }
            ThoughtKind::Query => {
                let prompt = format!(
                    "Answer this query as JSON {{\"value\": ...}}: {}",
                    thought.content
                );
                let action = llm_generate_action(&prompt, ThoughtKind::Outcome);
                self.executor.execute_action(thought, &action, None).await
            }
            other => Err(ProcessingFailure::new(
                "unknown_default_action",
                format!("no default action for kind {}", other),
            )),
        }
    }

    /// Retry bookkeeping: recycle to PENDING while retries remain, then
    /// fail terminally and queue a failure-rule synthesis strategy.
    fn handle_failure(&self, claimed: &Thought, failure: ProcessingFailure) {
        let retries = claimed.metadata.retry_count() + 1;
        let max_retries = self.config.max_retries;
        let label = failure.label();

        if retries <= max_retries {
            tracing::info!(
                thought_id = %claimed.id,
                retries,
                max_retries,
                "processing failed, recycling: {}",
                label
            );
            self.thoughts
                .transition(claimed.id, ThoughtStatus::Active, |t| {
                    t.status = ThoughtStatus::Pending;
                    t.metadata.set_retry_count(retries);
                    t.metadata.set_error(&label);
                    t.metadata
                        .set_ui_context(&format!("Retrying ({}/{})", retries, max_retries));
                    t.belief.update(false);
                });
            return;
        }

        tracing::warn!(thought_id = %claimed.id, "retries exhausted, failing: {}", label);
        let failed = self
            .thoughts
            .transition(claimed.id, ThoughtStatus::Active, |t| {
                t.status = ThoughtStatus::Failed;
                t.metadata.set_error(&label);
                t.metadata.set_ui_context(&format!("Failed: {}", failure.kind));
                t.belief.update(false);
            });

        let base = failed.unwrap_or_else(|| claimed.clone());
        let mut synthesis = Thought::child_of(
            &base,
            ThoughtKind::Strategy,
            Term::structure(
                "synthesize_failure_rule",
                vec![
                    Term::atom(claimed.id.to_string()),
                    Term::atom(failure.kind.clone()),
                ],
            ),
        );
        synthesis.metadata.set_priority(FAILURE_SYNTHESIS_PRIORITY);
        synthesis.metadata.set_generation_prompt(&format!(
            "A thought failed {} times and was abandoned.\nContent: {}\nKind: {}\nLast error: {}\n\
             Propose a rule that handles this case, as JSON \
             {{\"pattern\": {{\"name\": ..., \"args\": [...]}}, \"action\": {{\"name\": ..., \"args\": [...]}}}}.",
            retries, claimed.content, claimed.kind, label
        ));
        tracing::info!(
            failed_id = %claimed.id,
            synthesis_id = %synthesis.id,
            "queued failure-rule synthesis"
        );
        self.thoughts.add(synthesis);
    }
}

/// Build the canonical `llm(params(…))` generation action.
fn llm_generate_action(prompt: &str, target: ThoughtKind) -> Term {
    Term::structure(
        "llm",
        vec![Term::structure(
            "params",
            vec![
                Term::pair("action", Term::atom("generate")),
                Term::pair("input", Term::atom(prompt)),
                Term::pair("kind", Term::atom(target.as_str())),
                Term::pair("format", Term::atom("json")),
            ],
        )],
    )
}

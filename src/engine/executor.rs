//! Action execution: tool dispatch, workflow composition, rule
//! synthesis, and hierarchical completion
//!
//! The executor receives a claimed ACTIVE trigger thought together with
//! a bound rule action (or, for workflow steps, the trigger's own
//! content), runs it, writes the results back, and drives the trigger's
//! next status transition. All transitions are single-entity
//! compare-and-set commits; a failure to process is reported to the
//! worker, which owns retry bookkeeping.

use serde_json::Value;
use std::sync::Arc;

use crate::llm::LlmClient;
use crate::store::{MemoryStore, RuleStore, ThoughtStore};
use crate::term::{apply, RuleMatch, Term};
use crate::tools::{DynamicToolSpec, ToolParams, ToolRegistry};
use crate::types::{
    MemoryEntry, Metadata, ProcessingFailure, Rule, Thought, ThoughtId, ThoughtKind,
    ThoughtStatus, WorkflowError, WorkflowId, WorkflowStep,
};

/// Where a tool action sits relative to a sequence workflow; decides the
/// trigger's status after a successful call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    Standalone,
    SequenceStep { has_next: bool },
}

impl StepMode {
    fn success_status(self, standalone_default: ThoughtStatus) -> ThoughtStatus {
        match self {
            StepMode::SequenceStep { has_next: true } => ThoughtStatus::Waiting,
            StepMode::SequenceStep { has_next: false } => ThoughtStatus::Done,
            StepMode::Standalone => standalone_default,
        }
    }
}

pub struct ActionExecutor {
    thoughts: Arc<ThoughtStore>,
    rules: Arc<RuleStore>,
    memory: Arc<MemoryStore>,
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    agent_id: String,
}

impl ActionExecutor {
    pub fn new(
        thoughts: Arc<ThoughtStore>,
        rules: Arc<RuleStore>,
        memory: Arc<MemoryStore>,
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            thoughts,
            rules,
            memory,
            registry,
            llm,
            agent_id: agent_id.into(),
        }
    }

    /// Execute a matched rule against the trigger, or the trigger's own
    /// content when it is a workflow step. Feeds the outcome back into
    /// the rule's belief.
    pub async fn execute(
        &self,
        trigger: &Thought,
        matched: Option<&RuleMatch>,
    ) -> Result<(), ProcessingFailure> {
        let (action, rule) = match matched {
            Some(m) => (apply(&m.rule.action, &m.bindings), Some(&m.rule)),
            None => (trigger.content.clone(), None),
        };
        let result = self.execute_action(trigger, &action, rule).await;
        if let Some(rule) = rule {
            self.rules.update_belief(rule.id, result.is_ok());
        }
        result
    }

    /// Execute a resolved action term against the trigger. Used directly
    /// by the worker for kind-default actions.
    pub async fn execute_action(
        &self,
        trigger: &Thought,
        action: &Term,
        rule: Option<&Rule>,
    ) -> Result<(), ProcessingFailure> {
        let Some((name, args)) = action.as_struct() else {
            let error = WorkflowError::Malformed {
                reason: format!("action term must be a structure, got {}", action),
            };
            return Err(ProcessingFailure::from_workflow(&error));
        };
        match name {
            "sequence" | "chain" => self.run_sequence(trigger, args, rule).await,
            "parallel" => self.run_parallel(trigger, args, rule).await,
            _ => {
                self.run_tool(trigger, name, args, rule, StepMode::Standalone)
                    .await
            }
        }
    }

    /// Sequence: run the first step now, park the rest in a PENDING
    /// workflow-step thought picked up after this one resolves.
    async fn run_sequence(
        &self,
        trigger: &Thought,
        steps: &[Term],
        rule: Option<&Rule>,
    ) -> Result<(), ProcessingFailure> {
        if steps.is_empty() {
            self.finish_trigger(trigger, ThoughtStatus::Done, rule, "Workflow complete");
            self.check_completion(trigger.metadata.parent_id());
            return Ok(());
        }

        let workflow_id = trigger
            .metadata
            .workflow_id()
            .unwrap_or_else(WorkflowId::new);
        let step_index = match trigger.metadata.workflow_step() {
            Some(WorkflowStep::Index(i)) => i,
            _ => 0,
        };

        let rest = &steps[1..];
        let has_next = !rest.is_empty();
        if has_next {
            let mut next = Thought::child_of(
                trigger,
                ThoughtKind::WorkflowStep,
                Term::structure("sequence", rest.to_vec()),
            );
            next.metadata.set_workflow_id(workflow_id);
            next.metadata
                .set_workflow_step(WorkflowStep::Index(step_index + 1));
            if let Some(rule) = rule {
                next.metadata.push_provenance(rule.id.0);
            }
            if let Some(priority) = trigger.metadata.priority() {
                next.metadata.set_priority(priority);
            }
            tracing::debug!(
                workflow_id = %workflow_id,
                step = step_index + 1,
                "queued next sequence step"
            );
            self.thoughts.add(next);
        }

        let first = &steps[0];
        let Some((name, args)) = first.as_struct() else {
            let error = WorkflowError::Malformed {
                reason: format!("sequence step must be a tool call, got {}", first),
            };
            return Err(ProcessingFailure::from_workflow(&error));
        };
        self.run_tool(trigger, name, args, rule, StepMode::SequenceStep { has_next })
            .await
    }

    /// Parallel: fan every step out as its own PENDING strategy thought
    /// and wait for the children to complete.
    async fn run_parallel(
        &self,
        trigger: &Thought,
        steps: &[Term],
        rule: Option<&Rule>,
    ) -> Result<(), ProcessingFailure> {
        if steps.is_empty() {
            self.finish_trigger(trigger, ThoughtStatus::Done, rule, "Workflow complete");
            self.check_completion(trigger.metadata.parent_id());
            return Ok(());
        }

        let workflow_id = trigger
            .metadata
            .workflow_id()
            .unwrap_or_else(WorkflowId::new);
        let parent_index = match trigger.metadata.workflow_step() {
            Some(WorkflowStep::Index(i)) => i,
            Some(WorkflowStep::Sub { parent, .. }) => parent,
            None => 0,
        };

        let mut child_ids = Vec::with_capacity(steps.len());
        for (arm, step) in steps.iter().enumerate() {
            let mut child = Thought::child_of(trigger, ThoughtKind::Strategy, step.clone());
            child.metadata.set_workflow_id(workflow_id);
            child.metadata.set_workflow_step(WorkflowStep::Sub {
                parent: parent_index,
                arm: arm as u64,
            });
            if let Some(rule) = rule {
                child.metadata.push_provenance(rule.id.0);
            }
            if let Some(priority) = trigger.metadata.priority() {
                child.metadata.set_priority(priority);
            }
            child_ids.push(child.id);
            self.thoughts.add(child);
        }
        tracing::debug!(
            workflow_id = %workflow_id,
            arms = child_ids.len(),
            "parallel workflow dispatched"
        );

        let ui = format!("Waiting on {} parallel steps", child_ids.len());
        self.thoughts
            .transition(trigger.id, ThoughtStatus::Active, |t| {
                t.status = ThoughtStatus::Waiting;
                t.metadata.set_related_ids(&child_ids);
                t.metadata.set_workflow_id(workflow_id);
                t.metadata.set_ui_context(&ui);
                t.belief.update(true);
                if let Some(rule) = rule {
                    t.metadata.push_provenance(rule.id.0);
                }
            });
        self.memorize(trigger, rule, None, true, None).await;
        Ok(())
    }

    /// Run one tool call against the trigger and route its result:
    /// synthesized rules and discovered tools are consumed, anything
    /// else lands in the thought store and the trigger waits on it.
    async fn run_tool(
        &self,
        trigger: &Thought,
        name: &str,
        args: &[Term],
        rule: Option<&Rule>,
        mode: StepMode,
    ) -> Result<(), ProcessingFailure> {
        let params = extract_params(args);
        let mut result = self
            .registry
            .execute(name, &params, trigger, &self.agent_id)
            .await;

        if result.status != ThoughtStatus::Failed {
            match result.kind {
                ThoughtKind::Rule => {
                    return self.synthesize_rule(trigger, &result, rule, mode).await;
                }
                ThoughtKind::Tools => {
                    return self.register_tools(trigger, &result, rule, mode).await;
                }
                _ => {}
            }
        }

        if let Some(rule) = rule {
            result.metadata.push_provenance(rule.id.0);
        }
        self.thoughts.add(result.clone());

        if result.status == ThoughtStatus::Failed {
            let label = result
                .metadata
                .error()
                .unwrap_or("tool_execution: action execution failed")
                .to_string();
            self.memorize(trigger, rule, Some(&result), false, Some(&label))
                .await;
            return Err(ProcessingFailure::from_label(&label));
        }

        // A WAITING user-interaction result and ordinary DONE/PENDING
        // results both leave the trigger waiting: on the user's answer,
        // or on the result's downstream processing.
        let status = mode.success_status(ThoughtStatus::Waiting);
        let ui = match status {
            ThoughtStatus::Done => "Completed",
            _ => "Waiting on results",
        };
        self.finish_trigger(trigger, status, rule, ui);
        self.memorize(trigger, rule, Some(&result), true, None).await;

        if result.status.is_terminal() {
            self.check_completion(result.metadata.parent_id());
        }
        if status == ThoughtStatus::Done {
            self.check_completion(trigger.metadata.parent_id());
        }
        Ok(())
    }

    /// A RULE result carrying `rule_definition(pattern, action)` becomes
    /// a new rule with default belief.
    async fn synthesize_rule(
        &self,
        trigger: &Thought,
        result: &Thought,
        rule: Option<&Rule>,
        mode: StepMode,
    ) -> Result<(), ProcessingFailure> {
        let definition = match result.content.as_struct() {
            Some(("rule_definition", [pattern, action])) => Some((pattern, action)),
            _ => None,
        };
        let Some((pattern, action)) = definition else {
            let error = WorkflowError::SynthesisMalformed {
                reason: format!("expected rule_definition(pattern, action), got {}", result.content),
            };
            self.memorize(trigger, rule, Some(result), false, Some(&error.to_string()))
                .await;
            return Err(ProcessingFailure::from_workflow(&error));
        };

        let mut synthesized = Rule::new(pattern.clone(), action.clone());
        synthesized.metadata.push_provenance(trigger.id.0);
        synthesized
            .metadata
            .insert("source", Value::from("synthesized"));
        let rule_id = synthesized.id;
        self.rules.add(synthesized);
        tracing::info!(rule_id = %rule_id, trigger_id = %trigger.id, "rule synthesized");

        let status = mode.success_status(ThoughtStatus::Done);
        self.finish_trigger(trigger, status, rule, "Rule synthesized");
        self.memorize(trigger, rule, Some(result), true, None).await;
        if status == ThoughtStatus::Done {
            self.check_completion(trigger.metadata.parent_id());
        }
        Ok(())
    }

    /// A TOOLS result carrying `tool_spec` structures instantiates
    /// adapters from the known set; unknown kinds are skipped.
    async fn register_tools(
        &self,
        trigger: &Thought,
        result: &Thought,
        rule: Option<&Rule>,
        mode: StepMode,
    ) -> Result<(), ProcessingFailure> {
        let specs: Vec<DynamicToolSpec> = match &result.content {
            Term::List(items) => items.iter().filter_map(DynamicToolSpec::from_term).collect(),
            single => DynamicToolSpec::from_term(single).into_iter().collect(),
        };
        let mut registered = 0usize;
        for spec in &specs {
            if self.registry.register_dynamic(spec) {
                registered += 1;
            }
        }
        tracing::info!(
            trigger_id = %trigger.id,
            discovered = specs.len(),
            registered,
            "tool discovery processed"
        );

        let status = mode.success_status(ThoughtStatus::Done);
        self.finish_trigger(trigger, status, rule, "Tools registered");
        self.memorize(trigger, rule, Some(result), true, None).await;
        if status == ThoughtStatus::Done {
            self.check_completion(trigger.metadata.parent_id());
        }
        Ok(())
    }

    fn finish_trigger(
        &self,
        trigger: &Thought,
        status: ThoughtStatus,
        rule: Option<&Rule>,
        ui_context: &str,
    ) {
        self.thoughts
            .transition(trigger.id, ThoughtStatus::Active, |t| {
                t.status = status;
                t.metadata.set_ui_context(ui_context);
                t.belief.update(true);
                if let Some(rule) = rule {
                    t.metadata.push_provenance(rule.id.0);
                }
            });
    }

    /// Hierarchical completion: when every direct child of a WAITING
    /// parent is DONE, the parent transitions DONE and the check climbs.
    /// A FAILED child blocks completion but never auto-fails the parent;
    /// reacting to it is left to rules.
    pub fn check_completion(&self, start: Option<ThoughtId>) {
        let mut current = start;
        while let Some(id) = current {
            let Some(parent) = self.thoughts.get(id) else {
                break;
            };
            if parent.status != ThoughtStatus::Waiting {
                break;
            }
            let children = self.thoughts.find_by_parent(id);
            if children.is_empty()
                || !children.iter().all(|c| c.status == ThoughtStatus::Done)
            {
                break;
            }
            let committed = self.thoughts.transition(id, ThoughtStatus::Waiting, |t| {
                t.status = ThoughtStatus::Done;
                t.metadata.set_ui_context("Completed");
                t.belief.update(true);
            });
            if committed.is_none() {
                // Someone else moved the parent; re-read and re-decide.
                continue;
            }
            tracing::debug!(thought_id = %id, "parent completed through children");
            current = parent.metadata.parent_id();
        }
    }

    /// Record an execution trace in memory. Best-effort: embedding
    /// failures leave a zero-magnitude vector that similarity search
    /// never surfaces, but the trace stays inspectable.
    async fn memorize(
        &self,
        trigger: &Thought,
        rule: Option<&Rule>,
        result: Option<&Thought>,
        success: bool,
        error: Option<&str>,
    ) {
        let record = serde_json::json!({
            "trigger_id": trigger.id.to_string(),
            "trigger_content": trigger.content.to_string(),
            "rule_id": rule.map(|r| r.id.to_string()),
            "result_id": result.map(|r| r.id.to_string()),
            "success": success,
            "error": error,
        });
        let content = record.to_string();
        let embedding = match self.llm.embed(&content).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::debug!("trace embedding failed, storing without vector: {}", e);
                Vec::new()
            }
        };

        let mut metadata = Metadata::new();
        metadata.set_entry_type("execution_trace");
        metadata.add_related_id(trigger.id);
        if let Some(result) = result {
            metadata.add_related_id(result.id);
        }
        if let Some(rule) = rule {
            metadata.push_provenance(rule.id.0);
        }
        for id in trigger.metadata.provenance() {
            metadata.push_provenance(id);
        }
        self.memory.add(MemoryEntry::new(content, embedding, metadata));
    }
}

/// Extract tool parameters from action-term arguments.
///
/// Preferred encoding is a single `params(k₁(v₁), …)` wrapper; bare
/// `k(v)` pairs and positional arguments (`arg0`, `arg1`, …) are also
/// accepted.
pub fn extract_params(args: &[Term]) -> ToolParams {
    if let [single] = args {
        if let Some(("params", pairs)) = single.as_struct() {
            return pairs_to_params(pairs);
        }
    }
    let all_pairs = !args.is_empty()
        && args.iter().all(|arg| {
            matches!(arg.as_struct(), Some((name, inner)) if inner.len() == 1 && name != "params")
        });
    if all_pairs {
        return pairs_to_params(args);
    }
    args.iter()
        .enumerate()
        .map(|(i, arg)| (format!("arg{}", i), term_to_value(arg)))
        .collect()
}

fn pairs_to_params(pairs: &[Term]) -> ToolParams {
    let mut params = ToolParams::new();
    for pair in pairs {
        match pair.as_struct() {
            Some((key, [value])) => {
                params.insert(key.to_string(), term_to_value(value));
            }
            _ => {
                tracing::debug!("ignoring non-pair parameter entry: {}", pair);
            }
        }
    }
    params
}

/// Coerce a term to a JSON parameter value. Atoms map to primitives,
/// lists map element-wise, nested `params(…)` recurses into an object,
/// and any other structure is passed in its string form.
fn term_to_value(term: &Term) -> Value {
    match term {
        Term::Atom(s) => match s.as_str() {
            "true" => Value::from(true),
            "false" => Value::from(false),
            "null" | "undefined" => Value::Null,
            other => {
                if let Ok(n) = other.parse::<i64>() {
                    Value::from(n)
                } else if let Ok(f) = other.parse::<f64>() {
                    if f.is_finite() {
                        Value::from(f)
                    } else {
                        Value::from(other)
                    }
                } else {
                    Value::from(other)
                }
            }
        },
        Term::List(elements) => Value::from(
            elements.iter().map(term_to_value).collect::<Vec<Value>>(),
        ),
        Term::Struct(name, pairs) if name == "params" => {
            let object: serde_json::Map<String, Value> = pairs
                .iter()
                .filter_map(|pair| match pair.as_struct() {
                    Some((key, [value])) => Some((key.to_string(), term_to_value(value))),
                    _ => None,
                })
                .collect();
            Value::Object(object)
        }
        Term::Struct(_, _) => Value::from(term.to_string()),
        Term::Var(name) => Value::from(format!("?{}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_params_wrapper() {
        let args = vec![Term::structure(
            "params",
            vec![
                Term::pair("action", Term::atom("search")),
                Term::pair("limit", Term::atom("3")),
            ],
        )];
        let params = extract_params(&args);
        assert_eq!(params.get("action"), Some(&Value::from("search")));
        assert_eq!(params.get("limit"), Some(&Value::from(3)));
    }

    #[test]
    fn test_extract_params_bare_pairs() {
        let args = vec![
            Term::pair("query", Term::atom("paris")),
            Term::pair("flag", Term::atom("true")),
        ];
        let params = extract_params(&args);
        assert_eq!(params.get("query"), Some(&Value::from("paris")));
        assert_eq!(params.get("flag"), Some(&Value::from(true)));
    }

    #[test]
    fn test_extract_params_positional() {
        let args = vec![Term::atom("a"), Term::atom("2.5")];
        let params = extract_params(&args);
        assert_eq!(params.get("arg0"), Some(&Value::from("a")));
        assert_eq!(params.get("arg1"), Some(&Value::from(2.5)));
    }

    #[test]
    fn test_atom_coercion() {
        assert_eq!(term_to_value(&Term::atom("null")), Value::Null);
        assert_eq!(term_to_value(&Term::atom("undefined")), Value::Null);
        assert_eq!(term_to_value(&Term::atom("false")), Value::from(false));
        assert_eq!(term_to_value(&Term::atom("42")), Value::from(42));
        assert_eq!(term_to_value(&Term::atom("4.5")), Value::from(4.5));
        assert_eq!(term_to_value(&Term::atom("inf")), Value::from("inf"));
        assert_eq!(term_to_value(&Term::atom("plain")), Value::from("plain"));
    }

    #[test]
    fn test_list_and_nested_params() {
        let term = Term::list(vec![
            Term::atom("1"),
            Term::structure("params", vec![Term::pair("k", Term::atom("v"))]),
        ]);
        let value = term_to_value(&term);
        assert_eq!(value, serde_json::json!([1, {"k": "v"}]));
    }

    #[test]
    fn test_other_structs_stringify() {
        let term = Term::structure("point", vec![Term::atom("1"), Term::atom("2")]);
        assert_eq!(term_to_value(&term), Value::from("point(1, 2)"));
    }
}

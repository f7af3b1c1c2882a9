//! User interaction: stateful prompt correlation
//!
//! A request is a WAITING strategy thought; the correlation map links
//! its id to the thought awaiting the answer. The map is a cache over
//! the thought store — `pending` reconciles it on every call so a
//! restored snapshot produces a coherent view without extra bookkeeping.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::store::ThoughtStore;
use crate::term::Term;
use crate::tools::{
    result_metadata, Requirement, Tool, ToolParameterType, ToolParams, ToolSchema,
};
use crate::types::{
    InteractionDetails, Metadata, Thought, ThoughtId, ThoughtKind, ThoughtStatus, ToolError,
};

/// Priority of answer thoughts, so responses are processed promptly.
const RESPONSE_PRIORITY: f64 = 2.0;

/// Content head marking a user-input request thought.
pub const REQUEST_HEAD: &str = "request_user_input";

#[derive(Debug, Clone)]
struct Correlation {
    parent_id: Option<ThoughtId>,
    agent_id: String,
}

/// One open prompt as presented to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrompt {
    pub request_id: ThoughtId,
    pub prompt: String,
    pub options: Option<Vec<String>>,
}

pub struct UserInteractionTool {
    requests: DashMap<ThoughtId, Correlation>,
    schema: ToolSchema,
}

impl Default for UserInteractionTool {
    fn default() -> Self {
        Self::new()
    }
}

impl UserInteractionTool {
    pub const NAME: &'static str = "user_interaction";

    pub fn new() -> Self {
        let schema = ToolSchema::new()
            .param(
                "prompt",
                ToolParameterType::String,
                Requirement::Always,
                "question shown to the user",
            )
            .array_param(
                "options",
                ToolParameterType::String,
                Requirement::Optional,
                "suggested answers",
            );
        Self {
            requests: DashMap::new(),
            schema,
        }
    }

    /// Deliver a user's answer for an open request.
    ///
    /// Creates the high-priority PENDING input thought carrying the
    /// response, then completes the request via compare-and-set. Unknown
    /// request ids are ignored with a warning.
    pub fn handle_response(
        &self,
        request_id: ThoughtId,
        response: &str,
        store: &ThoughtStore,
    ) -> Option<ThoughtId> {
        let Some((_, correlation)) = self.requests.remove(&request_id) else {
            tracing::warn!(request_id = %request_id, "response for unknown prompt, ignoring");
            return None;
        };
        let Some(request) = store.get(request_id) else {
            tracing::warn!(request_id = %request_id, "prompt thought no longer exists, ignoring");
            return None;
        };

        let mut answer = match correlation.parent_id.and_then(|id| store.get(id)) {
            Some(parent) => Thought::child_of(&parent, ThoughtKind::Input, Term::atom(response)),
            None => {
                // The awaiting thought is gone; anchor the answer under
                // the request itself so the tree stays connected.
                Thought::child_of(&request, ThoughtKind::Input, Term::atom(response))
            }
        };
        answer.metadata.set_agent_id(&correlation.agent_id);
        answer.metadata.set_priority(RESPONSE_PRIORITY);
        answer.metadata.set_answered_prompt_id(request_id);
        let answer_id = answer.id;
        store.add(answer);

        store.transition(request_id, ThoughtStatus::Waiting, |t| {
            t.status = ThoughtStatus::Done;
            t.metadata.set_response_thought_id(answer_id);
            t.belief.update(true);
        });
        tracing::info!(request_id = %request_id, answer_id = %answer_id, "user response recorded");
        Some(answer_id)
    }

    /// Withdraw an open request; the WAITING thought becomes FAILED.
    pub fn cancel(&self, request_id: ThoughtId, reason: &str, store: &ThoughtStore) -> bool {
        let removed = self.requests.remove(&request_id).is_some();
        let transitioned = store
            .transition(request_id, ThoughtStatus::Waiting, |t| {
                t.status = ThoughtStatus::Failed;
                t.metadata.set_error(&format!("tool_execution: {}", reason));
                t.belief.update(false);
            })
            .is_some();
        removed || transitioned
    }

    /// Open prompts, with the thought store as the source of truth.
    ///
    /// The correlation map is reconciled against WAITING request
    /// thoughts: entries are re-created for restored thoughts and
    /// dropped for thoughts that have moved on.
    pub fn pending(&self, store: &ThoughtStore) -> Vec<PendingPrompt> {
        let mut open = Vec::new();
        let mut live_ids = Vec::new();
        for thought in store.all() {
            if thought.status != ThoughtStatus::Waiting {
                continue;
            }
            if thought.content.name() != Some(REQUEST_HEAD) {
                continue;
            }
            let Some(details) = thought.metadata.interaction_details() else {
                continue;
            };
            live_ids.push(thought.id);
            if !self.requests.contains_key(&thought.id) {
                self.requests.insert(
                    thought.id,
                    Correlation {
                        parent_id: thought.metadata.parent_id(),
                        agent_id: thought
                            .metadata
                            .agent_id()
                            .unwrap_or_default()
                            .to_string(),
                    },
                );
            }
            open.push(PendingPrompt {
                request_id: thought.id,
                prompt: details.prompt,
                options: details.options,
            });
        }
        self.requests.retain(|id, _| live_ids.contains(id));
        open
    }
}

#[async_trait]
impl Tool for UserInteractionTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "ask the user a question and wait for the answer"
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
        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParams {
                name: Self::NAME.to_string(),
                reason: "missing string parameter 'prompt'".to_string(),
            })?;
        let options = params.get("options").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        let mut metadata: Metadata = result_metadata(parent, agent_id);
        metadata.set_interaction_details(&InteractionDetails {
            prompt: prompt.to_string(),
            options,
        });
        metadata.set_ui_context(prompt);

        let mut request = Thought::new(
            ThoughtKind::Strategy,
            Term::structure(REQUEST_HEAD, vec![Term::atom(prompt)]),
            metadata,
        );
        request.status = ThoughtStatus::Waiting;

        self.requests.insert(
            request.id,
            Correlation {
                parent_id: Some(parent.id),
                agent_id: agent_id.to_string(),
            },
        );
        tracing::info!(request_id = %request.id, "user prompt opened");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_request(
        tool: &UserInteractionTool,
        store: &ThoughtStore,
        prompt: &str,
    ) -> (Thought, Thought) {
        let parent = Thought::new(ThoughtKind::Input, Term::atom("clarify"), Metadata::new());
        store.add(parent.clone());

        let mut params = ToolParams::new();
        params.insert("prompt".to_string(), Value::from(prompt));
        let request = futures::executor::block_on(tool.execute(&params, &parent, "agent")).unwrap();
        store.add(request.clone());
        (parent, request)
    }

    #[test]
    fn test_request_is_waiting_with_details() {
        let tool = UserInteractionTool::new();
        let store = ThoughtStore::new();
        let (_, request) = open_request(&tool, &store, "Which city?");

        assert_eq!(request.status, ThoughtStatus::Waiting);
        assert_eq!(request.kind, ThoughtKind::Strategy);
        let details = request.metadata.interaction_details().unwrap();
        assert_eq!(details.prompt, "Which city?");

        let open = tool.pending(&store);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].request_id, request.id);
    }

    #[test]
    fn test_response_creates_answer_and_completes_request() {
        let tool = UserInteractionTool::new();
        let store = ThoughtStore::new();
        let (parent, request) = open_request(&tool, &store, "Which city?");

        let answer_id = tool
            .handle_response(request.id, "Paris", &store)
            .expect("request is open");

        let answer = store.get(answer_id).unwrap();
        assert_eq!(answer.kind, ThoughtKind::Input);
        assert_eq!(answer.status, ThoughtStatus::Pending);
        assert_eq!(answer.content, Term::atom("Paris"));
        assert_eq!(answer.metadata.parent_id(), Some(parent.id));
        assert_eq!(answer.metadata.answered_prompt_id(), Some(request.id));
        assert_eq!(answer.metadata.priority(), Some(RESPONSE_PRIORITY));

        let completed = store.get(request.id).unwrap();
        assert_eq!(completed.status, ThoughtStatus::Done);
        assert_eq!(completed.metadata.response_thought_id(), Some(answer_id));
        assert!(tool.pending(&store).is_empty());
    }

    #[test]
    fn test_unknown_request_is_ignored() {
        let tool = UserInteractionTool::new();
        let store = ThoughtStore::new();
        assert!(tool
            .handle_response(ThoughtId::new(), "answer", &store)
            .is_none());
    }

    #[test]
    fn test_cancel_fails_request() {
        let tool = UserInteractionTool::new();
        let store = ThoughtStore::new();
        let (_, request) = open_request(&tool, &store, "Proceed?");

        assert!(tool.cancel(request.id, "shutting down", &store));
        let cancelled = store.get(request.id).unwrap();
        assert_eq!(cancelled.status, ThoughtStatus::Failed);
        assert!(cancelled.metadata.error().unwrap().contains("shutting down"));
    }

    #[test]
    fn test_pending_reconciles_restored_state() {
        let tool = UserInteractionTool::new();
        let store = ThoughtStore::new();

        // Simulate a request restored from a snapshot: present in the
        // store, absent from the correlation map.
        let parent = Thought::new(ThoughtKind::Input, Term::atom("seed"), Metadata::new());
        store.add(parent.clone());
        let mut metadata = Metadata::new();
        metadata.set_parent_id(parent.id);
        metadata.set_interaction_details(&InteractionDetails {
            prompt: "Restored?".to_string(),
            options: None,
        });
        let mut restored = Thought::new(
            ThoughtKind::Strategy,
            Term::structure(REQUEST_HEAD, vec![Term::atom("Restored?")]),
            metadata,
        );
        restored.status = ThoughtStatus::Waiting;
        store.add(restored.clone());

        let open = tool.pending(&store);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].prompt, "Restored?");

        // The reconciled map now serves responses for the restored id.
        let answer_id = tool.handle_response(restored.id, "yes", &store).unwrap();
        assert_eq!(
            store.get(answer_id).unwrap().metadata.parent_id(),
            Some(parent.id)
        );
    }
}

//! Rule base with cached pattern/action embeddings
//!
//! Rules are keyed by id; a parallel map holds the embedding derived
//! from each rule's string form. Embedding generation is best-effort and
//! off the caller's path: a rule without a vector still matches, it just
//! misses the similarity boost.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::llm::LlmClient;
use crate::types::{Rule, RuleId};

/// Cap on the string form fed to the embeddings endpoint.
const EMBEDDING_TEXT_MAX_CHARS: usize = 1024;

pub struct RuleStore {
    rules: DashMap<RuleId, Rule>,
    embeddings: DashMap<RuleId, Vec<f32>>,
    llm: Arc<dyn LlmClient>,
}

impl RuleStore {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            rules: DashMap::new(),
            embeddings: DashMap::new(),
            llm,
        }
    }

    pub fn get(&self, id: RuleId) -> Option<Rule> {
        self.rules.get(&id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<Rule> {
        self.rules.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clear(&self) {
        self.rules.clear();
        self.embeddings.clear();
    }

    /// Insert without touching the embedding cache. Used by restore and
    /// by callers that provide the vector themselves.
    pub fn insert(&self, rule: Rule) {
        self.rules.insert(rule.id, rule);
    }

    /// Insert a rule and generate its embedding in the background.
    pub fn add(self: &Arc<Self>, rule: Rule) {
        let id = rule.id;
        let text = rule.embedding_text(EMBEDDING_TEXT_MAX_CHARS);
        self.rules.insert(id, rule);
        self.spawn_embedding(id, text);
    }

    /// Replace a rule wholesale. The cached embedding is invalidated and
    /// regenerated from the new string form.
    pub fn replace(self: &Arc<Self>, rule: Rule) {
        let id = rule.id;
        let text = rule.embedding_text(EMBEDDING_TEXT_MAX_CHARS);
        self.rules.insert(id, rule);
        self.embeddings.remove(&id);
        self.spawn_embedding(id, text);
    }

    fn spawn_embedding(self: &Arc<Self>, id: RuleId, text: String) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            match store.llm.embed(&text).await {
                Ok(vector) => {
                    store.embeddings.insert(id, vector);
                }
                Err(e) => {
                    tracing::warn!(rule_id = %id, "rule embedding generation failed: {}", e);
                }
            }
        });
    }

    /// Record one observation on a rule's belief.
    pub fn update_belief(&self, id: RuleId, success: bool) -> bool {
        match self.rules.get_mut(&id) {
            Some(mut entry) => {
                entry.belief.update(success);
                true
            }
            None => false,
        }
    }

    pub fn embedding_of(&self, id: RuleId) -> Option<Vec<f32>> {
        self.embeddings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn set_embedding(&self, id: RuleId, vector: Vec<f32>) {
        self.embeddings.insert(id, vector);
    }

    /// Cloned id → vector map for the matcher.
    pub fn embeddings(&self) -> HashMap<RuleId, Vec<f32>> {
        self.embeddings
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Backfill embeddings for rules that are missing one, e.g. after a
    /// snapshot restore. Failures are logged and skipped.
    pub async fn ensure_embeddings(&self) {
        let missing: Vec<Rule> = self
            .rules
            .iter()
            .filter(|entry| !self.embeddings.contains_key(entry.key()))
            .map(|entry| entry.value().clone())
            .collect();
        for rule in missing {
            let text = rule.embedding_text(EMBEDDING_TEXT_MAX_CHARS);
            match self.llm.embed(&text).await {
                Ok(vector) => {
                    self.embeddings.insert(rule.id, vector);
                }
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, "rule embedding backfill failed: {}", e);
                }
            }
        }
    }
}

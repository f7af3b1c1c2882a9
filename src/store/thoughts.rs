//! Indexed thought set with optimistic, versioned updates
//!
//! The store owns every thought; everything handed out is a read-only
//! snapshot whose `version` doubles as the compare-and-set token. A
//! writer commits only if no other commit intervened since its read.

use chrono::Utc;
use dashmap::DashMap;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::config::FlowMindConfig;
use crate::embedding::similarity_boost;
use crate::types::{Thought, ThoughtId, ThoughtStatus};

#[derive(Debug, Default)]
pub struct ThoughtStore {
    thoughts: DashMap<ThoughtId, Thought>,
}

impl ThoughtStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ThoughtId) -> Option<Thought> {
        self.thoughts.get(&id).map(|entry| entry.value().clone())
    }

    /// Insert a thought. Replaces any record with the same id; there is
    /// exactly one thought per id.
    pub fn add(&self, thought: Thought) {
        self.thoughts.insert(thought.id, thought);
    }

    /// Optimistic compare-and-set keyed by the previous record's version.
    ///
    /// Commits `new` (with its version bumped past `old`'s) only when the
    /// currently stored record is the one the caller read. A `false`
    /// return is not an error: the caller restarts its whole
    /// sample-claim-execute cycle.
    pub fn update(&self, old: &Thought, mut new: Thought) -> bool {
        if old.id != new.id {
            return false;
        }
        let Some(mut entry) = self.thoughts.get_mut(&old.id) else {
            return false;
        };
        if entry.version != old.version {
            return false;
        }
        new.version = old.version + 1;
        *entry = new;
        true
    }

    /// Re-read, check the expected status, apply `mutate`, and commit.
    /// Retries version conflicts as long as the stored status still
    /// matches `expect`; returns the committed snapshot on success.
    pub fn transition(
        &self,
        id: ThoughtId,
        expect: ThoughtStatus,
        mutate: impl Fn(&mut Thought),
    ) -> Option<Thought> {
        loop {
            let current = self.get(id)?;
            if current.status != expect {
                return None;
            }
            let mut next = current.clone();
            mutate(&mut next);
            if self.update(&current, next.clone()) {
                next.version = current.version + 1;
                return Some(next);
            }
        }
    }

    pub fn find_by_parent(&self, parent: ThoughtId) -> Vec<Thought> {
        self.thoughts
            .iter()
            .filter(|entry| entry.metadata.parent_id() == Some(parent))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn find_by_root(&self, root: ThoughtId) -> Vec<Thought> {
        self.thoughts
            .iter()
            .filter(|entry| entry.root_id() == root)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn all(&self) -> Vec<Thought> {
        self.thoughts.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn pending(&self) -> Vec<Thought> {
        self.thoughts
            .iter()
            .filter(|entry| entry.status == ThoughtStatus::Pending)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn clear(&self) {
        self.thoughts.clear();
    }

    pub fn len(&self) -> usize {
        self.thoughts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thoughts.is_empty()
    }

    /// Draw one PENDING thought, weighted by explicit priority or belief
    /// score and boosted by embedding similarity to `context`.
    ///
    /// Items with a non-finite or non-positive weight are dropped from
    /// the weighted draw; when that filters everything, selection falls
    /// back to a uniform draw over the original PENDING set.
    pub fn sample_pending<R: Rng + ?Sized>(
        &self,
        context: Option<&Thought>,
        config: &FlowMindConfig,
        rng: &mut R,
    ) -> Option<Thought> {
        let pending = self.pending();
        if pending.is_empty() {
            return None;
        }

        let now = Utc::now();
        let context_embedding = context.and_then(|t| t.metadata.embedding());
        let boost_factor = config.context_similarity_boost_factor;
        let decay = config.belief_decay_rate_per_millis;

        let mut candidates = Vec::new();
        let mut weights = Vec::new();
        for thought in &pending {
            let base = thought.sampling_weight(decay, now);
            let boost = similarity_boost(
                context_embedding.as_deref(),
                thought.metadata.embedding().as_deref(),
                boost_factor,
            );
            let weight = base * boost;
            if weight.is_finite() && weight > 0.0 {
                candidates.push(thought.clone());
                weights.push(weight);
            }
        }

        if candidates.is_empty() {
            let index = rng.gen_range(0..pending.len());
            return pending.into_iter().nth(index);
        }

        let dist = WeightedIndex::new(&weights).ok()?;
        let index = dist.sample(rng);
        candidates.into_iter().nth(index)
    }
}

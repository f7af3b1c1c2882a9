//! Append-only vector memory with filtered k-NN retrieval

use dashmap::DashMap;

use crate::embedding::cosine_similarity;
use crate::types::{MemoryEntry, MemoryId, ThoughtId};

/// Conjunctive filter criteria applied before similarity ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilter {
    /// Exact match on the entry's `type` tag.
    pub required_type: Option<String>,
    /// Must appear in the entry's `related_ids`.
    pub related_to_id: Option<ThoughtId>,
    /// Every entity must appear in the entry's `extracted_entities`.
    pub required_entities: Vec<String>,
}

impl MemoryFilter {
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(required) = &self.required_type {
            if entry.metadata.entry_type() != Some(required.as_str()) {
                return false;
            }
        }
        if let Some(related) = self.related_to_id {
            if !entry.metadata.related_ids().contains(&related) {
                return false;
            }
        }
        if !self.required_entities.is_empty() {
            let entities = entry.metadata.extracted_entities();
            if !self
                .required_entities
                .iter()
                .all(|required| entities.contains(required))
            {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<MemoryId, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries are append-only; an entry is never mutated after insert.
    pub fn add(&self, entry: MemoryEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn get(&self, id: MemoryId) -> Option<MemoryEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<MemoryEntry> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Newest-first view, used for "recent context" prompts.
    pub fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        let mut entries = self.all();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        entries
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filter, rank by cosine similarity descending, return the top
    /// `limit`. A zero-magnitude query scores 0 against everything and
    /// therefore returns nothing.
    pub fn find_similar(
        &self,
        query: &[f32],
        limit: usize,
        filter: Option<&MemoryFilter>,
    ) -> Vec<MemoryEntry> {
        let mut scored: Vec<(f64, MemoryEntry)> = self
            .entries
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches(entry)))
            .filter_map(|entry| {
                let score = cosine_similarity(query, &entry.embedding);
                (score > 0.0).then(|| (score, entry.value().clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;

    fn entry(content: &str, embedding: Vec<f32>, entry_type: &str) -> MemoryEntry {
        let mut metadata = Metadata::new();
        metadata.set_entry_type(entry_type);
        MemoryEntry::new(content, embedding, metadata)
    }

    #[test]
    fn test_ranking_by_similarity() {
        let store = MemoryStore::new();
        store.add(entry("close", vec![1.0, 0.1], "fact"));
        store.add(entry("far", vec![0.1, 1.0], "fact"));
        store.add(entry("exact", vec![1.0, 0.0], "fact"));

        let results = store.find_similar(&[1.0, 0.0], 2, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "exact");
        assert_eq!(results[1].content, "close");
    }

    #[test]
    fn test_zero_magnitude_query_returns_empty() {
        let store = MemoryStore::new();
        store.add(entry("anything", vec![1.0, 0.0], "fact"));
        assert!(store.find_similar(&[0.0, 0.0], 5, None).is_empty());
    }

    #[test]
    fn test_type_filter() {
        let store = MemoryStore::new();
        store.add(entry("trace", vec![1.0, 0.0], "execution_trace"));
        store.add(entry("fact", vec![1.0, 0.0], "fact"));

        let filter = MemoryFilter {
            required_type: Some("fact".to_string()),
            ..Default::default()
        };
        let results = store.find_similar(&[1.0, 0.0], 5, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "fact");
    }

    #[test]
    fn test_related_id_filter() {
        let store = MemoryStore::new();
        let related = ThoughtId::new();
        let mut metadata = Metadata::new();
        metadata.set_related_ids(&[related]);
        store.add(MemoryEntry::new("linked", vec![1.0], metadata));
        store.add(entry("unlinked", vec![1.0], "fact"));

        let filter = MemoryFilter {
            related_to_id: Some(related),
            ..Default::default()
        };
        let results = store.find_similar(&[1.0], 5, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "linked");
    }

    #[test]
    fn test_entity_filter_requires_all() {
        let store = MemoryStore::new();
        let mut metadata = Metadata::new();
        metadata.set_extracted_entities(&["paris".to_string(), "trip".to_string()]);
        store.add(MemoryEntry::new("both", vec![1.0], metadata));

        let mut partial = Metadata::new();
        partial.set_extracted_entities(&["paris".to_string()]);
        store.add(MemoryEntry::new("one", vec![1.0], partial));

        let filter = MemoryFilter {
            required_entities: vec!["paris".to_string(), "trip".to_string()],
            ..Default::default()
        };
        let results = store.find_similar(&[1.0], 5, Some(&filter));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "both");
    }

    #[test]
    fn test_recent_orders_newest_first() {
        let store = MemoryStore::new();
        let older = entry("older", vec![1.0], "fact");
        store.add(older);
        let mut newer = entry("newer", vec![1.0], "fact");
        newer.created_at = newer.created_at + chrono::Duration::seconds(10);
        store.add(newer);

        let recent = store.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "newer");
    }
}

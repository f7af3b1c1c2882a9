//! Durable snapshots of the full engine state
//!
//! A snapshot carries every thought, every rule (with its cached
//! embedding when one exists), every memory entry, and the effective
//! configuration, tagged with a format version. Restore clears the
//! stores and repopulates them; rules that come back without an
//! embedding are regenerated afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::FlowMindConfig;
use crate::store::{MemoryStore, RuleStore, ThoughtStore};
use crate::types::{MemoryEntry, PersistenceError, Rule, Thought};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A rule together with its cached embedding, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRule {
    pub rule: Rule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Value-level image of the engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub config: FlowMindConfig,
    pub thoughts: Vec<Thought>,
    pub rules: Vec<PersistedRule>,
    pub memories: Vec<MemoryEntry>,
}

impl Snapshot {
    pub fn capture(
        config: &FlowMindConfig,
        thoughts: &ThoughtStore,
        rules: &RuleStore,
        memory: &MemoryStore,
    ) -> Self {
        let persisted_rules = rules
            .all()
            .into_iter()
            .map(|rule| {
                let embedding = rules.embedding_of(rule.id);
                PersistedRule { rule, embedding }
            })
            .collect();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            config: config.clone(),
            thoughts: thoughts.all(),
            rules: persisted_rules,
            memories: memory.all(),
        }
    }

    /// Clear the stores and repopulate them from this snapshot. The
    /// caller sees either the old state (on a version error) or the
    /// whole new state.
    pub fn apply(
        &self,
        thoughts: &ThoughtStore,
        rules: &RuleStore,
        memory: &MemoryStore,
    ) -> Result<(), PersistenceError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }

        thoughts.clear();
        rules.clear();
        memory.clear();

        for thought in &self.thoughts {
            thoughts.add(thought.clone());
        }
        for persisted in &self.rules {
            rules.insert(persisted.rule.clone());
            if let Some(embedding) = &persisted.embedding {
                rules.set_embedding(persisted.rule.id, embedding.clone());
            }
        }
        for entry in &self.memories {
            memory.add(entry.clone());
        }
        tracing::info!(
            thoughts = self.thoughts.len(),
            rules = self.rules.len(),
            memories = self.memories.len(),
            "snapshot restored"
        );
        Ok(())
    }
}

/// Storage backend for snapshots. Absence of a prior snapshot is not an
/// error.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError>;

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError>;
}

/// JSON file storage. Writes go through a sibling temp file and a
/// rename, so a crash mid-save leaves the previous snapshot intact.
pub struct FileSnapshotStorage {
    path: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl SnapshotStorage for FileSnapshotStorage {
    async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let payload = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &payload)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), bytes = payload.len(), "snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let payload = match tokio::fs::read(&self.path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::Io(e.to_string())),
        };
        let snapshot = serde_json::from_slice(&payload)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmClient, OutputFormat};
    use crate::term::Term;
    use crate::types::{LlmError, Metadata, ThoughtKind};
    use std::sync::Arc;

    struct FixedEmbedder;

    #[async_trait]
    impl LlmClient for FixedEmbedder {
        async fn generate(&self, _prompt: &str, _format: OutputFormat) -> Result<String, LlmError> {
            Err(LlmError::Transport("not wired".to_string()))
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(vec![1.0, 2.0])
        }
    }

    fn populated_stores() -> (ThoughtStore, Arc<RuleStore>, MemoryStore) {
        let thoughts = ThoughtStore::new();
        let rules = Arc::new(RuleStore::new(Arc::new(FixedEmbedder)));
        let memory = MemoryStore::new();

        for i in 0..3 {
            thoughts.add(Thought::new(
                ThoughtKind::Input,
                Term::atom(format!("t{}", i)),
                Metadata::new(),
            ));
        }
        let with_embedding = Rule::new(Term::var("A"), Term::atom("act"));
        rules.insert(with_embedding.clone());
        rules.set_embedding(with_embedding.id, vec![0.5, 0.5]);
        rules.insert(Rule::new(Term::var("B"), Term::atom("other")));
        memory.add(MemoryEntry::new("note", vec![1.0], Metadata::new()));

        (thoughts, rules, memory)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_state() {
        let (thoughts, rules, memory) = populated_stores();
        let config = FlowMindConfig::default();
        let snapshot = Snapshot::capture(&config, &thoughts, &rules, &memory);

        let restored_thoughts = ThoughtStore::new();
        let restored_rules = Arc::new(RuleStore::new(Arc::new(FixedEmbedder)));
        let restored_memory = MemoryStore::new();
        snapshot
            .apply(&restored_thoughts, &restored_rules, &restored_memory)
            .unwrap();

        let mut original: Vec<_> = thoughts.all().into_iter().map(|t| t.id).collect();
        let mut recovered: Vec<_> = restored_thoughts.all().into_iter().map(|t| t.id).collect();
        original.sort_by_key(|id| id.0);
        recovered.sort_by_key(|id| id.0);
        assert_eq!(original, recovered);

        assert_eq!(restored_rules.len(), 2);
        assert_eq!(restored_memory.len(), 1);

        // Cached embeddings survive; absent ones are regenerable.
        let with_embedding = rules
            .all()
            .into_iter()
            .find(|r| rules.embedding_of(r.id).is_some())
            .unwrap();
        assert_eq!(
            restored_rules.embedding_of(with_embedding.id),
            Some(vec![0.5, 0.5])
        );
        restored_rules.ensure_embeddings().await;
        assert!(restored_rules
            .all()
            .iter()
            .all(|r| restored_rules.embedding_of(r.id).is_some()));
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSnapshotStorage::new(dir.path().join("state.json"));

        let (thoughts, rules, memory) = populated_stores();
        let config = FlowMindConfig::default();
        let snapshot = Snapshot::capture(&config, &thoughts, &rules, &memory);
        storage.save(&snapshot).await.unwrap();

        let loaded = storage.load().await.unwrap().expect("snapshot exists");
        assert_eq!(loaded.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(loaded.thoughts.len(), 3);
        assert_eq!(loaded.rules.len(), 2);
        assert_eq!(loaded.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSnapshotStorage::new(dir.path().join("absent.json"));
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_version_is_rejected() {
        let (thoughts, rules, memory) = populated_stores();
        let config = FlowMindConfig::default();
        let mut snapshot = Snapshot::capture(&config, &thoughts, &rules, &memory);
        snapshot.format_version = 99;

        let error = snapshot.apply(&thoughts, &rules, &memory).unwrap_err();
        assert!(matches!(
            error,
            PersistenceError::UnsupportedVersion { found: 99, .. }
        ));
    }
}

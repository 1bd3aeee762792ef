//! In-memory knowledge corpus, optionally persisted as a JSON file.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{KnowledgeRecord, KnowledgeSource, RetrievalError};

fn default_version() -> String {
    "1.0".to_string()
}

/// Ordered collection of knowledge records.
///
/// Iteration order is insertion order, which is also the tie-break order
/// used by the retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub records: Vec<KnowledgeRecord>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            version: default_version(),
        }
    }

    pub fn from_records(records: Vec<KnowledgeRecord>) -> Self {
        Self {
            records,
            version: default_version(),
        }
    }

    /// Load a knowledge base from a JSON file. A missing file is an empty base.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("Knowledge base {} not found, starting empty", path.display());
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        let base: Self = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded {} knowledge records from {}",
            base.records.len(),
            path.display()
        );
        Ok(base)
    }

    /// Save the knowledge base to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RetrievalError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&KnowledgeRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Add a record, replacing any record with the same id in place.
    pub fn add(&mut self, record: KnowledgeRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Replace an existing record. Returns false if the id is unknown.
    pub fn update(&mut self, record: KnowledgeRecord) -> bool {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    /// Remove a record by id.
    pub fn remove(&mut self, id: &str) -> Option<KnowledgeRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl KnowledgeSource for KnowledgeBase {
    async fn candidates(&self, _query: &str) -> Result<Vec<KnowledgeRecord>, RetrievalError> {
        Ok(self.records.clone())
    }
}

//! Knowledge base of reusable instruction templates.
//!
//! A [`KnowledgeRetriever`] scores every candidate record against a query
//! with a keyword heuristic and returns the best match above
//! [`MATCH_THRESHOLD`]. Candidates come from a [`KnowledgeSource`], which
//! may be an in-memory [`KnowledgeBase`] or a remote search backend.

mod store;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::KnowledgeBase;

/// A best match must score strictly above this.
pub const MATCH_THRESHOLD: u32 = 20;

const FULL_NAME_SCORE: u32 = 100;
const NAME_WORD_SCORE: u32 = 10;
const TAG_SCORE: u32 = 15;
const TAG_WORD_SCORE: u32 = 5;
const DESCRIPTION_WORD_SCORE: u32 = 3;

/// Knowledge lookup errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Knowledge source failed: {0}")]
    Source(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A named, tagged instruction template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeRecord {
    /// Create a record with a generated id.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            instructions: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Use a fixed id instead of a generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_instructions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instructions = instructions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Supplies candidate records for a query.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn candidates(&self, query: &str) -> Result<Vec<KnowledgeRecord>, RetrievalError>;
}

/// Relevance of `record` for `query`. Pure function of its inputs.
pub fn relevance_score(record: &KnowledgeRecord, query: &str) -> u32 {
    let query = query.to_lowercase();
    let words: Vec<&str> = query
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();
    let name = record.name.to_lowercase();
    let description = record.description.to_lowercase();

    let mut score = 0;

    if name.contains(query.as_str()) {
        score += FULL_NAME_SCORE;
    }
    score += NAME_WORD_SCORE * words.iter().filter(|w| name.contains(*w)).count() as u32;

    for tag in &record.tags {
        let tag = tag.to_lowercase();
        if query.contains(tag.as_str()) {
            score += TAG_SCORE;
        }
        score += TAG_WORD_SCORE
            * words
                .iter()
                .filter(|w| w.contains(tag.as_str()) || tag.contains(*w))
                .count() as u32;
    }

    score += DESCRIPTION_WORD_SCORE
        * words.iter().filter(|w| description.contains(*w)).count() as u32;

    score
}

/// Finds the best-matching instruction template for a query.
#[derive(Clone)]
pub struct KnowledgeRetriever {
    source: Arc<dyn KnowledgeSource>,
}

impl KnowledgeRetriever {
    pub fn new(source: Arc<dyn KnowledgeSource>) -> Self {
        Self { source }
    }

    /// Best record scoring above [`MATCH_THRESHOLD`], first in corpus order on ties.
    pub async fn find(&self, query: &str) -> Result<Option<KnowledgeRecord>, RetrievalError> {
        let candidates = self.source.candidates(query).await?;

        let mut scored: Vec<(u32, KnowledgeRecord)> = candidates
            .into_iter()
            .map(|record| (relevance_score(&record, query), record))
            .collect();
        // Stable: equal scores keep corpus order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        match scored.into_iter().next() {
            Some((score, record)) if score > MATCH_THRESHOLD => {
                tracing::debug!("Knowledge match '{}' with score {}", record.name, score);
                Ok(Some(record))
            }
            Some((score, record)) => {
                tracing::debug!(
                    "Best knowledge candidate '{}' scored {} (threshold {})",
                    record.name,
                    score,
                    MATCH_THRESHOLD
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl KnowledgeSource for FailingSource {
        async fn candidates(&self, _query: &str) -> Result<Vec<KnowledgeRecord>, RetrievalError> {
            Err(RetrievalError::Source("index unavailable".to_string()))
        }
    }

    fn raydium() -> KnowledgeRecord {
        KnowledgeRecord::new("raydium-swap", "Swap tokens on the Raydium DEX")
            .with_id("kb-1")
            .with_instructions(["Open https://raydium.io/swap", "Click Connect Wallet"])
            .with_tags(["raydium", "swap", "solana"])
    }

    fn retriever(records: Vec<KnowledgeRecord>) -> KnowledgeRetriever {
        KnowledgeRetriever::new(Arc::new(KnowledgeBase::from_records(records)))
    }

    #[test]
    fn test_score_components() {
        // 100 full name + 10 name word + (15 + 5) raydium tag + (15 + 5) swap tag
        assert_eq!(relevance_score(&raydium(), "raydium-swap"), 150);
        // 10 + 10 name words, 15 + 5 and 15 + 5 tags, 3 + 3 description words
        assert_eq!(relevance_score(&raydium(), "Raydium Swap"), 66);
    }

    #[test]
    fn test_short_words_ignored() {
        let record = KnowledgeRecord::new("go to", "").with_id("x");
        // "go" and "to" are too short; only the full-name substring counts.
        assert_eq!(relevance_score(&record, "go"), 100);
        assert_eq!(relevance_score(&record, "go up"), 0);
    }

    #[test]
    fn test_word_length_counts_characters() {
        let record = KnowledgeRecord::new("打开 设置", "").with_id("zh-1");
        // "打开" is two characters and does not count as a word.
        assert_eq!(relevance_score(&record, "打开 设置页面"), 0);

        let record = KnowledgeRecord::new("打开 设置页面", "").with_id("zh-2");
        assert_eq!(relevance_score(&record, "打开 设置页面"), 110);
    }

    #[tokio::test]
    async fn test_find_returns_best_above_threshold() {
        let other = KnowledgeRecord::new("send email", "Compose a new mail")
            .with_id("kb-2")
            .with_tags(["email"]);
        let found = retriever(vec![other, raydium()])
            .find("raydium-swap")
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some("kb-1".to_string()));
    }

    #[tokio::test]
    async fn test_find_none_at_threshold() {
        // Exactly 20: two name words.
        let record = KnowledgeRecord::new("open browser", "").with_id("kb-3");
        assert_eq!(relevance_score(&record, "browser open"), 20);
        let found = retriever(vec![record]).find("browser open").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_ties_prefer_corpus_order() {
        let first = KnowledgeRecord::new("open browser", "").with_id("first");
        let second = KnowledgeRecord::new("open browser", "").with_id("second");
        let found = retriever(vec![first, second])
            .find("open browser")
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some("first".to_string()));
    }

    #[tokio::test]
    async fn test_find_on_empty_corpus() {
        assert!(retriever(Vec::new()).find("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let retriever = KnowledgeRetriever::new(Arc::new(FailingSource));
        assert!(matches!(
            retriever.find("raydium").await,
            Err(RetrievalError::Source(_))
        ));
    }
}

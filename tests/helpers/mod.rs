#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sparkmind::config::SparkConfig;
use sparkmind::db::{self, SharedConnection};
use sparkmind::embedding::EmbeddingProvider;
use sparkmind::error::{Dependency, MemoryError, MemoryResult};
use sparkmind::llm::{CompletionRequest, CompletionService, CompletionTask};
use sparkmind::memory::types::{ContentBody, ContentItem, OwnerId};
use sparkmind::services::Services;

pub const TEST_DIM: usize = 64;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> SharedConnection {
    db::shared(db::open_memory_database().unwrap())
}

/// Config tuned for tests: tiny embeddings and millisecond backoff.
pub fn test_config() -> SparkConfig {
    let mut config = SparkConfig::default();
    config.embedding.dimensions = TEST_DIM;
    config.retry.max_attempts = 2;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config.retry.call_timeout_ms = 2_000;
    config
}

pub fn services(embedder: Arc<dyn EmbeddingProvider>, llm: Arc<dyn CompletionService>) -> Services {
    Services::assemble(test_config(), test_db(), embedder, llm)
}

pub fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

pub fn insight(id: i64, owner_id: &str, summary: &str) -> ContentItem {
    item(
        id,
        owner_id,
        ContentBody::Insight {
            summary: summary.into(),
            anchor: String::new(),
            pulse: String::new(),
        },
    )
}

pub fn collection(
    id: i64,
    owner_id: &str,
    heading: &str,
    objectives: &str,
    timeframe: &str,
) -> ContentItem {
    item(
        id,
        owner_id,
        ContentBody::Collection {
            heading: heading.into(),
            objectives: objectives.into(),
            timeframe: timeframe.into(),
        },
    )
}

pub fn item(id: i64, owner_id: &str, body: ContentBody) -> ContentItem {
    let now = Utc::now();
    ContentItem {
        id,
        owner_id: owner(owner_id),
        body,
        created_at: now,
        updated_at: now,
    }
}

pub fn touched(mut item: ContentItem, at: DateTime<Utc>) -> ContentItem {
    item.updated_at = at;
    item
}

/// Deterministic bag-of-words embedder.
///
/// Each lowercase word is hashed into one of `TEST_DIM - 1` buckets; the last
/// dimension is a constant bias so unrelated texts still score slightly above zero.
/// Identical texts embed identically.
pub struct BagOfWordsEmbedder {
    pub calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIM];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash % (TEST_DIM as u64 - 1)) as usize] += 1.0;
    }
    v[TEST_DIM - 1] = 0.5;
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }

    fn model(&self) -> &str {
        "bag-of-words-test"
    }
}

/// Embedder that is always down.
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> MemoryResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MemoryError::Unavailable(Dependency::Embedding, "connection refused".into()))
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }

    fn model(&self) -> &str {
        "failing-test"
    }
}

/// Completion service that answers each task with a fixed script.
///
/// Tasks without a script fail as unavailable. Calls are counted per task.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<HashMap<CompletionTask, String>>,
    calls: Mutex<HashMap<CompletionTask, usize>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, task: CompletionTask, response: &str) -> Self {
        self.set(task, response);
        self
    }

    pub fn set(&self, task: CompletionTask, response: &str) {
        self.responses.lock().unwrap().insert(task, response.to_string());
    }

    pub fn calls(&self, task: CompletionTask) -> usize {
        self.calls.lock().unwrap().get(&task).copied().unwrap_or(0)
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> MemoryResult<String> {
        *self.calls.lock().unwrap().entry(request.task).or_default() += 1;
        // Give concurrent callers a chance to overlap.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.responses
            .lock()
            .unwrap()
            .get(&request.task)
            .cloned()
            .ok_or_else(|| MemoryError::Unavailable(Dependency::Completion, "no script".into()))
    }
}

/// Completion service that is always down.
pub fn failing_completion() -> Arc<ScriptedCompletion> {
    ScriptedCompletion::new().arc()
}

pub fn reply_json(reply: &str, readiness: f64) -> String {
    serde_json::json!({ "reply": reply, "readinessScore": readiness }).to_string()
}

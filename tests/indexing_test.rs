mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use helpers::{
    failing_completion, insight, owner, services, test_config, touched, BagOfWordsEmbedder,
    FailingEmbedder,
};
use sparkmind::config::SparkConfig;
use sparkmind::db;
use sparkmind::embedding::EmbeddingClient;
use sparkmind::error::{Dependency, MemoryError, MemoryResult};
use sparkmind::memory::content::SqliteContentSource;
use sparkmind::memory::index::{IndexOutcome, Indexer};
use sparkmind::memory::search::{RetrieveOptions, Retriever};
use sparkmind::memory::types::{vector_id_for, ContentType};
use sparkmind::retry::RetryPolicy;
use sparkmind::services::Services;
use sparkmind::vector::sqlite::SqliteVectorStore;
use sparkmind::vector::{Match, Namespace, VectorFilter, VectorMetadata, VectorStore};

/// SQLite store whose deletes can be switched to fail as unavailable.
struct FlakyDeletes {
    inner: SqliteVectorStore,
    failing: AtomicBool,
}

#[async_trait]
impl VectorStore for FlakyDeletes {
    async fn upsert(
        &self,
        ns: &Namespace,
        id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> MemoryResult<()> {
        self.inner.upsert(ns, id, vector, metadata).await
    }

    async fn query(
        &self,
        ns: &Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> MemoryResult<Vec<Match>> {
        self.inner.query(ns, vector, top_k, filter).await
    }

    async fn delete(&self, ns: &Namespace, id: &str) -> MemoryResult<bool> {
        if self.failing.load(Ordering::SeqCst) {
            let reason = "connection reset".to_string();
            return Err(MemoryError::Unavailable(Dependency::VectorStore, reason));
        }
        self.inner.delete(ns, id).await
    }

    async fn count(&self, ns: &Namespace, filter: &VectorFilter) -> MemoryResult<usize> {
        self.inner.count(ns, filter).await
    }
}

async fn vector_count(s: &Services, owner_id: &str) -> usize {
    s.store
        .count(&Namespace::for_owner(&owner(owner_id)), &VectorFilter::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn indexing_twice_keeps_one_vector() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let item = insight(7, "alice", "Writing before breakfast works best for me");

    let first = s.indexer.index(&item).await.unwrap();
    assert_eq!(
        first,
        IndexOutcome::Indexed {
            vector_id: vector_id_for(ContentType::Insight, 7)
        }
    );
    let second = s.indexer.index(&item).await.unwrap();
    assert!(matches!(second, IndexOutcome::UpToDate { .. }));

    assert_eq!(vector_count(&s, "alice").await, 1);
}

#[tokio::test]
async fn concurrent_indexing_of_one_item_keeps_one_vector() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let item = insight(9, "alice", "Saying no protects my deep work time");

    let (a, b, c) = tokio::join!(
        s.indexer.index(&item),
        s.indexer.index(&item),
        s.indexer.index(&item),
    );
    for outcome in [a, b, c] {
        assert!(matches!(
            outcome.unwrap(),
            IndexOutcome::Indexed { .. } | IndexOutcome::UpToDate { .. }
        ));
    }
    assert_eq!(vector_count(&s, "alice").await, 1);
}

#[tokio::test]
async fn edits_replace_the_vector_in_place() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let original = insight(3, "alice", "Cold showers feel awful");
    s.indexer.index(&original).await.unwrap();

    let edited = touched(
        insight(3, "alice", "Cold showers make me feel awake and focused"),
        Utc::now() + Duration::seconds(2),
    );
    assert!(matches!(s.indexer.index(&edited).await.unwrap(), IndexOutcome::Indexed { .. }));
    assert_eq!(vector_count(&s, "alice").await, 1);

    let results = s
        .retriever
        .retrieve(&owner("alice"), &edited.text(), &RetrieveOptions::new(1, 0.99))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].preview.contains("awake and focused"));
}

#[tokio::test]
async fn deleting_removes_the_vector_and_tolerates_missing() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let item = insight(4, "alice", "Journaling at night helps me sleep");
    s.indexer.index(&item).await.unwrap();

    assert!(s.indexer.delete(ContentType::Insight, 4).await.unwrap());
    assert_eq!(vector_count(&s, "alice").await, 0);
    assert!(!s.indexer.delete(ContentType::Insight, 4).await.unwrap());
    assert!(!s.indexer.delete(ContentType::Principle, 12345).await.unwrap());

    let results = s
        .retriever
        .retrieve(&owner("alice"), &item.text(), &RetrieveOptions::new(5, 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn spawned_indexing_completes_in_the_background() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let handle = s.indexer.spawn_index(insight(5, "alice", "Deadlines make me sharper"));
    handle.await.unwrap();
    assert_eq!(vector_count(&s, "alice").await, 1);
}

#[tokio::test]
async fn backfill_indexes_what_an_outage_deferred() {
    let db = helpers::test_db();
    let item = insight(1, "alice", "Cooking for friends recharges me");

    // Saved while the embedding service is down.
    let down = Services::assemble(
        test_config(),
        Arc::clone(&db),
        FailingEmbedder::new(),
        failing_completion(),
    );
    down.content.save_item(&item).await.unwrap();
    assert!(matches!(down.indexer.index(&item).await.unwrap(), IndexOutcome::Deferred { .. }));
    assert_eq!(vector_count(&down, "alice").await, 0);

    let up = Services::assemble(test_config(), db, BagOfWordsEmbedder::new(), failing_completion());
    let report = up.indexer.backfill(100).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.indexed, 1);
    assert_eq!(vector_count(&up, "alice").await, 1);

    let again = up.indexer.backfill(100).await.unwrap();
    assert_eq!(again.scanned, 0);
}

#[tokio::test]
async fn on_disk_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("memory.db");
    let mut config: SparkConfig = test_config();
    config.storage.db_path = path.to_string_lossy().into_owned();

    let item = insight(2, "alice", "Walking meetings beat sitting ones");
    {
        let conn = db::open_database(config.resolved_db_path()).unwrap();
        let s = Services::assemble(
            config.clone(),
            db::shared(conn),
            BagOfWordsEmbedder::new(),
            failing_completion(),
        );
        s.content.save_item(&item).await.unwrap();
        s.indexer.index(&item).await.unwrap();
    }

    let conn = db::open_database(config.resolved_db_path()).unwrap();
    let s = Services::assemble(
        config,
        db::shared(conn),
        BagOfWordsEmbedder::new(),
        failing_completion(),
    );
    let results = s
        .retriever
        .retrieve(&owner("alice"), &item.text(), &RetrieveOptions::new(1, 0.99))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content_id, 2);
    assert!(matches!(s.indexer.index(&item).await.unwrap(), IndexOutcome::UpToDate { .. }));
}

#[tokio::test]
async fn backfill_finishes_deletes_the_store_deferred() {
    let config = test_config();
    let db = helpers::test_db();
    let store = Arc::new(FlakyDeletes {
        inner: SqliteVectorStore::new(Arc::clone(&db), RetryPolicy::from(&config.retry)),
        failing: AtomicBool::new(true),
    });
    let embedder =
        EmbeddingClient::from_config(BagOfWordsEmbedder::new(), &config.embedding, &config.retry);
    let indexer = Indexer::new(embedder.clone(), store.clone(), Arc::clone(&db));
    let retriever = Retriever::new(embedder, store.clone(), config.retrieval.clone());
    let content = SqliteContentSource::new(Arc::clone(&db));

    let alice = owner("alice");
    let item = insight(1, "alice", "Sunday baking is my reset button");
    content.save_item(&item).await.unwrap();
    indexer.index(&item).await.unwrap();

    assert!(content.tombstone(ContentType::Insight, 1).await.unwrap());
    assert!(!indexer.delete(ContentType::Insight, 1).await.unwrap());

    // Still failing: the sweep leaves the vector for next time.
    let report = indexer.backfill(100).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.purged, 0);
    let ns = Namespace::for_owner(&alice);
    assert_eq!(store.count(&ns, &VectorFilter::default()).await.unwrap(), 1);

    store.failing.store(false, Ordering::SeqCst);
    let report = indexer.backfill(100).await.unwrap();
    assert_eq!(report.purged, 1);
    assert_eq!(store.count(&ns, &VectorFilter::default()).await.unwrap(), 0);

    let results = retriever
        .retrieve(&alice, &item.text(), &RetrieveOptions::new(5, 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(indexer.backfill(100).await.unwrap().purged, 0);
}

#[tokio::test]
async fn backfill_keeps_vectors_of_live_content() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let item = insight(2, "alice", "Reading fiction before bed calms me");
    s.content.save_item(&item).await.unwrap();
    s.indexer.index(&item).await.unwrap();

    let report = s.indexer.backfill(100).await.unwrap();
    assert_eq!(report.purged, 0);
    assert_eq!(vector_count(&s, "alice").await, 1);
}

mod helpers;

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use helpers::{
    collection, failing_completion, insight, owner, services, BagOfWordsEmbedder, FailingEmbedder,
};
use sparkmind::memory::index::IndexOutcome;
use sparkmind::memory::search::RetrieveOptions;
use sparkmind::memory::types::ContentType;

#[tokio::test]
async fn indexed_text_is_retrieved_by_the_same_text() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let items = [
        insight(1, "alice", "Morning runs clear my head before work"),
        insight(2, "alice", "I procrastinate when a task feels vague"),
        collection(
            1,
            "alice",
            "Launch the newsletter",
            "Write five issues and find 100 readers",
            "by June",
        ),
    ];
    for item in &items {
        assert!(matches!(s.indexer.index(item).await.unwrap(), IndexOutcome::Indexed { .. }));
    }

    for item in &items {
        let results = s
            .retriever
            .retrieve(&owner("alice"), &item.text(), &RetrieveOptions::new(3, 1.0))
            .await
            .unwrap();
        assert!(
            results
                .iter()
                .any(|r| r.content_type == item.content_type() && r.content_id == item.id),
            "item {} {} not found",
            item.content_type(),
            item.id
        );
    }
}

#[tokio::test]
async fn results_never_cross_owners() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let alice = [
        insight(1, "alice", "Gardening on Sunday makes me calm"),
        insight(2, "alice", "Tomatoes need more sun than I thought"),
    ];
    let bob = [
        insight(3, "bob", "Chess openings are mostly memorization"),
        collection(1, "bob", "Reach 1800 rating", "Play daily and review losses", "this year"),
    ];
    for item in alice.iter().chain(bob.iter()) {
        s.indexer.index(item).await.unwrap();
    }

    let queries = [
        "Gardening on Sunday makes me calm",
        "Tomatoes need more sun than I thought",
        "chess",
        "anything at all",
    ];
    for query in queries {
        let results = s
            .retriever
            .retrieve(&owner("bob"), query, &RetrieveOptions::new(10, 0.0))
            .await
            .unwrap();
        for r in &results {
            let alices = r.content_type == ContentType::Insight && matches!(r.content_id, 1 | 2);
            assert!(!alices, "bob saw alice's content for {query:?}");
        }
    }

    // Alice's exact text still finds her own item.
    let query = "Gardening on Sunday makes me calm";
    let mine = s
        .retriever
        .retrieve(&owner("alice"), query, &RetrieveOptions::new(1, 0.9))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].content_id, 1);
}

#[tokio::test]
async fn results_have_unique_content_and_descending_scores() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    for id in 1..=6 {
        s.indexer
            .index(&insight(id, "alice", &format!("Thought number {id} about running and sleep")))
            .await
            .unwrap();
    }
    // Re-index an edited item: same id, new text.
    let edited = helpers::touched(
        insight(3, "alice", "Thought three rewritten about running"),
        chrono::Utc::now() + chrono::Duration::seconds(1),
    );
    s.indexer.index(&edited).await.unwrap();

    let results = s
        .retriever
        .retrieve(&owner("alice"), "running and sleep", &RetrieveOptions::new(10, 0.0))
        .await
        .unwrap();

    let keys: HashSet<_> = results.iter().map(|r| (r.content_type, r.content_id)).collect();
    assert_eq!(keys.len(), results.len());
    assert_eq!(results.len(), 6);
    for pair in results.windows(2) {
        assert!(pair[0].score + 0.02 >= pair[1].score);
    }
}

#[tokio::test]
async fn min_score_and_type_filters_apply() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    s.indexer.index(&insight(1, "alice", "Ship the beta in spring")).await.unwrap();
    s.indexer
        .index(&collection(1, "alice", "Ship the beta", "Fix onboarding bugs", "spring"))
        .await
        .unwrap();

    let only_collections = s
        .retriever
        .retrieve(
            &owner("alice"),
            "Ship the beta in spring",
            &RetrieveOptions::new(5, 0.0).with_types(&[ContentType::Collection]),
        )
        .await
        .unwrap();
    assert_eq!(only_collections.len(), 1);
    assert_eq!(only_collections[0].content_type, ContentType::Collection);

    let strict = s
        .retriever
        .retrieve(&owner("alice"), "completely unrelated words", &RetrieveOptions::new(5, 0.95))
        .await
        .unwrap();
    assert!(strict.is_empty());
}

#[tokio::test]
async fn related_excludes_the_item_itself() {
    let s = services(BagOfWordsEmbedder::new(), failing_completion());
    let base = insight(1, "alice", "Long walks help me think through hard problems");
    let near = insight(2, "alice", "Long walks help me think through problems at work");
    s.indexer.index(&base).await.unwrap();
    s.indexer.index(&near).await.unwrap();
    s.indexer.index(&insight(3, "alice", "Buy milk")).await.unwrap();

    let related = s.retriever.related(&owner("alice"), &base, 5).await.unwrap();
    assert!(related.iter().all(|r| r.content_id != 1));
    assert_eq!(related.first().map(|r| r.content_id), Some(2));
}

#[tokio::test]
async fn embedding_outage_degrades_to_empty_results() {
    let embedder = FailingEmbedder::new();
    let s = services(embedder.clone(), failing_completion());

    let outcome = s.indexer.index(&insight(1, "alice", "This will not be embedded")).await.unwrap();
    assert!(matches!(outcome, IndexOutcome::Deferred { .. }));

    let results = s
        .retriever
        .retrieve(&owner("alice"), "anything", &RetrieveOptions::new(5, 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
    // Two attempts each for index and retrieve under the test retry budget.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn blank_query_returns_nothing() {
    let embedder = BagOfWordsEmbedder::new();
    let s = services(embedder.clone(), failing_completion());
    let results = s
        .retriever
        .retrieve(&owner("alice"), "   ", &RetrieveOptions::new(5, 0.0))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

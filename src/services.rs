//! Process-wide component graph.
//!
//! Clients for the rented capabilities are constructed once here and passed by
//! `Arc` into each component. [`Services::assemble`] takes the clients directly so
//! tests can substitute doubles for the network-backed ones.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::classify::Classifier;
use crate::config::SparkConfig;
use crate::conversation::{Orchestrator, SessionStore};
use crate::db::migrations::{get_embedding_stamp, set_embedding_stamp, EmbeddingStamp};
use crate::db::{self, SharedConnection};
use crate::embedding::{self, EmbeddingClient, EmbeddingProvider};
use crate::llm::openai::OpenAiCompletionService;
use crate::llm::CompletionService;
use crate::memory::behavior::BehaviorTracker;
use crate::memory::content::SqliteContentSource;
use crate::memory::index::Indexer;
use crate::memory::profile::ProfileBuilder;
use crate::memory::search::Retriever;
use crate::retry::RetryPolicy;
use crate::vector::sqlite::SqliteVectorStore;
use crate::vector::VectorStore;

#[derive(Clone)]
pub struct Services {
    pub config: Arc<SparkConfig>,
    pub db: SharedConnection,
    pub store: Arc<dyn VectorStore>,
    pub content: Arc<SqliteContentSource>,
    pub indexer: Arc<Indexer>,
    pub retriever: Arc<Retriever>,
    pub profiles: Arc<ProfileBuilder>,
    pub classifier: Arc<Classifier>,
    pub orchestrator: Arc<Orchestrator>,
    pub behavior: Arc<BehaviorTracker>,
    pub sessions: Arc<SessionStore>,
}

impl Services {
    /// Open the configured database and build the network clients.
    pub fn from_config(config: SparkConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let provider = embedding::create_provider(&config.embedding)?;
        check_embedding_stamp(&conn, provider.as_ref())?;
        tracing::info!(model = %provider.model(), dimensions = provider.dimensions(), "embedding provider ready");

        let policy = RetryPolicy::from(&config.retry);
        let llm = OpenAiCompletionService::from_config(&config.completion, policy)
            .context("failed to configure completion service")?;
        tracing::info!(model = %config.completion.model, "completion service ready");

        Ok(Self::assemble(config, db::shared(conn), provider, Arc::new(llm)))
    }

    /// Wire every component from already-constructed clients.
    pub fn assemble(
        config: SparkConfig,
        db: SharedConnection,
        provider: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn CompletionService>,
    ) -> Self {
        let policy = RetryPolicy::from(&config.retry);
        let embedder = EmbeddingClient::from_config(provider, &config.embedding, &config.retry);
        let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(Arc::clone(&db), policy));

        let content = Arc::new(SqliteContentSource::new(Arc::clone(&db)));
        let behavior = Arc::new(BehaviorTracker::new(Arc::clone(&db)));
        let indexer = Arc::new(Indexer::new(embedder.clone(), Arc::clone(&store), Arc::clone(&db)));
        let retriever = Arc::new(Retriever::new(
            embedder,
            Arc::clone(&store),
            config.retrieval.clone(),
        ));
        let profiles = Arc::new(ProfileBuilder::new(
            content.clone(),
            Arc::clone(&llm),
            config.profile.clone(),
        ));
        let classifier = Arc::new(Classifier::new(Arc::clone(&llm), config.classification.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&retriever),
            Arc::clone(&profiles),
            Arc::clone(&classifier),
            llm,
            Arc::clone(&behavior),
            config.conversation.clone(),
        ));
        let sessions = Arc::new(SessionStore::new(Arc::clone(&db)));

        Self {
            config: Arc::new(config),
            db,
            store,
            content,
            indexer,
            retriever,
            profiles,
            classifier,
            orchestrator,
            behavior,
            sessions,
        }
    }
}

/// Warn when stored vectors came from a different model; stamp a fresh database.
fn check_embedding_stamp(
    conn: &rusqlite::Connection,
    provider: &dyn EmbeddingProvider,
) -> Result<()> {
    let configured = EmbeddingStamp {
        model: provider.model().to_string(),
        dimensions: provider.dimensions(),
    };
    match get_embedding_stamp(conn)? {
        Some(stored) if stored != configured => {
            tracing::warn!(
                stored_model = %stored.model,
                stored_dimensions = stored.dimensions,
                configured_model = %configured.model,
                configured_dimensions = configured.dimensions,
                "embedding model changed; existing vectors will not match new queries until re-indexed"
            );
        }
        Some(_) => {}
        None => set_embedding_stamp(conn, &configured)?,
    }
    Ok(())
}

pub mod advance_conversation;
pub mod classify_thought;
pub mod forget_content;
pub mod get_profile;
pub mod index_content;
pub mod retrieve_context;
pub mod track_event;

use advance_conversation::AdvanceConversationParams;
use chrono::Utc;
use classify_thought::ClassifyThoughtParams;
use forget_content::ForgetContentParams;
use get_profile::GetProfileParams;
use index_content::IndexContentParams;
use retrieve_context::RetrieveContextParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use track_event::TrackEventParams;

use sparkmind::conversation::ConversationSession;
use sparkmind::memory::content::ContentSource;
use sparkmind::memory::search::RetrieveOptions;
use sparkmind::memory::types::{
    ActionType, BehaviorEvent, ContentBody, ContentItem, ContentType, OwnerId, Turn,
};
use sparkmind::services::Services;

const MAX_TOP_K: usize = 20;

/// The MCP tool handler. Holds the shared component graph and exposes the
/// memory subsystem's consumer interface via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct SparkTools {
    tool_router: ToolRouter<Self>,
    services: Services,
}

fn owner(raw: &str) -> Result<OwnerId, String> {
    OwnerId::new(raw)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl SparkTools {
    pub fn new(services: Services) -> Self {
        Self {
            tool_router: Self::tool_router(),
            services,
        }
    }

    #[tool(description = "Find the owner's earlier content related to a piece of text. Returns ranked, deduplicated matches; an empty list means nothing relevant was found.")]
    async fn retrieve_context(
        &self,
        Parameters(params): Parameters<RetrieveContextParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let retrieval = &self.services.config.retrieval;

        let top_k = params.top_k.unwrap_or(retrieval.default_top_k).clamp(1, MAX_TOP_K);
        let min_score = params.min_score.unwrap_or(retrieval.context_min_score);
        if !(0.0..=1.0).contains(&min_score) {
            return Err("min_score must be between 0.0 and 1.0".into());
        }
        let types = params
            .types
            .unwrap_or_default()
            .iter()
            .map(|t| t.parse::<ContentType>())
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(owner = %owner, top_k, min_score, "retrieve_context called");
        let opts = RetrieveOptions::new(top_k, min_score).with_types(&types);
        let results = self
            .services
            .retriever
            .retrieve(&owner, &params.query, &opts)
            .await
            .map_err(|e| e.to_string())?;

        to_json(&serde_json::json!({ "results": results, "total": results.len() }))
    }

    #[tool(description = "Classify a thought as an insight (single observation), collection (goal with steps and a timeframe), or principle (life-level purpose). Low-confidence results are flagged needs_confirmation and carry alternatives to show the user.")]
    async fn classify_thought(
        &self,
        Parameters(params): Parameters<ClassifyThoughtParams>,
    ) -> Result<String, String> {
        let history: Vec<Turn> = params
            .history
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, text)| if i % 2 == 0 { Turn::user(text) } else { Turn::assistant(text) })
            .collect();

        tracing::info!(
            text_len = params.text.len(),
            history = history.len(),
            "classify_thought called"
        );
        let result = self
            .services
            .classifier
            .classify(&params.text, &history)
            .await
            .map_err(|e| e.to_string())?;
        to_json(&result)
    }

    #[tool(description = "Get the owner's profile: interests, cognitive style, and recent themes. Cached; recomputed when stale or when force_refresh is true.")]
    async fn get_profile(
        &self,
        Parameters(params): Parameters<GetProfileParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let force = params.force_refresh.unwrap_or(false);
        tracing::info!(owner = %owner, force, "get_profile called");
        let profile = self.services.profiles.get_profile(&owner, force).await;
        to_json(&profile)
    }

    #[tool(description = "Send one user message in a guided exploration session. Returns the assistant reply, the session state (exploring, deepening, ready, resolved), and the structured result once resolved.")]
    async fn advance_conversation(
        &self,
        Parameters(params): Parameters<AdvanceConversationParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let sessions = &self.services.sessions;

        let mut session = match params.session_id.as_deref() {
            Some(id) => sessions
                .load(&owner, id)
                .await
                .map_err(|e| e.to_string())?
                .ok_or_else(|| format!("session not found: {id}"))?,
            None => ConversationSession::new(owner.clone()),
        };

        tracing::info!(owner = %owner, session = %session.session_id, state = %session.state, "advance_conversation called");
        let outcome = self
            .services
            .orchestrator
            .advance(&mut session, &params.message)
            .await
            .map_err(|e| e.to_string())?;
        sessions.save(&session).await.map_err(|e| e.to_string())?;

        to_json(&serde_json::json!({
            "session_id": session.session_id,
            "reply": outcome.reply,
            "state": outcome.state,
            "readiness": outcome.readiness,
            "structured": outcome.structured,
            "classification": outcome.classification,
            "context": outcome.context,
        }))
    }

    #[tool(description = "Save a content item for the owner and index it for retrieval. Re-sending an existing id updates it in place.")]
    async fn index_content(
        &self,
        Parameters(params): Parameters<IndexContentParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let content_type: ContentType = params.content_type.parse()?;
        let body = ContentBody::from_fields(content_type, &params.fields)?;
        let content = &self.services.content;

        let (id, existing) = match params.content_id {
            Some(id) => (id, content.get_item(content_type, id).await.map_err(|e| e.to_string())?),
            None => (content.next_id(content_type).await.map_err(|e| e.to_string())?, None),
        };
        if let Some(existing) = &existing {
            if existing.owner_id != owner {
                return Err(format!("{content_type} {id} belongs to another owner"));
            }
        }

        let now = Utc::now();
        let item = ContentItem {
            id,
            owner_id: owner.clone(),
            body,
            created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };
        content.save_item(&item).await.map_err(|e| e.to_string())?;

        let action = if existing.is_some() {
            ActionType::ContentEdited
        } else {
            ActionType::ContentCreated
        };
        let event = BehaviorEvent::new(owner, action, "mcp").with_entity(content_type, id);
        self.services.behavior.record_best_effort(event).await;

        let outcome = self.services.indexer.index(&item).await.map_err(|e| e.to_string())?;
        tracing::info!(content_type = %content_type, content_id = id, "index_content completed");
        to_json(&serde_json::json!({
            "content_type": content_type,
            "content_id": id,
            "index": outcome,
        }))
    }

    #[tool(description = "Delete a content item: tombstone it and remove its vector. Deleting something already gone is not an error.")]
    async fn forget_content(
        &self,
        Parameters(params): Parameters<ForgetContentParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let content_type: ContentType = params.content_type.parse()?;
        let id = params.content_id;
        let content = &self.services.content;

        let existing = content.get_item(content_type, id).await.map_err(|e| e.to_string())?;
        if let Some(existing) = existing {
            if existing.owner_id != owner {
                return Err(format!("{content_type} {id} belongs to another owner"));
            }
        }

        let tombstoned = content.tombstone(content_type, id).await.map_err(|e| e.to_string())?;
        let vector_removed = self
            .services
            .indexer
            .delete(content_type, id)
            .await
            .map_err(|e| e.to_string())?;
        if tombstoned {
            self.services.profiles.invalidate(&owner).await;
            let event = BehaviorEvent::new(owner.clone(), ActionType::ContentDeleted, "mcp")
                .with_entity(content_type, id);
            self.services.behavior.record_best_effort(event).await;
        }

        tracing::info!(owner = %owner, content_type = %content_type, content_id = id, tombstoned, vector_removed, "forget_content completed");
        to_json(&serde_json::json!({ "tombstoned": tombstoned, "vector_removed": vector_removed }))
    }

    #[tool(description = "Append a user action to the behavior log used for profiling.")]
    async fn track_event(
        &self,
        Parameters(params): Parameters<TrackEventParams>,
    ) -> Result<String, String> {
        let owner = owner(&params.owner_id)?;
        let action = ActionType::from(params.action_type.as_str());
        let mut event = BehaviorEvent::new(owner, action, params.session_id);
        if let Some(payload) = params.payload {
            event = event.with_payload(payload);
        }
        match (params.entity_type, params.entity_id) {
            (Some(t), Some(id)) => event = event.with_entity(t.parse()?, id),
            (None, None) => {}
            _ => return Err("entity_type and entity_id must be given together".into()),
        }

        let id = self.services.behavior.record(&event).await.map_err(|e| e.to_string())?;
        to_json(&serde_json::json!({ "event_id": id }))
    }
}

#[tool_handler]
impl ServerHandler for SparkTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Sparkmind is a personal thought memory. Use advance_conversation to explore a thought, \
                 classify_thought to organize it, index_content to save it, and retrieve_context to recall \
                 related content."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

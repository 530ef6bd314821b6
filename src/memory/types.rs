//! Core type definitions.
//!
//! Defines [`OwnerId`] (the typed owner key), [`ContentType`] (the three escalating
//! structures), [`ContentItem`] and its semantic [`ContentBody`], [`BehaviorEvent`],
//! and conversation [`Turn`]s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the user that owns a piece of data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Build an owner id. Rejects empty or whitespace-only ids.
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("owner id must not be empty".into());
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for OwnerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The three escalating structures a thought can be organized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Atomic insight: summary, anchor, and pulse layers.
    Insight,
    /// Goal-oriented grouping of insights with a timeframe.
    Collection,
    /// Life-purpose grouping that collections may belong to.
    Principle,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [Self::Insight, Self::Collection, Self::Principle];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::Collection => "collection",
            Self::Principle => "principle",
        }
    }

    /// Field names a complete item of this type carries.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Insight => &["summary", "anchor", "pulse"],
            Self::Collection => &["heading", "objectives", "timeframe"],
            Self::Principle => &["heading", "purpose", "timeframe"],
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    /// Accepts the canonical names and the legacy product names
    /// (`dot`, `wheel`, `chakra`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insight" | "dot" => Ok(Self::Insight),
            "collection" | "wheel" => Ok(Self::Collection),
            "principle" | "chakra" => Ok(Self::Principle),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}

/// The semantic fields of a content item, by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content_type", rename_all = "snake_case")]
pub enum ContentBody {
    Insight {
        summary: String,
        anchor: String,
        pulse: String,
    },
    Collection {
        heading: String,
        objectives: String,
        timeframe: String,
    },
    Principle {
        heading: String,
        purpose: String,
        timeframe: String,
    },
}

impl ContentBody {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Insight { .. } => ContentType::Insight,
            Self::Collection { .. } => ContentType::Collection,
            Self::Principle { .. } => ContentType::Principle,
        }
    }

    /// Concatenated semantic fields, in the order they are embedded.
    pub fn embedding_text(&self) -> String {
        let parts: [&str; 3] = match self {
            Self::Insight {
                summary,
                anchor,
                pulse,
            } => [summary, anchor, pulse],
            Self::Collection {
                heading,
                objectives,
                timeframe,
            } => [heading, objectives, timeframe],
            Self::Principle {
                heading,
                purpose,
                timeframe,
            } => [heading, purpose, timeframe],
        };
        parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Short human-readable title: the heading, or the insight summary.
    pub fn title(&self) -> &str {
        match self {
            Self::Insight { summary, .. } => summary,
            Self::Collection { heading, .. } | Self::Principle { heading, .. } => heading,
        }
    }

    /// Build a body from named fields. Unknown names are ignored; missing ones are empty.
    pub fn from_fields(
        content_type: ContentType,
        fields: &BTreeMap<String, String>,
    ) -> Result<Self, String> {
        let field = |name: &str| fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default();
        let body = match content_type {
            ContentType::Insight => Self::Insight {
                summary: field("summary"),
                anchor: field("anchor"),
                pulse: field("pulse"),
            },
            ContentType::Collection => Self::Collection {
                heading: field("heading"),
                objectives: field("objectives"),
                timeframe: field("timeframe"),
            },
            ContentType::Principle => Self::Principle {
                heading: field("heading"),
                purpose: field("purpose"),
                timeframe: field("timeframe"),
            },
        };
        if body.embedding_text().is_empty() {
            return Err(format!(
                "{content_type} needs at least one of: {}",
                content_type.required_fields().join(", ")
            ));
        }
        Ok(body)
    }
}

/// A user's saved thought structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Id assigned by the relational store, unique per content type.
    pub id: i64,
    pub owner_id: OwnerId,
    pub body: ContentBody,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn content_type(&self) -> ContentType {
        self.body.content_type()
    }

    /// The item's text as embedded and searched.
    pub fn text(&self) -> String {
        self.body.embedding_text()
    }
}

/// Deterministic vector id for a content item. Re-indexing reuses it, which is
/// what keeps one live vector per `(content_type, content_id)`.
pub fn vector_id_for(content_type: ContentType, content_id: i64) -> String {
    format!("{}_{}", content_type.as_str(), content_id)
}

/// Kinds of user actions recorded by the behavior tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ContentCreated,
    ContentEdited,
    ContentDeleted,
    ChatInteraction,
    ThoughtOrganized,
    SearchQuery,
    /// Any action name not known to this build.
    #[serde(untagged)]
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ContentCreated => "content_created",
            Self::ContentEdited => "content_edited",
            Self::ContentDeleted => "content_deleted",
            Self::ChatInteraction => "chat_interaction",
            Self::ThoughtOrganized => "thought_organized",
            Self::SearchQuery => "search_query",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        match s {
            "content_created" => Self::ContentCreated,
            "content_edited" => Self::ContentEdited,
            "content_deleted" => Self::ContentDeleted,
            "chat_interaction" => Self::ChatInteraction,
            "thought_organized" => Self::ThoughtOrganized,
            "search_query" => Self::SearchQuery,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One append-only user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorEvent {
    pub owner_id: OwnerId,
    pub action_type: ActionType,
    pub entity_type: Option<ContentType>,
    pub entity_id: Option<i64>,
    pub payload: serde_json::Value,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl BehaviorEvent {
    pub fn new(owner_id: OwnerId, action_type: ActionType, session_id: impl Into<String>) -> Self {
        Self {
            owner_id,
            action_type,
            entity_type: None,
            entity_id: None,
            payload: serde_json::Value::Null,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_entity(mut self, entity_type: ContentType, entity_id: i64) -> Self {
        self.entity_type = Some(entity_type);
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

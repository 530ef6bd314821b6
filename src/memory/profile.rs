//! Rolling user profile: interests, cognitive style, and recent themes.
//!
//! Profiles are cached per owner and recomputed only when stale (too old, or
//! enough new activity since the last compute) or when forced. Each owner's cache
//! slot is behind its own async mutex held across the recompute, so concurrent
//! callers coalesce onto one set of reads and at most one LLM call. Slots are
//! cleared in place rather than removed, so an invalidation never splits
//! callers across two slots. Idle slots are evicted once the cache reaches
//! `cache_capacity` owners.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProfileConfig;
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::llm::{
    parse_json_object, ChatMessage, CompletionRequest, CompletionService, CompletionTask,
};
use crate::memory::content::ContentSource;
use crate::memory::types::{BehaviorEvent, ContentItem, ContentType, OwnerId};

const MAX_INTERESTS: usize = 8;
const MAX_INTEREST_CHARS: usize = 60;
const SUMMARY_LINE_CHARS: usize = 160;

const STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "always", "because", "been", "before", "being", "could", "does",
    "doing", "down", "during", "each", "even", "every", "feel", "felt", "from", "have", "having", "here",
    "into", "just", "like", "made", "make", "many", "more", "most", "much", "need", "only", "other",
    "over", "really", "same", "should", "some", "still", "such", "than", "that", "their", "them", "then",
    "there", "these", "they", "thing", "things", "this", "those", "through", "today", "very", "want",
    "were", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveStyle {
    Analytical,
    Creative,
    Practical,
    Intuitive,
    Mixed,
    /// Default when there is no usable signal.
    Balanced,
}

impl CognitiveStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Creative => "creative",
            Self::Practical => "practical",
            Self::Intuitive => "intuitive",
            Self::Mixed => "mixed",
            Self::Balanced => "balanced",
        }
    }

    /// Lenient parse of model output; unknown values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analytical" => Some(Self::Analytical),
            "creative" => Some(Self::Creative),
            "practical" => Some(Self::Practical),
            "intuitive" => Some(Self::Intuitive),
            "mixed" => Some(Self::Mixed),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }
}

/// Where a profile's interests and style came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    Model,
    /// The LLM was unavailable or unusable; only local signals were used.
    LocalOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub item_count: usize,
    pub event_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub owner_id: OwnerId,
    pub interests: Vec<String>,
    pub cognitive_style: CognitiveStyle,
    pub recent_themes: Vec<String>,
    pub computed_at: DateTime<Utc>,
    pub source_window: SourceWindow,
    pub source: ProfileSource,
}

impl UserProfile {
    /// One-paragraph rendering for prompts.
    pub fn prompt_summary(&self) -> String {
        let interests = if self.interests.is_empty() {
            "unknown".to_string()
        } else {
            self.interests.join(", ")
        };
        let themes = if self.recent_themes.is_empty() {
            "none yet".to_string()
        } else {
            self.recent_themes.join(", ")
        };
        format!(
            "Cognitive style: {}. Interests: {}. Recent themes: {}.",
            self.cognitive_style.as_str(),
            interests,
            themes
        )
    }
}

#[derive(Debug, Deserialize)]
struct ModelProfile {
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default, rename = "cognitiveStyle", alias = "cognitive_style")]
    cognitive_style: Option<String>,
}

type Slot = Arc<tokio::sync::Mutex<Option<UserProfile>>>;

pub struct ProfileBuilder {
    content: Arc<dyn ContentSource>,
    llm: Arc<dyn CompletionService>,
    config: ProfileConfig,
    cache: Mutex<HashMap<OwnerId, Slot>>,
}

impl ProfileBuilder {
    pub fn new(
        content: Arc<dyn ContentSource>,
        llm: Arc<dyn CompletionService>,
        config: ProfileConfig,
    ) -> Self {
        Self {
            content,
            llm,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The cached profile for `owner`, recomputed when stale or when `force_refresh`.
    ///
    /// Never fails: dependency problems produce a degraded profile.
    pub async fn get_profile(&self, owner: &OwnerId, force_refresh: bool) -> UserProfile {
        let slot = self.slot(owner);
        let mut cached = slot.lock().await;

        if !force_refresh {
            if let Some(profile) = cached.as_ref() {
                if !self.is_stale(profile).await {
                    return profile.clone();
                }
            }
        }

        let profile = self.compute(owner).await;
        *cached = Some(profile.clone());
        profile
    }

    /// Forget the cached profile for `owner`.
    ///
    /// Waits for an in-flight recompute, then clears it, so the next read sees
    /// whatever changed after that recompute started.
    pub async fn invalidate(&self, owner: &OwnerId) {
        let slot = match self.cache.lock() {
            Ok(cache) => cache.get(owner).map(Arc::clone),
            Err(_) => None,
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
    }

    fn slot(&self, owner: &OwnerId) -> Slot {
        match self.cache.lock() {
            Ok(mut cache) => {
                if !cache.contains_key(owner) && cache.len() >= self.config.cache_capacity {
                    self.evict_idle(&mut cache);
                }
                Arc::clone(cache.entry(owner.clone()).or_default())
            }
            // Poisoned cache: compute uncached.
            Err(_) => Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Drop idle slots that are empty or past the age limit. If every idle slot
    /// is still fresh, drop the oldest one.
    fn evict_idle(&self, cache: &mut HashMap<OwnerId, Slot>) {
        let max_age = chrono::Duration::minutes(self.config.staleness_minutes);
        let now = Utc::now();
        let mut oldest: Option<(OwnerId, DateTime<Utc>)> = None;

        cache.retain(|owner, slot| {
            // Someone is reading or recomputing through this slot.
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            let Ok(cached) = slot.try_lock() else {
                return true;
            };
            match cached.as_ref() {
                Some(profile) if now - profile.computed_at <= max_age => {
                    if oldest.as_ref().map_or(true, |(_, at)| profile.computed_at < *at) {
                        oldest = Some((owner.clone(), profile.computed_at));
                    }
                    true
                }
                _ => false,
            }
        });

        if cache.len() >= self.config.cache_capacity {
            if let Some((owner, _)) = oldest {
                cache.remove(&owner);
            }
        }
        debug!(cached = cache.len(), "profile cache evicted idle owners");
    }

    async fn is_stale(&self, profile: &UserProfile) -> bool {
        let age = Utc::now() - profile.computed_at;
        if age > chrono::Duration::minutes(self.config.staleness_minutes) {
            return true;
        }
        match self.content.activity_since(&profile.owner_id, profile.computed_at).await {
            Ok(new_rows) => new_rows >= self.config.refresh_after_new_rows,
            Err(e) => {
                warn!(owner = %profile.owner_id, error = %e, "activity check failed, keeping cached profile");
                false
            }
        }
    }

    async fn compute(&self, owner: &OwnerId) -> UserProfile {
        let until = Utc::now();
        let since = until - chrono::Duration::days(self.config.window_days);

        let (items, events) = match self.fetch(owner, since).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(owner = %owner, error = %e, "profile reads failed, building empty profile");
                (Vec::new(), Vec::new())
            }
        };

        let recent_themes = extract_themes(&items, &events, self.config.theme_count);
        let source_window = SourceWindow {
            since,
            until,
            item_count: items.len(),
            event_count: events.len(),
        };

        let (interests, cognitive_style, source) = if items.is_empty() {
            debug!(owner = %owner, "no recent content, skipping model extraction");
            (Vec::new(), CognitiveStyle::Balanced, ProfileSource::LocalOnly)
        } else {
            match self.extract_with_model(&items, &events).await {
                Ok((interests, style)) => (interests, style, ProfileSource::Model),
                Err(e) => {
                    warn!(owner = %owner, error = %e, "profile extraction degraded to local signals");
                    (Vec::new(), CognitiveStyle::Balanced, ProfileSource::LocalOnly)
                }
            }
        };

        info!(
            owner = %owner,
            items = source_window.item_count,
            events = source_window.event_count,
            source = ?source,
            "profile computed"
        );

        UserProfile {
            owner_id: owner.clone(),
            interests,
            cognitive_style,
            recent_themes,
            computed_at: until,
            source_window,
            source,
        }
    }

    /// The three independent reads, issued in parallel under one timeout.
    async fn fetch(
        &self,
        owner: &OwnerId,
        since: DateTime<Utc>,
    ) -> MemoryResult<(Vec<ContentItem>, Vec<BehaviorEvent>)> {
        let limit = self.config.max_items;
        let reads = async {
            tokio::try_join!(
                self.content.recent_items(owner, since, &[ContentType::Insight], limit),
                self.content.recent_items(
                    owner,
                    since,
                    &[ContentType::Collection, ContentType::Principle],
                    limit,
                ),
                self.content.recent_events(owner, since, self.config.max_events),
            )
        };

        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let (mut insights, structures, events) = tokio::time::timeout(timeout, reads)
            .await
            .map_err(|_| {
                MemoryError::Unavailable(
                    Dependency::ContentStore,
                    format!("profile reads timed out after {}ms", timeout.as_millis()),
                )
            })??;

        insights.extend(structures);
        insights.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok((insights, events))
    }

    async fn extract_with_model(
        &self,
        items: &[ContentItem],
        events: &[BehaviorEvent],
    ) -> MemoryResult<(Vec<String>, CognitiveStyle)> {
        let summary = compact_summary(items, events, self.config.max_summary_items);
        let request = CompletionRequest::new(
            CompletionTask::Profile,
            vec![
                ChatMessage::system(
                    "You analyze a person's recent journal entries to describe how they think. \
                     Respond with a JSON object: {\"interests\": [short topic strings], \
                     \"cognitiveStyle\": \"analytical\" | \"creative\" | \"practical\" | \"intuitive\" | \"mixed\"}.",
                ),
                ChatMessage::user(summary),
            ],
        )
        .with_temperature(0.2);

        let raw = self.llm.complete(&request).await?;
        let parsed: ModelProfile = parse_json_object(&raw)?;

        let style = match parsed.cognitive_style.as_deref() {
            Some(s) => CognitiveStyle::parse(s).ok_or_else(|| {
                let reason = format!("unknown cognitive style: {s}");
                MemoryError::InvalidResponse(Dependency::Completion, reason)
            })?,
            None => CognitiveStyle::Balanced,
        };
        Ok((clean_interests(parsed.interests), style))
    }
}

/// Bounded textual digest of recent activity for the model.
fn compact_summary(items: &[ContentItem], events: &[BehaviorEvent], max_items: usize) -> String {
    let mut lines = Vec::with_capacity(max_items + 2);
    lines.push(format!(
        "{} items and {} actions in the recent window. Most recent first:",
        items.len(),
        events.len()
    ));
    for item in items.iter().take(max_items) {
        let text = item.text().replace('\n', " / ");
        let line: String = text.chars().take(SUMMARY_LINE_CHARS).collect();
        lines.push(format!("- [{}] {}", item.content_type(), line));
    }

    let mut actions: HashMap<&str, usize> = HashMap::new();
    for event in events {
        *actions.entry(event.action_type.as_str()).or_default() += 1;
    }
    if !actions.is_empty() {
        let mut actions: Vec<_> = actions.into_iter().collect();
        actions.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let rendered: Vec<String> = actions.iter().map(|(a, n)| format!("{a} x{n}")).collect();
        lines.push(format!("Actions: {}", rendered.join(", ")));
    }
    lines.join("\n")
}

fn clean_interests(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s.chars().count() <= MAX_INTEREST_CHARS)
        .filter(|s| seen.insert(s.to_lowercase()))
        .take(MAX_INTERESTS)
        .collect()
}

/// Most frequent non-trivial keywords across recent items, plus the entity
/// categories the user acted on most.
pub fn extract_themes(
    items: &[ContentItem],
    events: &[BehaviorEvent],
    count: usize,
) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for item in items {
        // Count each word once per item so one long entry cannot dominate.
        let words: HashSet<String> = item
            .text()
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= 4 && !w.chars().all(|c| c.is_numeric()))
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .collect();
        for word in words {
            *freq.entry(word).or_default() += 1;
        }
    }

    let mut themes: Vec<(String, usize)> = freq.into_iter().collect();
    themes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut result: Vec<String> = themes.into_iter().take(count).map(|(w, _)| w).collect();

    if result.len() < count {
        let mut categories: HashMap<ContentType, usize> = HashMap::new();
        for event in events {
            if let Some(t) = event.entity_type {
                *categories.entry(t).or_default() += 1;
            }
        }
        let mut categories: Vec<_> = categories.into_iter().collect();
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        for (category, _) in categories {
            if result.len() >= count {
                break;
            }
            let name = format!("{}s", category.as_str());
            if !result.contains(&name) {
                result.push(name);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{ActionType, ContentBody};

    fn insight(owner: &OwnerId, id: i64, summary: &str) -> ContentItem {
        ContentItem {
            id,
            owner_id: owner.clone(),
            body: ContentBody::Insight {
                summary: summary.into(),
                anchor: String::new(),
                pulse: String::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn themes_rank_by_item_frequency() {
        let owner = OwnerId::new("alice").unwrap();
        let items = vec![
            insight(&owner, 1, "Morning running routine keeps me focused"),
            insight(&owner, 2, "Running with friends, training for a marathon"),
            insight(&owner, 3, "Marathon training plan, running intervals"),
        ];
        let themes = extract_themes(&items, &[], 2);
        assert_eq!(themes, vec!["running".to_string(), "marathon".to_string()]);
    }

    #[test]
    fn themes_skip_stopwords_and_short_words() {
        let owner = OwnerId::new("alice").unwrap();
        let items = vec![insight(&owner, 1, "I felt that this was a really good day")];
        let themes = extract_themes(&items, &[], 5);
        assert!(!themes.contains(&"that".to_string()));
        assert!(!themes.contains(&"felt".to_string()));
        assert!(themes.iter().all(|t| t.len() >= 4));
    }

    #[test]
    fn themes_fall_back_to_event_categories() {
        let owner = OwnerId::new("alice").unwrap();
        let events = vec![
            BehaviorEvent::new(owner.clone(), ActionType::ContentCreated, "s")
                .with_entity(ContentType::Collection, 1),
            BehaviorEvent::new(owner, ActionType::ContentCreated, "s")
                .with_entity(ContentType::Collection, 2),
        ];
        assert_eq!(extract_themes(&[], &events, 3), vec!["collections".to_string()]);
    }

    #[test]
    fn interests_are_trimmed_deduped_and_capped() {
        let raw = vec![
            " Running ".to_string(),
            "running".to_string(),
            "".to_string(),
            "x".repeat(100),
            "Startups".to_string(),
        ];
        assert_eq!(clean_interests(raw), vec!["Running".to_string(), "Startups".to_string()]);
    }

    #[test]
    fn cognitive_style_parse_is_lenient() {
        assert_eq!(CognitiveStyle::parse(" Analytical"), Some(CognitiveStyle::Analytical));
        assert_eq!(CognitiveStyle::parse("chaotic"), None);
    }

    #[test]
    fn summary_is_bounded() {
        let owner = OwnerId::new("alice").unwrap();
        let items: Vec<_> = (0..50).map(|i| insight(&owner, i, &"word ".repeat(200))).collect();
        let summary = compact_summary(&items, &[], 20);
        // header + 20 item lines
        assert_eq!(summary.lines().count(), 21);
        assert!(summary.lines().all(|l| l.chars().count() <= SUMMARY_LINE_CHARS + 16));
    }
}

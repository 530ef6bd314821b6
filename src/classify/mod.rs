//! Classification of free text into insight, collection, or principle.
//!
//! Two stages: the [`heuristic`] pre-pass always runs and supplies a provisional
//! type; the completion service then refines it. Model output is parsed and
//! validated before it becomes a [`ClassificationResult`]. Any model failure
//! returns the heuristic verbatim.

pub mod heuristic;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ClassificationConfig;
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::llm::{
    parse_json_object, ChatMessage, CompletionRequest, CompletionService, CompletionTask,
};
use crate::memory::types::{ContentType, Speaker, Turn};

use heuristic::HeuristicResult;

pub const HEURISTIC_FALLBACK: &str = "heuristic fallback";
const MAX_ALTERNATIVES: usize = 2;
const HISTORY_TURNS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Alternative {
    pub content_type: ContentType,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub content_type: ContentType,
    /// In [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_fields: BTreeMap<String, String>,
    /// At most two, by non-increasing confidence, none above `confidence`.
    pub alternatives: Vec<Alternative>,
    pub key_indicators: Vec<String>,
    /// Fields the chosen type still lacks, most important first.
    pub missing_information: Vec<String>,
    /// Set when `confidence` is below the gate: callers must surface alternatives.
    pub needs_confirmation: bool,
    pub source: ClassificationSource,
}

/// Raw model output. Field names follow the prompt; aliases cover snake_case replies.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelClassification {
    #[serde(alias = "type", alias = "content_type")]
    content_type: String,
    confidence: serde_json::Number,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default, alias = "suggested_fields", alias = "suggestedStructure")]
    suggested_fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    alternatives: Vec<ModelAlternative>,
    #[serde(default, alias = "key_indicators")]
    key_indicators: Vec<String>,
    #[serde(default, alias = "missing_information")]
    missing_information: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelAlternative {
    #[serde(alias = "type", alias = "content_type")]
    content_type: String,
    confidence: serde_json::Number,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct Classifier {
    llm: Arc<dyn CompletionService>,
    config: ClassificationConfig,
}

impl Classifier {
    pub fn new(llm: Arc<dyn CompletionService>, config: ClassificationConfig) -> Self {
        Self { llm, config }
    }

    pub fn confidence_gate(&self) -> f64 {
        self.config.confidence_gate
    }

    /// Classify `text` in the context of `history`. Only blank input is an error.
    pub async fn classify(
        &self,
        text: &str,
        history: &[Turn],
    ) -> MemoryResult<ClassificationResult> {
        if text.trim().is_empty() {
            return Err(MemoryError::InvalidInput("cannot classify empty text".into()));
        }

        let pre = heuristic::classify(text);
        let request = build_request(text, history, &pre);

        let refined = match self.llm.complete(&request).await {
            Ok(raw) => parse_json_object::<ModelClassification>(&raw)
                .and_then(|parsed| validate(parsed, &pre, self.config.confidence_gate)),
            Err(e) => Err(e),
        };

        match refined {
            Ok(result) => {
                debug!(
                    content_type = %result.content_type,
                    confidence = result.confidence,
                    needs_confirmation = result.needs_confirmation,
                    "classified"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, provisional = %pre.content_type, "classification degraded to heuristic");
                Ok(from_heuristic(pre, self.config.confidence_gate))
            }
        }
    }
}

fn build_request(text: &str, history: &[Turn], pre: &HeuristicResult) -> CompletionRequest {
    let system = format!(
        "Classify a person's thought as exactly one of three structures.\n\
         insight: a single observation or realization, present-focused, no plan or timeline. Fields: summary, anchor, pulse.\n\
         collection: a goal-oriented project with actionable steps and time-bound elements. Fields: heading, objectives, timeframe.\n\
         principle: life-level purpose, identity, or values spanning several life domains. Fields: heading, purpose, timeframe.\n\
         When uncertain prefer the simpler structure (insight, then collection, then principle).\n\
         A keyword pre-pass suggests \"{}\" ({}).\n\
         Respond with a JSON object: {{\"contentType\": \"insight|collection|principle\", \"confidence\": 0.0-1.0, \
         \"reasoning\": string, \"suggestedFields\": {{field: value}}, \
         \"alternatives\": [{{\"contentType\": string, \"confidence\": number, \"reasoning\": string}}] (at most 2), \
         \"keyIndicators\": [string], \"missingInformation\": [field names the thought still lacks]}}.",
        pre.content_type,
        pre.signals.indicators().join("; "),
    );

    let mut messages = vec![ChatMessage::system(system)];
    let start = history.len().saturating_sub(HISTORY_TURNS);
    for turn in &history[start..] {
        messages.push(match turn.speaker {
            Speaker::User => ChatMessage::user(turn.text.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
        });
    }
    messages.push(ChatMessage::user(format!("Thought to classify:\n{text}")));

    CompletionRequest::new(CompletionTask::Classify, messages).with_temperature(0.3)
}

/// Bring a model confidence into [0, 1]. Values above 1 are read as percentages.
pub fn normalize_confidence(raw: &serde_json::Number) -> MemoryResult<f64> {
    let value = raw.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
        MemoryError::InvalidResponse(Dependency::Completion, "confidence is not a number".into())
    })?;
    let scaled = if value > 1.0 { value / 100.0 } else { value };
    Ok(scaled.clamp(0.0, 1.0))
}

fn parse_type(raw: &str) -> MemoryResult<ContentType> {
    raw.parse::<ContentType>()
        .map_err(|e| MemoryError::InvalidResponse(Dependency::Completion, e))
}

/// Map a model field name onto the canonical field of `content_type`.
fn canonical_field(content_type: ContentType, key: &str) -> Option<&'static str> {
    let key = key.trim().to_ascii_lowercase();
    let canonical = match (content_type, key.as_str()) {
        (ContentType::Insight, "summary" | "heading" | "content") => "summary",
        (ContentType::Insight, "anchor" | "context") => "anchor",
        (ContentType::Insight, "pulse" | "emotion" | "mood") => "pulse",
        (_, "heading" | "title") => "heading",
        (ContentType::Collection, "objectives" | "goals" | "content") => "objectives",
        (ContentType::Principle, "purpose" | "content") => "purpose",
        (_, "timeframe" | "timeline") => "timeframe",
        _ => return None,
    };
    Some(canonical)
}

fn validate(
    parsed: ModelClassification,
    pre: &HeuristicResult,
    gate: f64,
) -> MemoryResult<ClassificationResult> {
    let content_type = parse_type(&parsed.content_type)?;
    let confidence = normalize_confidence(&parsed.confidence)?;

    let mut suggested_fields = BTreeMap::new();
    for (key, value) in parsed.suggested_fields {
        let Some(field) = canonical_field(content_type, &key) else { continue };
        let value = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::trim))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; "),
            _ => continue,
        };
        if !value.is_empty() {
            suggested_fields.entry(field.to_string()).or_insert(value);
        }
    }

    let mut alternatives: Vec<Alternative> = Vec::new();
    for alt in parsed.alternatives {
        let (Ok(alt_type), Ok(alt_confidence)) = (
            parse_type(&alt.content_type),
            normalize_confidence(&alt.confidence),
        ) else {
            continue;
        };
        if alt_type == content_type || alternatives.iter().any(|a| a.content_type == alt_type) {
            continue;
        }
        alternatives.push(Alternative {
            content_type: alt_type,
            confidence: alt_confidence.min(confidence),
            reasoning: alt.reasoning.unwrap_or_default().trim().to_string(),
        });
    }
    if alternatives.is_empty() {
        alternatives = heuristic_alternatives(pre, content_type, confidence);
    }
    alternatives.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    alternatives.truncate(MAX_ALTERNATIVES);

    let missing_information = {
        let from_model: Vec<String> = parsed
            .missing_information
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if from_model.is_empty() {
            content_type
                .required_fields()
                .iter()
                .filter(|f| !suggested_fields.contains_key(**f))
                .map(|f| f.to_string())
                .collect()
        } else {
            from_model
        }
    };

    let mut key_indicators: Vec<String> = parsed
        .key_indicators
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if key_indicators.is_empty() {
        key_indicators = pre.signals.indicators();
    }

    let reasoning = parsed
        .reasoning
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| format!("classified as {content_type}"));

    Ok(ClassificationResult {
        content_type,
        confidence,
        reasoning,
        suggested_fields,
        alternatives,
        key_indicators,
        missing_information,
        needs_confirmation: confidence < gate,
        source: ClassificationSource::Model,
    })
}

fn heuristic_alternatives(
    pre: &HeuristicResult,
    primary: ContentType,
    cap: f64,
) -> Vec<Alternative> {
    pre.scores
        .iter()
        .filter(|(t, _)| *t != primary)
        .map(|(t, score)| Alternative {
            content_type: *t,
            confidence: score.min(cap),
            reasoning: "keyword signals".to_string(),
        })
        .collect()
}

fn from_heuristic(pre: HeuristicResult, gate: f64) -> ClassificationResult {
    let alternatives = {
        let mut alts = heuristic_alternatives(&pre, pre.content_type, pre.confidence);
        alts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        alts.truncate(MAX_ALTERNATIVES);
        alts
    };
    ClassificationResult {
        content_type: pre.content_type,
        confidence: pre.confidence,
        reasoning: HEURISTIC_FALLBACK.to_string(),
        key_indicators: pre.signals.indicators(),
        suggested_fields: pre.suggested_fields,
        alternatives,
        missing_information: pre.missing_information,
        needs_confirmation: pre.confidence < gate,
        source: ClassificationSource::Heuristic,
    }
}

//! Deterministic pre-pass: keyword signals and word count, no network.
//!
//! Type rules, in order: purpose language over 20 words is a principle; goal or
//! timeframe language over 10 words is a collection; anything else is an insight.
//! Confidence starts at a baseline and rises slightly with each corroborating
//! signal family, staying well below what a confident model would report.

use std::collections::BTreeMap;

use crate::memory::types::ContentType;

const BASE_CONFIDENCE: f64 = 0.55;
const SIGNAL_BONUS: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.7;

const TIMEFRAME_TERMS: &[&str] = &[
    "by", "deadline", "q1", "q2", "q3", "q4", "week", "weeks", "month", "months", "quarter", "year",
    "years", "tomorrow", "weekend", "milestone", "milestones", "spring", "summer", "autumn", "winter",
    "lifelong", "end of", "next year", "this year",
];

const GOAL_TERMS: &[&str] = &[
    "goal", "goals", "achieve", "plan", "plans", "target", "complete", "launch", "build", "ship",
    "finish", "objective", "objectives", "grow", "increase", "want to", "going to", "aim to",
];

const PURPOSE_TERMS: &[&str] = &[
    "life", "identity", "purpose", "values", "transformation", "vision", "meaning", "become",
    "legacy", "mission", "who i am", "calling",
];

/// Signals found in one piece of text.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub word_count: usize,
    pub timeframe: Vec<&'static str>,
    pub goal: Vec<&'static str>,
    pub purpose: Vec<&'static str>,
}

impl Signals {
    pub fn extract(text: &str) -> Self {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        // Space-padded so phrase lookups only match whole words.
        let normalized = format!(" {} ", words.join(" "));
        let hits = |terms: &[&'static str]| -> Vec<&'static str> {
            terms
                .iter()
                .copied()
                .filter(|t| normalized.contains(&format!(" {t} ")))
                .collect()
        };

        Self {
            word_count: words.len(),
            timeframe: hits(TIMEFRAME_TERMS),
            goal: hits(GOAL_TERMS),
            purpose: hits(PURPOSE_TERMS),
        }
    }

    pub fn has_timeframe(&self) -> bool {
        !self.timeframe.is_empty()
    }

    pub fn has_goal(&self) -> bool {
        !self.goal.is_empty()
    }

    pub fn has_purpose(&self) -> bool {
        !self.purpose.is_empty()
    }

    /// Human-readable indicators, reported on the classification result.
    pub fn indicators(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.has_goal() {
            out.push(format!("goal language: {}", self.goal.join(", ")));
        }
        if self.has_timeframe() {
            out.push(format!("timeframe language: {}", self.timeframe.join(", ")));
        }
        if self.has_purpose() {
            out.push(format!("purpose language: {}", self.purpose.join(", ")));
        }
        out.push(format!("{} words", self.word_count));
        out
    }
}

/// Outcome of the pre-pass.
#[derive(Debug, Clone)]
pub struct HeuristicResult {
    pub content_type: ContentType,
    pub confidence: f64,
    /// Every type's score, best first. The provisional type is always first.
    pub scores: Vec<(ContentType, f64)>,
    pub signals: Signals,
    pub suggested_fields: BTreeMap<String, String>,
    pub missing_information: Vec<String>,
}

pub fn classify(text: &str) -> HeuristicResult {
    let signals = Signals::extract(text);

    let content_type = if signals.has_purpose() && signals.word_count > 20 {
        ContentType::Principle
    } else if (signals.has_goal() || signals.has_timeframe()) && signals.word_count > 10 {
        ContentType::Collection
    } else {
        ContentType::Insight
    };

    let confidence = confidence_for(content_type, &signals);
    let mut scores: Vec<(ContentType, f64)> = ContentType::ALL
        .iter()
        .map(|&t| {
            let score = if t == content_type {
                confidence
            } else {
                runner_up_score(t, &signals).min(confidence)
            };
            (t, score)
        })
        .collect();
    scores.sort_by(|a, b| {
        (b.0 == content_type)
            .cmp(&(a.0 == content_type))
            .then_with(|| b.1.total_cmp(&a.1))
    });

    HeuristicResult {
        content_type,
        confidence,
        scores,
        suggested_fields: suggest_fields(content_type, text, &signals),
        missing_information: missing_for(content_type, &signals),
        signals,
    }
}

fn confidence_for(content_type: ContentType, s: &Signals) -> f64 {
    let support = match content_type {
        ContentType::Principle => [s.has_timeframe(), s.purpose.len() > 1, s.word_count > 40]
            .iter()
            .filter(|b| **b)
            .count(),
        ContentType::Collection => [
            s.has_goal() && s.has_timeframe(),
            s.goal.len() > 1,
            s.word_count > 20,
        ]
        .iter()
        .filter(|b| **b)
        .count(),
        ContentType::Insight => [
            !s.has_goal() && !s.has_timeframe() && !s.has_purpose(),
            s.word_count <= 30,
        ]
        .iter()
        .filter(|b| **b)
        .count(),
    };
    (BASE_CONFIDENCE + SIGNAL_BONUS * support as f64).min(MAX_CONFIDENCE)
}

/// Plausibility of a type the rules did not pick.
fn runner_up_score(content_type: ContentType, s: &Signals) -> f64 {
    let mut score: f64 = 0.2;
    match content_type {
        ContentType::Insight => {
            if s.word_count <= 30 {
                score += 0.2;
            }
        }
        ContentType::Collection => {
            if s.has_goal() {
                score += 0.15;
            }
            if s.has_timeframe() {
                score += 0.15;
            }
        }
        ContentType::Principle => {
            if s.has_purpose() {
                score += 0.25;
            }
        }
    }
    score
}

fn first_sentence(text: &str) -> String {
    let sentence = text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    sentence.chars().take(80).collect()
}

fn suggest_fields(content_type: ContentType, text: &str, s: &Signals) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    let heading = first_sentence(text);
    let body = text.trim().to_string();
    match content_type {
        ContentType::Insight => {
            fields.insert("summary".to_string(), heading);
            if body.chars().count() > fields["summary"].chars().count() {
                fields.insert("anchor".to_string(), body);
            }
        }
        ContentType::Collection => {
            fields.insert("heading".to_string(), heading);
            fields.insert("objectives".to_string(), body);
            if s.has_timeframe() {
                fields.insert("timeframe".to_string(), s.timeframe.join(", "));
            }
        }
        ContentType::Principle => {
            fields.insert("heading".to_string(), heading);
            fields.insert("purpose".to_string(), body);
            if s.has_timeframe() {
                fields.insert("timeframe".to_string(), s.timeframe.join(", "));
            }
        }
    }
    fields.retain(|_, v| !v.is_empty());
    fields
}

fn missing_for(content_type: ContentType, s: &Signals) -> Vec<String> {
    let mut missing = Vec::new();
    match content_type {
        ContentType::Insight => {
            if s.word_count < 8 {
                missing.push("anchor".to_string());
            }
            missing.push("pulse".to_string());
        }
        ContentType::Collection => {
            if !s.has_goal() {
                missing.push("objectives".to_string());
            }
            if !s.has_timeframe() {
                missing.push("timeframe".to_string());
            }
        }
        ContentType::Principle => {
            if !s.has_timeframe() {
                missing.push("timeframe".to_string());
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_with_timeframe_is_collection() {
        let r = classify("I want to launch my product in Q2 and build a repeatable GTM process");
        assert_eq!(r.content_type, ContentType::Collection);
        assert!(r.signals.has_goal());
        assert!(r.signals.timeframe.contains(&"q2"));
        assert_eq!(r.suggested_fields.get("timeframe").map(String::as_str), Some("q2"));
    }

    #[test]
    fn short_reflection_is_insight() {
        let r = classify("felt proud after finishing the run");
        assert_eq!(r.content_type, ContentType::Insight);
        assert!(r.missing_information.contains(&"anchor".to_string()));
    }

    #[test]
    fn long_purpose_statement_is_principle() {
        let text = "I keep coming back to the idea that my purpose in life is to help people around me \
                    grow, and I want my values to show in how I work and how I treat my family";
        let r = classify(text);
        assert_eq!(r.content_type, ContentType::Principle);
        assert!(r.signals.has_purpose());
    }

    #[test]
    fn purpose_words_in_short_text_do_not_make_a_principle() {
        let r = classify("life is good");
        assert_eq!(r.content_type, ContentType::Insight);
    }

    #[test]
    fn by_matches_only_as_a_word() {
        let s = Signals::extract("maybe nearby");
        assert!(!s.has_timeframe());
        let s = Signals::extract("done by friday");
        assert!(s.has_timeframe());
    }

    #[test]
    fn scores_cover_every_type_and_never_exceed_primary() {
        let r =
            classify("Plan to finish the marathon training block by the end of the month, then rest");
        assert_eq!(r.scores.len(), 3);
        assert_eq!(r.scores[0].0, r.content_type);
        assert!(r.scores.iter().all(|(_, s)| *s <= r.confidence));
        assert!(r.scores[1].1 >= r.scores[2].1);
    }

    #[test]
    fn confidence_stays_in_heuristic_band() {
        for text in [
            "ok",
            "I want to launch by Q3 and grow revenue every quarter this year with a new plan",
        ] {
            let r = classify(text);
            assert!(r.confidence >= BASE_CONFIDENCE && r.confidence <= MAX_CONFIDENCE);
        }
    }
}

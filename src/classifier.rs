//! Classifier: maps transcript text to a [`RoutingDecision`].
//!
//! Two configured modes (path-hint, content) plus the keyword heuristic both
//! modes fall back to. `classify` is infallible by contract — the fallback
//! chain is designed to make an unclassifiable transcript impossible; the
//! defensive `ErrClassify` case in the orchestrator exists only for the path
//! that should be unreachable.

use crate::config::{ClassifierMode, RouterConfig};
use crate::model::ModelAdapter;
use crate::types::{AgentId, ClassifierModeUsed, RoutingDecision, TranscriptKey};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Turns transcript text into a routing decision. Infallible: every
/// implementation guarantees a decision via its fallback chain.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, transcript: &str, object_key: &TranscriptKey) -> RoutingDecision;
}

/// Derives the agent purely from the object key's hint segment.
pub struct PathHintClassifier {
    fallback: KeywordFallbackClassifier,
}

impl PathHintClassifier {
    pub fn new() -> Self {
        Self {
            fallback: KeywordFallbackClassifier,
        }
    }

    fn from_hint(hint: &str) -> Option<AgentId> {
        match hint {
            "work" => Some(AgentId::Journal),
            "memories" => Some(AgentId::Memory),
            "github_ideas" => Some(AgentId::Repository),
            _ => None,
        }
    }
}

impl Default for PathHintClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for PathHintClassifier {
    async fn classify(&self, transcript: &str, object_key: &TranscriptKey) -> RoutingDecision {
        match Self::from_hint(&object_key.hint) {
            Some(primary) => RoutingDecision::new(
                primary,
                Vec::new(),
                1.0,
                format!("path hint: {}", object_key.hint),
                ClassifierModeUsed::PathHint,
            ),
            None => self.fallback.classify(transcript, object_key).await,
        }
    }
}

const JOURNAL_KEYWORDS: &[&str] = &[
    "meeting",
    "deadline",
    "client",
    "team",
    "completed",
    "finished",
    "worked on",
    "sprint",
    "deploy",
];

const MEMORY_KEYWORDS: &[&str] = &[
    "remember",
    "felt",
    "grateful",
    "childhood",
    "mom",
    "dad",
    "family",
];

const REPOSITORY_KEYWORDS: &[&str] = &[
    "idea for",
    "build an app",
    "project that",
    "prototype",
    "what if we",
];

fn count_matches(text: &str, keywords: &[&str]) -> usize {
    let lower = text.to_lowercase();
    keywords.iter().filter(|k| lower.contains(*k)).count()
}

/// Scores the transcript against three closed, case-insensitive
/// substring-match keyword sets; ties break `(repository, journal, memory)`.
pub struct KeywordFallbackClassifier;

#[async_trait]
impl Classifier for KeywordFallbackClassifier {
    async fn classify(&self, transcript: &str, _object_key: &TranscriptKey) -> RoutingDecision {
        let journal_count = count_matches(transcript, JOURNAL_KEYWORDS);
        let memory_count = count_matches(transcript, MEMORY_KEYWORDS);
        let repository_count = count_matches(transcript, REPOSITORY_KEYWORDS);

        let scores = [
            (AgentId::Repository, repository_count),
            (AgentId::Journal, journal_count),
            (AgentId::Memory, memory_count),
        ];

        let max_count = scores.iter().map(|(_, c)| *c).max().unwrap_or(0);

        if max_count == 0 {
            return RoutingDecision::new(
                AgentId::Journal,
                Vec::new(),
                0.2,
                "no keyword matches, defaulting to journal",
                ClassifierModeUsed::KeywordFallback,
            );
        }

        let (primary, matched_count) = scores
            .into_iter()
            .find(|(_, count)| *count == max_count)
            .expect("max_count was computed from this iterator");

        let confidence = (0.4 + 0.15 * matched_count as f64).min(1.0);

        RoutingDecision::new(
            primary,
            Vec::new(),
            confidence,
            format!("keyword fallback: {matched_count} matches for {primary}"),
            ClassifierModeUsed::KeywordFallback,
        )
    }
}

#[derive(Deserialize)]
struct ContentClassification {
    primary: String,
    #[serde(default)]
    secondary: Vec<String>,
    confidence: f64,
    rationale: String,
    /// Optional per-secondary confidence, keyed by agent name; entries below
    /// 0.6 are dropped from the preserved secondary set.
    #[serde(default)]
    secondary_confidence: std::collections::HashMap<String, f64>,
}

fn classification_prompt(transcript: &str) -> String {
    format!(
        "Classify this transcript into one of journal, memory, repository. \
         Respond as JSON: {{\"primary\": string, \"secondary\": [string], \
         \"confidence\": number, \"rationale\": string}}.\n\nTranscript:\n{transcript}"
    )
}

/// Calls the Model Adapter with a classification prompt; on parse failure,
/// validation failure, or confidence below `classifier.min_confidence`,
/// falls back to path-hint, then keyword.
pub struct ContentClassifier<M: ModelAdapter> {
    model: Arc<M>,
    min_confidence: f64,
    model_timeout: Duration,
    path_hint: PathHintClassifier,
}

impl<M: ModelAdapter> ContentClassifier<M> {
    pub fn new(model: Arc<M>, min_confidence: f64, model_timeout: Duration) -> Self {
        Self {
            model,
            min_confidence,
            model_timeout,
            path_hint: PathHintClassifier::new(),
        }
    }

    fn validate(parsed: ContentClassification, min_confidence: f64) -> Option<RoutingDecision> {
        let primary: AgentId = parsed.primary.parse().ok()?;

        if !(0.0..=1.0).contains(&parsed.confidence) || parsed.confidence < min_confidence {
            return None;
        }

        let mut secondary = Vec::new();
        for name in &parsed.secondary {
            let agent: AgentId = name.parse().ok()?;
            if agent == primary || secondary.contains(&agent) {
                return None;
            }
            let keep = parsed
                .secondary_confidence
                .get(name)
                .map(|c| *c >= 0.6)
                .unwrap_or(true);
            if keep {
                secondary.push(agent);
            }
        }

        Some(RoutingDecision::new(
            primary,
            secondary,
            parsed.confidence,
            parsed.rationale,
            ClassifierModeUsed::Content,
        ))
    }
}

#[async_trait]
impl<M: ModelAdapter> Classifier for ContentClassifier<M> {
    async fn classify(&self, transcript: &str, object_key: &TranscriptKey) -> RoutingDecision {
        let prompt = classification_prompt(transcript);
        let raw = self
            .model
            .invoke(&prompt, 512, self.model_timeout)
            .await
            .ok();

        let decision = raw
            .as_deref()
            .and_then(|text| serde_json::from_str::<ContentClassification>(text).ok())
            .and_then(|parsed| Self::validate(parsed, self.min_confidence));

        match decision {
            Some(decision) => decision,
            None => self.path_hint.classify(transcript, object_key).await,
        }
    }
}

/// Selects a [`Classifier`] implementation by `classifier.mode`.
pub fn build_classifier<M: ModelAdapter + 'static>(
    config: &RouterConfig,
    model: Arc<M>,
) -> Box<dyn Classifier> {
    match config.classifier_mode() {
        ClassifierMode::PathHint => Box::new(PathHintClassifier::new()),
        ClassifierMode::Content => Box::new(ContentClassifier::new(
            model,
            config.classifier_min_confidence(),
            Duration::from_millis(config.model_timeout_ms()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FakeModelAdapter;

    fn key(raw: &str) -> TranscriptKey {
        TranscriptKey::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_path_hint_maps_work_to_journal() {
        let classifier = PathHintClassifier::new();
        let decision = classifier
            .classify("anything", &key("transcripts/work/2024/01/15/mon.txt"))
            .await;
        assert_eq!(decision.primary, AgentId::Journal);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.mode, ClassifierModeUsed::PathHint);
    }

    #[tokio::test]
    async fn test_path_hint_maps_memories_to_memory() {
        let classifier = PathHintClassifier::new();
        let decision = classifier
            .classify("x", &key("transcripts/memories/2024/07/04/s.txt"))
            .await;
        assert_eq!(decision.primary, AgentId::Memory);
    }

    #[tokio::test]
    async fn test_path_hint_maps_github_ideas_to_repository() {
        let classifier = PathHintClassifier::new();
        let decision = classifier
            .classify("x", &key("transcripts/github_ideas/2024/02/02/t.txt"))
            .await;
        assert_eq!(decision.primary, AgentId::Repository);
    }

    #[tokio::test]
    async fn test_path_hint_falls_through_on_unclassified() {
        let classifier = PathHintClassifier::new();
        let decision = classifier
            .classify(
                "idea for a habit tracker app",
                &key("transcripts/unclassified/2024/03/03/m.txt"),
            )
            .await;
        assert_eq!(decision.mode, ClassifierModeUsed::KeywordFallback);
        assert_eq!(decision.primary, AgentId::Repository);
    }

    #[tokio::test]
    async fn test_keyword_fallback_empty_transcript_defaults_journal() {
        let classifier = KeywordFallbackClassifier;
        let decision = classifier
            .classify("", &key("transcripts/unclassified/2024/01/01/e.txt"))
            .await;
        assert_eq!(decision.primary, AgentId::Journal);
        assert_eq!(decision.confidence, 0.2);
    }

    #[tokio::test]
    async fn test_keyword_fallback_ties_break_repository_first() {
        // "team" (journal) and "idea for" (repository) each match once.
        let classifier = KeywordFallbackClassifier;
        let decision = classifier
            .classify(
                "team idea for a new project",
                &key("transcripts/unclassified/2024/01/01/e.txt"),
            )
            .await;
        assert_eq!(decision.primary, AgentId::Repository);
    }

    #[tokio::test]
    async fn test_keyword_fallback_s4_scenario() {
        let classifier = KeywordFallbackClassifier;
        let decision = classifier
            .classify(
                "Had an idea for an app while remembering my first project at work.",
                &key("transcripts/unclassified/2024/03/03/mixed.txt"),
            )
            .await;
        assert_eq!(decision.primary, AgentId::Repository);
        assert!(decision.secondary.is_empty());
    }

    #[tokio::test]
    async fn test_content_mode_falls_back_on_invalid_json() {
        let model = Arc::new(FakeModelAdapter::constant("not json"));
        let classifier = ContentClassifier::new(model, 0.5, Duration::from_secs(1));
        let decision = classifier
            .classify("x", &key("transcripts/work/2024/01/01/a.txt"))
            .await;
        assert_eq!(decision.mode, ClassifierModeUsed::PathHint);
        assert_eq!(decision.primary, AgentId::Journal);
    }

    #[tokio::test]
    async fn test_content_mode_falls_back_on_low_confidence() {
        let model = Arc::new(FakeModelAdapter::constant(
            r#"{"primary":"memory","secondary":[],"confidence":0.1,"rationale":"unsure"}"#,
        ));
        let classifier = ContentClassifier::new(model, 0.5, Duration::from_secs(1));
        let decision = classifier
            .classify("x", &key("transcripts/work/2024/01/01/a.txt"))
            .await;
        assert_eq!(decision.mode, ClassifierModeUsed::PathHint);
    }

    #[tokio::test]
    async fn test_content_mode_accepts_valid_decision() {
        let model = Arc::new(FakeModelAdapter::constant(
            r#"{"primary":"repository","secondary":["memory"],"confidence":0.9,"rationale":"clear idea pitch","secondary_confidence":{"memory":0.7}}"#,
        ));
        let classifier = ContentClassifier::new(model, 0.5, Duration::from_secs(1));
        let decision = classifier
            .classify("x", &key("transcripts/unclassified/2024/01/01/a.txt"))
            .await;
        assert_eq!(decision.mode, ClassifierModeUsed::Content);
        assert_eq!(decision.primary, AgentId::Repository);
        assert_eq!(decision.secondary, vec![AgentId::Memory]);
    }

    #[tokio::test]
    async fn test_content_mode_drops_low_confidence_secondary() {
        let model = Arc::new(FakeModelAdapter::constant(
            r#"{"primary":"repository","secondary":["memory"],"confidence":0.9,"rationale":"r","secondary_confidence":{"memory":0.2}}"#,
        ));
        let classifier = ContentClassifier::new(model, 0.5, Duration::from_secs(1));
        let decision = classifier
            .classify("x", &key("transcripts/unclassified/2024/01/01/a.txt"))
            .await;
        assert!(decision.secondary.is_empty());
    }
}

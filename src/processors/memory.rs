//! Memory Processor: appends a structured JSON record to a daily memory
//! object. Enrichment (a model call for sentiment/themes/people/significance)
//! is optional and degrades to a minimal record on any failure.

use super::{ProcessorContext, Processor, elapsed_ms};
use crate::types::{
    AgentId, AgentResult, CorrelationId, MemoryRecord, Sentiment, memory_key,
};
use crate::config::Enrichment;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Deserialize)]
struct Enriched {
    sentiment: String,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    people: Vec<String>,
    significance: f64,
    #[serde(default)]
    summary: Option<String>,
}

fn enrichment_prompt(transcript: &str) -> String {
    format!(
        "Extract structured memory fields as JSON: {{\"sentiment\": string, \
         \"themes\": [string], \"people\": [string], \"significance\": number, \
         \"summary\": string}}.\n\nTranscript:\n{transcript}"
    )
}

fn minimal_record(timestamp: chrono::DateTime<Utc>, content: &str) -> MemoryRecord {
    MemoryRecord {
        timestamp,
        content: content.to_string(),
        sentiment: Sentiment::Unknown,
        themes: Vec::new(),
        people: Vec::new(),
        significance: 0.5,
        summary: None,
    }
}

pub struct MemoryProcessor;

impl MemoryProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MemoryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for MemoryProcessor {
    async fn process(
        &self,
        ctx: &ProcessorContext,
        transcript: &str,
        correlation_id: CorrelationId,
    ) -> AgentResult {
        let started = std::time::Instant::now();
        let started_at = Utc::now();
        let key = memory_key(ctx.event_time);

        let record = match ctx.config.memory_enrichment() {
            Enrichment::Off => minimal_record(ctx.event_time, transcript),
            Enrichment::On => {
                let prompt = enrichment_prompt(transcript);
                let timeout = Duration::from_millis(ctx.config.model_timeout_ms());
                match ctx.model.invoke(&prompt, 256, timeout).await {
                    Ok(raw) => match serde_json::from_str::<Enriched>(&raw) {
                        Ok(enriched) => MemoryRecord {
                            timestamp: ctx.event_time,
                            content: transcript.to_string(),
                            sentiment: Sentiment::coerce(&enriched.sentiment),
                            themes: enriched.themes,
                            people: enriched.people,
                            significance: enriched.significance.clamp(0.0, 1.0),
                            summary: enriched.summary,
                        }
                        .truncated(),
                        Err(_) => {
                            log::warn!(
                                "correlation_id={correlation_id} memory enrichment response invalid, degrading to minimal"
                            );
                            minimal_record(ctx.event_time, transcript)
                        }
                    },
                    Err(_) => {
                        log::warn!(
                            "correlation_id={correlation_id} memory enrichment call failed, degrading to minimal"
                        );
                        minimal_record(ctx.event_time, transcript)
                    }
                }
            }
        };

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                return AgentResult::failure(
                    AgentId::Memory,
                    correlation_id,
                    started_at,
                    elapsed_ms(started),
                    crate::Error::from(err).kind(),
                );
            }
        };

        match ctx
            .blob
            .append_line(&key, &line, ctx.config.blob_append_retries())
            .await
        {
            Ok(()) => AgentResult::success(
                AgentId::Memory,
                correlation_id,
                started_at,
                elapsed_ms(started),
                json!(record),
            ),
            Err(err) => AgentResult::failure(
                AgentId::Memory,
                correlation_id,
                started_at,
                elapsed_ms(started),
                err.kind(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlobStore;
    use crate::config::RouterConfig;
    use crate::model::FakeModelAdapter;
    use crate::processors::repository::InMemoryRepositoryHost;
    use crate::secret::EnvSecretStore;
    use crate::types::AgentStatus;
    use std::sync::Arc;

    fn ctx_with(
        model: FakeModelAdapter,
        enrichment: Enrichment,
    ) -> ProcessorContext {
        ProcessorContext {
            blob: Arc::new(InMemoryBlobStore::new()),
            secrets: Arc::new(EnvSecretStore),
            model: Arc::new(model),
            repository_host: Arc::new(InMemoryRepositoryHost::new()),
            config: RouterConfig::builder()
                .secret_token_name("t")
                .secret_model_key_name("m")
                .memory_enrichment(enrichment)
                .build()
                .unwrap(),
            event_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_minimal_mode_skips_model_call() {
        let processor = MemoryProcessor::new();
        let context = ctx_with(FakeModelAdapter::constant("{}"), Enrichment::Off);
        let result = processor
            .process(&context, "some content", CorrelationId::new())
            .await;
        assert_eq!(result.status, AgentStatus::Success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["sentiment"], "unknown");
        assert_eq!(payload["significance"], 0.5);
    }

    #[tokio::test]
    async fn test_enriched_mode_parses_model_output() {
        let processor = MemoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"sentiment":"nostalgia","themes":["summer"],"people":["grandma"],"significance":0.8,"summary":"sunset memory"}"#,
        );
        let context = ctx_with(model, Enrichment::On);
        let result = processor
            .process(
                &context,
                "Watching the sunset reminded me of summers with grandma.",
                CorrelationId::new(),
            )
            .await;
        assert_eq!(result.status, AgentStatus::Success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["sentiment"], "nostalgia");
        assert_eq!(payload["people"][0], "grandma");
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades_to_minimal() {
        let processor = MemoryProcessor::new();
        let model = FakeModelAdapter::from_fn(|_| Err(crate::Error::model("down")));
        let context = ctx_with(model, Enrichment::On);
        let result = processor
            .process(&context, "content", CorrelationId::new())
            .await;
        assert_eq!(result.status, AgentStatus::Success);
        let payload = result.payload.unwrap();
        assert_eq!(payload["sentiment"], "unknown");
    }

    #[tokio::test]
    async fn test_invalid_sentiment_coerced_to_unknown() {
        let processor = MemoryProcessor::new();
        let model = FakeModelAdapter::constant(
            r#"{"sentiment":"ecstatic","themes":[],"people":[],"significance":0.5}"#,
        );
        let context = ctx_with(model, Enrichment::On);
        let result = processor
            .process(&context, "content", CorrelationId::new())
            .await;
        let payload = result.payload.unwrap();
        assert_eq!(payload["sentiment"], "unknown");
    }
}

//! Journal Processor: appends a timestamped Markdown entry to a weekly
//! journal object keyed by ISO week.

use super::{ProcessorContext, Processor, elapsed_ms};
use crate::types::{AgentId, AgentResult, AgentStatus, CorrelationId, journal_key};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

/// Composes and appends one journal entry per event; never drops transcript
/// content on failure — the orchestrator records the failure and continues.
pub struct JournalProcessor;

impl JournalProcessor {
    pub fn new() -> Self {
        Self
    }

    fn entry(timestamp: chrono::DateTime<Utc>, transcript: &str) -> String {
        format!("## {}\n{}\n", timestamp.to_rfc3339(), transcript)
    }
}

impl Default for JournalProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for JournalProcessor {
    async fn process(
        &self,
        ctx: &ProcessorContext,
        transcript: &str,
        correlation_id: CorrelationId,
    ) -> AgentResult {
        let started = std::time::Instant::now();
        let started_at = Utc::now();
        let week_key = journal_key(ctx.event_time);
        let entry = Self::entry(ctx.event_time, transcript);
        let entry_length_bytes = entry.len();

        match ctx
            .blob
            .append_line(&week_key, &entry, ctx.config.blob_append_retries())
            .await
        {
            Ok(()) => AgentResult::success(
                AgentId::Journal,
                correlation_id,
                started_at,
                elapsed_ms(started),
                json!({
                    "journal_key": week_key,
                    "week": week_key,
                    "entry_length_bytes": entry_length_bytes,
                }),
            ),
            Err(err) => AgentResult::failure(
                AgentId::Journal,
                correlation_id,
                started_at,
                elapsed_ms(started),
                err.kind(),
            ),
        }
    }
}

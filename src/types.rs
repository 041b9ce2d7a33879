//! Core domain types: agent identifiers, routing decisions, per-agent and
//! aggregate results, the durable record shapes each processor appends, and
//! the transcript key parser that ties object layout to agent dispatch.

use chrono::{DateTime, Datelike, IsoWeek, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum transcript size accepted by the orchestrator, by policy (§5).
pub const MAX_TRANSCRIPT_BYTES: usize = 1024 * 1024;

/// Minimum trimmed transcript length the Repository Processor will act on;
/// shorter input is reported `skipped` with reason `insufficient_content`.
pub const MIN_REPOSITORY_CONTENT_BYTES: usize = 16;

/// Closed three-case agent identifier. Unknown values are rejected at the
/// ingest boundary ([`TranscriptKey::parse`]) rather than carried as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Journal,
    Memory,
    Repository,
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentId::Journal => "journal",
            AgentId::Memory => "memory",
            AgentId::Repository => "repository",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "journal" => Ok(AgentId::Journal),
            "memory" => Ok(AgentId::Memory),
            "repository" => Ok(AgentId::Repository),
            other => Err(format!("unknown agent identifier: {other}")),
        }
    }
}

/// Which classifier path produced a [`RoutingDecision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierModeUsed {
    PathHint,
    Content,
    KeywordFallback,
}

/// The classifier's output: primary agent, optional secondaries, confidence,
/// rationale, and which mode actually produced the decision.
///
/// Invariant: `primary` is never in `secondary`; `secondary` has no
/// duplicates. Enforced at construction time via [`RoutingDecision::new`]
/// rather than by a `Result`-returning API — the classifier is the sole
/// caller and is exhaustively tested against the invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub primary: AgentId,
    pub secondary: Vec<AgentId>,
    pub confidence: f64,
    pub rationale: String,
    pub mode: ClassifierModeUsed,
}

impl RoutingDecision {
    pub fn new(
        primary: AgentId,
        secondary: Vec<AgentId>,
        confidence: f64,
        rationale: impl Into<String>,
        mode: ClassifierModeUsed,
    ) -> Self {
        debug_assert!(
            !secondary.contains(&primary),
            "secondary must not contain primary"
        );
        debug_assert!(
            {
                let mut seen = std::collections::HashSet::new();
                secondary.iter().all(|a| seen.insert(*a))
            },
            "secondary must not contain duplicates"
        );
        debug_assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence must be in [0, 1]"
        );

        Self {
            primary,
            secondary,
            confidence,
            rationale: rationale.into(),
            mode,
        }
    }

    /// All agents this decision dispatches to, primary first.
    pub fn all_agents(&self) -> Vec<AgentId> {
        let mut agents = vec![self.primary];
        agents.extend(self.secondary.iter().copied());
        agents
    }
}

/// Outcome of a single processor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failure,
    Skipped,
}

/// Per-agent outcome of one event. `payload` is processor-specific and opaque
/// to the orchestrator; `error_kind` is populated only on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentId,
    pub status: AgentStatus,
    pub correlation_id: CorrelationId,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub payload: Option<serde_json::Value>,
    pub error_kind: Option<crate::error::ErrorKind>,
}

impl AgentResult {
    pub fn success(
        agent: AgentId,
        correlation_id: CorrelationId,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            agent,
            status: AgentStatus::Success,
            correlation_id,
            started_at,
            duration_ms,
            payload: Some(payload),
            error_kind: None,
        }
    }

    pub fn failure(
        agent: AgentId,
        correlation_id: CorrelationId,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        error_kind: crate::error::ErrorKind,
    ) -> Self {
        Self {
            agent,
            status: AgentStatus::Failure,
            correlation_id,
            started_at,
            duration_ms,
            payload: None,
            error_kind: Some(error_kind),
        }
    }

    pub fn skipped(
        agent: AgentId,
        correlation_id: CorrelationId,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            agent,
            status: AgentStatus::Skipped,
            correlation_id,
            started_at,
            duration_ms,
            payload: Some(payload),
            error_kind: None,
        }
    }

    pub fn timeout(
        agent: AgentId,
        correlation_id: CorrelationId,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self::failure(
            agent,
            correlation_id,
            started_at,
            duration_ms,
            crate::error::ErrorKind::Timeout,
        )
    }
}

/// The per-event summary written to `outputs/<hint>/<yyyy>/<mm>/<dd>/<name>_response.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    pub correlation_id: CorrelationId,
    pub transcript_key: String,
    pub timestamp: DateTime<Utc>,
    pub routing: RoutingDecision,
    pub results: Vec<AgentResult>,
}

/// An append-only, event-unique correlation identifier. Generated once per
/// event and propagated to every log entry and persisted record from that
/// event (§9 Open Question 4: accepted from event metadata when present,
/// else a fresh UUIDv4 — the path taken is logged by the caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_upstream(id: &str) -> Option<Self> {
        uuid::Uuid::parse_str(id).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed form of a `transcripts/<hint>/<yyyy>/<mm>/<dd>/<name>.txt` object
/// key. The date path is advisory only — the orchestrator derives its own
/// timestamp — but `hint` feeds the path-hint classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptKey {
    pub raw: String,
    pub hint: String,
    pub name: String,
}

impl TranscriptKey {
    /// Parses a transcript object key. Returns `None` for keys that do not
    /// start with `transcripts/` or end with `.txt` — callers treat this as
    /// "acknowledge and ignore", not an error.
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix("transcripts/")?;
        let name_with_ext = rest.rsplit('/').next()?;
        let name = name_with_ext.strip_suffix(".txt")?;

        let hint = rest.split('/').next()?;
        if hint.is_empty() || name.is_empty() {
            return None;
        }

        Some(Self {
            raw: key.to_string(),
            hint: hint.to_string(),
            name: name.to_string(),
        })
    }

    /// The `outputs/...` key an Aggregate Result for this transcript is
    /// written to, preserving the date path components of the input key.
    pub fn aggregate_key(&self) -> String {
        let date_path = self
            .raw
            .strip_prefix("transcripts/")
            .and_then(|rest| rest.strip_prefix(&format!("{}/", self.hint)))
            .and_then(|rest| rest.strip_suffix(&format!("{}.txt", self.name)))
            .unwrap_or("");
        format!(
            "outputs/{}/{}{}_response.json",
            self.hint, date_path, self.name
        )
    }
}

/// ISO week key used for journal object partitioning:
/// `work/weekly_logs/<iso-year>-W<iso-week>.md`.
pub fn journal_key(t: DateTime<Utc>) -> String {
    let week: IsoWeek = t.iso_week();
    format!("work/weekly_logs/{}-W{:02}.md", week.year(), week.week())
}

/// UTC calendar-day key used for memory object partitioning:
/// `memories/<yyyy>-<mm>-<dd>.jsonl`.
pub fn memory_key(t: DateTime<Utc>) -> String {
    format!("memories/{}.jsonl", t.format("%Y-%m-%d"))
}

/// Closed sentiment set (§9 Open Question 3: pinned as a string enum).
/// Unrecognized values from the Model Adapter are coerced to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Joy,
    Sadness,
    Anger,
    Fear,
    Gratitude,
    Nostalgia,
    Neutral,
    Mixed,
    Unknown,
}

impl Sentiment {
    /// Parses a sentiment string from model output, coercing anything
    /// outside the closed set to `Unknown` rather than failing.
    pub fn coerce(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "joy" => Sentiment::Joy,
            "sadness" => Sentiment::Sadness,
            "anger" => Sentiment::Anger,
            "fear" => Sentiment::Fear,
            "gratitude" => Sentiment::Gratitude,
            "nostalgia" => Sentiment::Nostalgia,
            "neutral" => Sentiment::Neutral,
            "mixed" => Sentiment::Mixed,
            _ => Sentiment::Unknown,
        }
    }
}

/// Maximum number of themes a Memory Record may carry (§3).
pub const MAX_THEMES: usize = 6;
/// Maximum number of people a Memory Record may carry (§3).
pub const MAX_PEOPLE: usize = 8;

/// A single-line JSON record appended to `memories/<yyyy>-<mm>-<dd>.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub sentiment: Sentiment,
    pub themes: Vec<String>,
    pub people: Vec<String>,
    pub significance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl MemoryRecord {
    /// Truncates `themes`/`people` to the §3 maxima; does not otherwise
    /// validate content.
    pub fn truncated(mut self) -> Self {
        self.themes.truncate(MAX_THEMES);
        self.people.truncate(MAX_PEOPLE);
        self
    }
}

/// A single-line JSON record appended to `github/history.jsonl`, the
/// idempotency ledger for the Repository Processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryHistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub transcript_hash: String,
    pub repo_name: String,
    pub repo_url: String,
    pub created: bool,
}

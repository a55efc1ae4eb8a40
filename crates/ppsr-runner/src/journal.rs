//! Per-run record of what each script step did.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Ok,
    Failed,
    Skipped,
}

/// One journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: &'static str,
    pub outcome: StepOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// File name of the screenshot taken for this step, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub elapsed_ms: u64,
}

/// Ordered step records for one run.
#[derive(Debug, Clone)]
pub struct StepJournal {
    started_at: DateTime<Utc>,
    records: Vec<StepRecord>,
}

impl Default for StepJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl StepJournal {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        step: &'static str,
        outcome: StepOutcome,
        detail: Option<String>,
        screenshot: Option<String>,
        elapsed: Duration,
    ) {
        self.records.push(StepRecord {
            step,
            outcome,
            detail,
            screenshot,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// Outcome of the first record for `step`.
    pub fn outcome_of(&self, step: &str) -> Option<StepOutcome> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.outcome)
    }

    /// Trace archive body: the journal plus browser trace events.
    pub fn to_trace_json(&self, request_id: &str, trace_events: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "requestId": request_id,
            "startedAt": self.started_at.to_rfc3339(),
            "finishedAt": Utc::now().to_rfc3339(),
            "steps": self.records,
            "traceEvents": trace_events,
        })
    }
}

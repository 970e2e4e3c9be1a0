//! Cumulative token-usage tracking shared by every [`super::ModelClient`].
//!
//! Ported from `original_source/rlm/clients/cerebras.py`'s per-model usage
//! dict and `get_usage_summary`/`get_last_usage` accessors.

use crate::types::{Usage, UsageSummary};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct UsageTracker {
    summary: Mutex<UsageSummary>,
    last: Mutex<Option<(String, Usage)>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, usage: &Usage) {
        let mut summary = self.summary.lock().unwrap();
        let entry = summary.model_usage.entry(model.to_string()).or_default();
        entry.total_calls += 1;
        entry.total_input_tokens += usage.input_tokens;
        entry.total_output_tokens += usage.output_tokens;

        *self.last.lock().unwrap() = Some((model.to_string(), usage.clone()));
    }

    pub fn summary(&self) -> UsageSummary {
        self.summary.lock().unwrap().clone()
    }

    pub fn last_usage(&self) -> Option<(String, Usage)> {
        self.last.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_summarizes_usage() {
        let tracker = UsageTracker::new();
        tracker.record("gpt-4o", &Usage::new(10, 5));
        tracker.record("gpt-4o", &Usage::new(20, 8));

        let summary = tracker.summary();
        let entry = summary.model_usage.get("gpt-4o").unwrap();
        assert_eq!(entry.total_calls, 2);
        assert_eq!(entry.total_input_tokens, 30);
        assert_eq!(entry.total_output_tokens, 13);
    }

    #[test]
    fn last_usage_tracks_most_recent_call() {
        let tracker = UsageTracker::new();
        tracker.record("gpt-4o", &Usage::new(10, 5));
        tracker.record("claude-3", &Usage::new(1, 1));

        let (model, usage) = tracker.last_usage().unwrap();
        assert_eq!(model, "claude-3");
        assert_eq!(usage.input_tokens, 1);
    }
}

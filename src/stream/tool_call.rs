//! Tool call lifecycle tracking for one streaming turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Name recorded for a tool call that finished without ever being started.
pub const UNKNOWN_TOOL_NAME: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// An assistant-invoked action. Arguments and results are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub status: ToolStatus,
    pub result: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Tool calls of one turn, keyed by id, in first-seen order.
///
/// A call moves from `Running` to a terminal status once; later updates for
/// the same id are ignored.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    calls: Vec<ToolCall>,
    index: HashMap<String, usize>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a started call. A missing id gets a fresh UUID.
    ///
    /// Returns `None` if the id is already known.
    pub fn start(&mut self, id: Option<String>, name: String, arguments: Value) -> Option<&ToolCall> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if self.index.contains_key(&id) {
            tracing::warn!(id = %id, name = %name, "Ignoring duplicate tool_start");
            return None;
        }

        tracing::debug!(id = %id, name = %name, "Tool call started");
        self.push(ToolCall {
            id,
            name,
            arguments,
            status: ToolStatus::Running,
            result: None,
            started_at: Utc::now(),
            ended_at: None,
        })
    }

    /// Move a call to its terminal status. The call is an error iff `error` is present,
    /// in which case the error value becomes its result.
    ///
    /// An id that was never started is recorded under [`UNKNOWN_TOOL_NAME`].
    /// Returns `None` if the call had already finished.
    pub fn finish(&mut self, id: String, result: Option<Value>, error: Option<Value>) -> Option<&ToolCall> {
        let now = Utc::now();
        let (status, result) = match error {
            Some(error) => (ToolStatus::Error, Some(error)),
            None => (ToolStatus::Completed, result),
        };

        let Some(&idx) = self.index.get(&id) else {
            tracing::warn!(id = %id, "tool_end without matching tool_start");
            return self.push(ToolCall {
                id,
                name: UNKNOWN_TOOL_NAME.to_string(),
                arguments: Value::Null,
                status,
                result,
                started_at: now,
                ended_at: Some(now),
            });
        };

        let call = &mut self.calls[idx];
        if call.status.is_terminal() {
            tracing::warn!(id = %id, status = ?call.status, "Ignoring tool_end for finished call");
            return None;
        }

        tracing::debug!(id = %id, name = %call.name, status = ?status, "Tool call finished");
        call.status = status;
        call.result = result;
        call.ended_at = Some(now);
        Some(call)
    }

    pub fn get(&self, id: &str) -> Option<&ToolCall> {
        self.index.get(id).map(|&idx| &self.calls[idx])
    }

    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    pub fn into_calls(self) -> Vec<ToolCall> {
        self.calls
    }

    fn push(&mut self, call: ToolCall) -> Option<&ToolCall> {
        let idx = self.calls.len();
        self.index.insert(call.id.clone(), idx);
        self.calls.push(call);
        self.calls.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_then_complete() {
        let mut tracker = ToolCallTracker::new();
        tracker.start(Some("t1".into()), "get_recipes".into(), json!({"tag": "vegan"}));
        assert_eq!(tracker.get("t1").unwrap().status, ToolStatus::Running);
        assert!(tracker.get("t1").unwrap().ended_at.is_none());

        let call = tracker
            .finish("t1".into(), Some(json!([{"title": "Dal"}])), None)
            .unwrap();
        assert_eq!(call.status, ToolStatus::Completed);
        assert_eq!(call.result, Some(json!([{"title": "Dal"}])));
        assert!(call.ended_at.unwrap() >= call.started_at);
    }

    #[test]
    fn test_error_terminal() {
        let mut tracker = ToolCallTracker::new();
        tracker.start(Some("t1".into()), "add_to_list".into(), json!({}));
        let call = tracker
            .finish("t1".into(), Some(json!("ignored")), Some(json!("x")))
            .unwrap();
        assert_eq!(call.id, "t1");
        assert_eq!(call.status, ToolStatus::Error);
        assert_eq!(call.result, Some(json!("x")));
    }

    #[test]
    fn test_generated_id() {
        let mut tracker = ToolCallTracker::new();
        let a = tracker.start(None, "a".into(), Value::Null).unwrap().id.clone();
        let b = tracker.start(None, "b".into(), Value::Null).unwrap().id.clone();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_unmatched_end_synthesized() {
        let mut tracker = ToolCallTracker::new();
        let call = tracker.finish("ghost".into(), Some(json!(1)), None).unwrap();
        assert_eq!(call.name, UNKNOWN_TOOL_NAME);
        assert_eq!(call.status, ToolStatus::Completed);
        assert_eq!(tracker.calls().len(), 1);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut tracker = ToolCallTracker::new();
        tracker.start(Some("t1".into()), "x".into(), Value::Null);
        tracker.finish("t1".into(), None, Some(json!("boom")));
        assert!(tracker.finish("t1".into(), Some(json!("late")), None).is_none());
        assert!(tracker.start(Some("t1".into()), "again".into(), Value::Null).is_none());

        let call = tracker.get("t1").unwrap();
        assert_eq!(call.status, ToolStatus::Error);
        assert_eq!(call.name, "x");
        assert_eq!(call.result, Some(json!("boom")));
    }

    #[test]
    fn test_order_preserved() {
        let mut tracker = ToolCallTracker::new();
        tracker.start(Some("b".into()), "second".into(), Value::Null);
        tracker.start(Some("a".into()), "first".into(), Value::Null);
        tracker.finish("z".into(), None, None);
        let ids: Vec<_> = tracker.calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["b", "a", "z"]);
    }
}

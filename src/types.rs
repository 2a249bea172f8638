use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::error::FailureKind;

/// A single row returned by one graph query execution.
///
/// Columns keep the order the store returned them in (query-dependent shape,
/// no fixed schema). Immutable once constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord(Map<String, Value>);

impl GraphRecord {
    pub fn new(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    /// Build a record from (column, value) pairs, preserving their order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self(pairs.into_iter().collect())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.0.get(column).and_then(Value::as_i64)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Kind of graph element a citation points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    Node,
    Relationship,
}

/// Reference to a specific graph element backing an analytical conclusion.
///
/// Identifies the element and carries the property values that justified it;
/// never owns the underlying graph data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub kind: CitationKind,
    pub element_id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

impl Citation {
    pub fn node(element_id: impl Into<String>) -> Self {
        Self {
            kind: CitationKind::Node,
            element_id: element_id.into(),
            properties: Map::new(),
        }
    }

    pub fn relationship(element_id: impl Into<String>) -> Self {
        Self {
            kind: CitationKind::Relationship,
            element_id: element_id.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A tool invocation requested by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Structured UI payload emitted by successful tools.
///
/// Headers are listed in first-seen column order so tables render the way
/// the query shaped them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renderable {
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl Renderable {
    /// Build a table block from query records.
    pub fn table(title: impl Into<String>, records: &[GraphRecord]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for record in records {
            for column in record.columns() {
                if !headers.iter().any(|h| h == column) {
                    headers.push(column.to_string());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                headers
                    .iter()
                    .map(|header| record.get(header).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self {
            content_type: "table".to_string(),
            title: Some(title.into()),
            headers,
            rows,
            context: Map::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Outcome of a dispatched tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        payload: Value,
        citations: Vec<Citation>,
        #[serde(skip_serializing_if = "Option::is_none")]
        renderable: Option<Renderable>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

/// A completed tool call with its outcome and wall-clock cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call: ToolCall,
    pub outcome: ToolOutcome,
    pub elapsed: Duration,
}

impl ToolResult {
    pub fn success(
        call: ToolCall,
        payload: Value,
        citations: Vec<Citation>,
        renderable: Option<Renderable>,
        elapsed: Duration,
    ) -> Self {
        Self {
            call,
            outcome: ToolOutcome::Success {
                payload,
                citations,
                renderable,
            },
            elapsed,
        }
    }

    pub fn failure(
        call: ToolCall,
        kind: FailureKind,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            call,
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn citations(&self) -> &[Citation] {
        match &self.outcome {
            ToolOutcome::Success { citations, .. } => citations,
            ToolOutcome::Failure { .. } => &[],
        }
    }
}

/// One entry in the session trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    UserTurn { text: String },
    Reasoning { text: String },
    Tool { result: ToolResult },
}

/// Ordered conversation trace owned by a single reasoning-loop run.
///
/// Discarded at session end; there is no cross-session persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<TraceEvent>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_id: format!("session-{}", Uuid::new_v4()),
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.events.push(TraceEvent::UserTurn { text: text.into() });
    }

    pub fn push_reasoning(&mut self, text: impl Into<String>) {
        self.events.push(TraceEvent::Reasoning { text: text.into() });
    }

    pub fn push_tool(&mut self, result: ToolResult) {
        self.events.push(TraceEvent::Tool { result });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.events.iter().filter_map(|event| match event {
            TraceEvent::Tool { result } => Some(result),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

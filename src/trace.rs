//! Agent execution traces and the query extractor.
//!
//! A trace is the ordered list of steps an agent took while answering one
//! question. Steps come from a model we do not control, so their shape is
//! not guaranteed: [`TraceStep::Unrecognized`] keeps anything that does
//! not look like a tool call, and [`extract_query`] simply walks past it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool name the agent uses to run SQL against the catalog.
pub const SQL_QUERY_TOOL: &str = "sql_db_query";

/// One tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(default)]
    pub tool: Option<String>,
    /// Arguments as sent by the model. Usually an object, but a model that
    /// emits broken JSON leaves the raw text here as a string.
    #[serde(default)]
    pub tool_input: Value,
    /// Free-form reasoning text attached to the call, if any.
    #[serde(default)]
    pub log: String,
}

impl AgentAction {
    pub fn new(tool: impl Into<String>, tool_input: Value) -> Self {
        Self {
            tool: Some(tool.into()),
            tool_input,
            log: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceStep {
    ToolCall {
        action: AgentAction,
        observation: String,
    },
    Unrecognized {
        raw: Value,
    },
}

impl TraceStep {
    pub fn tool_call(action: AgentAction, observation: impl Into<String>) -> Self {
        TraceStep::ToolCall {
            action,
            observation: observation.into(),
        }
    }

    /// Interpret a loosely shaped JSON step.
    ///
    /// Accepts this crate's own tagged form, an `{"action": .., "observation": ..}`
    /// object, or an `[action, observation]` pair. Anything else, including
    /// an action that is not an object, becomes [`TraceStep::Unrecognized`].
    pub fn from_json(value: Value) -> Self {
        if let Ok(step) = serde_json::from_value::<TraceStep>(value.clone()) {
            return step;
        }

        let parts = match &value {
            Value::Object(map) => map
                .get("action")
                .map(|action| (action, map.get("observation"))),
            Value::Array(items) if !items.is_empty() => Some((&items[0], items.get(1))),
            _ => None,
        };

        let Some((Value::Object(action), observation)) = parts else {
            return TraceStep::Unrecognized { raw: value };
        };

        TraceStep::ToolCall {
            action: action_from_map(action),
            observation: observation.map(observation_text).unwrap_or_default(),
        }
    }

    pub fn action(&self) -> Option<&AgentAction> {
        match self {
            TraceStep::ToolCall { action, .. } => Some(action),
            TraceStep::Unrecognized { .. } => None,
        }
    }
}

pub type AgentTrace = Vec<TraceStep>;

/// Parse a whole trace from JSON; a non-array value yields an empty trace.
pub fn trace_from_json(value: Value) -> AgentTrace {
    match value {
        Value::Array(steps) => steps.into_iter().map(TraceStep::from_json).collect(),
        _ => Vec::new(),
    }
}

/// Return the `query` argument of the first step that called `tool_name`.
///
/// Steps are scanned in order and the earliest match wins, even if the
/// agent later ran a different statement. Steps without an action, without
/// a tool name, or whose input has no string `query` key are skipped.
pub fn extract_query(trace: &[TraceStep], tool_name: &str) -> Option<String> {
    trace
        .iter()
        .filter_map(TraceStep::action)
        .filter(|action| action.tool.as_deref() == Some(tool_name))
        .find_map(|action| {
            action
                .tool_input
                .as_object()
                .and_then(|input| input.get("query"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

fn action_from_map(map: &Map<String, Value>) -> AgentAction {
    let tool = map.get("tool").and_then(Value::as_str).map(str::to_string);
    let tool_input = map.get("tool_input").cloned().unwrap_or(Value::Null);
    let log = map
        .get("log")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    AgentAction {
        tool,
        tool_input,
        log,
    }
}

fn observation_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

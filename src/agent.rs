//! The agent capability.
//!
//! Everything model-specific lives behind [`AgentCapability`]: given a
//! question, the catalog schema, and a step budget, an implementation
//! returns the steps it took and either a final answer or a failure. It
//! never returns a bare `Err`, because the trace gathered before a failure
//! is still worth inspecting.
//!
//! | Config Value | Capability |
//! |--------------|------------|
//! | `"disabled"` | [`DisabledAgent`] |
//! | `"openai"` | [`OpenAiSqlAgent`] against `{endpoint}/chat/completions` |
//! | `"azure"` | [`OpenAiSqlAgent`] against an Azure OpenAI deployment |

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{AgentConfig, Config};
use crate::error::AgentInvocationError;
use crate::toolkit::SqlToolkit;
use crate::trace::{AgentAction, AgentTrace, TraceStep};

/// Everything the agent is given for one question.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub question: String,
    /// Schema description with sample rows.
    pub schema: String,
    /// Maximum number of model round-trips.
    pub tool_budget: usize,
    /// Fixed system instructions.
    pub instructions: String,
}

#[derive(Debug)]
pub struct AgentFailure {
    pub error: AgentInvocationError,
    /// Text the model produced before failing, if any.
    pub partial_answer: Option<String>,
}

/// What came back from one invocation.
#[derive(Debug)]
pub struct AgentRun {
    pub trace: AgentTrace,
    pub outcome: Result<String, AgentFailure>,
}

impl AgentRun {
    pub fn answered(trace: AgentTrace, answer: impl Into<String>) -> Self {
        Self {
            trace,
            outcome: Ok(answer.into()),
        }
    }

    pub fn failed(
        trace: AgentTrace,
        error: AgentInvocationError,
        partial_answer: Option<String>,
    ) -> Self {
        Self {
            trace,
            outcome: Err(AgentFailure {
                error,
                partial_answer,
            }),
        }
    }
}

#[async_trait]
pub trait AgentCapability: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn invoke(&self, request: &AgentRequest) -> AgentRun;
}

/// Build the capability selected by `agent.provider`.
///
/// Credentials are read when a question is asked, not here, so a missing
/// key degrades answers instead of preventing startup.
pub async fn create_agent(
    config: &Config,
) -> Result<Box<dyn AgentCapability>, AgentInvocationError> {
    match config.agent.provider.as_str() {
        "openai" | "azure" => {
            let toolkit = SqlToolkit::open(config).await?;
            Ok(Box::new(OpenAiSqlAgent::new(&config.agent, toolkit)?))
        }
        _ => Ok(Box::new(DisabledAgent)),
    }
}

// ============ Disabled ============

/// Used when `agent.provider = "disabled"`. Every question fails.
pub struct DisabledAgent;

#[async_trait]
impl AgentCapability for DisabledAgent {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn invoke(&self, _request: &AgentRequest) -> AgentRun {
        AgentRun::failed(Vec::new(), AgentInvocationError::Disabled, None)
    }
}

// ============ OpenAI-compatible ============

/// Tool-calling loop over an OpenAI-compatible chat-completions endpoint.
///
/// Each round-trip either requests tool calls, which are executed through
/// the [`SqlToolkit`] and recorded as trace steps, or carries the final
/// answer. Tool errors and unparsable tool arguments are sent back to the
/// model as observations so it can correct itself.
pub struct OpenAiSqlAgent {
    client: reqwest::Client,
    url: String,
    azure: bool,
    model: String,
    temperature: f32,
    api_key_env: String,
    toolkit: SqlToolkit,
}

impl OpenAiSqlAgent {
    pub fn new(config: &AgentConfig, toolkit: SqlToolkit) -> Result<Self, AgentInvocationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let endpoint = config.endpoint.trim_end_matches('/');
        let azure = config.provider == "azure";
        let url = if azure {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, config.model, config.api_version
            )
        } else {
            format!("{}/chat/completions", endpoint)
        };

        Ok(Self {
            client,
            url,
            azure,
            model: config.model.clone(),
            temperature: config.temperature,
            api_key_env: config.api_key_env.clone(),
            toolkit,
        })
    }

    async fn complete(&self, api_key: &str, messages: &[Value]) -> Result<Value, AgentInvocationError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "tools": self.toolkit.definitions(),
            "temperature": self.temperature,
        });

        let request = self.client.post(&self.url).json(&body);
        let request = if self.azure {
            request.header("api-key", api_key)
        } else {
            request.bearer_auth(api_key)
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentInvocationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response.json().await?;
        json.pointer("/choices/0/message")
            .cloned()
            .ok_or_else(|| {
                AgentInvocationError::MalformedResponse("missing choices[0].message".to_string())
            })
    }

    async fn run_tool_call(&self, call: &Value, log: &str) -> (TraceStep, Value) {
        let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
        let name = call.pointer("/function/name").and_then(Value::as_str);
        let raw_args = call
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .unwrap_or("{}");

        let (tool_input, observation) = match (name, serde_json::from_str::<Value>(raw_args)) {
            (None, parsed) => (
                parsed.unwrap_or_else(|_| Value::String(raw_args.to_string())),
                "Error: tool call without a function name".to_string(),
            ),
            (Some(_), Err(e)) => (
                Value::String(raw_args.to_string()),
                format!("Error: could not parse tool arguments as JSON: {}", e),
            ),
            (Some(name), Ok(input)) => {
                let observation = self.toolkit.call(name, &input).await;
                (input, observation)
            }
        };

        tracing::debug!(tool = name.unwrap_or("<none>"), "agent tool call");

        let reply = json!({
            "role": "tool",
            "tool_call_id": id,
            "content": observation,
        });
        let action = AgentAction {
            tool: name.map(str::to_string),
            tool_input,
            log: log.to_string(),
        };
        (TraceStep::tool_call(action, observation), reply)
    }
}

#[async_trait]
impl AgentCapability for OpenAiSqlAgent {
    fn name(&self) -> &str {
        if self.azure {
            "azure"
        } else {
            "openai"
        }
    }

    async fn invoke(&self, request: &AgentRequest) -> AgentRun {
        let mut trace = AgentTrace::new();

        let api_key = match std::env::var(&self.api_key_env) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                return AgentRun::failed(
                    trace,
                    AgentInvocationError::MissingCredential(self.api_key_env.clone()),
                    None,
                )
            }
        };

        let mut messages = vec![
            json!({
                "role": "system",
                "content": format!("{}\n\n{}", request.instructions, request.schema),
            }),
            json!({ "role": "user", "content": request.question }),
        ];
        let mut partial: Option<String> = None;

        for _ in 0..request.tool_budget {
            let message = match self.complete(&api_key, &messages).await {
                Ok(message) => message,
                Err(error) => return AgentRun::failed(trace, error, partial),
            };

            let content = message
                .get("content")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            let calls = message
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if calls.is_empty() {
                return match content {
                    Some(answer) => AgentRun::answered(trace, answer),
                    None => AgentRun::failed(
                        trace,
                        AgentInvocationError::MalformedResponse(
                            "message has neither content nor tool calls".to_string(),
                        ),
                        partial,
                    ),
                };
            }

            messages.push(message.clone());
            let log = content.as_deref().unwrap_or_default();
            for call in &calls {
                let (step, reply) = self.run_tool_call(call, log).await;
                trace.push(step);
                messages.push(reply);
            }
            if content.is_some() {
                partial = content;
            }
        }

        AgentRun::failed(
            trace,
            AgentInvocationError::BudgetExhausted(request.tool_budget),
            partial,
        )
    }
}

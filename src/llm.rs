//! Talking to the language model.
//!
//! The model sees the whole conversation each turn and answers either with
//! text (a candidate changelog) or with a request to call the history tool.
//! That choice is surfaced as an explicit [`Reply`] so the session can
//! dispatch on it.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::config::ModelSettings;

/// Name of the tool that re-reads commit history.
pub const HISTORY_TOOL: &str = "get_commits_and_tags";

/// Generous timeout: large models can take minutes to answer.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// One turn of the conversation, in chat-completions wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls: calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Decode the arguments of a [`HISTORY_TOOL`] call.
    pub fn history_args(&self) -> Result<HistoryToolArgs, serde_json::Error> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(HistoryToolArgs::default());
        }
        serde_json::from_str(raw)
    }
}

/// Arguments of the history tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct HistoryToolArgs {
    /// Commit hash to read history from instead of the branch head
    #[serde(default)]
    pub start: Option<String>,
}

/// What the model answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The model wants history fetched before it continues
    ToolRequest(Vec<ToolCall>),

    /// Plain text; empty when the model produced nothing usable
    Text(String),
}

/// Produces changelog text from a conversation.
pub trait Summarizer {
    fn respond(&self, conversation: &[Message]) -> impl Future<Output = Result<Reply, SummarizerError>>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletions {
    client: Client,
    settings: ModelSettings,
}

impl std::fmt::Debug for ChatCompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletions")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletions {
    pub fn new(settings: ModelSettings) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(SummarizerError::Client)?;
        Ok(Self { client, settings })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

impl Summarizer for ChatCompletions {
    async fn respond(&self, conversation: &[Message]) -> Result<Reply, SummarizerError> {
        let url = self.url();
        let payload = json!({
            "model": self.settings.model,
            "messages": conversation,
            "tools": [history_tool_definition()],
            "temperature": self.settings.temperature,
        });
        debug!(%url, model = %self.settings.model, turns = conversation.len(), "calling model");

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|source| SummarizerError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response.json().await.map_err(SummarizerError::Decode)?;
        let message = completion
            .choices
            .into_iter()
            .next()
            .ok_or(SummarizerError::EmptyResponse)?
            .message;

        Ok(message.into_reply())
    }
}

/// The `tools` entry describing [`HISTORY_TOOL`].
pub fn history_tool_definition() -> Value {
    let mut parameters = serde_json::to_value(schemars::schema_for!(HistoryToolArgs))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    if let Some(object) = parameters.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
    }

    json!({
        "type": "function",
        "function": {
            "name": HISTORY_TOOL,
            "description": "List commits of the main branch, newest first, with their SHA, \
                            message, timestamp and tag (if any), narrowed to the commits \
                            of the release being described.",
            "parameters": parameters,
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

impl ResponseMessage {
    fn into_reply(self) -> Reply {
        match self.tool_calls {
            Some(calls) if !calls.is_empty() => Reply::ToolRequest(calls),
            _ => Reply::Text(self.content.unwrap_or_default()),
        }
    }
}

/// Errors from the model endpoint.
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode model response")]
    Decode(#[source] reqwest::Error),

    #[error("model response contained no choices")]
    EmptyResponse,
}

//! One changelog run, from fetching history to the reviewer's verdict.

use std::io;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::history::{HistoryError, HistorySource};
use crate::llm::{HISTORY_TOOL, Message, Reply, Summarizer, SummarizerError, ToolCall};
use crate::prompt;
use crate::review::{self, DecisionSource, Phase, ReviewState, Verdict};
use crate::window::{SelectionError, SelectionPolicy, select_window};

/// How a run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The reviewer accepted this changelog
    Accepted(String),

    /// The reviewer quit; nothing is output
    Aborted,

    /// There was nothing to summarize
    NotGenerated(SelectionError),
}

/// Drives history, window selection, the model and the reviewer.
pub struct Session<H, S, D> {
    history: H,
    summarizer: S,
    decisions: D,
    policy: SelectionPolicy,
    start: Option<String>,
    language: String,
    max_steps: usize,
    steps: usize,
    conversation: Vec<Message>,
}

impl<H, S, D> Session<H, S, D>
where
    H: HistorySource,
    S: Summarizer,
    D: DecisionSource,
{
    pub fn new(config: &Config, history: H, summarizer: S, decisions: D) -> Self {
        Self {
            history,
            summarizer,
            decisions,
            policy: config.selection,
            start: config.history.start.clone(),
            language: config.session.language.clone(),
            max_steps: config.session.max_steps,
            steps: 0,
            conversation: Vec::new(),
        }
    }

    /// Run to completion.
    pub async fn run(mut self) -> Result<Outcome, SessionError> {
        let commits = self
            .history
            .fetch(self.start.as_deref())
            .await
            .map_err(SessionError::Fetch)?;
        info!(commits = commits.len(), "fetched history");

        let window = match select_window(&commits, &self.policy) {
            Ok(window) => window,
            Err(reason) => {
                warn!(%reason, "nothing to summarize");
                return Ok(Outcome::NotGenerated(reason));
            }
        };
        info!(
            last = window.last().short_sha(),
            subject = window.last().subject(),
            first = window.first().short_sha(),
            commits = window.commits().len(),
            "selected release window"
        );

        self.conversation = vec![
            Message::system(prompt::system_prompt(&self.language)),
            Message::user(prompt::initial_request(&window, &self.language)),
        ];

        let mut state = ReviewState::default();
        let mut phase = Phase::Generating;
        loop {
            phase = match phase {
                Phase::Generating => {
                    let text = self.generate(&mut state).await?;
                    state.record_generation(text)
                }
                Phase::AwaitingReview => review::review(&mut state, &mut self.decisions)?,
                Phase::Done(Verdict::Accepted) => return Ok(Outcome::Accepted(state.changelog)),
                Phase::Done(Verdict::Aborted) => return Ok(Outcome::Aborted),
            };
            debug!(?phase, "review phase");
        }
    }

    /// Ask the model for a changelog, serving tool requests along the way.
    ///
    /// Returns the reply text, which is empty when the model said nothing.
    async fn generate(&mut self, state: &mut ReviewState) -> Result<String, SessionError> {
        if let Some(followup) = state.take_followup() {
            self.conversation.push(Message::user(followup));
        }

        loop {
            self.count_step()?;
            match self.summarizer.respond(&self.conversation).await? {
                Reply::ToolRequest(calls) => {
                    self.conversation.push(Message::tool_calls(calls.clone()));
                    for call in calls {
                        self.count_step()?;
                        let result = self.call_tool(&call).await;
                        self.conversation.push(Message::tool_result(call.id, result));
                    }
                }
                Reply::Text(text) if text.trim().is_empty() => {
                    warn!("model returned no text");
                    self.conversation.push(Message::user(prompt::EMPTY_REPLY_NUDGE));
                    return Ok(text);
                }
                Reply::Text(text) => {
                    self.conversation.push(Message::assistant(text.clone()));
                    return Ok(text);
                }
            }
        }
    }

    /// Serve one tool call; failures are reported to the model as text.
    async fn call_tool(&self, call: &ToolCall) -> String {
        if call.function.name != HISTORY_TOOL {
            warn!(tool = %call.function.name, "model requested an unknown tool");
            return format!("Unknown tool '{}'", call.function.name);
        }

        let args = match call.history_args() {
            Ok(args) => args,
            Err(e) => return format!("Invalid arguments for {HISTORY_TOOL}: {e}"),
        };
        let start = args.start.as_deref().or(self.start.as_deref());
        debug!(?start, "model requested history");

        match self.history.fetch(start).await {
            Ok(commits) => match select_window(&commits, &self.policy) {
                Ok(window) => prompt::render_window(&window),
                Err(reason) => reason.to_string(),
            },
            Err(e) => format!("Error fetching commits: {}", e.describe()),
        }
    }

    fn count_step(&mut self) -> Result<(), SessionError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(SessionError::StepLimitExceeded {
                limit: self.max_steps,
            });
        }
        Ok(())
    }
}

/// Errors that end a run without a changelog.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to fetch commit history")]
    Fetch(#[source] HistoryError),

    #[error("changelog generation did not complete: more than {limit} model and tool calls")]
    StepLimitExceeded { limit: usize },

    #[error("language model call failed")]
    Summarizer(#[from] SummarizerError),

    #[error("failed to read reviewer input")]
    Input(#[from] io::Error),
}

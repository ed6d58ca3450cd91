//! relnotes: draft release changelogs from tagged git history.
//!
//! relnotes reads the commit history of a repository, narrows it to the
//! commits of the latest release, asks a language model to write a
//! categorized changelog for them, and keeps revising it with a human
//! reviewer until the reviewer accepts it.
//!
//! # Architecture
//!
//! - **History**: Fetch commits and tags from GitHub or a local checkout
//! - **Window**: Select the commits between the latest release and the start of its line
//! - **LLM**: Chat with an OpenAI-compatible model that may ask for history itself
//! - **Review**: The accept / edit / regenerate / quit state machine
//! - **Session**: Wire the above into one run

pub mod commit;
pub mod config;
pub mod git;
pub mod github;
pub mod history;
pub mod llm;
pub mod prompt;
pub mod review;
pub mod session;
pub mod window;

pub use commit::{Commit, Version};
pub use config::{Config, ConfigError};
pub use history::{HistoryError, HistoryProvider, HistorySource};
pub use llm::{ChatCompletions, Reply, Summarizer};
pub use review::{Console, DecisionSource, ReviewState};
pub use session::{Outcome, Session, SessionError};
pub use window::{CommitWindow, SelectionError, SelectionPolicy, select_window};

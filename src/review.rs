//! Human review of a generated changelog.
//!
//! The review loop is a small state machine:
//!
//! ```text
//!   Generating --(text)--> AwaitingReview --accept--> Done(Accepted)
//!       ^                       |   |
//!       +----edit / regenerate--+   +--quit--> Done(Aborted)
//! ```
//!
//! Generating belongs to the session (it owns the model); this module owns
//! the state, the transitions, and reading decisions from a
//! [`DecisionSource`].

use std::io::{self, BufRead, Write};

use crossterm::style::Stylize;

use crate::prompt;

/// Mutable state of one review session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewState {
    /// Latest generated changelog; empty until the first generation
    pub changelog: String,

    /// Whether the next step is human review rather than another model call
    pub needs_review: bool,

    /// Reviewer corrections not yet sent to the model
    pub pending_correction: Option<String>,

    regenerate_requested: bool,
}

/// Where the review loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Generating,
    AwaitingReview,
    Done(Verdict),
}

/// How a review ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Aborted,
}

/// A reviewer's response to a changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Edit with the correction text the reviewer typed (possibly empty)
    Edit(String),
    Regenerate,
    Quit,
    /// Anything that is not one of the choices above
    Unknown(String),
}

impl Decision {
    /// Interpret a typed choice. Case-insensitive; `a`/`e`/`r`/`q` are shorthands.
    ///
    /// `Edit` comes back with an empty correction; the caller reads it separately.
    pub fn parse(input: &str) -> Self {
        let token = input.trim();
        match token.to_ascii_lowercase().as_str() {
            "accept" | "a" => Self::Accept,
            "edit" | "e" => Self::Edit(String::new()),
            "regenerate" | "r" => Self::Regenerate,
            "quit" | "q" => Self::Quit,
            _ => Self::Unknown(token.to_string()),
        }
    }
}

impl ReviewState {
    /// Record the model's output. Empty text keeps the loop generating.
    pub fn record_generation(&mut self, text: String) -> Phase {
        if text.trim().is_empty() {
            return Phase::Generating;
        }
        self.changelog = text;
        self.needs_review = true;
        Phase::AwaitingReview
    }

    /// Apply a reviewer decision made while awaiting review.
    pub fn apply(&mut self, decision: Decision) -> Phase {
        match decision {
            Decision::Accept => Phase::Done(Verdict::Accepted),
            Decision::Quit => Phase::Done(Verdict::Aborted),
            Decision::Edit(correction) if correction.trim().is_empty() => Phase::AwaitingReview,
            Decision::Edit(correction) => {
                self.pending_correction = Some(correction);
                self.needs_review = false;
                Phase::Generating
            }
            Decision::Regenerate => {
                self.regenerate_requested = true;
                self.needs_review = false;
                Phase::Generating
            }
            Decision::Unknown(_) => Phase::AwaitingReview,
        }
    }

    /// The user turn to send before the next generation, if any.
    ///
    /// Clears the pending correction or regenerate request it was built from.
    pub fn take_followup(&mut self) -> Option<String> {
        if let Some(correction) = self.pending_correction.take() {
            self.regenerate_requested = false;
            return Some(prompt::correction_request(&correction));
        }
        if std::mem::take(&mut self.regenerate_requested) {
            return Some(prompt::REGENERATE_INSTRUCTION.to_string());
        }
        None
    }
}

/// Supplies reviewer input.
pub trait DecisionSource {
    /// Present `changelog` and read one choice. `None` at end of input.
    fn decide(&mut self, changelog: &str) -> io::Result<Option<String>>;

    /// Read correction text: several lines, ended by an empty line.
    fn correction(&mut self) -> io::Result<String>;

    /// Tell the reviewer their input was not accepted.
    fn reject(&mut self, reason: &str) -> io::Result<()>;
}

/// Read one decision, including the correction text for `edit`.
///
/// End of input counts as `quit`.
pub fn read_decision<D: DecisionSource>(source: &mut D, changelog: &str) -> io::Result<Decision> {
    let Some(input) = source.decide(changelog)? else {
        return Ok(Decision::Quit);
    };
    Ok(match Decision::parse(&input) {
        Decision::Edit(_) => Decision::Edit(source.correction()?),
        decision => decision,
    })
}

/// Run review until the state leaves [`Phase::AwaitingReview`].
pub fn review<D: DecisionSource>(state: &mut ReviewState, source: &mut D) -> io::Result<Phase> {
    loop {
        let decision = read_decision(source, &state.changelog)?;
        match &decision {
            Decision::Unknown(input) => {
                source.reject(&format!("'{input}' is not one of accept, edit, regenerate, quit"))?
            }
            Decision::Edit(correction) if correction.trim().is_empty() => {
                source.reject("the correction is empty")?
            }
            _ => {}
        }

        match state.apply(decision) {
            Phase::AwaitingReview => continue,
            next => return Ok(next),
        }
    }
}

/// Line-oriented reviewer console: prompts on `output`, answers from `input`.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stderr> {
    /// Read from stdin and prompt on stderr, leaving stdout for the result.
    pub fn terminal() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl<R: BufRead, W: Write> DecisionSource for Console<R, W> {
    fn decide(&mut self, changelog: &str) -> io::Result<Option<String>> {
        writeln!(self.output, "\n{}\n", "Generated changelog:".bold())?;
        writeln!(self.output, "{changelog}\n")?;
        write!(
            self.output,
            "{} ",
            "[a]ccept, [e]dit, [r]egenerate or [q]uit?".cyan()
        )?;
        self.output.flush()?;
        self.read_line()
    }

    fn correction(&mut self) -> io::Result<String> {
        writeln!(
            self.output,
            "{}",
            "Describe the corrections (finish with an empty line):".cyan()
        )?;
        self.output.flush()?;

        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    fn reject(&mut self, reason: &str) -> io::Result<()> {
        writeln!(self.output, "{}", reason.yellow())
    }
}

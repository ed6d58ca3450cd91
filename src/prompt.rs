//! Text sent to the language model.

use crate::window::CommitWindow;

/// Instruction appended when the reviewer asks for another attempt.
pub const REGENERATE_INSTRUCTION: &str = "Regenerate the changelog with improvements.";

/// Sent after a reply that contained no text.
pub const EMPTY_REPLY_NUDGE: &str =
    "Your last reply was empty. Respond with the complete changelog text.";

/// The changelog-writing instructions, with a `{language}` placeholder.
#[must_use]
pub fn instructions() -> &'static str {
    include_str!("prompt.md")
}

/// The system prompt framing the model's role.
pub fn system_prompt(language: &str) -> String {
    format!(
        "You are an expert at working with git repositories.\n\
         You analyze commits and tags expertly.\n\
         You write changelog text from commits and tags in {language}.\n"
    )
}

/// The first user turn: instructions followed by the commit window.
pub fn initial_request(window: &CommitWindow, language: &str) -> String {
    let mut text = instructions().replace("{language}", language);
    text.push_str("\nCommits:\n\n");
    text.push_str(&render_window(window));
    text
}

/// Ask for the current changelog to be rewritten with the reviewer's corrections.
pub fn correction_request(correction: &str) -> String {
    format!(
        "Apply the following corrections to the changelog and output the full \
         corrected changelog:\n\n{correction}"
    )
}

/// Render commits as a markdown list, newest first.
pub fn render_window(window: &CommitWindow) -> String {
    let mut out = String::new();
    if let Some(release) = window.release() {
        out.push_str(&format!("Release: {release}\n"));
    }
    for commit in window.commits() {
        out.push_str(&format!(
            "- {} ({})",
            commit.sha,
            commit.date.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(tag) = &commit.tag {
            out.push_str(&format!(" [tag: {tag}]"));
        }
        out.push('\n');
        for line in commit.message.lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }
    out
}

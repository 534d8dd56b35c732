//! Prompt text shared by every backend.

/// System instruction sent alongside every diff.
pub const SYSTEM_PROMPT: &str = "You write git commit messages. \
Given a diff, reply with a single commit message in the Conventional Commits format: \
a summary line of at most 72 characters, a blank line, then an optional body \
explaining what changed and why. Reply with the commit message only, \
without code fences or commentary.";

/// User turn carrying the diff. The diff is embedded verbatim.
pub fn user_prompt(diff: &str) -> String {
    format!("Write a commit message for this diff:\n\n{diff}")
}

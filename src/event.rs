//! Parses a hosting-platform webhook JSON payload and routes a recognized
//! comment command to the PR-split or rebase orchestrator.

use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::platform;
use crate::rebase;
use crate::split;
use crate::upstream::Registry;

#[derive(Debug, Deserialize)]
struct IssueCommentEvent {
    action: String,
    issue: IssueRef,
    comment: CommentRef,
}

#[derive(Debug, Deserialize)]
struct IssueRef {
    number: u64,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CommentRef {
    body: String,
}

enum Command<'a> {
    Split { pr: u64, rest: &'a str },
    Rebase { pr: u64 },
    Unknown { pr: u64, token: String },
}

fn parse_command<'a>(pr: u64, bot_command_prefix: &str, first_line: &'a str) -> Option<Command<'a>> {
    let rest = first_line.trim().strip_prefix(bot_command_prefix)?.trim();
    let (token, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match token {
        "split" => Some(Command::Split { pr, rest: tail.trim() }),
        "rebase" => Some(Command::Rebase { pr }),
        "" => None,
        other => Some(Command::Unknown {
            pr,
            token: other.to_string(),
        }),
    }
}

/// Read and dispatch a webhook payload at `event_path`. Any event shape that
/// isn't an issue-comment on a pull request, or whose first line doesn't
/// match the bot's command prefix, is a silent no-op.
///
/// A recognized command that fails still returns `Ok(())`: the failure is
/// already surfaced as a PR comment by the command handler, and one bad
/// webhook delivery must not fail the process (there's no retry path for a
/// webhook the way there is for a scheduled sync).
pub fn handle_event(dry_run: bool, cfg: &Config, registry: &Registry, event_path: &Path) -> Result<()> {
    if bot_created_pr_or_issue_closed(cfg, event_path)? {
        info!("bot-labeled PR or issue was closed; nothing to reconcile outside it, no-op");
        return Ok(());
    }

    let raw = fs::read_to_string(event_path)?;
    let event: IssueCommentEvent = match serde_json::from_str(&raw) {
        Ok(e) => e,
        Err(_) => {
            info!("event payload is not an issue-comment event; no-op");
            return Ok(());
        }
    };

    if event.action != "created" || event.issue.pull_request.is_none() {
        return Ok(());
    }

    let first_line = event.comment.body.lines().next().unwrap_or("");
    let result = match parse_command(event.issue.number, &cfg.bot_command_prefix, first_line) {
        None => return Ok(()),
        Some(Command::Split { pr, rest }) => split::run_split(dry_run, cfg, registry, pr, rest),
        Some(Command::Rebase { pr }) => rebase::run_rebase(dry_run, cfg, registry, pr),
        Some(Command::Unknown { pr, token }) => platform::comment(
            dry_run,
            pr,
            &format!("Unknown command `{token}`. Supported: `split <sha7>-<sha7>`, `rebase`."),
        ),
    };
    if let Err(e) = result {
        warn!("comment command failed: {:#}", e);
    }
    Ok(())
}

/// Checks whether this event is a PR-close event for a bot-created PR or
/// issue, gated on `GITHUB_EVENT_NAME == "pull_request_target"`.
///
/// Informs whether closing logic (e.g. abandoning in-flight conflict
/// tracking for a PR the user closed by hand) should run at all.
pub fn bot_created_pr_or_issue_closed(cfg: &Config, event_path: &Path) -> Result<bool> {
    if std::env::var("GITHUB_EVENT_NAME").as_deref() != Ok("pull_request_target") {
        return Ok(false);
    }
    let raw = fs::read_to_string(event_path)?;
    let v: serde_json::Value = serde_json::from_str(&raw)?;
    if v["action"].as_str() != Some("closed") {
        return Ok(false);
    }
    let labels = v["pull_request"]["labels"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    Ok(labels
        .iter()
        .any(|l| l["name"].as_str() == Some(cfg.bot_label.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_split_command() {
        match parse_command(5, "#linecook", "#linecook split abc1234-def5678") {
            Some(Command::Split { pr, rest }) => {
                assert_eq!(pr, 5);
                assert_eq!(rest, "abc1234-def5678");
            }
            _ => panic!("expected split command"),
        }
    }

    #[test]
    fn parses_rebase_command() {
        match parse_command(5, "#linecook", "#linecook rebase") {
            Some(Command::Rebase { pr }) => assert_eq!(pr, 5),
            _ => panic!("expected rebase command"),
        }
    }

    #[test]
    fn ignores_comments_without_prefix() {
        assert!(parse_command(5, "#linecook", "just a regular comment").is_none());
    }

    #[test]
    fn unknown_token_is_reported_not_ignored() {
        match parse_command(5, "#linecook", "#linecook frobnicate") {
            Some(Command::Unknown { token, .. }) => assert_eq!(token, "frobnicate"),
            _ => panic!("expected unknown command"),
        }
    }
}

//! Restricts a cherry-picked change to the current upstream's in-scope paths
//! and commits (or drops) the result.
//!
//! Runs immediately after a cherry-pick succeeds, or after the conflict
//! handler resolves every conflict auto-resolvably.

use anyhow::{Context, Result};

use crate::classifier;
use crate::trailer::extract_trailers;
use crate::upstream::{Registry, Upstream};
use crate::vcs;

pub enum FilterOutcome {
    /// Nothing in-scope survived; the cherry-pick was dropped.
    NoOp,
    /// A new commit carrying the provenance trailer was created.
    Applied,
}

fn status_paths(dry_run: bool) -> Result<Vec<String>> {
    let out = vcs::strict(dry_run, ["status", "--porcelain"].as_slice())?;
    Ok(out
        .lines()
        .filter_map(|line| line.get(3..).map(|p| p.trim().to_string()))
        .filter(|p| !p.is_empty())
        .collect())
}

/// Reduce the currently-staged (and unstaged) change so only paths in scope
/// for `upstream` remain staged, then commit with the provenance trailer
/// appended. Returns [`FilterOutcome::NoOp`] (and aborts the cherry-pick)
/// when nothing in-scope survives.
pub fn filter_and_commit(
    dry_run: bool,
    registry: &Registry,
    upstream: &Upstream,
    upstream_sha: &str,
    original_message: &str,
    fallback_tip: &str,
) -> Result<FilterOutcome> {
    vcs::strict(dry_run, ["reset"].as_slice())?;

    let paths = status_paths(dry_run)?;
    let in_scope: Vec<String> = paths
        .into_iter()
        .filter(|p| classifier::in_scope_for(registry, upstream, p))
        .collect();

    if in_scope.is_empty() {
        vcs::abort_cherry_pick_safely(dry_run, fallback_tip)?;
        return Ok(FilterOutcome::NoOp);
    }

    let mut add_args = vec!["add"];
    add_args.extend(in_scope.iter().map(|s| s.as_str()));
    vcs::strict(dry_run, &add_args)?;

    let message = append_trailer_if_absent(original_message, &upstream.trailer_key, upstream_sha);
    let author = commit_author(dry_run, upstream_sha)?;
    vcs::strict(
        dry_run,
        ["commit", "--no-verify", "--author", &author, "-m", &message].as_slice(),
    )
    .context("committing filtered cherry-pick")?;

    Ok(FilterOutcome::Applied)
}

/// `<name> <email>` of `sha`, for `git commit --author`, so a filtered
/// cherry-pick keeps the original upstream author instead of the bot's.
fn commit_author(dry_run: bool, sha: &str) -> Result<String> {
    Ok(vcs::strict(dry_run, ["log", "-1", "--format=%an <%ae>", sha].as_slice())?
        .trim()
        .to_string())
}

fn append_trailer_if_absent(message: &str, trailer_key: &str, upstream_sha: &str) -> String {
    let existing = extract_trailers(message, trailer_key).unwrap_or_default();
    if existing.iter().any(|h| h == upstream_sha) {
        return message.to_string();
    }
    let sep = if message.ends_with('\n') { "" } else { "\n" };
    format!("{message}{sep}\n{trailer_key}: {upstream_sha}\n")
}

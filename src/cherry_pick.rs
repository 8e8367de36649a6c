//! Cherry-pick-with-trailer: the primitive the sync orchestrator applies to
//! each new upstream commit.

use anyhow::Result;

use crate::classifier;
use crate::commit_filter::{self, FilterOutcome};
use crate::conflict::{self, ConflictOutcome};
use crate::upstream::{Registry, Upstream};
use crate::vcs;

pub enum PickOutcome {
    AlreadyApplied,
    NoOp,
    Applied,
    Conflict {
        cookbooks: Vec<String>,
        snapshot: Vec<crate::error::ConflictSnapshot>,
    },
}

/// Returns true if every in-scope path this commit touches already matches
/// the downstream working tree.
fn already_applied(dry_run: bool, registry: &Registry, upstream: &Upstream, sha: &str) -> Result<bool> {
    let touched = vcs::changed_paths(dry_run, sha)?;
    let in_scope: Vec<&String> = touched
        .iter()
        .filter(|p| classifier::in_scope_for(registry, upstream, p))
        .collect();
    if in_scope.is_empty() {
        return Ok(true);
    }
    for path in in_scope {
        let upstream_blob = vcs::strict(dry_run, ["rev-parse", &format!("{sha}:{path}")].as_slice())
            .unwrap_or_default();
        let local_blob = vcs::strict(dry_run, ["rev-parse", &format!("HEAD:{path}")].as_slice())
            .unwrap_or_default();
        if upstream_blob.trim().is_empty() || upstream_blob.trim() != local_blob.trim() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn cherry_pick_with_trailer(
    dry_run: bool,
    registry: &Registry,
    upstream: &Upstream,
    sha: &str,
    message: &str,
    fallback_tip: &str,
) -> Result<PickOutcome> {
    if already_applied(dry_run, registry, upstream, sha)? {
        return Ok(PickOutcome::AlreadyApplied);
    }

    let (ok, _, _) = vcs::try_run(
        dry_run,
        ["cherry-pick", "--no-commit", "--strategy-option=theirs", sha].as_slice(),
    )?;

    if ok {
        return Ok(match commit_filter::filter_and_commit(
            dry_run,
            registry,
            upstream,
            sha,
            message,
            fallback_tip,
        )? {
            FilterOutcome::NoOp => PickOutcome::NoOp,
            FilterOutcome::Applied => PickOutcome::Applied,
        });
    }

    match conflict::handle_conflict(dry_run, registry, upstream, sha, message, fallback_tip)? {
        ConflictOutcome::AutoResolved(FilterOutcome::NoOp) => Ok(PickOutcome::NoOp),
        ConflictOutcome::AutoResolved(FilterOutcome::Applied) => Ok(PickOutcome::Applied),
        ConflictOutcome::Real { cookbooks, snapshot } => {
            Ok(PickOutcome::Conflict { cookbooks, snapshot })
        }
    }
}

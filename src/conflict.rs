//! Classifies conflicting paths from a failed cherry-pick, resolves the
//! auto-resolvable ones by taking the pre-cherry-pick version, and captures
//! a diagnostic snapshot of any real conflicts before aborting.

use anyhow::Result;
use std::fs;
use tracing::warn;

use crate::classifier;
use crate::commit_filter::{self, FilterOutcome};
use crate::error::ConflictSnapshot;
use crate::upstream::{Registry, Upstream};
use crate::vcs;

pub enum ConflictOutcome {
    /// No conflicts involved in-scope paths; auto-resolved and filtered.
    AutoResolved(FilterOutcome),
    /// At least one conflicting path is in scope for the current upstream.
    Real {
        cookbooks: Vec<String>,
        snapshot: Vec<ConflictSnapshot>,
    },
}

fn conflicting_paths(dry_run: bool) -> Result<Vec<String>> {
    let out = vcs::strict(dry_run, ["status", "--porcelain"].as_slice())?;
    Ok(out
        .lines()
        .filter(|line| {
            let bytes = line.as_bytes();
            bytes.len() >= 2 && (bytes[0] == b'U' || bytes[1] == b'U' || &line[0..2] == "AA" || &line[0..2] == "DD")
        })
        .filter_map(|line| line.get(3..).map(|p| p.trim().to_string()))
        .filter(|p| !p.is_empty())
        .collect())
}

fn capture_snapshot(paths: &[String]) -> Vec<ConflictSnapshot> {
    paths
        .iter()
        .map(|path| {
            let contents = fs::read_to_string(path)
                .unwrap_or_else(|e| format!("Could not read file: {path} ({e})"));
            ConflictSnapshot {
                path: path.clone(),
                contents,
            }
        })
        .collect()
}

/// Handle a failed cherry-pick: classify conflicting paths, auto-resolve the
/// ones out of scope for `upstream`, and either hand off to the commit
/// filter or abort with a captured snapshot.
pub fn handle_conflict(
    dry_run: bool,
    registry: &Registry,
    upstream: &Upstream,
    upstream_sha: &str,
    original_message: &str,
    fallback_tip: &str,
) -> Result<ConflictOutcome> {
    let paths = match conflicting_paths(dry_run) {
        Ok(p) => p,
        Err(e) => {
            vcs::abort_cherry_pick_safely(dry_run, fallback_tip)?;
            return Ok(ConflictOutcome::Real {
                cookbooks: vec![],
                snapshot: vec![ConflictSnapshot {
                    path: String::new(),
                    contents: format!("Could not capture conflict details: {e}"),
                }],
            });
        }
    };

    let mut real_cookbooks: Vec<String> = Vec::new();
    let mut real_paths: Vec<String> = Vec::new();
    let mut auto_paths: Vec<String> = Vec::new();

    for path in &paths {
        if classifier::in_scope_for(registry, upstream, path) {
            real_paths.push(path.clone());
            if let Some((_, classified)) = classifier::classify(registry, path) {
                if !real_cookbooks.contains(&classified.cookbook) {
                    real_cookbooks.push(classified.cookbook);
                }
            }
        } else {
            auto_paths.push(path.clone());
        }
    }

    if !real_paths.is_empty() {
        let snapshot = capture_snapshot(&real_paths);
        vcs::abort_cherry_pick_safely(dry_run, fallback_tip)?;
        return Ok(ConflictOutcome::Real {
            cookbooks: real_cookbooks,
            snapshot,
        });
    }

    for path in &auto_paths {
        warn!("Auto-resolving out-of-scope conflict on {}: taking pre-cherry-pick version", path);
        vcs::strict(dry_run, ["checkout", "HEAD", "--", path].as_slice())?;
    }

    let outcome = commit_filter::filter_and_commit(
        dry_run,
        registry,
        upstream,
        upstream_sha,
        original_message,
        fallback_tip,
    )?;
    Ok(ConflictOutcome::AutoResolved(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_unreadable_file() {
        let snap = capture_snapshot(&["/nonexistent/path/does-not-exist.rb".to_string()]);
        assert_eq!(snap.len(), 1);
        assert!(snap[0].contents.starts_with("Could not read file"));
    }
}

//! Onboarding baseline detection.
//!
//! When a downstream repo has no recoverable pointer for an upstream, the
//! baseline detector infers which upstream commit the current downstream
//! state was originally cut from, per cookbook, and reconciles per-cookbook
//! baselines into a single global baseline.

use anyhow::Result;
use tracing::warn;

use crate::upstream::Upstream;
use crate::vcs;

/// Find the newest upstream commit whose `<cookbook>/` subtree matches the
/// downstream working copy exactly.
pub fn find_baseline_for_cookbook(
    dry_run: bool,
    upstream: &Upstream,
    cookbook: &str,
) -> Result<Option<String>> {
    let path = format!("cookbooks/{cookbook}");
    let range = format!("{}/{}", upstream.remote_name, upstream.branch);
    let log = vcs::strict(
        dry_run,
        ["log", "--format=%H", &range, "--", &path].as_slice(),
    )?;
    for candidate in log.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if subtree_matches(dry_run, candidate, &path)? {
            return Ok(Some(candidate.to_string()));
        }
    }
    Ok(None)
}

fn subtree_matches(dry_run: bool, candidate: &str, path: &str) -> Result<bool> {
    let candidate_tree = vcs::strict(
        dry_run,
        ["rev-parse", &format!("{candidate}:{path}")].as_slice(),
    )
    .unwrap_or_default();
    let local_tree = vcs::strict(dry_run, ["rev-parse", &format!("HEAD:{path}")].as_slice())
        .unwrap_or_default();
    Ok(!candidate_tree.trim().is_empty() && candidate_tree.trim() == local_tree.trim())
}

pub struct GlobalBaseline {
    pub baseline: Option<String>,
    pub missing: Vec<String>,
}

/// Enumerate `upstream`'s in-scope cookbooks present downstream, compute a
/// per-cookbook baseline for each, and reduce the found baselines to one
/// global common ancestor.
///
/// With more than two cookbooks, the reduction folds pairwise in the order
/// cookbooks are discovered on disk — a deliberate simplification that is
/// only exact for a linear upstream history (see DESIGN.md).
pub fn detect_global_baseline(
    dry_run: bool,
    upstream: &Upstream,
    cookbooks: &[String],
) -> Result<GlobalBaseline> {
    let mut found: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();

    for cookbook in cookbooks {
        match find_baseline_for_cookbook(dry_run, upstream, cookbook)? {
            Some(sha) => found.push(sha),
            None => missing.push(cookbook.clone()),
        }
    }

    if found.is_empty() {
        return Ok(GlobalBaseline {
            baseline: None,
            missing,
        });
    }

    let mut acc = found[0].clone();
    for next in &found[1..] {
        acc = common_ancestor(dry_run, &acc, next)?;
    }
    Ok(GlobalBaseline {
        baseline: Some(acc),
        missing,
    })
}

fn common_ancestor(dry_run: bool, a: &str, b: &str) -> Result<String> {
    let out = vcs::strict(dry_run, ["merge-base", a, b].as_slice())?;
    Ok(out.trim().to_string())
}

/// Overwrite the downstream subtree for `cookbook` with the upstream subtree
/// at `baseline`, staging the result. Returns `false` without staging
/// anything if the cookbook does not exist in the upstream tree at
/// `baseline`.
pub fn sync_cookbook_to_baseline(
    dry_run: bool,
    cookbook: &str,
    baseline: &str,
) -> Result<bool> {
    let path = format!("cookbooks/{cookbook}");
    let (exists, _, _) = vcs::try_run(
        dry_run,
        ["cat-file", "-e", &format!("{baseline}:{path}")].as_slice(),
    )?;
    if !exists {
        warn!("{} does not exist at baseline {}; skipping", cookbook, baseline);
        return Ok(false);
    }
    vcs::strict(dry_run, ["checkout", baseline, "--", &path].as_slice())?;
    vcs::strict(dry_run, ["add", &path].as_slice())?;
    Ok(true)
}

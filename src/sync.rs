//! Per-upstream sync orchestration: fetch, resolve pointer, cherry-pick new
//! upstream commits onto a work branch, publish the result as a PR, open or
//! update conflict issues, and garbage-collect resolved ones.

use anyhow::Result;
use tracing::{info, warn};

use crate::cherry_pick::{self, PickOutcome};
use crate::config::Config;
use crate::onboarding;
use crate::platform;
use crate::trailer;
use crate::upstream::{Registry, Upstream};
use crate::vcs;

pub struct SyncReport {
    pub upstream_key: String,
    pub applied: usize,
    pub opened_conflict: bool,
}

/// Run sync for every upstream in registry order (primary first).
pub fn sync_all(dry_run: bool, cfg: &Config, registry: &Registry) -> Result<Vec<SyncReport>> {
    registry.reconcile_remotes(dry_run)?;
    let mut reports = Vec::new();
    for upstream in &registry.upstreams {
        match sync_upstream(dry_run, cfg, registry, upstream) {
            Ok(report) => reports.push(report),
            Err(e) => {
                // One upstream's failure must not block the others.
                warn!("sync of upstream `{}` failed: {:#}", upstream.key, e);
            }
        }
    }
    Ok(reports)
}

fn conflict_issue_title(sha: &str) -> String {
    format!("Sync conflict applying upstream commit {}", &sha[..sha.len().min(7)])
}

fn open_or_update_conflict_issue(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    sha: &str,
    cookbooks: &[String],
    snapshot: &[crate::error::ConflictSnapshot],
) -> Result<()> {
    let title = conflict_issue_title(sha);
    let mut body = format!(
        "Applying upstream commit `{sha}` for `{}` hit a real conflict in: {}.\n\n",
        upstream.prefix,
        cookbooks.join(", ")
    );
    for snap in snapshot {
        body.push_str(&format!("### {}\n```\n{}\n```\n", snap.path, snap.contents));
    }

    let existing = platform::list_issues(&cfg.bot_label, "open")?
        .into_iter()
        .find(|i| i.title == title);

    match existing {
        Some(issue) => {
            platform::edit_issue(dry_run, issue.number, Some(&body), &[])?;
            info!("Updated conflict issue #{} for {}", issue.number, sha);
        }
        None => {
            let number = platform::create_issue(dry_run, &title, &body, &[cfg.bot_label.clone()])?;
            info!("Opened conflict issue #{} for {}", number, sha);
        }
    }
    Ok(())
}

/// Close any open conflict issue whose upstream commit is now an ancestor of
/// the freshly-advanced pointer, except the current blocker (if any) — an
/// issue's own blocking commit must never be mistaken for "resolved".
fn close_resolved_conflict_issues(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    new_pointer: &str,
    current_blocker: Option<&str>,
) -> Result<()> {
    let prefix_marker = "Sync conflict applying upstream commit ";
    for issue in platform::list_issues(&cfg.bot_label, "open")? {
        let Some(shortsha) = issue.title.strip_prefix(prefix_marker) else {
            continue;
        };
        if Some(shortsha) == current_blocker.map(|c| &c[..c.len().min(7)]) {
            continue;
        }
        if vcs::is_ancestor(dry_run, shortsha, new_pointer).unwrap_or(false) {
            platform::close_issue(
                dry_run,
                issue.number,
                Some(&format!(
                    "Resolved: `{shortsha}` (upstream `{}`) is now integrated.",
                    upstream.prefix
                )),
            )?;
            info!("Closed resolved conflict issue #{}", issue.number);
        }
    }
    Ok(())
}

fn sync_pr_branch(cfg: &Config, upstream: &Upstream) -> String {
    format!("{}{}_/update", cfg.pr_branch_prefix, upstream.prefix)
}

fn local_changes_issue_title(upstream: &Upstream, cookbook: &str) -> String {
    format!("Local changes detected in `{cookbook}` ({})", upstream.prefix)
}

/// True if `path`'s tree at `pointer` differs from the downstream working
/// tree, i.e. someone edited the cookbook by hand since the last sync commit.
fn cookbook_diverges_from_pointer(dry_run: bool, pointer: &str, path: &str) -> Result<bool> {
    let pointer_tree = vcs::strict(dry_run, ["rev-parse", &format!("{pointer}:{path}")].as_slice())
        .unwrap_or_default();
    let local_tree = vcs::strict(dry_run, ["rev-parse", &format!("HEAD:{path}")].as_slice())
        .unwrap_or_default();
    Ok(pointer_tree.trim() != local_tree.trim())
}

/// With no new upstream commits to apply, a cookbook can still drift from
/// the recorded pointer via a hand-edit that never went through sync. Open
/// or update a "local changes" issue per diverged cookbook so it gets
/// reconciled instead of silently left out of sync.
fn detect_and_report_local_changes(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    pointer: &str,
) -> Result<()> {
    for cookbook in onboarding::list_local_cookbooks(dry_run, upstream)? {
        let path = format!("cookbooks/{cookbook}");
        if !cookbook_diverges_from_pointer(dry_run, pointer, &path)? {
            continue;
        }

        let title = local_changes_issue_title(upstream, &cookbook);
        let body = format!(
            "`{cookbook}` has diverged from the upstream pointer `{pointer}` with no \
             corresponding sync commit. If this is an intentional local change, no action \
             is needed; otherwise reconcile it by hand.\n"
        );

        let existing = platform::list_issues(&cfg.bot_label, "open")?
            .into_iter()
            .find(|i| i.title == title);
        match existing {
            Some(issue) => {
                platform::edit_issue(dry_run, issue.number, Some(&body), &[])?;
                info!("Updated local-changes issue #{} for `{}`", issue.number, cookbook);
            }
            None => {
                let number = platform::create_issue(dry_run, &title, &body, &[cfg.bot_label.clone()])?;
                info!("Opened local-changes issue #{} for `{}`", number, cookbook);
            }
        }
    }
    Ok(())
}

fn sync_upstream(
    dry_run: bool,
    cfg: &Config,
    registry: &Registry,
    upstream: &Upstream,
) -> Result<SyncReport> {
    vcs::strict(dry_run, ["fetch", &upstream.remote_name].as_slice())?;

    let base = effective_base(cfg)?;

    let pointer = trailer::pointer_for(dry_run, &base, upstream)?;
    let Some(pointer) = pointer else {
        onboarding::run_onboarding(dry_run, cfg, registry, upstream)?;
        return Ok(SyncReport {
            upstream_key: upstream.key.clone(),
            applied: 0,
            opened_conflict: false,
        });
    };

    let upstream_head = format!("{}/{}", upstream.remote_name, upstream.branch);
    let todo = list_new_commits(dry_run, &pointer, &upstream_head)?;

    if todo.is_empty() {
        info!("upstream `{}` has no new commits since {}", upstream.prefix, pointer);
        close_resolved_conflict_issues(dry_run, cfg, upstream, &pointer, None)?;
        detect_and_report_local_changes(dry_run, cfg, upstream, &pointer)?;
        return Ok(SyncReport {
            upstream_key: upstream.key.clone(),
            applied: 0,
            opened_conflict: false,
        });
    }

    let branch = sync_pr_branch(cfg, upstream);
    vcs::strict(dry_run, ["checkout", "-B", &branch, &base].as_slice())?;

    let mut applied_trailers: Vec<String> = Vec::new();
    let mut opened_conflict = false;

    for (sha, message) in &todo {
        let fallback_tip = vcs::current_head().unwrap_or_else(|_| base.clone());
        match cherry_pick::cherry_pick_with_trailer(dry_run, registry, upstream, sha, message, &fallback_tip)? {
            PickOutcome::AlreadyApplied | PickOutcome::NoOp => continue,
            PickOutcome::Applied => applied_trailers.push(sha.clone()),
            PickOutcome::Conflict { cookbooks, snapshot } => {
                open_or_update_conflict_issue(dry_run, cfg, upstream, sha, &cookbooks, &snapshot)?;
                opened_conflict = true;
                break;
            }
        }
    }

    if !applied_trailers.is_empty() {
        vcs::strict(dry_run, ["push", "--force-with-lease", "origin", &branch].as_slice())?;
        publish_sync_pr(dry_run, cfg, upstream, &base, &branch, &applied_trailers)?;
        let new_pointer = applied_trailers.last().cloned().unwrap_or(pointer);
        let blocker = if opened_conflict { todo.iter().find(|(s, _)| !applied_trailers.contains(s)).map(|(s, _)| s.as_str()) } else { None };
        close_resolved_conflict_issues(dry_run, cfg, upstream, &new_pointer, blocker)?;
    }

    Ok(SyncReport {
        upstream_key: upstream.key.clone(),
        applied: applied_trailers.len(),
        opened_conflict,
    })
}

fn effective_base(cfg: &Config) -> Result<String> {
    if cfg.base_branch.trim().is_empty() {
        vcs::discover_default_base()
    } else {
        Ok(cfg.base_branch.clone())
    }
}

fn list_new_commits(dry_run: bool, pointer: &str, upstream_head: &str) -> Result<Vec<(String, String)>> {
    let raw = vcs::log_records(dry_run, &format!("{pointer}..{upstream_head}"), None)?;
    let mut out = Vec::new();
    for chunk in raw.split('\u{001e}') {
        let chunk = chunk.trim_end_matches('\n');
        if chunk.trim().is_empty() {
            continue;
        }
        let mut parts = chunk.splitn(2, '\0');
        let sha = parts.next().unwrap_or_default().trim().to_string();
        let message = parts.next().unwrap_or_default().to_string();
        out.push((sha, message));
    }
    Ok(out)
}

fn publish_sync_pr(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    base: &str,
    branch: &str,
    applied_trailers: &[String],
) -> Result<()> {
    let title = format!("Sync {} from upstream", upstream.prefix);
    let mut body = String::from("Applied upstream commits:\n\n");
    for sha in applied_trailers {
        body.push_str(&format!("- {}: {}\n", upstream.trailer_key, sha));
    }

    match platform::find_pr_by_head(branch)? {
        Some(pr) => {
            platform::edit_pr(dry_run, pr.number, None, Some(&body), &[], &[])?;
            info!("Updated sync PR #{}", pr.number);
        }
        None => {
            let number = platform::create_pr(dry_run, &title, &body, branch, base, &[cfg.bot_label.clone()])?;
            info!("Opened sync PR #{}", number);
        }
    }
    Ok(())
}

//! Thin wrapper around the `git` subprocess plus repository-specific helpers.
//!
//! This module centralizes command execution and dry-run handling so
//! orchestration code never shells out directly. [`strict`] raises on a
//! non-zero exit; [`try_run`] never raises and instead hands the caller the
//! exit status alongside stdout/stderr, mirroring the split the original
//! implementation made between `git()` and `try_git()`.
//!
//! Dry-run is a single choke point: [`READ_ONLY_SUBCOMMANDS`] is a fixed
//! allow-list of subcommands considered safe to execute even when dry-run is
//! on; everything else is logged and elided.

use anyhow::{bail, Context, Result};
use std::process::{Command, Stdio};
use tracing::{error, info};

/// Subcommands that never mutate repository state and therefore run
/// unconditionally even under dry-run.
const READ_ONLY_SUBCOMMANDS: &[&str] = &[
    "status", "log", "show", "diff", "diff-tree", "rev-parse", "rev-list", "merge-base",
    "ls-remote", "ls-tree", "symbolic-ref", "cat-file", "branch", "for-each-ref", "config",
];

pub fn ensure_tool(name: &str) -> Result<()> {
    let status = Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("{} not found in PATH", name))?;
    if !status.success() {
        bail!("{} appears to be installed but not runnable", name);
    }
    Ok(())
}

fn is_read_only(args: &[&str]) -> bool {
    let sub = args
        .iter()
        .find(|a| !a.starts_with('-'))
        .copied()
        .unwrap_or("");
    if !READ_ONLY_SUBCOMMANDS.contains(&sub) {
        return false;
    }
    // `branch` is read-only unless it's being used to create/move/delete one.
    if sub == "branch" {
        return !args.contains(&"-f") && !args.contains(&"-D") && !args.contains(&"-d");
    }
    true
}

/// Run `git <args>`, raising if the exit code is non-zero.
pub fn strict(dry_run: bool, args: &[&str]) -> Result<String> {
    if dry_run && !is_read_only(args) {
        info!("DRY-RUN: git {}", shellish(args));
        return Ok(String::new());
    }
    verbose_log_cmd("git", args);
    run("git", args)
}

/// Run `git <args>`, never raising; returns `(ok, stdout, stderr)`.
pub fn try_run(dry_run: bool, args: &[&str]) -> Result<(bool, String, String)> {
    if dry_run && !is_read_only(args) {
        info!("DRY-RUN: git {}", shellish(args));
        return Ok((true, String::new(), String::new()));
    }
    verbose_log_cmd("git", args);
    let out = Command::new("git")
        .args(args)
        .output()
        .with_context(|| "failed to spawn git")?;
    Ok((
        out.status.success(),
        String::from_utf8_lossy(&out.stdout).to_string(),
        String::from_utf8_lossy(&out.stderr).to_string(),
    ))
}

pub fn run(bin: &str, args: &[&str]) -> Result<String> {
    let out = Command::new(bin)
        .args(args)
        .output()
        .with_context(|| format!("failed to spawn {}", bin))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let stdout = String::from_utf8_lossy(&out.stdout);
        error!(
            "{} {:?} failed\nstdout:\n{}\nstderr:\n{}",
            bin, args, stdout, stderr
        );
        bail!("command failed: {} {:?}", bin, args);
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

pub fn shellish(args: &[&str]) -> String {
    args.iter()
        .map(|a| {
            if a.chars()
                .any(|c| c.is_whitespace() || c == '"' || c == '\'')
            {
                format!("{:?}", a)
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn verbose_log_cmd(tool: &str, args: &[&str]) {
    if std::env::var_os("LINECOOK_VERBOSE").is_some() {
        info!("{} {}", tool, shellish(args));
    }
}

pub fn repo_root() -> Result<Option<String>> {
    match strict(false, ["rev-parse", "--show-toplevel"].as_slice()) {
        Ok(path) => Ok(Some(path.trim().to_string())),
        Err(_) => Ok(None),
    }
}

pub fn current_head() -> Result<String> {
    Ok(strict(false, ["rev-parse", "HEAD"].as_slice())?.trim().to_string())
}

pub fn is_ancestor(dry_run: bool, ancestor: &str, descendant: &str) -> Result<bool> {
    let (ok, _, _) = try_run(
        dry_run,
        ["merge-base", "--is-ancestor", ancestor, descendant].as_slice(),
    )?;
    Ok(ok)
}

/// Log `range` in a machine-parseable record/field-separated format:
/// `%H` (hash) then `\0` then the full body, records split by `\x1e`.
pub fn log_records(dry_run: bool, range: &str, paths: Option<&str>) -> Result<String> {
    let mut args = vec!["log", "--format=%H%x00%B%x1e", "--reverse", range];
    if let Some(p) = paths {
        args.push("--");
        args.push(p);
    }
    strict(dry_run, &args)
}

/// List paths touched by a single commit relative to its first parent.
pub fn changed_paths(dry_run: bool, sha: &str) -> Result<Vec<String>> {
    let out = strict(
        dry_run,
        ["diff-tree", "--no-commit-id", "--name-only", "-r", sha].as_slice(),
    )?;
    Ok(out.lines().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

/// Create (force) a local worktree at `path` on a new branch `branch`, rooted at `start_point`.
pub fn create_worktree(dry_run: bool, path: &str, branch: &str, start_point: &str) -> Result<()> {
    strict(
        dry_run,
        ["worktree", "add", "-f", "-b", branch, path, start_point].as_slice(),
    )?;
    Ok(())
}

pub fn remove_worktree(dry_run: bool, path: &str, branch: &str) -> Result<()> {
    let _ = strict(dry_run, ["worktree", "remove", "-f", path].as_slice());
    let _ = strict(dry_run, ["branch", "-D", branch].as_slice());
    Ok(())
}

/// Abort an in-progress cherry-pick; tolerates "no cherry-pick in progress" by
/// falling back to a hard reset plus a worktree clean, matching the leniency
/// the original implementation needed around sequencer state.
pub fn abort_cherry_pick_safely(dry_run: bool, fallback_tip: &str) -> Result<()> {
    let (ok, _, _stderr) = try_run(dry_run, ["cherry-pick", "--abort"].as_slice())?;
    if !ok {
        // No cherry-pick was in progress (e.g. the filter already emptied the
        // index); fall back to restoring the tip directly.
        strict(dry_run, ["reset", "--hard", fallback_tip].as_slice())?;
        strict(dry_run, ["clean", "-fd"].as_slice())?;
    }
    Ok(())
}

pub fn discover_default_base() -> Result<String> {
    let out = strict(
        false,
        ["symbolic-ref", "--short", "refs/remotes/origin/HEAD"].as_slice(),
    )
    .with_context(|| {
        "failed to discover default branch from origin/HEAD; set `base_branch` in the config or run `git remote set-head origin -a`"
    })?;
    let base = out.trim();
    if base.is_empty() {
        bail!("origin/HEAD resolved to an empty ref; set `base_branch` in the config");
    }
    Ok(base.to_string())
}

pub fn remote_exists(name: &str) -> Result<bool> {
    let (ok, _, _) = try_run(false, ["remote", "get-url", name].as_slice())?;
    Ok(ok)
}

pub fn add_remote(dry_run: bool, name: &str, url: &str) -> Result<()> {
    strict(dry_run, ["remote", "add", name, url].as_slice())?;
    Ok(())
}

pub fn set_remote_url(dry_run: bool, name: &str, url: &str) -> Result<()> {
    strict(dry_run, ["remote", "set-url", name, url].as_slice())?;
    Ok(())
}

pub fn remote_url(name: &str) -> Result<Option<String>> {
    let (ok, out, _) = try_run(false, ["remote", "get-url", name].as_slice())?;
    Ok(if ok { Some(out.trim().to_string()) } else { None })
}

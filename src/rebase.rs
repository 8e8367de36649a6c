//! `<prefix> rebase`: fetch, rebase a sync PR's branch onto the latest base,
//! and force-push, surfacing a conflict as a comment instead of a crash.

use anyhow::Result;

use crate::config::Config;
use crate::error::SyncError;
use crate::platform::{self, Pr};
use crate::trailer;
use crate::upstream::{Registry, Upstream};
use crate::vcs;

fn determine_upstream<'a>(registry: &'a Registry, pr: &Pr) -> Option<&'a Upstream> {
    registry
        .upstreams
        .iter()
        .find(|u| pr.head.contains(&format!("{}_", u.prefix)))
        .or_else(|| registry.upstreams.iter().find(|u| pr.body.contains(&u.trailer_key)))
}

pub fn run_rebase(dry_run: bool, cfg: &Config, registry: &Registry, pr_number: u64) -> Result<()> {
    match run_rebase_inner(dry_run, cfg, registry, pr_number) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = platform::comment(dry_run, pr_number, &format!("Rebase failed: {e}"));
            Err(e)
        }
    }
}

/// Rebase the current branch onto `onto`, aborting cleanly (and returning
/// `false`) on conflict rather than leaving the repo mid-rebase.
fn rebase_onto(dry_run: bool, onto: &str) -> Result<bool> {
    let (ok, _, _) = vcs::try_run(dry_run, ["rebase", onto].as_slice())?;
    if !ok {
        vcs::strict(dry_run, ["rebase", "--abort"].as_slice())?;
    }
    Ok(ok)
}

/// Re-derive the PR body's trailer block from `range`'s commits, in case the
/// rebase replayed them onto new hashes. Returns `None` (leave the body
/// alone) if the range carries no trailer for `upstream` at all.
fn rebuild_trailer_body(dry_run: bool, range: &str, upstream: &Upstream) -> Result<Option<String>> {
    let raw = vcs::log_records(dry_run, range, None)?;
    let mut trailers = Vec::new();
    for chunk in raw.split('\u{001e}') {
        let chunk = chunk.trim_end_matches('\n');
        if chunk.trim().is_empty() {
            continue;
        }
        let mut parts = chunk.splitn(2, '\0');
        let _sha = parts.next().unwrap_or_default();
        let message = parts.next().unwrap_or_default();
        trailers.extend(trailer::extract_trailers(message, &upstream.trailer_key)?);
    }
    if trailers.is_empty() {
        return Ok(None);
    }
    let mut body = String::from("Applied upstream commits:\n\n");
    for h in &trailers {
        body.push_str(&format!("- {}: {}\n", upstream.trailer_key, h));
    }
    Ok(Some(body))
}

fn run_rebase_inner(dry_run: bool, cfg: &Config, registry: &Registry, pr_number: u64) -> Result<()> {
    let pr = platform::get_pr(pr_number)?;
    let upstream = determine_upstream(registry, &pr)
        .ok_or_else(|| SyncError::Command("Could not determine upstream for this PR".into()))?;

    let base = if cfg.base_branch.trim().is_empty() {
        vcs::discover_default_base()?
    } else {
        cfg.base_branch.clone()
    };

    vcs::strict(dry_run, ["fetch", "origin", &base, &pr.head].as_slice())?;
    vcs::strict(
        dry_run,
        ["checkout", "-B", &pr.head, &format!("origin/{}", pr.head)].as_slice(),
    )?;

    let onto = format!("origin/{base}");
    if !rebase_onto(dry_run, &onto)? {
        return Err(SyncError::Command("Rebase failed with conflicts".into()).into());
    }

    vcs::strict(dry_run, ["push", "--force-with-lease", "origin", &pr.head].as_slice())?;

    let range = format!("{onto}..{}", pr.head);
    if let Some(body) = rebuild_trailer_body(dry_run, &range, upstream)? {
        platform::edit_pr(dry_run, pr_number, None, Some(&body), &[], &[])?;
    }

    platform::comment(dry_run, pr_number, "Rebased onto the latest base.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration-style tests against a real temp repo: the pure-git pieces
    // of the rebase orchestrator (no `gh`/`platform::` calls involved).
    mod with_real_repo {
        use super::*;
        use crate::upstream::Upstream;
        use std::env;
        use std::fs;
        use std::path::{Path, PathBuf};
        use std::sync::Mutex;

        static CWD_LOCK: Mutex<()> = Mutex::new(());

        struct DirGuard {
            original: PathBuf,
        }

        impl DirGuard {
            fn change_to(path: &Path) -> Self {
                let original = env::current_dir().expect("current dir available");
                env::set_current_dir(path).expect("set current dir to temp repo");
                Self { original }
            }
        }

        impl Drop for DirGuard {
            fn drop(&mut self) {
                env::set_current_dir(&self.original).expect("restore original current dir");
            }
        }

        fn upstream() -> Upstream {
            Upstream {
                key: "primary".into(),
                prefix: "fb".into(),
                remote_name: "fb_upstream".into(),
                repo_url: "https://example.com/fb.git".into(),
                branch: "main".into(),
                trailer_key: "Upstream-Commit".into(),
                ignore_dirs: vec![],
                is_primary: true,
            }
        }

        #[test]
        fn rebases_cleanly_onto_a_fast_forwarded_base() {
            let _lock = CWD_LOCK.lock().expect("lock cwd");
            let dir = tempfile::tempdir().expect("create temp dir");
            let _guard = DirGuard::change_to(dir.path());

            vcs::strict(false, ["init", "-b", "main"].as_slice()).expect("git init");
            vcs::strict(false, ["config", "user.email", "bot@example.com"].as_slice()).expect("config email");
            vcs::strict(false, ["config", "user.name", "line-cook tests"].as_slice()).expect("config name");

            fs::write(dir.path().join("shared.txt"), "base\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "base"].as_slice()).expect("commit base");

            vcs::strict(false, ["checkout", "-b", "feature"].as_slice()).expect("branch feature");
            fs::write(dir.path().join("feature.txt"), "x\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "feature change"].as_slice()).expect("commit feature");

            vcs::strict(false, ["checkout", "main"].as_slice()).expect("checkout main");
            fs::write(dir.path().join("unrelated.txt"), "y\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "unrelated base change"].as_slice()).expect("commit base advance");
            let new_base = vcs::current_head().expect("current head");

            vcs::strict(false, ["checkout", "feature"].as_slice()).expect("checkout feature");
            let ok = rebase_onto(false, "main").expect("rebase_onto");
            assert!(ok, "rebase onto a fast-forwardable base should succeed");

            let parent = vcs::strict(false, ["rev-parse", "HEAD^"].as_slice()).expect("parent sha");
            assert_eq!(parent.trim(), new_base.trim(), "feature should now sit on top of the advanced base");
        }

        #[test]
        fn aborts_and_restores_the_branch_tip_on_conflict() {
            let _lock = CWD_LOCK.lock().expect("lock cwd");
            let dir = tempfile::tempdir().expect("create temp dir");
            let _guard = DirGuard::change_to(dir.path());

            vcs::strict(false, ["init", "-b", "main"].as_slice()).expect("git init");
            vcs::strict(false, ["config", "user.email", "bot@example.com"].as_slice()).expect("config email");
            vcs::strict(false, ["config", "user.name", "line-cook tests"].as_slice()).expect("config name");

            fs::write(dir.path().join("shared.txt"), "base\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "base"].as_slice()).expect("commit base");

            vcs::strict(false, ["checkout", "-b", "feature"].as_slice()).expect("branch feature");
            fs::write(dir.path().join("shared.txt"), "feature\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "feature change"].as_slice()).expect("commit feature");
            let feature_tip = vcs::current_head().expect("current head");

            vcs::strict(false, ["checkout", "main"].as_slice()).expect("checkout main");
            fs::write(dir.path().join("shared.txt"), "main\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "conflicting base change"].as_slice()).expect("commit base change");

            vcs::strict(false, ["checkout", "feature"].as_slice()).expect("checkout feature");
            let ok = rebase_onto(false, "main").expect("rebase_onto");
            assert!(!ok, "a conflicting rebase should report failure");

            let status = vcs::strict(false, ["status", "--porcelain"].as_slice()).expect("status");
            assert!(status.trim().is_empty(), "the abort should leave a clean working tree");

            let tip = vcs::current_head().expect("current head after abort");
            assert_eq!(tip.trim(), feature_tip.trim(), "the abort should restore the original branch tip");
        }

        #[test]
        fn rebuilds_trailer_body_from_commits_in_range() {
            let _lock = CWD_LOCK.lock().expect("lock cwd");
            let dir = tempfile::tempdir().expect("create temp dir");
            let _guard = DirGuard::change_to(dir.path());

            vcs::strict(false, ["init", "-b", "main"].as_slice()).expect("git init");
            vcs::strict(false, ["config", "user.email", "bot@example.com"].as_slice()).expect("config email");
            vcs::strict(false, ["config", "user.name", "line-cook tests"].as_slice()).expect("config name");

            fs::write(dir.path().join("base.txt"), "x\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "base"].as_slice()).expect("commit base");
            let base = vcs::current_head().expect("current head");

            fs::write(dir.path().join("cookbooks.txt"), "a\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(
                false,
                ["commit", "-m", "Bump nginx\n\nUpstream-Commit: aaa1111"].as_slice(),
            )
            .expect("commit with trailer");
            let head = vcs::current_head().expect("current head");

            let body = rebuild_trailer_body(false, &format!("{base}..{head}"), &upstream())
                .expect("rebuild_trailer_body")
                .expect("a trailer-carrying range should produce a body");
            assert!(body.contains("Upstream-Commit: aaa1111"));
        }

        #[test]
        fn no_trailers_in_range_yields_no_body() {
            let _lock = CWD_LOCK.lock().expect("lock cwd");
            let dir = tempfile::tempdir().expect("create temp dir");
            let _guard = DirGuard::change_to(dir.path());

            vcs::strict(false, ["init", "-b", "main"].as_slice()).expect("git init");
            vcs::strict(false, ["config", "user.email", "bot@example.com"].as_slice()).expect("config email");
            vcs::strict(false, ["config", "user.name", "line-cook tests"].as_slice()).expect("config name");

            fs::write(dir.path().join("base.txt"), "x\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "base"].as_slice()).expect("commit base");
            let base = vcs::current_head().expect("current head");

            fs::write(dir.path().join("plain.txt"), "a\n").expect("write");
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "plain commit, no trailer"].as_slice()).expect("commit");
            let head = vcs::current_head().expect("current head");

            let body = rebuild_trailer_body(false, &format!("{base}..{head}"), &upstream())
                .expect("rebuild_trailer_body");
            assert!(body.is_none());
        }
    }
}

//! No-pointer path: infer the baseline, open an onboarding PR carrying it as
//! a trailer, and when some cookbooks don't match any upstream commit, a
//! fixup PR that syncs just those to the baseline.

use anyhow::Result;
use tracing::info;

use crate::baseline;
use crate::config::Config;
use crate::platform;
use crate::upstream::{Registry, Upstream};
use crate::vcs;

pub(crate) fn list_local_cookbooks(dry_run: bool, upstream: &Upstream) -> Result<Vec<String>> {
    let out = vcs::strict(dry_run, ["ls-tree", "--name-only", "HEAD:cookbooks/"].as_slice())
        .unwrap_or_default();
    Ok(out
        .lines()
        .map(|l| l.trim_end_matches('/').to_string())
        .filter(|name| {
            name.strip_prefix(&upstream.prefix)
                .and_then(|tail| tail.strip_prefix('_'))
                .is_some()
                && !upstream.ignore_dirs.contains(name)
        })
        .collect())
}

fn onboard_branch(cfg: &Config, upstream: &Upstream) -> String {
    format!("{}{}_onboard", cfg.pr_branch_prefix, upstream.prefix)
}

fn fixup_branch(cfg: &Config, upstream: &Upstream) -> String {
    format!("{}{}_fix_missing_baselines", cfg.pr_branch_prefix, upstream.prefix)
}

pub fn run_onboarding(
    dry_run: bool,
    cfg: &Config,
    _registry: &Registry,
    upstream: &Upstream,
) -> Result<()> {
    let cookbooks = list_local_cookbooks(dry_run, upstream)?;
    if cookbooks.is_empty() {
        info!("no local cookbooks for upstream `{}`; nothing to onboard", upstream.prefix);
        return Ok(());
    }

    let result = baseline::detect_global_baseline(dry_run, upstream, &cookbooks)?;
    let Some(baseline_sha) = result.baseline else {
        info!("could not detect a baseline for upstream `{}`", upstream.prefix);
        return Ok(());
    };

    create_or_update_onboarding_pr(dry_run, cfg, upstream, &baseline_sha)?;

    if !result.missing.is_empty() {
        create_or_update_fixup_pr(dry_run, cfg, upstream, &baseline_sha, &result.missing)?;
    }

    Ok(())
}

fn effective_base(cfg: &Config) -> Result<String> {
    if cfg.base_branch.trim().is_empty() {
        vcs::discover_default_base()
    } else {
        Ok(cfg.base_branch.clone())
    }
}

fn create_or_update_onboarding_pr(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    baseline_sha: &str,
) -> Result<()> {
    let base = effective_base(cfg)?;
    let branch = onboard_branch(cfg, upstream);
    vcs::strict(dry_run, ["checkout", "-B", &branch, &base].as_slice())?;
    vcs::strict(dry_run, ["push", "--force-with-lease", "origin", &branch].as_slice())?;

    let title = format!("Onboard {} to upstream baseline", upstream.prefix);
    let body = format!("{}: {}\n", upstream.trailer_key, baseline_sha);

    match platform::find_pr_by_head(&branch)? {
        Some(pr) => {
            platform::edit_pr(dry_run, pr.number, None, Some(&body), &[], &[])?;
            info!("Updated onboarding PR #{}", pr.number);
        }
        None => {
            let number = platform::create_pr(dry_run, &title, &body, &branch, &base, &[cfg.bot_label.clone()])?;
            info!("Opened onboarding PR #{}", number);
        }
    }
    Ok(())
}

fn create_or_update_fixup_pr(
    dry_run: bool,
    cfg: &Config,
    upstream: &Upstream,
    baseline_sha: &str,
    missing: &[String],
) -> Result<()> {
    let base = effective_base(cfg)?;
    let branch = fixup_branch(cfg, upstream);
    vcs::strict(dry_run, ["checkout", "-B", &branch, &base].as_slice())?;

    let mut any_staged = false;
    for cookbook in missing {
        if baseline::sync_cookbook_to_baseline(dry_run, cookbook, baseline_sha)? {
            any_staged = true;
        }
    }

    if !any_staged {
        info!("fixup for `{}` produced no changes; skipping PR", upstream.prefix);
        return Ok(());
    }

    let message = format!("Sync {} to baseline {}", missing.join(", "), baseline_sha);
    vcs::strict(dry_run, ["commit", "-m", &message].as_slice())?;

    let new_tip = vcs::current_head()?;
    let base_tip = vcs::strict(dry_run, ["rev-parse", &base].as_slice())?.trim().to_string();
    if new_tip == base_tip {
        info!("fixup branch tip matches base; skipping PR");
        return Ok(());
    }

    vcs::strict(dry_run, ["push", "--force-with-lease", "origin", &branch].as_slice())?;

    let title = format!("Sync missing cookbooks to {} baseline", upstream.prefix);
    let body = format!("Cookbooks synced to baseline `{baseline_sha}`:\n\n{}", missing
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n"));

    match platform::find_pr_by_head(&branch)? {
        Some(pr) => {
            platform::edit_pr(dry_run, pr.number, None, Some(&body), &[], &[])?;
            info!("Updated fixup PR #{}", pr.number);
        }
        None => {
            let number = platform::create_pr(dry_run, &title, &body, &branch, &base, &[cfg.bot_label.clone()])?;
            info!("Opened fixup PR #{}", number);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Integration-style test against a real temp repo: `list_local_cookbooks`
    // must match only this upstream's prefix and skip its ignore list.
    mod with_real_repo {
        use super::*;
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

        #[test]
        fn lists_cookbooks_matching_prefix_and_skips_ignored() {
            let _lock = CWD_LOCK.lock().expect("lock cwd");
            let dir = tempfile::tempdir().expect("create temp dir");
            let _guard = DirGuard::change_to(dir.path());

            vcs::strict(false, ["init", "-b", "main"].as_slice()).expect("git init");
            vcs::strict(false, ["config", "user.email", "bot@example.com"].as_slice()).expect("config email");
            vcs::strict(false, ["config", "user.name", "line-cook tests"].as_slice()).expect("config name");

            for name in ["fb_nginx", "fb_redis", "fb_experimental", "ac_other"] {
                let dir_path = dir.path().join("cookbooks").join(name);
                fs::create_dir_all(&dir_path).expect("mkdir cookbook dir");
                fs::write(dir_path.join("recipe.rb"), "x\n").expect("write recipe");
            }
            vcs::strict(false, ["add", "."].as_slice()).expect("add");
            vcs::strict(false, ["commit", "-m", "seed"].as_slice()).expect("commit");

            let upstream = Upstream {
                key: "primary".into(),
                prefix: "fb".into(),
                remote_name: "fb_upstream".into(),
                repo_url: "https://example.com/fb.git".into(),
                branch: "main".into(),
                trailer_key: "Upstream-Commit".into(),
                ignore_dirs: vec!["fb_experimental".to_string()],
                is_primary: true,
            };

            let mut found = list_local_cookbooks(false, &upstream).expect("list_local_cookbooks");
            found.sort();
            assert_eq!(found, vec!["fb_nginx".to_string(), "fb_redis".to_string()]);
        }
    }
}

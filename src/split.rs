//! PR-split: carve a contiguous prefix or suffix of a sync PR's applied
//! upstream commits into a second PR.
//!
//! Triggered by a comment matching `<prefix> split <sha7>-<sha7>`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::error::SyncError;
use crate::platform::{self, Pr};
use crate::upstream::Registry;
use crate::vcs;

pub struct SplitArgs {
    pub from7: String,
    pub to7: String,
}

/// Parse `split <sha7>-<sha7>` (the leading `<prefix> split` has already
/// been stripped by the caller).
pub fn parse_split_args(rest: &str) -> Result<SplitArgs> {
    let rest = rest.trim();
    let (from, to) = rest
        .split_once('-')
        .ok_or_else(|| SyncError::Command("Invalid args for split; expected <sha7>-<sha7>".into()))?;
    let from = from.trim();
    let to = to.trim();
    if from.len() < 7 || to.len() < 7 || !from.chars().all(|c| c.is_ascii_hexdigit()) || !to.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid commit SHAs in split args: `{rest}`");
    }
    Ok(SplitArgs {
        from7: from.to_string(),
        to7: to.to_string(),
    })
}

fn determine_upstream<'a>(registry: &'a Registry, pr: &Pr) -> Option<&'a crate::upstream::Upstream> {
    registry
        .upstreams
        .iter()
        .find(|u| pr.head.contains(&format!("{}_", u.prefix)))
        .or_else(|| registry.upstreams.iter().find(|u| pr.body.contains(&u.trailer_key)))
}

/// Every `<trailer_key>: <hash>` trailer in the PR body, in the order they
/// appear (oldest applied first, by construction of `publish_sync_pr`).
fn body_trailers(pr: &Pr, trailer_key: &str) -> Vec<String> {
    crate::trailer::extract_trailers(&pr.body, trailer_key).unwrap_or_default()
}

fn resolve_full_hash<'a>(trailers: &'a [String], short: &str) -> Option<&'a str> {
    trailers
        .iter()
        .find(|h| h.starts_with(short))
        .map(|s| s.as_str())
}

pub fn run_split(dry_run: bool, cfg: &Config, registry: &Registry, pr_number: u64, rest: &str) -> Result<()> {
    match run_split_inner(dry_run, cfg, registry, pr_number, rest) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = platform::comment(dry_run, pr_number, &format!("Split failed: {e}"));
            Err(e)
        }
    }
}

fn run_split_inner(dry_run: bool, cfg: &Config, registry: &Registry, pr_number: u64, rest: &str) -> Result<()> {
    let args = parse_split_args(rest)?;
    let pr = platform::get_pr(pr_number)?;
    let upstream = determine_upstream(registry, &pr)
        .ok_or_else(|| SyncError::Command("Could not determine upstream for this PR".into()))?;

    let trailers = body_trailers(&pr, &upstream.trailer_key);
    let from_full = resolve_full_hash(&trailers, &args.from7)
        .ok_or_else(|| {
            SyncError::Command(format!("Invalid commit SHAs: `{}` not found in PR body", args.from7))
        })?
        .to_string();
    let to_full = resolve_full_hash(&trailers, &args.to7)
        .ok_or_else(|| {
            SyncError::Command(format!("Invalid commit SHAs: `{}` not found in PR body", args.to7))
        })?
        .to_string();

    let from_idx = trailers.iter().position(|h| *h == from_full).unwrap();
    let to_idx = trailers.iter().position(|h| *h == to_full).unwrap();
    if from_idx > to_idx {
        bail!("Invalid commit SHAs: range is reversed");
    }

    let is_prefix = from_idx == 0;
    let is_suffix = to_idx == trailers.len() - 1;
    if !is_prefix && !is_suffix {
        bail!("Split range must be contiguous from one end (prefix or suffix)");
    }

    let carved: Vec<String> = trailers[from_idx..=to_idx].to_vec();
    let kept: Vec<String> = trailers
        .iter()
        .enumerate()
        .filter(|(i, _)| !(*i >= from_idx && *i <= to_idx))
        .map(|(_, h)| h.clone())
        .collect();

    let base = if cfg.base_branch.trim().is_empty() {
        vcs::discover_default_base()?
    } else {
        cfg.base_branch.clone()
    };

    let new_branch = format!(
        "{}{}_split_{}_{}",
        cfg.pr_branch_prefix,
        upstream.prefix,
        &args.from7,
        &args.to7
    );
    vcs::strict(dry_run, ["fetch", "origin", &pr.head].as_slice())?;
    vcs::strict(dry_run, ["checkout", "-B", &new_branch, &base].as_slice())?;
    vcs::strict(
        dry_run,
        ["cherry-pick", &format!("{from_full}^..{to_full}")].as_slice(),
    )?;
    vcs::strict(dry_run, ["push", "--force-with-lease", "origin", &new_branch].as_slice())?;

    let new_title = format!("Sync {} from upstream (split)", upstream.prefix);
    let new_body = carved
        .iter()
        .map(|h| format!("- {}: {}\n", upstream.trailer_key, h))
        .collect::<String>();
    let new_number = platform::create_pr(
        dry_run,
        &new_title,
        &new_body,
        &new_branch,
        &base,
        &[cfg.bot_label.clone(), cfg.split_label.clone()],
    )?;

    let rewritten_body = kept
        .iter()
        .map(|h| format!("- {}: {}\n", upstream.trailer_key, h))
        .collect::<String>();
    platform::edit_pr(dry_run, pr_number, None, Some(&rewritten_body), &[], &[])?;
    platform::comment(
        dry_run,
        pr_number,
        &format!("Split off commits {}..{} into #{new_number}.", args.from7, args.to7),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_range() {
        let args = parse_split_args("abc1234-def5678").unwrap();
        assert_eq!(args.from7, "abc1234");
        assert_eq!(args.to7, "def5678");
    }

    #[test]
    fn rejects_missing_dash() {
        assert!(parse_split_args("abc1234def5678").is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(parse_split_args("zzzzzzz-def5678").is_err());
    }
}

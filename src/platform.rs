//! Hosting-platform (GitHub) helpers used by the orchestrators.
//!
//! Every write goes through [`gh_rw`] so dry-run elision happens at one
//! choke point; every read goes through [`gh_ro`]. Callers operate on the
//! typed [`Pr`]/[`Issue`] records below instead of raw JSON.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::SyncError;

/// Transient failures `gh` reports as plain text on stderr, worth one retry
/// rather than failing the whole sync/event run outright.
fn is_transient_gh_error(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("timed out")
        || msg.contains("connection reset")
        || msg.contains("API rate limit")
        || msg.contains("temporarily unavailable")
}

fn run_gh_with_retry(args: &[&str]) -> Result<String> {
    match crate::vcs::run("gh", args) {
        Ok(out) => Ok(out),
        Err(e) if is_transient_gh_error(&e) => {
            warn!("transient gh failure, retrying once: {:#}", e);
            crate::vcs::run("gh", args).map_err(|e| SyncError::Platform(e.to_string()).into())
        }
        Err(e) => Err(e),
    }
}

pub fn gh_ro(args: &[&str]) -> Result<String> {
    crate::vcs::verbose_log_cmd("gh", args);
    run_gh_with_retry(args)
}

pub fn gh_rw(dry: bool, args: &[&str]) -> Result<String> {
    if dry {
        let printable = if let Some(i) = args.iter().position(|a| *a == "--body" || *a == "-f") {
            let mut v = args.to_vec();
            if i + 1 < v.len() && v[i + 1].starts_with("body=") {
                v[i + 1] = "body=<elided-body>";
            } else if i + 1 < v.len() && *args.get(i) == Some(&"--body") {
                v[i + 1] = "<elided-body>";
            }
            v
        } else {
            args.to_vec()
        };
        info!("DRY-RUN: gh {}", crate::vcs::shellish(&printable));
        return Ok(String::new());
    }
    crate::vcs::verbose_log_cmd("gh", args);
    run_gh_with_retry(args)
}

#[derive(Debug, Deserialize, Clone)]
pub struct Pr {
    pub number: u64,
    #[serde(rename = "headRefName")]
    pub head: String,
    #[serde(rename = "baseRefName")]
    pub base: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Issue {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

const PR_FIELDS: &str = "number,headRefName,baseRefName,title,body,labels";
const ISSUE_FIELDS: &str = "number,title,body,labels";

pub fn get_pr(number: u64) -> Result<Pr> {
    let json = gh_ro(
        [
            "pr",
            "view",
            &number.to_string(),
            "--json",
            PR_FIELDS,
        ]
        .as_slice(),
    )?;
    Ok(serde_json::from_str(&json)?)
}

pub fn find_pr_by_head(head: &str) -> Result<Option<Pr>> {
    let json = gh_ro(
        [
            "pr", "list", "--state", "open", "--head", head, "--limit", "1", "--json", PR_FIELDS,
        ]
        .as_slice(),
    )?;
    let mut prs: Vec<Pr> = serde_json::from_str(&json)?;
    Ok(prs.pop())
}

pub fn create_pr(
    dry: bool,
    title: &str,
    body: &str,
    head: &str,
    base: &str,
    labels: &[String],
) -> Result<u64> {
    let mut args = vec![
        "pr", "create", "--title", title, "--body", body, "--head", head, "--base", base,
    ];
    for l in labels {
        args.push("--label");
        args.push(l);
    }
    let out = gh_rw(dry, &args)?;
    if dry {
        return Ok(0);
    }
    // `gh pr create` prints the PR URL; the trailing path segment is the number.
    let number = out
        .trim()
        .rsplit('/')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| anyhow!("failed to parse PR number from `gh pr create` output: {}", out))?;
    Ok(number)
}

pub fn edit_pr(
    dry: bool,
    number: u64,
    title: Option<&str>,
    body: Option<&str>,
    add_labels: &[String],
    remove_labels: &[String],
) -> Result<()> {
    let mut args = vec!["pr".to_string(), "edit".to_string(), number.to_string()];
    if let Some(t) = title {
        args.push("--title".into());
        args.push(t.into());
    }
    if let Some(b) = body {
        args.push("--body".into());
        args.push(b.into());
    }
    for l in add_labels {
        args.push("--add-label".into());
        args.push(l.clone());
    }
    for l in remove_labels {
        args.push("--remove-label".into());
        args.push(l.clone());
    }
    if args.len() == 3 {
        return Ok(());
    }
    let refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    gh_rw(dry, &refs)?;
    Ok(())
}

pub fn comment(dry: bool, pr_or_issue: u64, body: &str) -> Result<()> {
    gh_rw(
        dry,
        ["pr", "comment", &pr_or_issue.to_string(), "--body", body].as_slice(),
    )
    .or_else(|_| {
        gh_rw(
            dry,
            ["issue", "comment", &pr_or_issue.to_string(), "--body", body].as_slice(),
        )
    })?;
    Ok(())
}

pub fn list_issues(label: &str, state: &str) -> Result<Vec<Issue>> {
    let json = gh_ro(
        [
            "issue", "list", "--state", state, "--label", label, "--limit", "200", "--json",
            ISSUE_FIELDS,
        ]
        .as_slice(),
    )?;
    Ok(serde_json::from_str(&json)?)
}

pub fn create_issue(dry: bool, title: &str, body: &str, labels: &[String]) -> Result<u64> {
    let mut args = vec!["issue", "create", "--title", title, "--body", body];
    for l in labels {
        args.push("--label");
        args.push(l);
    }
    let out = gh_rw(dry, &args)?;
    if dry {
        return Ok(0);
    }
    let number = out
        .trim()
        .rsplit('/')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            anyhow!("failed to parse issue number from `gh issue create` output: {}", out)
        })?;
    Ok(number)
}

pub fn edit_issue(dry: bool, number: u64, body: Option<&str>, labels: &[String]) -> Result<()> {
    let mut args = vec!["issue".to_string(), "edit".to_string(), number.to_string()];
    if let Some(b) = body {
        args.push("--body".into());
        args.push(b.into());
    }
    for l in labels {
        args.push("--add-label".into());
        args.push(l.clone());
    }
    if args.len() == 3 {
        return Ok(());
    }
    let refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    gh_rw(dry, &refs)?;
    Ok(())
}

pub fn close_issue(dry: bool, number: u64, comment_body: Option<&str>) -> Result<()> {
    if let Some(body) = comment_body {
        gh_rw(
            dry,
            ["issue", "close", &number.to_string(), "--comment", body].as_slice(),
        )?;
    } else {
        gh_rw(dry, ["issue", "close", &number.to_string()].as_slice())?;
    }
    Ok(())
}

//! Parse `<trailer_key>: <hash>` provenance trailers out of commit messages,
//! and recover each upstream's current pointer from downstream history.
//!
//! Commit bodies are read via [`vcs::log_records`]'s null/record-separator
//! format so a trailer regex can scan full, unambiguous message bodies
//! rather than line-by-line `git log` output.

use anyhow::Result;
use regex::Regex;

use crate::upstream::Upstream;
use crate::vcs;

#[derive(Debug, Clone)]
pub struct TrailerHit {
    pub commit: String,
    pub upstream_sha: String,
}

fn trailer_regex(trailer_key: &str) -> Result<Regex> {
    Ok(Regex::new(&format!(
        r"(?m)^{}:\s*([0-9a-fA-F]{{7,40}})\s*$",
        regex::escape(trailer_key)
    ))?)
}

/// Extract every `<trailer_key>: <hash>` line found in `message`, in the
/// order they appear.
pub fn extract_trailers(message: &str, trailer_key: &str) -> Result<Vec<String>> {
    let re = trailer_regex(trailer_key)?;
    Ok(re
        .captures_iter(message)
        .map(|c| c.get(1).unwrap().as_str().to_string())
        .collect())
}

/// Scan `range` on the downstream default branch, newest-first, for trailers
/// belonging to `upstream`. Returns one [`TrailerHit`] per commit that
/// carries at least one qualifying trailer, oldest-to-newest as produced by
/// the underlying `--reverse` log (the caller reverses when it wants
/// newest-first).
fn trailer_hits(dry_run: bool, range: &str, upstream: &Upstream) -> Result<Vec<(String, Vec<String>)>> {
    let raw = vcs::log_records(dry_run, range, None)?;
    let mut out = Vec::new();
    for chunk in raw.split('\u{001e}') {
        let chunk = chunk.trim_end_matches('\n');
        if chunk.trim().is_empty() {
            continue;
        }
        let mut parts = chunk.splitn(2, '\0');
        let sha = parts.next().unwrap_or_default().trim().to_string();
        let message = parts.next().unwrap_or_default().to_string();
        let hashes = extract_trailers(&message, &upstream.trailer_key)?;
        if !hashes.is_empty() {
            out.push((sha, hashes));
        }
    }
    Ok(out)
}

/// Recover the current pointer for `upstream` from the downstream default
/// branch's full history. Returns `None` if no qualifying trailer exists
/// anywhere (onboarding state).
///
/// Multi-trailer commits (squash-merges) are reduced by upstream ancestry:
/// among the hashes in that one commit, discard any that are a strict
/// ancestor of another in the same commit, preferring the newest. A tie
/// (neither an ancestor of the other) is resolved by taking the first
/// trailer encountered in the commit message.
pub fn pointer_for(dry_run: bool, base_branch: &str, upstream: &Upstream) -> Result<Option<String>> {
    let hits = trailer_hits(dry_run, base_branch, upstream)?;
    for (_, hashes) in hits.into_iter().rev() {
        if hashes.len() == 1 {
            return Ok(Some(hashes[0].clone()));
        }
        return Ok(Some(reduce_by_ancestry(dry_run, &hashes)?));
    }
    Ok(None)
}

fn reduce_by_ancestry(dry_run: bool, hashes: &[String]) -> Result<String> {
    let mut survivors: Vec<String> = hashes.to_vec();
    for a in hashes {
        for b in hashes {
            if a == b {
                continue;
            }
            // If `a` is an ancestor of `b` on the upstream remote, `a` is
            // superseded and drops out.
            if vcs::is_ancestor(dry_run, a, b).unwrap_or(false) {
                survivors.retain(|x| x != a);
            }
        }
    }
    Ok(survivors.first().cloned().unwrap_or_else(|| hashes[0].clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_single_trailer() {
        let msg = "Update nginx config\n\nUpstream-Commit: abc1234\n";
        let hits = extract_trailers(msg, "Upstream-Commit").unwrap();
        assert_eq!(hits, vec!["abc1234".to_string()]);
    }

    #[test]
    fn extract_prefixed_trailer_key_ignores_bare_one() {
        let msg = "Squashed\n\nac_Upstream-Commit: 1111111\nUpstream-Commit: 2222222\n";
        let ac = extract_trailers(msg, "ac_Upstream-Commit").unwrap();
        assert_eq!(ac, vec!["1111111".to_string()]);
        let fb = extract_trailers(msg, "Upstream-Commit").unwrap();
        assert_eq!(fb, vec!["2222222".to_string()]);
    }

    #[test]
    fn extract_multiple_trailers_in_order() {
        let msg = "Squash merge\n\nUpstream-Commit: aaa1111\nUpstream-Commit: bbb2222\n";
        let hits = extract_trailers(msg, "Upstream-Commit").unwrap();
        assert_eq!(hits, vec!["aaa1111".to_string(), "bbb2222".to_string()]);
    }

    #[test]
    fn no_trailer_yields_empty() {
        let msg = "Just a normal commit\n";
        assert!(extract_trailers(msg, "Upstream-Commit").unwrap().is_empty());
    }
}

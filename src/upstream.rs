//! Upstream registry: resolves the configured upstreams into a typed,
//! immutable list with derived fields materialized once at construction
//! rather than recomputed on every call.

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::error::SyncError;

/// One upstream repository this bot mirrors cookbooks from.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub key: String,
    pub prefix: String,
    pub remote_name: String,
    pub repo_url: String,
    pub branch: String,
    pub trailer_key: String,
    pub ignore_dirs: Vec<String>,
    pub is_primary: bool,
}

pub struct Registry {
    pub upstreams: Vec<Upstream>,
}

impl Registry {
    pub fn primary(&self) -> &Upstream {
        self.upstreams
            .iter()
            .find(|u| u.is_primary)
            .expect("registry always has exactly one primary upstream")
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.prefix == prefix)
    }

    /// Reconcile each upstream's git remote with its configured URL, adding
    /// or repointing remotes that don't match.
    pub fn reconcile_remotes(&self, dry_run: bool) -> Result<()> {
        for u in &self.upstreams {
            match crate::vcs::remote_url(&u.remote_name)? {
                None => {
                    info!("Adding remote {} -> {}", u.remote_name, u.repo_url);
                    crate::vcs::add_remote(dry_run, &u.remote_name, &u.repo_url)?;
                }
                Some(current) if current != u.repo_url => {
                    info!(
                        "Remote {} points at {} but config says {}; updating",
                        u.remote_name, current, u.repo_url
                    );
                    crate::vcs::set_remote_url(dry_run, &u.remote_name, &u.repo_url)?;
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

pub fn build_registry(cfg: &Config) -> Result<Registry> {
    let mut upstreams = Vec::new();

    if let Some(primary) = &cfg.upstream_overrides {
        let prefix = primary.prefix.clone().ok_or_else(|| {
            SyncError::Config("upstream_overrides: missing required 'prefix'".into())
        })?;
        let repo_url = primary.repo_url.clone().ok_or_else(|| {
            SyncError::Config("upstream_overrides: missing required 'repo_url'".into())
        })?;
        upstreams.push(Upstream {
            key: "primary".to_string(),
            remote_name: format!("{prefix}_upstream"),
            trailer_key: "Upstream-Commit".to_string(),
            branch: primary.branch.clone().unwrap_or_else(|| "main".to_string()),
            ignore_dirs: primary.ignore_cookbooks.clone(),
            is_primary: true,
            prefix,
            repo_url,
        });
    }

    for (key, u) in &cfg.universe_upstreams {
        let prefix = u.prefix.clone().ok_or_else(|| {
            SyncError::Config(format!("universe_upstreams.{key}: missing required 'prefix'"))
        })?;
        let repo_url = u.repo_url.clone().ok_or_else(|| {
            SyncError::Config(format!("universe_upstreams.{key}: missing required 'repo_url'"))
        })?;
        upstreams.push(Upstream {
            key: key.clone(),
            remote_name: format!("{prefix}_upstream"),
            trailer_key: format!("{prefix}_Upstream-Commit"),
            branch: u.branch.clone().unwrap_or_else(|| "main".to_string()),
            ignore_dirs: u.ignore_cookbooks.clone(),
            is_primary: false,
            prefix,
            repo_url,
        });
    }

    let mut seen_prefixes = std::collections::HashSet::new();
    let mut seen_keys = std::collections::HashSet::new();
    for u in &upstreams {
        if !seen_prefixes.insert(u.prefix.clone()) {
            return Err(SyncError::Config(format!("Duplicate upstream prefix '{}'", u.prefix)).into());
        }
        if !seen_keys.insert(u.key.clone()) {
            return Err(SyncError::Config(format!("Duplicate upstream key '{}'", u.key)).into());
        }
    }
    if !upstreams.iter().any(|u| u.is_primary) {
        return Err(SyncError::Config("no primary upstream configured".into()).into());
    }

    Ok(Registry { upstreams })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamOverride;
    use std::collections::HashMap;

    fn cfg_with(primary_prefix: &str, universe: HashMap<String, UpstreamOverride>) -> Config {
        Config {
            bot_label: "line-cook".into(),
            split_label: "line-cook-split".into(),
            bot_command_prefix: "#linecook".into(),
            base_branch: "main".into(),
            pr_branch_prefix: "line-cook/".into(),
            upstream_overrides: Some(UpstreamOverride {
                prefix: Some(primary_prefix.to_string()),
                repo_url: Some("https://example.com/primary.git".into()),
                branch: Some("main".into()),
                ignore_cookbooks: vec![],
            }),
            universe_upstreams: universe,
        }
    }

    #[test]
    fn primary_gets_bare_trailer_key() {
        let registry = build_registry(&cfg_with("fb", HashMap::new())).expect("build registry");
        assert_eq!(registry.primary().trailer_key, "Upstream-Commit");
        assert_eq!(registry.primary().remote_name, "fb_upstream");
    }

    #[test]
    fn non_primary_gets_prefixed_trailer_key() {
        let mut universe = HashMap::new();
        universe.insert(
            "acme".to_string(),
            UpstreamOverride {
                prefix: Some("ac".into()),
                repo_url: Some("https://example.com/acme.git".into()),
                branch: None,
                ignore_cookbooks: vec![],
            },
        );
        let registry = build_registry(&cfg_with("fb", universe)).expect("build registry");
        let ac = registry.by_prefix("ac").expect("ac upstream present");
        assert_eq!(ac.trailer_key, "ac_Upstream-Commit");
        assert!(!ac.is_primary);
    }

    #[test]
    fn duplicate_prefix_across_primary_and_universe_is_rejected() {
        let mut universe = HashMap::new();
        universe.insert(
            "dupe".to_string(),
            UpstreamOverride {
                prefix: Some("fb".into()),
                repo_url: Some("https://example.com/other.git".into()),
                branch: None,
                ignore_cookbooks: vec![],
            },
        );
        let err = build_registry(&cfg_with("fb", universe)).unwrap_err().to_string();
        assert!(err.contains("Duplicate upstream prefix"), "{err}");
    }
}

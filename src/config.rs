//! Repository configuration for the sync bot.
//!
//! Loaded from a single YAML file (`--config`, default `./linecook.yml` in
//! the working directory) and validated eagerly so a bad config fails before
//! any subprocess runs.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Fallback primary upstream when `upstream_overrides` is absent, matching
/// the default the original implementation shipped with.
const DEFAULT_PRIMARY_PREFIX: &str = "fb";
const DEFAULT_PRIMARY_REPO: &str = "https://github.com/facebook/chef-cookbooks.git";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UpstreamOverride {
    pub prefix: Option<String>,
    pub repo_url: Option<String>,
    pub branch: Option<String>,
    #[serde(default)]
    pub ignore_cookbooks: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    pub bot_label: Option<String>,
    pub split_label: Option<String>,
    pub bot_command_prefix: Option<String>,
    pub base_branch: Option<String>,
    pub pr_branch_prefix: Option<String>,
    pub upstream_overrides: Option<UpstreamOverride>,
    #[serde(default)]
    pub universe_upstreams: HashMap<String, UpstreamOverride>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_label: String,
    pub split_label: String,
    pub bot_command_prefix: String,
    /// Empty string means "discover via origin/HEAD at process start".
    pub base_branch: String,
    pub pr_branch_prefix: String,
    pub upstream_overrides: Option<UpstreamOverride>,
    pub universe_upstreams: HashMap<String, UpstreamOverride>,
}

fn default_config() -> Config {
    Config {
        bot_label: "line-cook".to_string(),
        split_label: "line-cook-split".to_string(),
        bot_command_prefix: "#linecook".to_string(),
        base_branch: String::new(),
        pr_branch_prefix: "line-cook/".to_string(),
        upstream_overrides: None,
        universe_upstreams: HashMap::new(),
    }
}

fn read_config_file(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let cfg: FileConfig = serde_yaml::from_str(&content)?;
    Ok(Some(cfg))
}

fn apply_overrides(config: &Config, overrides: FileConfig) -> Config {
    let mut merged = config.clone();
    if let Some(v) = overrides.bot_label {
        merged.bot_label = v;
    }
    if let Some(v) = overrides.split_label {
        merged.split_label = v;
    }
    if let Some(v) = overrides.bot_command_prefix {
        merged.bot_command_prefix = v;
    }
    if let Some(v) = overrides.base_branch {
        merged.base_branch = v;
    }
    if let Some(v) = overrides.pr_branch_prefix {
        merged.pr_branch_prefix = v;
    }
    if overrides.upstream_overrides.is_some() {
        merged.upstream_overrides = overrides.upstream_overrides;
    }
    if !overrides.universe_upstreams.is_empty() {
        merged.universe_upstreams = overrides.universe_upstreams;
    }
    merged
}

fn normalize_config(config: &mut Config) {
    let mut prefix = config.pr_branch_prefix.trim_end_matches('/').to_string();
    prefix.push('/');
    config.pr_branch_prefix = prefix;
    if config.upstream_overrides.is_none() {
        config.upstream_overrides = Some(UpstreamOverride {
            prefix: Some(DEFAULT_PRIMARY_PREFIX.to_string()),
            repo_url: Some(DEFAULT_PRIMARY_REPO.to_string()),
            branch: None,
            ignore_cookbooks: Vec::new(),
        });
    }
}

/// Validate that the primary upstream and every named universe upstream
/// declare a prefix and repo_url, and that no two upstreams share a prefix.
///
/// Error messages intentionally match the original implementation's wording
/// ("Duplicate", "missing required 'prefix'", "missing required 'repo_url'")
/// so existing CI failure triage (grepping job logs) keeps working.
pub fn validate_config(config: &Config) -> Result<()> {
    use crate::error::SyncError;

    let mut seen_prefixes: Vec<String> = Vec::new();

    if let Some(primary) = &config.upstream_overrides {
        let prefix = primary.prefix.clone().ok_or_else(|| {
            SyncError::Config("upstream_overrides: missing required 'prefix'".into())
        })?;
        if primary.repo_url.is_none() {
            return Err(SyncError::Config("upstream_overrides: missing required 'repo_url'".into()).into());
        }
        seen_prefixes.push(prefix);
    }

    for (key, upstream) in &config.universe_upstreams {
        let prefix = upstream.prefix.clone().ok_or_else(|| {
            SyncError::Config(format!("universe_upstreams.{key}: missing required 'prefix'"))
        })?;
        if upstream.repo_url.is_none() {
            return Err(SyncError::Config(format!(
                "universe_upstreams.{key}: missing required 'repo_url'"
            ))
            .into());
        }
        if seen_prefixes.contains(&prefix) {
            return Err(SyncError::Config(format!(
                "Duplicate upstream prefix '{prefix}' (from universe_upstreams.{key})"
            ))
            .into());
        }
        seen_prefixes.push(prefix);
    }

    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let mut merged = default_config();
    if let Some(file_cfg) = read_config_file(path)? {
        merged = apply_overrides(&merged, file_cfg);
    }
    normalize_config(&mut merged);
    validate_config(&merged)?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn base_cfg() -> Config {
        let mut c = default_config();
        normalize_config(&mut c);
        c
    }

    #[test]
    fn defaults_fill_in_primary_upstream() {
        let cfg = base_cfg();
        let primary = cfg.upstream_overrides.expect("default primary present");
        assert_eq!(primary.prefix.as_deref(), Some(DEFAULT_PRIMARY_PREFIX));
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let mut cfg = base_cfg();
        cfg.upstream_overrides = Some(UpstreamOverride {
            prefix: None,
            repo_url: Some("https://example.com/x.git".into()),
            branch: None,
            ignore_cookbooks: vec![],
        });
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("missing required 'prefix'"), "{err}");
    }

    #[test]
    fn missing_repo_url_is_rejected() {
        let mut cfg = base_cfg();
        cfg.upstream_overrides = Some(UpstreamOverride {
            prefix: Some("fb".into()),
            repo_url: None,
            branch: None,
            ignore_cookbooks: vec![],
        });
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("missing required 'repo_url'"), "{err}");
    }

    #[test]
    fn duplicate_prefix_across_universe_is_rejected() {
        let mut cfg = base_cfg();
        let mut universe: Map<String, UpstreamOverride> = Map::new();
        universe.insert(
            "dupe".to_string(),
            UpstreamOverride {
                prefix: Some(DEFAULT_PRIMARY_PREFIX.to_string()),
                repo_url: Some("https://example.com/other.git".into()),
                branch: None,
                ignore_cookbooks: vec![],
            },
        );
        cfg.universe_upstreams = universe;
        let err = validate_config(&cfg).unwrap_err().to_string();
        assert!(err.contains("Duplicate"), "{err}");
    }
}

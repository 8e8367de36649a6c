//! Classifies repository paths into `(upstream, cookbook)` pairs.
//!
//! Only paths under `cookbooks/<name>/...` are ever in scope; `<name>` must
//! start with some upstream's `prefix` followed by `_` and must not be in
//! that upstream's ignore list.

use crate::upstream::{Registry, Upstream};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub cookbook: String,
}

pub fn classify<'a>(registry: &'a Registry, path: &str) -> Option<(&'a Upstream, Classified)> {
    let rest = path.strip_prefix("cookbooks/")?;
    let cookbook = rest.split('/').next()?;
    if cookbook.is_empty() {
        return None;
    }
    let upstream = registry.upstreams.iter().find(|u| {
        cookbook
            .strip_prefix(u.prefix.as_str())
            .and_then(|tail| tail.strip_prefix('_'))
            .is_some()
    })?;
    if upstream.ignore_dirs.iter().any(|d| d == cookbook) {
        return None;
    }
    Some((
        upstream,
        Classified {
            cookbook: cookbook.to_string(),
        },
    ))
}

/// True if `path` is in scope for `upstream` specifically.
pub fn in_scope_for(registry: &Registry, upstream: &Upstream, path: &str) -> bool {
    match classify(registry, path) {
        Some((u, _)) => u.prefix == upstream.prefix,
        None => false,
    }
}

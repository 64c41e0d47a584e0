//! Parses request paths against the module-proxy URL grammar.
//!
//! ```text
//! /<module>/@v/list               -> list
//! /<module>/@v/<version>.info     -> info
//! /<module>/@v/<version>.mod      -> mod
//! /<module>/@v/<version>.zip      -> zip
//! /<module>/@latest               -> info, version = "latest"
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::version::Version;

static VERSION_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v(?:[2-9]|[1-9][0-9]+)$").expect("valid regex"));

/// What the dispatcher should do with a parsed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `@v/list` — newline-separated list of known versions.
    List,
    /// `.info` or `@latest` — JSON `{Version, Time}`.
    Info,
    /// `.mod` — the module's `go.mod`-equivalent manifest file.
    Mod,
    /// `.zip` — the module source archive.
    Zip,
}

/// A parsed module-protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub module: String,
    /// Empty for `List`, `"latest"` for an `@latest` request, otherwise a
    /// literal tag-version string as requested by the client.
    pub version: String,
    pub action: Action,
}

/// Parses a request path (including the leading `/`) into a [`Route`].
pub fn parse(path: &str) -> Result<Route> {
    if path.is_empty() {
        return Err(Error::BadUrl("expected / at [0]".into()));
    }
    let s = &path[1..];

    if let Some(module) = s.strip_suffix("/@latest") {
        return Ok(Route {
            module: module.to_string(),
            version: "latest".to_string(),
            action: Action::Info,
        });
    }

    let Some(split) = s.find("/@v/") else {
        return Err(Error::BadUrl("expected @v".into()));
    };
    let module = &s[..split];
    let rest = &s[split + 4..];

    if rest == "list" {
        return Ok(Route {
            module: module.to_string(),
            version: String::new(),
            action: Action::List,
        });
    }

    if let Some(version) = rest.strip_suffix(".info") {
        Ok(Route {
            module: module.to_string(),
            version: version.to_string(),
            action: Action::Info,
        })
    } else if let Some(version) = rest.strip_suffix(".mod") {
        Ok(Route {
            module: module.to_string(),
            version: version.to_string(),
            action: Action::Mod,
        })
    } else if let Some(version) = rest.strip_suffix(".zip") {
        Ok(Route {
            module: module.to_string(),
            version: version.to_string(),
            action: Action::Zip,
        })
    } else {
        Err(Error::BadUrl("expected suffix .info, .mod or .zip".into()))
    }
}

/// The `/vN` (N >= 2) major-version suffix carried by a module path, or `1`
/// if the module path carries none.
#[must_use]
pub fn version_suffix(module: &str) -> u64 {
    match VERSION_SUFFIX_RE.find(module) {
        Some(m) => m.as_str()[2..].parse().unwrap_or_else(|_| {
            tracing::warn!(module, "invalid major version suffix, defaulting to 1");
            1
        }),
        None => 1,
    }
}

/// Returns `module` with its major-version suffix replaced to match `major`
/// (dropped entirely for `major <= 1`).
#[must_use]
pub fn set_version_suffix(module: &str, major: u64) -> String {
    let base = remove_version_suffix(module);
    if major <= 1 {
        base
    } else {
        format!("{base}/v{major}")
    }
}

/// Returns `module` with any `/vN` (N >= 2) suffix stripped.
#[must_use]
pub fn remove_version_suffix(module: &str) -> String {
    match VERSION_SUFFIX_RE.find(module) {
        Some(m) => module[..m.start()].to_string(),
        None => module.to_string(),
    }
}

/// The `/vN` path segment (N > 1) that archive entries for `version` must be
/// prefixed with, or empty for major 0/1.
pub fn version_dir(tag_version: &str) -> Result<String> {
    let v = Version::parse_tag(tag_version)?;
    Ok(if v.major > 1 {
        format!("/v{}", v.major)
    } else {
        String::new()
    })
}

/// `true` if `name` denotes a directory entry (ends with `/`).
#[must_use]
pub fn is_dir(name: &str) -> bool {
    name.ends_with('/')
}

/// Strips the first path segment of `name`, or `""` if there is none.
#[must_use]
pub fn trim_first_dir(name: &str) -> String {
    match name.find('/') {
        Some(i) if i > 0 => name[i + 1..].to_string(),
        _ => String::new(),
    }
}

/// Strips an archive's wrapper directory from `name`, then `dir` if `name`
/// is under it. Returns `""` (caller should skip the entry) for directory
/// entries, entries with no wrapper directory, or entries outside `dir`.
/// A non-empty result always starts with `/`.
#[must_use]
pub fn trim_name(dir: &str, name: &str) -> String {
    if is_dir(name) {
        return String::new();
    }
    let s = trim_first_dir(name);
    if s.is_empty() {
        return String::new();
    }
    if dir.is_empty() {
        return format!("/{s}");
    }
    match s.find('/') {
        Some(i) if i > 0 && &s[..i] == dir => s[dir.len()..].to_string(),
        _ => String::new(),
    }
}

/// Strips leading/trailing `/` from a configured archive subdirectory.
#[must_use]
pub fn unify_dir(dir: &str) -> String {
    dir.trim_matches('/').to_string()
}

/// Deduplicates and sorts two version lists (used to merge a backend's tag
/// list with already-cached versions for `@v/list`).
#[must_use]
pub fn merge_versions(a: &[String], b: &[String]) -> Vec<String> {
    if b.is_empty() {
        return a.to_vec();
    }
    let mut set: std::collections::BTreeSet<String> = a.iter().cloned().collect();
    set.extend(b.iter().cloned());
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list() {
        let r = parse("/example.com/mod/@v/list").unwrap();
        assert_eq!(r.module, "example.com/mod");
        assert_eq!(r.action, Action::List);
    }

    #[test]
    fn parses_info_mod_zip() {
        let r = parse("/example.com/mod/@v/v1.2.3.info").unwrap();
        assert_eq!(r.version, "v1.2.3");
        assert_eq!(r.action, Action::Info);

        let r = parse("/example.com/mod/@v/v1.2.3.mod").unwrap();
        assert_eq!(r.action, Action::Mod);

        let r = parse("/example.com/mod/@v/v1.2.3.zip").unwrap();
        assert_eq!(r.action, Action::Zip);
    }

    #[test]
    fn parses_latest() {
        let r = parse("/example.com/mod/@latest").unwrap();
        assert_eq!(r.module, "example.com/mod");
        assert_eq!(r.version, "latest");
        assert_eq!(r.action, Action::Info);
    }

    #[test]
    fn rejects_missing_at_v() {
        assert!(parse("/example.com/mod/v1.2.3.info").is_err());
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse("/example.com/mod/@v/v1.2.3.tar").is_err());
    }

    #[test]
    fn version_suffix_defaults_to_one() {
        assert_eq!(version_suffix("example.com/mod"), 1);
        assert_eq!(version_suffix("example.com/mod/v1"), 1);
        assert_eq!(version_suffix("example.com/mod/v2"), 2);
        assert_eq!(version_suffix("example.com/mod/v10"), 10);
    }

    #[test]
    fn set_and_remove_version_suffix_round_trip() {
        assert_eq!(set_version_suffix("example.com/mod", 3), "example.com/mod/v3");
        assert_eq!(set_version_suffix("example.com/mod/v3", 1), "example.com/mod");
        assert_eq!(remove_version_suffix("example.com/mod/v3"), "example.com/mod");
    }

    #[test]
    fn version_dir_empty_below_major_two() {
        assert_eq!(version_dir("v1.2.3").unwrap(), "");
        assert_eq!(version_dir("v0.9.0").unwrap(), "");
    }

    #[test]
    fn version_dir_present_from_major_two() {
        assert_eq!(version_dir("v2.0.0").unwrap(), "/v2");
        assert_eq!(version_dir("v10.0.0").unwrap(), "/v10");
    }

    #[test]
    fn trim_name_strips_wrapper_and_configured_dir() {
        assert_eq!(trim_name("", "wrapper-abc/go.mod"), "/go.mod");
        assert_eq!(trim_name("sub", "wrapper-abc/sub/go.mod"), "/go.mod");
        assert_eq!(trim_name("sub", "wrapper-abc/other/go.mod"), "");
        assert_eq!(trim_name("", "wrapper-abc/"), "");
    }

    #[test]
    fn unify_dir_trims_slashes() {
        assert_eq!(unify_dir("/sub/"), "sub");
        assert_eq!(unify_dir("/"), "");
        assert_eq!(unify_dir(""), "");
    }

    #[test]
    fn merge_versions_dedupes_and_sorts() {
        let a = vec!["v1.0.0".to_string(), "v1.2.0".to_string()];
        let b = vec!["v1.2.0".to_string(), "v0.9.0".to_string()];
        assert_eq!(
            merge_versions(&a, &b),
            vec!["v0.9.0".to_string(), "v1.0.0".to_string(), "v1.2.0".to_string()]
        );
    }

    #[test]
    fn merge_versions_returns_a_when_b_empty() {
        let a = vec!["v1.0.0".to_string()];
        assert_eq!(merge_versions(&a, &[]), a);
    }
}

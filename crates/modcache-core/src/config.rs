//! Loading and validating the service's JSON configuration file.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Top-level configuration, loaded verbatim from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address to bind the HTTP listener to, e.g. `"0.0.0.0:8080"`.
    pub addr: String,
    /// Chroot directory for the on-disk module cache.
    pub storage: String,
    /// `tracing` filter directive: `error`, `warn`, `info`, `debug`, `trace`,
    /// or empty (treated as `trace`).
    #[serde(default)]
    pub log_level: String,
    /// Upstream to 307-redirect unconfigured modules to (no trailing slash).
    pub default_go_proxy_url: String,
    /// Path segment the generic-downloads surface is served under; defaults
    /// to `dl` when empty.
    #[serde(default)]
    pub downloads_prefix: String,
    /// Modules this proxy knows about, by their module path.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    /// Named, reusable backend instances referenced from `modules`/`downloads`.
    #[serde(default)]
    pub sources: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Named generic-artifact surfaces under `downloads_prefix`.
    #[serde(default)]
    pub downloads: HashMap<String, DownloadConfig>,
    /// Static version metadata reported on `/versions.json`.
    #[serde(default)]
    pub versions: VersionsConfig,
}

/// One configured module. A `None` `source` marks the module disabled
/// (matched by the router but always served a 404, no fall-through).
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub source: Option<String>,
    #[serde(default)]
    pub source_params: serde_json::Value,
}

/// A generic-artifact surface bound to one named source.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    pub mode: String,
    pub source: String,
    #[serde(default)]
    pub source_params: serde_json::Value,
}

/// Static metadata reported on `/versions.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionsConfig {
    #[serde(default)]
    pub go: String,
    #[serde(default)]
    pub modules: Vec<String>,
}

/// The default `downloads_prefix` path segment (no leading/trailing slash).
pub const DEFAULT_DOWNLOADS_PREFIX: &str = "dl";

impl Config {
    /// Loads and lightly validates the config at `path`.
    ///
    /// Rust's `serde_json` decodes `project_id` and similar integer fields
    /// directly into `i64` without the arbitrary-precision-number workaround
    /// the Go implementation needed (`encoding/json` otherwise widens all
    /// numbers to `float64`), so no equivalent of its `UseNumber()` decoding
    /// mode is required here.
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).map_err(|e| Error::Config(format!("unable to load config: {e}")))?;
        let config: Self =
            serde_json::from_slice(&data).map_err(|e| Error::Config(format!("unable to load config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_go_proxy_url.is_empty() {
            return Err(Error::Config("missing default_go_proxy_url configuration".into()));
        }
        if reqwest::Url::parse(&self.default_go_proxy_url).is_err() {
            return Err(Error::Config(format!(
                "invalid default_go_proxy_url: {}",
                self.default_go_proxy_url
            )));
        }
        if self.default_go_proxy_url.ends_with('/') {
            return Err(Error::Config("invalid default_go_proxy_url: unexpected ending slash".into()));
        }
        Ok(())
    }

    /// The `/<prefix>` path the downloads surface is served under.
    #[must_use]
    pub fn downloads_path_prefix(&self) -> String {
        if self.downloads_prefix.is_empty() {
            format!("/{DEFAULT_DOWNLOADS_PREFIX}")
        } else {
            format!("/{}", percent_encode_path_segment(&self.downloads_prefix))
        }
    }
}

fn percent_encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            },
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config() {
        let file = write_config(
            r#"{"addr": ":8080", "storage": "/tmp/store", "default_go_proxy_url": "https://proxy.golang.org"}"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.addr, ":8080");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn rejects_missing_default_proxy_url() {
        let file = write_config(r#"{"addr": ":8080", "storage": "/tmp/store", "default_go_proxy_url": ""}"#);
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn rejects_trailing_slash_on_default_proxy_url() {
        let file = write_config(
            r#"{"addr": ":8080", "storage": "/tmp/store", "default_go_proxy_url": "https://proxy.golang.org/"}"#,
        );
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn downloads_prefix_defaults_and_escapes() {
        let file = write_config(
            r#"{"addr": ":8080", "storage": "/tmp/store", "default_go_proxy_url": "https://proxy.golang.org"}"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.downloads_path_prefix(), "/dl");
    }

    #[test]
    fn parses_disabled_module() {
        let file = write_config(
            r#"{"addr": ":8080", "storage": "/tmp/store", "default_go_proxy_url": "https://proxy.golang.org",
                "modules": [{"name": "example.com/legacy", "source": null}]}"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.modules.len(), 1);
        assert!(config.modules[0].source.is_none());
    }
}

//! Pluggable upstream backends.
//!
//! A [`Source`] is constructed unparametrized from a config's `sources[]`
//! entry, then bound to a specific module with [`Source::parametrize`]
//! before any of the module-specific methods are called. This mirrors the
//! two-phase construction used so the same backend instance (and its shared
//! `reqwest::Client`) can serve many modules.

pub mod gitlab;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::version::Version;

/// An upstream capable of listing/resolving/downloading module versions.
#[async_trait]
pub trait Source: Send + Sync {
    /// Binds this source to one configured module.
    fn parametrize(&self, module: &str, params: &serde_json::Value) -> Result<Box<dyn Source>>;

    /// Key/value pairs describing this source's configuration, for the
    /// dashboard. Secrets (auth tokens) are never included.
    fn config_preview(&self) -> Vec<(String, String)>;

    /// Lists tag-version strings for `major` (major 1 also matches tags
    /// with no explicit major, i.e. `v0.x.y` pre-1.0 releases).
    async fn list_versions(&self, major: u64) -> Result<Vec<String>>;

    /// The newest version for `major`, preferring a stable release.
    async fn latest_version(&self, major: u64) -> Result<String> {
        let versions = self.list_versions(major).await?;
        let mut latest = Version::zero();
        let mut latest_stable: Option<Version> = None;
        for raw in &versions {
            let v = Version::parse_tag(raw)?;
            latest = latest.latest(&v);
            if v.pre_release.is_empty() {
                latest_stable = Some(match latest_stable {
                    Some(ls) => ls.latest(&v),
                    None => v,
                });
            }
        }
        if let Some(stable) = latest_stable {
            latest = stable;
        }
        Ok(latest.render_tag())
    }

    /// Downloads and materializes `version` into `dir/<module>.{info,mod,zip}`.
    async fn download_module(&self, dir: &Path, version: &str) -> Result<()>;

    /// Binds a generic-downloads capability to this source.
    fn parametrize_downloads(
        &self,
        name: &str,
        mode: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Downloads>>;
}

/// The generic-artifacts side channel alongside the module protocol.
#[async_trait]
pub trait Downloads: Send + Sync {
    /// Key/value pairs describing this download's configuration.
    fn config_preview(&self) -> Vec<(String, String)>;

    /// Streams the artifact for `version`/`arch` to the caller, returning
    /// its bytes (the HTTP layer is responsible for the response).
    async fn fetch(&self, version: &Version, arch: &str) -> Result<bytes::Bytes>;

    /// The newest version across all pages of the artifact listing.
    async fn latest_download_version(&self) -> Result<Version>;
}

/// Constructs backends by the `type` name used in a config's `sources[]`.
pub struct Registry;

impl Registry {
    /// Builds an unparametrized [`Source`] from a `sources[]` entry.
    pub fn build(kind: &str, config: &serde_json::Value) -> Result<Box<dyn Source>> {
        match kind {
            gitlab::TYPE => Ok(Box::new(gitlab::GitlabSource::new(config)?)),
            other => Err(crate::error::Error::Config(format!(
                "unknown source type {other:?}"
            ))),
        }
    }
}

//! On-disk cache of materialized modules.
//!
//! Each module lives under `<chroot>/<module-without-major-suffix>/` as a
//! flat directory of `<version>.info` / `.mod` / `.zip` triples, guarded by
//! a sibling `<version>.lock` sentinel while a [`crate::materializer::Materializer`]
//! is writing it.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::router;
use crate::version::Version;

/// Size and modification time of a stored `(module, version)` pair, or a
/// locked placeholder if a writer currently holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredVersion {
    pub version: String,
    pub size: u64,
    pub downloaded: Option<SystemTime>,
    pub locked: bool,
}

/// All versions stored for one module, used by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredModule {
    pub name: String,
    pub versions: Vec<StoredVersion>,
    pub total_size: u64,
}

/// A chroot-rooted directory cache of materialized modules.
#[derive(Debug, Clone)]
pub struct Store {
    chroot: PathBuf,
}

impl Store {
    /// Opens (creating if absent) a cache rooted at `chroot`.
    pub fn new(chroot: impl Into<PathBuf>) -> Result<Self> {
        let chroot = chroot.into();
        std::fs::create_dir_all(&chroot)?;
        Ok(Self { chroot })
    }

    /// The root directory this cache is rooted at.
    #[must_use]
    pub fn chroot(&self) -> &Path {
        &self.chroot
    }

    /// Directory holding `module`'s cached files (major-suffix stripped).
    #[must_use]
    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.chroot.join(router::remove_version_suffix(module))
    }

    fn entry_path(&self, module: &str, version: &str, suffix: &str) -> PathBuf {
        self.module_dir(module).join(format!("{version}.{suffix}"))
    }

    /// `true` if a writer currently holds the lock for `(module, version)`.
    pub fn is_locked(&self, module: &str, version: &str) -> Result<bool> {
        check_file(&self.entry_path(module, version, "lock"))
    }

    /// `true` if `(module, version)` is fully committed (has a `.info` file
    /// and is not locked).
    pub fn has_version(&self, module: &str, version: &str) -> Result<bool> {
        if self.is_locked(module, version)? {
            return Err(Error::Locked(module.to_string(), version.to_string()));
        }
        check_file(&self.entry_path(module, version, "info"))
    }

    /// Opens a stored file (`info`, `mod`, or `zip`) for reading.
    pub fn open(&self, module: &str, version: &str, suffix: &str) -> Result<std::fs::File> {
        if self.is_locked(module, version)? {
            return Err(Error::Locked(module.to_string(), version.to_string()));
        }
        Ok(std::fs::File::open(self.entry_path(module, version, suffix))?)
    }

    /// Lists every module with at least one `.info` file, recursively, sorted.
    pub fn list_modules(&self) -> Result<Vec<String>> {
        let mut modules = Vec::new();
        self.list_modules_rec("", &mut modules)?;
        modules.sort();
        Ok(modules)
    }

    fn list_modules_rec(&self, dir: &str, out: &mut Vec<String>) -> Result<()> {
        let full = self.module_dir(dir);
        let entries = match std::fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut contains_modules = false;
        let mut subdirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                subdirs.push(name);
            } else if !contains_modules && name.ends_with(".info") {
                contains_modules = true;
            }
        }
        if contains_modules {
            out.push(dir.to_string());
        }
        for sub in subdirs {
            let child = if dir.is_empty() {
                sub
            } else {
                format!("{dir}/{sub}")
            };
            self.list_modules_rec(&child, out)?;
        }
        Ok(())
    }

    /// Lists tag-version strings stored for `module`, excluding locked
    /// entries, optionally filtered to a single major version. Malformed
    /// version file names are skipped with a warning rather than failing
    /// the whole listing.
    pub fn list_versions(&self, module: &str, major: Option<u64>) -> Result<Vec<String>> {
        let dir = self.module_dir(module);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = std::collections::BTreeSet::new();
        let mut locked = std::collections::HashSet::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(v) = name.strip_suffix(".info") {
                versions.insert(v.to_string());
            } else if let Some(v) = name.strip_suffix(".lock") {
                locked.insert(v.to_string());
            }
        }

        let mut result = Vec::new();
        for version in versions {
            if locked.contains(&version) {
                continue;
            }
            match Version::parse_tag(&version) {
                Ok(v) if major.is_none_or(|m| v.major == m) => result.push(version),
                Ok(_) => {},
                Err(e) => tracing::warn!(%version, error = %e, "unexpected version format"),
            }
        }
        Ok(result)
    }

    /// The newest version for `module`/`major`, preferring a stable release
    /// over a pre-release of the same or lower precedence. Returns
    /// `v0.0.0` when no version is stored.
    pub fn latest_version(&self, module: &str, major: u64) -> Result<String> {
        let versions = self.list_versions(module, Some(major))?;
        let mut latest = Version::zero();
        let mut latest_stable: Option<Version> = None;
        for raw in &versions {
            let v = Version::parse_tag(raw)?;
            latest = latest.latest(&v);
            if v.pre_release.is_empty() {
                latest_stable = Some(match &latest_stable {
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

    fn version_info(&self, module: &str, version: &str) -> Result<(u64, SystemTime)> {
        if self.is_locked(module, version)? {
            return Err(Error::Locked(module.to_string(), version.to_string()));
        }
        let meta = std::fs::metadata(self.entry_path(module, version, "zip"))?;
        Ok((meta.len(), meta.modified()?))
    }

    /// Every stored module with per-version size/mtime/lock status, sorted
    /// with the newest version first, for the dashboard.
    pub fn stored_modules(&self) -> Result<Vec<StoredModule>> {
        let mut out = Vec::new();
        for name in self.list_modules()? {
            let mut versions = Vec::new();
            let mut total_size = 0u64;
            for version in self.list_versions(&name, None)? {
                match self.version_info(&name, &version) {
                    Ok((size, downloaded)) => {
                        total_size += size;
                        versions.push(StoredVersion {
                            version,
                            size,
                            downloaded: Some(downloaded),
                            locked: false,
                        });
                    },
                    Err(Error::Locked(..)) => versions.push(StoredVersion {
                        version,
                        size: 0,
                        downloaded: None,
                        locked: true,
                    }),
                    Err(e) => return Err(e),
                }
            }
            versions.sort_by(|a, b| {
                let av = Version::parse_tag(&a.version);
                let bv = Version::parse_tag(&b.version);
                match (av, bv) {
                    (Ok(av), Ok(bv)) => bv.compare(&av),
                    _ => std::cmp::Ordering::Equal,
                }
            });
            out.push(StoredModule {
                name,
                versions,
                total_size,
            });
        }
        Ok(out)
    }

    /// Path the materializer should write the final `.info`/`.mod`/`.zip`
    /// files and the staging `.tmp`/`.lock` files to.
    #[must_use]
    pub fn version_path(&self, module: &str, version: &str, suffix: &str) -> PathBuf {
        self.entry_path(module, version, suffix)
    }
}

fn check_file(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn module_dir_strips_major_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(
            store.module_dir("example.com/mod/v3"),
            tmp.path().join("example.com/mod")
        );
    }

    #[test]
    fn list_versions_skips_locked_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let dir = store.module_dir("example.com/mod");
        touch(&dir.join("v1.0.0.info"));
        touch(&dir.join("v1.1.0.info"));
        touch(&dir.join("v1.1.0.lock"));

        let versions = store.list_versions("example.com/mod", None).unwrap();
        assert_eq!(versions, vec!["v1.0.0".to_string()]);
    }

    #[test]
    fn list_versions_filters_by_major() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let dir = store.module_dir("example.com/mod");
        touch(&dir.join("v1.0.0.info"));
        touch(&dir.join("v2.0.0.info"));

        assert_eq!(
            store.list_versions("example.com/mod", Some(2)).unwrap(),
            vec!["v2.0.0".to_string()]
        );
    }

    #[test]
    fn latest_version_prefers_stable_over_prerelease() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let dir = store.module_dir("example.com/mod");
        touch(&dir.join("v1.0.0.info"));
        touch(&dir.join("v1.1.0-rc.1.info"));

        assert_eq!(store.latest_version("example.com/mod", 1).unwrap(), "v1.0.0");
    }

    #[test]
    fn latest_version_is_zero_when_nothing_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(store.latest_version("example.com/mod", 1).unwrap(), "v0.0.0");
    }

    #[test]
    fn has_version_errors_while_locked() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let dir = store.module_dir("example.com/mod");
        touch(&dir.join("v1.0.0.info"));
        touch(&dir.join("v1.0.0.lock"));

        assert!(matches!(
            store.has_version("example.com/mod", "v1.0.0"),
            Err(Error::Locked(..))
        ));
    }

    #[test]
    fn list_modules_finds_nested_modules_with_info_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        touch(&store.module_dir("a/b").join("v1.0.0.info"));
        touch(&store.module_dir("c").join("v1.0.0.info"));

        let mut modules = store.list_modules().unwrap();
        modules.sort();
        assert_eq!(modules, vec!["a/b".to_string(), "c".to_string()]);
    }
}

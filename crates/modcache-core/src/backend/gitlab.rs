//! A GitLab-hosted-project backend: tags become module versions, and a
//! project's repository archive becomes the module source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::router;
use crate::version::Version;

use super::{Downloads, Source};

/// The `type` value this backend registers under in `sources[]`.
pub const TYPE: &str = "gitlab";

static K8S_TAG_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^v[0-9]+(?:(?:alpha|beta)[0-9]+)?$").unwrap());

fn is_k8s_tag(version: &str) -> bool {
    K8S_TAG_RE.is_match(version)
}

/// The `<version>.info` file body, field order matching §3/§6
/// (`{"Version":…,"Time":…}`) rather than whatever order a `serde_json::Map`
/// would happen to serialize in.
#[derive(Serialize)]
struct VersionInfo<'a> {
    #[serde(rename = "Version")]
    version: &'a str,
    #[serde(rename = "Time")]
    time: &'a str,
}

/// Unparametrized transport state shared by every module bound to this
/// source.
pub struct GitlabSource {
    url: String,
    auth: String,
    insecure_tls: bool,
    client: Arc<reqwest::Client>,
    params: Option<ModuleParams>,
}

#[derive(Clone)]
struct ModuleParams {
    module: String,
    project_id: i64,
    dir: String,
    tag_prefix: String,
    version_dir: bool,
}

impl ModuleParams {
    fn from_value(module: &str, params: &serde_json::Value) -> Result<Self> {
        let project_id = params
            .get("project_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| Error::Config("gitlab source expects integer project_id".into()))?;
        let dir = params
            .get("dir")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        let tag_prefix = params
            .get("tag_prefix")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string();
        let version_dir = params
            .get("version_dir")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            module: module.to_string(),
            project_id,
            dir: router::unify_dir(dir),
            tag_prefix,
            version_dir,
        })
    }
}

impl GitlabSource {
    /// Builds an unparametrized source from a `sources[]` entry:
    /// `{"url": "...", "auth": "...", "allow_insecure_tls": bool}`.
    pub fn new(config: &serde_json::Value) -> Result<Self> {
        let url = config
            .get("url")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Config("gitlab source expects url as string".into()))?
            .to_string();
        let auth = config
            .get("auth")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Config("gitlab source expects auth as string".into()))?
            .to_string();
        let insecure_tls = config
            .get("allow_insecure_tls")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let mut builder = reqwest::Client::builder();
        if insecure_tls {
            tracing::warn!(url = %url, "allowing insecure TLS for gitlab source");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            url,
            auth,
            insecure_tls,
            client: Arc::new(client),
            params: None,
        })
    }

    fn api_url(&self, relative_path: &str) -> String {
        const API_SUFFIX: &str = "api/v4/";
        if self.url.is_empty() {
            return String::new();
        }
        if self.url.ends_with('/') {
            format!("{}{API_SUFFIX}{relative_path}", self.url)
        } else {
            format!("{}/{API_SUFFIX}{relative_path}", self.url)
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(url)
            .header("PRIVATE-TOKEN", &self.auth)
            .send()
            .await?)
    }

    fn params(&self) -> Result<&ModuleParams> {
        self.params.as_ref().ok_or(Error::NotParametrized)
    }

    async fn find_commit(&self, version: &str) -> Result<(String, String)> {
        let p = self.params()?;
        let tag = format!("{}{version}", p.tag_prefix);
        let url = self.api_url(&format!(
            "projects/{}/repository/tags/{}",
            p.project_id,
            urlencoding_escape(&tag)
        ));
        let resp = self.get(&url).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::VersionNotFound {
                module: p.module.clone(),
                version: version.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(Error::Other(format!(
                "findCommit: request failed: status code {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct TagResponse {
            commit: CommitResponse,
        }
        #[derive(Deserialize)]
        struct CommitResponse {
            id: String,
            created_at: String,
        }
        let body: TagResponse = resp.json().await?;
        Ok((body.commit.id, body.commit.created_at))
    }

    async fn fetch_archive(&self, commit: &str) -> Result<bytes::Bytes> {
        let p = self.params()?;
        let url = self.api_url(&format!(
            "projects/{}/repository/archive.zip?sha={commit}",
            p.project_id
        ));
        let resp = self.get(&url).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::CommitNotFound(commit.to_string()));
        }
        if !resp.status().is_success() {
            return Err(Error::Other(format!(
                "fetchArchive: request failed: status code {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?)
    }

    /// Rewrites a downloaded archive into `(info_json, mod_contents, zip_bytes)`
    /// per the module-proxy layout: strip the archive's wrapper directory
    /// and the configured `dir`, then prefix every remaining entry with
    /// `<module><versionDir>@<version>/`.
    fn rewrite_archive(
        &self,
        archive: &[u8],
        version: &str,
        timestamp: &str,
    ) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let p = self.params()?;
        let version_dir = router::version_dir(version)?;
        let mut dir = p.dir.clone();
        if p.version_dir {
            dir.push_str(&version_dir);
        }

        let reader = std::io::Cursor::new(archive);
        let mut zip_in = zip::ZipArchive::new(reader)?;

        let mut zip_out_buf = Vec::new();
        let mut mod_contents = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_out_buf));
            for i in 0..zip_in.len() {
                let mut entry = zip_in.by_index(i)?;
                let trimmed = router::trim_name(&dir, entry.name());
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed == "/go.mod" {
                    entry.read_to_end(&mut mod_contents)?;
                    entry = zip_in.by_index(i)?;
                }
                let full_name = format!("{}{version_dir}@{version}{trimmed}", p.module);
                // Carry the source entry's header (timestamp, mode,
                // compression) across, only the name changes - mirrors the
                // original copying `f.FileHeader` and overwriting `Name`.
                let mut options = zip::write::SimpleFileOptions::default()
                    .compression_method(entry.compression())
                    .last_modified_time(entry.last_modified());
                if let Some(mode) = entry.unix_mode() {
                    options = options.unix_permissions(mode);
                }
                writer.start_file(full_name, options)?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                writer.write_all(&buf)?;
            }
            writer.finish()?;
        }

        let info_bytes = serde_json::to_vec(&VersionInfo {
            version,
            time: timestamp,
        })?;
        Ok((info_bytes, mod_contents, zip_out_buf))
    }
}

fn urlencoding_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            },
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[async_trait]
impl Source for GitlabSource {
    fn parametrize(&self, module: &str, params: &serde_json::Value) -> Result<Box<dyn Source>> {
        let params = ModuleParams::from_value(module, params)?;
        Ok(Box::new(Self {
            url: self.url.clone(),
            auth: self.auth.clone(),
            insecure_tls: self.insecure_tls,
            client: Arc::clone(&self.client),
            params: Some(params),
        }))
    }

    fn config_preview(&self) -> Vec<(String, String)> {
        let p = self.params.as_ref();
        vec![
            ("type".into(), TYPE.into()),
            ("url".into(), self.url.clone()),
            (
                "project_id".into(),
                p.map(|p| p.project_id.to_string()).unwrap_or_default(),
            ),
            ("dir".into(), p.map(|p| p.dir.clone()).unwrap_or_default()),
            (
                "tag_prefix".into(),
                p.map(|p| p.tag_prefix.clone()).unwrap_or_default(),
            ),
            ("insecure_tls".into(), self.insecure_tls.to_string()),
        ]
    }

    async fn list_versions(&self, major: u64) -> Result<Vec<String>> {
        let p = self.params()?;
        let url = self.api_url(&format!(
            "projects/{}/repository/tags?search=^{}v",
            p.project_id, p.tag_prefix
        ));
        let resp = self.get(&url).await?;
        if !resp.status().is_success() {
            return Err(Error::Other(format!(
                "ListVersions: request failed: status code {}",
                resp.status()
            )));
        }
        #[derive(Deserialize)]
        struct Tag {
            name: String,
        }
        let tags: Vec<Tag> = resp.json().await?;
        let prefix_len = p.tag_prefix.len();
        let mut versions = Vec::new();
        for tag in tags {
            if tag.name.len() < prefix_len {
                continue;
            }
            let version = &tag.name[prefix_len..];
            match Version::parse_tag(version) {
                Ok(v) if v.major == major || (v.major == 0 && major == 1) => {
                    versions.push(version.to_string());
                },
                Ok(_) => {},
                Err(_) if is_k8s_tag(version) => {},
                Err(e) => tracing::debug!(%version, error = %e, "invalid tag version"),
            }
        }
        Ok(versions)
    }

    async fn download_module(&self, dir: &Path, version: &str) -> Result<()> {
        let module = self.params()?.module.clone();
        let (commit, timestamp) = self.find_commit(version).await?;

        let module_dir = dir.join(&module);
        std::fs::create_dir_all(&module_dir)?;

        // O_EXCL-style fence: a second process racing us on the same
        // chroot fails here instead of silently overwriting our write.
        let lock_path = module_dir.join(format!("{version}.lock"));
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)?;

        let result = self.materialize(&module_dir, version, &commit, &timestamp).await;
        let _ = std::fs::remove_file(&lock_path);
        result
    }

    fn parametrize_downloads(
        &self,
        name: &str,
        mode: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Downloads>> {
        if mode != "generic-packages" {
            return Err(Error::Config(format!("unsupported download mode {mode:?}")));
        }
        let project_id = params
            .get("project_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| Error::Config("downloads expect integer project_id".into()))?;
        let package_name = params
            .get("package_name")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(name)
            .to_string();
        let disable_architecture = params
            .get("disable_architecture")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        let file_extension = params
            .get("file_extension")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string();
        Ok(Box::new(GitlabDownloads {
            url: self.url.clone(),
            auth: self.auth.clone(),
            insecure_tls: self.insecure_tls,
            client: Arc::clone(&self.client),
            name: name.to_string(),
            project_id,
            package_name,
            disable_architecture,
            file_extension,
        }))
    }
}

impl GitlabSource {
    async fn materialize(
        &self,
        module_dir: &Path,
        version: &str,
        commit: &str,
        timestamp: &str,
    ) -> Result<()> {
        let archive = self.fetch_archive(commit).await?;
        let (info, module_manifest, zip_bytes) = self.rewrite_archive(&archive, version, timestamp)?;

        let info_path = module_dir.join(format!("{version}.info"));
        let mod_path = module_dir.join(format!("{version}.mod"));
        let zip_path = module_dir.join(format!("{version}.zip"));

        let write_all = || -> Result<()> {
            std::fs::write(&info_path, &info)?;
            std::fs::write(&mod_path, &module_manifest)?;
            std::fs::write(&zip_path, &zip_bytes)?;
            Ok(())
        };

        if let Err(e) = write_all() {
            let _ = std::fs::remove_file(&info_path);
            let _ = std::fs::remove_file(&mod_path);
            let _ = std::fs::remove_file(&zip_path);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl Downloads for GitlabDownloads {
    fn config_preview(&self) -> Vec<(String, String)> {
        vec![
            ("type".into(), TYPE.into()),
            ("url".into(), self.url.clone()),
            ("project_id".into(), self.project_id.to_string()),
            ("package_name".into(), self.package_name.clone()),
            ("insecure_tls".into(), self.insecure_tls.to_string()),
        ]
    }

    async fn fetch(&self, version: &Version, arch: &str) -> Result<bytes::Bytes> {
        let url = self.api_url(&format!(
            "projects/{}/packages/generic/{}/{}/{}-{}{}",
            self.project_id,
            self.package_name,
            version,
            self.package_name,
            version,
            self.extension(arch)
        ));
        let resp = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Other(format!(
                "download request failed: status code {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?)
    }

    async fn latest_download_version(&self) -> Result<Version> {
        let mut latest = Version::zero();
        let mut page = 1i64;
        loop {
            let (page_latest, has_next) = self.latest_download_version_page(page).await?;
            latest = page_latest.latest(&latest);
            if !has_next {
                return Ok(latest);
            }
            page += 1;
        }
    }
}

/// The generic-packages download capability bound to one package name.
pub struct GitlabDownloads {
    url: String,
    auth: String,
    insecure_tls: bool,
    client: Arc<reqwest::Client>,
    name: String,
    project_id: i64,
    package_name: String,
    disable_architecture: bool,
    file_extension: String,
}

impl GitlabDownloads {
    fn api_url(&self, relative_path: &str) -> String {
        const API_SUFFIX: &str = "api/v4/";
        if self.url.ends_with('/') {
            format!("{}{API_SUFFIX}{relative_path}", self.url)
        } else {
            format!("{}/{API_SUFFIX}{relative_path}", self.url)
        }
    }

    fn extension(&self, arch: &str) -> String {
        if self.disable_architecture {
            self.file_extension.clone()
        } else {
            format!("-{arch}{}", self.file_extension)
        }
    }

    async fn latest_download_version_page(&self, page: i64) -> Result<(Version, bool)> {
        let url = self.api_url(&format!(
            "projects/{}/packages?page={page}&package_type=generic&package_name={}",
            self.project_id, self.name
        ));
        let resp = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.auth)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Other(format!(
                "fetch latest download version failed: status code {}",
                resp.status()
            )));
        }
        let next_page_header = resp
            .headers()
            .get("x-next-page")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        #[derive(Deserialize)]
        struct PackageEntry {
            version: String,
        }
        let entries: Vec<PackageEntry> = resp.json().await?;
        if entries.is_empty() {
            return Err(Error::Other("no latest download version".into()));
        }
        let mut latest = Version::zero();
        for entry in entries {
            let v = Version::parse(&entry.version)?;
            latest = v.latest(&latest);
        }
        let has_next = next_page_header.is_some_and(|next| next != page);
        Ok((latest, has_next))
    }
}

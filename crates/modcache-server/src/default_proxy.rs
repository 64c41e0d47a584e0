//! Queries the configured default proxy for a module's latest version, used
//! by `/versions.json` for modules that aren't otherwise configured here.

use modcache_core::version::Version;
use modcache_core::{Error, Result};

/// Fetches `<default_go_proxy_url>/<module>/@latest` and parses the
/// `Version` field of the response.
pub async fn latest_version(client: &reqwest::Client, default_go_proxy_url: &str, module: &str) -> Result<Version> {
    let url = format!("{default_go_proxy_url}/{module}/@latest");
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        return Err(Error::Other(format!(
            "default proxy request failed: status code {}",
            resp.status()
        )));
    }
    #[derive(serde::Deserialize)]
    struct Info {
        #[serde(rename = "Version")]
        version: String,
    }
    let info: Info = resp.json().await?;
    Version::parse_tag(&info.version)
}

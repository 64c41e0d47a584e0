//! Shared, request-handling state built once at startup from a [`Config`].

use std::collections::HashMap;
use std::sync::Arc;

use modcache_core::backend::{Downloads, Registry, Source};
use modcache_core::{Config, Error, Materializer, Result, Store};

/// Everything a request handler needs: the configured modules/sources/
/// downloads, the cache, and the default-proxy fallback client.
pub struct AppState {
    pub materializer: Materializer,
    pub modules: HashMap<String, Option<Box<dyn Source>>>,
    pub downloads: HashMap<String, Box<dyn Downloads>>,
    pub default_go_proxy_url: String,
    pub downloads_path_prefix: String,
    pub versions_go: String,
    pub versions_modules: Vec<String>,
    pub http: reqwest::Client,
}

impl AppState {
    /// Builds the running state from a loaded configuration: constructs
    /// every named source, binds modules and downloads to them, and opens
    /// the on-disk cache.
    pub fn build(config: Config) -> Result<Self> {
        let store = Store::new(&config.storage)?;
        let materializer = Materializer::new(store);

        let mut sources: HashMap<String, Box<dyn Source>> = HashMap::new();
        for (i, entry) in config.sources.iter().enumerate() {
            let mut entry = entry.clone();
            let name = entry
                .remove("name")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| Error::Config(format!("invalid source [{i}]: expected name as string")))?;
            if sources.contains_key(&name) {
                return Err(Error::Config(format!("invalid source [{i}]: name already used")));
            }
            let kind = entry
                .remove("type")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| Error::Config(format!("invalid source [{i}]: expected type as string")))?;
            let source = Registry::build(&kind, &serde_json::Value::Object(entry))
                .map_err(|e| Error::Config(format!("invalid source [{i}]: {e}")))?;
            tracing::info!(name, r#type = %kind, "added source");
            sources.insert(name, source);
        }

        let mut modules: HashMap<String, Option<Box<dyn Source>>> = HashMap::new();
        for (i, module) in config.modules.iter().enumerate() {
            if modules.contains_key(&module.name) {
                return Err(Error::Config(format!("invalid module [{i}]: name already used")));
            }
            let Some(source_name) = &module.source else {
                tracing::info!(name = %module.name, "added disabled module");
                modules.insert(module.name.clone(), None);
                continue;
            };
            let source = sources
                .get(source_name)
                .ok_or_else(|| Error::Config(format!("invalid module [{i}]: invalid source {source_name:?}")))?;
            let parametrized = source
                .parametrize(&module.name, &module.source_params)
                .map_err(|e| Error::Config(format!("invalid module [{i}]: unable to parametrize source: {e}")))?;
            tracing::info!(name = %module.name, source = %source_name, "added module");
            modules.insert(module.name.clone(), Some(parametrized));
        }

        let mut downloads: HashMap<String, Box<dyn Downloads>> = HashMap::new();
        for (name, download) in &config.downloads {
            let source = sources
                .get(&download.source)
                .ok_or_else(|| Error::Config(format!("invalid downloads [{name}]: invalid source {:?}", download.source)))?;
            let parametrized = source
                .parametrize_downloads(name, &download.mode, &download.source_params)
                .map_err(|e| Error::Config(format!("invalid downloads [{name}]: unable to parametrize source: {e}")))?;
            tracing::info!(name, source = %download.source, "added downloads");
            downloads.insert(name.clone(), parametrized);
        }

        Ok(Self {
            materializer,
            modules,
            downloads,
            default_go_proxy_url: config.default_go_proxy_url.clone(),
            downloads_path_prefix: config.downloads_path_prefix(),
            versions_go: config.versions.go.clone(),
            versions_modules: config.versions.modules.clone(),
            http: reqwest::Client::new(),
        })
    }
}

/// Shared handle passed to every axum handler.
pub type SharedState = Arc<AppState>;

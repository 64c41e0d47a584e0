//! Coordinates fetching a module version from its backend into the [`Store`].
//!
//! Two requests racing to materialize the same `(module, version)` inside one
//! process serialize on an in-process async mutex; the backend's own
//! `create_new` lock file still fences out a second *process* sharing the
//! same chroot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::backend::Source;
use crate::error::{Error, Result};
use crate::store::Store;

type FlightKey = (String, String);

/// Materializes module versions on demand, deduplicating concurrent
/// in-process requests for the same `(module, version)`.
pub struct Materializer {
    store: Store,
    in_flight: Mutex<HashMap<FlightKey, Arc<AsyncMutex<()>>>>,
}

impl Materializer {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn flight_lock(&self, module: &str, version: &str) -> Arc<AsyncMutex<()>> {
        let key = (module.to_string(), version.to_string());
        let mut map = self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(map.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    fn release_flight_lock(&self, module: &str, version: &str) {
        let key = (module.to_string(), version.to_string());
        let mut map = self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(lock) = map.get(&key) {
            if Arc::strong_count(lock) == 1 {
                map.remove(&key);
            }
        }
    }

    /// Ensures `(module, version)` is present in the cache, fetching it
    /// through `source` on a miss. Idempotent: a hit is a no-op.
    pub async fn ensure(&self, source: &dyn Source, module: &str, version: &str) -> Result<()> {
        let flight = self.flight_lock(module, version);
        let _guard = flight.lock().await;

        let result = match self.store.has_version(module, version) {
            Ok(true) => Ok(()),
            Ok(false) => source.download_module(self.store.chroot(), version).await,
            Err(Error::Locked(..)) => Err(Error::Locked(module.to_string(), version.to_string())),
            Err(e) => Err(e),
        };

        drop(_guard);
        self.release_flight_lock(module, version);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Downloads;
    use async_trait::async_trait;
    use std::path::Path;

    struct StaticSource;

    #[async_trait]
    impl Source for StaticSource {
        fn parametrize(&self, _module: &str, _params: &serde_json::Value) -> Result<Box<dyn Source>> {
            unimplemented!()
        }

        fn config_preview(&self) -> Vec<(String, String)> {
            Vec::new()
        }

        async fn list_versions(&self, _major: u64) -> Result<Vec<String>> {
            Ok(vec!["v1.0.0".to_string()])
        }

        async fn download_module(&self, dir: &Path, version: &str) -> Result<()> {
            let module_dir = dir.join("example.com/mod");
            std::fs::create_dir_all(&module_dir)?;
            std::fs::write(module_dir.join(format!("{version}.info")), b"{}")?;
            std::fs::write(module_dir.join(format!("{version}.mod")), b"module example.com/mod\n")?;
            std::fs::write(module_dir.join(format!("{version}.zip")), b"PK")?;
            Ok(())
        }

        fn parametrize_downloads(
            &self,
            _name: &str,
            _mode: &str,
            _params: &serde_json::Value,
        ) -> Result<Box<dyn Downloads>> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn ensure_downloads_on_miss_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let materializer = Materializer::new(store);
        let source = StaticSource;

        materializer
            .ensure(&source, "example.com/mod", "v1.0.0")
            .await
            .unwrap();
        assert!(materializer
            .store()
            .has_version("example.com/mod", "v1.0.0")
            .unwrap());

        // second call is a no-op hit, not a second download
        materializer
            .ensure(&source, "example.com/mod", "v1.0.0")
            .await
            .unwrap();
    }
}

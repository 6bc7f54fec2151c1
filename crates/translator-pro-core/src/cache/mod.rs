//! Process-wide store of loaded translation models.

use moka::future::Cache;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Device, LanguagePair};
use crate::error::{Error, Result};
use crate::model::{self, ModelLoader, TranslationModel, registry};

/// Lazily-populated model store keyed by language pair.
///
/// - A resident pair is returned without I/O.
/// - A missing pair is resolved, loaded once and shared: concurrent requests
///   for the same pair wait on the single in-flight load.
/// - A failed load stores nothing, so the next request loads again.
///
/// The device is fixed at construction and survives `clear()`.
pub struct ModelCache {
    models: Cache<LanguagePair, Arc<dyn TranslationModel>>,
    loader: Arc<dyn ModelLoader>,
    device: Device,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>, device: Device) -> Self {
        info!("Model cache using {} loader on {}", loader.name(), device);
        if !device.is_accelerator() {
            info!("No GPU selected, models will run on CPU");
        }

        Self {
            models: Cache::builder().build(),
            loader,
            device,
        }
    }

    /// Create a cache with the configured backend and device
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let loader = model::create_loader(&config.model)?;
        Ok(Self::new(loader, config.resolved_device()))
    }

    /// Return the model for `pair`, loading it on first use.
    pub async fn get_or_load(&self, pair: LanguagePair) -> Result<Arc<dyn TranslationModel>> {
        if let Some(model) = self.models.get(&pair).await {
            debug!("Model cache hit for {}", pair);
            return Ok(model);
        }

        // Unsupported pairs fail here, before any load is attempted
        let model_id = registry::resolve(pair)?;

        let loader = Arc::clone(&self.loader);
        let device = self.device;

        self.models
            .try_get_with(pair, async move {
                let started = Instant::now();
                let model = loader
                    .load(model_id, pair, device)
                    .await
                    .map_err(|e| load_error(e, pair, model_id))?;
                info!(
                    "Loaded model {} for {} in {:.2?}",
                    model_id,
                    pair,
                    started.elapsed()
                );
                Ok::<_, Error>(model)
            })
            .await
            .map_err(|shared| {
                warn!("Model load failed for {}: {}", pair, shared);
                unshare_load_error(shared, pair, model_id)
            })
    }

    /// Evict every model.
    ///
    /// Handles already given out stay valid for their holders; the cache
    /// only drops its own references.
    pub async fn clear(&self) {
        self.models.invalidate_all();
        self.models.run_pending_tasks().await;
        info!("Model cache cleared");
    }

    pub fn contains(&self, pair: LanguagePair) -> bool {
        self.models.contains_key(&pair)
    }

    /// Number of resident models
    pub async fn resident_count(&self) -> u64 {
        self.models.run_pending_tasks().await;
        self.models.entry_count()
    }

    pub const fn device(&self) -> Device {
        self.device
    }
}

fn load_error(err: Error, pair: LanguagePair, model_id: &str) -> Error {
    match err {
        Error::ModelLoad { .. } => err,
        other => Error::ModelLoad {
            pair,
            model_id: model_id.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Concurrent waiters on one failed load share its error
fn unshare_load_error(shared: Arc<Error>, pair: LanguagePair, model_id: &str) -> Error {
    match Arc::try_unwrap(shared) {
        Ok(err) => err,
        Err(shared) => match shared.as_ref() {
            Error::ModelLoad {
                pair,
                model_id,
                reason,
            } => Error::ModelLoad {
                pair: *pair,
                model_id: model_id.clone(),
                reason: reason.clone(),
            },
            other => load_error(Error::ModelRequest(other.to_string()), pair, model_id),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Lang;
    use crate::model::ModelInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoModel {
        info: ModelInfo,
    }

    #[async_trait]
    impl TranslationModel for EchoModel {
        fn info(&self) -> ModelInfo {
            self.info.clone()
        }

        async fn translate(&self, text: &str, _max_length: usize) -> Result<String> {
            Ok(text.to_string())
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    impl CountingLoader {
        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn load(
            &self,
            model_id: &str,
            pair: LanguagePair,
            device: Device,
        ) -> Result<Arc<dyn TranslationModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(Error::ModelRequest("disk full".to_string()));
            }
            Ok(Arc::new(EchoModel {
                info: ModelInfo {
                    model_id: model_id.to_string(),
                    pair,
                    device,
                },
            }))
        }
    }

    const FR_EN: LanguagePair = LanguagePair::new(Lang::Fr, Lang::En);

    fn cache_with(loader: &Arc<CountingLoader>) -> ModelCache {
        ModelCache::new(Arc::clone(loader) as Arc<dyn ModelLoader>, Device::Cpu)
    }

    #[tokio::test]
    async fn test_second_request_reuses_handle() {
        let loader = Arc::new(CountingLoader::default());
        let cache = cache_with(&loader);

        let first = cache.get_or_load(FR_EN).await.unwrap();
        let second = cache.get_or_load(FR_EN).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert_eq!(first.info().model_id, "Helsinki-NLP/opus-mt-fr-en");
        assert_eq!(first.info().device, Device::Cpu);
    }

    #[tokio::test]
    async fn test_directions_are_separate_entries() {
        let loader = Arc::new(CountingLoader::default());
        let cache = cache_with(&loader);

        let fr_en = cache.get_or_load(FR_EN).await.unwrap();
        let en_fr = cache.get_or_load(FR_EN.reversed()).await.unwrap();

        assert!(!Arc::ptr_eq(&fr_en, &en_fr));
        assert_eq!(loader.loads(), 2);
        assert_eq!(cache.resident_count().await, 2);
    }

    #[tokio::test]
    async fn test_unsupported_pair_never_loads() {
        let loader = Arc::new(CountingLoader::default());
        let cache = cache_with(&loader);

        let result = cache.get_or_load(LanguagePair::new(Lang::De, Lang::It)).await;

        assert!(matches!(result, Err(Error::UnsupportedPair { .. })));
        assert_eq!(loader.loads(), 0);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let loader = Arc::new(CountingLoader {
            fail: true,
            ..Default::default()
        });
        let cache = cache_with(&loader);

        let err = cache.get_or_load(FR_EN).await.err().unwrap();
        match err {
            Error::ModelLoad {
                pair,
                model_id,
                reason,
            } => {
                assert_eq!(pair, FR_EN);
                assert_eq!(model_id, "Helsinki-NLP/opus-mt-fr-en");
                assert!(reason.contains("disk full"));
            }
            other => panic!("expected ModelLoad, got {other:?}"),
        }
        assert!(!cache.contains(FR_EN));

        // Next request retries the load
        assert!(cache.get_or_load(FR_EN).await.is_err());
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn test_clear_forces_one_reload() {
        let loader = Arc::new(CountingLoader::default());
        let cache = cache_with(&loader);

        let before = cache.get_or_load(FR_EN).await.unwrap();
        cache.clear().await;
        assert!(!cache.contains(FR_EN));
        assert_eq!(cache.resident_count().await, 0);

        let after = cache.get_or_load(FR_EN).await.unwrap();
        let again = cache.get_or_load(FR_EN).await.unwrap();

        assert_eq!(loader.loads(), 2);
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &again));

        // Handle held across the clear still works
        assert_eq!(before.translate("Salut.", 8).await.unwrap(), "Salut.");
        assert_eq!(cache.device(), Device::Cpu);
    }

    #[tokio::test]
    async fn test_different_pairs_load_independently() {
        let loader = Arc::new(CountingLoader::default());
        let cache = cache_with(&loader);
        let pairs = [FR_EN, FR_EN.reversed(), LanguagePair::new(Lang::Ar, Lang::En)];

        let results =
            futures::future::join_all(pairs.iter().map(|&pair| cache.get_or_load(pair))).await;

        for (pair, result) in pairs.iter().zip(results) {
            assert_eq!(result.unwrap().info().pair, *pair);
        }
        assert_eq!(loader.loads(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_load_is_coalesced() {
        let loader = Arc::new(CountingLoader {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let cache = Arc::new(cache_with(&loader));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_or_load(FR_EN).await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(loader.loads(), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}

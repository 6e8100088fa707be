//! Driver registration and the per-provider adapter cache.
//!
//! The set of drivers is fixed when [`ProviderRegistryBuilder::build`] runs;
//! request traffic can only populate or evict cache entries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mediagate_core::provider::ProviderConfig;
use mediagate_core::types::DbId;

use crate::adapters::{self, AdapterContext, GenerationAdapter};
use crate::error::ProviderError;

/// Builds an adapter for one provider configuration.
pub type AdapterConstructor = Arc<
    dyn Fn(&ProviderConfig, &AdapterContext) -> Result<Arc<dyn GenerationAdapter>, ProviderError>
        + Send
        + Sync,
>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects driver constructors before the registry is frozen.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    constructors: HashMap<String, AdapterConstructor>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `driver`.
    pub fn register<F>(mut self, driver: &str, constructor: F) -> Self
    where
        F: Fn(&ProviderConfig, &AdapterContext) -> Result<Arc<dyn GenerationAdapter>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(driver.to_string(), Arc::new(constructor));
        self
    }

    /// Register the built-in drivers.
    pub fn with_builtin_drivers(self) -> Self {
        adapters::register_builtin(self)
    }

    pub fn build(self, context: AdapterContext) -> ProviderRegistry {
        let mut drivers: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        drivers.sort_unstable();
        tracing::info!(drivers = ?drivers, "Provider registry ready");

        ProviderRegistry {
            constructors: self.constructors,
            context,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Resolves provider configurations to cached adapter instances.
pub struct ProviderRegistry {
    constructors: HashMap<String, AdapterConstructor>,
    context: AdapterContext,
    cache: Mutex<HashMap<DbId, Arc<dyn GenerationAdapter>>>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// The adapter for `provider`, constructing and caching it on first use.
    ///
    /// Construction failures (unknown driver, bad configuration) are
    /// returned as-is and leave the cache untouched.
    pub fn resolve(
        &self,
        provider: &ProviderConfig,
    ) -> Result<Arc<dyn GenerationAdapter>, ProviderError> {
        let mut cache = self.lock();
        if let Some(adapter) = cache.get(&provider.id) {
            return Ok(adapter.clone());
        }

        let constructor = self
            .constructors
            .get(provider.driver.trim())
            .ok_or_else(|| ProviderError::DriverUnsupported(provider.driver.clone()))?;
        let adapter = constructor(provider, &self.context)?;

        tracing::debug!(
            provider_id = provider.id,
            driver = %provider.driver,
            "Adapter constructed",
        );
        cache.insert(provider.id, adapter.clone());
        Ok(adapter)
    }

    /// Evict the cached adapter for `provider_id`. Returns whether one was
    /// cached.
    pub fn invalidate(&self, provider_id: DbId) -> bool {
        let removed = self.lock().remove(&provider_id).is_some();
        if removed {
            tracing::info!(provider_id, "Provider adapter invalidated");
        }
        removed
    }

    /// Registered driver tags, sorted.
    pub fn drivers(&self) -> Vec<String> {
        let mut drivers: Vec<String> = self.constructors.keys().cloned().collect();
        drivers.sort_unstable();
        drivers
    }

    pub fn cached_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DbId, Arc<dyn GenerationAdapter>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mediagate_core::generation::{GenerationRequest, GenerationResult};
    use mediagate_core::provider::ModelConfig;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::adapters::testing;

    struct Stub;

    #[async_trait]
    impl GenerationAdapter for Stub {
        fn driver(&self) -> &'static str {
            "stub"
        }

        async fn generate_content(
            &self,
            _request: &GenerationRequest,
            _model: &ModelConfig,
            _cancel: &CancellationToken,
        ) -> Result<GenerationResult, ProviderError> {
            Ok(GenerationResult::default())
        }
    }

    fn counting_registry(built: Arc<AtomicU32>) -> ProviderRegistry {
        ProviderRegistry::builder()
            .register("stub", move |_, _| {
                built.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Stub))
            })
            .build(testing::context())
    }

    #[test]
    fn adapters_are_cached_per_provider() {
        let built = Arc::new(AtomicU32::new(0));
        let registry = counting_registry(built.clone());
        let provider = testing::provider("stub", serde_json::json!({}));

        let a = registry.resolve(&provider).unwrap();
        let b = registry.resolve(&provider).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.cached_count(), 1);
    }

    #[test]
    fn invalidate_forces_reconstruction() {
        let built = Arc::new(AtomicU32::new(0));
        let registry = counting_registry(built.clone());
        let provider = testing::provider("stub", serde_json::json!({}));

        registry.resolve(&provider).unwrap();
        assert!(registry.invalidate(provider.id));
        assert!(!registry.invalidate(provider.id));
        registry.resolve(&provider).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_driver_is_rejected_and_not_cached() {
        let registry = counting_registry(Arc::new(AtomicU32::new(0)));
        let provider = testing::provider("dall-e-9", serde_json::json!({}));

        assert_matches!(
            registry.resolve(&provider).err(),
            Some(ProviderError::DriverUnsupported(d)) if d == "dall-e-9"
        );
        assert_eq!(registry.cached_count(), 0);
    }

    #[test]
    fn builtin_drivers_are_registered() {
        let registry = ProviderRegistry::builder()
            .with_builtin_drivers()
            .build(testing::context());
        assert_eq!(
            registry.drivers(),
            vec!["ark_image", "gemini", "kling", "minimax", "openai", "seedance"]
        );
    }

    #[test]
    fn construction_errors_are_not_cached() {
        let registry = ProviderRegistry::builder()
            .with_builtin_drivers()
            .build(testing::context());
        // Kling needs a secret key to sign its tokens.
        let provider = testing::provider("kling", serde_json::json!({}));

        assert_matches!(registry.resolve(&provider).err(), Some(ProviderError::Config(_)));
        assert_eq!(registry.cached_count(), 0);
    }
}

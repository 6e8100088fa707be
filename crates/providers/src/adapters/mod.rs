//! The unified adapter contract and the built-in drivers.

pub mod ark_image;
pub mod gemini;
pub mod kling;
pub mod minimax;
pub mod openai;
pub mod seedance;

use std::sync::Arc;

use async_trait::async_trait;
use mediagate_core::generation::{
    validate_request, Capabilities, GenerationRequest, GenerationResult,
};
use mediagate_core::provider::{ModelConfig, ProviderConfig};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::media::MediaResolver;
use crate::poller::PollerConfig;
use crate::registry::ProviderRegistryBuilder;

/// One external generation back-end behind the common contract.
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// Driver tag this adapter was registered under.
    fn driver(&self) -> &'static str;

    /// What this adapter can do with `model`.
    fn capabilities(&self, model: &ModelConfig) -> Capabilities {
        Capabilities::from_model(model)
    }

    /// Reject requests the provider would refuse, before anything is sent.
    fn validate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> Result<(), ProviderError> {
        validate_request(request, model)?;
        Ok(())
    }

    /// Run the provider exchange to completion.
    async fn generate_content(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, ProviderError>;
}

/// Shared resources handed to every adapter constructor.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: reqwest::Client,
    pub media: MediaResolver,
    /// Poll cadence used when a provider has no poll settings of its own.
    pub poll_defaults: PollerConfig,
}

impl AdapterContext {
    pub fn new(http: reqwest::Client, media: MediaResolver) -> Self {
        Self {
            http,
            media,
            poll_defaults: PollerConfig::default(),
        }
    }

    pub fn with_poll_defaults(mut self, defaults: PollerConfig) -> Self {
        self.poll_defaults = defaults;
        self
    }
}

/// Register the six built-in drivers.
pub fn register_builtin(builder: ProviderRegistryBuilder) -> ProviderRegistryBuilder {
    builder
        .register(openai::DRIVER, |p, ctx| {
            Ok(Arc::new(openai::OpenAiAdapter::new(p, ctx)?))
        })
        .register(gemini::DRIVER, |p, ctx| {
            Ok(Arc::new(gemini::GeminiAdapter::new(p, ctx)?))
        })
        .register(ark_image::DRIVER, |p, ctx| {
            Ok(Arc::new(ark_image::ArkImageAdapter::new(p, ctx)?))
        })
        .register(kling::DRIVER, |p, ctx| {
            Ok(Arc::new(kling::KlingAdapter::new(p, ctx)?))
        })
        .register(seedance::DRIVER, |p, ctx| {
            Ok(Arc::new(seedance::SeedanceAdapter::new(p, ctx)?))
        })
        .register(minimax::DRIVER, |p, ctx| {
            Ok(Arc::new(minimax::MinimaxAdapter::new(p, ctx)?))
        })
}

/// Fail construction when a provider has no usable base URL.
pub(crate) fn require_base_url(provider: &ProviderConfig) -> Result<(), ProviderError> {
    let url = provider.base_url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ProviderError::Config(format!(
            "provider '{}' has no valid base_url",
            provider.name
        )))
    }
}

/// Fail construction when a provider has no API key.
pub(crate) fn require_api_key(provider: &ProviderConfig) -> Result<(), ProviderError> {
    if provider.api_key.trim().is_empty() {
        return Err(ProviderError::Config(format!(
            "provider '{}' has no api_key",
            provider.name
        )));
    }
    Ok(())
}

/// Size strings such as `"16:9"` are aspect ratios; anything else is a
/// pixel size or resolution tier.
pub(crate) fn is_aspect_ratio(size: &str) -> bool {
    let mut parts = size.split(':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(w), Some(h), None) if w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok()
    )
}

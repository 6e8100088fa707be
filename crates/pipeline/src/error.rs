use mediagate_core::error::CoreError;
use mediagate_core::types::DbId;
use mediagate_providers::ProviderError;

/// Errors raised while accepting a generation request.
///
/// Background failures never surface here; they are written to the usage
/// record instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Provider {0} is not active")]
    ProviderInactive(DbId),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl PipelineError {
    /// Whether the caller can fix this by changing the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Core(CoreError::NotFound { .. } | CoreError::Validation(_)) => true,
            Self::Core(CoreError::Internal(_)) => false,
            Self::ProviderInactive(_) => true,
            Self::Provider(e) => e.is_validation(),
        }
    }
}

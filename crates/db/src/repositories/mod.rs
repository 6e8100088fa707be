pub mod model_repo;
pub mod provider_repo;
pub mod usage_record_repo;

pub use model_repo::ModelRepo;
pub use provider_repo::ProviderRepo;
pub use usage_record_repo::UsageRecordRepo;

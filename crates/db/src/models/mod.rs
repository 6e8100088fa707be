pub mod model;
pub mod provider;
pub mod usage_record;

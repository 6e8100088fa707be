//! Domain types and collaborator contracts for the generation gateway.
//!
//! Everything here is transport-agnostic: request/result shapes, provider
//! and model configuration, async task status handling, and the traits the
//! orchestration core consumes (configuration store, storage sink, usage
//! record sink) together with their in-memory and local-disk versions.

pub mod error;
pub mod generation;
pub mod hashing;
pub mod memory;
pub mod provider;
pub mod storage;
pub mod task;
pub mod types;
pub mod usage;

//! Provider adapters for the generation gateway.
//!
//! Every external back-end is wrapped in a [`GenerationAdapter`] so the
//! orchestrator sees one contract regardless of wire protocol:
//!
//! - event-stream drivers (`openai`, `gemini`, `ark_image`) read a
//!   line-oriented `data:` stream through [`sse`] into an
//!   [`accumulator::StreamAccumulator`];
//! - submit-and-poll drivers (`kling`, `seedance`, `minimax`) hand the
//!   provider task id to the [`TaskPoller`].
//!
//! Adapters are constructed on demand by the [`ProviderRegistry`] and
//! share one [`MediaResolver`] for turning media references into bytes.

pub mod accumulator;
pub mod adapters;
pub mod auth;
pub mod error;
pub mod fields;
pub mod http;
pub mod media;
pub mod poller;
pub mod registry;
pub mod sse;

pub use adapters::{AdapterContext, GenerationAdapter};
pub use error::ProviderError;
pub use media::{MediaError, MediaResolver, ResolvedMedia};
pub use poller::{PollerConfig, TaskPoller};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};

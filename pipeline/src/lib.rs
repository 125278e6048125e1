pub mod adapters;
pub mod embedding;
pub mod error;
pub mod integrator;
pub mod linker;
pub mod observability;
pub mod orchestrator;
pub mod registries;
pub mod resilience;
pub mod similarity;
pub mod storage;
pub mod venues;

pub use error::{PipelineError, Result};

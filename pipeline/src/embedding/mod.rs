mod client;
pub mod text;
mod worker;

pub use client::{EmbeddingBatchResult, EmbeddingClient, ReqwestEmbeddingClient};
pub use worker::{EmbeddingWorker, SweepReport};

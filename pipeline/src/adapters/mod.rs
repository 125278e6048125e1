mod browser;
mod http_paged;
mod registry;
mod ticketed_source;

pub use browser::{BrowserAdapter, BrowserAction, BrowserlessClient};
pub use http_paged::{HttpPagedAdapter, PagedSource};
pub use registry::SourceRegistry;
pub use ticketed_source::TicketedDiscoveryFeed;

use async_trait::async_trait;
use eventmesh_core::domain::NormalizedEventDocument;

use crate::error::Result;

/// `Fetch` + `Map` pair for one portal. `fetch_and_map` does both in one
/// call since every concrete adapter's `Map` step is pure and has no
/// reason to be invoked separately from `Fetch`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_and_map(&self, cap: usize) -> Result<Vec<NormalizedEventDocument>>;
}

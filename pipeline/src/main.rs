use std::io::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eventmesh_core::config::Config;
use eventmesh_core::storage::Storage;
use eventmesh_pipeline::adapters::{HttpPagedAdapter, SourceRegistry, TicketedDiscoveryFeed};
use eventmesh_pipeline::embedding::{EmbeddingClient, EmbeddingWorker, ReqwestEmbeddingClient};
use eventmesh_pipeline::integrator::Integrator;
use eventmesh_pipeline::observability::{logging, metrics};
use eventmesh_pipeline::orchestrator::Orchestrator;
use eventmesh_pipeline::resilience::{CircuitBreaker, RateLimiter};
use eventmesh_pipeline::similarity::SimilarityService;
use eventmesh_pipeline::storage::{InMemoryStorage, LibsqlStorage};
use eventmesh_pipeline::venues::{PlacesClient, ReqwestPlacesClient, VenueEnricher};
use tracing::{error, info};

/// Event aggregation and semantic-recommendation backend pipeline.
#[derive(Parser)]
#[command(name = "eventmesh-pipeline")]
struct Cli {
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every registered source adapter and print the merged document count.
    Scrape,
    /// Pull, merge, and integrate all source adapters in one pass.
    Integrate,
    /// Sweep events missing an embedding and fill them in.
    Embed,
    /// Resolve and refresh stale venues via the Places provider.
    Enrich,
    /// Read a query line from stdin, print the nearest events (local smoke-test harness).
    ServeSimilarity,
    /// Scrape, integrate, then embed in sequence.
    Run,
    /// Run the periodic venue-refresh sweep forever, once a day at `places.refresh_cron`.
    Serve,
}

struct Context {
    config: Config,
    storage: Arc<dyn Storage>,
}

impl Context {
    async fn load(config_path: &str) -> anyhow::Result<Self> {
        let config = Config::load_or_default(config_path);
        let storage: Arc<dyn Storage> = match std::env::var("LIBSQL_URL") {
            Ok(_) => {
                let libsql = LibsqlStorage::connect().await?;
                libsql.run_migrations().await?;
                Arc::new(libsql)
            }
            Err(_) => {
                info!("LIBSQL_URL not set, using in-memory storage");
                Arc::new(InMemoryStorage::new())
            }
        };
        Ok(Self { config, storage })
    }

    fn source_registry(&self) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        if let Ok(api_key) = std::env::var("TICKETMASTER_API_KEY") {
            registry.register(Arc::new(HttpPagedAdapter::new(
                TicketedDiscoveryFeed::new(
                    "ticketmaster",
                    "https://app.ticketmaster.com",
                    api_key,
                ),
                reqwest::Client::new(),
            )));
        }
        registry
    }

    fn venue_enricher(&self) -> Option<Arc<VenueEnricher>> {
        if !self.config.places.enrich_enabled {
            return None;
        }
        let api_key = std::env::var("GOOGLE_PLACES_API_KEY").ok()?;
        let places: Arc<dyn PlacesClient> = Arc::new(ReqwestPlacesClient::new(api_key));
        let rate_limiter = RateLimiter::new(Duration::from_millis(self.config.places.rate_delay_ms));
        let breaker = CircuitBreaker::new(
            "places",
            self.config.resilience.cb_window,
            self.config.resilience.cb_min_calls,
            self.config.resilience.cb_failure_rate,
            Duration::from_secs(self.config.resilience.cb_open_wait_secs),
            self.config.resilience.cb_half_open_probes,
        );
        Some(Arc::new(VenueEnricher::new(
            self.storage.clone(),
            places,
            rate_limiter,
            breaker,
            self.config.resilience.retry_max,
            Duration::from_millis(self.config.resilience.retry_wait_ms),
        )))
    }

    fn embedding_client(&self) -> anyhow::Result<Arc<dyn EmbeddingClient>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY must be set to use the embedding worker"))?;
        Ok(Arc::new(ReqwestEmbeddingClient::new(
            api_key,
            self.config.embedding.model.clone(),
            self.config.embedding.dimensions,
        )))
    }

    async fn scrape_and_integrate(&self) -> anyhow::Result<()> {
        let registry = self.source_registry();
        if registry.is_empty() {
            info!("no source adapters registered (set e.g. TICKETMASTER_API_KEY)");
            return Ok(());
        }

        let orchestrator = Orchestrator::new(
            registry,
            self.config.scrape.concurrency,
            self.config.scrape.cap_per_source,
            self.config.integrator.batch,
        );
        let merged = orchestrator.run().await;
        info!(
            documents = merged.documents.len(),
            duplicates_dropped = merged.duplicates_dropped,
            adapter_errors = merged.adapter_errors.len(),
            "scrape complete"
        );

        let integrator = Integrator::new(
            self.storage.clone(),
            self.venue_enricher(),
            self.config.integrator.chunk,
            Duration::from_secs(self.config.integrator.tick_secs),
        );
        let report = integrator.process_batch(merged.documents).await?;
        info!(
            processed = report.processed,
            skipped_seen = report.skipped_seen,
            errors = report.errors,
            timestamps_fabricated = report.timestamps_fabricated,
            "integration complete"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();
    if let Err(e) = metrics::init() {
        error!(error = %e, "failed to install metrics recorder");
    }

    let cli = Cli::parse();
    let ctx = Context::load(&cli.config).await?;

    match cli.command {
        Command::Scrape => {
            let registry = ctx.source_registry();
            let orchestrator = Orchestrator::new(
                registry,
                ctx.config.scrape.concurrency,
                ctx.config.scrape.cap_per_source,
                ctx.config.integrator.batch,
            );
            let merged = orchestrator.run().await;
            println!("merged {} documents ({} duplicates dropped)", merged.documents.len(), merged.duplicates_dropped);
        }
        Command::Integrate => {
            ctx.scrape_and_integrate().await?;
        }
        Command::Embed => {
            let client = ctx.embedding_client()?;
            let worker = EmbeddingWorker::new(
                ctx.storage.clone(),
                client,
                ctx.config.integrator.batch,
                ctx.config.embedding.subbatch,
                Duration::from_millis(ctx.config.embedding.sleep_ms),
            );
            let report = worker.sweep().await?;
            println!("embedded {} of {} events ({} sub-batch errors)", report.embedded, report.attempted, report.subbatch_errors);
        }
        Command::Enrich => {
            match ctx.venue_enricher() {
                Some(enricher) => {
                    let refreshed = enricher.refresh_sweep(ctx.config.places.refresh_days, ctx.config.integrator.batch).await?;
                    println!("refreshed {refreshed} stale venues");
                }
                None => println!("venue enrichment disabled (set places.enrich_enabled and GOOGLE_PLACES_API_KEY)"),
            }
        }
        Command::ServeSimilarity => {
            let client = ctx.embedding_client()?;
            let service = SimilarityService::new(ctx.storage.clone(), client);
            let stdin = io::stdin();
            let mut line = String::new();
            print!("query> ");
            io::stdout().flush().ok();
            while stdin.read_line(&mut line)? > 0 {
                let query = line.trim();
                if !query.is_empty() {
                    match service.find_similar(query, 10).await {
                        Ok(events) => {
                            for event in events {
                                println!("{}\t{}", event.event_name, event.url);
                            }
                        }
                        Err(e) => error!(error = %e, "similarity query failed"),
                    }
                }
                line.clear();
                print!("query> ");
                io::stdout().flush().ok();
            }
        }
        Command::Run => {
            ctx.scrape_and_integrate().await?;
            let client = ctx.embedding_client()?;
            let worker = EmbeddingWorker::new(
                ctx.storage.clone(),
                client,
                ctx.config.integrator.batch,
                ctx.config.embedding.subbatch,
                Duration::from_millis(ctx.config.embedding.sleep_ms),
            );
            let report = worker.sweep().await?;
            info!(embedded = report.embedded, attempted = report.attempted, "embedding sweep complete");
        }
        Command::Serve => match ctx.venue_enricher() {
            Some(enricher) => {
                info!(cron = %ctx.config.places.refresh_cron, "starting venue refresh ticker");
                enricher
                    .run_refresh_ticker(&ctx.config.places.refresh_cron, ctx.config.places.refresh_days, ctx.config.integrator.batch)
                    .await;
            }
            None => println!("venue enrichment disabled (set places.enrich_enabled and GOOGLE_PLACES_API_KEY)"),
        },
    }

    Ok(())
}

mod cli;

use crate::cli::{Command, LogFormat, StorageBackendArg, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tinylink_core::{Repository, RequestContext};
use tinylink_shortener::{ensure_owner, BatchItem, ShortenerService};
use tinylink_storage::{FileRepository, InMemoryRepository, PostgresRepository, StorageSettings};
use tinylink_worker::{PoolSettings, TaskPool};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    let backend = config.storage_backend();
    let settings = StorageSettings::builder()
        .base_url(config.base_url.as_str())
        .build();

    info!(
        base_url = %config.base_url,
        storage_backend = %backend,
        workers = config.workers,
        "starting tinylink"
    );

    match backend {
        StorageBackendArg::InMemory => run(InMemoryRepository::new(settings), &config).await,
        StorageBackendArg::File => {
            let path = config
                .file_storage_path
                .as_deref()
                .context("file storage path is required when storage backend is file")?;
            let repository = FileRepository::open(path, settings)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            run(repository, &config).await
        }
        StorageBackendArg::Postgres => {
            let dsn = config
                .database_dsn
                .as_deref()
                .context("database dsn is required when storage backend is postgres")?;
            let repository = PostgresRepository::connect(dsn, settings)
                .await
                .context("connecting to postgres")?;
            repository
                .init_schema()
                .await
                .context("applying postgres schema")?;
            run(repository, &config).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run<R: Repository>(repository: R, config: &CLI) -> anyhow::Result<()> {
    let pool = TaskPool::with_settings(&PoolSettings::builder().workers(config.workers).build());
    let service = ShortenerService::new(repository, pool, config.base_url.as_str());

    let result = execute(&service, &config.command).await;
    service.shutdown().await.context("shutting down")?;
    result
}

async fn execute<R: Repository>(service: &ShortenerService<R>, command: &Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten {
            url,
            owner,
            via_pool,
        } => {
            let (ctx, owner) = ensure_owner(context_for(*owner));
            let outcome = if *via_pool {
                service.shorten_via_pool(&ctx, url).await?
            } else {
                service.shorten(&ctx, url).await?
            };
            print_json(&serde_json::json!({
                "owner": owner,
                "short_url": outcome.short_url,
                "status": outcome.status.status_code(),
            }))
        }
        Command::Batch { input, owner } => {
            let items = read_batch(input)?;
            let (ctx, owner) = ensure_owner(context_for(*owner));
            let results = service.shorten_batch(&ctx, items).await?;
            print_json(&serde_json::json!({ "owner": owner, "results": results }))
        }
        Command::Resolve { code } => {
            let original_url = service.resolve(code).await?;
            println!("{original_url}");
            Ok(())
        }
        Command::List { owner } => {
            let urls = service.user_urls(&RequestContext::for_owner(*owner)).await?;
            print_json(&urls)
        }
        Command::Delete {
            owner,
            codes,
            detach,
        } => {
            let ctx = RequestContext::for_owner(*owner);
            if *detach {
                // Shutdown drains the pool, so the delete still completes.
                let handle = service.delete_urls(&ctx, codes).await?;
                info!(task = handle.id(), "delete accepted");
            } else {
                service.delete_urls_and_wait(&ctx, codes).await?;
            }
            Ok(())
        }
        Command::Ping => {
            let status = service.ping().await?;
            print_json(&serde_json::json!({ "status": status.status_code() }))
        }
        Command::Stats => {
            let stats = service.stats().await?;
            print_json(&stats)
        }
    }
}

fn context_for(owner: Option<tinylink_core::OwnerId>) -> RequestContext {
    owner.map_or_else(RequestContext::anonymous, RequestContext::for_owner)
}

fn read_batch(input: &Path) -> anyhow::Result<Vec<BatchItem>> {
    let mut raw = String::new();
    if input == Path::new("-") {
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading batch from stdin")?;
    } else {
        raw = std::fs::read_to_string(input)
            .with_context(|| format!("reading batch from {}", input.display()))?;
    }

    let items: Vec<BatchItem> = serde_json::from_str(&raw).context("parsing batch json")?;
    if items.is_empty() {
        bail!("empty batch is not allowed");
    }
    Ok(items)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

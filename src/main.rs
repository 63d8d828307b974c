//! Command-line entry point: `parse filesystem` runs one bulk ingest and
//! exits; `serve` starts the long-running gRPC/REST/metrics listeners under
//! the Lifecycle Supervisor.

use std::path::PathBuf;
use std::sync::Arc;

pub use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};
use tracing_subscriber::{
    fmt::{format::FmtSpan, Subscriber},
    prelude::*,
    EnvFilter,
};

use geoloc_service::config::Config;
use geoloc_service::errors::display_causes_and_backtrace;
use geoloc_service::lookup::LookupService;
use geoloc_service::metrics::MetricsListener;
use geoloc_service::pipeline;
use geoloc_service::reader::FilesystemSource;
use geoloc_service::rest::RestListener;
use geoloc_service::rpc::GrpcListener;
use geoloc_service::storage::{PostgresStore, Store};
use geoloc_service::supervisor::{Service, Supervisor, DEFAULT_SHUTDOWN_DEADLINE};

/// Our command-line arguments.
#[derive(Debug, Parser)]
#[command(author, version, about = "bulk ingest and lookup service for IP geolocation data")]
struct Opt {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single bulk-ingest pass and exit.
    Parse {
        #[command(subcommand)]
        source: ParseSource,
    },
    /// Start the gRPC, REST gateway and metrics listeners and run until
    /// shutdown.
    Serve,
}

/// Where `parse` reads its rows from.
#[derive(Debug, Subcommand)]
enum ParseSource {
    /// Read rows from a local CSV file.
    Filesystem {
        /// Path to the CSV file to ingest.
        #[arg(long = "file")]
        file: PathBuf,

        /// Number of decode/validate worker tasks.
        #[arg(long = "parallel", default_value_t = 1)]
        parallel: usize,

        /// Log each discard reason as it happens, not just the final report.
        #[arg(long = "verbose")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    let verbose = matches!(
        &opt.cmd,
        Command::Parse { source: ParseSource::Filesystem { verbose: true, .. } }
    );

    // `--verbose` forces debug-level logging (so every discard reason is
    // logged as it happens, not just in the final report) even if `RUST_LOG`
    // is unset; an explicit `RUST_LOG` still wins for anyone who set one.
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::from_default_env()
    };
    Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_env_filter(filter)
        .finish()
        .init();
    let _span = info_span!("geoloc-service").entered();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let result = match opt.cmd {
        Command::Parse { source: ParseSource::Filesystem { file, parallel, verbose } } => {
            run_parse_filesystem(file, parallel, verbose).await
        }
        Command::Serve => run_serve().await,
    };

    if let Err(err) = &result {
        display_causes_and_backtrace(err);
    }

    result
}

async fn run_parse_filesystem(file: PathBuf, parallel: usize, verbose: bool) -> Result<()> {
    let config = Config::from_env()?;
    let store: Arc<dyn Store> = Arc::new(PostgresStore::connect(&config.database).await?);
    let source = FilesystemSource::new(file);

    if verbose {
        debug!(parallel, "starting ingest");
    }

    pipeline::run(&source, parallel, store, CancellationToken::new()).await?;

    Ok(())
}

async fn run_serve() -> Result<()> {
    let config = Config::from_env()?;
    let pg_store = PostgresStore::connect(&config.database).await?;
    let pool = pg_store.pool();
    let store: Arc<dyn Store> = Arc::new(pg_store);

    let lookup = Arc::new(LookupService::new(store));

    let grpc_addr = config.grpc_addr().parse()?;
    let rest_addr = config.rest_addr().parse()?;
    let metrics_addr = config.metrics_addr().parse()?;

    let services: Vec<Box<dyn Service>> = vec![
        Box::new(GrpcListener::new(grpc_addr, lookup)),
        Box::new(RestListener::new(rest_addr, config.grpc_dial_addr())),
        Box::new(MetricsListener::new(metrics_addr)),
    ];

    let release_hooks: Vec<geoloc_service::supervisor::ReleaseHook> = vec![Box::pin(async move {
        pool.close().await;
        info!("database pool closed");
    })];

    let supervisor = Supervisor::new();
    supervisor.run(services, release_hooks, DEFAULT_SHUTDOWN_DEADLINE).await?;

    Ok(())
}

//! opsdesk daemon entry point.
//!
//! Start-up is strictly ordered: logging, configuration, the IPv4 database
//! bootstrap, credentials, then the async runtime with the database pool,
//! the object storage gateway and the HTTP listener. Everything before the
//! runtime runs on the main thread while the process is single-threaded.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use opsdesk::bootstrap::{self, BootstrapReport, ProcessEnv, SystemResolver};
use opsdesk::config::Config;
use opsdesk::credentials::Credentials;
use opsdesk::database;
use opsdesk::http::{self, AppState};
use opsdesk::storage::{self, HmacUrlSigner, ObjectStorageGateway};

#[derive(Debug, Parser)]
#[command(
    name = "opsdesk",
    version,
    about = "Backend for the opsdesk business-operations app"
)]
struct Cli {
    /// Path to the TOML config file [default: ./opsdesk.toml if present]
    #[arg(long, env = "OPSDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long, env = "OPSDESK_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, env = "OPSDESK_LOG_JSON")]
    log_json: bool,

    /// Run without a database (DATABASE_URL becomes optional)
    #[arg(long)]
    no_database: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "opsdesk failed to start");
            ExitCode::FAILURE
        },
    }
}

/// Initialize logging: `RUST_LOG` filter, `info` by default.
fn init_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut env = ProcessEnv;

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env(&env);
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.no_database {
        config.database.required = false;
    }

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!(%warning, "Configuration warning");
    }

    // Must run before anything opens a connection or spawns a thread.
    let report = bootstrap::run(&mut env, &SystemResolver, config.database.required)?;

    let credentials = Credentials::resolve(&env)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(start(config, credentials, report, !cli.no_database))
}

async fn start(
    config: Config,
    credentials: Credentials,
    report: BootstrapReport,
    use_database: bool,
) -> Result<()> {
    let storage_creds = &credentials.storage.value;
    let signer = HmacUrlSigner::new(
        &config.storage_url(),
        &storage_creds.private_key,
        &storage_creds.client_email,
    )?;

    let backend = storage::open_backend(
        config.storage.backend,
        &config.storage_dir(),
        signer.clone(),
    )?;
    let gateway = ObjectStorageGateway::from_arc(backend, config.gateway());
    info!(
        backend = ?config.storage.backend,
        private_dir = %gateway.config().private_dir,
        search_paths = ?gateway.config().public_search_paths,
        "Object storage ready"
    );

    let mut state = AppState::new(gateway, signer)
        .with_download_cache_ttl(config.download_cache_ttl())
        .with_request_timeout(config.request_timeout());

    match report.database_url.filter(|_| use_database) {
        Some(url) => {
            let pool = database::connect_lazy(&url, &config.database)?;
            state = state.with_database(pool);
        },
        None => info!("Running without a database"),
    }

    match http::metrics::install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!(error = %e, "Metrics disabled"),
    }

    if credentials.payment.placeholder {
        warn!(
            "Payment key is the development placeholder ({})",
            opsdesk::credentials::PAYMENT_PLACEHOLDER_KEY
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        public_url = %config.public_url(),
        "Starting opsdesk"
    );

    http::serve(&config.server.host, config.server.port, state).await
}

use clap::Parser;
use ilm_limiter_cluster::{ElasticsearchConfig, ElasticsearchGateway};
use ilm_limiter_core::{CoreResult, RunConfig};
use ilm_limiter_engine::{PhaseLimitEngine, RunReport, ShutdownFlag, TracingSink};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ilm-limiter")]
#[command(
    about = "Moves the oldest indices of a lifecycle phase to the next phase once the phase exceeds its size limit",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// URL with protocol and port (e.g., https://localhost:9200)
    #[arg(long, env = "ELASTICSEARCH_HOST")]
    url: String,

    /// Username for basic authentication
    #[arg(long, env = "ELASTICSEARCH_AUTH_USR")]
    username: String,

    /// Password for basic authentication
    #[arg(long, env = "ELASTICSEARCH_AUTH_PSW", hide_env_values = true)]
    password: String,

    /// Log the moves without issuing them
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logs
    #[arg(long)]
    debug: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
}

impl Cli {
    fn gateway_config(&self) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let shutdown = ShutdownFlag::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let config = RunConfig::new(cli.dry_run);
    match run(&cli, &config, shutdown).await {
        Ok(report) => {
            tracing::debug!(policies = report.policies.len(), "exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("elasticsearch ({}): {}", cli.url, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: &RunConfig, shutdown: ShutdownFlag) -> CoreResult<RunReport> {
    let gateway = ElasticsearchGateway::new(cli.gateway_config())?;
    let engine = PhaseLimitEngine::new(Arc::new(gateway), Arc::new(TracingSink), shutdown);
    engine.run_limits(config).await
}

/// Raises `shutdown` on SIGTERM or Ctrl-C instead of terminating.
///
/// The pass in progress keeps going; policies not yet started are skipped.
async fn watch_signals(shutdown: ShutdownFlag) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received CTRL+C signal, finishing current lifecycle");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM signal, finishing current lifecycle");
        }
    }

    shutdown.request();
}

fn init_logging(debug: bool) {
    let default = if debug {
        "debug"
    } else {
        "info,reqwest=error,hyper=error"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(env_filter).with_target(false).init();
}

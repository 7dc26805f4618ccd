//! `jobflow` -- command-line client for the upload-and-process backend.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default    | Description                       |
//! |--------------------------------|----------|------------|-----------------------------------|
//! | `JOBFLOW_API_URL`              | yes      | --         | Backend base URL                  |
//! | `JOBFLOW_POLL_INTERVAL_MS`     | no       | `1500`     | Milliseconds between status polls |
//! | `JOBFLOW_POLL_MAX_ATTEMPTS`    | no       | unbounded  | Give up after this many polls     |
//! | `JOBFLOW_REQUEST_TIMEOUT_SECS` | no       | `30`       | Per-request HTTP timeout          |
//! | `JOBFLOW_DEFAULT_CONTENT_TYPE` | no       | `text/csv` | Used for unknown file extensions  |

use jobflow_cli::command::{Command, USAGE};
use jobflow_cli::run::{self, TranslateOutcome};
use jobflow_client::api::BackendApi;
use jobflow_client::{ClientConfig, JobOrchestrator};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jobflow_cli=info,jobflow_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = Command::parse(std::env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("{e}\n\n{USAGE}");
        std::process::exit(2);
    });

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        api_url = %config.api_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Starting jobflow",
    );

    if let Err(e) = execute(command, &config).await {
        tracing::error!(error = %format!("{e:#}"), "Command failed");
        std::process::exit(1);
    }
}

async fn execute(command: Command, config: &ClientConfig) -> anyhow::Result<()> {
    match command {
        Command::Translate { file } => {
            let orchestrator = JobOrchestrator::from_config(config)?;
            let outcome = run::translate(
                &orchestrator,
                &file,
                &config.default_content_type,
                shutdown_signal(),
            )
            .await?;

            match outcome {
                TranslateOutcome::Completed { download_url } => println!("{download_url}"),
                TranslateOutcome::Cancelled => std::process::exit(130),
            }
        }
        Command::Export(request) => {
            let api = BackendApi::with_client(config.http_client()?, config.api_url.clone());
            let path = run::export(&api, &request, &std::env::current_dir()?).await?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

/// Resolves on Ctrl-C (or SIGTERM on unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling");
        }
    }
}

//! Cutout entry point.
//!
//! Binary name: `cutout`
//!
//! Parses CLI arguments, installs tracing, wires the services, then runs
//! the Telegram bot or a one-shot command.

mod bot;
mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG overrides.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,cutout=debug,cutout_core=debug,cutout_infra=debug",
        _ => "trace",
    };
    cutout_observe::tracing_setup::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    cutout_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "cutout", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve => {
            cli::serve::serve(state, cli.quiet).await?;
        }

        Commands::Remove {
            input,
            output,
            preview,
        } => {
            cli::remove::remove_background(&state, &input, output, preview, cli.json, cli.quiet)
                .await?;
        }

        Commands::Config => {
            cli::config::show_config(&state, cli.json)?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
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
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

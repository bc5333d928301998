//! `cutout serve`: run the Telegram bot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use cutout_infra::config::resolve_bot_token;
use cutout_infra::telegram::TelegramClient;
use tokio_util::sync::CancellationToken;

use crate::bot::{self, Router};
use crate::state::AppState;

/// Run the bot until Ctrl+C or SIGTERM, then shut down the poll loop, the
/// worker pool and the reaper.
pub async fn serve(state: AppState, quiet: bool) -> Result<()> {
    let telegram = &state.config.telegram;
    let token = resolve_bot_token(&telegram.token_env)
        .with_context(|| format!("set {} to the bot token from BotFather", telegram.token_env))?;
    let client = TelegramClient::new(
        token,
        telegram.api_base.clone(),
        Duration::from_secs(telegram.poll_timeout_secs),
    )?;

    if state.config.segmenter.eager_load {
        tracing::info!("loading segmentation model at startup");
        state
            .service
            .handle()
            .warm_up()
            .await
            .context("segmentation model failed to load")?;
    }

    let cancel = CancellationToken::new();
    let reaper = state.spawn_reaper(cancel.child_token());

    let router = Router::new(
        Arc::new(client),
        Arc::clone(&state.service),
        state.config.limits.max_input_bytes,
    );
    let mut poller = tokio::spawn(bot::run(router, cancel.child_token()));

    if !quiet {
        println!(
            "  {} Cutout bot running ({} backend, {} workers)",
            style("✂").bold(),
            style(state.config.segmenter.backend).cyan(),
            state.config.workers.workers.max(1)
        );
        println!("  {}", style("Press Ctrl+C to stop").dim());
    }

    tokio::select! {
        _ = crate::shutdown_signal() => {
            tracing::info!("shutdown requested");
        }
        joined = &mut poller => {
            joined.context("poll loop panicked")?;
        }
    }

    cancel.cancel();
    state.service.offloader().close();
    if !poller.is_finished() {
        poller.await.context("poll loop panicked")?;
    }
    reaper.await.context("reaper panicked")?;

    if !quiet {
        println!("\n  Bot stopped.");
    }
    Ok(())
}

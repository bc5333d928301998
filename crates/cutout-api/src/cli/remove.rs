//! One-shot background removal from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use console::style;
use cutout_types::owner::OwnerId;

use crate::state::AppState;

/// Owner id for local, non-chat requests.
const LOCAL_OWNER: OwnerId = OwnerId(0);

/// Run `input` through the same pipeline the bot uses and write a PNG.
pub async fn remove_background(
    state: &AppState,
    input: &Path,
    output: Option<PathBuf>,
    preview: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let raw = tokio::fs::read(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;

    let limit = state.config.limits.max_input_bytes;
    if raw.len() as u64 > limit {
        bail!(
            "{} is {} bytes, over the {} byte limit (limits.max_input_bytes)",
            input.display(),
            raw.len(),
            limit
        );
    }

    let service = &state.service;
    service
        .submit(LOCAL_OWNER, raw)?
        .await
        .with_context(|| format!("failed to process {}", input.display()))?;

    let (width, height) = service
        .store()
        .get(LOCAL_OWNER)
        .map(|c| c.dimensions())
        .context("result vanished before it could be written")?;

    let png = if preview {
        service.preview(LOCAL_OWNER).await?
    } else {
        service.download(LOCAL_OWNER).await?
    };

    let output = output.unwrap_or_else(|| default_output(input));
    tokio::fs::write(&output, &png)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    if json {
        let report = serde_json::json!({
            "input": input.display().to_string(),
            "output": output.display().to_string(),
            "width": width,
            "height": height,
            "bytes": png.len(),
            "preview": preview,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        println!(
            "  {} Background removed: {} {} {}",
            style("✓").green(),
            input.display(),
            style("→").dim(),
            style(output.display()).cyan()
        );
        println!(
            "  {}",
            style(format!("{width}x{height}, {} bytes", png.len())).dim()
        );
    }
    Ok(())
}

/// `photo.jpg` -> `photo_transparent.png` next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_transparent.png"))
}

mod audio;
mod cli;
mod config;
mod error;
mod export;
mod pipeline;
mod render;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use pipeline::Settings;
use render::text::{load_font_from_url, TextOverlay};

const LABEL_FONT_SIZE: f32 = 14.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let config = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };

    let settings = Settings::resolve(cli, config)?;

    if !settings.input.exists() {
        anyhow::bail!("Input file not found: {}", settings.input.display());
    }

    log::info!("specframe - frame spectrum analyzer");
    log::info!("Input: {}", settings.input.display());
    log::info!("Output: {}", settings.output_dir.display());
    log::info!(
        "Frame: {}ms, plotting frame {} ({:?} trailing frame)",
        settings.frame_length_ms,
        settings.frame_index + 1,
        settings.policy
    );
    if !settings.rates.is_empty() {
        log::info!("Down-sampling chain: {:?}", settings.rates);
    }

    let text = if settings.plots {
        let font_bytes = match settings.font_url.as_deref() {
            Some(url) => match load_font_from_url(url) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    log::warn!("Failed to load font from URL: {:#}", err);
                    None
                }
            },
            None => None,
        };
        let overlay = TextOverlay::load(LABEL_FONT_SIZE, settings.font.as_deref(), font_bytes.as_deref());
        if overlay.is_none() {
            log::warn!("No usable font found; plots will be drawn without labels (use --font)");
        }
        overlay
    } else {
        None
    };

    let outcomes = pipeline::run(&settings, text)?;

    for outcome in &outcomes {
        log::debug!(
            "{}Hz ({}): {:?}, {} plot(s){}",
            outcome.sample_rate,
            outcome.source.display(),
            outcome.report.comparison,
            outcome.plots.len(),
            outcome
                .export
                .as_ref()
                .map(|p| format!(", exported {}", p.display()))
                .unwrap_or_default()
        );
    }

    let skipped = outcomes.iter().filter(|o| o.skipped.is_some()).count();
    let plots: usize = outcomes.iter().map(|o| o.plots.len()).sum();
    log::info!(
        "Done! {} stage(s), {} plot(s) written, {} stage(s) without plots",
        outcomes.len(),
        plots,
        skipped
    );
    Ok(())
}

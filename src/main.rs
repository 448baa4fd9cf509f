use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use landslide_overlay::{pipeline, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.to_config().with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config: {:?}", path),
        None => "Missing inputs: pass --config or --landslide, --outline, --crown and --target"
            .to_string(),
    })?;

    let summary = pipeline::run(&config).context("Failed to build landslide overlay")?;

    tracing::info!(
        "Landslide {} -> frame {}, crown ({:.1}, {:.1}) -> target ({:.1}, {:.1}), rotation {:.1}°",
        summary.landslide_crs,
        summary.frame_crs,
        summary.crown_xy.0,
        summary.crown_xy.1,
        summary.target_xy.0,
        summary.target_xy.1,
        summary.rotation_deg
    );
    if let Some(len) = summary.scale_bar_m {
        tracing::info!("Scale bar: {} m", len);
    }
    for path in &summary.written {
        tracing::info!("Wrote {}", path.display());
    }

    Ok(())
}

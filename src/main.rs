//! catmaid-tiles - fetch regions of tiled CATMAID image stacks.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use image::GrayImage;
use ndarray::{Array3, Axis};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catmaid_tiles::{
    config::{Cli, Command, FetchConfig, MirrorsConfig},
    io::HttpTileSource,
    stack::Stack,
    tile::ImageFetcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Fetch(config) => run_fetch(config).await,
        Command::Mirrors(config) => run_mirrors(config).await,
    }
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let client = match config.connection.build_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = Arc::new(HttpTileSource::new());
    let mut fetcher =
        match ImageFetcher::from_catmaid(&client, config.stack_id, source, config.fetcher_options())
            .await
        {
            Ok(fetcher) => fetcher,
            Err(e) => {
                error!("Failed to load stack {}: {}", config.stack_id, e);
                return ExitCode::FAILURE;
            }
        };

    if config.fastest_mirror {
        if let Err(e) = fetcher.set_fastest_mirror(1, true).await {
            error!("Mirror probing failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let mirror = fetcher.mirror();
    info!(
        "Stack {}: {} mirror(s), using '{}' ({})",
        config.stack_id,
        fetcher.stack().mirrors().len(),
        mirror.title(),
        mirror.image_base()
    );

    let Some(roi) = config.roi() else {
        error!("--roi needs 6 values");
        return ExitCode::FAILURE;
    };

    let volume = match fetcher.get(roi, config.mode, config.zoom).await {
        Ok(volume) => volume,
        Err(e) => {
            error!("Fetch failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Fetched {:?} volume in {} order ({} cached tiles)",
        volume.shape(),
        config.order,
        fetcher.tile_cache().len()
    );

    match &config.output_dir {
        Some(dir) => match write_slices(&volume, dir) {
            Ok(count) => info!("Wrote {} slice(s) to {}", count, dir.display()),
            Err(e) => {
                error!("Failed to write slices: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => warn!("No --output-dir given; volume discarded"),
    }

    ExitCode::SUCCESS
}

/// Write each plane along the first output axis as a greyscale PNG.
fn write_slices(volume: &Array3<u8>, dir: &Path) -> Result<usize, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;

    let mut count = 0;
    for (i, plane) in volume.axis_iter(Axis(0)).enumerate() {
        let (height, width) = plane.dim();
        let pixels: Vec<u8> = plane.iter().copied().collect();
        let img = GrayImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| format!("slice {} has an invalid shape", i))?;

        let path = dir.join(format!("slice_{:05}.png", i));
        img.save(&path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        count += 1;
    }
    Ok(count)
}

// =============================================================================
// Mirrors Command
// =============================================================================

async fn run_mirrors(config: MirrorsConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let client = match config.connection.build_client() {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stack = match client.stack_info(config.stack_id).await {
        Ok(info) => match Stack::from_stack_info(&info) {
            Ok(stack) => stack,
            Err(e) => {
                error!("Invalid stack {}: {}", config.stack_id, e);
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            error!("Failed to load stack {}: {}", config.stack_id, e);
            return ExitCode::FAILURE;
        }
    };

    let source = HttpTileSource::new();
    let timings = stack
        .probe_mirrors(&source, config.timeout(), config.reps, !config.no_normalise)
        .await;

    println!("Mirrors of stack {}", config.stack_id);
    println!("═════════════════════════════════");
    for (mirror, timing) in stack.mirrors().iter().zip(&timings) {
        match timing {
            Some(t) => {
                println!("✓ [{}] {} ({}): {:.6}s", mirror.position(), mirror.title(), mirror.image_base(), t);
            }
            None => println!(
                "✗ [{}] {} ({}): unreachable",
                mirror.position(),
                mirror.title(),
                mirror.image_base()
            ),
        }
    }
    println!();

    match Stack::fastest_index(&timings) {
        Some(i) => {
            println!("Fastest: {}", stack.mirrors()[i].title());
            ExitCode::SUCCESS
        }
        None => {
            println!("No reachable mirrors found");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "catmaid_tiles=debug"
    } else {
        "catmaid_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

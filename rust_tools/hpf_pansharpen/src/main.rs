use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;

use hpf_pansharpen::cli::Args;
use hpf_pansharpen::{PansharpenError, Pansharpener, Result};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== HPF Pansharpening ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
            .map_err(|e| PansharpenError::ThreadPool(e.to_string()))?;
        info!("Using {} threads", n_threads);
    } else {
        info!("Using all available threads");
    }

    let config = args.to_config()?;
    info!(
        "Filter: {}, kernel {}x{}, clamp ({}, {}]",
        config.filter,
        config.kernel().size(),
        config.kernel().size(),
        config.clamp.min(),
        config.clamp.max()
    );

    match config.nodata {
        Some(nd) => info!("Using nodata value: {}", nd),
        None => info!("No nodata value specified, writing NaN"),
    }

    let mut pansharpener = Pansharpener::new(config);
    let summary = pansharpener.run(
        Path::new(&args.pan),
        Path::new(&args.mul),
        Path::new(&args.output),
    )?;

    info!(
        "Wrote {} bands ({}x{}) to {}",
        summary.band_count,
        summary.width,
        summary.height,
        summary.path.display()
    );
    info!("=== Done! ===");
    Ok(())
}

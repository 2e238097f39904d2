//! `qpd_lock`: run the QPD emulation pipeline and print its updates.
//!
//! ```text
//! qpd_lock --config config/qpd.toml --duration 10 --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use qpd_lock::config::QpdConfig;
use qpd_lock::qpd::{CameraQpd, QpdUpdate};
use qpd_lock::tracing_init;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Camera-based QPD emulation for a microscope focus lock"
)]
struct Args {
    /// Configuration file (TOML); `QPD_` environment variables override it
    #[arg(short, long, default_value = "config/qpd.toml")]
    config: PathBuf,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<f64>,

    /// Print updates and logs as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = QpdConfig::load_from(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    tracing_init::init_from_config(&config, args.json)?;
    info!(name = %config.application.name, "Starting QPD");

    let qpd = CameraQpd::from_config(&config).context("Failed to set up the QPD")?;
    let mut updates = qpd.subscribe();
    qpd.start_scan()?;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let mut liveness = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            received = updates.recv() => match received {
                Ok(update) => print_update(&update, args.json)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Console fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = liveness.tick() => {}
        }
        // The loop ended on its own; shutdown reports why.
        if !qpd.is_running() {
            break;
        }
    }

    tokio::task::spawn_blocking(move || qpd.shutdown())
        .await
        .context("Shutdown task failed")?
        .context("QPD stopped with an error")?;
    Ok(())
}

fn print_update(update: &QpdUpdate, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(update)?);
    } else if update.is_good {
        println!(
            "#{:<6} offset {:>9.4} um  sum {:>12.1}  quality {:.0}",
            update.frame_number, update.offset, update.sum, update.quality_total
        );
    } else {
        println!(
            "#{:<6} no good fits       sum {:>12.1}",
            update.frame_number, update.sum
        );
    }
    Ok(())
}

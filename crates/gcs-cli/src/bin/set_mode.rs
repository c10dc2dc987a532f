//! Switch the vehicle's flight mode.

use anyhow::Result;
use clap::Parser;

use gcs_cli::{init_tracing, LinkArgs};
use gcs_core::FlightMode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Switch flight mode (manual, auto, guided)")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,

    /// Target mode
    mode: FlightMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let session = args.link.connect().await?;
    let outcome = session.set_mode(args.mode).await;
    session.shutdown().await;
    let outcome = outcome?;

    println!("{}: {}", args.mode, outcome.result);
    if !outcome.result.is_success() {
        anyhow::bail!("mode change to {} rejected: {}", args.mode, outcome.result);
    }
    Ok(())
}

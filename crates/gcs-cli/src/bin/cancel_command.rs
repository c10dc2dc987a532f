//! Ask the vehicle to abort a long-running command.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use gcs_cli::{init_tracing, LinkArgs};
use gcs_link::LinkError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cancel a running MAVLink command")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,

    /// Command name or numeric code to cancel
    command: String,

    /// Seconds to wait for the vehicle's answer (0 to not wait)
    #[arg(long, default_value_t = 1.0)]
    wait: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let session = args.link.connect().await?;
    let code = match args.command.parse::<u16>() {
        Ok(code) => code,
        Err(_) => session.dispatcher().catalog().lookup(&args.command)?.code,
    };

    let mut pending = session.resolver().register(code);
    session.cancel(code).await?;
    println!("Cancel sent for command {}", code);

    if args.wait > 0.0 {
        match pending.next(Duration::from_secs_f64(args.wait)).await {
            Ok(ack) => println!("Command {}: {}", code, ack.result),
            // The command may already have finished
            Err(LinkError::AckTimeout { .. }) => println!("No answer for command {}", code),
            Err(err) => return Err(err.into()),
        }
    }

    drop(pending);
    session.shutdown().await;
    Ok(())
}

//! Send one MAVLink command and wait for its final acknowledgement.
//!
//! Usage:
//!   cargo run -p gcs-cli --bin send_command -- --link udpin:0.0.0.0:14550 nav_takeoff 0 0 0 0 10

use anyhow::Result;
use clap::Parser;

use gcs_cli::{init_tracing, LinkArgs};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a MAVLink command to a vehicle")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,

    /// Command name (nav_takeoff, MAV_CMD_NAV_TAKEOFF) or numeric code
    command: String,

    /// Values for the command's bound parameters, in catalog order
    #[arg(allow_negative_numbers = true)]
    values: Vec<f64>,

    /// Send once without waiting for an acknowledgement
    #[arg(long)]
    no_wait: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let session = args.link.connect().await?;

    let name = match args.command.parse::<u16>() {
        Ok(code) => session.dispatcher().catalog().lookup_code(code)?.name.clone(),
        Err(_) => args.command.clone(),
    };

    if args.no_wait {
        let invocation = session.dispatcher().send_named(&name, &args.values).await?;
        println!("Sent {} (code {})", name, invocation.command);
        session.shutdown().await;
        return Ok(());
    }

    let outcome = session.command(&name, &args.values).await;
    session.shutdown().await;
    let outcome = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "{} (code {}): {} after {} attempt(s)",
            name, outcome.command, outcome.result, outcome.attempts
        );
    }

    if !outcome.result.is_success() {
        anyhow::bail!("{} was not accepted: {}", name, outcome.result);
    }
    Ok(())
}

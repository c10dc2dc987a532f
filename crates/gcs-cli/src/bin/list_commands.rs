//! Print the command catalog.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use gcs_cli::LinkArgs;
use gcs_core::{CommandDefinition, Encoding};

#[derive(Parser, Debug)]
#[command(author, version, about = "List the commands the dispatcher knows")]
struct Args {
    #[command(flatten)]
    link: LinkArgs,

    /// Only commands whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Row<'a> {
    name: &'a str,
    code: u16,
    encoding: Encoding,
    params: Vec<&'a str>,
}

impl<'a> From<&'a CommandDefinition> for Row<'a> {
    fn from(definition: &'a CommandDefinition) -> Self {
        Self {
            name: &definition.name,
            code: definition.code,
            encoding: definition.encoding,
            params: definition.bound_labels(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let catalog = args.link.catalog()?;

    let filter = args.filter.as_deref().map(str::to_ascii_lowercase);
    let rows: Vec<Row> = catalog
        .iter()
        .filter(|definition| match &filter {
            Some(text) => definition.name.contains(text.as_str()),
            None => true,
        })
        .map(Row::from)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let encoding = match row.encoding {
            Encoding::LongForm => "long",
            Encoding::IntForm => "int",
        };
        println!(
            "{:>5}  {:<32} {:<4} {}",
            row.code,
            row.name,
            encoding,
            row.params.join(", ")
        );
    }
    Ok(())
}

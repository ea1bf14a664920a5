//! Session command - Show the stored record of a session.

use anyhow::Result;
use clap::Args;

use roofest_session::EstimationService;

use crate::commands::Cli;
use crate::render;

#[derive(Args)]
pub struct SessionArgs {
    /// Session id returned when the estimate was started
    id: String,

    /// Print the record as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(cli: &Cli, args: &SessionArgs) -> Result<()> {
    let id = args.id.trim();
    if id.is_empty() {
        anyhow::bail!("Session id must not be empty");
    }

    let service = cli.service()?;
    let record = service.session_record(id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", render::render_record(&record));
    }
    Ok(())
}

//! Estimate command - Run an interactive estimate.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

use roofest_session::{ContactDraft, SessionController, SessionError, SessionView};

use crate::commands::Cli;
use crate::render;

#[derive(Args)]
pub struct EstimateArgs {
    /// Property address; asked interactively when omitted
    #[arg(short, long)]
    address: Option<String>,

    /// Skip the offer to be contacted by a roofer
    #[arg(long)]
    no_lead: bool,

    /// Show the service's stored record once the estimate is complete
    #[arg(long)]
    show_record: bool,
}

/// Line-oriented stdin reader. `None` means input was closed.
struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn ask(&mut self, label: &str) -> Result<Option<String>> {
        print!("{}", label);
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    async fn confirm(&mut self, label: &str) -> Result<bool> {
        let answer = self.ask(&format!("{} [y/N] ", label)).await?;
        Ok(matches!(
            answer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y") | Some("yes")
        ))
    }
}

/// Tracks which timeline entries have been printed.
struct Transcript {
    last_printed: u64,
}

impl Transcript {
    fn print_new(&mut self, view: &SessionView) {
        for message in view.messages.iter() {
            if message.id > self.last_printed {
                println!("{}", render::render_message(message));
                self.last_printed = message.id;
            }
        }
    }
}

pub async fn execute(cli: &Cli, args: &EstimateArgs) -> Result<()> {
    let controller = cli.controller()?;
    let mut prompt = Prompt::new();
    let mut address = args.address.clone();

    loop {
        let finished = run_conversation(&controller, &mut prompt, address.take(), args).await?;
        if !finished || !prompt.confirm("\nStart a new estimate?").await? {
            break;
        }
        controller.reset_session();
    }

    Ok(())
}

/// One address-to-estimate run. Returns `false` when input was closed.
async fn run_conversation(
    controller: &SessionController,
    prompt: &mut Prompt,
    mut address: Option<String>,
    args: &EstimateArgs,
) -> Result<bool> {
    let mut transcript = Transcript { last_printed: 0 };

    loop {
        let input = match address.take() {
            Some(address) => address,
            None => match prompt.ask("📍 Property address: ").await? {
                Some(input) => input,
                None => return Ok(false),
            },
        };
        match controller.start_session(&input).await {
            Ok(()) => break,
            Err(e) => eprintln!("{}", render::render_error(&e)),
        }
    }
    transcript.print_new(&controller.snapshot());

    loop {
        let view = controller.snapshot();
        let Some(question) = view.session.current_question.clone() else {
            break;
        };

        println!("\n{}", render::render_progress(&view.session));
        print!("{}", render::render_options(&question));
        let Some(input) = prompt.ask("> ").await? else {
            return Ok(false);
        };

        let answer = match render::parse_answer(&question, &input) {
            Ok(answer) => answer,
            Err(message) => {
                eprintln!("✏️  {}", message);
                continue;
            }
        };

        match controller.submit_answer(answer).await {
            Ok(_) => transcript.print_new(&controller.snapshot()),
            Err(e) if e.is_fatal() => {
                eprintln!("{}", render::render_error(&e));
                return Err(e.into());
            }
            Err(e) => eprintln!("{}", render::render_error(&e)),
        }
    }

    let view = controller.snapshot();
    if let Some(estimate) = &view.final_estimate {
        println!("\n{}", render::render_final(estimate));
    }

    if args.show_record {
        match controller.fetch_remote_record().await {
            Ok(record) => println!("\n{}", render::render_record(&record)),
            Err(e) => eprintln!("{}", render::render_error(&e)),
        }
    }

    if !args.no_lead && prompt.confirm("\nWould you like a roofer to contact you?").await? {
        return capture_lead(controller, prompt).await;
    }
    Ok(true)
}

/// Ask for contact details and submit the lead, offering retries.
async fn capture_lead(controller: &SessionController, prompt: &mut Prompt) -> Result<bool> {
    loop {
        let Some(name) = prompt.ask("Name: ").await? else {
            return Ok(false);
        };
        let Some(email) = prompt.ask("Email: ").await? else {
            return Ok(false);
        };
        let Some(phone) = prompt.ask("Phone (optional): ").await? else {
            return Ok(false);
        };

        controller.collect_contact(ContactDraft {
            name: Some(name),
            email: Some(email),
            phone: Some(phone).filter(|p| !p.is_empty()),
        })?;

        loop {
            match controller.submit_lead().await {
                Ok(receipt) => {
                    info!(lead_id = ?receipt.id, "Lead captured");
                    println!("{}", render::render_lead_receipt(&receipt));
                    return Ok(true);
                }
                Err(e @ SessionError::Validation(_)) => {
                    eprintln!("{}", render::render_error(&e));
                    break;
                }
                Err(e) if e.is_retriable() => {
                    eprintln!("{}", render::render_error(&e));
                    if !prompt.confirm("Retry sending your details?").await? {
                        return Ok(true);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

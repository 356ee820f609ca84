use clap::{Parser, Subcommand};
use kestrel_ai_agent::shell::{self, ShellCommand};
use kestrel_ai_agent::startup::build_router;
use kestrel_ai_agent::{Config, Session};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Interactive monitor agent: ask about monitoring data or feed it documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; searched for in the usual places when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Start the interactive shell (the default)
    Chat,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let Commands::Chat = args.command.unwrap_or(Commands::Chat);

    let config = Config::load(args.config.as_deref())?;
    let router = build_router(&config).await?;
    let mut session = Session::new(Arc::new(router));

    println!(
        "{}",
        shell::banner(
            &format!("{}/{}", config.llm.provider, config.llm.model),
            &format!("{}/{}", config.embedding.provider, config.embedding.model),
        )
    );

    let result = chat(&mut session).await;
    session.release_attachment();
    Ok(result?)
}

async fn chat(session: &mut Session) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nGoodbye!");
            return Ok(());
        };

        match ShellCommand::parse(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Exit => {
                println!("Goodbye!");
                return Ok(());
            }
            ShellCommand::Help => println!("{}", shell::help_text()),
            ShellCommand::History => println!("{}", shell::format_history(session.history())),
            ShellCommand::Add(None) => println!("Error: please provide a file path"),
            ShellCommand::Add(Some(path)) => match session.add_file(&path) {
                Ok(()) => println!("File {path} ready. Please enter your query."),
                Err(e) => println!("Error: {e}"),
            },
            ShellCommand::Query(text) => {
                // Dropping the query future aborts its backend calls and
                // releases the attachment it took.
                tokio::select! {
                    result = session.query(&text) => match result {
                        Ok(response) => println!("{response}"),
                        Err(e) => println!("Error: {e}"),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Query cancelled by user");
                        println!("\nQuery cancelled.");
                    }
                }
            }
        }
    }
}

mod budget;
mod command;
mod config;
mod context;
mod extract;
mod prompt;
mod recovery;
mod repair;
mod salvage;
mod scanner;
mod server;
mod validator;

use crate::budget::ContextBudgeter;
use crate::config::Config;
use crate::context::{ContextSources, ConversationContext};
use crate::recovery::{Recovery, Turn};
use crate::server::{build_router, AppState};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "taskcoach", about = "Recover task commands from model output and keep prompts within budget")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(Parser)]
enum SubCommand {
    /// Start the HTTP server (default)
    Serve,
    /// Interpret a model response (file or stdin) and print the command
    Recover {
        file: Option<PathBuf>,
        /// The user message the response answers
        #[arg(short, long)]
        message: Option<String>,
        /// Print only the extracted JSON, failing if there is no valid command
        #[arg(long)]
        json_only: bool,
    },
    /// Assemble and trim a context from a JSON sources file, print the prompt
    Trim {
        file: PathBuf,
        #[arg(long)]
        max_units: Option<usize>,
        #[arg(short, long, default_value = "")]
        message: String,
    },
    /// Pull a summary and title out of a model response (file or stdin)
    Summary {
        file: Option<PathBuf>,
    },
    /// Send a model response to a running server's /recover
    Send {
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskcoach=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(Path::new(&cli.config))?;

    match cli.command.unwrap_or(SubCommand::Serve) {
        SubCommand::Serve => serve(config).await,
        SubCommand::Recover { file, message, json_only } => {
            let raw = read_input(file.as_deref())?;
            if json_only {
                let (json, found) = Recovery::new(config.recovery).chain().extract(&raw);
                anyhow::ensure!(found, "no valid command found");
                println!("{}", json);
                return Ok(());
            }
            let turn = Turn { user_message: message, ..Default::default() };
            let outcome = Recovery::new(config.recovery).interpret(&raw, &turn);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        SubCommand::Trim { file, max_units, message } => {
            let sources: ContextSources = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let ctx = ConversationContext::assemble(sources, &config.context);
            let mut budgeter = ContextBudgeter::from_config(&config.context);
            if let Some(max) = max_units {
                budgeter.max_units = max;
            }
            let trimmed = budgeter.trim(ctx);
            info!(units = trimmed.units, steps = trimmed.steps.len(), within_budget = trimmed.within_budget, "trimmed context");
            println!("{}", prompt::render(&trimmed.context, &message, chrono::Local::now().date_naive()));
            Ok(())
        }
        SubCommand::Summary { file } => {
            let raw = read_input(file.as_deref())?;
            match Recovery::new(config.recovery).recover_summary(&raw) {
                Some(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    Ok(())
                }
                None => anyhow::bail!("no summary found"),
            }
        }
        SubCommand::Send { text } => {
            let url = format!("http://{}:{}/recover", config.server.host, config.server.port);
            let client = reqwest::Client::new();
            let resp = client.post(&url)
                .json(&serde_json::json!({"text": text}))
                .send().await?;
            println!("{}", resp.text().await?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("📋 Taskcoach v{}", env!("CARGO_PKG_VERSION"));
    info!("Context budget: {} units", config.context.max_units);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = build_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Server: http://{}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

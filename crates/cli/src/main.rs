//! Promptforge CLI — the main entry point.
//!
//! Commands:
//! - `init`     — Write a default configuration file
//! - `topic`    — Create, list, and branch conversation topics
//! - `send`     — Send a message with collected context
//! - `workflow` — Run or list multi-step workflows
//! - `stage`    — Preview, apply, or discard proposed edits

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "promptforge",
    about = "Promptforge — prompt-centric developer assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Manage conversation topics
    Topic {
        #[command(subcommand)]
        command: commands::topic::TopicCommand,
    },

    /// Send a message on a topic, with optional context
    Send(commands::send::SendArgs),

    /// Run or list workflows
    Workflow {
        #[command(subcommand)]
        command: commands::workflow::WorkflowCommand,
    },

    /// Review and apply changes proposed by the model
    Stage {
        #[command(subcommand)]
        command: commands::stage::StageCommand,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Topic { command } => commands::topic::run(command).await?,
        Commands::Send(args) => commands::send::run(args).await?,
        Commands::Workflow { command } => commands::workflow::run(command).await?,
        Commands::Stage { command } => commands::stage::run(command).await?,
    }

    Ok(())
}

//! `promptforge stage` — Review and apply model-proposed edits.
//!
//! The pending change survives between invocations as a JSON file under
//! the config directory, so `propose`, `preview`, and `apply` can be
//! separate commands.

use clap::Subcommand;
use promptforge_config::AppConfig;
use promptforge_core::stage::StagedChange;
use promptforge_core::topic::{TopicId, TurnStatus};
use promptforge_stager::Stager;

use super::{open_store, CliError};

#[derive(Debug, Subcommand)]
pub enum StageCommand {
    /// Stage the edits proposed by a topic's latest completed turn
    Propose {
        /// Topic whose last response to stage
        #[arg(long)]
        topic: String,
    },

    /// Show the pending change as a diff
    Preview,

    /// Apply the pending change to the workspace
    Apply,

    /// Discard the pending change
    Discard,
}

fn pending_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("staged.json")
}

fn load_pending() -> Result<StagedChange, CliError> {
    let path = pending_path();
    if !path.exists() {
        return Err("No pending change. Stage one with: promptforge stage propose --topic <id>"
            .to_string()
            .into());
    }
    let json = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&json)?)
}

fn save_pending(change: &StagedChange) -> Result<(), CliError> {
    let path = pending_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(change)?)?;
    Ok(())
}

fn clear_pending() -> Result<(), CliError> {
    let path = pending_path();
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

fn stager(config: &AppConfig) -> Result<Stager, CliError> {
    let workdir = std::env::current_dir()?;
    Ok(Stager::new(workdir).with_commit(config.staging.commit))
}

pub async fn run(command: StageCommand) -> Result<(), CliError> {
    let config = AppConfig::load()?;

    match command {
        StageCommand::Propose { topic } => {
            let store = open_store(&config).await?;
            let turns = store.list_turns(&TopicId::from(&topic)).await?;
            let turn = turns
                .iter()
                .rev()
                .find(|t| t.status == TurnStatus::Completed)
                .ok_or("Topic has no completed turns")?;

            let stager = stager(&config)?;
            let change = stager.stage(turn.id.clone(), &turn.response).await?;
            let preview = stager.preview(&change).await?;
            save_pending(&change)?;

            println!("Staged change {} ({} edits)", change.id, change.edits.len());
            println!();
            println!("{preview}");
            println!("Apply with: promptforge stage apply");
        }
        StageCommand::Preview => {
            let change = load_pending()?;
            let preview = stager(&config)?.preview(&change).await?;
            println!("{preview}");
        }
        StageCommand::Apply => {
            let mut change = load_pending()?;
            stager(&config)?.apply(&mut change).await?;
            clear_pending()?;
            println!("Applied {} edits.", change.edits.len());
        }
        StageCommand::Discard => {
            let mut change = load_pending()?;
            stager(&config)?.discard(&mut change)?;
            clear_pending()?;
            println!("Discarded change {}.", change.id);
        }
    }
    Ok(())
}

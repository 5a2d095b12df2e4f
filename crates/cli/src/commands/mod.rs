//! Command implementations and shared wiring.

pub mod init;
pub mod send;
pub mod stage;
pub mod topic;
pub mod workflow;

use std::sync::Arc;

use clap::Args;
use promptforge_collector::ContextRequest;
use promptforge_config::AppConfig;
use promptforge_core::store::TopicStore;
use promptforge_engine::Session;
use promptforge_gateway::OpenAiClient;
use promptforge_topics::{InMemoryTopicStore, SqliteTopicStore};

pub type CliError = Box<dyn std::error::Error>;

/// Context flags shared by `send` and `workflow run`.
#[derive(Debug, Args)]
pub struct ContextArgs {
    /// Include a file's contents
    #[arg(short, long = "file")]
    pub files: Vec<String>,

    /// Include the output of a shell command
    #[arg(short, long = "command")]
    pub commands: Vec<String>,

    /// Include a git diff (range or paths)
    #[arg(short, long = "diff")]
    pub diffs: Vec<String>,

    /// Include a directory tree listing
    #[arg(short, long = "tree")]
    pub trees: Vec<String>,

    /// Include free-form text
    #[arg(short = 'n', long = "note")]
    pub notes: Vec<String>,
}

impl ContextArgs {
    pub fn requests(&self) -> Vec<ContextRequest> {
        let mut requests = Vec::new();
        requests.extend(self.files.iter().map(ContextRequest::file));
        requests.extend(self.commands.iter().map(ContextRequest::command));
        requests.extend(self.diffs.iter().map(ContextRequest::diff));
        requests.extend(self.trees.iter().map(ContextRequest::tree));
        requests.extend(self.notes.iter().map(ContextRequest::text));
        requests
    }
}

/// Load config and wire a full session against the configured store
/// and backend.
pub async fn build_session(config: &AppConfig) -> Result<Session, CliError> {
    let api_key = config.api_key.clone().ok_or_else(|| -> CliError {
        format!(
            "No API key configured. Set PROMPTFORGE_API_KEY or OPENAI_API_KEY, \
             or add api_key to {}",
            AppConfig::config_dir().join("config.toml").display()
        )
        .into()
    })?;

    let client = OpenAiClient::new("openai", &config.model.base_url, api_key)?;
    let store = open_store(config).await?;
    let workdir = std::env::current_dir()?;
    Ok(Session::new(config, store, Arc::new(client)).with_workdir(workdir))
}

pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn TopicStore>, CliError> {
    match config.storage.backend.as_str() {
        "in_memory" => Ok(Arc::new(InMemoryTopicStore::new())),
        "sqlite" => {
            let path = config.storage.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteTopicStore::new(&path.display().to_string()).await?;
            Ok(Arc::new(store))
        }
        other => Err(format!("Unknown storage backend '{other}'").into()),
    }
}

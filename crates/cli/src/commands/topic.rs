//! `promptforge topic` — Create, list, branch, and inspect topics.

use clap::Subcommand;
use promptforge_config::AppConfig;
use promptforge_core::topic::TopicId;

use super::{open_store, CliError};

#[derive(Debug, Subcommand)]
pub enum TopicCommand {
    /// Create a new topic
    New,

    /// List all topics, oldest first
    List,

    /// Branch a topic at a turn, sharing history up to that point
    Branch {
        /// Source topic id
        topic: String,

        /// Turn sequence number to branch after
        #[arg(long)]
        at: u64,
    },

    /// Show a topic's turns
    Show {
        /// Topic id
        topic: String,
    },
}

pub async fn run(command: TopicCommand) -> Result<(), CliError> {
    let config = AppConfig::load()?;
    let store = open_store(&config).await?;

    match command {
        TopicCommand::New => {
            let topic = store.create_topic().await?;
            println!("{}", topic.id);
        }
        TopicCommand::List => {
            let topics = store.list_topics().await?;
            if topics.is_empty() {
                println!("No topics yet. Create one with: promptforge topic new");
                return Ok(());
            }
            for topic in topics {
                let branch = match &topic.parent {
                    Some((parent, at)) => format!("  (branched from {parent} at turn {at})"),
                    None => String::new(),
                };
                println!(
                    "{}  turns: {}  created: {}{}",
                    topic.id,
                    topic.last_seq,
                    topic.created_at.format("%Y-%m-%d %H:%M"),
                    branch
                );
            }
        }
        TopicCommand::Branch { topic, at } => {
            let branch = store.branch_topic(&TopicId::from(&topic), at).await?;
            println!("{}", branch.id);
        }
        TopicCommand::Show { topic } => {
            let turns = store.list_turns(&TopicId::from(&topic)).await?;
            for turn in turns {
                println!("--- turn {} [{}] ---", turn.seq, turn.status);
                if let Some(workflow) = &turn.workflow {
                    println!(
                        "workflow: {} / {}",
                        workflow,
                        turn.step.as_deref().unwrap_or("?")
                    );
                }
                println!("{}", turn.response);
                println!();
            }
        }
    }
    Ok(())
}

//! `promptforge send` — One exchange on a topic, with collected context.

use clap::Args;
use promptforge_config::AppConfig;
use promptforge_core::topic::TopicId;

use super::{build_session, CliError, ContextArgs};

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Topic to converse on
    #[arg(long)]
    pub topic: String,

    /// The message to send
    pub message: String,

    #[command(flatten)]
    pub context: ContextArgs,
}

pub async fn run(args: SendArgs) -> Result<(), CliError> {
    let config = AppConfig::load()?;
    let session = build_session(&config).await?;

    let topic = TopicId::from(&args.topic);
    let run = session
        .send_message(&topic, &args.message, &args.context.requests())
        .await?;

    match run.final_output() {
        Some(text) => println!("{text}"),
        None => println!("(no output)"),
    }
    Ok(())
}

//! `promptforge workflow` — Run or list multi-step workflows.

use clap::Subcommand;
use promptforge_config::AppConfig;
use promptforge_core::topic::TopicId;
use promptforge_engine::CancelFlag;

use super::{build_session, CliError, ContextArgs};

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// List available workflows
    List,

    /// Run a workflow on a topic
    Run {
        /// Workflow name
        name: String,

        /// Topic to run on
        #[arg(long)]
        topic: String,

        /// The instruction driving the run
        instruction: String,

        #[command(flatten)]
        context: ContextArgs,
    },
}

pub async fn run(command: WorkflowCommand) -> Result<(), CliError> {
    let config = AppConfig::load()?;

    match command {
        WorkflowCommand::List => {
            // Built-ins first, then user definitions from config
            println!("ask      (built-in)  one model call");
            println!("refine   (built-in)  draft, then revise");
            for workflow in &config.workflows {
                let steps: Vec<&str> = workflow.steps.iter().map(|s| s.name.as_str()).collect();
                println!("{:<8} steps: {}", workflow.name, steps.join(" -> "));
            }
        }
        WorkflowCommand::Run {
            name,
            topic,
            instruction,
            context,
        } => {
            let session = build_session(&config).await?;

            // Ctrl-C requests cooperative cancellation; the run stops at
            // the next step boundary.
            let cancel = CancelFlag::new();
            let handle = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Cancelling after the current step...");
                    handle.cancel();
                }
            });

            let run = session
                .run_workflow(
                    &name,
                    &TopicId::from(&topic),
                    &instruction,
                    &context.requests(),
                    &cancel,
                )
                .await?;

            for output in &run.outputs {
                println!("=== {} ===", output.step);
                println!("{}", output.response);
                println!();
            }
        }
    }
    Ok(())
}

//! Session facade — one place that wires collector, composer, store,
//! gateway, and engine together for callers like the CLI.

use std::sync::Arc;
use std::time::Duration;

use promptforge_collector::{CollectionReport, Collector, ContextRequest};
use promptforge_config::AppConfig;
use promptforge_core::error::{Error, WorkflowError};
use promptforge_core::model::ModelClient;
use promptforge_core::store::TopicStore;
use promptforge_core::topic::{Topic, TopicId, Turn};
use promptforge_composer::PromptComposer;
use promptforge_gateway::ModelGateway;
use tracing::warn;

use crate::{CancelFlag, Workflow, WorkflowEngine, WorkflowRun};

/// A configured assistant session over one topic store and one model
/// backend.
pub struct Session {
    store: Arc<dyn TopicStore>,
    collector: Collector,
    engine: WorkflowEngine,
    workflows: Vec<Workflow>,
}

impl Session {
    /// Wire a session from configuration. User-defined workflows take
    /// precedence over the built-in `ask` and `refine` when names
    /// collide.
    pub fn new(config: &AppConfig, store: Arc<dyn TopicStore>, client: Arc<dyn ModelClient>) -> Self {
        let gateway = ModelGateway::new(client)
            .with_retry(
                config.retry.max_attempts,
                Duration::from_millis(config.retry.base_backoff_ms),
            )
            .with_timeout(Duration::from_secs(config.retry.timeout_secs));
        let composer = PromptComposer::new(config.budgets.prompt_tokens);
        let collector = Collector::new(config.budgets.fragment_bytes, config.budgets.aggregate_bytes);
        let engine = WorkflowEngine::new(
            Arc::clone(&store),
            gateway,
            composer,
            config.model.clone(),
        );

        let mut workflows: Vec<Workflow> = config.workflows.iter().map(Workflow::from_config).collect();
        for builtin in [Workflow::ask(), Workflow::refine()] {
            if !workflows.iter().any(|w| w.name == builtin.name) {
                workflows.push(builtin);
            }
        }

        Self {
            store,
            collector,
            engine,
            workflows,
        }
    }

    /// Resolve context requests relative to this directory.
    pub fn with_workdir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.collector = self.collector.with_workdir(dir);
        self
    }

    /// Names of all available workflows.
    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.iter().map(|w| w.name.as_str()).collect()
    }

    pub fn store(&self) -> &Arc<dyn TopicStore> {
        &self.store
    }

    pub async fn new_topic(&self) -> Result<Topic, Error> {
        Ok(self.store.create_topic().await?)
    }

    pub async fn list_topics(&self) -> Result<Vec<Topic>, Error> {
        Ok(self.store.list_topics().await?)
    }

    pub async fn list_turns(&self, topic: &TopicId) -> Result<Vec<Turn>, Error> {
        Ok(self.store.list_turns(topic).await?)
    }

    /// Branch a topic at a turn, sharing history up to that point.
    pub async fn branch_topic(&self, topic: &TopicId, from_seq: u64) -> Result<Topic, Error> {
        Ok(self.store.branch_topic(topic, from_seq).await?)
    }

    /// One-shot exchange: collect context, run the `ask` workflow.
    pub async fn send_message(
        &self,
        topic: &TopicId,
        text: &str,
        requests: &[ContextRequest],
    ) -> Result<WorkflowRun, Error> {
        self.run_workflow("ask", topic, text, requests, &CancelFlag::new())
            .await
    }

    /// Run a named workflow over a topic.
    pub async fn run_workflow(
        &self,
        name: &str,
        topic: &TopicId,
        instruction: &str,
        requests: &[ContextRequest],
        cancel: &CancelFlag,
    ) -> Result<WorkflowRun, Error> {
        let workflow = self
            .workflows
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| Error::Workflow(WorkflowError::Unknown(name.to_string())))?;

        let report = self.collect(requests).await;
        let run = self
            .engine
            .run(workflow, topic, instruction, &report.fragments, cancel)
            .await?;
        Ok(run)
    }

    /// Collect context fragments, logging per-request failures.
    pub async fn collect(&self, requests: &[ContextRequest]) -> CollectionReport {
        let report = self.collector.collect(requests).await;
        for (request, error) in &report.failures {
            warn!(request = ?request, error = %error, "Context request failed");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptforge_config::{StepConfig, TransformConfig, WorkflowConfig};
    use promptforge_gateway::MockClient;
    use promptforge_topics::InMemoryTopicStore;
    use std::sync::atomic::Ordering;

    fn session_with(client: MockClient) -> Session {
        session_with_config(client, AppConfig::default())
    }

    fn session_with_config(client: MockClient, config: AppConfig) -> Session {
        let store: Arc<dyn TopicStore> = Arc::new(InMemoryTopicStore::new());
        Session::new(&config, store, Arc::new(client))
    }

    #[tokio::test]
    async fn send_message_records_an_exchange() {
        let client = MockClient::new();
        client.push_ok("hi there");
        let session = session_with(client);

        let topic = session.new_topic().await.unwrap();
        let run = session
            .send_message(&topic.id, "hello", &[])
            .await
            .unwrap();

        assert_eq!(run.final_output(), Some("hi there"));
        let turns = session.list_turns(&topic.id).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].workflow.as_deref(), Some("ask"));
    }

    #[tokio::test]
    async fn unknown_workflow_is_an_error() {
        let session = session_with(MockClient::new());
        let topic = session.new_topic().await.unwrap();

        let result = session
            .run_workflow("no-such-flow", &topic.id, "go", &[], &CancelFlag::new())
            .await;
        assert!(matches!(
            result,
            Err(Error::Workflow(WorkflowError::Unknown(_)))
        ));
    }

    #[tokio::test]
    async fn builtins_are_always_available() {
        let session = session_with(MockClient::new());
        let names = session.workflow_names();
        assert!(names.contains(&"ask"));
        assert!(names.contains(&"refine"));
    }

    #[tokio::test]
    async fn user_workflow_overrides_builtin() {
        let mut config = AppConfig::default();
        config.workflows.push(WorkflowConfig {
            name: "ask".into(),
            steps: vec![StepConfig {
                name: "custom".into(),
                transform: TransformConfig::Instruction,
                termination: Default::default(),
            }],
        });
        let client = MockClient::new();
        client.push_ok("custom answer");
        let session = session_with_config(client, config);

        let topic = session.new_topic().await.unwrap();
        session.send_message(&topic.id, "q", &[]).await.unwrap();

        let turns = session.list_turns(&topic.id).await.unwrap();
        assert_eq!(turns[0].step.as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn context_failures_do_not_abort_the_message() {
        let client = MockClient::new();
        client.push_ok("answered anyway");
        let calls = client.call_count();
        let session = session_with(client);

        let topic = session.new_topic().await.unwrap();
        let requests = vec![ContextRequest::file("definitely/not/here.rs")];
        let run = session
            .send_message(&topic.id, "hello", &requests)
            .await
            .unwrap();

        assert_eq!(run.final_output(), Some("answered anyway"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn branch_shares_history() {
        let client = MockClient::new();
        client.push_ok("first");
        client.push_ok("alternative");
        let session = session_with(client);

        let topic = session.new_topic().await.unwrap();
        session.send_message(&topic.id, "start", &[]).await.unwrap();

        let branch = session.branch_topic(&topic.id, 1).await.unwrap();
        session
            .send_message(&branch.id, "what if?", &[])
            .await
            .unwrap();

        let branch_turns = session.list_turns(&branch.id).await.unwrap();
        assert_eq!(branch_turns.len(), 2);
        assert_eq!(branch_turns[0].response, "first");
        assert_eq!(branch_turns[1].response, "alternative");

        let source_turns = session.list_turns(&topic.id).await.unwrap();
        assert_eq!(source_turns.len(), 1);
    }
}

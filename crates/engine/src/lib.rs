//! Workflow engine — sequences model calls over a topic.
//!
//! Each successful step writes exactly one turn to the topic store
//! before the run advances, which is what makes a run resumable: after
//! a crash, [`WorkflowEngine::resume`] replays the turns already
//! recorded for the topic and picks up at the first unrecorded step.
//!
//! The engine retries nothing the gateway already retries. The one
//! exception is a gateway timeout, which earns a single engine-level
//! retry of the whole step. Cancellation is cooperative: it is observed
//! between steps and after an in-flight call returns, never mid-call.

pub mod session;
pub mod workflow;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use promptforge_config::ModelConfig;
use promptforge_core::error::{Error, ModelError, TopicError, WorkflowError};
use promptforge_core::fragment::ContextFragment;
use promptforge_core::model::ModelRequest;
use promptforge_core::store::TopicStore;
use promptforge_core::topic::{TopicId, Turn};
use promptforge_composer::PromptComposer;
use promptforge_gateway::ModelGateway;
use tracing::{debug, info, warn};

pub use session::Session;
pub use workflow::{Termination, Transform, Workflow, WorkflowStep};

/// Cooperative cancellation handle, shared between the engine and the
/// caller that may cancel the run.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    AwaitingModel,
    Applying,
    Succeeded,
    Failed,
    Cancelled,
}

/// The recorded output of one completed step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub step: String,
    pub response: String,
    pub turn_seq: u64,
}

/// Runtime state of one workflow execution over a topic.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub workflow: String,
    pub topic: TopicId,
    pub state: RunState,
    pub outputs: Vec<StepOutput>,
}

impl WorkflowRun {
    fn new(workflow: &Workflow, topic: &TopicId) -> Self {
        Self {
            workflow: workflow.name.clone(),
            topic: topic.clone(),
            state: RunState::Pending,
            outputs: Vec::new(),
        }
    }

    /// The final step's output text, if any step completed.
    pub fn final_output(&self) -> Option<&str> {
        self.outputs.last().map(|o| o.response.as_str())
    }
}

/// Executes workflows: composes prompts, calls the gateway, persists
/// turns.
pub struct WorkflowEngine {
    store: Arc<dyn TopicStore>,
    gateway: ModelGateway,
    composer: PromptComposer,
    model: ModelConfig,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn TopicStore>,
        gateway: ModelGateway,
        composer: PromptComposer,
        model: ModelConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            composer,
            model,
        }
    }

    /// Execute a workflow from its first step.
    pub async fn run(
        &self,
        workflow: &Workflow,
        topic: &TopicId,
        instruction: &str,
        fragments: &[ContextFragment],
        cancel: &CancelFlag,
    ) -> Result<WorkflowRun, WorkflowError> {
        let mut run = WorkflowRun::new(workflow, topic);
        self.execute_from(workflow, &mut run, 0, None, instruction, fragments, cancel)
            .await?;
        Ok(run)
    }

    /// Resume an interrupted run.
    ///
    /// Steps already recorded as turns for this topic (a trailing run of
    /// turns labelled with this workflow's name) are skipped; the next
    /// step's input is seeded from the last recorded response.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        topic: &TopicId,
        instruction: &str,
        fragments: &[ContextFragment],
        cancel: &CancelFlag,
    ) -> Result<WorkflowRun, WorkflowError> {
        let turns = self
            .store
            .list_turns(topic)
            .await
            .map_err(|e| step_failed("resume", e))?;

        // Trailing turns belonging to this workflow, oldest first
        let recorded: Vec<&Turn> = turns
            .iter()
            .rev()
            .take_while(|t| t.workflow.as_deref() == Some(workflow.name.as_str()))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();

        // Count workflow steps completed in order
        let mut completed = 0;
        for step in &workflow.steps {
            if recorded
                .iter()
                .any(|t| t.step.as_deref() == Some(step.name.as_str()))
            {
                completed += 1;
            } else {
                break;
            }
        }

        let mut run = WorkflowRun::new(workflow, topic);
        for turn in &recorded {
            run.outputs.push(StepOutput {
                step: turn.step.clone().unwrap_or_default(),
                response: turn.response.clone(),
                turn_seq: turn.seq,
            });
        }

        if completed == workflow.steps.len() {
            run.state = RunState::Succeeded;
            return Ok(run);
        }

        info!(
            workflow = %workflow.name,
            topic = %topic,
            completed,
            total = workflow.steps.len(),
            "Resuming workflow run"
        );
        let seed = recorded.last().map(|t| t.response.clone());
        self.execute_from(
            workflow, &mut run, completed, seed, instruction, fragments, cancel,
        )
        .await?;
        Ok(run)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_from(
        &self,
        workflow: &Workflow,
        run: &mut WorkflowRun,
        start: usize,
        seed: Option<String>,
        instruction: &str,
        fragments: &[ContextFragment],
        cancel: &CancelFlag,
    ) -> Result<(), WorkflowError> {
        run.state = RunState::Running;
        let mut input = seed;

        for step in &workflow.steps[start..] {
            if cancel.is_cancelled() {
                run.state = RunState::Cancelled;
                return Err(WorkflowError::Cancelled);
            }

            let mut repeats = 0u32;
            loop {
                // Fragments ride along on the run's first model call only;
                // later steps see them through the recorded history.
                let step_fragments = if run.outputs.is_empty() { fragments } else { &[] };
                let response = match self
                    .execute_step(
                        workflow,
                        run,
                        step,
                        instruction,
                        input.as_deref(),
                        step_fragments,
                        cancel,
                    )
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        if !matches!(e, WorkflowError::Cancelled) {
                            run.state = RunState::Failed;
                        }
                        return Err(e);
                    }
                };
                input = Some(response.clone());

                match &step.termination {
                    Termination::Advance => break,
                    Termination::StopIfContains { marker } => {
                        if response.contains(marker.as_str()) {
                            debug!(step = %step.name, marker = %marker, "Stop marker found, ending run");
                            run.state = RunState::Succeeded;
                            return Ok(());
                        }
                        break;
                    }
                    Termination::RepeatUntilContains {
                        marker,
                        max_repeats,
                    } => {
                        if response.contains(marker.as_str()) || repeats >= *max_repeats {
                            if !response.contains(marker.as_str()) {
                                warn!(
                                    step = %step.name,
                                    marker = %marker,
                                    repeats,
                                    "Repeat budget exhausted without marker, advancing"
                                );
                            }
                            break;
                        }
                        repeats += 1;
                        debug!(step = %step.name, repeats, "Repeating step");
                    }
                }
            }
        }

        run.state = RunState::Succeeded;
        Ok(())
    }

    /// Run one step: compose, invoke, persist. Returns the response text.
    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        workflow: &Workflow,
        run: &mut WorkflowRun,
        step: &WorkflowStep,
        instruction: &str,
        input: Option<&str>,
        fragments: &[ContextFragment],
        cancel: &CancelFlag,
    ) -> Result<String, WorkflowError> {
        let step_instruction = step.render(instruction, input);

        // History is handed to the composer most recent first
        let mut history = self
            .store
            .list_turns(&run.topic)
            .await
            .map_err(|e| step_failed(&step.name, e))?;
        history.reverse();

        let composed = self
            .composer
            .compose(&step_instruction, fragments, &history)
            .map_err(|e| step_failed(&step.name, e))?;

        let request = ModelRequest {
            prompt: composed.text.clone(),
            model: self.model.model.clone(),
            temperature: self.model.temperature,
            max_tokens: Some(self.model.max_tokens),
            stop: Vec::new(),
        };

        run.state = RunState::AwaitingModel;
        let mut timed_out_once = false;
        let response = loop {
            match self.gateway.invoke(request.clone()).await {
                Ok(response) => break response,
                Err(ModelError::Timeout(secs)) if !timed_out_once => {
                    // One engine-level retry of the whole step on timeout
                    timed_out_once = true;
                    warn!(step = %step.name, timeout_secs = secs, "Step timed out, retrying once");
                }
                Err(e) => return Err(step_failed(&step.name, e)),
            }
        };
        run.state = RunState::Running;

        // A cancellation requested mid-call is honored now: the response
        // is discarded, never persisted.
        if cancel.is_cancelled() {
            run.state = RunState::Cancelled;
            return Err(WorkflowError::Cancelled);
        }

        let turn = Turn::pending(composed.text)
            .complete(response.text.clone(), response.usage.clone())
            .with_step(&workflow.name, &step.name)
            .with_fragments(composed.included);
        run.state = RunState::Applying;
        let seq = self.persist_turn(&run.topic, turn, &step.name).await?;
        run.state = RunState::Running;

        debug!(workflow = %workflow.name, step = %step.name, seq, "Step completed");
        run.outputs.push(StepOutput {
            step: step.name.clone(),
            response: response.text.clone(),
            turn_seq: seq,
        });
        Ok(response.text)
    }

    /// Append a turn with optimistic-concurrency retry. The model is
    /// never re-invoked here; only the append is repeated against the
    /// topic's latest sequence.
    async fn persist_turn(
        &self,
        topic: &TopicId,
        turn: Turn,
        step_name: &str,
    ) -> Result<u64, WorkflowError> {
        loop {
            let current = self
                .store
                .get_topic(topic)
                .await
                .map_err(|e| step_failed(step_name, e))?;
            match self
                .store
                .append_turn(topic, current.last_seq, turn.clone())
                .await
            {
                Ok(seq) => return Ok(seq),
                Err(TopicError::ConcurrentModification { expected, actual }) => {
                    debug!(topic = %topic, expected, actual, "Append raced, retrying");
                }
                Err(e) => return Err(step_failed(step_name, e)),
            }
        }
    }
}

fn step_failed(step: &str, cause: impl Into<Error>) -> WorkflowError {
    WorkflowError::StepFailed {
        step: step.to_string(),
        source: Box::new(cause.into()),
    }
}

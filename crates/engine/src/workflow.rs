//! Workflow definitions.
//!
//! A workflow is a named, ordered list of steps. Steps are read-only
//! definitions; runtime state lives in [`crate::WorkflowRun`]. Two
//! built-ins always exist: `ask` (one model call) and `refine` (draft,
//! then revise the draft).

use promptforge_config::{StepConfig, TerminationConfig, TransformConfig, WorkflowConfig};

/// How a step's prompt text is produced.
#[derive(Debug, Clone)]
pub enum Transform {
    /// The run's user instruction, verbatim
    Instruction,
    /// A template with `{instruction}` and `{input}` placeholders;
    /// `{input}` expands to the previous step's output
    Template(String),
}

/// What happens after a step's model call completes.
#[derive(Debug, Clone)]
pub enum Termination {
    Advance,
    RepeatUntilContains { marker: String, max_repeats: u32 },
    StopIfContains { marker: String },
}

/// One stage of a workflow.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    pub name: String,
    pub transform: Transform,
    pub termination: Termination,
}

impl WorkflowStep {
    /// Produce the step's instruction text from the run instruction and
    /// the previous step's output.
    pub fn render(&self, instruction: &str, input: Option<&str>) -> String {
        match &self.transform {
            Transform::Instruction => instruction.to_string(),
            Transform::Template(text) => text
                .replace("{instruction}", instruction)
                .replace("{input}", input.unwrap_or("")),
        }
    }
}

/// A named sequence of steps.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Build a workflow from its configuration.
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            name: config.name.clone(),
            steps: config.steps.iter().map(step_from_config).collect(),
        }
    }

    /// `ask` — a single model call with the user instruction.
    pub fn ask() -> Self {
        Self {
            name: "ask".into(),
            steps: vec![WorkflowStep {
                name: "respond".into(),
                transform: Transform::Instruction,
                termination: Termination::Advance,
            }],
        }
    }

    /// `refine` — draft an answer, then revise it.
    pub fn refine() -> Self {
        Self {
            name: "refine".into(),
            steps: vec![
                WorkflowStep {
                    name: "draft".into(),
                    transform: Transform::Instruction,
                    termination: Termination::Advance,
                },
                WorkflowStep {
                    name: "revise".into(),
                    transform: Transform::Template(
                        "Revise the following draft. Keep what is correct, fix what is not, \
                         and tighten the wording.\n\nOriginal request: {instruction}\n\n\
                         Draft:\n{input}"
                            .into(),
                    ),
                    termination: Termination::Advance,
                },
            ],
        }
    }
}

fn step_from_config(config: &StepConfig) -> WorkflowStep {
    WorkflowStep {
        name: config.name.clone(),
        transform: match &config.transform {
            TransformConfig::Instruction => Transform::Instruction,
            TransformConfig::Template { text } => Transform::Template(text.clone()),
        },
        termination: match &config.termination {
            TerminationConfig::Advance => Termination::Advance,
            TerminationConfig::RepeatUntilContains {
                marker,
                max_repeats,
            } => Termination::RepeatUntilContains {
                marker: marker.clone(),
                max_repeats: *max_repeats,
            },
            TerminationConfig::StopIfContains { marker } => Termination::StopIfContains {
                marker: marker.clone(),
            },
        },
    }
}

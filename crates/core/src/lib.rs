//! # Promptforge Core
//!
//! Domain types, traits, and error definitions for the Promptforge
//! context-assembly and workflow-execution engine. This crate has
//! **zero framework dependencies** — it defines the domain model that
//! all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod fragment;
pub mod model;
pub mod stage;
pub mod store;
pub mod topic;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use fragment::{ContextFragment, FragmentKind, Provenance};
pub use model::{FinishReason, ModelClient, ModelRequest, ModelResponse, Usage};
pub use stage::{ChangeState, FileEdit, StagedChange};
pub use store::TopicStore;
pub use topic::{Topic, TopicId, Turn, TurnId, TurnStatus};

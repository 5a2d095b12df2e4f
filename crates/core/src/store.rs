//! TopicStore trait — durable, ordered storage of topics and turns.
//!
//! The store exclusively owns Topic and Turn lifetimes. Invariants every
//! implementation must uphold:
//! - turn sequence numbers are gapless and strictly increasing per topic
//! - appends use optimistic concurrency against the last-turn sequence
//! - branching never mutates the source topic; shared turns are referenced,
//!   not duplicated, until either branch appends

use async_trait::async_trait;

use crate::error::TopicError;
use crate::topic::{Topic, TopicId, Turn};

/// Durable, key-ordered storage for topics and their turn history.
#[async_trait]
pub trait TopicStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a new empty topic.
    async fn create_topic(&self) -> Result<Topic, TopicError>;

    /// Fetch a topic by id.
    async fn get_topic(&self, id: &TopicId) -> Result<Topic, TopicError>;

    /// Append a finalized turn to a topic.
    ///
    /// `expected_last_seq` is the last-turn sequence the caller observed.
    /// If the topic has advanced past it, fails with
    /// `TopicError::ConcurrentModification` and the caller must re-read
    /// and retry. On success returns the assigned sequence number
    /// (`expected_last_seq + 1`).
    async fn append_turn(
        &self,
        id: &TopicId,
        expected_last_seq: u64,
        turn: Turn,
    ) -> Result<u64, TopicError>;

    /// List all turns of a topic in sequence order, including turns
    /// inherited from parent topics up to the branch point.
    async fn list_turns(&self, id: &TopicId) -> Result<Vec<Turn>, TopicError>;

    /// Create a new topic sharing history with `id` up to and including
    /// `from_seq`. Copy-on-write: the shared prefix is referenced via the
    /// parent link, never duplicated.
    async fn branch_topic(&self, id: &TopicId, from_seq: u64) -> Result<Topic, TopicError>;

    /// List all topics, oldest first.
    async fn list_topics(&self) -> Result<Vec<Topic>, TopicError>;
}

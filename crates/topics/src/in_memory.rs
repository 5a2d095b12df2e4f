//! In-memory topic store backed by a HashMap.
//!
//! Useful for tests and for ephemeral sessions that should leave no
//! trace on disk. Holds only each topic's own turns; branched history
//! is resolved through parent links at read time, exactly like the
//! SQLite backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use promptforge_core::error::TopicError;
use promptforge_core::store::TopicStore;
use promptforge_core::topic::{Topic, TopicId, Turn};

struct TopicRecord {
    topic: Topic,
    /// Turns appended to this topic directly (not inherited ones).
    turns: Vec<Turn>,
}

/// A non-persistent topic store. Cheap to create, safe to share.
#[derive(Default)]
pub struct InMemoryTopicStore {
    inner: RwLock<HashMap<String, TopicRecord>>,
}

impl InMemoryTopicStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TopicStore for InMemoryTopicStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_topic(&self) -> Result<Topic, TopicError> {
        let topic = Topic::new();
        let mut inner = self.inner.write().await;
        inner.insert(
            topic.id.0.clone(),
            TopicRecord {
                topic: topic.clone(),
                turns: Vec::new(),
            },
        );
        debug!(topic = %topic.id, "Created topic");
        Ok(topic)
    }

    async fn get_topic(&self, id: &TopicId) -> Result<Topic, TopicError> {
        let inner = self.inner.read().await;
        inner
            .get(&id.0)
            .map(|rec| rec.topic.clone())
            .ok_or_else(|| TopicError::NotFound(id.0.clone()))
    }

    async fn append_turn(
        &self,
        id: &TopicId,
        expected_last_seq: u64,
        mut turn: Turn,
    ) -> Result<u64, TopicError> {
        let mut inner = self.inner.write().await;
        let rec = inner
            .get_mut(&id.0)
            .ok_or_else(|| TopicError::NotFound(id.0.clone()))?;

        let actual = rec.topic.last_seq;
        if expected_last_seq != actual {
            return Err(TopicError::ConcurrentModification {
                expected: expected_last_seq,
                actual,
            });
        }

        let seq = actual + 1;
        turn.seq = seq;
        rec.turns.push(turn);
        rec.topic.last_seq = seq;
        debug!(topic = %id, seq, "Appended turn");
        Ok(seq)
    }

    async fn list_turns(&self, id: &TopicId) -> Result<Vec<Turn>, TopicError> {
        let inner = self.inner.read().await;

        // Walk the parent chain, collecting each topic's own turns up to
        // the branch point observed so far.
        let mut segments: Vec<Vec<Turn>> = Vec::new();
        let mut cursor = id.clone();
        let mut cap = u64::MAX;
        loop {
            let rec = inner
                .get(&cursor.0)
                .ok_or_else(|| TopicError::NotFound(cursor.0.clone()))?;
            segments.push(
                rec.turns
                    .iter()
                    .filter(|t| t.seq <= cap)
                    .cloned()
                    .collect(),
            );
            match &rec.topic.parent {
                Some((parent_id, base_seq)) => {
                    cap = cap.min(*base_seq);
                    cursor = parent_id.clone();
                }
                None => break,
            }
        }

        segments.reverse();
        Ok(segments.into_iter().flatten().collect())
    }

    async fn branch_topic(&self, id: &TopicId, from_seq: u64) -> Result<Topic, TopicError> {
        let mut inner = self.inner.write().await;
        let last_seq = inner
            .get(&id.0)
            .ok_or_else(|| TopicError::NotFound(id.0.clone()))?
            .topic
            .last_seq;

        if from_seq > last_seq {
            return Err(TopicError::InvalidBranchPoint { from_seq, last_seq });
        }

        let mut branch = Topic::new();
        branch.parent = Some((id.clone(), from_seq));
        branch.last_seq = from_seq;
        inner.insert(
            branch.id.0.clone(),
            TopicRecord {
                topic: branch.clone(),
                turns: Vec::new(),
            },
        );
        debug!(source = %id, branch = %branch.id, from_seq, "Branched topic");
        Ok(branch)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, TopicError> {
        let inner = self.inner.read().await;
        let mut topics: Vec<Topic> = inner.values().map(|rec| rec.topic.clone()).collect();
        topics.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn turn(text: &str) -> Turn {
        Turn::pending(text).complete(format!("re: {text}"), None)
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();
        let fetched = store.get_topic(&topic.id).await.unwrap();
        assert_eq!(fetched.id, topic.id);
        assert_eq!(fetched.last_seq, 0);
    }

    #[tokio::test]
    async fn get_missing_topic() {
        let store = InMemoryTopicStore::new();
        let result = store.get_topic(&TopicId::from("nope")).await;
        assert!(matches!(result, Err(TopicError::NotFound(_))));
    }

    #[tokio::test]
    async fn appends_assign_gapless_sequences() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();

        for expected in 1..=5u64 {
            let seq = store
                .append_turn(&topic.id, expected - 1, turn("q"))
                .await
                .unwrap();
            assert_eq!(seq, expected);
        }

        let turns = store.list_turns(&topic.id).await.unwrap();
        let seqs: Vec<u64> = turns.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn stale_append_rejected() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();
        store.append_turn(&topic.id, 0, turn("first")).await.unwrap();

        let result = store.append_turn(&topic.id, 0, turn("stale")).await;
        assert!(matches!(
            result,
            Err(TopicError::ConcurrentModification {
                expected: 0,
                actual: 1
            })
        ));

        // Retry with the current sequence succeeds
        let seq = store.append_turn(&topic.id, 1, turn("retry")).await.unwrap();
        assert_eq!(seq, 2);
    }

    #[tokio::test]
    async fn branch_shares_history_up_to_the_branch_point() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();
        store.append_turn(&topic.id, 0, turn("one")).await.unwrap();
        store.append_turn(&topic.id, 1, turn("two")).await.unwrap();
        store.append_turn(&topic.id, 2, turn("three")).await.unwrap();

        let branch = store.branch_topic(&topic.id, 2).await.unwrap();
        assert_eq!(branch.last_seq, 2);

        let turns = store.list_turns(&branch.id).await.unwrap();
        let prompts: Vec<&str> = turns.iter().map(|t| t.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn branches_diverge_independently() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();
        store.append_turn(&topic.id, 0, turn("shared")).await.unwrap();

        let branch = store.branch_topic(&topic.id, 1).await.unwrap();
        store
            .append_turn(&branch.id, 1, turn("branch-only"))
            .await
            .unwrap();
        store
            .append_turn(&topic.id, 1, turn("source-only"))
            .await
            .unwrap();

        let branch_turns = store.list_turns(&branch.id).await.unwrap();
        let branch_prompts: Vec<&str> = branch_turns.iter().map(|t| t.prompt.as_str()).collect();
        assert_eq!(branch_prompts, vec!["shared", "branch-only"]);

        let source_turns = store.list_turns(&topic.id).await.unwrap();
        let source_prompts: Vec<&str> = source_turns.iter().map(|t| t.prompt.as_str()).collect();
        assert_eq!(source_prompts, vec!["shared", "source-only"]);
    }

    #[tokio::test]
    async fn nested_branches_resolve_the_full_chain() {
        let store = InMemoryTopicStore::new();
        let root = store.create_topic().await.unwrap();
        store.append_turn(&root.id, 0, turn("a")).await.unwrap();
        store.append_turn(&root.id, 1, turn("b")).await.unwrap();

        let mid = store.branch_topic(&root.id, 2).await.unwrap();
        store.append_turn(&mid.id, 2, turn("c")).await.unwrap();

        let leaf = store.branch_topic(&mid.id, 3).await.unwrap();
        store.append_turn(&leaf.id, 3, turn("d")).await.unwrap();

        let turns = store.list_turns(&leaf.id).await.unwrap();
        let prompts: Vec<&str> = turns.iter().map(|t| t.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["a", "b", "c", "d"]);
        let seqs: Vec<u64> = turns.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn branch_past_the_end_rejected() {
        let store = InMemoryTopicStore::new();
        let topic = store.create_topic().await.unwrap();
        store.append_turn(&topic.id, 0, turn("only")).await.unwrap();

        let result = store.branch_topic(&topic.id, 5).await;
        assert!(matches!(
            result,
            Err(TopicError::InvalidBranchPoint {
                from_seq: 5,
                last_seq: 1
            })
        ));
    }

    #[tokio::test]
    async fn concurrent_appenders_never_lose_turns() {
        let store = Arc::new(InMemoryTopicStore::new());
        let topic = store.create_topic().await.unwrap();

        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = Arc::clone(&store);
            let id = topic.id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..5 {
                    loop {
                        let current = store.get_topic(&id).await.unwrap();
                        let attempt = store
                            .append_turn(&id, current.last_seq, turn(&format!("{worker}-{i}")))
                            .await;
                        match attempt {
                            Ok(_) => break,
                            Err(TopicError::ConcurrentModification { .. }) => continue,
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let turns = store.list_turns(&topic.id).await.unwrap();
        assert_eq!(turns.len(), 40);
        let seqs: Vec<u64> = turns.iter().map(|t| t.seq).collect();
        assert_eq!(seqs, (1..=40).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn list_topics_oldest_first() {
        let store = InMemoryTopicStore::new();
        let first = store.create_topic().await.unwrap();
        let second = store.create_topic().await.unwrap();

        let topics = store.list_topics().await.unwrap();
        assert_eq!(topics.len(), 2);
        let pos_first = topics.iter().position(|t| t.id == first.id).unwrap();
        let pos_second = topics.iter().position(|t| t.id == second.id).unwrap();
        assert!(pos_first < pos_second);
    }
}

//! Topic store implementations for Promptforge.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryTopicStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTopicStore;

// Feedback persistence implementations.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::{InMemoryFeedbackStore, InMemoryUserDirectory};
pub use sqlite_store::SqliteFeedbackStore;

//! Conversation memory subsystem
//!
//! Provides the bounded context window, end-of-conversation summarization,
//! and durable summary storage.

pub mod store;
pub mod summarizer;
pub mod window;

pub use store::{build_summary_store, InMemorySummaryStore, PostgresSummaryStore, SummaryStore};
pub use summarizer::SummaryPipeline;
pub use window::ContextWindow;

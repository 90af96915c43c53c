//! Conversation summarization pipeline
//!
//! Condenses the accumulated window into at most two sentences via one
//! non-streaming completion, then persists the result. The summarization
//! model is fixed; only the main query follows the caller-supplied model.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::AssistantError;
use crate::memory::store::SummaryStore;
use crate::models::{SummaryRecord, Turn};
use crate::provider::CompletionProvider;
use crate::Result;

/// Model used for every summarization call
pub const SUMMARY_MODEL: &str = "gpt-4";

/// Instruction sent as the system turn of the summarization request
pub const SUMMARY_INSTRUCTION: &str = "Shrň následující konverzaci do maximálně dvou vět.";

/// Prefix of the seed text built from the window contents
pub const SEED_PREFIX: &str = "Diskutovali jsme o: ";

/// Summarize-and-persist sequence for a finished conversation
pub struct SummaryPipeline {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn SummaryStore>,
}

impl SummaryPipeline {
    pub fn new(provider: Arc<dyn CompletionProvider>, store: Arc<dyn SummaryStore>) -> Self {
        Self { provider, store }
    }

    fn build_seed(turns: &[Turn]) -> String {
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        format!("{}{}", SEED_PREFIX, contents.join(", "))
    }

    /// Condense the window into a short summary.
    ///
    /// Fails with [`AssistantError::EmptyContext`] before any upstream call
    /// when the window is empty.
    pub async fn summarize(&self, turns: &[Turn]) -> Result<String> {
        if turns.is_empty() {
            return Err(AssistantError::EmptyContext);
        }

        let seed = Self::build_seed(turns);
        let messages = vec![Turn::system(SUMMARY_INSTRUCTION), Turn::user(seed)];

        let text = self.provider.complete(SUMMARY_MODEL, &messages).await?;
        Ok(text.trim().to_string())
    }

    /// Run the full end-of-conversation sequence: summarize, then persist.
    ///
    /// Any step's failure aborts the remaining steps; nothing is persisted
    /// unless the summary call succeeded.
    pub async fn finish(&self, turns: &[Turn]) -> Result<(Uuid, String)> {
        let summary = self.summarize(turns).await?;

        let record = SummaryRecord::new(summary.clone());
        let id = self.store.insert(&record).await?;

        info!(%id, "Conversation summary persisted");
        Ok((id, summary))
    }
}

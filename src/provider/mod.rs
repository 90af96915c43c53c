//! Completion provider trait and implementations
//!
//! Seam over the upstream large-language-model service. The streaming call
//! hands fragments over through a bounded channel so backpressure from a
//! slow consumer pauses the upstream read instead of buffering unbounded
//! fragments in memory.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::Turn;
use crate::Result;

pub mod openai;
pub use openai::OpenAiClient;

/// Fragments buffered before the producer pauses on a slow consumer
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// Receiving end of one streaming completion.
///
/// Yields incremental text fragments in arrival order; an `Err` item is
/// terminal. Not restartable: each [`CompletionProvider::stream`] call opens
/// a new upstream connection.
pub type FragmentReceiver = mpsc::Receiver<Result<String>>;

/// Trait for upstream completion calls
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One non-streaming completion, returning the full response text.
    async fn complete(&self, model: &str, turns: &[Turn]) -> Result<String>;

    /// One streaming completion. Dropping the receiver cancels the
    /// upstream read and releases the connection.
    async fn stream(&self, model: &str, turns: &[Turn]) -> Result<FragmentReceiver>;
}

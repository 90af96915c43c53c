//! Streaming completion relay
//!
//! Builds the outbound message list from the fixed persona instruction plus
//! the caller's window snapshot and drives one streaming request against the
//! provider. Fragments reach the HTTP boundary in arrival order; the first
//! fragment leaving the upstream is the first byte the client sees.

use std::sync::Arc;
use tracing::info;

use crate::error::AssistantError;
use crate::models::Turn;
use crate::provider::{CompletionProvider, FragmentReceiver};
use crate::Result;

/// Persona instruction sent as the system turn on every query
pub const SYSTEM_PROMPT: &str = "Jsi robot NAO. Je ti 14 let. A žiješ v Český Budějovicích. \
Když odpovídáš, formátuj své texty pro hlasovou syntézu robota. \
Ujisti se, že tvůj tón je přátelský a konverzační.";

/// Relays one conversation window to the upstream provider as a live stream
pub struct CompletionRelay {
    provider: Arc<dyn CompletionProvider>,
}

impl CompletionRelay {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Open a streaming completion for the given window snapshot.
    ///
    /// The outbound message list is one system turn followed by every
    /// window turn in order; the window itself is the only truncation.
    /// Fragments already delivered are never retracted — a mid-stream
    /// upstream failure surfaces as a terminal error item.
    pub async fn stream(&self, model: &str, window: Vec<Turn>) -> Result<FragmentReceiver> {
        if model.trim().is_empty() {
            return Err(AssistantError::CallerInput(
                "Model must be provided.".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(Turn::system(SYSTEM_PROMPT));
        messages.extend(window);

        info!(model, turns = messages.len() - 1, "Opening completion stream");
        self.provider.stream(model, &messages).await
    }
}

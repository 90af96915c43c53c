//! Bounded conversation context window
//!
//! Holds the last N user turns in insertion order. The window is the only
//! mutable in-process state; every access goes through a single lock so
//! concurrent appends and snapshots never tear.

use std::collections::VecDeque;
use tokio::sync::RwLock;

use crate::models::Turn;

/// Number of recent user turns kept by default
pub const DEFAULT_CAPACITY: usize = 3;

/// Separator used by [`ContextWindow::render`]
const RENDER_SEPARATOR: &str = ", ";

/// Bounded FIFO buffer of recent user turns
pub struct ContextWindow {
    turns: RwLock<VecDeque<Turn>>,
    capacity: usize,
}

impl ContextWindow {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Add a turn, evicting the oldest one first when at capacity.
    pub async fn append(&self, turn: Turn) {
        let mut turns = self.turns.write().await;
        while turns.len() >= self.capacity {
            turns.pop_front();
        }
        turns.push_back(turn);
    }

    /// Point-in-time copy of the window contents, oldest first.
    ///
    /// Callers snapshot before awaiting the upstream provider so the lock
    /// is never held across network I/O.
    pub async fn snapshot(&self) -> Vec<Turn> {
        self.turns.read().await.iter().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.turns.read().await.len()
    }

    /// Join turn contents with a fixed separator, in window order.
    pub async fn render(&self) -> String {
        let turns = self.turns.read().await;
        turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(RENDER_SEPARATOR)
    }

    /// Empty the window. Called after a conversation summary is persisted.
    pub async fn clear(&self) {
        self.turns.write().await.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new()
    }
}

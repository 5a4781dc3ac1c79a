// src/render/thinking.rs

use std::collections::HashSet;

use super::markdown::{render_blocks, Block};
use crate::parser::word_count;

/// Collapsible reasoning section of an assistant message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThinkingSection {
    pub blocks: Vec<Block>,
    pub word_count: usize,
    pub expanded: bool,
    pub streaming: bool,
}

impl ThinkingSection {
    pub fn new(reasoning: &str, expanded: bool, streaming: bool) -> Self {
        Self {
            blocks: render_blocks(reasoning),
            word_count: word_count(reasoning),
            expanded: expanded || streaming,
            streaming,
        }
    }

    pub fn badge(&self) -> String {
        match self.word_count {
            1 => "1 word".to_string(),
            n => format!("{n} words"),
        }
    }
}

/// Which thinking sections the reader has open. Lives with the display, not
/// the messages: a section opens while its message streams and stays open
/// until toggled.
#[derive(Debug, Default)]
pub struct ThinkingState {
    expanded: HashSet<String>,
}

impl ThinkingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, message_id: &str, streaming: bool) {
        if streaming {
            self.expanded.insert(message_id.to_string());
        }
    }

    pub fn is_expanded(&self, message_id: &str) -> bool {
        self.expanded.contains(message_id)
    }

    /// Returns the new state.
    pub fn toggle(&mut self, message_id: &str) -> bool {
        if self.expanded.remove(message_id) {
            false
        } else {
            self.expanded.insert(message_id.to_string());
            true
        }
    }

    pub fn forget(&mut self, message_id: &str) {
        self.expanded.remove(message_id);
    }
}

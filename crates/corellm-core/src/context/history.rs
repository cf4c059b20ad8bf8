use crate::constants::session::CHARS_PER_TOKEN;
use crate::llm::{Role, Turn};

/// Ordered turn history of one conversation. Index 0 holds the system turn;
/// it is replaced, never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationStore {
    turns: Vec<Turn>,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Reset to a single system turn.
    pub fn initialize(&mut self, system_prompt: impl Into<String>) {
        self.turns.clear();
        self.turns.push(Turn::system(system_prompt));
    }

    /// Push a turn to the end. Role alternation is the caller's concern.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Owned copy of every turn, in order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Overwrite the whole history. The first element is expected to be a
    /// system turn but this is not checked.
    pub fn replace(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        let system = Turn::system(prompt);
        match self.turns.first_mut() {
            Some(first) => *first = system,
            None => self.turns.push(system),
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .first()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn estimate_tokens(&self) -> usize {
        estimate_tokens(&self.turns)
    }
}

pub(crate) fn estimate_tokens(turns: &[Turn]) -> usize {
    turns.iter().map(|t| t.content.len() / CHARS_PER_TOKEN).sum()
}

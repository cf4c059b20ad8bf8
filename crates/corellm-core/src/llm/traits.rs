use crate::error::CoreLlmError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Result of a non-streaming generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
}

/// One incremental piece of a streaming generation. `content` is `None` for
/// role-only deltas and heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub content: Option<String>,
}

impl Delta {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

pub type DeltaStream = BoxStream<'static, Result<Delta, CoreLlmError>>;

/// A text-generation backend. Implementations provide both blocking and
/// streaming generation over an ordered message list.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Generate a full response for `messages`.
    async fn generate(&self, messages: &[Turn]) -> Result<Completion, CoreLlmError>;

    /// Open a lazy stream of deltas for `messages`.
    async fn generate_stream(&self, messages: &[Turn]) -> Result<DeltaStream, CoreLlmError>;
}

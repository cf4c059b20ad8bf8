mod stream;

pub use stream::{drain_to, StreamHandle, StreamState};

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::constants::session::DEFAULT_CONTEXT_SIZE;
use crate::context::{estimate_tokens, ConversationStore};
use crate::error::CoreLlmError;
use crate::llm::{Backend, Turn};

pub(crate) fn lock_memory(memory: &Mutex<ConversationStore>) -> MutexGuard<'_, ConversationStore> {
    memory.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One conversation over one backend.
///
/// `chat` and `chat_stream` persist their turns; `prompt` and `prompt_stream`
/// are ephemeral. Persisting calls hold the session's turn gate for their
/// whole duration (for a stream: until it is exhausted, fails or is dropped),
/// so they never interleave with one another.
pub struct Session {
    backend: Arc<dyn Backend>,
    memory: Arc<Mutex<ConversationStore>>,
    system_prompt: String,
    context_size: u32,
    turn_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    pub fn new(backend: Arc<dyn Backend>, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            backend,
            memory: Arc::new(Mutex::new(ConversationStore::new(system_prompt.clone()))),
            system_prompt,
            context_size: DEFAULT_CONTEXT_SIZE,
            turn_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_context_size(mut self, tokens: u32) -> Self {
        self.context_size = tokens;
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CoreLlmError> {
        let backend = settings.build_backend()?;
        Ok(Self::new(backend, settings.session.system_prompt.clone())
            .with_context_size(settings.backend.context_size))
    }

    /// Send `message` with the full history and record both turns.
    ///
    /// The user turn is appended before the backend call and stays in memory
    /// if the call fails.
    pub async fn chat(&self, message: impl Into<String>) -> Result<String, CoreLlmError> {
        let _gate = self.turn_gate.lock().await;
        let messages = self.begin_turn(message.into());

        let completion = self.backend.generate(&messages).await.map_err(|e| {
            warn!("chat failed, user turn left unanswered: {e}");
            e
        })?;

        self.memory().append(Turn::assistant(completion.content.clone()));
        Ok(completion.content)
    }

    /// Send `message` without recording anything. With `use_memory` off the
    /// request is just the session's original system prompt and `message`.
    pub async fn prompt(
        &self,
        message: impl Into<String>,
        use_memory: bool,
    ) -> Result<String, CoreLlmError> {
        let messages = self.ephemeral_messages(message.into(), use_memory);
        let completion = self.backend.generate(&messages).await?;
        Ok(completion.content)
    }

    /// Streaming [`chat`](Self::chat). The user turn is recorded now; the
    /// assistant turn once the returned handle is exhausted.
    pub async fn chat_stream(&self, message: impl Into<String>) -> StreamHandle {
        let gate = Arc::clone(&self.turn_gate).lock_owned().await;
        let messages = self.begin_turn(message.into());
        StreamHandle::persisting(
            Arc::clone(&self.backend),
            messages,
            Arc::clone(&self.memory),
            gate,
        )
    }

    /// Streaming [`prompt`](Self::prompt). Never touches memory.
    pub fn prompt_stream(&self, message: impl Into<String>, use_memory: bool) -> StreamHandle {
        let messages = self.ephemeral_messages(message.into(), use_memory);
        StreamHandle::ephemeral(Arc::clone(&self.backend), messages)
    }

    /// [`chat_stream`](Self::chat_stream), drained into `sink`.
    pub async fn chat_stream_echo<W>(
        &self,
        message: impl Into<String>,
        sink: &mut W,
    ) -> Result<(), CoreLlmError>
    where
        W: Write + ?Sized,
    {
        drain_to(self.chat_stream(message).await, sink).await
    }

    /// [`prompt_stream`](Self::prompt_stream), drained into `sink`.
    pub async fn prompt_stream_echo<W>(
        &self,
        message: impl Into<String>,
        use_memory: bool,
        sink: &mut W,
    ) -> Result<(), CoreLlmError>
    where
        W: Write + ?Sized,
    {
        drain_to(self.prompt_stream(message, use_memory), sink).await
    }

    /// Reset memory to the original system prompt.
    pub fn clear(&self) {
        self.memory().initialize(self.system_prompt.clone());
    }

    /// Replace memory wholesale. `turns[0]` should be a system turn.
    pub fn set_memory(&self, turns: Vec<Turn>) {
        self.memory().replace(turns);
    }

    pub fn get_memory(&self) -> Vec<Turn> {
        self.memory().snapshot()
    }

    /// Replace the system turn in memory. The prompt used by memory-free
    /// requests and by [`clear`](Self::clear) is left as it was.
    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        self.memory().set_system_prompt(prompt);
    }

    /// The system prompt the session was created with.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn context_size(&self) -> u32 {
        self.context_size
    }

    fn memory(&self) -> MutexGuard<'_, ConversationStore> {
        lock_memory(&self.memory)
    }

    fn begin_turn(&self, message: String) -> Vec<Turn> {
        let messages = {
            let mut memory = self.memory();
            memory.append(Turn::user(message));
            memory.snapshot()
        };
        self.check_budget(&messages);
        messages
    }

    fn ephemeral_messages(&self, message: String, use_memory: bool) -> Vec<Turn> {
        let messages = if use_memory {
            let mut messages = self.get_memory();
            messages.push(Turn::user(message));
            messages
        } else {
            vec![Turn::system(self.system_prompt.clone()), Turn::user(message)]
        };
        self.check_budget(&messages);
        messages
    }

    fn check_budget(&self, messages: &[Turn]) {
        let estimated = estimate_tokens(messages);
        debug!("request: {} messages, ~{estimated} tokens", messages.len());
        if estimated > self.context_size as usize {
            warn!(
                "prompt of ~{estimated} tokens exceeds the {} token context window",
                self.context_size
            );
        }
    }
}

use crate::constants::{endpoints, session};
use crate::error::CoreLlmError;
use crate::llm::traits::*;
use futures::StreamExt;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::{ChatMessage, MessageRole};
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::Ollama;

/// Backend for models served by a local Ollama daemon.
pub struct OllamaBackend {
    ollama: Ollama,
    model: String,
    base_url: String,
    context_size: u32,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>) -> Result<Self, CoreLlmError> {
        Self::with_base_url(model, endpoints::OLLAMA_BASE_URL)
    }

    pub fn with_base_url(
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, CoreLlmError> {
        let base_url = base_url.into();
        let ollama = Ollama::try_new(&base_url)
            .map_err(|e| CoreLlmError::Config(format!("Invalid Ollama URL {base_url}: {e}")))?;
        Ok(Self {
            ollama,
            model: model.into(),
            base_url,
            context_size: session::DEFAULT_CONTEXT_SIZE,
        })
    }

    pub fn with_context_size(mut self, tokens: u32) -> Self {
        self.context_size = tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check if the daemon is reachable and responsive.
    pub async fn check_health(&self) -> Result<(), CoreLlmError> {
        self.ollama
            .list_local_models()
            .await
            .map(|_| ())
            .map_err(|e| {
                CoreLlmError::backend(format!(
                    "Ollama is not responding at {}: {e}",
                    self.base_url
                ))
            })
    }

    /// List the models installed in the local daemon.
    pub async fn list_models(&self) -> Result<Vec<String>, CoreLlmError> {
        let models = self
            .ollama
            .list_local_models()
            .await
            .map_err(|e| CoreLlmError::backend(format!("Failed to list Ollama models: {e}")))?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    fn to_ollama_messages(messages: &[Turn]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|t| {
                let role = match t.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, t.content.clone())
            })
            .collect()
    }

    fn request(&self, messages: &[Turn]) -> ChatMessageRequest {
        let options = GenerationOptions::default().num_ctx(self.context_size.into());
        ChatMessageRequest::new(self.model.clone(), Self::to_ollama_messages(messages))
            .options(options)
    }
}

#[async_trait::async_trait]
impl Backend for OllamaBackend {
    async fn generate(&self, messages: &[Turn]) -> Result<Completion, CoreLlmError> {
        let response = self
            .ollama
            .send_chat_messages(self.request(messages))
            .await
            .map_err(|e| CoreLlmError::backend(format!("Ollama chat error: {e}")))?;

        let message: Option<ChatMessage> = response.message.into();
        Ok(Completion {
            content: message.map(|m| m.content).unwrap_or_default(),
        })
    }

    async fn generate_stream(&self, messages: &[Turn]) -> Result<DeltaStream, CoreLlmError> {
        let stream = self
            .ollama
            .send_chat_messages_stream(self.request(messages))
            .await
            .map_err(|e| CoreLlmError::backend(format!("Ollama stream error: {e}")))?;

        let deltas = stream.map(|chunk| match chunk {
            Ok(response) => {
                let message: Option<ChatMessage> = response.message.into();
                Ok(Delta {
                    content: message.map(|m| m.content),
                })
            }
            Err(_) => Err(CoreLlmError::backend("Ollama stream deserialization error")),
        });

        Ok(deltas.boxed())
    }
}

use crate::constants::endpoints;
use crate::error::CoreLlmError;
use crate::llm::traits::*;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Backend for local servers speaking the OpenAI chat-completions protocol,
/// such as llama.cpp `llama-server` or LM Studio.
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OpenAiCompatBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            model: model.into(),
            base_url: endpoints::OPENAI_COMPAT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, endpoints::CHAT_COMPLETIONS_PATH)
    }

    async fn send(&self, messages: &[Turn], stream: bool) -> Result<reqwest::Response, CoreLlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream,
        };

        let response = self.client.post(self.url()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreLlmError::backend(format!(
                "Chat completion failed ({status}): {text}"
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceContent,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChoiceContent,
}

#[derive(Debug, Default, Deserialize)]
struct ChoiceContent {
    #[serde(default)]
    content: Option<String>,
}

/// A decoded line of a chat-completions event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Delta(Delta),
    Done,
}

/// Decode one line of a chat-completions event stream. Blank lines, comments
/// and non-`data:` fields decode to `None`.
pub fn parse_sse_line(line: &str) -> Result<Option<SseLine>, CoreLlmError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(Some(SseLine::Done));
    }

    let chunk: ChunkResponse = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(CoreLlmError::backend(format!("Stream error: {error}")));
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);

    Ok(Some(SseLine::Delta(Delta { content })))
}

#[async_trait::async_trait]
impl Backend for OpenAiCompatBackend {
    async fn generate(&self, messages: &[Turn]) -> Result<Completion, CoreLlmError> {
        let response = self.send(messages, false).await?;
        let text = response.text().await?;

        let body: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| CoreLlmError::backend(format!("Failed to parse response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CoreLlmError::backend("No choices in response"))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
        })
    }

    async fn generate_stream(&self, messages: &[Turn]) -> Result<DeltaStream, CoreLlmError> {
        let response = self.send(messages, true).await?;
        Ok(decode_sse_chunks(response.bytes_stream()))
    }
}

/// Reassemble raw body chunks into lines and decode them with
/// [`parse_sse_line`]. Lines and UTF-8 sequences may straddle chunks.
/// The stream ends at `[DONE]`, at the first error, or when the body closes.
pub fn decode_sse_chunks<S, B, E>(chunks: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<CoreLlmError> + Send,
{
    let stream = async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err::<Delta, CoreLlmError>(e.into());
                    return;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    Ok(Some(SseLine::Delta(delta))) => yield Ok(delta),
                    Ok(Some(SseLine::Done)) => return,
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        // Servers may close without a trailing newline.
        if !buffer.is_empty() {
            match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                Ok(Some(SseLine::Delta(delta))) => yield Ok(delta),
                Ok(_) => {}
                Err(e) => yield Err(e),
            }
        }
    };

    stream.boxed()
}

mod traits;
mod ollama;
mod openai;

pub use traits::*;
pub use ollama::OllamaBackend;
pub use openai::{decode_sse_chunks, parse_sse_line, OpenAiCompatBackend, SseLine};

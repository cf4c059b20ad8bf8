pub mod error;
pub mod constants;
pub mod llm;
pub mod context;
pub mod config;
pub mod logging;
pub mod session;

// Re-export key types
pub use error::{CoreLlmError, Result};
pub use llm::{Backend, Completion, Delta, DeltaStream, Role, Turn};
pub use context::ConversationStore;
pub use config::Settings;
pub use logging::{LogConfig, LogSink};
pub use session::{drain_to, Session, StreamHandle, StreamState};

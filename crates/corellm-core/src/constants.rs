//! CoreLLM — centralized constants.

// ─── Session ──────────────────────────────────────────────────────────────────

pub mod session {
    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful CoreLLM assistant.";

    /// Context window handed to the backend, in tokens.
    pub const DEFAULT_CONTEXT_SIZE: u32 = 4096;

    /// Rough characters-per-token ratio used for budget estimates.
    pub const CHARS_PER_TOKEN: usize = 4;
}

// ─── Backends ─────────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
    /// llama.cpp `llama-server` default listen address.
    pub const OPENAI_COMPAT_BASE_URL: &str = "http://localhost:8080";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
}

pub mod models {
    pub const DEFAULT_MODEL: &str = "llama3.2";
}

// ─── Presentation ─────────────────────────────────────────────────────────────

pub mod ui {
    pub const DEFAULT_PORT: u16 = 3001;
}

// ─── Logging ──────────────────────────────────────────────────────────────────

pub mod logging {
    pub const DEFAULT_LEVEL: &str = "warn";
}

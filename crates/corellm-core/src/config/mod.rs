use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::{endpoints, models, session, ui};
use crate::error::CoreLlmError;
use crate::llm::{Backend, OllamaBackend, OpenAiCompatBackend};
use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub ui: UiSettings,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// Model name for Ollama, or the served model path for llama.cpp servers.
    pub model: String,
    pub base_url: Option<String>,
    pub context_size: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ollama,
    /// Any local server speaking the OpenAI chat-completions protocol.
    #[serde(alias = "llamacpp", alias = "lmstudio")]
    OpenAI,
}

impl BackendKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            BackendKind::Ollama => endpoints::OLLAMA_BASE_URL,
            BackendKind::OpenAI => endpoints::OPENAI_COMPAT_BASE_URL,
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = CoreLlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "openai" | "llamacpp" | "llama.cpp" | "lmstudio" => Ok(BackendKind::OpenAI),
            other => Err(CoreLlmError::Config(format!("Unknown backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiSettings {
    pub port: u16,
    /// Open the page in the default browser when serving.
    pub open_browser: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Ollama, // Local daemon, no setup beyond `ollama pull`
            model: models::DEFAULT_MODEL.to_string(),
            base_url: None,
            context_size: session::DEFAULT_CONTEXT_SIZE,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_prompt: session::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            port: ui::DEFAULT_PORT,
            open_browser: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("corellm")
            .join("config.toml")
    }

    /// Load from the default path, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        let (settings, ignored) = Self::load_or_default(&Self::config_path());
        if let Some(e) = ignored {
            tracing::warn!("{e}");
        }
        settings
    }

    /// Like [`Settings::load`] but hands back the reason a present file was
    /// ignored instead of logging it, for callers that load settings before
    /// logging is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<CoreLlmError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(path) {
            Ok(settings) => (settings, None),
            Err(e) => (
                Self::default(),
                Some(CoreLlmError::Config(format!(
                    "Ignoring {}: {e}",
                    path.display()
                ))),
            ),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, CoreLlmError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CoreLlmError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<(), CoreLlmError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CoreLlmError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreLlmError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.backend
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.kind.default_base_url())
    }

    /// Build the generation backend described by these settings.
    pub fn build_backend(&self) -> Result<Arc<dyn Backend>, CoreLlmError> {
        let backend: Arc<dyn Backend> = match self.backend.kind {
            BackendKind::Ollama => Arc::new(
                OllamaBackend::with_base_url(self.backend.model.clone(), self.base_url())?
                    .with_context_size(self.backend.context_size),
            ),
            BackendKind::OpenAI => Arc::new(
                OpenAiCompatBackend::new(self.backend.model.clone())
                    .with_base_url(self.base_url()),
            ),
        };
        Ok(backend)
    }
}

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use corellm_core::{logging, CoreLlmError, Settings};
use tracing::warn;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "corellm")]
#[command(about = "CoreLLM - chat with a local model")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend (ollama, openai)
    #[arg(long)]
    backend: Option<String>,

    /// Model name, or model path for llama.cpp servers
    #[arg(short, long)]
    model: Option<String>,

    /// Backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// System prompt for the session
    #[arg(long)]
    system_prompt: Option<String>,

    /// Context window in tokens
    #[arg(long)]
    ctx_size: Option<u32>,

    /// Run a single prompt without memory and exit
    #[arg(short, long, conflicts_with = "serve")]
    prompt: Option<String>,

    /// Serve the browser chat interface
    #[arg(long)]
    serve: bool,

    /// Port for --serve
    #[arg(long)]
    port: Option<u16>,

    /// Open the chat page in the default browser (with --serve)
    #[arg(long, requires = "serve")]
    open: bool,

    /// Check that the Ollama daemon is reachable and list its models
    #[arg(long)]
    check: bool,
}

impl Cli {
    /// Resolve settings and CLI overrides. A default config file that fails
    /// to parse is returned as the second value so it can be reported once
    /// logging is up.
    fn settings(&self) -> Result<(Settings, Option<CoreLlmError>)> {
        let (mut settings, ignored) = match &self.config {
            Some(path) => (Settings::load_from(path)?, None),
            None => Settings::load_or_default(&Settings::config_path()),
        };

        if let Some(ref backend) = self.backend {
            settings.backend.kind = backend.parse()?;
        }
        if let Some(ref model) = self.model {
            settings.backend.model = model.clone();
        }
        if let Some(ref url) = self.base_url {
            settings.backend.base_url = Some(url.clone());
        }
        if let Some(ref prompt) = self.system_prompt {
            settings.session.system_prompt = prompt.clone();
        }
        if let Some(tokens) = self.ctx_size {
            settings.backend.context_size = tokens;
        }
        if let Some(port) = self.port {
            settings.ui.port = port;
        }
        if self.open {
            settings.ui.open_browser = true;
        }
        Ok((settings, ignored))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, ignored) = cli.settings()?;

    logging::init(&settings.logging)?;
    if let Some(e) = ignored {
        warn!("{e}");
    }

    if cli.check {
        app::run_check(&settings).await?;
    } else if let Some(ref prompt) = cli.prompt {
        app::run_single_prompt(&settings, prompt).await?;
    } else if cli.serve {
        app::run_serve(&settings).await?;
    } else {
        app::run_repl(&settings).await?;
    }

    Ok(())
}

use anyhow::{bail, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use corellm_core::config::BackendKind;
use corellm_core::llm::OllamaBackend;
use corellm_core::{Session, Settings};
use corellm_ui::Interface;

use crate::commands::{format_memory, handle_command, CommandResult};

/// Stream one memory-free answer to stdout and exit.
pub async fn run_single_prompt(settings: &Settings, prompt: &str) -> Result<()> {
    let session = Session::from_settings(settings)?;
    let mut stdout = io::stdout();
    session.prompt_stream_echo(prompt, false, &mut stdout).await?;
    Ok(())
}

/// Serve the browser chat page.
pub async fn run_serve(settings: &Settings) -> Result<()> {
    let session = Arc::new(Session::from_settings(settings)?);
    let port = settings.ui.port;
    println!("Chat interface: http://127.0.0.1:{port}");
    Interface::new(session, port)
        .with_open_browser(settings.ui.open_browser)
        .render()
        .await?;
    Ok(())
}

/// Report whether the configured Ollama daemon is up and which models it has.
pub async fn run_check(settings: &Settings) -> Result<()> {
    if settings.backend.kind != BackendKind::Ollama {
        bail!("--check is only available for the ollama backend");
    }

    let backend = OllamaBackend::with_base_url(settings.backend.model.clone(), settings.base_url())?;
    backend.check_health().await?;

    let models = backend.list_models().await?;
    println!("Ollama is running at {}", settings.base_url());
    for model in &models {
        let marker = if *model == settings.backend.model
            || model.starts_with(&format!("{}:", settings.backend.model))
        {
            "*"
        } else {
            " "
        };
        println!(" {marker} {model}");
    }
    Ok(())
}

// ── Interactive REPL ────────────────────────────────────────────────────

pub async fn run_repl(settings: &Settings) -> Result<()> {
    let session = Session::from_settings(settings)?;
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "CoreLLM ({} on {}). Type /help for commands.",
        settings.backend.model,
        settings.base_url()
    );

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match handle_command(line) {
            CommandResult::NotACommand => {
                if let Err(e) = session.chat_stream_echo(line, &mut stdout).await {
                    eprintln!("\nError: {e}");
                }
            }
            CommandResult::Ask(message) => {
                if let Err(e) = session.prompt_stream_echo(message, false, &mut stdout).await {
                    eprintln!("\nError: {e}");
                }
            }
            CommandResult::Message(message) => println!("{message}"),
            CommandResult::Clear => {
                session.clear();
                println!("Memory cleared.");
            }
            CommandResult::ShowMemory => println!("{}", format_memory(&session.get_memory())),
            CommandResult::SetSystemPrompt(prompt) => {
                session.set_system_prompt(prompt);
                println!("System prompt updated.");
            }
            CommandResult::Quit => break,
        }
    }

    Ok(())
}

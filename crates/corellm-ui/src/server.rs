use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use corellm_core::Session;

use crate::history::{cumulative, memory_to_pairs, DisplayPair};

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Error, Debug)]
pub enum UiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open browser: {0}")]
    Browser(String),
}

#[derive(Clone)]
struct AppState {
    session: Arc<Session>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// What the page is currently showing. Accepted for the page's benefit;
    /// the session's own memory is the source of truth.
    #[serde(default)]
    pub history: Vec<DisplayPair>,
}

/// Browser chat page bound to one session.
pub struct Interface {
    session: Arc<Session>,
    port: u16,
    open_browser: bool,
}

impl Interface {
    pub fn new(session: Arc<Session>, port: u16) -> Self {
        Self {
            session,
            port,
            open_browser: false,
        }
    }

    /// Open the page in the default browser once the listener is bound.
    pub fn with_open_browser(mut self, open: bool) -> Self {
        self.open_browser = open;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn opens_browser(&self) -> bool {
        self.open_browser
    }

    /// Serve the page on `127.0.0.1:port` until the process is stopped.
    pub async fn render(self) -> Result<(), UiError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Chat interface listening on http://{}", addr);

        if self.open_browser {
            let url = format!("http://{addr}");
            tokio::spawn(async move {
                if let Err(e) = open_in_browser(&url).await {
                    warn!("{e}");
                }
            });
        }

        axum::serve(listener, create_router(self.session)).await?;
        Ok(())
    }
}

/// Platform opener for `url`: `open` on macOS, `cmd /C start` on Windows,
/// `xdg-open` elsewhere.
pub fn browser_command(url: &str) -> tokio::process::Command {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "cmd"
    } else {
        "xdg-open"
    };

    let mut cmd = tokio::process::Command::new(opener);
    if cfg!(target_os = "windows") {
        cmd.args(["/C", "start", "", url]);
    } else {
        cmd.arg(url);
    }
    cmd
}

async fn open_in_browser(url: &str) -> Result<(), UiError> {
    let output = browser_command(url)
        .output()
        .await
        .map_err(|e| UiError::Browser(e.to_string()))?;

    if output.status.success() {
        debug!("Opened {} in browser", url);
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(UiError::Browser(stderr.trim().to_string()))
    }
}

pub fn create_router(session: Arc<Session>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/history", get(history_handler))
        .route("/api/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { session })
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn history_handler(State(state): State<AppState>) -> Json<Vec<DisplayPair>> {
    Json(memory_to_pairs(&state.session.get_memory()))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("chat request ({} pairs on screen)", request.history.len());

    let fragments = state.session.chat_stream(request.message).await;

    let snapshots = cumulative(fragments).map(|snapshot| {
        let event = match snapshot {
            Ok(text) => text_event("snapshot", &text),
            Err(e) => text_event("error", &e.to_string()),
        };
        Ok::<_, Infallible>(event)
    });
    let done = stream::once(async { Ok::<_, Infallible>(Event::default().event("done").data("")) });

    Sse::new(snapshots.chain(done)).keep_alive(KeepAlive::default())
}

/// Model text may hold `\r` or `\n`, which SSE fields cannot carry raw, so
/// payloads go out as JSON strings.
fn text_event(name: &str, text: &str) -> Event {
    Event::default()
        .event(name)
        .json_data(text)
        .unwrap_or_else(|e| {
            warn!("Failed to encode {} event: {}", name, e);
            Event::default().event("error").data("encoding failed")
        })
}

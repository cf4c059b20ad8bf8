use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream};
use futures::{FutureExt, StreamExt};
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::context::ConversationStore;
use crate::error::CoreLlmError;
use crate::llm::{Backend, DeltaStream, Turn};
use crate::session::lock_memory;

/// Lifecycle of one streaming generation.
///
/// `Created → Streaming → … → Finalizing → Done`. Dropping a handle in
/// `Created` or `Streaming` moves it to `Abandoned`; a backend error moves it
/// to `Failed`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Streaming,
    Finalizing,
    Done,
    Failed,
    Abandoned,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Abandoned)
    }
}

type OpenFuture = BoxFuture<'static, Result<DeltaStream, CoreLlmError>>;

/// Pending assistant turn of a persisting stream. Holds the session's turn
/// gate until the handle finishes or is dropped.
struct Commit {
    memory: Arc<Mutex<ConversationStore>>,
    buffer: String,
    _gate: OwnedMutexGuard<()>,
}

/// A lazy, single-pass sequence of text fragments for one in-flight
/// generation.
///
/// Nothing reaches the backend until the first poll. Empty deltas are
/// skipped. A handle created by [`Session::chat_stream`](crate::Session::chat_stream)
/// appends the concatenated fragments as one assistant turn once the backend
/// stream is exhausted, and never before. Stop polling (drop the handle) to
/// cancel.
pub struct StreamHandle {
    state: StreamState,
    opening: Option<OpenFuture>,
    inner: Option<DeltaStream>,
    commit: Option<Commit>,
}

impl StreamHandle {
    pub(crate) fn ephemeral(backend: Arc<dyn Backend>, messages: Vec<Turn>) -> Self {
        Self {
            state: StreamState::Created,
            opening: Some(Self::open(backend, messages)),
            inner: None,
            commit: None,
        }
    }

    pub(crate) fn persisting(
        backend: Arc<dyn Backend>,
        messages: Vec<Turn>,
        memory: Arc<Mutex<ConversationStore>>,
        gate: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            state: StreamState::Created,
            opening: Some(Self::open(backend, messages)),
            inner: None,
            commit: Some(Commit {
                memory,
                buffer: String::new(),
                _gate: gate,
            }),
        }
    }

    fn open(backend: Arc<dyn Backend>, messages: Vec<Turn>) -> OpenFuture {
        async move { backend.generate_stream(&messages).await }.boxed()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether exhausting this handle writes an assistant turn to memory.
    pub fn is_persisting(&self) -> bool {
        self.commit.is_some()
    }

    fn fail(&mut self, error: CoreLlmError) -> Poll<Option<Result<String, CoreLlmError>>> {
        debug!("stream failed: {error}");
        self.state = StreamState::Failed;
        self.opening = None;
        self.inner = None;
        self.commit = None;
        Poll::Ready(Some(Err(error)))
    }

    fn finalize(&mut self) {
        self.state = StreamState::Finalizing;
        self.inner = None;
        if let Some(commit) = self.commit.take() {
            debug!("committing assistant turn ({} bytes)", commit.buffer.len());
            lock_memory(&commit.memory).append(Turn::assistant(commit.buffer));
        }
        self.state = StreamState::Done;
    }
}

impl Stream for StreamHandle {
    type Item = Result<String, CoreLlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.state {
                StreamState::Created => {
                    this.state = StreamState::Streaming;
                }
                StreamState::Streaming => {
                    if let Some(opening) = this.opening.as_mut() {
                        match opening.poll_unpin(cx) {
                            Poll::Pending => return Poll::Pending,
                            Poll::Ready(Ok(stream)) => {
                                this.opening = None;
                                this.inner = Some(stream);
                            }
                            Poll::Ready(Err(e)) => return this.fail(e),
                        }
                    }

                    let Some(inner) = this.inner.as_mut() else {
                        this.finalize();
                        continue;
                    };

                    match inner.poll_next_unpin(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(delta))) => match delta.content {
                            Some(text) if !text.is_empty() => {
                                if let Some(commit) = this.commit.as_mut() {
                                    commit.buffer.push_str(&text);
                                }
                                return Poll::Ready(Some(Ok(text)));
                            }
                            _ => continue,
                        },
                        Poll::Ready(Some(Err(e))) => return this.fail(e),
                        Poll::Ready(None) => this.finalize(),
                    }
                }
                StreamState::Finalizing => this.finalize(),
                StreamState::Done | StreamState::Failed | StreamState::Abandoned => {
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl FusedStream for StreamHandle {
    fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            if self.commit.is_some() {
                debug!("chat stream abandoned in {:?}; no assistant turn", self.state);
            }
            self.state = StreamState::Abandoned;
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("state", &self.state)
            .field("persisting", &self.is_persisting())
            .finish()
    }
}

/// Drain `stream`, writing and flushing every fragment to `sink`, then a
/// newline.
pub async fn drain_to<W>(mut stream: StreamHandle, sink: &mut W) -> Result<(), CoreLlmError>
where
    W: Write + ?Sized,
{
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        sink.write_all(fragment.as_bytes())?;
        sink.flush()?;
    }
    writeln!(sink)?;
    Ok(())
}

use corellm_core::{
    drain_to, Backend, Completion, CoreLlmError, Delta, DeltaStream, Role, Session, StreamState,
    Turn,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted reply for one backend call.
enum Reply {
    Text(&'static str),
    Fail(&'static str),
    Stream(Vec<Option<&'static str>>),
    StreamThenFail(Vec<&'static str>, &'static str),
}

/// Mock backend that plays back replies in order and records every request.
struct MockBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Arc<Mutex<Vec<Vec<Turn>>>>,
}

impl MockBackend {
    fn new(replies: Vec<Reply>) -> (Arc<Self>, Arc<Mutex<Vec<Vec<Turn>>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let backend = Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: requests.clone(),
        });
        (backend, requests)
    }

    fn next_reply(&self, messages: &[Turn]) -> Reply {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail("no scripted reply"))
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn generate(&self, messages: &[Turn]) -> Result<Completion, CoreLlmError> {
        match self.next_reply(messages) {
            Reply::Text(text) => Ok(Completion {
                content: text.to_string(),
            }),
            Reply::Fail(msg) => Err(CoreLlmError::backend(msg)),
            _ => panic!("streaming reply scripted for a blocking call"),
        }
    }

    async fn generate_stream(&self, messages: &[Turn]) -> Result<DeltaStream, CoreLlmError> {
        let items: Vec<Result<Delta, CoreLlmError>> = match self.next_reply(messages) {
            Reply::Stream(fragments) => fragments
                .into_iter()
                .map(|f| {
                    Ok(Delta {
                        content: f.map(str::to_string),
                    })
                })
                .collect(),
            Reply::StreamThenFail(fragments, msg) => fragments
                .into_iter()
                .map(|f| Ok(Delta::text(f)))
                .chain(std::iter::once(Err(CoreLlmError::backend(msg))))
                .collect(),
            Reply::Fail(msg) => return Err(CoreLlmError::backend(msg)),
            Reply::Text(_) => panic!("blocking reply scripted for a streaming call"),
        };
        Ok(futures::stream::iter(items).boxed())
    }
}

fn session_with(replies: Vec<Reply>) -> (Session, Arc<Mutex<Vec<Vec<Turn>>>>) {
    let (backend, requests) = MockBackend::new(replies);
    (Session::new(backend, "S"), requests)
}

// ========================================================================
// Blocking modes
// ========================================================================

#[tokio::test]
async fn test_chat_records_user_and_assistant_turns() {
    let (session, requests) = session_with(vec![Reply::Text("R")]);

    let reply = session.chat("hi").await.unwrap();

    assert_eq!(reply, "R");
    assert_eq!(
        session.get_memory(),
        vec![Turn::system("S"), Turn::user("hi"), Turn::assistant("R")]
    );
    assert_eq!(
        requests.lock().unwrap()[0],
        vec![Turn::system("S"), Turn::user("hi")]
    );
}

#[tokio::test]
async fn test_chat_sends_full_history() {
    let (session, requests) = session_with(vec![Reply::Text("one"), Reply::Text("two")]);

    session.chat("first").await.unwrap();
    session.chat("second").await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[1].len(), 4);
    assert_eq!(requests[1][2], Turn::assistant("one"));
    assert_eq!(requests[1][3], Turn::user("second"));
    assert_eq!(session.get_memory().len(), 5);
}

#[tokio::test]
async fn test_chat_failure_leaves_unanswered_user_turn() {
    let (session, _) = session_with(vec![Reply::Fail("backend down")]);

    let err = session.chat("hi").await.unwrap_err();

    assert!(matches!(err, CoreLlmError::Backend(ref m) if m == "backend down"));
    assert_eq!(
        session.get_memory(),
        vec![Turn::system("S"), Turn::user("hi")]
    );
}

#[tokio::test]
async fn test_prompt_without_memory_uses_system_and_user_only() {
    let (session, requests) = session_with(vec![Reply::Text("earlier"), Reply::Text("R")]);
    session.chat("earlier question").await.unwrap();
    let before = session.get_memory();

    let reply = session.prompt("hi", false).await.unwrap();

    assert_eq!(reply, "R");
    assert_eq!(session.get_memory(), before);
    assert_eq!(
        requests.lock().unwrap()[1],
        vec![Turn::system("S"), Turn::user("hi")]
    );
}

#[tokio::test]
async fn test_prompt_with_memory_reads_history_without_writing() {
    let (session, requests) = session_with(vec![Reply::Text("a1"), Reply::Text("a2")]);
    session.chat("q1").await.unwrap();
    let before = session.get_memory();

    session.prompt("q2", true).await.unwrap();

    assert_eq!(session.get_memory(), before);
    let sent = &requests.lock().unwrap()[1];
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[3], Turn::user("q2"));
}

#[tokio::test]
async fn test_prompt_failure_does_not_mutate_memory() {
    let (session, _) = session_with(vec![Reply::Fail("boom")]);
    let before = session.get_memory();

    assert!(session.prompt("hi", false).await.is_err());
    assert_eq!(session.get_memory(), before);
}

// ========================================================================
// Memory accessors
// ========================================================================

#[tokio::test]
async fn test_get_memory_is_idempotent() {
    let (session, _) = session_with(vec![Reply::Text("R")]);
    session.chat("hi").await.unwrap();

    assert_eq!(session.get_memory(), session.get_memory());
}

#[tokio::test]
async fn test_clear_resets_to_single_system_turn() {
    let (session, _) = session_with(vec![Reply::Text("R")]);
    session.chat("hi").await.unwrap();

    session.clear();

    assert_eq!(session.get_memory(), vec![Turn::system("S")]);
}

#[test]
fn test_new_session_starts_with_system_turn() {
    let (session, _) = session_with(vec![]);

    let memory = session.get_memory();
    assert_eq!(memory.len(), 1);
    assert_eq!(memory[0].role, Role::System);
    assert_eq!(memory[0].content, "S");
}

#[test]
fn test_set_memory_replaces_without_validation() {
    let (session, _) = session_with(vec![]);
    let turns = vec![Turn::user("no system turn"), Turn::assistant("ok")];

    session.set_memory(turns.clone());

    assert_eq!(session.get_memory(), turns);
}

#[test]
fn test_snapshot_is_a_copy() {
    let (session, _) = session_with(vec![]);

    let mut memory = session.get_memory();
    memory.push(Turn::user("local only"));

    assert_eq!(session.get_memory().len(), 1);
}

#[tokio::test]
async fn test_set_system_prompt_leaves_cached_prompt() {
    let (session, requests) = session_with(vec![Reply::Text("R")]);

    session.set_system_prompt("New");
    assert_eq!(session.get_memory()[0], Turn::system("New"));
    assert_eq!(session.system_prompt(), "S");

    session.prompt("hi", false).await.unwrap();
    assert_eq!(requests.lock().unwrap()[0][0], Turn::system("S"));

    session.clear();
    assert_eq!(session.get_memory(), vec![Turn::system("S")]);
}

// ========================================================================
// Streaming modes
// ========================================================================

#[tokio::test]
async fn test_chat_stream_commits_concatenation_after_exhaustion() {
    let (session, _) = session_with(vec![Reply::Stream(vec![
        Some("Hel"),
        Some("lo "),
        Some("there"),
    ])]);

    let mut stream = session.chat_stream("hi").await;
    assert!(stream.is_persisting());

    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        fragments.push(fragment.unwrap());
        // Nothing is committed while fragments are still arriving.
        assert_eq!(session.get_memory().len(), 2);
    }

    assert_eq!(stream.state(), StreamState::Done);
    let memory = session.get_memory();
    assert_eq!(memory.len(), 3);
    assert_eq!(memory[2], Turn::assistant(fragments.concat()));
    assert_eq!(memory[2].content, "Hello there");
}

#[tokio::test]
async fn test_chat_stream_abandoned_after_first_fragment() {
    let (session, _) = session_with(vec![Reply::Stream(vec![
        Some("a"),
        Some("b"),
        Some("c"),
    ])]);

    let mut stream = session.chat_stream("hi").await;
    assert_eq!(stream.next().await.unwrap().unwrap(), "a");
    assert_eq!(stream.state(), StreamState::Streaming);
    drop(stream);

    assert_eq!(
        session.get_memory(),
        vec![Turn::system("S"), Turn::user("hi")]
    );
}

#[tokio::test]
async fn test_abandoned_stream_releases_turn_gate() {
    let (session, _) = session_with(vec![
        Reply::Stream(vec![Some("a"), Some("b")]),
        Reply::Text("R"),
    ]);

    let mut stream = session.chat_stream("first").await;
    stream.next().await;
    drop(stream);

    let reply = tokio::time::timeout(Duration::from_secs(1), session.chat("second"))
        .await
        .expect("turn gate still held")
        .unwrap();
    assert_eq!(reply, "R");
}

#[tokio::test]
async fn test_persisting_calls_wait_for_open_stream() {
    let (session, _) = session_with(vec![
        Reply::Stream(vec![Some("a")]),
        Reply::Text("R"),
    ]);

    let stream = session.chat_stream("first").await;

    let blocked = tokio::time::timeout(Duration::from_millis(20), session.chat("second")).await;
    assert!(blocked.is_err());
    assert_eq!(session.get_memory().len(), 2);

    let mut sink = Vec::new();
    drain_to(stream, &mut sink).await.unwrap();
    session.chat("second").await.unwrap();

    let memory = session.get_memory();
    assert_eq!(memory[2], Turn::assistant("a"));
    assert_eq!(memory[3], Turn::user("second"));
    assert_eq!(memory[4], Turn::assistant("R"));
}

#[tokio::test]
async fn test_empty_fragments_are_filtered() {
    let (session, _) = session_with(vec![Reply::Stream(vec![
        None,
        Some("He"),
        Some(""),
        Some("llo"),
        None,
    ])]);

    let fragments: Vec<String> = session
        .prompt_stream("hi", false)
        .map(|f| f.unwrap())
        .collect()
        .await;

    assert_eq!(fragments, vec!["He", "llo"]);
}

#[tokio::test]
async fn test_prompt_stream_never_mutates_memory() {
    let (session, requests) = session_with(vec![
        Reply::Text("a1"),
        Reply::Stream(vec![Some("a"), Some("b")]),
        Reply::Stream(vec![Some("a"), Some("b")]),
    ]);
    session.chat("q1").await.unwrap();
    let before = session.get_memory();

    let mut partial = session.prompt_stream("hi", true);
    assert!(!partial.is_persisting());
    partial.next().await;
    drop(partial);
    assert_eq!(session.get_memory(), before);

    let full: Vec<_> = session.prompt_stream("hi", true).collect().await;
    assert_eq!(full.len(), 2);
    assert_eq!(session.get_memory(), before);

    let requests = requests.lock().unwrap();
    for sent in &requests[1..] {
        assert_eq!(
            *sent,
            vec![
                Turn::system("S"),
                Turn::user("q1"),
                Turn::assistant("a1"),
                Turn::user("hi")
            ]
        );
    }
}

#[tokio::test]
async fn test_stream_is_lazy_until_first_pull() {
    let (session, requests) = session_with(vec![Reply::Stream(vec![Some("x")])]);

    let mut stream = session.prompt_stream("hi", false);
    assert_eq!(stream.state(), StreamState::Created);
    assert!(requests.lock().unwrap().is_empty());

    stream.next().await;
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stream_prompt_is_fixed_at_creation() {
    let (session, requests) = session_with(vec![Reply::Stream(vec![Some("R")])]);

    let stream = session.chat_stream("hi").await;
    session.set_memory(vec![Turn::system("Other")]);

    let mut sink = Vec::new();
    drain_to(stream, &mut sink).await.unwrap();

    assert_eq!(
        requests.lock().unwrap()[0],
        vec![Turn::system("S"), Turn::user("hi")]
    );
    assert_eq!(
        session.get_memory(),
        vec![Turn::system("Other"), Turn::assistant("R")]
    );
}

#[tokio::test]
async fn test_stream_open_failure_surfaces_on_first_pull() {
    let (session, _) = session_with(vec![Reply::Fail("no model")]);

    let mut stream = session.chat_stream("hi").await;

    let first = stream.next().await.unwrap();
    assert!(matches!(first, Err(CoreLlmError::Backend(_))));
    assert!(stream.next().await.is_none());
    assert_eq!(stream.state(), StreamState::Failed);
    assert_eq!(
        session.get_memory(),
        vec![Turn::system("S"), Turn::user("hi")]
    );
}

#[tokio::test]
async fn test_stream_failure_mid_generation_commits_nothing() {
    let (session, _) = session_with(vec![Reply::StreamThenFail(vec!["par", "tial"], "lost")]);

    let mut stream = session.chat_stream("hi").await;

    assert_eq!(stream.next().await.unwrap().unwrap(), "par");
    assert_eq!(stream.next().await.unwrap().unwrap(), "tial");
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
    assert_eq!(session.get_memory().len(), 2);
}

#[tokio::test]
async fn test_chat_stream_echo_drains_into_sink() {
    let (session, _) = session_with(vec![Reply::Stream(vec![Some("Hi"), Some("!")])]);

    let mut sink: Vec<u8> = Vec::new();
    session.chat_stream_echo("hello", &mut sink).await.unwrap();

    assert_eq!(String::from_utf8(sink).unwrap(), "Hi!\n");
    assert_eq!(session.get_memory()[2], Turn::assistant("Hi!"));
}

#[tokio::test]
async fn test_prompt_stream_echo_leaves_memory() {
    let (session, _) = session_with(vec![Reply::Stream(vec![Some("ok")])]);

    let mut sink: Vec<u8> = Vec::new();
    session
        .prompt_stream_echo("hello", false, &mut sink)
        .await
        .unwrap();

    assert_eq!(String::from_utf8(sink).unwrap(), "ok\n");
    assert_eq!(session.get_memory().len(), 1);
}

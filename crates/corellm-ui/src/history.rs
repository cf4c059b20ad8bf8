use corellm_core::{CoreLlmError, Role, Turn};
use futures::stream::{Stream, StreamExt};

/// One rendered exchange: the user's message and the assistant's answer.
pub type DisplayPair = (String, String);

/// Pair every user turn with the assistant turn that answers it. System turns
/// are skipped and a user turn still waiting for an answer is not shown.
pub fn memory_to_pairs(turns: &[Turn]) -> Vec<DisplayPair> {
    let mut pairs = Vec::new();
    let mut pending_user: Option<&str> = None;

    for turn in turns {
        match turn.role {
            Role::User => pending_user = Some(turn.content.as_str()),
            Role::Assistant => {
                if let Some(user) = pending_user.take() {
                    pairs.push((user.to_string(), turn.content.clone()));
                }
            }
            Role::System => {}
        }
    }

    pairs
}

/// Turn a fragment stream into the running concatenation after each fragment.
pub fn cumulative<S>(fragments: S) -> impl Stream<Item = Result<String, CoreLlmError>>
where
    S: Stream<Item = Result<String, CoreLlmError>>,
{
    fragments.scan(String::new(), |partial, fragment| {
        let snapshot = fragment.map(|text| {
            partial.push_str(&text);
            partial.clone()
        });
        futures::future::ready(Some(snapshot))
    })
}

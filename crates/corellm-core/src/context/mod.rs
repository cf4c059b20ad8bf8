mod history;

pub use history::ConversationStore;
pub(crate) use history::estimate_tokens;

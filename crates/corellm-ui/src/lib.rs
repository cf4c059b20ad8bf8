//! Presentation adapter: renders one [`Session`] as a browser chat page.
//!
//! The adapter reads memory once to seed the page and drives
//! [`Session::chat_stream`] for every message. It keeps no state of its own.

mod history;
mod server;

pub use history::{cumulative, memory_to_pairs, DisplayPair};
pub use server::{browser_command, create_router, ChatRequest, Interface, UiError};

pub use corellm_core::Session;

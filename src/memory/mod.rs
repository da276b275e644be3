//! Conversational memory
//!
//! Rolling buffers of prior turns used as model context. Nothing here
//! survives a restart.

mod buffer;
mod store;

pub use buffer::{recent_assistant_turns, ConversationBuffer, ConversationTurn, Role};
pub use store::ConversationStore;

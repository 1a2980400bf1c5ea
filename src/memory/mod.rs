//! Agent memory: the short-term conversation log and the long-term memory
//! capability boundary.

pub mod conversation;
pub mod long_term;

pub use conversation::{Conversation, Role, Turn};
pub use long_term::{LongTermMemory, MemoryError};

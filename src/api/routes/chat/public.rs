//! Public types for the chat API
pub use crate::ai::chat::{ChatRequest, ClientCommand};

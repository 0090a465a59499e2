pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod stream;
pub mod transport;

pub use client::{AgentChatRequest, ChatMessage, ChatRequest, PlatformClient};
pub use error::SdkError;
pub use stream::{AgentStreamEvent, ChatStreamEvent};

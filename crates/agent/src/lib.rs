//! Conversation handling for huddle.
//!
//! - `llm` / `providers` - the chat-completion backend and the `ChatModel`
//!   seam the dispatcher talks to
//! - `dispatcher` - one message in, one reply out, transcript kept per session
//! - `adapter` - the contract each inbound channel implements, plus `serve`
//! - `runtime` - tool-augmented chat model (at most one tool call per turn)
//! - `calendar` / `tools` - Google Calendar access exposed as agent tools

pub mod adapter;
pub mod calendar;
pub mod dispatcher;
pub mod llm;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use adapter::{serve, EmitError, Inbound, InboundAdapter, Served};
pub use dispatcher::{ChatDispatcher, EMPTY_MESSAGE_REPLY};
pub use llm::{ChatModel, DirectChat, LlmClient};
pub use runtime::AgentRuntime;

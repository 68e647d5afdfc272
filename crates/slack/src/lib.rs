//! Slack interface for huddle.
//!
//! - **Events** (`events`) - Socket Mode envelope parsing and the event dispatcher
//! - **Mentions** (`mention`) - `app_mention` adapter: strip the bot mention,
//!   derive the session, answer in thread
//! - **Web API** (`web_api`) - `chat.postMessage` with the bot token
//! - **Socket Mode** (`socket`) - receive loop with reconnect backoff over a
//!   pluggable transport
//!
//! ```text
//! Socket Mode frame → SlackEnvelope → EventDispatcher → AppMentionHandler
//!                                                     → ChatDispatcher → chat.postMessage
//! ```

pub mod events;
pub mod mention;
pub mod socket;
pub mod web_api;

pub const STARTUP_MESSAGE: &str = "Hello! SlackBot is now online.";

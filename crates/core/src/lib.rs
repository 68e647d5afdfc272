pub mod config;
pub mod domain;
pub mod errors;
pub mod session;

pub use domain::message::{Message, Role, SessionId};
pub use errors::{ApplicationError, CalendarError, InterfaceError, LlmError};
pub use session::{SessionHistoryStore, SessionLease, SessionTranscript};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm request did not reach the provider: {0}")]
    Transport(String),
    #[error("llm provider rejected the credentials: {0}")]
    Authentication(String),
    #[error("llm provider rate limited the request: {0}")]
    RateLimited(String),
    #[error("llm provider returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("llm response could not be interpreted: {0}")]
    MalformedResponse(String),
    #[error("llm call exceeded the {secs}s timeout")]
    Timeout { secs: u64 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error(
        "calendar credential file `{0}` was not found; complete the one-time browser authorization first"
    )]
    MissingCredentials(PathBuf),
    #[error("calendar credential file `{path}` is invalid: {message}")]
    InvalidCredentials { path: PathBuf, message: String },
    #[error("calendar access token in `{0}` has expired; re-run the browser authorization")]
    ExpiredCredentials(PathBuf),
    #[error("calendar event `{0}` was not found")]
    EventNotFound(String),
    #[error("calendar api returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("calendar request failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Apology shown on the channel the request came from. Never carries
    /// provider detail; that goes to the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Sorry, I couldn't make sense of that request. Please rephrase and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "Sorry, I couldn't reach my assistant service just now. Please try again later."
            }
            Self::Internal { .. } => {
                "Sorry, I encountered an internal error while processing your request. Please try again later."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Llm(LlmError::Authentication(_))
            | ApplicationError::Llm(LlmError::MalformedResponse(_)) => {
                Self::Internal { message, correlation_id }
            }
            ApplicationError::Llm(LlmError::Api { status, .. }) if (400..500).contains(&status) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Llm(_) | ApplicationError::Calendar(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

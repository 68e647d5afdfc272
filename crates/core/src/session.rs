//! In-memory conversation history keyed by session.
//!
//! The store owns every transcript for the life of the process. Nothing is
//! persisted or evicted. Each session sits behind its own async mutex so
//! callers that need read-then-append semantics (the chat dispatcher) can take
//! a [`SessionLease`] and keep other writers for that session out until the
//! exchange is recorded. Distinct sessions never contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::message::{Message, SessionId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionTranscript {
    messages: Vec<Message>,
}

impl SessionTranscript {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }
}

type TranscriptSlot = Arc<AsyncMutex<SessionTranscript>>;

#[derive(Default)]
pub struct SessionHistoryStore {
    sessions: Mutex<HashMap<SessionId, TranscriptSlot>>,
}

impl SessionHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the session's transcript, registering an empty
    /// transcript on first use.
    pub async fn get_or_create(&self, session_id: &SessionId) -> SessionTranscript {
        self.slot(session_id).lock().await.clone()
    }

    pub async fn append(&self, session_id: &SessionId, message: Message) {
        self.slot(session_id).lock().await.push(message);
    }

    /// Takes exclusive ownership of one session until the lease is dropped.
    pub async fn lease(&self, session_id: &SessionId) -> SessionLease {
        let transcript = self.slot(session_id).lock_owned().await;
        SessionLease { session_id: session_id.clone(), transcript }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn slot(&self, session_id: &SessionId) -> TranscriptSlot {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.entry(session_id.clone()).or_default().clone()
    }
}

pub struct SessionLease {
    session_id: SessionId,
    transcript: OwnedMutexGuard<SessionTranscript>,
}

impl SessionLease {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn history(&self) -> &[Message] {
        self.transcript.messages()
    }

    /// Appends a user message and its reply as one unit.
    pub fn record_exchange(&mut self, user: Message, reply: Message) {
        self.transcript.push(user);
        self.transcript.push(reply);
    }
}

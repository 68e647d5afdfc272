use std::sync::Arc;
use std::time::Duration;

use huddle_core::{LlmError, Message, SessionHistoryStore, SessionId};
use tracing::debug;

use crate::llm::ChatModel;

pub const EMPTY_MESSAGE_REPLY: &str =
    "It looks like you mentioned me but didn't ask anything! Try asking a question.";

/// Turns one user message into one reply while keeping the session
/// transcript consistent.
///
/// The session lease is held from reading the history until the exchange is
/// recorded, so two messages for the same session are answered strictly one
/// after the other and each sees the other's exchange in order. Different
/// sessions never wait on each other.
pub struct ChatDispatcher {
    store: Arc<SessionHistoryStore>,
    model: Arc<dyn ChatModel>,
    system_instruction: String,
    timeout: Duration,
}

impl ChatDispatcher {
    pub fn new(
        store: Arc<SessionHistoryStore>,
        model: Arc<dyn ChatModel>,
        system_instruction: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { store, model, system_instruction: system_instruction.into(), timeout }
    }

    pub fn store(&self) -> &Arc<SessionHistoryStore> {
        &self.store
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    /// Whitespace-only input is answered with [`EMPTY_MESSAGE_REPLY`] without
    /// calling the model. A failed or timed out model call leaves the
    /// transcript untouched.
    pub async fn handle(&self, session_id: &SessionId, user_text: &str) -> Result<String, LlmError> {
        let text = user_text.trim();
        if text.is_empty() {
            debug!(event_name = "chat.empty_message", session_id = %session_id, "empty message");
            return Ok(EMPTY_MESSAGE_REPLY.to_string());
        }

        let mut lease = self.store.lease(session_id).await;
        let user = Message::user(text);
        let mut conversation = lease.history().to_vec();
        conversation.push(user.clone());

        let reply = tokio::time::timeout(
            self.timeout,
            self.model.respond(&self.system_instruction, &conversation),
        )
        .await
        .map_err(|_| LlmError::Timeout { secs: self.timeout.as_secs() })??;

        lease.record_exchange(user, Message::assistant(reply.clone()));
        debug!(
            event_name = "chat.exchange_recorded",
            session_id = %session_id,
            transcript_len = conversation.len() + 1,
            "recorded exchange"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use huddle_core::{LlmError, Message, SessionHistoryStore, SessionId};
    use tokio::sync::Mutex;

    use super::{ChatDispatcher, EMPTY_MESSAGE_REPLY};
    use crate::llm::ChatModel;

    #[derive(Default)]
    struct FakeModel {
        seen: Mutex<Vec<(String, Vec<Message>)>>,
        fail: bool,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        async fn respond(&self, system: &str, messages: &[Message]) -> Result<String, LlmError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().await.push((system.to_owned(), messages.to_vec()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(LlmError::Transport("connection refused".to_owned()));
            }
            let last = messages.last().map(Message::content).unwrap_or_default();
            Ok(format!("reply to {last}"))
        }
    }

    fn dispatcher(model: Arc<FakeModel>) -> ChatDispatcher {
        ChatDispatcher::new(
            Arc::new(SessionHistoryStore::new()),
            model,
            "You are a helpful AI assistant.",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn successful_calls_grow_transcript_in_order() {
        let model = Arc::new(FakeModel::default());
        let dispatcher = dispatcher(model.clone());
        let session = SessionId::new("C123");

        for text in ["one", "two", "three"] {
            dispatcher.handle(&session, text).await.expect("reply");
        }

        let transcript = dispatcher.store().get_or_create(&session).await;
        assert_eq!(transcript.len(), 6);
        assert_eq!(
            transcript.messages(),
            &[
                Message::user("one"),
                Message::assistant("reply to one"),
                Message::user("two"),
                Message::assistant("reply to two"),
                Message::user("three"),
                Message::assistant("reply to three"),
            ]
        );
    }

    #[tokio::test]
    async fn model_sees_system_history_and_trimmed_message() {
        let model = Arc::new(FakeModel::default());
        let dispatcher = dispatcher(model.clone());
        let session = SessionId::new("console");

        dispatcher.handle(&session, "hello").await.expect("reply");
        let reply = dispatcher.handle(&session, "  how are you?\n").await.expect("reply");

        assert_eq!(reply, "reply to how are you?");
        let seen = model.seen.lock().await;
        let (system, messages) = &seen[1];
        assert_eq!(system, "You are a helpful AI assistant.");
        assert_eq!(
            messages,
            &vec![
                Message::user("hello"),
                Message::assistant("reply to hello"),
                Message::user("how are you?"),
            ]
        );
    }

    #[tokio::test]
    async fn blank_message_gets_canned_reply_without_model_call() {
        let model = Arc::new(FakeModel::default());
        let dispatcher = dispatcher(model.clone());
        let session = SessionId::new("C123");

        let reply = dispatcher.handle(&session, "   \t").await.expect("reply");

        assert_eq!(reply, EMPTY_MESSAGE_REPLY);
        assert!(model.seen.lock().await.is_empty());
        assert!(dispatcher.store().get_or_create(&session).await.is_empty());
    }

    #[tokio::test]
    async fn failed_call_leaves_transcript_unchanged() {
        let model = Arc::new(FakeModel { fail: true, ..FakeModel::default() });
        let dispatcher = dispatcher(model);
        let session = SessionId::new("C123");

        let error = dispatcher.handle(&session, "hello").await.expect_err("model fails");

        assert!(matches!(error, LlmError::Transport(_)));
        assert!(dispatcher.store().get_or_create(&session).await.is_empty());
    }

    #[tokio::test]
    async fn slow_model_times_out_without_recording() {
        let model = Arc::new(FakeModel { delay: Some(Duration::from_secs(10)), ..FakeModel::default() });
        let dispatcher = ChatDispatcher::new(
            Arc::new(SessionHistoryStore::new()),
            model,
            "system",
            Duration::from_millis(20),
        );
        let session = SessionId::new("C123");

        let error = dispatcher.handle(&session, "hello").await.expect_err("timeout");

        assert_eq!(error, LlmError::Timeout { secs: 0 });
        assert!(dispatcher.store().get_or_create(&session).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_calls_on_one_session_are_serialized() {
        let model = Arc::new(FakeModel { delay: Some(Duration::from_millis(30)), ..FakeModel::default() });
        let dispatcher = Arc::new(dispatcher(model.clone()));
        let session = SessionId::new("thread-1");

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let session = session.clone();
            async move { dispatcher.handle(&session, "first").await }
        });
        let second = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let session = session.clone();
            async move { dispatcher.handle(&session, "second").await }
        });
        first.await.expect("join").expect("reply");
        second.await.expect("join").expect("reply");

        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 1);
        let mut seen_lengths: Vec<usize> =
            model.seen.lock().await.iter().map(|(_, messages)| messages.len()).collect();
        seen_lengths.sort_unstable();
        assert_eq!(seen_lengths, vec![1, 3]);

        let transcript = dispatcher.store().get_or_create(&session).await;
        let messages = transcript.messages();
        assert_eq!(messages.len(), 4);
        for pair in messages.chunks(2) {
            assert_eq!(pair[1].content(), format!("reply to {}", pair[0].content()));
        }
    }

    #[tokio::test]
    async fn different_sessions_proceed_in_parallel() {
        let model = Arc::new(FakeModel { delay: Some(Duration::from_millis(50)), ..FakeModel::default() });
        let dispatcher = Arc::new(dispatcher(model.clone()));

        let handles: Vec<_> = ["C1", "C2"]
            .into_iter()
            .map(|id| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.handle(&SessionId::new(id), "hi").await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("reply");
        }

        assert_eq!(model.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.store().session_count(), 2);
    }
}

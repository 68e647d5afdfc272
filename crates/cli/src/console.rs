use async_trait::async_trait;
use huddle_agent::{serve, ChatDispatcher, EmitError, Inbound, InboundAdapter, Served};
use huddle_core::SessionId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const EXIT_TOKENS: [&str; 2] = ["quit", "exit"];

/// Line-oriented console channel. Every line belongs to the same session.
pub struct ConsoleAdapter<W> {
    session_id: SessionId,
    out: Mutex<W>,
}

impl<W> ConsoleAdapter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(session_id: SessionId, out: W) -> Self {
        Self { session_id, out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    async fn write(&self, text: &str) -> Result<(), EmitError> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W> InboundAdapter for ConsoleAdapter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Event = String;

    fn channel(&self) -> &'static str {
        "console"
    }

    fn extract(&self, line: &String) -> Inbound {
        let text = line.trim();
        if text.is_empty() {
            return Inbound::Ignore;
        }
        if EXIT_TOKENS.iter().any(|token| text.eq_ignore_ascii_case(token)) {
            return Inbound::Exit;
        }
        Inbound::Dispatch { session_id: self.session_id.clone(), text: text.to_owned() }
    }

    async fn emit(&self, _line: &String, reply: &str) -> Result<(), EmitError> {
        self.write(&format!("Assistant: {reply}\n")).await
    }
}

/// Reads lines until EOF or an exit token and answers each one. Lines that
/// are not valid UTF-8 are skipped. Returns how many lines got an answer.
pub async fn run_console<R, W>(
    mut input: R,
    adapter: &ConsoleAdapter<W>,
    dispatcher: &ChatDispatcher,
    banner: &str,
) -> Result<usize, EmitError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    adapter.write(&format!("{banner}\n")).await?;
    let mut buf = Vec::new();
    let mut answered = 0;

    loop {
        adapter.write("You: ").await?;
        buf.clear();
        if input.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim_end_matches(['\n', '\r']).to_owned(),
            Err(error) => {
                debug!(
                    event_name = "cli.console.undecodable_line",
                    valid_up_to = error.valid_up_to(),
                    "skipping input line that is not valid UTF-8"
                );
                continue;
            }
        };
        let correlation_id = Uuid::new_v4().to_string();
        match serve(adapter, dispatcher, &line, &correlation_id).await? {
            Served::Exit => break,
            Served::Replied | Served::Apologized => answered += 1,
            Served::Ignored => {}
        }
    }

    adapter.write("\nGoodbye!\n").await?;
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use huddle_agent::{Inbound, InboundAdapter};
    use huddle_core::SessionId;

    use super::ConsoleAdapter;

    fn adapter() -> ConsoleAdapter<Vec<u8>> {
        ConsoleAdapter::new(SessionId::new("console"), Vec::new())
    }

    #[test]
    fn exit_tokens_are_case_insensitive_and_trimmed() {
        let adapter = adapter();

        for line in ["quit", "EXIT", "  Quit  ", "exit\r"] {
            assert_eq!(adapter.extract(&line.to_owned()), Inbound::Exit, "{line:?}");
        }
        assert_ne!(adapter.extract(&"quitting time".to_owned()), Inbound::Exit);
    }

    #[test]
    fn blank_lines_are_ignored_and_text_is_trimmed() {
        let adapter = adapter();

        assert_eq!(adapter.extract(&"   ".to_owned()), Inbound::Ignore);
        assert_eq!(
            adapter.extract(&"  hello there ".to_owned()),
            Inbound::Dispatch { session_id: SessionId::new("console"), text: "hello there".to_owned() }
        );
    }

    #[tokio::test]
    async fn replies_are_prefixed() {
        let adapter = adapter();

        adapter.emit(&"hello".to_owned(), "hi there").await.expect("emit");

        assert_eq!(String::from_utf8(adapter.into_inner()).expect("utf8"), "Assistant: hi there\n");
    }
}

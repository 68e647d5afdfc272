use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack returned http status {0}")]
    Http(u16),
    #[error("slack rejected the call: {0}")]
    Api(String),
    #[error("slack response could not be read: {0}")]
    MalformedResponse(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    pub ts: String,
}

#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage, SlackApiError>;
}

/// Minimal Slack Web API client: `chat.postMessage` with the bot token.
pub struct SlackWebClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        Ok(Self { http, api_base: DEFAULT_API_BASE.to_owned(), bot_token })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }
}

#[async_trait]
impl MessagePoster for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<PostedMessage, SlackApiError> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&post_message_body(channel, text, thread_ts))
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlackApiError::Http(status.as_u16()));
        }
        let body = response.text().await.map_err(|error| SlackApiError::Transport(error.to_string()))?;
        let posted = parse_post_response(&body)?;
        debug!(channel = %posted.channel, ts = %posted.ts, "posted slack message");
        Ok(posted)
    }
}

fn post_message_body(channel: &str, text: &str, thread_ts: Option<&str>) -> Value {
    let mut body = json!({ "channel": channel, "text": text });
    if let Some(thread_ts) = thread_ts {
        body["thread_ts"] = json!(thread_ts);
    }
    body
}

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

fn parse_post_response(body: &str) -> Result<PostedMessage, SlackApiError> {
    let response: PostMessageResponse = serde_json::from_str(body)
        .map_err(|error| SlackApiError::MalformedResponse(error.to_string()))?;
    if !response.ok {
        return Err(SlackApiError::Api(response.error.unwrap_or_else(|| "unknown_error".to_owned())));
    }
    match (response.channel, response.ts) {
        (Some(channel), Some(ts)) => Ok(PostedMessage { channel, ts }),
        _ => Err(SlackApiError::MalformedResponse("missing channel or ts".to_owned())),
    }
}

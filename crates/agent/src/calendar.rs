//! Google Calendar access for the agent.
//!
//! The client never runs the browser authorization itself. It expects the
//! credential file that a one-time authorization left behind (`token.json` by
//! default) and reads the access token from it; when that token has expired the
//! operator is told to authorize again.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use huddle_core::config::CalendarConfig;
use huddle_core::CalendarError;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::llm::ToolSpec;
use crate::tools::{Tool, ToolError};

/// Upper bound on a single Calendar API request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_LOOKAHEAD_DAYS: u64 = 365;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventStart {
    At(DateTime<FixedOffset>),
    AllDay(NaiveDate),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: EventStart,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timezone: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedEvent {
    pub id: String,
    pub summary: String,
    pub html_link: Option<String>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_upcoming_events(&self, days: u32) -> Result<Vec<CalendarEvent>, CalendarError>;
    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent, CalendarError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}

pub fn render_event_list(events: &[CalendarEvent]) -> String {
    if events.is_empty() {
        return "No upcoming events found.".to_string();
    }

    let mut output = String::from("Upcoming events:\n");
    for event in events {
        let start = match &event.start {
            EventStart::At(at) => at.format("%Y-%m-%d %H:%M").to_string(),
            EventStart::AllDay(date) => format!("{} 00:00", date.format("%Y-%m-%d")),
        };
        let _ = writeln!(output, "- {start} - {}", event.summary);
    }
    output
}

pub fn render_created(event: &CreatedEvent) -> String {
    format!(
        "Event created: {} - Link: {}",
        event.summary,
        event.html_link.as_deref().unwrap_or("(no link)")
    )
}

pub fn render_deleted(event_id: &str) -> String {
    format!("Event ID: {event_id} deleted successfully.")
}

pub fn render_not_found(event_id: &str) -> String {
    format!("Event ID: {event_id} not found.")
}

/// Shape of the credential file. Both the `token` key written by the Google
/// client libraries and the plain OAuth `access_token` key are accepted.
#[derive(Deserialize)]
struct StoredToken {
    #[serde(alias = "access_token")]
    token: String,
    #[serde(default)]
    expiry: Option<DateTime<Utc>>,
}

struct AccessToken {
    value: SecretString,
    expiry: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn load(path: &Path) -> Result<Self, CalendarError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                CalendarError::MissingCredentials(path.to_path_buf())
            } else {
                CalendarError::InvalidCredentials {
                    path: path.to_path_buf(),
                    message: error.to_string(),
                }
            }
        })?;
        let stored: StoredToken = serde_json::from_str(&raw).map_err(|error| {
            CalendarError::InvalidCredentials { path: path.to_path_buf(), message: error.to_string() }
        })?;
        if stored.token.trim().is_empty() {
            return Err(CalendarError::InvalidCredentials {
                path: path.to_path_buf(),
                message: "access token is empty".to_string(),
            });
        }

        Ok(Self { value: stored.token.into(), expiry: stored.expiry })
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    api_base: Url,
    calendar_id: String,
    max_results: u32,
    token_path: PathBuf,
    token: AccessToken,
}

impl GoogleCalendarClient {
    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let token = AccessToken::load(&config.token_path)?;
        let api_base = Url::parse(&config.api_base_url).map_err(|error| {
            CalendarError::Transport(format!(
                "calendar api base url `{}` is invalid: {error}",
                config.api_base_url
            ))
        })?;
        if api_base.cannot_be_a_base() {
            return Err(CalendarError::Transport(format!(
                "calendar api base url `{}` cannot carry a path",
                config.api_base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| CalendarError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            api_base,
            calendar_id: config.calendar_id.clone(),
            max_results: config.max_results,
            token_path: config.token_path.clone(),
            token,
        })
    }

    fn events_url(&self, trailing: &[&str]) -> Result<Url, CalendarError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| CalendarError::Transport("calendar api base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("calendars")
            .push(&self.calendar_id)
            .push("events")
            .extend(trailing);
        Ok(url)
    }

    fn bearer(&self) -> Result<&str, CalendarError> {
        if self.token.is_expired_at(Utc::now()) {
            return Err(CalendarError::ExpiredCredentials(self.token_path.clone()));
        }
        Ok(self.token.value.expose_secret())
    }

    fn failure(&self, status: u16, body: &str) -> CalendarError {
        if status == 401 {
            return CalendarError::ExpiredCredentials(self.token_path.clone());
        }
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());
        CalendarError::Api { status, message }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String), CalendarError> {
        let response = request
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(|error| CalendarError::Transport(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| CalendarError::Transport(error.to_string()))?;
        Ok((status, body))
    }
}

#[derive(Deserialize)]
struct WireEventList {
    #[serde(default)]
    items: Vec<WireEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    start: WireEventTime,
    #[serde(default)]
    html_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEventTime {
    #[serde(default)]
    date_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl WireEvent {
    fn into_event(self) -> Result<CalendarEvent, CalendarError> {
        let start = match (self.start.date_time, self.start.date) {
            (Some(at), _) => EventStart::At(at),
            (None, Some(date)) => EventStart::AllDay(date),
            (None, None) => {
                return Err(CalendarError::Api {
                    status: 200,
                    message: format!("event `{}` has no start time", self.id),
                })
            }
        };
        Ok(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_else(|| "(no title)".to_string()),
            start,
        })
    }
}

fn parse_event_list(body: &str) -> Result<Vec<CalendarEvent>, CalendarError> {
    let list: WireEventList = serde_json::from_str(body).map_err(|error| CalendarError::Api {
        status: 200,
        message: format!("unreadable event list: {error}"),
    })?;
    list.items.into_iter().map(WireEvent::into_event).collect()
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn list_upcoming_events(&self, days: u32) -> Result<Vec<CalendarEvent>, CalendarError> {
        let now = Utc::now();
        let until = now + chrono::Duration::days(i64::from(days));
        let mut url = self.events_url(&[])?;
        url.query_pairs_mut()
            .append_pair("timeMin", &now.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("timeMax", &until.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("maxResults", &self.max_results.to_string())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let (status, body) = self.send(self.http.get(url)).await?;
        if !(200..300).contains(&status) {
            return Err(self.failure(status, &body));
        }

        let events = parse_event_list(&body)?;
        info!(
            event_name = "calendar.events.listed",
            calendar_id = %self.calendar_id,
            days,
            count = events.len(),
            "listed upcoming calendar events"
        );
        Ok(events)
    }

    async fn create_event(&self, event: &NewEvent) -> Result<CreatedEvent, CalendarError> {
        let url = self.events_url(&[])?;
        let payload = json!({
            "summary": event.summary,
            "start": {
                "dateTime": event.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.timezone,
            },
            "end": {
                "dateTime": event.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.timezone,
            },
        });

        let (status, body) = self.send(self.http.post(url).json(&payload)).await?;
        if !(200..300).contains(&status) {
            return Err(self.failure(status, &body));
        }

        let created: WireEvent = serde_json::from_str(&body).map_err(|error| CalendarError::Api {
            status,
            message: format!("unreadable created event: {error}"),
        })?;
        info!(
            event_name = "calendar.event.created",
            event_id = %created.id,
            link = created.html_link.as_deref().unwrap_or_default(),
            "created calendar event"
        );
        Ok(CreatedEvent {
            id: created.id,
            summary: created.summary.unwrap_or_else(|| event.summary.clone()),
            html_link: created.html_link,
        })
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        let url = self.events_url(&[event_id])?;
        let (status, body) = self.send(self.http.delete(url)).await?;
        match status {
            200..=299 => {
                info!(event_name = "calendar.event.deleted", event_id, "deleted calendar event");
                Ok(())
            }
            404 | 410 => {
                warn!(event_name = "calendar.event.missing", event_id, "event not found for deletion");
                Err(CalendarError::EventNotFound(event_id.to_string()))
            }
            _ => Err(self.failure(status, &body)),
        }
    }
}

fn invalid(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments { tool: tool.to_string(), message: message.into() }
}

fn parse_local_time(tool: &str, field: &str, value: &str) -> Result<NaiveDateTime, ToolError> {
    value.trim().parse::<NaiveDateTime>().map_err(|error| {
        invalid(tool, format!("`{field}` must look like 2024-06-15T10:00:00 ({error})"))
    })
}

pub struct ListCalendarEventsTool {
    service: Arc<dyn CalendarService>,
    default_days: u32,
}

impl ListCalendarEventsTool {
    pub const NAME: &'static str = "get_calendar_events";

    pub fn new(service: Arc<dyn CalendarService>, default_days: u32) -> Self {
        Self { service, default_days }
    }
}

#[async_trait]
impl Tool for ListCalendarEventsTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Get upcoming calendar events for the next specified number of days"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "days": {
                        "type": "integer",
                        "description": "How many days ahead to look",
                        "default": self.default_days,
                    },
                },
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<String, ToolError> {
        let days = match input.get("days") {
            None | Some(Value::Null) => u64::from(self.default_days),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| invalid(Self::NAME, "`days` must be a positive integer"))?,
        };
        if !(1..=MAX_LOOKAHEAD_DAYS).contains(&days) {
            return Err(invalid(Self::NAME, format!("`days` must be between 1 and {MAX_LOOKAHEAD_DAYS}")));
        }

        let events = self.service.list_upcoming_events(days as u32).await?;
        Ok(render_event_list(&events))
    }
}

#[derive(Deserialize)]
struct CreateEventArgs {
    summary: String,
    start_time: String,
    end_time: String,
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

pub struct CreateCalendarEventTool {
    service: Arc<dyn CalendarService>,
}

impl CreateCalendarEventTool {
    pub const NAME: &'static str = "create_calendar_event";

    pub fn new(service: Arc<dyn CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for CreateCalendarEventTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Create an event on the user's calendar".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "Event title" },
                    "start_time": { "type": "string", "description": "Start, e.g. 2024-06-15T10:00:00" },
                    "end_time": { "type": "string", "description": "End, e.g. 2024-06-15T11:00:00" },
                    "timezone": { "type": "string", "description": "IANA time zone name", "default": "UTC" },
                },
                "required": ["summary", "start_time", "end_time"],
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<String, ToolError> {
        let args: CreateEventArgs =
            serde_json::from_value(input).map_err(|error| invalid(Self::NAME, error.to_string()))?;
        if args.summary.trim().is_empty() {
            return Err(invalid(Self::NAME, "`summary` must not be empty"));
        }
        let start = parse_local_time(Self::NAME, "start_time", &args.start_time)?;
        let end = parse_local_time(Self::NAME, "end_time", &args.end_time)?;
        if end <= start {
            return Err(invalid(Self::NAME, "`end_time` must be after `start_time`"));
        }

        let created = self
            .service
            .create_event(&NewEvent {
                summary: args.summary.trim().to_string(),
                start,
                end,
                timezone: args.timezone,
            })
            .await?;
        Ok(render_created(&created))
    }
}

#[derive(Deserialize)]
struct DeleteEventArgs {
    event_id: String,
}

pub struct DeleteCalendarEventTool {
    service: Arc<dyn CalendarService>,
}

impl DeleteCalendarEventTool {
    pub const NAME: &'static str = "delete_calendar_event";

    pub fn new(service: Arc<dyn CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for DeleteCalendarEventTool {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Delete an event from the user's calendar by its id".to_string(),
            parameters: json!({
                "type": "object",
                "properties": { "event_id": { "type": "string" } },
                "required": ["event_id"],
            }),
        }
    }

    async fn execute(&self, input: Value) -> Result<String, ToolError> {
        let args: DeleteEventArgs =
            serde_json::from_value(input).map_err(|error| invalid(Self::NAME, error.to_string()))?;
        let event_id = args.event_id.trim();
        if event_id.is_empty() {
            return Err(invalid(Self::NAME, "`event_id` must not be empty"));
        }

        match self.service.delete_event(event_id).await {
            Ok(()) => Ok(render_deleted(event_id)),
            Err(CalendarError::EventNotFound(_)) => Ok(render_not_found(event_id)),
            Err(error) => Err(error.into()),
        }
    }
}

//! Slack Web API client.
//!
//! Blocking and sequential by design: pagination loops and the CLI's bulk
//! snapshot issue one request at a time to keep rate-limit pressure down.
//! Every remote call goes through a single retry loop that backs off
//! linearly on a rate-limit failure, scaled by the server's own Retry-After
//! hint, and aborts immediately on anything else.

mod entities;

pub use entities::{AuthInfo, Channel, File, Message, Reaction, User, UserProfile};

use crate::credentials::WorkspaceCredentials;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Retries after the first attempt (4 attempts total).
const MAX_RETRIES: u32 = 3;

/// Page size for cursor-paginated list calls.
const PAGE_LIMIT: &str = "200";

/// Failure classification inside the retry loop.
#[derive(Debug)]
enum CallError {
    /// HTTP 429, or an in-band `ratelimited` error code. Carries the
    /// server's Retry-After hint in seconds when one was given.
    RateLimited { retry_after: Option<u64> },
    /// `ok: false` with a remote error code.
    Api { code: String },
    /// Connection, timeout or body-decode failure.
    Transport(reqwest::Error),
}

impl CallError {
    fn into_error(self) -> Error {
        match self {
            CallError::RateLimited { .. } => Error::Api {
                code: "ratelimited".to_string(),
                source: None,
            },
            CallError::Api { code } => Error::Api { code, source: None },
            CallError::Transport(e) => Error::Api {
                code: "request_failed".to_string(),
                source: Some(e),
            },
        }
    }
}

/// The one retry loop every remote call runs in. Rate-limit failures sleep
/// `(hint_secs or 1) * 1000 * (attempt + 1)` milliseconds and retry, up to
/// `MAX_RETRIES` times; any other failure aborts on the spot. The sleep is
/// injected so tests run without waiting.
fn with_retry_using<T, F, S>(mut op: F, mut sleep: S) -> Result<T>
where
    F: FnMut() -> std::result::Result<T, CallError>,
    S: FnMut(Duration),
{
    let mut attempt: u32 = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(CallError::RateLimited { retry_after }) if attempt < MAX_RETRIES => {
                let delay_ms = retry_after.unwrap_or(1) * 1000 * u64::from(attempt + 1);
                warn!(
                    "rate limited, retrying in {}ms (retry {}/{})",
                    delay_ms,
                    attempt + 1,
                    MAX_RETRIES
                );
                sleep(Duration::from_millis(delay_ms));
                attempt += 1;
            }
            Err(e) => return Err(e.into_error()),
        }
    }
}

fn with_retry<T, F>(op: F) -> Result<T>
where
    F: FnMut() -> std::result::Result<T, CallError>,
{
    with_retry_using(op, std::thread::sleep)
}

/// Cursor loop: issue requests until the response metadata stops carrying a
/// next cursor, accumulating every page in memory before returning. No
/// partial results are exposed.
fn paginate<T, F>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<&str>) -> Result<(Vec<T>, Option<String>)>,
{
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let (mut page, next) = fetch(cursor.as_deref())?;
        all.append(&mut page);
        match next {
            Some(c) if !c.is_empty() => cursor = Some(c),
            _ => return Ok(all),
        }
    }
}

/// Options for history-style calls.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Cap on the number of messages returned; None fetches everything.
    pub limit: Option<u64>,
    /// Only messages after this timestamp.
    pub oldest: Option<String>,
    /// Only messages before this timestamp.
    pub latest: Option<String>,
}

/// Typed, retrying, paginating client for one workspace.
pub struct SlackClient {
    http: reqwest::blocking::Client,
    token: String,
    cookie: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(creds: &WorkspaceCredentials) -> Result<Self> {
        Self::with_base_url(creds, DEFAULT_BASE_URL)
    }

    /// Base URL override for tests and API-compatible proxies.
    pub fn with_base_url(creds: &WorkspaceCredentials, base_url: &str) -> Result<Self> {
        if creds.token.is_empty() {
            return Err(Error::MissingCredential("token"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Api {
                code: "client_init_failed".to_string(),
                source: Some(e),
            })?;
        Ok(Self {
            http,
            token: creds.token.clone(),
            cookie: creds.cookie.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// One underlying request: POST form to `<base>/<method>`, classify the
    /// outcome. The success flag is checked before any field is read.
    fn call_once(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Value, CallError> {
        let url = format!("{}/{}", self.base_url, method);
        debug!("POST {} ({} params)", url, params.len());

        let mut req = self.http.post(&url).bearer_auth(&self.token).form(params);
        if !self.cookie.is_empty() {
            req = req.header(reqwest::header::COOKIE, format!("d={}", self.cookie));
        }

        let resp = req.send().map_err(CallError::Transport)?;

        if resp.status().as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(CallError::RateLimited { retry_after });
        }

        let body: Value = resp.json().map_err(CallError::Transport)?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            // Slack can also signal rate limiting in-band.
            if code == "ratelimited" {
                return Err(CallError::RateLimited { retry_after: None });
            }
            return Err(CallError::Api { code });
        }

        Ok(body)
    }

    /// Call with the standard retry loop.
    fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value> {
        with_retry(|| self.call_once(method, params))
    }

    /// Identity check for the stored token + cookie pair.
    pub fn auth_test(&self) -> Result<AuthInfo> {
        let body = self.call("auth.test", &[])?;
        Ok(serde_json::from_value(body)?)
    }

    /// All conversations of the given types visible to the token.
    pub fn list_channels(&self, types: &str) -> Result<Vec<Channel>> {
        paginate(|cursor| {
            let mut params = vec![
                ("types", types.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("exclude_archived", "false".to_string()),
            ];
            if let Some(c) = cursor {
                params.push(("cursor", c.to_string()));
            }
            let body = self.call("conversations.list", &params)?;
            Ok((list_field(&body, "channels")?, next_cursor(&body)))
        })
    }

    /// Message history for a channel, newest first as the API returns it.
    pub fn channel_history(&self, channel: &str, opts: &HistoryOptions) -> Result<Vec<Message>> {
        let limit = opts.limit;
        let mut seen: u64 = 0;
        let mut messages = paginate(|cursor| {
            let mut params = vec![
                ("channel", channel.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(oldest) = &opts.oldest {
                params.push(("oldest", oldest.clone()));
            }
            if let Some(latest) = &opts.latest {
                params.push(("latest", latest.clone()));
            }
            if let Some(c) = cursor {
                params.push(("cursor", c.to_string()));
            }
            let body = self.call("conversations.history", &params)?;
            let page: Vec<Message> = list_field(&body, "messages")?;
            seen += page.len() as u64;
            let next = match limit {
                Some(max) if seen >= max => None,
                _ => next_cursor(&body),
            };
            Ok((page, next))
        })?;
        if let Some(max) = limit {
            messages.truncate(max as usize);
        }
        Ok(messages)
    }

    /// All replies in a thread, parent message included.
    pub fn thread_replies(&self, channel: &str, ts: &str) -> Result<Vec<Message>> {
        paginate(|cursor| {
            let mut params = vec![
                ("channel", channel.to_string()),
                ("ts", ts.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(c) = cursor {
                params.push(("cursor", c.to_string()));
            }
            let body = self.call("conversations.replies", &params)?;
            Ok((list_field(&body, "messages")?, next_cursor(&body)))
        })
    }

    /// Post a message, optionally into a thread. Returns the posted message.
    pub fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<Message> {
        let mut params = vec![
            ("channel", channel.to_string()),
            ("text", text.to_string()),
        ];
        if let Some(ts) = thread_ts {
            params.push(("thread_ts", ts.to_string()));
        }
        let body = self.call("chat.postMessage", &params)?;

        let mut message: Message = match body.get("message") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Message::default(),
        };
        // chat.postMessage repeats ts and channel at the top level; the
        // nested message does not always carry the channel.
        if message.ts.is_empty() {
            if let Some(ts) = body.get("ts").and_then(Value::as_str) {
                message.ts = ts.to_string();
            }
        }
        if message.channel.is_empty() {
            if let Some(ch) = body.get("channel").and_then(Value::as_str) {
                message.channel = ch.to_string();
            }
        }
        Ok(message)
    }

    /// Search messages. The search endpoint pages by number rather than
    /// cursor; one page of up to `count` matches is returned.
    pub fn search_messages(&self, query: &str, count: u64) -> Result<Vec<Message>> {
        let params = vec![("query", query.to_string()), ("count", count.to_string())];
        let body = self.call("search.messages", &params)?;
        match body.get("messages").and_then(|m| m.get("matches")) {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Ok(Vec::new()),
        }
    }

    /// Every member of the workspace.
    pub fn list_users(&self) -> Result<Vec<User>> {
        paginate(|cursor| {
            let mut params = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(c) = cursor {
                params.push(("cursor", c.to_string()));
            }
            let body = self.call("users.list", &params)?;
            Ok((list_field(&body, "members")?, next_cursor(&body)))
        })
    }

    pub fn user_info(&self, user: &str) -> Result<User> {
        let body = self.call("users.info", &[("user", user.to_string())])?;
        match body.get("user") {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Ok(User::default()),
        }
    }

    /// Files, optionally filtered by channel or user. files.list pages by
    /// number; one page of up to `count` entries is returned.
    pub fn list_files(
        &self,
        channel: Option<&str>,
        user: Option<&str>,
        count: u64,
    ) -> Result<Vec<File>> {
        let mut params = vec![("count", count.to_string())];
        if let Some(ch) = channel {
            params.push(("channel", ch.to_string()));
        }
        if let Some(u) = user {
            params.push(("user", u.to_string()));
        }
        let body = self.call("files.list", &params)?;
        list_field(&body, "files")
    }
}

/// A list field from a checked response body; an absent field is an empty
/// list, not an error.
fn list_field<T: DeserializeOwned>(body: &Value, key: &str) -> Result<Vec<T>> {
    match body.get(key) {
        Some(v) => Ok(serde_json::from_value(v.clone())?),
        None => Ok(Vec::new()),
    }
}

/// The cursor for the next page, if the response carries a non-empty one.
fn next_cursor(body: &Value) -> Option<String> {
    body.get("response_metadata")
        .and_then(|m| m.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

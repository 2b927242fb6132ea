use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schedule::ReminderEvent;

/// Graph path that creates an event in the signed-in user's default calendar.
pub const CREATE_EVENT_PATH: &str = "/me/calendar/events";

/// Maximum number of sub-requests Graph accepts in one `$batch` call.
pub const MAX_BATCH_SIZE: usize = 20;

/// One sub-request inside a Graph `$batch` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: ReminderEvent,
}

impl BatchRequest {
    /// A `POST /me/calendar/events` sub-request for `event`.
    pub fn create_event(id: impl Into<String>, event: ReminderEvent) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            id: id.into(),
            method: "POST".to_string(),
            url: CREATE_EVENT_PATH.to_string(),
            headers,
            body: event,
        }
    }
}

/// Outcome of one sub-request, as returned by `$batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl ItemResult {
    pub fn new(id: impl Into<String>, status: u16) -> Self {
        Self {
            id: id.into(),
            status,
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequestBody<'a> {
    pub requests: &'a [BatchRequest],
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponseBody {
    #[serde(default)]
    pub responses: Vec<ItemResult>,
}

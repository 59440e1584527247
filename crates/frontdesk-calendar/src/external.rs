//! HTTP-backed calendar provider.
//!
//! Talks to an OAuth-protected calendar API: the per-tenant binding holds
//! an `enc:v1:` blob whose plaintext is the bearer token. Every request
//! carries a 15-second deadline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use frontdesk_core::secretbox;
use frontdesk_core::types::CalendarBinding;

use crate::provider::{BusyRange, CalendarError, CalendarEvent, CalendarProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ExternalCalendar {
    client: reqwest::Client,
    base_url: String,
    /// Raw key for decrypting binding credentials.
    encryption_key: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    busy: Vec<FreeBusyEntry>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyEntry {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    /// "transparent" events do not block time.
    #[serde(default)]
    transparency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateEventResponse {
    id: String,
}

impl ExternalCalendar {
    pub fn new(base_url: &str, encryption_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            encryption_key: encryption_key.to_string(),
        }
    }

    fn bearer(&self, binding: &CalendarBinding) -> Result<String, CalendarError> {
        secretbox::decrypt_secret(&self.encryption_key, &binding.credential)
            .map_err(|e| CalendarError::Auth(e.to_string()))
    }
}

#[async_trait]
impl CalendarProvider for ExternalCalendar {
    fn name(&self) -> &str {
        "external"
    }

    async fn get_busy_ranges(
        &self,
        binding: &CalendarBinding,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BusyRange>, CalendarError> {
        let token = self.bearer(binding)?;
        let url = format!("{}/calendars/{}/freebusy", self.base_url, binding.calendar_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "timeMin": from.to_rfc3339(),
                "timeMax": to.to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| CalendarError::Read(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CalendarError::Auth(format!("freebusy returned {status}")));
        }
        if !status.is_success() {
            return Err(CalendarError::Read(format!("freebusy returned {status}")));
        }

        let body: FreeBusyResponse = resp
            .json()
            .await
            .map_err(|e| CalendarError::Read(e.to_string()))?;

        let ranges: Vec<BusyRange> = body
            .busy
            .into_iter()
            .filter(|e| e.transparency.as_deref() != Some("transparent"))
            .map(|e| BusyRange {
                start: e.start,
                end: e.end,
            })
            .collect();

        debug!(calendar = %binding.calendar_id, count = ranges.len(), "busy ranges fetched");
        Ok(ranges)
    }

    async fn create_event(
        &self,
        binding: &CalendarBinding,
        event: &CalendarEvent,
    ) -> Result<String, CalendarError> {
        let token = self.bearer(binding)?;
        let url = format!("{}/calendars/{}/events", self.base_url, binding.calendar_id);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "summary": event.summary,
                "description": event.description,
                "start": event.start.to_rfc3339(),
                "end": event.end.to_rfc3339(),
            }))
            .send()
            .await
            .map_err(|e| CalendarError::Write(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CalendarError::Write(format!(
                "event create returned {}",
                resp.status()
            )));
        }

        let body: CreateEventResponse = resp
            .json()
            .await
            .map_err(|e| CalendarError::Write(e.to_string()))?;
        Ok(body.id)
    }

    async fn delete_event(
        &self,
        binding: &CalendarBinding,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let token = self.bearer(binding)?;
        let url = format!(
            "{}/calendars/{}/events/{}",
            self.base_url, binding.calendar_id, event_id
        );

        let resp = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CalendarError::Write(e.to_string()))?;

        // A 404 means the event is already gone — treat as success.
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            warn!(event_id, status = %resp.status(), "event delete failed");
            return Err(CalendarError::Write(format!(
                "event delete returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

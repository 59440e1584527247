//! Carrier API client.
//!
//! Real mode POSTs form-encoded bodies with basic auth; simulator mode
//! (credentials absent) logs and fabricates a `SIM_*` SID so the outbox
//! and audit trail behave identically either way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use frontdesk_core::config::CarrierConfig;
use frontdesk_core::mask::phone_last4;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Buckets the worker uses for audit and retry accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierErrorCategory {
    Network,
    RateLimit,
    OptOut,
    InvalidNumber,
    AuthFailure,
    Undelivered,
    Blocked,
    Simulator,
    Unknown,
}

impl CarrierErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierErrorCategory::Network => "network",
            CarrierErrorCategory::RateLimit => "rate_limit",
            CarrierErrorCategory::OptOut => "opt_out",
            CarrierErrorCategory::InvalidNumber => "invalid_number",
            CarrierErrorCategory::AuthFailure => "auth_failure",
            CarrierErrorCategory::Undelivered => "undelivered",
            CarrierErrorCategory::Blocked => "blocked",
            CarrierErrorCategory::Simulator => "simulator",
            CarrierErrorCategory::Unknown => "unknown",
        }
    }
}

/// Map a carrier numeric error code to a category.
///
/// Codes follow the de-facto carrier convention: 21211 invalid number,
/// 21610 opted out, 20003/20005 auth, 20429/88xxx throttling, 30007
/// filtered, 30008 undelivered.
pub fn categorize_error_code(code: &str) -> CarrierErrorCategory {
    match code {
        "21211" | "21614" | "30006" => CarrierErrorCategory::InvalidNumber,
        "21610" => CarrierErrorCategory::OptOut,
        "20003" | "20005" => CarrierErrorCategory::AuthFailure,
        "20429" | "88001" => CarrierErrorCategory::RateLimit,
        "30007" => CarrierErrorCategory::Blocked,
        "30008" | "30005" => CarrierErrorCategory::Undelivered,
        _ => CarrierErrorCategory::Unknown,
    }
}

#[derive(Debug, thiserror::Error)]
#[error("carrier send failed ({category:?}): {message}")]
pub struct CarrierSendError {
    pub category: CarrierErrorCategory,
    /// Carrier-reported numeric code, when present.
    pub error_code: Option<String>,
    pub message: String,
}

/// Successful send result.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub sid: String,
    pub simulated: bool,
}

/// Outbound SMS capability. One implementation is selected at startup.
#[async_trait]
pub trait SmsSender: Send + Sync {
    fn name(&self) -> &str;

    fn is_simulator(&self) -> bool {
        false
    }

    async fn send(&self, to: &str, body: &str) -> Result<SendOutcome, CarrierSendError>;
}

/// Credentials present selects the real client; absent selects the
/// simulator.
pub fn carrier_from_config(config: Option<&CarrierConfig>) -> Arc<dyn SmsSender> {
    match config {
        Some(c) if !c.account_sid.is_empty() && !c.auth_token.is_empty() => {
            Arc::new(HttpCarrier::new(c.clone()))
        }
        _ => {
            info!("carrier credentials absent, SMS runs in simulator mode");
            Arc::new(SimulatorCarrier)
        }
    }
}

/// Carrier-less branch that behaves observably like success without
/// delivering anything.
pub struct SimulatorCarrier;

#[async_trait]
impl SmsSender for SimulatorCarrier {
    fn name(&self) -> &str {
        "simulator"
    }

    fn is_simulator(&self) -> bool {
        true
    }

    async fn send(&self, to: &str, body: &str) -> Result<SendOutcome, CarrierSendError> {
        info!(
            to_last4 = %phone_last4(to),
            chars = body.len(),
            "simulated SMS send"
        );
        Ok(SendOutcome {
            sid: format!("SIM_{}", Uuid::new_v4().simple()),
            simulated: true,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CarrierApiResponse {
    sid: Option<String>,
    code: Option<serde_json::Value>,
    message: Option<String>,
}

pub struct HttpCarrier {
    client: reqwest::Client,
    config: CarrierConfig,
}

impl HttpCarrier {
    pub fn new(config: CarrierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .expect("reqwest client build");
        Self { client, config }
    }
}

#[async_trait]
impl SmsSender for HttpCarrier {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, to: &str, body: &str) -> Result<SendOutcome, CarrierSendError> {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or("https://api.carrier.example")
            .trim_end_matches('/');
        let url = format!("{base}/Accounts/{}/Messages.json", self.config.account_sid);

        let form = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| CarrierSendError {
                category: CarrierErrorCategory::Network,
                error_code: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        let parsed: CarrierApiResponse = resp.json().await.unwrap_or(CarrierApiResponse {
            sid: None,
            code: None,
            message: None,
        });

        if status.is_success() {
            let sid = parsed.sid.ok_or_else(|| CarrierSendError {
                category: CarrierErrorCategory::Unknown,
                error_code: None,
                message: "carrier response missing sid".into(),
            })?;
            debug!(sid_last4 = %frontdesk_core::mask::sid_last4(&sid), "carrier accepted message");
            return Ok(SendOutcome {
                sid,
                simulated: false,
            });
        }

        let error_code = parsed.code.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        let category = match status.as_u16() {
            401 | 403 => CarrierErrorCategory::AuthFailure,
            429 => CarrierErrorCategory::RateLimit,
            _ => error_code
                .as_deref()
                .map(categorize_error_code)
                .unwrap_or(CarrierErrorCategory::Unknown),
        };
        Err(CarrierSendError {
            category,
            error_code,
            message: parsed
                .message
                .unwrap_or_else(|| format!("carrier returned {status}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulator_fabricates_sid() {
        let client = carrier_from_config(None);
        assert!(client.is_simulator());
        let out = client.send("+15551234567", "hi").await.unwrap();
        assert!(out.sid.starts_with("SIM_"));
        assert!(out.simulated);
    }

    #[test]
    fn empty_credentials_select_simulator() {
        let cfg = CarrierConfig::default();
        assert!(carrier_from_config(Some(&cfg)).is_simulator());
    }

    #[test]
    fn error_code_categories() {
        assert_eq!(
            categorize_error_code("21211"),
            CarrierErrorCategory::InvalidNumber
        );
        assert_eq!(categorize_error_code("21610"), CarrierErrorCategory::OptOut);
        assert_eq!(
            categorize_error_code("20003"),
            CarrierErrorCategory::AuthFailure
        );
        assert_eq!(
            categorize_error_code("30008"),
            CarrierErrorCategory::Undelivered
        );
        assert_eq!(categorize_error_code("99999"), CarrierErrorCategory::Unknown);
    }
}

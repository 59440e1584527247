use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{FrontdeskError, Result};

/// Top-level config (frontdesk.toml + FRONTDESK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FrontdeskConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub followup: FollowupConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Process-wide HMAC secret for session tokens. Mandatory at startup.
    pub signing_secret: Option<String>,
    /// Fail-closed session-token enforcement on the SDK surface.
    #[serde(default)]
    pub sdk_required: bool,
    /// Raw key for the calendar-credential secretbox. Falls back to the
    /// signing secret when unset.
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalendarMode {
    Real,
    #[default]
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub mode: CalendarMode,
    /// Strict (true) vs lenient (false) availability when the provider fails.
    #[serde(default = "bool_true")]
    pub read_required: bool,
    #[serde(default = "default_busy_cache_ttl")]
    pub busy_cache_ttl_seconds: u64,
    /// Base URL of the external calendar API (real mode).
    pub api_base_url: Option<String>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            mode: CalendarMode::Mock,
            read_required: true,
            busy_cache_ttl_seconds: default_busy_cache_ttl(),
            api_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Slots further out than this need an explicit far-date confirmation.
    #[serde(default = "default_far_date_days")]
    pub far_date_confirm_days: i64,
    /// Hard cap on a single check_availability range.
    #[serde(default = "default_max_range_days")]
    pub max_availability_range_days: i64,
    #[serde(default = "default_hold_ttl_minutes")]
    pub hold_ttl_minutes: i64,
    /// Hold-expiry sweep cadence.
    #[serde(default = "default_hold_cleanup_interval_ms")]
    pub hold_cleanup_interval_ms: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            far_date_confirm_days: default_far_date_days(),
            max_availability_range_days: default_max_range_days(),
            hold_ttl_minutes: default_hold_ttl_minutes(),
            hold_cleanup_interval_ms: default_hold_cleanup_interval_ms(),
        }
    }
}

/// Carrier credentials. Absent credentials select simulator mode.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CarrierConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub carrier: Option<CarrierConfig>,
    #[serde(default = "default_sms_batch")]
    pub batch_size: u32,
    #[serde(default = "default_sms_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_sms_poll_ms")]
    pub poll_interval_ms: u64,
    /// Per-phone sends allowed per rolling hour.
    #[serde(default = "default_sms_rate_per_hour")]
    pub rate_limit_per_hour: u32,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            carrier: None,
            batch_size: default_sms_batch(),
            max_attempts: default_sms_max_attempts(),
            poll_interval_ms: default_sms_poll_ms(),
            rate_limit_per_hour: default_sms_rate_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupConfig {
    #[serde(default = "default_followup_max")]
    pub max_per_booking: u32,
    #[serde(default = "default_followup_cooldown")]
    pub cooldown_minutes: i64,
}

impl Default for FollowupConfig {
    fn default() -> Self {
        Self {
            max_per_booking: default_followup_max(),
            cooldown_minutes: default_followup_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_otp_ttl")]
    pub ttl_minutes: i64,
    /// OTP issuances allowed per destination per hour.
    #[serde(default = "default_otp_rate")]
    pub rate_limit: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_otp_ttl(),
            rate_limit: default_otp_rate(),
        }
    }
}

/// Capability master switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default = "bool_true")]
    pub sms: bool,
    #[serde(default)]
    pub voice: bool,
    #[serde(default)]
    pub voice_web: bool,
    #[serde(default = "bool_true")]
    pub calendar_booking: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            sms: true,
            voice: false,
            voice_web: false,
            calendar_booking: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

/// Deployment stage. Webhook signature validation fails closed outside Dev.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Pilot,
    Production,
}

fn bool_true() -> bool {
    true
}
fn default_busy_cache_ttl() -> u64 {
    30
}
fn default_far_date_days() -> i64 {
    30
}
fn default_max_range_days() -> i64 {
    14
}
fn default_hold_ttl_minutes() -> i64 {
    5
}
fn default_hold_cleanup_interval_ms() -> u64 {
    60_000
}
fn default_sms_batch() -> u32 {
    10
}
fn default_sms_max_attempts() -> u32 {
    3
}
fn default_sms_poll_ms() -> u64 {
    5_000
}
fn default_sms_rate_per_hour() -> u32 {
    6
}
fn default_followup_max() -> u32 {
    3
}
fn default_followup_cooldown() -> i64 {
    30
}
fn default_otp_ttl() -> i64 {
    10
}
fn default_otp_rate() -> u32 {
    5
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_llm_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.frontdesk/frontdesk.db")
}

impl FrontdeskConfig {
    /// Load config from a TOML file with FRONTDESK_* env var overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: FrontdeskConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FRONTDESK_").split("_"))
            .extract()
            .map_err(|e| FrontdeskError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Startup invariants. A failure here aborts the process.
    pub fn validate(&self) -> Result<()> {
        if self.auth.signing_secret.is_none() {
            return Err(FrontdeskError::Config(
                "auth.signing_secret is required".into(),
            ));
        }
        if self.database.path.is_empty() {
            return Err(FrontdeskError::Config("database.path is required".into()));
        }
        if self.calendar.mode == CalendarMode::Real && self.calendar.api_base_url.is_none() {
            return Err(FrontdeskError::Config(
                "calendar.api_base_url is required in real mode".into(),
            ));
        }
        Ok(())
    }

    /// Key for the credential secretbox. The signing secret doubles as the
    /// raw key when no dedicated one is configured.
    pub fn encryption_key(&self) -> Option<&str> {
        self.auth
            .encryption_key
            .as_deref()
            .or(self.auth.signing_secret.as_deref())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.frontdesk/frontdesk.toml")
}

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{FrontdeskError, Result};

/// Unique identifier for a tenant (business).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a customer record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The channel a conversation arrives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Sms,
    Voice,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Web => write!(f, "web"),
            Channel::Sms => write!(f, "sms"),
            Channel::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "sms" => Ok(Channel::Sms),
            "voice" => Ok(Channel::Voice),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Governs what the agent accepts as a service description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCatalogMode {
    /// Service must match a catalog entry; unknown descriptions rejected.
    CatalogOnly,
    /// Catalog preferred; unknown descriptions accepted.
    #[default]
    Hybrid,
    /// Any description accepted; catalog is suggestive only.
    FreeText,
}

/// One bookable service offered by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub price_cents: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Open/close for a single weekday, local to the tenant timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Weekly business hours. `None` for a day means closed.
///
/// Indexed Monday = 0 through Sunday = 6.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusinessHours {
    pub days: [Option<DayHours>; 7],
}

impl BusinessHours {
    pub fn for_weekday(&self, weekday: Weekday) -> Option<DayHours> {
        self.days[weekday.num_days_from_monday() as usize]
    }

    /// Monday through Friday, same open/close. Weekend closed.
    pub fn weekdays(open: NaiveTime, close: NaiveTime) -> Self {
        let mut days = [None; 7];
        for slot in days.iter_mut().take(5) {
            *slot = Some(DayHours { open, close });
        }
        Self { days }
    }
}

/// Local quiet-hours window during which no SMS is sent. May cross
/// midnight (e.g. 21:00 → 08:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Whether `local` falls inside the window.
    pub fn contains(&self, local: NaiveTime) -> bool {
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            // Crosses midnight.
            local >= self.start || local < self.end
        }
    }
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        }
    }
}

/// External-calendar binding for a tenant. The credential is an opaque
/// `enc:v1:` blob (see [`crate::secretbox`]), never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarBinding {
    pub calendar_id: String,
    pub credential: String,
}

/// Business profile for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// URL-safe identifier used in widget links and routing.
    pub slug: String,
    pub timezone: Tz,
    pub slot_minutes: u32,
    pub hours: BusinessHours,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub catalog_mode: ServiceCatalogMode,
    #[serde(default)]
    pub calendar: Option<CalendarBinding>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
}

impl Tenant {
    pub fn validate(&self) -> Result<()> {
        if !(5..=480).contains(&self.slot_minutes) {
            return Err(FrontdeskError::InvalidInput(format!(
                "slot duration {} outside 5..=480 minutes",
                self.slot_minutes
            )));
        }
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(FrontdeskError::InvalidInput(format!(
                "slug '{}' is not URL-safe",
                self.slug
            )));
        }
        Ok(())
    }

    /// Case-insensitive catalog lookup by name.
    pub fn find_service(&self, name: &str) -> Option<&ServiceEntry> {
        let needle = name.trim().to_lowercase();
        self.services
            .iter()
            .find(|s| s.name.to_lowercase() == needle)
    }
}

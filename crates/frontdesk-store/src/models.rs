use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use frontdesk_core::types::{Channel, CustomerId, SessionId, TenantId};

/// Epoch milliseconds for SQL comparisons.
pub fn ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub fn from_ms(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Lifecycle state of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

/// A confirmed (or historical) appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub tenant_id: TenantId,
    /// Customer-facing opaque code, `APT-` + base32, unique per tenant.
    pub reference_code: String,
    pub client_name: String,
    pub client_email: String,
    /// E.164. Mandatory from the point of creation onward.
    pub client_phone: String,
    pub service: Option<String>,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    /// IANA zone tag the booking was made in, for display.
    pub timezone: String,
    pub status: AppointmentStatus,
    pub calendar_event_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Short-lived slot reservation for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub id: String,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: String,
}

/// One persisted conversation session. Never deleted (audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub channel: Channel,
    /// Transport-level id: widget visitor id, phone number, call sid.
    pub external_id: String,
    pub customer_id: Option<CustomerId>,
    pub email_verified: bool,
    pub verified_email: Option<String>,
    /// Opaque JSON bag: FSM context, router scratch state.
    pub metadata: serde_json::Value,
    pub message_count: u32,
    pub booking_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// One turn in a session's message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Tenant-scoped customer identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub preferences: serde_json::Value,
    pub booking_count: u32,
    pub last_seen_at: Option<String>,
    pub deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Expired,
}

impl std::fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WaitlistStatus::Waiting => "waiting",
            WaitlistStatus::Notified => "notified",
            WaitlistStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WaitlistStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(WaitlistStatus::Waiting),
            "notified" => Ok(WaitlistStatus::Notified),
            "expired" => Ok(WaitlistStatus::Expired),
            other => Err(format!("unknown waitlist status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: String,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    /// Phone or email to reach the customer on.
    pub contact: String,
    pub service: Option<String>,
    pub preferred_days: Option<String>,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub status: WaitlistStatus,
    pub created_at: String,
}

/// Outbox row lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Aborted,
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Sending => "sending",
            OutboxStatus::Sent => "sent",
            OutboxStatus::Failed => "failed",
            OutboxStatus::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "sending" => Ok(OutboxStatus::Sending),
            "sent" => Ok(OutboxStatus::Sent),
            "failed" => Ok(OutboxStatus::Failed),
            "aborted" => Ok(OutboxStatus::Aborted),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// What an outbound SMS is for. The string forms are stable wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    BookingConfirmation,
    Reminder2h,
    Reminder24h,
    Cancellation,
    HandoffLink,
    Followup,
    WaitlistNotice,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::BookingConfirmation => "booking_confirmation",
            MessageType::Reminder2h => "reminder_2h",
            MessageType::Reminder24h => "reminder_24h",
            MessageType::Cancellation => "cancellation",
            MessageType::HandoffLink => "handoff_link",
            MessageType::Followup => "followup",
            MessageType::WaitlistNotice => "waitlist_notice",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "booking_confirmation" => Ok(MessageType::BookingConfirmation),
            "reminder_2h" => Ok(MessageType::Reminder2h),
            "reminder_24h" => Ok(MessageType::Reminder24h),
            "cancellation" => Ok(MessageType::Cancellation),
            "handoff_link" => Ok(MessageType::HandoffLink),
            "followup" => Ok(MessageType::Followup),
            "waitlist_notice" => Ok(MessageType::WaitlistNotice),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

/// One durable outbound SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: String,
    pub tenant_id: TenantId,
    pub to_phone: String,
    pub body: String,
    pub message_type: MessageType,
    pub booking_reference: Option<String>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub provider_sid: Option<String>,
    pub provider_status: Option<String>,
    pub provider_error_code: Option<String>,
    pub run_at: DateTime<Utc>,
    pub created_at: String,
}

/// Record of a courtesy follow-up scheduled for a contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub contact: String,
    pub channel: String,
    pub reason: String,
    pub job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Pending email-OTP round-trip for one session.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub session_id: SessionId,
    pub email: String,
    pub code_hash: String,
    pub attempts: u32,
    pub expires_at: DateTime<Utc>,
}

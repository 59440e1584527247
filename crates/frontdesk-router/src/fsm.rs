//! Deterministic conversation state carried in session metadata.

use serde::{Deserialize, Serialize};

use frontdesk_store::models::SessionRecord;

/// Stateful flows the router consumes before anything else sees the
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FsmState {
    #[default]
    Idle,
    /// We asked for an email address and are waiting for one.
    AwaitingEmail,
    /// An OTP was sent; waiting for the 6-digit code.
    AwaitingOtp,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FsmContext {
    #[serde(default)]
    pub state: FsmState,
    #[serde(default)]
    pub pending_email: Option<String>,
}

const KEY: &str = "fsm";

pub fn load(session: &SessionRecord) -> FsmContext {
    session
        .metadata
        .get(KEY)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Merge the FSM context back into the metadata bag, preserving
/// everything else stored there.
pub fn store(session: &SessionRecord, fsm: &FsmContext) -> serde_json::Value {
    let mut metadata = session.metadata.clone();
    if !metadata.is_object() {
        metadata = serde_json::json!({});
    }
    metadata[KEY] = serde_json::to_value(fsm).unwrap_or_default();
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontdesk_core::types::{Channel, SessionId, TenantId};

    fn session(metadata: serde_json::Value) -> SessionRecord {
        SessionRecord {
            id: SessionId::from("s1"),
            tenant_id: TenantId::from("t1"),
            channel: Channel::Web,
            external_id: "v1".into(),
            customer_id: None,
            email_verified: false,
            verified_email: None,
            metadata,
            message_count: 0,
            booking_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn roundtrip_preserves_other_metadata() {
        let s = session(serde_json::json!({"widget": {"color": "blue"}}));
        let mut fsm = load(&s);
        assert_eq!(fsm.state, FsmState::Idle);

        fsm.state = FsmState::AwaitingOtp;
        fsm.pending_email = Some("dana@example.com".into());
        let merged = store(&s, &fsm);

        assert_eq!(merged["widget"]["color"], "blue");
        let s2 = session(merged);
        let reloaded = load(&s2);
        assert_eq!(reloaded.state, FsmState::AwaitingOtp);
        assert_eq!(reloaded.pending_email.as_deref(), Some("dana@example.com"));
    }

    #[test]
    fn malformed_metadata_defaults_to_idle() {
        let s = session(serde_json::json!({"fsm": "garbage"}));
        assert_eq!(load(&s).state, FsmState::Idle);
    }
}

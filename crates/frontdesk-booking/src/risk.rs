//! Behavioural risk scoring for booking actions.
//!
//! Counter-based heuristics only; an internal failure degrades to Allow
//! so a risk hiccup never blocks a legitimate customer.

use serde::Serialize;
use tracing::warn;

use frontdesk_store::models::SessionRecord;

/// What the caller should do with a scored action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    Allow,
    /// Identity should be re-proven before proceeding.
    Reverify,
    /// The session is hammering booking actions; back off.
    Cooldown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    /// 0 (benign) to 100.
    pub score: u8,
    pub action: RiskAction,
    pub signals: Vec<String>,
}

pub struct RiskEngine {
    reverify_threshold: u8,
    cooldown_threshold: u8,
}

impl RiskEngine {
    pub fn new() -> Self {
        Self {
            reverify_threshold: 50,
            cooldown_threshold: 80,
        }
    }

    /// Score a session's booking behaviour.
    pub fn assess(&self, session: &SessionRecord) -> RiskAssessment {
        let mut score: u32 = 0;
        let mut signals = Vec::new();

        // Many bookings from one conversation is the main abuse signal.
        if session.booking_count >= 3 {
            score += 40 + 10 * (session.booking_count.min(8) - 3);
            signals.push(format!("booking_count:{}", session.booking_count));
        }

        // Very long unverified conversations trend towards probing.
        if session.message_count > 60 && !session.email_verified {
            score += 30;
            signals.push(format!("long_unverified:{}", session.message_count));
        }

        let score = score.min(100) as u8;
        let action = if score >= self.cooldown_threshold {
            RiskAction::Cooldown
        } else if score >= self.reverify_threshold {
            RiskAction::Reverify
        } else {
            RiskAction::Allow
        };

        RiskAssessment {
            score,
            action,
            signals,
        }
    }

    /// Failure-tolerant wrapper: any missing session reads as Allow
    /// (recovered locally, per the propagation policy).
    pub fn assess_or_allow(&self, session: Option<&SessionRecord>) -> RiskAssessment {
        match session {
            Some(s) => self.assess(s),
            None => {
                warn!("risk assessment without a session, allowing");
                RiskAssessment {
                    score: 0,
                    action: RiskAction::Allow,
                    signals: vec!["no_session".to_string()],
                }
            }
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

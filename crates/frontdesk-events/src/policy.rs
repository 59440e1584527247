//! Named allow/deny rules evaluated against tool and handler actions.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tracing::debug;

use frontdesk_core::types::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

/// Predicate over the action context; `None` matches unconditionally.
pub type Condition = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;

pub struct PolicyRule {
    /// Unique name, for logs and deregistration.
    pub name: String,
    /// `None` applies to every tenant.
    pub tenant_id: Option<TenantId>,
    pub action: String,
    pub effect: Effect,
    pub condition: Option<Condition>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Name of the matching rule, when one matched.
    pub rule: Option<String>,
    pub reason: String,
}

/// Rule registry. Gated actions default to deny when nothing matches;
/// everything else defaults to allow.
pub struct PolicyEngine {
    rules: RwLock<Vec<PolicyRule>>,
    gated: HashSet<String>,
}

impl PolicyEngine {
    pub fn new(gated_actions: &[&str]) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            gated: gated_actions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn register(&self, rule: PolicyRule) {
        self.rules.write().expect("policy registry poisoned").push(rule);
    }

    /// First matching rule wins; tenant-scoped rules are consulted before
    /// global ones for the same action.
    pub fn evaluate(
        &self,
        tenant: Option<&TenantId>,
        action: &str,
        ctx: &serde_json::Value,
    ) -> PolicyDecision {
        let rules = self.rules.read().expect("policy registry poisoned");

        let matching = |scoped: bool| {
            rules.iter().find(|r| {
                r.action == action
                    && (if scoped {
                        r.tenant_id.is_some() && r.tenant_id.as_ref() == tenant
                    } else {
                        r.tenant_id.is_none()
                    })
                    && r.condition.as_ref().map(|c| c(ctx)).unwrap_or(true)
            })
        };

        if let Some(rule) = matching(true).or_else(|| matching(false)) {
            debug!(action, rule = %rule.name, "policy rule matched");
            return PolicyDecision {
                allowed: rule.effect == Effect::Allow,
                rule: Some(rule.name.clone()),
                reason: rule.reason.clone(),
            };
        }

        if self.gated.contains(action) {
            PolicyDecision {
                allowed: false,
                rule: None,
                reason: format!("no rule matched gated action '{action}'"),
            }
        } else {
            PolicyDecision {
                allowed: true,
                rule: None,
                reason: "action is not gated".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(&["hold_expiry_followup"])
    }

    #[test]
    fn ungated_action_defaults_to_allow() {
        let e = engine();
        let d = e.evaluate(None, "send_sms_confirmation", &serde_json::json!({}));
        assert!(d.allowed);
        assert!(d.rule.is_none());
    }

    #[test]
    fn gated_action_defaults_to_deny() {
        let e = engine();
        let d = e.evaluate(None, "hold_expiry_followup", &serde_json::json!({}));
        assert!(!d.allowed);
    }

    #[test]
    fn explicit_deny_beats_default_allow() {
        let e = engine();
        e.register(PolicyRule {
            name: "no-confirmations-for-t1".into(),
            tenant_id: Some(TenantId::from("t1")),
            action: "send_sms_confirmation".into(),
            effect: Effect::Deny,
            condition: None,
            reason: "tenant disabled SMS".into(),
        });

        let d = e.evaluate(
            Some(&TenantId::from("t1")),
            "send_sms_confirmation",
            &serde_json::json!({}),
        );
        assert!(!d.allowed);
        assert_eq!(d.rule.as_deref(), Some("no-confirmations-for-t1"));

        // Other tenants unaffected.
        let d = e.evaluate(
            Some(&TenantId::from("t2")),
            "send_sms_confirmation",
            &serde_json::json!({}),
        );
        assert!(d.allowed);
    }

    #[test]
    fn condition_predicate_filters_matches() {
        let e = engine();
        e.register(PolicyRule {
            name: "allow-followup-for-verified".into(),
            tenant_id: None,
            action: "hold_expiry_followup".into(),
            effect: Effect::Allow,
            condition: Some(Arc::new(|ctx| {
                ctx["email_verified"].as_bool().unwrap_or(false)
            })),
            reason: "verified sessions may be followed up".into(),
        });

        let allowed = e.evaluate(
            None,
            "hold_expiry_followup",
            &serde_json::json!({"email_verified": true}),
        );
        assert!(allowed.allowed);

        let denied = e.evaluate(
            None,
            "hold_expiry_followup",
            &serde_json::json!({"email_verified": false}),
        );
        assert!(!denied.allowed);
    }
}

//! Storefront FAQ for the platform tenant.
//!
//! Frequent questions about the product itself are answered from a
//! static facts table without an LLM round-trip — deterministic text,
//! zero latency, zero tokens.

use frontdesk_agent::prompt::PLATFORM_SLUG;

/// (topic keywords, canned answer). First hit wins.
const FACTS: &[(&[&str], &str)] = &[
    (
        &["price", "pricing", "cost", "how much", "plan"],
        "Frontdesk has two plans: Starter at $49/month (web chat + SMS reminders) and \
         Pro at $99/month (adds voice answering and calendar sync). Both include \
         unlimited bookings and a 14-day free trial.",
    ),
    (
        &["trial", "try it", "demo"],
        "You can try Frontdesk free for 14 days — no card required. Head to the \
         dashboard, create your business profile, and the widget is live immediately.",
    ),
    (
        &["cancel my subscription", "cancel the subscription", "unsubscribe"],
        "You can cancel your subscription any time from the dashboard billing page; \
         your data stays exportable for 30 days afterwards.",
    ),
    (
        &["integrat", "calendar sync", "google calendar", "outlook"],
        "Frontdesk syncs with external calendars on the Pro plan: bookings are \
         mirrored as events and busy time on your calendar blocks the widget's \
         availability automatically.",
    ),
    (
        &["sms", "text message", "reminder"],
        "Frontdesk sends booking confirmations and 24-hour / 2-hour reminders by \
         SMS, with quiet hours and STOP opt-out handled for you.",
    ),
];

/// Deterministic storefront answer, only for the platform tenant.
pub fn storefront_answer(tenant_slug: &str, text: &str) -> Option<&'static str> {
    if tenant_slug != PLATFORM_SLUG {
        return None;
    }
    let t = text.to_lowercase();
    FACTS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| t.contains(k)))
        .map(|(_, answer)| *answer)
}

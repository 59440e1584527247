//! Regex/keyword NLU over call transcripts. Everything here is
//! deterministic and cheap; ambiguity resolves to `None` so the flow
//! can re-prompt instead of guessing.

use regex::Regex;
use std::sync::OnceLock;

use frontdesk_core::types::ServiceEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallIntent {
    Book,
    Reschedule,
    Cancel,
    Unknown,
}

pub fn extract_intent(text: &str) -> CallIntent {
    let t = text.to_lowercase();
    if t.contains("cancel") || t.contains("can't make") || t.contains("cannot make") {
        return CallIntent::Cancel;
    }
    if t.contains("reschedule") || t.contains("move") || t.contains("different time") {
        return CallIntent::Reschedule;
    }
    if t.contains("book")
        || t.contains("appointment")
        || t.contains("schedule")
        || t.contains("come in")
        || t.contains("availab")
    {
        return CallIntent::Book;
    }
    CallIntent::Unknown
}

pub fn extract_yes_no(text: &str) -> Option<bool> {
    let t = text.to_lowercase();
    // Negatives first: "no thanks, that's not right" must not read yes.
    for no in ["no", "nope", "nah", "not right", "wrong", "don't", "do not"] {
        if word_hit(&t, no) {
            return Some(false);
        }
    }
    for yes in ["yes", "yeah", "yep", "correct", "that's right", "sure", "sounds good", "confirm"] {
        if word_hit(&t, yes) {
            return Some(true);
        }
    }
    None
}

fn word_hit(text: &str, needle: &str) -> bool {
    if needle.contains(' ') {
        return text.contains(needle);
    }
    text.split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
        .any(|w| w == needle)
}

/// Service by catalog name, longest match first so "deep tissue massage"
/// beats "massage".
pub fn extract_service<'a>(services: &'a [ServiceEntry], text: &str) -> Option<&'a ServiceEntry> {
    let t = text.to_lowercase();
    let mut candidates: Vec<&ServiceEntry> = services
        .iter()
        .filter(|s| t.contains(&s.name.to_lowercase()))
        .collect();
    candidates.sort_by_key(|s| std::cmp::Reverse(s.name.len()));
    if let Some(hit) = candidates.first() {
        return Some(hit);
    }
    // Keyword fallback: any single word of a service name, 4+ chars.
    services.iter().find(|s| {
        s.name
            .to_lowercase()
            .split_whitespace()
            .any(|w| w.len() >= 4 && word_hit(&t, w))
    })
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
    })
}

/// Email from a transcript, including spoken form
/// ("alex at example dot com").
pub fn extract_email(text: &str) -> Option<String> {
    if let Some(m) = email_re().find(text) {
        return Some(m.as_str().to_lowercase());
    }

    // Spoken form: rewrite the connectives and retry.
    let spoken = text
        .to_lowercase()
        .replace(" at ", "@")
        .replace(" dot ", ".")
        .replace(" underscore ", "_")
        .replace(" dash ", "-")
        .replace(" plus ", "+");
    let collapsed: String = spoken
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("");
    email_re()
        .find(&collapsed)
        .map(|m| m.as_str().to_string())
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:my name is|this is|i'?m|it'?s)\s+([a-z]+(?:\s+[a-z]+)?)").unwrap()
    })
}

/// Full name from "my name is Dana Smith" forms, else the raw text when
/// it looks like a bare two-word name.
pub fn extract_name(text: &str) -> Option<String> {
    if let Some(caps) = name_re().captures(text) {
        return Some(titlecase(caps[1].trim()));
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if (1..=3).contains(&words.len())
        && words.iter().all(|w| w.chars().all(|c| c.is_alphabetic()))
    {
        return Some(titlecase(text.trim()));
    }
    None
}

fn titlecase(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slot choice by ordinal ("the second one"), number ("option 2"), or
/// spoken time matched against the offered labels.
pub fn extract_slot_choice(text: &str, offered: &[String]) -> Option<usize> {
    let t = text.to_lowercase();

    const ORDINALS: [(&str, usize); 5] = [
        ("first", 0),
        ("second", 1),
        ("third", 2),
        ("fourth", 3),
        ("fifth", 4),
    ];
    for (word, idx) in ORDINALS {
        if t.contains(word) && idx < offered.len() {
            return Some(idx);
        }
    }
    if t.contains("last") && !offered.is_empty() {
        return Some(offered.len() - 1);
    }

    static NUM_RE: OnceLock<Regex> = OnceLock::new();
    let num_re = NUM_RE.get_or_init(|| Regex::new(r"\b([1-9])\b").unwrap());
    if let Some(caps) = num_re.captures(&t) {
        let n: usize = caps[1].parse().ok()?;
        if n >= 1 && n <= offered.len() {
            return Some(n - 1);
        }
    }

    // Time match against the offered labels ("10:30" → "10:30 AM").
    offered
        .iter()
        .position(|label| t.contains(&label.to_lowercase()) || label.to_lowercase().contains(t.trim()))
        .filter(|_| !t.trim().is_empty() && t.trim().len() >= 4)
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bapt[\s-]*([a-z0-9]{6,})\b").unwrap())
}

/// Booking reference, tolerant of spoken "A P T dash" spacing.
pub fn extract_reference(text: &str) -> Option<String> {
    reference_re()
        .captures(text)
        .map(|caps| format!("APT-{}", caps[1].to_uppercase()))
}

/// The caller wants the conversation moved to SMS.
pub fn wants_handoff(text: &str) -> bool {
    let t = text.to_lowercase();
    ["text me", "send me a link", "send a link", "sms me", "by text", "over text"]
        .iter()
        .any(|p| t.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents() {
        assert_eq!(extract_intent("I'd like to book a cleaning"), CallIntent::Book);
        assert_eq!(extract_intent("need to cancel my visit"), CallIntent::Cancel);
        assert_eq!(
            extract_intent("can we move it to friday"),
            CallIntent::Reschedule
        );
        assert_eq!(extract_intent("uh hello?"), CallIntent::Unknown);
    }

    #[test]
    fn yes_no_negatives_win() {
        assert_eq!(extract_yes_no("yes please"), Some(true));
        assert_eq!(extract_yes_no("yeah that's right"), Some(true));
        assert_eq!(extract_yes_no("no, that's wrong"), Some(false));
        assert_eq!(extract_yes_no("hmm let me think"), None);
    }

    #[test]
    fn service_longest_match_wins() {
        let services = vec![
            ServiceEntry {
                name: "Massage".into(),
                duration_minutes: 30,
                price_cents: None,
                description: None,
            },
            ServiceEntry {
                name: "Deep Tissue Massage".into(),
                duration_minutes: 60,
                price_cents: None,
                description: None,
            },
        ];
        let hit = extract_service(&services, "the deep tissue massage please").unwrap();
        assert_eq!(hit.name, "Deep Tissue Massage");

        let keyword = extract_service(&services, "something with tissue?").unwrap();
        assert_eq!(keyword.name, "Deep Tissue Massage");
    }

    #[test]
    fn spoken_email() {
        assert_eq!(
            extract_email("it's alex at example dot com").as_deref(),
            Some("alex@example.com")
        );
        assert_eq!(
            extract_email("dana.smith@example.com thanks").as_deref(),
            Some("dana.smith@example.com")
        );
        assert!(extract_email("no email from me").is_none());
    }

    #[test]
    fn names() {
        assert_eq!(extract_name("my name is dana smith").as_deref(), Some("Dana Smith"));
        assert_eq!(extract_name("Dana Smith").as_deref(), Some("Dana Smith"));
        assert!(extract_name("it costs 40 dollars??").is_none());
    }

    #[test]
    fn slot_choices() {
        let offered = vec!["10:00 AM".to_string(), "10:30 AM".to_string(), "2:00 PM".to_string()];
        assert_eq!(extract_slot_choice("the second one", &offered), Some(1));
        assert_eq!(extract_slot_choice("option 3 please", &offered), Some(2));
        assert_eq!(extract_slot_choice("the last one", &offered), Some(2));
        assert_eq!(extract_slot_choice("10:30 am works", &offered), Some(1));
        assert_eq!(extract_slot_choice("option 9", &offered), None);
    }

    #[test]
    fn references() {
        assert_eq!(
            extract_reference("it's APT-AB12CD").as_deref(),
            Some("APT-AB12CD")
        );
        assert_eq!(
            extract_reference("apt ab12cd I think").as_deref(),
            Some("APT-AB12CD")
        );
        assert!(extract_reference("I lost the code").is_none());
    }

    #[test]
    fn handoff_phrases() {
        assert!(wants_handoff("can you just text me a link"));
        assert!(wants_handoff("send me a link instead"));
        assert!(!wants_handoff("see you tomorrow"));
    }
}

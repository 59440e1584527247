//! Code-enforced guardrails on final assistant text.
//!
//! Every rule is a deterministic, synchronous pattern substitution, and
//! the whole pipeline is idempotent: running it on its own output
//! changes nothing.

use regex::Regex;
use std::sync::OnceLock;

use frontdesk_core::types::Channel;

pub struct PostProcessContext<'a> {
    /// Tools that executed successfully this turn.
    pub tools_succeeded: &'a [String],
    pub channel: Channel,
}

const CONFIRMATION_REPLACEMENT: &str =
    "I'm still working on finalizing your appointment details";
const CALL_CLAIM_REPLACEMENT: &str =
    "I can send confirmations or follow-ups by text or email.";
const CANONICAL_BRAND: &str = "Frontdesk";

/// Predecessor product names that must never surface.
const LEGACY_BRANDS: &[&str] = &["GoMomo", "Sonnil"];

fn confirmation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(?:your|the)\s+)?(?:appointment|booking)\s+(?:is|has been)\s+(?:now\s+)?(?:confirmed|booked)\b|\bsuccessfully\s+booked\b|\byou(?:'re|\s+are)\s+all\s+set\b|\ball\s+booked\b|\bbooked\s+you\s+in\b",
        )
        .unwrap()
    })
}

fn call_claim_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)[^.!?\n]*\b(?:have\s+someone\s+call|call\s+you|give\s+you\s+a\s+call|transfer\s+you|connect\s+you\s+(?:to|with)|put\s+you\s+through)\b[^.!?\n]*[.!?]*",
        )
        .unwrap()
    })
}

fn calendar_uri_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[^.!?\n]*data:text/calendar[^\s]*[^.!?\n]*[.!?]*").unwrap()
    })
}

fn markdown_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\((https?://[^)]+)\)").unwrap())
}

fn social_sentence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)[^.!?\n]*\b(?:facebook\.com|instagram\.com|twitter\.com|x\.com|tiktok\.com|youtube\.com|linkedin\.com|bit\.ly)[^.!?\n]*[.!?]*",
        )
        .unwrap()
    })
}

fn orphan_social_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "Visit us at ." style leftovers after a URL was stripped.
        Regex::new(r"(?i)[^.!?\n]*\b(?:follow\s+us|visit\s+us\s+at|find\s+us\s+on)\b\s*[.!?]+")
            .unwrap()
    })
}

fn signoff_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)[^.!?\n]*\b(?:like\s+and\s+subscribe|smash\s+that|thanks\s+for\s+watching|see\s+you\s+in\s+the\s+next\s+(?:video|episode)|hit\s+the\s+bell)\b[^.!?\n]*[.!?]*",
        )
        .unwrap()
    })
}

/// Domains the widget is allowed to link to.
fn is_allowed_domain(url: &str) -> bool {
    url.contains("frontdesk.example") || url.contains("frontdesk.app")
}

pub fn post_process(text: &str, ctx: &PostProcessContext) -> String {
    let mut out = text.to_string();

    // Guardrail 5: legacy brand names.
    for brand in LEGACY_BRANDS {
        if out.to_lowercase().contains(&brand.to_lowercase()) {
            let re = Regex::new(&format!(r"(?i)\b{brand}\b")).expect("brand regex");
            out = re.replace_all(&out, CANONICAL_BRAND).into_owned();
        }
    }

    // Guardrail 3: premature confirmation. Only a successful
    // confirm_booking this turn earns confirmation language.
    let confirmed_this_turn = ctx
        .tools_succeeded
        .iter()
        .any(|t| t == "confirm_booking");
    if !confirmed_this_turn {
        out = confirmation_re()
            .replace_all(&out, CONFIRMATION_REPLACEMENT)
            .into_owned();
    }

    // Guardrail 4: the system cannot place calls, ever.
    out = call_claim_re()
        .replace_all(&out, CALL_CLAIM_REPLACEMENT)
        .into_owned();

    // Guardrail 6: raw calendar data-URIs (the UI renders a button).
    out = calendar_uri_re().replace_all(&out, "").into_owned();

    // Guardrail 7: external links. Markdown links keep their text;
    // social-domain sentences are dropped wholesale.
    out = markdown_link_re()
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            if is_allowed_domain(&caps[2]) {
                caps[0].to_string()
            } else {
                caps[1].to_string()
            }
        })
        .into_owned();
    out = social_sentence_re().replace_all(&out, "").into_owned();
    out = orphan_social_re().replace_all(&out, "").into_owned();

    // Guardrail 8: broadcast sign-offs.
    out = signoff_re().replace_all(&out, "").into_owned();

    if ctx.channel == Channel::Sms {
        out = format_for_sms(&out);
    }

    collapse_blank_runs(out.trim().to_string())
}

/// SMS has no markdown renderer: strip markers, number the bullets.
fn format_for_sms(text: &str) -> String {
    let mut out = text.replace("**", "").replace("__", "");

    static HEADER_RE: OnceLock<Regex> = OnceLock::new();
    let header_re = HEADER_RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
    out = header_re.replace_all(&out, "").into_owned();

    let mut numbered = Vec::new();
    let mut counter = 0usize;
    for line in out.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("- ") {
            counter += 1;
            numbered.push(format!("{counter}) {rest}"));
        } else {
            if !line.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
                counter = 0;
            }
            numbered.push(line.to_string());
        }
    }
    numbered.join("\n")
}

fn collapse_blank_runs(text: String) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    re.replace_all(&text, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_ctx<'a>(tools: &'a [String]) -> PostProcessContext<'a> {
        PostProcessContext {
            tools_succeeded: tools,
            channel: Channel::Web,
        }
    }

    #[test]
    fn premature_confirmation_rewritten_when_no_tool_ran() {
        let input = "Your appointment is confirmed! I'll have someone call you. \
                     Follow us on https://facebook.com/foo";
        let out = post_process(input, &web_ctx(&[]));

        assert!(out.contains("I'm still working on finalizing your appointment details"));
        assert!(out.contains("I can send confirmations or follow-ups by text or email"));
        assert!(!out.contains("facebook.com"));
        assert!(!out.to_lowercase().contains("call you"));
    }

    #[test]
    fn real_confirmation_passes_through() {
        let tools = vec!["confirm_booking".to_string()];
        let input = "Your appointment is confirmed for Thursday at 10 AM. Ref APT-ABC234.";
        let out = post_process(input, &web_ctx(&tools));
        assert!(out.contains("Your appointment is confirmed"));
    }

    #[test]
    fn call_claims_always_stripped_even_after_confirm() {
        let tools = vec!["confirm_booking".to_string()];
        let out = post_process("We will transfer you to our specialist now.", &web_ctx(&tools));
        assert!(!out.to_lowercase().contains("transfer you"));
        assert!(out.contains("text or email"));
    }

    #[test]
    fn legacy_brand_replaced() {
        let out = post_process("Welcome to GoMomo! gomomo is here to help.", &web_ctx(&[]));
        assert!(!out.to_lowercase().contains("gomomo"));
        assert!(out.contains("Frontdesk"));
    }

    #[test]
    fn calendar_data_uri_stripped() {
        let input = "You can add it here: data:text/calendar;base64,QkVHSU4= for your calendar.";
        let out = post_process(input, &web_ctx(&[]));
        assert!(!out.contains("data:text/calendar"));
    }

    #[test]
    fn offsite_markdown_links_keep_text_only() {
        let input = "See [our menu](https://facebook.com/menu) and [your booking](https://frontdesk.app/b/1).";
        let out = post_process(input, &web_ctx(&[]));
        assert!(out.contains("our menu"));
        assert!(!out.contains("facebook.com"));
        assert!(out.contains("https://frontdesk.app/b/1"));
    }

    #[test]
    fn broadcast_signoffs_stripped() {
        let out = post_process(
            "Your slot options are 2pm and 3pm. Don't forget to like and subscribe!",
            &web_ctx(&[]),
        );
        assert!(out.contains("2pm and 3pm"));
        assert!(!out.to_lowercase().contains("subscribe"));
    }

    #[test]
    fn sms_formatting_numbers_bullets_and_strips_markdown() {
        let ctx = PostProcessContext {
            tools_succeeded: &[],
            channel: Channel::Sms,
        };
        let input = "## Open slots\n**Tomorrow:**\n- 10:00 AM\n- 10:30 AM\n- 2:00 PM\n\n\n\nReply with a number.";
        let out = post_process(input, &ctx);
        assert!(!out.contains("**"));
        assert!(!out.contains("##"));
        assert!(out.contains("1) 10:00 AM"));
        assert!(out.contains("3) 2:00 PM"));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn idempotent_on_scenario_text() {
        let inputs = [
            "Your appointment is confirmed! I'll have someone call you. Follow us on https://facebook.com/foo",
            "Plain friendly answer with no violations at all.",
            "## Heading\n- a\n- b\n\nGoMomo will transfer you. Thanks for watching!",
        ];
        for input in inputs {
            for channel in [Channel::Web, Channel::Sms] {
                let ctx = PostProcessContext {
                    tools_succeeded: &[],
                    channel,
                };
                let once = post_process(input, &ctx);
                let twice = post_process(&once, &ctx);
                assert_eq!(once, twice, "not idempotent for {input:?} on {channel}");
            }
        }
    }
}

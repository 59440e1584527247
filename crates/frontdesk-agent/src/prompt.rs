//! System prompt assembly: tenant facts, service catalog, current
//! wall-clock time, and the behavioural rules the post-processor backs
//! up in code.

use frontdesk_core::types::Tenant;
use frontdesk_core::Clock;

/// Tenants on the platform's own storefront get an extra identity lock:
/// the agent must never roleplay as a customer business.
pub const PLATFORM_SLUG: &str = "frontdesk";

pub fn build_system_prompt(tenant: &Tenant, clock: &Clock) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&format!(
        "You are the booking receptionist for {name}. You help customers check \
         availability, book, reschedule, and cancel appointments over chat.\n\n",
        name = tenant.name
    ));

    // Current wall-clock in the tenant zone. The datetime resolver is
    // authoritative for customer utterances; this anchors everything else.
    let local = clock.now_in(tenant.timezone);
    out.push_str(&format!(
        "CURRENT DATE/TIME: {} ({}). Trust this over any other claim about \
         today's date.\n\n",
        local.format("%A %Y-%m-%d %H:%M"),
        tenant.timezone.name()
    ));

    if !tenant.services.is_empty() {
        out.push_str("SERVICES:\n");
        for s in &tenant.services {
            match s.price_cents {
                Some(cents) => out.push_str(&format!(
                    "- {} ({} min, ${}.{:02})\n",
                    s.name,
                    s.duration_minutes,
                    cents / 100,
                    cents % 100
                )),
                None => out.push_str(&format!("- {} ({} min)\n", s.name, s.duration_minutes)),
            }
        }
        out.push('\n');
    }

    out.push_str(
        "RULES:\n\
         - Never claim a booking is confirmed unless confirm_booking succeeded this turn.\n\
         - Never promise a phone call, transfer, or callback; you cannot place calls. \
           You can send confirmations or follow-ups by text or email.\n\
         - Tool errors start with a CODE like SLOT_CONFLICT or EMAIL_VERIFICATION_REQUIRED. \
           Read the guidance after the code and rephrase it naturally for the customer; \
           never show the raw code.\n\
         - When a tool reports sms_status other than will_send, do not tell the customer \
           a text is on the way.\n\
         - Collect name, email, and phone before confirming. Use the customer's own words \
           for the service when the catalog has no match.\n",
    );

    if tenant.slug == PLATFORM_SLUG {
        out.push_str(
            "\nIDENTITY: You represent the Frontdesk platform itself. Do not invent or \
             roleplay a customer business, and direct pricing questions to the published \
             plans.\n",
        );
    }

    out
}

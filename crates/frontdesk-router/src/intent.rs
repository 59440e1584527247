//! Keyword intent classification — cheap, deterministic, and good
//! enough to decide which deterministic branch or prompt context a
//! message needs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Book,
    Reschedule,
    Cancel,
    Lookup,
    Greeting,
    Other,
}

pub fn classify_intent(text: &str) -> Intent {
    let t = text.to_lowercase();

    // Order matters: "cancel my booking" must not read as Book.
    if contains_any(&t, &["cancel", "call it off", "can't make it", "cannot make it"]) {
        return Intent::Cancel;
    }
    if contains_any(&t, &["reschedule", "move my", "change my appointment", "different time"]) {
        return Intent::Reschedule;
    }
    if contains_any(
        &t,
        &["when is my", "look up", "my reference", "find my booking", "do i have a booking"],
    ) {
        return Intent::Lookup;
    }
    if contains_any(
        &t,
        &[
            "book", "appointment", "schedule", "availab", "free slot", "come in", "slot",
            "opening", "reserve",
        ],
    ) {
        return Intent::Book;
    }
    if contains_any(&t, &["hi", "hello", "hey", "good morning", "good afternoon"])
        && t.split_whitespace().count() <= 4
    {
        return Intent::Greeting;
    }
    Intent::Other
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

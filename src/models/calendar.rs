//! Calendar (ICS) text for confirmed RSVPs
//!
//! The confirmation screen offers a downloadable VCALENDAR with a single
//! VEVENT and a reminder alarm 24 hours out.

use chrono::prelude::*;

use super::events::Event;

/// Escape text for an ICS property value
///
/// # Arguments
///
/// * `raw` - The text to escape
#[must_use]
pub fn escape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            // swallow carriage returns so windows newlines escape cleanly
            '\r' => (),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape_text`]
///
/// # Arguments
///
/// * `raw` - The escaped text to unescape
#[must_use]
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some(';') => out.push(';'),
            Some(',') => out.push(','),
            Some('n' | 'N') => out.push('\n'),
            // a dangling escape passes through untouched
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Format an instant as an ICS UTC timestamp
///
/// # Arguments
///
/// * `when` - The instant to format
fn format_stamp(when: &DateTime<Utc>) -> String {
    when.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build the ICS text for an event
///
/// # Arguments
///
/// * `event` - The event to build calendar text for
/// * `uid` - The uid to stamp on the VEVENT
#[must_use]
pub fn event_ics(event: &Event, uid: &str) -> String {
    let start = event.starts_at();
    // default events to two hours long
    let end = start + chrono::Duration::hours(2);
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_owned(),
        "VERSION:2.0".to_owned(),
        "PRODID:-//EventCall//EN".to_owned(),
        "BEGIN:VEVENT".to_owned(),
        format!("UID:{uid}"),
        format!("DTSTAMP:{}", format_stamp(&Utc::now())),
        format!("DTSTART:{}", format_stamp(&start)),
        format!("DTEND:{}", format_stamp(&end)),
        format!("SUMMARY:{}", escape_text(&event.title)),
        format!("LOCATION:{}", escape_text(&event.location)),
    ];
    if !event.description.is_empty() {
        lines.push(format!("DESCRIPTION:{}", escape_text(&event.description)));
    }
    // reminder alarm 24 hours before the event
    lines.extend([
        "BEGIN:VALARM".to_owned(),
        "ACTION:DISPLAY".to_owned(),
        format!("DESCRIPTION:{}", escape_text(&event.title)),
        "TRIGGER:-PT24H".to_owned(),
        "END:VALARM".to_owned(),
        "END:VEVENT".to_owned(),
        "END:VCALENDAR".to_owned(),
    ]);
    // ics lines end in crlf
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

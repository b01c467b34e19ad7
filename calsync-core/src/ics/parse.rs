//! ICS feed parsing using the icalendar crate's parser.

use chrono::Duration;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::{EventKind, ExternalEvent, EventTime};

/// Sub-components that legitimately nest inside a top-level entry.
const NESTED_COMPONENTS: &[&str] = &["VALARM", "STANDARD", "DAYLIGHT", "VLOCATION", "VRESOURCE"];

/// Parse a complete calendar document, failing on the first problem.
///
/// Entries that are not events are discarded. A document that is not a
/// calendar, does not parse, or contains a malformed event is rejected as a
/// whole.
pub fn parse_calendar(content: &str) -> SyncResult<Vec<ExternalEvent>> {
    let unfolded = unfold(content);

    if !is_calendar_document(&unfolded) {
        return Err(SyncError::IcsParse("document is not a VCALENDAR".into()));
    }

    let calendar = read_calendar(&unfolded).map_err(|e| SyncError::IcsParse(e.to_string()))?;

    calendar
        .components
        .iter()
        .filter(|c| EventKind::from_component(c.name.as_ref()) == EventKind::Event)
        .map(|c| event_from_component(c).map_err(SyncError::IcsParse))
        .collect()
}

/// Extract every parseable event from raw feed text.
///
/// Each top-level entry is parsed on its own, so a corrupt entry is skipped
/// (and logged) without losing the rest of the feed. Non-event entries are
/// discarded.
pub fn parse_feed(content: &str) -> Vec<ExternalEvent> {
    let unfolded = unfold(content);
    let mut events = Vec::new();

    for (index, block) in split_entries(&unfolded).into_iter().enumerate() {
        if EventKind::from_component(&block.name) != EventKind::Event {
            debug!(entry = index, kind = %block.name, "discarding non-event entry");
            continue;
        }

        match parse_entry(&block) {
            Ok(event) => events.push(event),
            Err(reason) => warn!(entry = index, %reason, "skipping malformed feed entry"),
        }
    }

    events
}

fn is_calendar_document(unfolded: &str) -> bool {
    unfolded
        .trim_start_matches('\u{feff}')
        .trim_start()
        .get(..15)
        .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
}

/// One top-level entry of a feed, as raw lines.
#[derive(Debug)]
struct Entry<'a> {
    name: String,
    lines: Vec<&'a str>,
    complete: bool,
}

/// Value of a `BEGIN:` / `END:` line, if `line` is one.
fn delimiter<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let (name, value) = line.split_once(':')?;
    name.trim()
        .eq_ignore_ascii_case(keyword)
        .then(|| value.trim())
}

/// Split unfolded feed text into its top-level entries.
///
/// Tolerates missing `END` lines: an entry left open when the next
/// top-level entry begins (or the calendar ends) is kept as incomplete.
fn split_entries(unfolded: &str) -> Vec<Entry<'_>> {
    let mut entries = Vec::new();
    let mut current: Option<Entry> = None;
    let mut depth = 0usize;

    for line in unfolded.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let begin = delimiter(line, "BEGIN");
        let end = delimiter(line, "END");

        if let Some(name) = begin {
            let nested = NESTED_COMPONENTS.iter().any(|n| n.eq_ignore_ascii_case(name));
            if current.is_some() && nested {
                depth += 1;
            } else if !name.eq_ignore_ascii_case("VCALENDAR") {
                entries.extend(current.take());
                current = Some(Entry {
                    name: name.to_ascii_uppercase(),
                    lines: Vec::new(),
                    complete: false,
                });
                depth = 1;
            }
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if end.is_some_and(|name| name.eq_ignore_ascii_case("VCALENDAR")) {
            entries.extend(current.take());
            continue;
        }

        entry.lines.push(line);

        if end.is_some() {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                entry.complete = true;
                entries.extend(current.take());
            }
        }
    }

    entries.extend(current);
    entries
}

/// Parse a single entry by wrapping it in a minimal calendar.
fn parse_entry(entry: &Entry) -> Result<ExternalEvent, String> {
    if !entry.complete {
        return Err("entry is truncated".into());
    }

    let wrapped = format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n{}\r\nEND:VCALENDAR\r\n",
        entry.lines.join("\r\n")
    );
    let calendar = read_calendar(&wrapped).map_err(|e| e.to_string())?;
    let component = calendar
        .components
        .iter()
        .find(|c| c.name.as_ref().eq_ignore_ascii_case(&entry.name))
        .ok_or_else(|| format!("no {} component found", entry.name))?;

    event_from_component(component)
}

/// Build an event record from a parsed component.
fn event_from_component(component: &Component) -> Result<ExternalEvent, String> {
    let uid = component
        .find_prop("UID")
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| "entry has no UID".to_string())?;

    let start = time_prop(component, "DTSTART");
    let end = match (time_prop(component, "DTEND"), start.as_ref()) {
        (Some(end), _) => Some(end),
        (None, Some(start)) => match component
            .find_prop("DURATION")
            .and_then(|p| parse_duration(p.val.as_ref()))
        {
            Some(duration) => Some(
                shift(start, duration)
                    .ok_or_else(|| format!("DURATION of entry '{uid}' is out of range"))?,
            ),
            None => None,
        },
        (None, None) => None,
    };

    Ok(ExternalEvent {
        uid,
        kind: EventKind::from_component(component.name.as_ref()),
        summary: text_prop(component, "SUMMARY"),
        description: text_prop(component, "DESCRIPTION"),
        start,
        end,
    })
}

fn text_prop(component: &Component, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
}

/// A date/time property; values that do not parse are treated as absent.
fn time_prop(component: &Component, name: &str) -> Option<EventTime> {
    let prop = component.find_prop(name)?;
    DatePerhapsTime::try_from(prop).ok().map(to_event_time)
}

/// Convert icalendar's DatePerhapsTime to our EventTime, preserving timezone info
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::DateTimeZoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Parse a positive DURATION value (PT1H30M, P1D, ...).
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim().trim_start_matches('+');
    let duration = iso8601::duration(value).ok()?;
    let std_duration: std::time::Duration = duration.into();
    Duration::from_std(std_duration).ok()
}

/// `time` moved forward by `by`, or `None` when the result is out of range.
fn shift(time: &EventTime, by: Duration) -> Option<EventTime> {
    Some(match time {
        EventTime::Date(d) => EventTime::Date(d.checked_add_signed(by)?),
        EventTime::DateTimeUtc(dt) => EventTime::DateTimeUtc(dt.checked_add_signed(by)?),
        EventTime::DateTimeFloating(dt) => {
            EventTime::DateTimeFloating(dt.checked_add_signed(by)?)
        }
        EventTime::DateTimeZoned { datetime, tzid } => EventTime::DateTimeZoned {
            datetime: datetime.checked_add_signed(by)?,
            tzid: tzid.clone(),
        },
    })
}

/// Undo RFC 5545 TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

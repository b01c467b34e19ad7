//! Event entry → appointment draft conversion.

use chrono::{Duration, Timelike};
use chrono_tz::Tz;
use tracing::warn;

use crate::appointment::{AppointmentDraft, IMPORT_SOURCE};
use crate::error::SkipReason;
use crate::event::ExternalEvent;

/// Title used for events that have none.
pub const PLACEHOLDER_SUMMARY: &str = "(No title)";

/// Length assumed for events without an end.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Per-connection settings the normalizer needs.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub connection_id: String,
    /// Zone booking dates and times are expressed in
    pub timezone: Tz,
}

/// Turn one event entry into an appointment draft, or say why it is skipped.
///
/// The draft has no customer yet; matching happens afterwards.
pub fn normalize(
    event: &ExternalEvent,
    ctx: &NormalizeContext,
) -> Result<AppointmentDraft, SkipReason> {
    if !event.is_event() {
        return Err(SkipReason::NotAnEvent);
    }

    let start = event.start.as_ref().ok_or(SkipReason::MissingStart)?;
    let start = start
        .resolve(ctx.timezone)
        .ok_or(SkipReason::UnresolvableTime)?;

    let summary = event
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(PLACEHOLDER_SUMMARY);

    let end = match &event.end {
        Some(end) => end
            .resolve(ctx.timezone)
            .ok_or(SkipReason::UnresolvableTime)?,
        None => start + Duration::minutes(DEFAULT_DURATION_MINUTES),
    };

    let seconds = (end - start).num_seconds();
    if seconds < 0 {
        warn!(
            uid = %event.uid,
            connection_id = %ctx.connection_id,
            %start,
            %end,
            "event ends before it starts"
        );
        return Err(SkipReason::EndBeforeStart);
    }
    let minutes = u32::try_from((seconds + 30) / 60).map_err(|_| {
        warn!(
            uid = %event.uid,
            connection_id = %ctx.connection_id,
            %start,
            %end,
            "event duration does not fit in minutes"
        );
        SkipReason::DurationOutOfRange
    })?;

    let local = start.with_timezone(&ctx.timezone);
    let booking_time = local
        .time()
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .ok_or(SkipReason::UnresolvableTime)?;

    let notes = match event.description.as_deref().map(str::trim) {
        Some(description) if !description.is_empty() => format!("{summary}\n\n{description}"),
        _ => summary.to_string(),
    };

    Ok(AppointmentDraft {
        booking_date: local.date_naive(),
        booking_time,
        duration_minutes: minutes,
        notes,
        customer_id: None,
        external_id: event.uid.clone(),
        connection_id: ctx.connection_id.clone(),
        source: IMPORT_SOURCE.to_string(),
    })
}

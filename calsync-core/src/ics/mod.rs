//! iCalendar (RFC 5545) feed parsing.
//!
//! Two entry points: [`parse_calendar`] is all-or-nothing and backs the
//! structured fetch strategy, [`parse_feed`] extracts whatever it can from
//! raw text and backs the fallback transport.

mod parse;

pub use parse::{parse_calendar, parse_feed};

//! Per-venue trading sessions.
//!
//! Sessions are inclusive at both ends and evaluated against the local wall
//! clock supplied by the caller. Saturday and Sunday are always closed.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};

use super::market::Venue;

pub fn session(venue: Venue) -> (NaiveTime, NaiveTime) {
    match venue {
        Venue::Krx => (hm(9, 0), hm(15, 30)),
        Venue::Nxt => (hm(8, 0), hm(18, 0)),
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

pub fn is_open(venue: Venue, now: NaiveDateTime) -> bool {
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let (open, close) = session(venue);
    let t = now.time();
    open <= t && t <= close
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

/// Formats whose zone part is a fixed numeric offset
const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%:z",
    "%a, %d %b %Y %H:%M:%S %z",
];

/// Formats without usable zone information; these are read as UTC.
/// `%Z` consumes the zone name without interpreting it.
const NAIVE_FORMATS: [&str; 2] = ["%a, %d %b %Y %H:%M:%S %Z", "%Y-%m-%d %H:%M:%S"];

const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Parse a feed's publication date.
///
/// RFC 2822 is tried first since that is what `pubDate` is supposed to be,
/// then a handful of formats seen in the wild. Anything unrecognised yields
/// `None`; callers treat that as "undated" rather than an error.
pub fn parse_date(date_str: Option<&str>) -> Option<DateTime<FixedOffset>> {
    let date_str = date_str?.trim();
    if date_str.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt);
    }

    parse_relaxed_date(date_str)
}

fn parse_relaxed_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    if let Some(dt) = NaiveDateTime::parse_from_str(date_str, NAIVE_FORMATS[0])
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
    {
        return Some(dt);
    }

    for format in &OFFSET_FORMATS[..2] {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, NAIVE_FORMATS[1]) {
        return Some(naive.and_utc().fixed_offset());
    }

    if let Ok(dt) = DateTime::parse_from_str(date_str, OFFSET_FORMATS[2]) {
        return Some(dt);
    }

    NaiveDate::parse_from_str(date_str, DATE_ONLY_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Timestamp formatting for stored records.
//!
//! Every persisted timestamp uses the same second-precision `Z` form so that
//! string order matches time order (history sorting relies on this).

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time in stored form.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

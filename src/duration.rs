//! Report durations: 15 minute rounding and `HH:MM:SS` text form

use chrono::Duration;

/// Reports are stored in quarter hours.
pub const QUANTUM_SECS: i64 = 15 * 60;

/// A report covers one date, so at most a full day.
pub const MAX_REPORT_SECS: i64 = 24 * 3600;

/// Round to the nearest quarter hour. Exact halves go to the even quarter.
pub fn round_to_quarter(duration: Duration) -> Duration {
    let secs = duration.num_seconds();
    let quarters = secs.div_euclid(QUANTUM_SECS);
    let rem = secs.rem_euclid(QUANTUM_SECS);

    let rounded = match (rem * 2).cmp(&QUANTUM_SECS) {
        std::cmp::Ordering::Less => quarters,
        std::cmp::Ordering::Greater => quarters + 1,
        std::cmp::Ordering::Equal => quarters + quarters.rem_euclid(2),
    };

    Duration::seconds(rounded * QUANTUM_SECS)
}

/// Render as `HH:MM:SS`; hours are not wrapped at a day.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds();
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.abs();
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Parse `HH:MM:SS`, `HH:MM` or `D HH:MM:SS`. A single report never
/// exceeds [`MAX_REPORT_SECS`].
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("Invalid duration: {}", s);

    let (days, clock) = match s.split_once(' ') {
        Some((d, rest)) => (d.parse::<i64>().map_err(|_| invalid())?, rest.trim()),
        None => (0, s),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(invalid());
    }

    let mut fields = [0i64; 3];
    for (slot, part) in fields.iter_mut().zip(parts.iter()) {
        *slot = part.parse::<i64>().map_err(|_| invalid())?;
    }
    let [hours, minutes, seconds] = fields;
    if hours < 0 || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) || days < 0 {
        return Err(invalid());
    }

    let total = days
        .checked_mul(86_400)
        .and_then(|t| t.checked_add(hours.checked_mul(3600)?))
        .and_then(|t| t.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    if total > MAX_REPORT_SECS {
        return Err(format!("Duration may not exceed 24 hours: {}", s));
    }

    Duration::try_seconds(total).ok_or_else(invalid)
}

/// Sum of `durations`, `None` when it leaves the representable range
pub fn checked_total(durations: impl IntoIterator<Item = Duration>) -> Option<Duration> {
    durations
        .into_iter()
        .try_fold(Duration::zero(), |acc, d| acc.checked_add(&d))
}

/// serde adapter for `chrono::Duration` fields
pub mod serde_hms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::Duration;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            duration: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match duration {
                Some(d) => serializer.serialize_str(&crate::duration::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| crate::duration::parse_duration(&s))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}

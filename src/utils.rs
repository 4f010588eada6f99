use std::time::Duration;

use chrono::{DateTime, Utc};

/// Generates a random ID.
pub fn random_id() -> u64 {
    rand::random()
}

/// Parses a numeric field, falling back to the type default when the text is not a number.
pub fn parse_or_default<T>(field: Option<&str>) -> T
where
    T: std::str::FromStr + Default,
{
    field.and_then(|s| s.trim().parse().ok()).unwrap_or_default()
}

/// Width of a timeframe in microseconds, the resolution buckets are aligned on.
pub fn timeframe_micros(timeframe: Duration) -> i64 {
    i64::try_from(timeframe.as_micros()).unwrap_or(i64::MAX)
}

/// Returns the start of the bucket containing `time`: `floor(time / timeframe) * timeframe`.
///
/// Works for instants before the epoch too, the division rounds towards negative infinity.
pub fn bucket_start(time: DateTime<Utc>, timeframe: Duration) -> DateTime<Utc> {
    let width = timeframe_micros(timeframe);
    if width <= 0 {
        return time;
    }
    let start = time.timestamp_micros().div_euclid(width) * width;
    DateTime::from_timestamp_micros(start).unwrap_or(time)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn bucket_start_aligns_down() {
        let tf = Duration::from_secs(60);
        assert_eq!(bucket_start(at(0), tf), at(0));
        assert_eq!(bucket_start(at(59), tf), at(0));
        assert_eq!(bucket_start(at(60), tf), at(60));
        assert_eq!(bucket_start(at(61), tf), at(60));
    }

    #[test]
    fn bucket_start_before_epoch() {
        let tf = Duration::from_secs(60);
        assert_eq!(bucket_start(at(-1), tf), at(-60));
    }

    #[test]
    fn parse_defaults_to_zero() {
        assert_eq!(parse_or_default::<f64>(Some("1.5")), 1.5);
        assert_eq!(parse_or_default::<f64>(Some("abc")), 0.0);
        assert_eq!(parse_or_default::<f64>(None), 0.0);
        assert_eq!(parse_or_default::<i64>(Some("x1")), 0);
    }
}

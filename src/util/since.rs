//! Coarse "time ago" labels for comment listings.

use time::OffsetDateTime;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Elapsed time between `then` and `now` in the largest whole unit.
/// Timestamps in the future read as zero seconds.
pub fn since(now: OffsetDateTime, then: OffsetDateTime) -> String {
    let elapsed = (now.unix_timestamp() - then.unix_timestamp()).max(0);
    let (count, unit) = match elapsed {
        e if e < MINUTE => (e, "second"),
        e if e < HOUR => (e / MINUTE, "minute"),
        e if e < DAY => (e / HOUR, "hour"),
        e => (e / DAY, "day"),
    };
    if count > 1 {
        format!("{count} {unit}s")
    } else {
        format!("{count} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ago(seconds: i64) -> String {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        since(now, now - time::Duration::seconds(seconds))
    }

    #[test]
    fn labels_use_the_largest_whole_unit() {
        let cases = [
            (0, "0 second"),
            (1, "1 second"),
            (2, "2 seconds"),
            (59, "59 seconds"),
            (60, "1 minute"),
            (90, "1 minute"),
            (59 * MINUTE, "59 minutes"),
            (HOUR, "1 hour"),
            (23 * HOUR, "23 hours"),
            (DAY, "1 day"),
            (2 * DAY + HOUR, "2 days"),
            (10 * DAY, "10 days"),
        ];
        for (seconds, expected) in cases {
            assert_eq!(ago(seconds), expected, "{seconds}s");
        }
    }

    #[test]
    fn future_timestamps_read_as_zero() {
        assert_eq!(ago(-30), "0 second");
    }
}

//! Calendar breakdown of sensor timestamps

/// Seconds since the Unix epoch
pub type Timestamp = i64;

pub const SECS_PER_MINUTE: i64 = 60;
pub const SECS_PER_HOUR: i64 = 3600;

/// Minute of the local hour (0..=59) for a Unix timestamp.
///
/// `utc_offset_secs` is the local zone's offset east of UTC. Timestamps
/// before the epoch are valid and wrap the same way as later ones.
pub fn minute_of_hour(timestamp: Timestamp, utc_offset_secs: i32) -> u8 {
    let local = timestamp.saturating_add(i64::from(utc_offset_secs));
    (local.rem_euclid(SECS_PER_HOUR) / SECS_PER_MINUTE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_of_hour_utc() {
        assert_eq!(minute_of_hour(0, 0), 0);
        assert_eq!(minute_of_hour(59, 0), 0);
        assert_eq!(minute_of_hour(300, 0), 5);
        assert_eq!(minute_of_hour(3599, 0), 59);
        assert_eq!(minute_of_hour(3600, 0), 0);
        // 2023-07-21 14:37:12 UTC
        assert_eq!(minute_of_hour(1_689_950_232, 0), 37);
    }

    #[test]
    fn test_minute_of_hour_offset() {
        // Whole-hour zones leave the minute unchanged
        assert_eq!(minute_of_hour(300, 3600), 5);
        assert_eq!(minute_of_hour(300, -7200), 5);
        // Half-hour zones shift it
        assert_eq!(minute_of_hour(300, 19_800), 35);
        assert_eq!(minute_of_hour(300, -1800), 35);
    }

    #[test]
    fn test_minute_of_hour_before_epoch() {
        assert_eq!(minute_of_hour(-60, 0), 59);
        assert_eq!(minute_of_hour(-3600, 0), 0);
    }
}

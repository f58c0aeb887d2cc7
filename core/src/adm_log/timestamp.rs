use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

/// Maps the bare `HH:MM:SS` clock on each line onto a calendar date.
///
/// A rotated log covers at most one midnight, so any time-of-day earlier
/// than the file's nominal start time belongs to the following day.
#[derive(Debug, Clone, Copy)]
pub struct TimestampResolver {
    base_date: NaiveDate,
    start_time: NaiveTime,
}

impl TimestampResolver {
    pub fn new(base_date: NaiveDate, start_time: NaiveTime) -> Self {
        Self {
            base_date,
            start_time,
        }
    }

    /// Resolve a `HH:MM:SS` fragment against the file's date. None when the
    /// clock digits are out of range.
    pub fn resolve(&self, clock: &str) -> Option<NaiveDateTime> {
        let time = parse_clock(clock)?;
        if time
            .signed_duration_since(self.start_time)
            .num_milliseconds()
            < 0
        {
            self.base_date
                .and_time(time)
                .checked_add_days(Days::new(1))
        } else {
            Some(self.base_date.and_time(time))
        }
    }
}

/// Callers guarantee digit bytes via the `\d{2}:\d{2}:\d{2}` capture; only
/// the range check remains.
fn parse_clock(clock: &str) -> Option<NaiveTime> {
    let b = clock.as_bytes();
    if b.len() != 8 || b[2] != b':' || b[5] != b':' {
        return None;
    }

    let hour = (b[0] - b'0') * 10 + (b[1] - b'0');
    let minute = (b[3] - b'0') * 10 + (b[4] - b'0');
    let second = (b[6] - b'0') * 10 + (b[7] - b'0');

    NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
}

/// Session header the server writes when a log opens:
/// `AdminLog started on 2024-03-01 at 10:30:45`
pub fn parse_session_header(line: &str) -> Option<(NaiveDate, NaiveTime)> {
    let rest = line.trim().strip_prefix("AdminLog started on ")?;
    let (date_part, time_part) = rest.split_once(" at ")?;
    let date = NaiveDate::parse_from_str(date_part.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time_part.trim(), "%H:%M:%S").ok()?;
    Some((date, time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TimestampResolver {
        TimestampResolver::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveTime::from_hms_opt(22, 15, 0).unwrap(),
        )
    }

    #[test]
    fn same_day_resolution() {
        let ts = resolver().resolve("23:59:58").unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 23:59:58");
    }

    #[test]
    fn clock_before_start_rolls_to_next_day() {
        let ts = resolver().resolve("00:00:05").unwrap();
        assert_eq!(ts.to_string(), "2024-03-02 00:00:05");
    }

    #[test]
    fn start_time_itself_stays_on_base_date() {
        let ts = resolver().resolve("22:15:00").unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 22:15:00");
    }

    #[test]
    fn out_of_range_clock_is_rejected() {
        assert_eq!(resolver().resolve("25:00:00"), None);
        assert_eq!(resolver().resolve("12:61:00"), None);
        assert_eq!(resolver().resolve("12:00"), None);
    }

    #[test]
    fn session_header_parses() {
        let (date, time) = parse_session_header("AdminLog started on 2024-03-01 at 10:30:45").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(time, NaiveTime::from_hms_opt(10, 30, 45).unwrap());
    }

    #[test]
    fn session_header_rejects_other_lines() {
        assert_eq!(parse_session_header("12:00:00 | Player \"a\" connected"), None);
        assert_eq!(parse_session_header("AdminLog started on yesterday"), None);
    }
}

//! Conversions between wall-clock time of day and integer minutes or seconds
//! since local midnight.
//!
//! All delay arithmetic in the planner happens on these integers. Absent
//! times stay absent: the `opt_*` variants map `None` to `None`.

use chrono::{NaiveTime, Timelike};

pub fn time_to_minutes(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

pub fn time_to_seconds(time: NaiveTime) -> i32 {
    time.num_seconds_from_midnight() as i32
}

/// Inverse of `time_to_minutes`. Values outside one day wrap around midnight.
pub fn minutes_to_time(minutes: i32) -> NaiveTime {
    let minutes = minutes.rem_euclid(24 * 60) as u32;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap()
}

/// Inverse of `time_to_seconds`. Values outside one day wrap around midnight.
pub fn seconds_to_time(seconds: i32) -> NaiveTime {
    let seconds = seconds.rem_euclid(24 * 60 * 60) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap()
}

pub fn opt_time_to_minutes(time: Option<NaiveTime>) -> Option<i32> {
    time.map(time_to_minutes)
}

pub fn opt_time_to_seconds(time: Option<NaiveTime>) -> Option<i32> {
    time.map(time_to_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn minutes_roundtrip() {
        assert_eq!(time_to_minutes(hm(10, 5)), 605);
        assert_eq!(minutes_to_time(605), hm(10, 5));
        assert_eq!(minutes_to_time(0), hm(0, 0));
    }

    #[test]
    fn minutes_wrap_around_midnight() {
        assert_eq!(minutes_to_time(24 * 60 + 30), hm(0, 30));
        assert_eq!(minutes_to_time(-10), hm(23, 50));
    }

    #[test]
    fn seconds_roundtrip() {
        let t = NaiveTime::from_hms_opt(6, 45, 30).unwrap();
        assert_eq!(time_to_seconds(t), 6 * 3600 + 45 * 60 + 30);
        assert_eq!(seconds_to_time(time_to_seconds(t)), t);
    }

    #[test]
    fn seconds_below_a_minute_are_dropped_from_minutes() {
        let t = NaiveTime::from_hms_opt(10, 5, 59).unwrap();
        assert_eq!(time_to_minutes(t), 605);
    }

    #[test]
    fn absent_times_propagate() {
        assert_eq!(opt_time_to_minutes(None), None);
        assert_eq!(opt_time_to_minutes(Some(hm(1, 1))), Some(61));
        assert_eq!(opt_time_to_seconds(None), None);
    }
}

//! Agency operating hours, parsed from the "HH:MM[:SS]" strings agencies are stored with.

use chrono::{NaiveTime, Timelike, Weekday};

/// Minutes since midnight.
pub type Minutes = u32;

/// Parses "HH:MM" or "HH:MM:SS" into minutes since midnight.
///
/// Blank or malformed input yields `None`, which callers treat as unset.
pub fn parse_time_of_day(value: &str) -> Option<Minutes> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let time = NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()?;

    Some(minutes_of_day(time))
}

/// Canonical "HH:MM" form agencies are stored with.
pub fn format_time_of_day(minutes: Minutes) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Truncates a wall-clock time to whole minutes since midnight.
pub fn minutes_of_day(time: NaiveTime) -> Minutes {
    time.hour() * 60 + time.minute()
}

fn parse_opt(value: Option<&str>) -> Option<Minutes> {
    value.and_then(parse_time_of_day)
}

/// Parsed operating hours of an agency. Every boundary is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgencySchedule {
    pub opening: Option<Minutes>,
    pub closing: Option<Minutes>,
    pub lunch_start: Option<Minutes>,
    pub lunch_end: Option<Minutes>,
    pub operating_days: Vec<Weekday>,
}

impl AgencySchedule {
    /// Builds a schedule from the raw agency columns, dropping anything unparseable.
    pub fn from_raw(
        opening: Option<&str>,
        closing: Option<&str>,
        lunch_start: Option<&str>,
        lunch_end: Option<&str>,
        operating_days: Option<&str>,
    ) -> Self {
        Self {
            opening: parse_opt(opening),
            closing: parse_opt(closing),
            lunch_start: parse_opt(lunch_start),
            lunch_end: parse_opt(lunch_end),
            operating_days: operating_days.map(parse_operating_days).unwrap_or_default(),
        }
    }

    pub fn is_operating_day(&self, day: Weekday) -> bool {
        self.operating_days.is_empty() || self.operating_days.contains(&day)
    }
}

/// Parses a comma separated list such as "Monday, Tuesday,Wed".
///
/// Unknown names are skipped.
pub fn parse_operating_days(value: &str) -> Vec<Weekday> {
    let mut days = Vec::new();
    for name in value.split(',') {
        if let Some(day) = parse_weekday(name) {
            if !days.contains(&day) {
                days.push(day);
            }
        }
    }
    days
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    let name = name.trim().to_ascii_lowercase();
    let day = match name.as_str() {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hh_mm() {
        assert_eq!(parse_time_of_day("08:00"), Some(480));
        assert_eq!(parse_time_of_day("17:30"), Some(1050));
    }

    #[test]
    fn test_parse_hh_mm_ss_drops_seconds() {
        assert_eq!(parse_time_of_day("12:00:59"), Some(720));
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        assert_eq!(format_time_of_day(480), "08:00");
        assert_eq!(format_time_of_day(1050), "17:30");
        let stored = format_time_of_day(parse_time_of_day(" 07:05:30 ").unwrap());
        assert_eq!(stored, "07:05");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_time_of_day(""), None);
        assert_eq!(parse_time_of_day("   "), None);
        assert_eq!(parse_time_of_day("noon"), None);
        assert_eq!(parse_time_of_day("25:00"), None);
    }

    #[test]
    fn test_schedule_from_raw_treats_bad_values_as_unset() {
        let s = AgencySchedule::from_raw(Some("08:00"), Some("bogus"), None, Some(""), None);
        assert_eq!(s.opening, Some(480));
        assert_eq!(s.closing, None);
        assert_eq!(s.lunch_start, None);
        assert_eq!(s.lunch_end, None);
    }

    #[test]
    fn test_operating_days_mixed_forms() {
        let days = parse_operating_days("Monday, tue,WEDNESDAY, Funday, mon");
        assert_eq!(days, vec![Weekday::Mon, Weekday::Tue, Weekday::Wed]);
    }

    #[test]
    fn test_empty_operating_days_means_every_day() {
        let s = AgencySchedule::default();
        assert!(s.is_operating_day(Weekday::Sun));

        let s = AgencySchedule::from_raw(None, None, None, None, Some("Monday,Friday"));
        assert!(s.is_operating_day(Weekday::Fri));
        assert!(!s.is_operating_day(Weekday::Sat));
    }
}

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A restriction schedule as published by the remote authority
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: i64,

    /// Display name; also selects the restriction category
    pub name: String,

    /// Start of the window, "HH:MM" local time
    pub start_time: String,

    /// End of the window, "HH:MM" local time; earlier than start means overnight
    pub end_time: String,

    #[serde(default)]
    pub days: Vec<String>,

    /// Newer servers send this instead of `days`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<String>>,

    #[serde(default)]
    pub is_active: bool,
}

impl Schedule {
    /// Start and end as minutes since midnight, if both parse
    pub fn window(&self) -> Option<(MinuteOfDay, MinuteOfDay)> {
        let start = MinuteOfDay::parse(&self.start_time)?;
        let end = MinuteOfDay::parse(&self.end_time)?;
        Some((start, end))
    }

    /// The effective day list (`daysOfWeek`, falling back to `days`)
    pub fn day_names(&self) -> &[String] {
        match &self.days_of_week {
            Some(days) if !days.is_empty() => days,
            _ => &self.days,
        }
    }

    pub fn day_set(&self) -> DaySet {
        DaySet::from_names(self.day_names())
    }
}

/// Minutes since local midnight, 0..1440
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self((hour * 60 + minute) as u16))
    }

    /// Like `new`, but folds out-of-range components back into the day
    pub fn wrapping(hour: u32, minute: u32) -> Self {
        Self(((hour % 24) * 60 + minute % 60) as u16)
    }

    /// Parse "HH:MM" (seconds, if present, are ignored)
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split(':');
        let hour = parts.next()?.trim().parse::<u32>().ok()?;
        let minute = parts.next()?.trim().parse::<u32>().ok()?;
        if let Some(seconds) = parts.next() {
            seconds.trim().parse::<u32>().ok().filter(|s| *s < 60)?;
        }
        if parts.next().is_some() {
            return None;
        }
        Self::new(hour, minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Which weekdays a schedule applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaySet {
    /// Empty or entirely unparseable day list
    Every,
    Only(Vec<Weekday>),
}

impl DaySet {
    pub fn from_names(names: &[String]) -> Self {
        let mut days: Vec<Weekday> = names.iter().filter_map(|n| parse_weekday(n)).collect();
        if days.is_empty() {
            return Self::Every;
        }
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        Self::Only(days)
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        match self {
            Self::Every => true,
            Self::Only(days) => days.contains(&weekday),
        }
    }
}

/// Accepts full English names and abbreviations of at least three letters,
/// case-insensitively ("Mon", "tues", "THURSDAY").
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    const NAMES: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];

    let name = name.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }

    NAMES
        .iter()
        .find(|(full, _)| full.starts_with(name.as_str()))
        .map(|(_, day)| *day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(days: &[&str]) -> Schedule {
        Schedule {
            id: 1,
            name: "Homework".to_string(),
            start_time: "16:00".to_string(),
            end_time: "18:30".to_string(),
            days: days.iter().map(|d| d.to_string()).collect(),
            days_of_week: None,
            is_active: true,
        }
    }

    #[test]
    fn parse_minute_of_day() {
        assert_eq!(MinuteOfDay::parse("00:00").unwrap().minutes(), 0);
        assert_eq!(MinuteOfDay::parse("22:30").unwrap().minutes(), 1350);
        assert_eq!(MinuteOfDay::parse("7:05").unwrap().minutes(), 425);
        assert_eq!(MinuteOfDay::parse("23:59:59").unwrap().minutes(), 1439);
    }

    #[test]
    fn parse_minute_of_day_rejects_garbage() {
        assert!(MinuteOfDay::parse("24:00").is_none());
        assert!(MinuteOfDay::parse("12:60").is_none());
        assert!(MinuteOfDay::parse("noon").is_none());
        assert!(MinuteOfDay::parse("12").is_none());
        assert!(MinuteOfDay::parse("1:2:3:4").is_none());
    }

    #[test]
    fn minute_of_day_displays_as_clock() {
        assert_eq!(MinuteOfDay::new(6, 5).unwrap().to_string(), "06:05");
    }

    #[test]
    fn parse_weekday_variants() {
        assert_eq!(parse_weekday("Monday"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("tue"), Some(Weekday::Tue));
        assert_eq!(parse_weekday("TUES"), Some(Weekday::Tue));
        assert_eq!(parse_weekday(" sunday "), Some(Weekday::Sun));
        assert_eq!(parse_weekday("mo"), None);
        assert_eq!(parse_weekday("funday"), None);
    }

    #[test]
    fn empty_day_set_applies_every_day() {
        assert_eq!(schedule(&[]).day_set(), DaySet::Every);
        assert!(schedule(&[]).day_set().contains(Weekday::Wed));
    }

    #[test]
    fn malformed_day_set_applies_every_day() {
        let set = schedule(&["weekdays", "1"]).day_set();
        assert_eq!(set, DaySet::Every);
    }

    #[test]
    fn day_set_ignores_unparseable_entries_when_some_parse() {
        let set = schedule(&["mon", "someday", "Fri"]).day_set();
        assert_eq!(set, DaySet::Only(vec![Weekday::Mon, Weekday::Fri]));
        assert!(!set.contains(Weekday::Tue));
    }

    #[test]
    fn days_of_week_takes_precedence_over_days() {
        let mut s = schedule(&["mon"]);
        s.days_of_week = Some(vec!["sat".to_string()]);
        assert_eq!(s.day_set(), DaySet::Only(vec![Weekday::Sat]));

        s.days_of_week = Some(vec![]);
        assert_eq!(s.day_set(), DaySet::Only(vec![Weekday::Mon]));
    }

    #[test]
    fn schedule_decodes_from_wire_json() {
        let json = r#"{
            "id": 12,
            "name": "Bedtime",
            "startTime": "21:30",
            "endTime": "06:45",
            "days": ["monday", "tuesday"],
            "isActive": true
        }"#;

        let schedule: Schedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.id, 12);
        assert!(schedule.is_active);
        let (start, end) = schedule.window().unwrap();
        assert_eq!(start.to_string(), "21:30");
        assert_eq!(end.to_string(), "06:45");
        assert!(schedule.days_of_week.is_none());
    }
}

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

use super::model::{MinuteOfDay, Schedule};
use crate::restriction::RestrictionLevel;

/// Wall-clock position used for evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalInstant {
    pub minute_of_day: MinuteOfDay,
    pub weekday: Weekday,
}

impl LocalInstant {
    pub fn new(hour: u32, minute: u32, weekday: Weekday) -> Option<Self> {
        Some(Self {
            minute_of_day: MinuteOfDay::new(hour, minute)?,
            weekday,
        })
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self {
            minute_of_day: MinuteOfDay::wrapping(at.hour(), at.minute()),
            weekday: at.weekday(),
        }
    }
}

/// Outcome of evaluating a schedule list at one instant
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    pub active: Vec<&'a Schedule>,
    pub level: RestrictionLevel,
}

impl Evaluation<'_> {
    pub fn should_lock(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_names(&self) -> Vec<&str> {
        self.active.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Pure mapping from (instant, schedules) to active schedules and a level
pub struct ScheduleEvaluator;

impl ScheduleEvaluator {
    pub fn evaluate(now: LocalInstant, schedules: &[Schedule]) -> Evaluation<'_> {
        let active: Vec<&Schedule> = schedules
            .iter()
            .filter(|s| Self::is_active(s, now))
            .collect();
        let level = Self::restriction_level(&active);

        Evaluation { active, level }
    }

    /// Whether a single schedule covers `now`
    pub fn is_active(schedule: &Schedule, now: LocalInstant) -> bool {
        if !schedule.is_active {
            return false;
        }

        let Some((start, end)) = schedule.window() else {
            tracing::warn!(
                "Schedule {} ({}) has an unreadable window {}-{}; treating as inactive",
                schedule.id,
                schedule.name,
                schedule.start_time,
                schedule.end_time
            );
            return false;
        };

        if !schedule.day_set().contains(now.weekday) {
            return false;
        }

        Self::window_contains(start, end, now.minute_of_day)
    }

    /// Inclusive window test; `end < start` wraps past midnight
    pub fn window_contains(start: MinuteOfDay, end: MinuteOfDay, now: MinuteOfDay) -> bool {
        if end >= start {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        }
    }

    /// Aggregate level for the active set: the most severe category matched,
    /// level 2 when something is active but uncategorised, level 0 when idle.
    pub fn restriction_level(active: &[&Schedule]) -> RestrictionLevel {
        if active.is_empty() {
            return RestrictionLevel::None;
        }

        active
            .iter()
            .filter_map(|s| Self::category_level(&s.name))
            .max()
            .unwrap_or(RestrictionLevel::WifiBlocked)
    }

    /// Category keyword match on a schedule name
    fn category_level(name: &str) -> Option<RestrictionLevel> {
        let name = name.to_lowercase();
        let has = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));

        if has(&["sleep", "bed"]) {
            Some(RestrictionLevel::FullBlock)
        } else if has(&["study", "school"]) {
            Some(RestrictionLevel::WifiBlocked)
        } else if has(&["limit"]) {
            Some(RestrictionLevel::AppOnly)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_schedule(name: &str, start: &str, end: &str) -> Schedule {
        Schedule {
            id: 1,
            name: name.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            days: vec![],
            days_of_week: None,
            is_active: true,
        }
    }

    fn at(hour: u32, minute: u32) -> LocalInstant {
        LocalInstant::new(hour, minute, Weekday::Wed).unwrap()
    }

    fn mins(hour: u32, minute: u32) -> MinuteOfDay {
        MinuteOfDay::new(hour, minute).unwrap()
    }

    #[test]
    fn same_day_window_is_inclusive() {
        let (start, end) = (mins(9, 0), mins(15, 0));
        for minute in 0..MinuteOfDay::MINUTES_PER_DAY {
            let now = MinuteOfDay::new(u32::from(minute / 60), u32::from(minute % 60)).unwrap();
            let expected = start <= now && now <= end;
            assert_eq!(ScheduleEvaluator::window_contains(start, end, now), expected);
        }
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let (start, end) = (mins(22, 0), mins(6, 0));
        for minute in 0..MinuteOfDay::MINUTES_PER_DAY {
            let now = MinuteOfDay::new(u32::from(minute / 60), u32::from(minute % 60)).unwrap();
            let expected = now >= start || now <= end;
            assert_eq!(ScheduleEvaluator::window_contains(start, end, now), expected);
        }
    }

    #[test]
    fn equal_start_and_end_covers_that_minute_only() {
        let t = mins(12, 0);
        assert!(ScheduleEvaluator::window_contains(t, t, t));
        assert!(!ScheduleEvaluator::window_contains(t, t, mins(12, 1)));
    }

    #[test]
    fn sleep_schedule_late_evening_is_full_block() {
        let schedules = vec![make_schedule("Sleep", "22:00", "06:00")];
        let eval = ScheduleEvaluator::evaluate(at(23, 30), &schedules);

        assert!(eval.should_lock());
        assert_eq!(eval.level, RestrictionLevel::FullBlock);
    }

    #[test]
    fn sleep_schedule_morning_after_is_idle() {
        let schedules = vec![make_schedule("Sleep", "22:00", "06:00")];
        let eval = ScheduleEvaluator::evaluate(at(7, 0), &schedules);

        assert!(!eval.should_lock());
        assert_eq!(eval.level, RestrictionLevel::None);
    }

    #[test]
    fn inactive_flag_disables_schedule() {
        let mut schedule = make_schedule("Sleep", "00:00", "23:59");
        schedule.is_active = false;
        assert!(!ScheduleEvaluator::is_active(&schedule, at(12, 0)));
    }

    #[test]
    fn unreadable_window_is_inactive() {
        let schedule = make_schedule("Sleep", "late", "06:00");
        assert!(!ScheduleEvaluator::is_active(&schedule, at(23, 0)));
    }

    #[test]
    fn weekday_must_match_listed_days() {
        let mut schedule = make_schedule("School", "08:00", "15:00");
        schedule.days = vec!["monday".to_string(), "friday".to_string()];

        let monday = LocalInstant::new(10, 0, Weekday::Mon).unwrap();
        let tuesday = LocalInstant::new(10, 0, Weekday::Tue).unwrap();
        assert!(ScheduleEvaluator::is_active(&schedule, monday));
        assert!(!ScheduleEvaluator::is_active(&schedule, tuesday));
    }

    #[test]
    fn category_levels_by_keyword() {
        assert_eq!(ScheduleEvaluator::category_level("Bedtime"), Some(RestrictionLevel::FullBlock));
        assert_eq!(ScheduleEvaluator::category_level("SLEEP"), Some(RestrictionLevel::FullBlock));
        assert_eq!(ScheduleEvaluator::category_level("Study hall"), Some(RestrictionLevel::WifiBlocked));
        assert_eq!(ScheduleEvaluator::category_level("school run"), Some(RestrictionLevel::WifiBlocked));
        assert_eq!(ScheduleEvaluator::category_level("Screen limit"), Some(RestrictionLevel::AppOnly));
        assert_eq!(ScheduleEvaluator::category_level("Dinner"), None);
    }

    #[test]
    fn most_severe_category_wins() {
        let limit = make_schedule("Game limit", "00:00", "23:59");
        let study = make_schedule("Study", "00:00", "23:59");
        let bed = make_schedule("Bed", "00:00", "23:59");

        assert_eq!(
            ScheduleEvaluator::restriction_level(&[&limit, &study]),
            RestrictionLevel::WifiBlocked
        );
        assert_eq!(
            ScheduleEvaluator::restriction_level(&[&limit, &study, &bed]),
            RestrictionLevel::FullBlock
        );
    }

    #[test]
    fn uncategorised_active_schedule_defaults_to_wifi_block() {
        let dinner = make_schedule("Dinner", "00:00", "23:59");
        assert_eq!(
            ScheduleEvaluator::restriction_level(&[&dinner]),
            RestrictionLevel::WifiBlocked
        );
    }

    #[test]
    fn categorised_schedule_beats_default_for_uncategorised_neighbour() {
        let dinner = make_schedule("Dinner", "00:00", "23:59");
        let limit = make_schedule("Limit", "00:00", "23:59");
        assert_eq!(
            ScheduleEvaluator::restriction_level(&[&dinner, &limit]),
            RestrictionLevel::AppOnly
        );
    }

    #[test]
    fn local_instant_from_datetime() {
        use chrono::{FixedOffset, TimeZone};

        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = tz.with_ymd_and_hms(2025, 3, 14, 23, 30, 0).unwrap();
        let instant = LocalInstant::from_datetime(&dt);

        assert_eq!(instant.minute_of_day, mins(23, 30));
        assert_eq!(instant.weekday, Weekday::Fri);
    }
}

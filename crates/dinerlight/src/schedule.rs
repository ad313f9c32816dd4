//! Client-side checks applied before a schedule is sent to the backend.
//!
//! The backend stores whatever rules it is given, so two enabled rules can
//! claim the same day with no defined precedence. Those schedules are rejected
//! here instead.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::ScheduleRule;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("unknown day '{0}'")]
    UnknownDay(String),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("rule {index} is enabled but has no days")]
    EmptyDays { index: usize },

    #[error("{day} is claimed by both rule {first} and rule {second}")]
    OverlappingDays {
        day: Weekday,
        first: usize,
        second: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Weekday {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Weekday {
    /// Label used on the wire and in the schedule screen.
    pub fn label(self) -> &'static str {
        match self {
            Weekday::Sun => "SUN",
            Weekday::Mon => "MON",
            Weekday::Tue => "TUES",
            Weekday::Wed => "WED",
            Weekday::Thu => "THURS",
            Weekday::Fri => "FRI",
            Weekday::Sat => "SAT",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Weekday {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let day = match raw.trim().to_ascii_uppercase().as_str() {
            "SUN" | "SUNDAY" => Weekday::Sun,
            "MON" | "MONDAY" => Weekday::Mon,
            "TUE" | "TUES" | "TUESDAY" => Weekday::Tue,
            "WED" | "WEDNESDAY" => Weekday::Wed,
            "THU" | "THUR" | "THURS" | "THURSDAY" => Weekday::Thu,
            "FRI" | "FRIDAY" => Weekday::Fri,
            "SAT" | "SATURDAY" => Weekday::Sat,
            _ => return Err(ScheduleError::UnknownDay(raw.to_string())),
        };
        Ok(day)
    }
}

/// A 24h wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ScheduleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTime(raw.to_string());
        let (hour, minute) = raw.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(hour) || hour.len() > 2 || !digits(minute) || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

pub fn validate_time_pair(start: &str, end: &str) -> Result<(ClockTime, ClockTime), ScheduleError> {
    Ok((start.parse()?, end.parse()?))
}

/// Rejects rule sets the backend would store with ambiguous meaning.
pub fn validate_rules(rules: &[ScheduleRule]) -> Result<(), ScheduleError> {
    let mut claimed: HashMap<Weekday, usize> = HashMap::new();
    for (index, rule) in rules.iter().enumerate() {
        validate_time_pair(&rule.start_time, &rule.end_time)?;
        let days = rule
            .days
            .iter()
            .map(|day| day.parse::<Weekday>())
            .collect::<Result<Vec<_>, _>>()?;
        if !rule.enabled {
            continue;
        }
        if days.is_empty() {
            return Err(ScheduleError::EmptyDays { index });
        }
        for day in days {
            match claimed.get(&day) {
                Some(&owner) if owner != index => {
                    return Err(ScheduleError::OverlappingDays {
                        day,
                        first: owner,
                        second: index,
                    });
                }
                Some(_) => {}
                None => {
                    claimed.insert(day, index);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_accepts_screen_labels_and_aliases() {
        assert_eq!("TUES".parse::<Weekday>().unwrap(), Weekday::Tue);
        assert_eq!("tue".parse::<Weekday>().unwrap(), Weekday::Tue);
        assert_eq!("Thursday".parse::<Weekday>().unwrap(), Weekday::Thu);
        assert_eq!(Weekday::Thu.label(), "THURS");
        assert!(matches!(
            "FUNDAY".parse::<Weekday>(),
            Err(ScheduleError::UnknownDay(_))
        ));
    }

    #[test]
    fn clock_time_parses_24h() {
        let time: ClockTime = "8:05".parse().unwrap();
        assert_eq!((time.hour(), time.minute()), (8, 5));
        assert_eq!(time.to_string(), "08:05");
        assert_eq!("23:59".parse::<ClockTime>().unwrap().to_string(), "23:59");
        for bad in ["24:00", "12:60", "12:5", "1200", "ab:cd", "", "-1:30", "123:00"] {
            assert!(bad.parse::<ClockTime>().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn rules_on_distinct_days_pass() {
        let rules = vec![
            ScheduleRule::new(["MON", "TUES", "WED"], "18:00", "23:30"),
            ScheduleRule::new(["FRI", "SAT"], "17:00", "01:00"),
            ScheduleRule::new(["MON"], "06:00", "08:00").disabled(),
        ];
        assert_eq!(validate_rules(&rules), Ok(()));
    }

    #[test]
    fn overlapping_enabled_days_are_rejected() {
        let rules = vec![
            ScheduleRule::new(["MON", "TUES"], "18:00", "23:30"),
            ScheduleRule::new(["sat", "tue"], "10:00", "12:00"),
        ];
        assert_eq!(
            validate_rules(&rules),
            Err(ScheduleError::OverlappingDays {
                day: Weekday::Tue,
                first: 0,
                second: 1
            })
        );
    }

    #[test]
    fn repeated_day_within_one_rule_is_not_a_conflict() {
        let rules = vec![ScheduleRule::new(["MON", "MON"], "18:00", "23:30")];
        assert_eq!(validate_rules(&rules), Ok(()));
    }

    #[test]
    fn enabled_rule_needs_days() {
        let rules = vec![ScheduleRule::new(Vec::<String>::new(), "18:00", "23:30")];
        assert_eq!(
            validate_rules(&rules),
            Err(ScheduleError::EmptyDays { index: 0 })
        );
    }

    #[test]
    fn disabled_rules_still_need_valid_times() {
        let rules = vec![ScheduleRule::new(["SUN"], "18:00", "7pm").disabled()];
        assert_eq!(
            validate_rules(&rules),
            Err(ScheduleError::InvalidTime("7pm".into()))
        );
    }
}

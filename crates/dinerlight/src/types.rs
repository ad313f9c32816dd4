use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type RestaurantId = i64;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == PowerState::On
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerState::On => f.write_str("on"),
            PowerState::Off => f.write_str("off"),
        }
    }
}

/// Device state as the backend last reported it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub restaurant_id: RestaurantId,
    pub state: PowerState,
    pub brightness: f64,
    pub last_updated: String,
}

impl DeviceStatus {
    pub fn is_on(&self) -> bool {
        self.state.is_on()
    }

    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.last_updated)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub restaurant_id: RestaurantId,
    pub action: String,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    pub fn kind(&self) -> HistoryAction<'_> {
        HistoryAction::parse(&self.action)
    }
}

/// Classification of the backend's free-form history action strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction<'a> {
    TurnedOn,
    TurnedOff,
    Toggled,
    ScheduleSet {
        on: Option<&'a str>,
        off: Option<&'a str>,
    },
    Other(&'a str),
}

impl<'a> HistoryAction<'a> {
    pub fn parse(action: &'a str) -> Self {
        match action {
            "toggle_on" => HistoryAction::TurnedOn,
            "toggle_off" => HistoryAction::TurnedOff,
            "toggle" => HistoryAction::Toggled,
            "schedule_set" => HistoryAction::ScheduleSet {
                on: None,
                off: None,
            },
            other => match other
                .strip_prefix("schedule_set_")
                .and_then(|times| times.split_once('_'))
            {
                Some((on, off)) => HistoryAction::ScheduleSet {
                    on: Some(on),
                    off: Some(off),
                },
                None => HistoryAction::Other(other),
            },
        }
    }
}

impl fmt::Display for HistoryAction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::TurnedOn => f.write_str("Turned on"),
            HistoryAction::TurnedOff => f.write_str("Turned off"),
            HistoryAction::Toggled => f.write_str("Toggled"),
            HistoryAction::ScheduleSet {
                on: Some(on),
                off: Some(off),
            } => write!(f, "Schedule set ({} -> {})", on, off),
            HistoryAction::ScheduleSet { .. } => f.write_str("Schedule set"),
            HistoryAction::Other(action) => f.write_str(action),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    pub days: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

impl ScheduleRule {
    pub fn new<I, S>(days: I, start_time: impl Into<String>, end_time: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            days: days.into_iter().map(Into::into).collect(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Full set of day-specific rules, as round-tripped through the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "identifier_as_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub restaurant_id: Option<String>,
    #[serde(default)]
    pub rules: Vec<ScheduleRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Schedule {
    /// True when both schedules hold the same rules, ignoring server-added
    /// identifiers and timestamps.
    pub fn same_rules(&self, other: &Schedule) -> bool {
        self.rules == other.rules
    }

    pub fn enabled_rules(&self) -> impl Iterator<Item = &ScheduleRule> {
        self.rules.iter().filter(|rule| rule.enabled)
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToggleRequest {
    pub restaurant_id: RestaurantId,
    pub action: &'static str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleRequest<'a> {
    pub restaurant_id: RestaurantId,
    pub schedule_on: &'a str,
    pub schedule_off: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FullScheduleRequest<'a> {
    pub restaurant_id: RestaurantId,
    pub rules: &'a [ScheduleRule],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Identifier {
    Text(String),
    Number(i64),
}

fn identifier_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<Identifier>::deserialize(deserializer)?.map(|id| match id {
            Identifier::Text(text) => text,
            Identifier::Number(number) => number.to_string(),
        }),
    )
}

/// Parses backend timestamps. Offsetless ISO timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

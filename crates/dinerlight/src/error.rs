use std::fmt;

use thiserror::Error;

use crate::schedule::ScheduleError;

/// Backend calls the client can make. Also used as the key for the store's
/// in-flight tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Status,
    History,
    Toggle,
    Schedule,
    SaveFullSchedule,
    LoadFullSchedule,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Status => "Status",
            Operation::History => "History",
            Operation::Toggle => "Toggle",
            Operation::Schedule => "Schedule",
            Operation::SaveFullSchedule => "Full schedule",
            Operation::LoadFullSchedule => "Load schedule",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum LightingError {
    #[error("{operation} request failed ({status})")]
    Request { operation: Operation, status: u16 },

    #[error("{operation} request could not reach the backend: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} response could not be decoded: {source}")]
    Decode {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    #[error("config error: {0}")]
    Config(String),

    #[error("lighting store is closed")]
    Closed,
}

impl LightingError {
    /// HTTP status carried by a failed request, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LightingError::Request { status, .. } => Some(*status),
            LightingError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            LightingError::Request { operation, .. }
            | LightingError::Transport { operation, .. }
            | LightingError::Decode { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

pub type LightingResult<T> = Result<T, LightingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_message_carries_status() {
        let err = LightingError::Request {
            operation: Operation::Toggle,
            status: 500,
        };
        assert_eq!(err.to_string(), "Toggle request failed (500)");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.operation(), Some(Operation::Toggle));
    }

    #[test]
    fn schedule_errors_convert() {
        let err: LightingError = ScheduleError::InvalidTime("25:00".into()).into();
        assert!(matches!(err, LightingError::InvalidSchedule(_)));
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("25:00"));
    }
}

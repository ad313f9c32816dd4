//! Client-side model of a restaurant's exterior lighting.
//!
//! [`LightingClient`] talks to the lighting backend over HTTP, and
//! [`LightingStore`] keeps the last snapshot the backend reported so a view
//! layer can render it.

pub mod client;
pub mod config;
pub mod error;
pub mod schedule;
pub mod store;
pub mod types;

pub use client::{LightingApi, LightingClient};
pub use config::ClientConfig;
pub use error::{LightingError, LightingResult, Operation};
pub use schedule::{ClockTime, ScheduleError, Weekday};
pub use store::{LightingStore, StoreEvent, StoreSnapshot};
pub use types::{
    DeviceStatus, HistoryAction, HistoryEntry, PowerState, RestaurantId, Schedule, ScheduleRule,
};

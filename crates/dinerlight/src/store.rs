//! Shared snapshot of backend-reported lighting state.
//!
//! Every field of the snapshot is replaced wholesale by the call that fetched
//! it, so observers can briefly see fresh history next to a stale status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::{LightingApi, LightingClient};
use crate::config::ClientConfig;
use crate::error::{LightingError, LightingResult, Operation};
use crate::schedule::{validate_rules, validate_time_pair};
use crate::types::{DeviceStatus, HistoryEntry, RestaurantId, Schedule, ScheduleRule};

/// What changed in the store. Views re-read the parts they render.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Status,
    History,
    Schedule,
    Loading { operation: Operation, active: bool },
    Error(Option<String>),
    Closed,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub restaurant_id: RestaurantId,
    pub status: Option<DeviceStatus>,
    pub history: Vec<HistoryEntry>,
    pub schedule: Option<Schedule>,
    pub loading: bool,
    pub error: Option<String>,
}

impl StoreSnapshot {
    pub fn is_on(&self) -> bool {
        self.status.as_ref().is_some_and(DeviceStatus::is_on)
    }

    pub fn brightness(&self) -> f64 {
        self.status.as_ref().map_or(0.0, |status| status.brightness)
    }

    pub fn last_updated(&self) -> &str {
        self.status
            .as_ref()
            .map_or("", |status| status.last_updated.as_str())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    status: Option<DeviceStatus>,
    history: Vec<HistoryEntry>,
    schedule: Option<Schedule>,
    error: Option<String>,
}

struct StoreInner {
    api: Arc<dyn LightingApi>,
    restaurant_id: RestaurantId,
    state: Mutex<StoreState>,
    in_flight: Mutex<HashMap<Operation, usize>>,
    subscribers: Mutex<Vec<flume::Sender<StoreEvent>>>,
    closed: AtomicBool,
}

/// Handle to the lighting store. Clones share the same state.
///
/// Create one at application start, hand clones to every view, and call
/// [`LightingStore::close`] at exit.
#[derive(Clone)]
pub struct LightingStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for LightingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightingStore")
            .field("restaurant_id", &self.inner.restaurant_id)
            .field("loading", &self.loading())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Counts one in-flight request of `operation` until dropped.
struct Busy<'a> {
    inner: &'a StoreInner,
    operation: Operation,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        let idle = {
            let mut in_flight = self.inner.in_flight.lock();
            let count = in_flight.entry(self.operation).or_insert(0);
            *count = count.saturating_sub(1);
            *count == 0
        };
        if idle {
            self.inner.notify(StoreEvent::Loading {
                operation: self.operation,
                active: false,
            });
        }
    }
}

impl StoreInner {
    fn begin(&self, operation: Operation) -> Busy<'_> {
        let started = {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.entry(operation).or_insert(0);
            *count += 1;
            *count == 1
        };
        if started {
            self.notify(StoreEvent::Loading {
                operation,
                active: true,
            });
        }
        Busy {
            inner: self,
            operation,
        }
    }

    fn notify(&self, event: StoreEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> LightingResult<()> {
        if self.is_closed() {
            return Err(LightingError::Closed);
        }
        Ok(())
    }

    fn set_error(&self, error: Option<String>) {
        if self.is_closed() {
            return;
        }
        let changed = {
            let mut state = self.state.lock();
            if state.error == error {
                false
            } else {
                state.error = error.clone();
                true
            }
        };
        if changed {
            self.notify(StoreEvent::Error(error));
        }
    }

    fn record_failure<T>(&self, result: &LightingResult<T>) {
        if let Err(err) = result {
            warn!("Lighting operation failed: {}", err);
            self.set_error(Some(err.to_string()));
        }
    }

    fn apply_status(&self, status: DeviceStatus) {
        if self.is_closed() {
            return;
        }
        self.state.lock().status = Some(status);
        self.notify(StoreEvent::Status);
    }

    fn apply_history(&self, history: Vec<HistoryEntry>) {
        if self.is_closed() {
            return;
        }
        self.state.lock().history = history;
        self.notify(StoreEvent::History);
    }

    fn apply_schedule(&self, schedule: Option<Schedule>) {
        if self.is_closed() {
            return;
        }
        self.state.lock().schedule = schedule;
        self.notify(StoreEvent::Schedule);
    }

    async fn reload_history(&self) -> LightingResult<()> {
        let history = self.api.get_history(self.restaurant_id).await?;
        self.apply_history(history);
        Ok(())
    }

    /// Runs a status-returning mutation followed by one history refresh.
    async fn mutate_status<F, Fut>(
        &self,
        operation: Operation,
        call: F,
    ) -> LightingResult<DeviceStatus>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = LightingResult<DeviceStatus>>,
    {
        self.ensure_open()?;
        let _busy = self.begin(operation);
        self.set_error(None);
        let result = async {
            let status = call().await?;
            debug!("{} succeeded, light is {}", operation, status.state);
            self.apply_status(status.clone());
            self.reload_history().await?;
            Ok::<_, LightingError>(status)
        }
        .await;
        self.record_failure(&result);
        result
    }
}

impl LightingStore {
    pub fn new(api: Arc<dyn LightingApi>, restaurant_id: RestaurantId) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                api,
                restaurant_id,
                state: Mutex::new(StoreState::default()),
                in_flight: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Builds a store backed by [`LightingClient`].
    pub fn from_config(config: &ClientConfig) -> LightingResult<Self> {
        let client = LightingClient::from_config(config)?;
        info!(
            "Lighting store for restaurant {} using {}",
            config.restaurant_id,
            client.base_url()
        );
        Ok(Self::new(Arc::new(client), config.restaurant_id))
    }

    pub fn restaurant_id(&self) -> RestaurantId {
        self.inner.restaurant_id
    }

    pub fn subscribe(&self) -> flume::Receiver<StoreEvent> {
        let (tx, rx) = flume::unbounded();
        if self.is_closed() {
            let _ = tx.send(StoreEvent::Closed);
        } else {
            self.inner.subscribers.lock().push(tx);
        }
        rx
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.inner.state.lock();
        StoreSnapshot {
            restaurant_id: self.inner.restaurant_id,
            status: state.status.clone(),
            history: state.history.clone(),
            schedule: state.schedule.clone(),
            loading: self.loading(),
            error: state.error.clone(),
        }
    }

    pub fn status(&self) -> Option<DeviceStatus> {
        self.inner.state.lock().status.clone()
    }

    pub fn is_on(&self) -> bool {
        self.inner
            .state
            .lock()
            .status
            .as_ref()
            .is_some_and(DeviceStatus::is_on)
    }

    pub fn brightness(&self) -> f64 {
        self.inner
            .state
            .lock()
            .status
            .as_ref()
            .map_or(0.0, |status| status.brightness)
    }

    pub fn last_updated(&self) -> String {
        self.inner
            .state
            .lock()
            .status
            .as_ref()
            .map(|status| status.last_updated.clone())
            .unwrap_or_default()
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().history.clone()
    }

    pub fn schedule(&self) -> Option<Schedule> {
        self.inner.state.lock().schedule.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    /// Dismisses the stored failure, if any.
    pub fn clear_error(&self) {
        self.inner.set_error(None);
    }

    /// True while any request is in flight.
    pub fn loading(&self) -> bool {
        self.inner.in_flight.lock().values().any(|count| *count > 0)
    }

    pub fn is_loading(&self, operation: Operation) -> bool {
        self.inner
            .in_flight
            .lock()
            .get(&operation)
            .is_some_and(|count| *count > 0)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// First load: status and history are requested together. A failure in
    /// either sets `error`; a half that succeeded is still applied.
    pub async fn initialize(&self) {
        if self.is_closed() {
            return;
        }
        let inner = &self.inner;
        let _status_busy = inner.begin(Operation::Status);
        let _history_busy = inner.begin(Operation::History);
        inner.set_error(None);

        let (status, history) = tokio::join!(
            inner.api.get_status(inner.restaurant_id),
            inner.api.get_history(inner.restaurant_id),
        );

        let mut failure = None;
        match status {
            Ok(status) => inner.apply_status(status),
            Err(err) => failure = Some(err),
        }
        match history {
            Ok(history) => inner.apply_history(history),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
        if let Some(err) = failure {
            warn!("Initial lighting load failed: {}", err);
            inner.set_error(Some(err.to_string()));
        }
    }

    /// Asks the backend to flip the light. The cached state becomes whatever
    /// the backend reports, then history is refreshed.
    pub async fn toggle_light(&self) -> LightingResult<DeviceStatus> {
        let inner = &self.inner;
        inner
            .mutate_status(Operation::Toggle, || inner.api.toggle(inner.restaurant_id))
            .await
    }

    /// Legacy single on/off pair, `HH:MM` 24h.
    pub async fn save_schedule(&self, start: &str, end: &str) -> LightingResult<DeviceStatus> {
        self.inner.ensure_open()?;
        if let Err(err) = validate_time_pair(start, end) {
            let result: LightingResult<DeviceStatus> = Err(err.into());
            self.inner.record_failure(&result);
            return result;
        }
        let inner = &self.inner;
        inner
            .mutate_status(Operation::Schedule, || {
                inner.api.save_schedule(inner.restaurant_id, start, end)
            })
            .await
    }

    /// Replaces every day-specific rule. Rejected without a request when two
    /// enabled rules claim the same day.
    pub async fn save_full_schedule(&self, rules: Vec<ScheduleRule>) -> LightingResult<Schedule> {
        let inner = &self.inner;
        inner.ensure_open()?;
        if let Err(err) = validate_rules(&rules) {
            let result: LightingResult<Schedule> = Err(err.into());
            inner.record_failure(&result);
            return result;
        }

        let _busy = inner.begin(Operation::SaveFullSchedule);
        inner.set_error(None);
        let result = async {
            let schedule = inner.api.save_full_schedule(inner.restaurant_id, &rules).await?;
            debug!("Saved {} schedule rules", schedule.rules.len());
            inner.apply_schedule(Some(schedule.clone()));
            inner.reload_history().await?;
            Ok::<_, LightingError>(schedule)
        }
        .await;
        inner.record_failure(&result);
        result
    }

    /// Re-reads the status. A failure is mirrored into `error`; success leaves
    /// an earlier failure in place.
    pub async fn refresh_status(&self) -> LightingResult<DeviceStatus> {
        let inner = &self.inner;
        inner.ensure_open()?;
        let _busy = inner.begin(Operation::Status);
        let result = inner.api.get_status(inner.restaurant_id).await;
        match &result {
            Ok(status) => inner.apply_status(status.clone()),
            Err(_) => inner.record_failure(&result),
        }
        result
    }

    pub async fn refresh_history(&self) -> LightingResult<Vec<HistoryEntry>> {
        let inner = &self.inner;
        inner.ensure_open()?;
        let _busy = inner.begin(Operation::History);
        let result = inner.api.get_history(inner.restaurant_id).await;
        match &result {
            Ok(history) => inner.apply_history(history.clone()),
            Err(_) => inner.record_failure(&result),
        }
        result
    }

    /// Loads the full schedule, keeping "none stored" (`Ok(None)`) apart from
    /// a failed request. Never touches `error`.
    pub async fn fetch_full_schedule(&self) -> LightingResult<Option<Schedule>> {
        let inner = &self.inner;
        inner.ensure_open()?;
        let _busy = inner.begin(Operation::LoadFullSchedule);
        let schedule = inner.api.load_full_schedule(inner.restaurant_id).await?;
        inner.apply_schedule(schedule.clone());
        Ok(schedule)
    }

    /// Like [`fetch_full_schedule`](Self::fetch_full_schedule) but never
    /// fails: any failure is logged and reported as no schedule.
    pub async fn load_full_schedule(&self) -> Option<Schedule> {
        match self.fetch_full_schedule().await {
            Ok(schedule) => schedule,
            Err(err) => {
                warn!("Failed to load schedule: {}", err);
                None
            }
        }
    }

    /// Tears the store down. In-flight results are discarded and later
    /// operations fail with [`LightingError::Closed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing lighting store for restaurant {}", self.inner.restaurant_id);
        let subscribers = std::mem::take(&mut *self.inner.subscribers.lock());
        for subscriber in subscribers {
            let _ = subscriber.send(StoreEvent::Closed);
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{LightingError, LightingResult, Operation};
use crate::types::{
    DeviceStatus, FullScheduleRequest, HistoryEntry, RestaurantId, Schedule, ScheduleRequest,
    ScheduleRule, ToggleRequest,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend calls the store depends on. Every call is one request/response
/// pair keyed by restaurant; implementations do not retry or cache.
#[async_trait]
pub trait LightingApi: Send + Sync {
    async fn get_status(&self, restaurant_id: RestaurantId) -> LightingResult<DeviceStatus>;

    /// Newest first, as ordered by the backend. Empty is not an error.
    async fn get_history(&self, restaurant_id: RestaurantId) -> LightingResult<Vec<HistoryEntry>>;

    /// The backend decides the new state.
    async fn toggle(&self, restaurant_id: RestaurantId) -> LightingResult<DeviceStatus>;

    async fn save_schedule(
        &self,
        restaurant_id: RestaurantId,
        schedule_on: &str,
        schedule_off: &str,
    ) -> LightingResult<DeviceStatus>;

    async fn save_full_schedule(
        &self,
        restaurant_id: RestaurantId,
        rules: &[ScheduleRule],
    ) -> LightingResult<Schedule>;

    /// `Ok(None)` when the backend has no schedule for the restaurant.
    async fn load_full_schedule(
        &self,
        restaurant_id: RestaurantId,
    ) -> LightingResult<Option<Schedule>>;
}

/// HTTP client for the `/lights` backend API.
#[derive(Debug, Clone)]
pub struct LightingClient {
    base_url: String,
    client: Client,
}

impl LightingClient {
    pub fn new(base_url: impl Into<String>) -> LightingResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> LightingResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LightingError::Config(format!("Failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &ClientConfig) -> LightingResult<Self> {
        Self::with_timeout(config.base_url(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/lights{}", self.base_url, path)
    }

    fn get(&self, path: &str, restaurant_id: RestaurantId) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .query(&[("restaurantId", restaurant_id)])
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> LightingResult<Response> {
        let response = request.send().await.map_err(|source| {
            warn!("{} request could not be sent: {}", operation, source);
            LightingError::Transport { operation, source }
        })?;
        debug!("{} request -> {}", operation, response.status());
        Ok(response)
    }
}

async fn read_json<T: DeserializeOwned>(
    operation: Operation,
    response: Response,
) -> LightingResult<T> {
    let status = response.status();
    if !status.is_success() {
        warn!("{} request failed with status {}", operation, status);
        return Err(LightingError::Request {
            operation,
            status: status.as_u16(),
        });
    }
    let body = response
        .bytes()
        .await
        .map_err(|source| LightingError::Transport { operation, source })?;
    serde_json::from_slice(&body).map_err(|source| {
        warn!("{} response body is malformed: {}", operation, source);
        LightingError::Decode { operation, source }
    })
}

#[async_trait]
impl LightingApi for LightingClient {
    async fn get_status(&self, restaurant_id: RestaurantId) -> LightingResult<DeviceStatus> {
        let operation = Operation::Status;
        let response = self
            .send(operation, self.get("/status", restaurant_id))
            .await?;
        read_json(operation, response).await
    }

    async fn get_history(&self, restaurant_id: RestaurantId) -> LightingResult<Vec<HistoryEntry>> {
        let operation = Operation::History;
        let response = self
            .send(operation, self.get("/history", restaurant_id))
            .await?;
        let history: Vec<HistoryEntry> = read_json(operation, response).await?;
        debug!("Fetched {} history entries", history.len());
        Ok(history)
    }

    async fn toggle(&self, restaurant_id: RestaurantId) -> LightingResult<DeviceStatus> {
        let operation = Operation::Toggle;
        let body = ToggleRequest {
            restaurant_id,
            action: "toggle",
        };
        let request = self.client.post(self.url("/toggle")).json(&body);
        let response = self.send(operation, request).await?;
        read_json(operation, response).await
    }

    async fn save_schedule(
        &self,
        restaurant_id: RestaurantId,
        schedule_on: &str,
        schedule_off: &str,
    ) -> LightingResult<DeviceStatus> {
        let operation = Operation::Schedule;
        let body = ScheduleRequest {
            restaurant_id,
            schedule_on,
            schedule_off,
        };
        let request = self.client.post(self.url("/schedule")).json(&body);
        let response = self.send(operation, request).await?;
        read_json(operation, response).await
    }

    async fn save_full_schedule(
        &self,
        restaurant_id: RestaurantId,
        rules: &[ScheduleRule],
    ) -> LightingResult<Schedule> {
        let operation = Operation::SaveFullSchedule;
        let body = FullScheduleRequest {
            restaurant_id,
            rules,
        };
        let request = self.client.post(self.url("/schedule/full")).json(&body);
        let response = self.send(operation, request).await?;
        read_json(operation, response).await
    }

    async fn load_full_schedule(
        &self,
        restaurant_id: RestaurantId,
    ) -> LightingResult<Option<Schedule>> {
        let operation = Operation::LoadFullSchedule;
        let response = self
            .send(operation, self.get("/schedule/full", restaurant_id))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No full schedule stored for restaurant {}", restaurant_id);
            return Ok(None);
        }
        read_json(operation, response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn status_body(state: &str, brightness: u8) -> String {
        json!({
            "restaurantId": 1,
            "state": state,
            "brightness": brightness,
            "lastUpdated": "2025-11-24T18:00:00+00:00"
        })
        .to_string()
    }

    fn restaurant_query() -> Matcher {
        Matcher::UrlEncoded("restaurantId".into(), "1".into())
    }

    #[tokio::test]
    async fn get_status_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/status")
            .match_query(restaurant_query())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(status_body("on", 85))
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let status = client.get_status(1).await.unwrap();

        assert_eq!(status.state, crate::PowerState::On);
        assert_eq!(status.brightness, 85.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_status_failure_carries_status_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/status")
            .match_query(restaurant_query())
            .with_status(503)
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let err = client.get_status(1).await.unwrap_err();

        assert!(matches!(
            err,
            LightingError::Request {
                operation: Operation::Status,
                status: 503
            }
        ));
        assert_eq!(err.to_string(), "Status request failed (503)");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_history_is_not_an_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/history")
            .match_query(restaurant_query())
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let history = client.get_history(1).await.unwrap();

        assert!(history.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn history_keeps_backend_order() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/history")
            .match_query(restaurant_query())
            .with_status(200)
            .with_body(
                json!([
                    {
                        "id": 2,
                        "restaurantId": 1,
                        "action": "toggle_off",
                        "timestamp": "2025-11-24T20:00:00+00:00"
                    },
                    {
                        "id": 9,
                        "restaurantId": 1,
                        "action": "toggle_on",
                        "timestamp": "2025-11-24T21:00:00+00:00"
                    }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let history = client.get_history(1).await.unwrap();

        let ids: Vec<i64> = history.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![2, 9]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn toggle_posts_intent_and_returns_backend_state() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/lights/toggle")
            .match_body(Matcher::Json(json!({
                "restaurantId": 1,
                "action": "toggle"
            })))
            .with_status(200)
            .with_body(status_body("off", 0))
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let status = client.toggle(1).await.unwrap();

        assert!(!status.is_on());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn save_schedule_sends_legacy_pair() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/lights/schedule")
            .match_body(Matcher::Json(json!({
                "restaurantId": 1,
                "scheduleOn": "18:00",
                "scheduleOff": "23:30"
            })))
            .with_status(200)
            .with_body(status_body("off", 0))
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        client.save_schedule(1, "18:00", "23:30").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn save_full_schedule_sends_rules() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/lights/schedule/full")
            .match_body(Matcher::Json(json!({
                "restaurantId": 1,
                "rules": [
                    {
                        "days": ["MON", "TUES"],
                        "startTime": "18:00",
                        "endTime": "23:30",
                        "enabled": true
                    }
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "deviceId": "ESP32_MCD_DARIEN_001",
                    "restaurantId": "1",
                    "rules": [
                        {
                            "days": ["MON", "TUES"],
                            "startTime": "18:00",
                            "endTime": "23:30",
                            "enabled": true
                        }
                    ],
                    "createdAt": "2025-11-24T18:00:00Z",
                    "updatedAt": "2025-11-24T18:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let rules = vec![ScheduleRule::new(["MON", "TUES"], "18:00", "23:30")];
        let schedule = client.save_full_schedule(1, &rules).await.unwrap();

        assert_eq!(schedule.rules, rules);
        assert_eq!(schedule.device_id.as_deref(), Some("ESP32_MCD_DARIEN_001"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn load_full_schedule_not_found_is_absent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/schedule/full")
            .match_query(restaurant_query())
            .with_status(404)
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let schedule = client.load_full_schedule(1).await.unwrap();

        assert!(schedule.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn load_full_schedule_other_failures_are_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/schedule/full")
            .match_query(restaurant_query())
            .with_status(500)
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let err = client.load_full_schedule(1).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/lights/status")
            .match_query(restaurant_query())
            .with_status(200)
            .with_body("{\"restaurantId\": 1")
            .create_async()
            .await;

        let client = LightingClient::new(server.url()).unwrap();
        let err = client.get_status(1).await.unwrap_err();

        assert!(matches!(
            err,
            LightingError::Decode {
                operation: Operation::Status,
                ..
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) is not expected to have an HTTP listener.
        let client =
            LightingClient::with_timeout("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.toggle(1).await.unwrap_err();

        assert!(matches!(
            err,
            LightingError::Transport {
                operation: Operation::Toggle,
                ..
            }
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = LightingClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/status"), "http://localhost:8000/lights/status");
    }
}

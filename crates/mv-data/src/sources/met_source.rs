//! HTTP provider for the Met Museum collection API

use std::time::{Duration, Instant};
use async_trait::async_trait;
use mv_core::record::{ARTIST_NOT_FOUND, TITLE_NOT_FOUND};
use mv_core::{CatalogProvider, ObjectId, ProviderError, Query, RecordDetails, Year};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ProviderConfig;

const OBJECTS_PATH: &str = "/public/collection/v1/objects";
const SEARCH_PATH: &str = "/public/collection/v1/search";

/// Raw response to an `objects/{id}` call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectDetailsResponse {
    #[serde(default)]
    artist_display_name: Option<String>,
    #[serde(default)]
    classification: Option<String>,
    #[serde(default)]
    medium: Option<String>,
    #[serde(default)]
    object_begin_date: Option<i32>,
    #[serde(default)]
    object_end_date: Option<i32>,
    #[serde(default)]
    primary_image_small: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Raw response to an `objects` or `search` call.
/// The API sends `null` instead of an empty list when nothing matches.
#[derive(Debug, Deserialize)]
struct IdentifiersResponse {
    #[serde(rename = "objectIDs", default)]
    object_ids: Option<Vec<u64>>,
}

/// Collection API client
pub struct MetMuseumSource {
    client: reqwest::Client,
    base_url: String,
    throttle: RequestThrottle,
}

impl MetMuseumSource {
    /// Create a client for the configured base URL
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ProviderError::Backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            throttle: RequestThrottle::new(config.max_requests_per_second, Duration::from_secs(1)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<(StatusCode, Option<T>), ProviderError> {
        self.throttle.acquire().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| ProviderError::Backend(format!("URL \"{}\" is unreadable: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Ok((status, None));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Backend(format!("Failed to decode \"{}\": {}", url, e)))?;

        Ok((status, Some(body)))
    }

    async fn get_identifiers(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<ObjectId>, ProviderError> {
        match self.get_json::<IdentifiersResponse>(path, params).await? {
            (_, Some(body)) => Ok(identifiers_from(body)),
            (status, None) => Err(ProviderError::Backend(format!(
                "Path \"{}\" with parameters {:?} got a \"{}\" response",
                path, params, status
            ))),
        }
    }
}

#[async_trait]
impl CatalogProvider for MetMuseumSource {
    async fn search(&self, query: &Query) -> Result<Vec<ObjectId>, ProviderError> {
        let params = search_parameters(query);
        info!(base = %self.base_url, ?params, "searching collection");
        self.get_identifiers(SEARCH_PATH, &params).await
    }

    async fn fetch_detail(&self, identifier: ObjectId) -> Result<RecordDetails, ProviderError> {
        let path = format!("{}/{}", OBJECTS_PATH, identifier);
        debug!(%identifier, "fetching object details");

        match self.get_json::<ObjectDetailsResponse>(&path, &[]).await? {
            (_, Some(body)) => Ok(details_from(body)),
            (StatusCode::NOT_FOUND, None) => Err(ProviderError::NotFound(identifier)),
            (status, None) => Err(ProviderError::Backend(format!(
                "Object \"{}\" got a \"{}\" response",
                identifier, status
            ))),
        }
    }

    async fn list_all_identifiers(&self) -> Result<Vec<ObjectId>, ProviderError> {
        self.get_identifiers(OBJECTS_PATH, &[]).await
    }

    fn provider_name(&self) -> &str {
        "met-museum"
    }
}

/// Query-string parameters for a search call
fn search_parameters(query: &Query) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();

    // The API treats a missing flag as "any"; only the true case is sent
    if query.has_image() {
        params.push(("hasImages", "true".to_string()));
    }
    if let Some(classification) = query.classification() {
        params.push(("classification", classification.to_string()));
    }
    params.push(("q", query.text().unwrap_or("\"\"").to_string()));

    params
}

fn identifiers_from(body: IdentifiersResponse) -> Vec<ObjectId> {
    body.object_ids
        .unwrap_or_default()
        .into_iter()
        .map(ObjectId)
        .collect()
}

fn details_from(body: ObjectDetailsResponse) -> RecordDetails {
    fn non_empty(value: Option<String>) -> Option<String> {
        value.filter(|v| !v.trim().is_empty())
    }

    // Year 0 means "unknown" in this API
    fn year(value: Option<i32>) -> Option<Year> {
        value.filter(|y| *y != 0).map(Year)
    }

    RecordDetails {
        artist: body.artist_display_name.unwrap_or_else(|| ARTIST_NOT_FOUND.to_string()),
        classification: non_empty(body.classification),
        begin: year(body.object_begin_date),
        end: year(body.object_end_date),
        medium: non_empty(body.medium),
        thumbnail_url: non_empty(body.primary_image_small),
        title: body.title.unwrap_or_else(|| TITLE_NOT_FOUND.to_string()),
    }
}

/// Keeps request volume under a per-window budget
struct RequestThrottle {
    max_requests: u32,
    window: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Debug)]
struct ThrottleState {
    window_start: Instant,
    count: u32,
}

impl ThrottleState {
    /// Claim one request slot, or report how long to wait for the next window
    fn try_acquire(&mut self, now: Instant, max_requests: u32, window: Duration) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= window {
            self.window_start = now;
            self.count = 0;
        }

        if self.count < max_requests {
            self.count += 1;
            None
        } else {
            Some(window - elapsed.min(window))
        }
    }
}

impl RequestThrottle {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            state: Mutex::new(ThrottleState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    async fn acquire(&self) {
        loop {
            // The lock is released before sleeping
            let wait = self.state.lock().try_acquire(Instant::now(), self.max_requests, self.window);
            match wait {
                None => return,
                Some(delay) => {
                    debug!(?delay, "request budget exhausted, waiting");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_details() {
        let body: ObjectDetailsResponse = serde_json::from_str(
            r#"{
                "objectID": 1,
                "artistDisplayName": "Albrecht Dürer",
                "classification": "Drawings",
                "medium": "",
                "objectBeginDate": 1508,
                "objectEndDate": 1508,
                "primaryImageSmall": "https://images.example/hands.jpg",
                "title": "Praying Hands"
            }"#,
        )
        .unwrap();

        let details = details_from(body);
        assert_eq!(details.title, "Praying Hands");
        assert_eq!(details.classification.as_deref(), Some("Drawings"));
        assert_eq!(details.medium, None);
        assert_eq!(details.date_range(), (Some(Year(1508)), Some(Year(1508))));
        assert!(details.has_image());
    }

    #[test]
    fn test_missing_fields_use_fallbacks() {
        let body: ObjectDetailsResponse =
            serde_json::from_str(r#"{ "objectBeginDate": 0, "primaryImageSmall": "" }"#).unwrap();

        let details = details_from(body);
        assert_eq!(details.title, TITLE_NOT_FOUND);
        assert_eq!(details.artist, ARTIST_NOT_FOUND);
        assert_eq!(details.begin, None);
        assert!(!details.has_image());
    }

    #[test]
    fn test_null_identifier_list_is_empty() {
        let body: IdentifiersResponse = serde_json::from_str(r#"{ "total": 0, "objectIDs": null }"#).unwrap();
        assert!(identifiers_from(body).is_empty());

        let body: IdentifiersResponse = serde_json::from_str(r#"{ "total": 2, "objectIDs": [3, 1] }"#).unwrap();
        assert_eq!(identifiers_from(body), vec![ObjectId(3), ObjectId(1)]);
    }

    #[test]
    fn test_search_parameters() {
        let params = search_parameters(&Query::new("Hand").with_classification("Drawings").with_images_only(true));
        assert_eq!(
            params,
            vec![
                ("hasImages", "true".to_string()),
                ("classification", "Drawings".to_string()),
                ("q", "Hand".to_string()),
            ]
        );

        let params = search_parameters(&Query::everything().with_classification("Prints"));
        assert_eq!(params.last(), Some(&("q", "\"\"".to_string())));
    }

    #[test]
    fn test_throttle_waits_once_budget_is_spent() {
        let start = Instant::now();
        let window = Duration::from_secs(1);
        let mut state = ThrottleState { window_start: start, count: 0 };

        assert!(state.try_acquire(start, 2, window).is_none());
        assert!(state.try_acquire(start, 2, window).is_none());

        let wait = state.try_acquire(start + Duration::from_millis(300), 2, window);
        assert_eq!(wait, Some(Duration::from_millis(700)));

        // A new window resets the budget
        assert!(state.try_acquire(start + window, 2, window).is_none());
        assert_eq!(state.count, 1);
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let config = ProviderConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..ProviderConfig::default()
        };
        let source = MetMuseumSource::new(&config).unwrap();
        assert_eq!(source.base_url(), "http://localhost:8080");
    }
}

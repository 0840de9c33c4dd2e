// Fixture API: canned responses for offline runs and integration tests.

use super::{ApiError, ApiRequest, ApiRoute, RemoteApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

type Response = Result<Vec<u8>, ApiError>;

/// A `RemoteApi` that answers from a table keyed by route.
///
/// Routes without an entry answer `{}`, which the action endpoints read as
/// success. Image requests can be answered per URL.
#[derive(Default)]
pub struct FixtureApi {
    responses: Mutex<HashMap<ApiRoute, Response>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    delays: Mutex<HashMap<ApiRoute, Duration>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FixtureApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, route: ApiRoute, body: impl Into<Vec<u8>>) -> &Self {
        self.responses.lock().insert(route, Ok(body.into()));
        self
    }

    pub fn fail(&self, route: ApiRoute, error: ApiError) -> &Self {
        self.responses.lock().insert(route, Err(error));
        self
    }

    pub fn image(&self, url: &str, bytes: Vec<u8>) -> &Self {
        self.images.lock().insert(url.to_string(), bytes);
        self
    }

    /// Hold every call on `route` for `delay` before answering.
    pub fn delay(&self, route: ApiRoute, delay: Duration) -> &Self {
        self.delays.lock().insert(route, delay);
        self
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, route: ApiRoute) -> usize {
        self.calls.lock().iter().filter(|r| r.route() == route).count()
    }
}

#[async_trait]
impl RemoteApi for FixtureApi {
    async fn execute(&self, request: &ApiRequest) -> Result<Vec<u8>, ApiError> {
        self.calls.lock().push(request.clone());

        let delay = self.delays.lock().get(&request.route()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let ApiRequest::Image { url } = request {
            return self
                .images
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| ApiError::Http {
                    status: 404,
                    message: format!("no image at {}", url),
                });
        }

        self.responses
            .lock()
            .get(&request.route())
            .cloned()
            .unwrap_or_else(|| Ok(b"{}".to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_and_overrides() {
        let api = FixtureApi::new();
        api.fail(ApiRoute::Vote, ApiError::Network("offline".to_string()));

        assert_eq!(
            api.execute(&ApiRequest::MarkAllRead).await.unwrap(),
            b"{}".to_vec()
        );
        assert!(api
            .execute(&ApiRequest::Vote {
                fullname: "t3_abc".to_string(),
                direction: 1
            })
            .await
            .is_err());
        assert_eq!(api.calls_to(ApiRoute::Vote), 1);
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_images_by_url() {
        let api = FixtureApi::new();
        api.image("https://i.example/a.png", vec![7, 7]);

        let hit = api
            .execute(&ApiRequest::Image {
                url: "https://i.example/a.png".to_string(),
            })
            .await;
        assert_eq!(hit.unwrap(), vec![7, 7]);

        let miss = api
            .execute(&ApiRequest::Image {
                url: "https://i.example/b.png".to_string(),
            })
            .await;
        assert!(matches!(miss, Err(ApiError::Http { status: 404, .. })));
    }
}

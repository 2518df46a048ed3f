//! Recording API service for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ApiError;
use crate::request::{Request, Response};
use crate::service::ApiService;

/// In-process [`ApiService`] that records every request and answers from a
/// queue of canned results. When the queue is empty it answers `200 {}`.
#[derive(Default)]
pub struct MockApiService {
    requests: Mutex<Vec<Request>>,
    responses: Mutex<VecDeque<Result<Response, ApiError>>>,
}

impl MockApiService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result for the next unanswered request.
    pub fn enqueue(&self, result: Result<Response, ApiError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(result);
        }
    }

    /// Queue a successful JSON response.
    pub fn enqueue_json(&self, body: serde_json::Value) {
        self.enqueue(Ok(Response::new(200, body.to_string())));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ApiService for MockApiService {
    async fn fetch(&self, request: Request) -> Result<Response, ApiError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front())
            .unwrap_or_else(|| Ok(Response::new(200, "{}")))
    }
}

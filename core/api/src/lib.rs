//! HTTP request/response abstraction for coursesync.
//!
//! Handlers describe requests with [`RequestBuilder`] and hand them to an
//! [`ApiService`]. The production implementation is [`HttpApiService`]
//! (reqwest); [`MockApiService`] records requests and replays canned
//! responses for tests.

pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod request;
pub mod service;

pub use config::ApiConfig;
pub use error::ApiError;
pub use http::HttpApiService;
pub use mock::MockApiService;
pub use request::{HttpMethod, Request, RequestBuilder, Response};
pub use service::{fetch_json, ApiService};

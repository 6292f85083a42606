//! REST API steps against an in-process service

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration as StdDuration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use componenttest_validator::{Comparator, Registry};
use tower::ServiceExt;
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{ComponentError, ComponentResult};
use crate::health::{HealthResponse, HealthWindow};

/// Produces the router under test just before each request
pub type ServiceInitialiser = Box<dyn Fn() -> ComponentResult<Router> + Send + Sync>;

/// Initialiser that always serves the same router
pub fn static_handler(router: Router) -> ServiceInitialiser {
    Box::new(move || Ok(router.clone()))
}

/// Response captured from the last request
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Header value, or the empty string when absent or not valid text
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// State for testing REST API requests within a scenario
pub struct ApiFeature {
    initialiser: ServiceInitialiser,
    registry: Registry,
    base_url: String,
    admin_token: Option<String>,
    publisher_token: Option<String>,
    request_headers: BTreeMap<String, String>,
    response: Option<CapturedResponse>,
    pub start_time: DateTime<Utc>,
    pub health_check_interval: Duration,
    pub expected_response_time: Duration,
}

impl ApiFeature {
    pub fn new(initialiser: ServiceInitialiser) -> Self {
        Self::with_config(initialiser, ApiConfig::default())
    }

    /// Feature bound to a router that is already fully configured
    pub fn with_router(router: Router) -> Self {
        Self::new(static_handler(router))
    }

    pub fn with_config(initialiser: ServiceInitialiser, config: ApiConfig) -> Self {
        Self {
            initialiser,
            registry: Registry::new(),
            base_url: config.base_url,
            admin_token: config.admin_token,
            publisher_token: config.publisher_token,
            request_headers: BTreeMap::new(),
            response: None,
            start_time: Utc::now(),
            health_check_interval: Duration::zero(),
            expected_response_time: Duration::zero(),
        }
    }

    /// Replace the validator registry used for JSON responses
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Clear request headers and the captured response between scenarios
    pub fn reset(&mut self) {
        self.request_headers.clear();
        self.response = None;
    }

    pub fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    pub fn request_headers(&self) -> &BTreeMap<String, String> {
        &self.request_headers
    }

    // ---- request headers ----

    /// Set a header for every following request
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.request_headers.insert(name.to_string(), value.to_string());
    }

    pub fn i_am_authorised(&mut self) {
        self.set_header("Authorization", "bearer SomeFakeToken");
    }

    pub fn i_am_not_authorised(&mut self) {
        self.request_headers.remove("Authorization");
    }

    pub fn i_am_not_authenticated(&mut self) {
        self.set_header("Authorization", "");
    }

    pub fn use_service_auth_token(&mut self, token: &str) {
        self.set_header("Authorization", &format!("Bearer {token}"));
    }

    pub fn use_florence_user_token(&mut self, token: &str) {
        self.set_header("X-Florence-Token", token);
    }

    /// Authorise as an admin user with the configured `admin_token`
    pub fn i_am_admin_user(&mut self) -> ComponentResult<()> {
        let token = user_token("admin_token", self.admin_token.as_deref())?;
        self.set_header("Authorization", &token);
        Ok(())
    }

    /// Authorise as a publisher user with the configured `publisher_token`
    pub fn i_am_publisher_user(&mut self) -> ComponentResult<()> {
        let token = user_token("publisher_token", self.publisher_token.as_deref())?;
        self.set_header("Authorization", &token);
        Ok(())
    }

    // ---- requests ----

    pub async fn get(&mut self, path: &str) -> ComponentResult<()> {
        self.make_request(Method::GET, path, Bytes::new()).await
    }

    pub async fn post(&mut self, path: &str, body: &str) -> ComponentResult<()> {
        self.make_request(Method::POST, path, Bytes::copy_from_slice(body.as_bytes()))
            .await
    }

    pub async fn put(&mut self, path: &str, body: &str) -> ComponentResult<()> {
        self.make_request(Method::PUT, path, Bytes::copy_from_slice(body.as_bytes()))
            .await
    }

    pub async fn patch(&mut self, path: &str, body: &str) -> ComponentResult<()> {
        self.make_request(Method::PATCH, path, Bytes::copy_from_slice(body.as_bytes()))
            .await
    }

    pub async fn delete(&mut self, path: &str) -> ComponentResult<()> {
        self.make_request(Method::DELETE, path, Bytes::new()).await
    }

    /// Send one request through the router and capture the response
    pub async fn make_request(&mut self, method: Method, path: &str, body: Bytes) -> ComponentResult<()> {
        let router = (self.initialiser)()?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(format!("{}{}", self.base_url, path));
        for (name, value) in &self.request_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder.body(Body::from(body))?;

        debug!("{} {}", method, path);
        let response = match router.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ComponentError::ResponseBody(e.to_string()))?;

        self.response = Some(CapturedResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        });
        Ok(())
    }

    fn captured(&self) -> ComponentResult<&CapturedResponse> {
        self.response.as_ref().ok_or(ComponentError::NoResponse)
    }

    // ---- assertions ----

    pub fn status_code_should_be(&self, expected: &str) -> ComponentResult<()> {
        let expected: u16 = expected.trim().parse().map_err(|_| {
            ComponentError::InvalidArgument(format!("{expected:?} is not a status code"))
        })?;
        let actual = self.captured()?.status.as_u16();
        if actual != expected {
            return Err(ComponentError::StatusMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn response_header_should_be(&self, name: &str, expected: &str) -> ComponentResult<()> {
        let actual = self.captured()?.header(name);
        if actual != expected {
            return Err(ComponentError::HeaderMismatch {
                name: name.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Plain body comparison, ignoring surrounding whitespace
    pub fn should_receive_response(&self, expected: &str) -> ComponentResult<()> {
        let actual = self.captured()?.body_text();
        if actual.trim() != expected.trim() {
            return Err(ComponentError::AssertionFailed(format!(
                "response body mismatch\nexpected: {}\nactual:   {}",
                expected.trim(),
                actual.trim()
            )));
        }
        Ok(())
    }

    /// JSON body comparison; `{{DYNAMIC_<KIND>}}` fixture values are validated
    /// by kind instead of compared literally
    pub fn should_receive_json_response(&self, expected: &str) -> ComponentResult<()> {
        let response = self.captured()?;
        Comparator::new(&self.registry).validate_dynamic_json(&response.body, expected.as_bytes())?;
        Ok(())
    }

    pub fn should_receive_json_response_with_status(
        &self,
        status: &str,
        expected: &str,
    ) -> ComponentResult<()> {
        self.status_code_should_be(status)?;
        self.response_header_should_be("Content-Type", "application/json")?;
        self.should_receive_json_response(expected)
    }

    // ---- health checks ----

    pub fn set_health_check_interval(&mut self, seconds: i64) {
        self.health_check_interval = Duration::seconds(seconds);
    }

    pub fn set_expected_health_response_time(&mut self, seconds: i64) {
        self.expected_response_time = Duration::seconds(seconds);
    }

    pub fn health_window(&self) -> HealthWindow {
        HealthWindow {
            start_time: self.start_time,
            interval: self.health_check_interval,
            expected_response_time: self.expected_response_time,
        }
    }

    pub fn should_receive_health_json_response(&self, expected: &str) -> ComponentResult<()> {
        let actual: HealthResponse = serde_json::from_slice(&self.captured()?.body)?;
        let expected: HealthResponse = serde_json::from_str(expected)?;
        self.health_window().validate(&actual, &expected)
    }

    /// Pause the scenario. Prefer waiting on a condition where one exists.
    pub async fn wait_seconds(&self, seconds: u64) {
        tokio::time::sleep(StdDuration::from_secs(seconds)).await;
    }
}

fn user_token(setting: &str, token: Option<&str>) -> ComponentResult<String> {
    token
        .map(str::to_string)
        .ok_or_else(|| ComponentError::InvalidConfig(format!("api.{setting} is not configured")))
}

impl fmt::Debug for ApiFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFeature")
            .field("base_url", &self.base_url)
            .field("request_headers", &self.request_headers)
            .field("response", &self.response)
            .field("start_time", &self.start_time)
            .finish_non_exhaustive()
    }
}

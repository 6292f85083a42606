//! Gherkin scenarios exercising the component test features against an
//! example service.
//!
//! ```bash
//! cargo test -p componenttest --test component
//! ```

use std::fmt;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use componenttest::{ApiFeature, AuthorizationFeature, ComponentError, ComponentResult};
use cucumber::gherkin::Step;
use cucumber::{given, then, when, World};
use parking_lot::Mutex;
use serde_json::json;

type IdentityUrl = Arc<Mutex<Option<String>>>;

#[derive(World)]
#[world(init = Self::new)]
pub struct ComponentWorld {
    api: ApiFeature,
    auth: Option<AuthorizationFeature>,
    identity_url: IdentityUrl,
}

impl ComponentWorld {
    fn new() -> Self {
        let identity_url = IdentityUrl::default();
        let router = example_service(identity_url.clone());
        Self {
            api: ApiFeature::with_router(router),
            auth: None,
            identity_url,
        }
    }

    /// Start the identity fakes on first use and point the service at them
    async fn auth(&mut self) -> ComponentResult<&AuthorizationFeature> {
        if self.auth.is_none() {
            let auth = AuthorizationFeature::new().await?;
            *self.identity_url.lock() = Some(auth.identity_url());
            self.auth = Some(auth);
        }
        self.auth
            .as_ref()
            .ok_or_else(|| ComponentError::Initialiser("authorization fakes".to_string()))
    }
}

impl fmt::Debug for ComponentWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentWorld")
            .field("api", &self.api)
            .field("auth", &self.auth)
            .finish()
    }
}

// ---- example service ----

fn example_service(identity_url: IdentityUrl) -> Router {
    Router::new()
        .route("/example1", get(|| async { Json(json!({"example_type": 1})) }))
        .route(
            "/example2",
            post(|| async { (StatusCode::FORBIDDEN, "403 - Forbidden") }),
        )
        .route("/dynamic/validation", get(dynamic_validation))
        .route("/health", get(health))
        .route("/whoami", get(whoami))
        .with_state(identity_url)
}

async fn dynamic_validation() -> Json<serde_json::Value> {
    let now = Utc::now().to_rfc3339();
    Json(json!({
        "timestamp": now,
        "id": uuid::Uuid::new_v4().to_string(),
        "embedded": {"inner_timestamp": now},
        "url": format!("http://localhost/endpoint/{}", uuid::Uuid::new_v4()),
        "self": format!("/datasets/{}", uuid::Uuid::new_v4()),
    }))
}

async fn health() -> Json<serde_json::Value> {
    let now = Utc::now();
    Json(json!({
        "status": "OK",
        "version": {
            "build_time": now,
            "git_commit": "6584b786caac36b6214ffe04bf62f058d4021538",
            "language": "rust",
            "language_version": "1.80.0",
            "version": "v1.2.3",
        },
        "uptime": 4,
        "start_time": now,
        "checks": [{
            "name": "Redis",
            "status": "OK",
            "status_code": 200,
            "message": "redis is healthy",
            "last_checked": now,
            "last_success": now,
        }],
    }))
}

/// Ask the identity service who the caller is and relay its answer
async fn whoami(State(identity_url): State<IdentityUrl>) -> Response {
    let Some(base) = identity_url.lock().clone() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no identity service").into_response();
    };
    let response = match reqwest::get(format!("{base}/identity")).await {
        Ok(response) => response,
        Err(e) => return (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    };
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();
    let body = response.text().await.unwrap_or_default();
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

fn docstring(step: &Step) -> String {
    step.docstring.clone().unwrap_or_default()
}

// ---- request steps ----

#[given(regex = r#"^I set the "([^"]*)" header to "([^"]*)"$"#)]
async fn set_header(world: &mut ComponentWorld, name: String, value: String) {
    world.api.set_header(&name, &value);
}

#[given("I am authorised")]
async fn authorised(world: &mut ComponentWorld) {
    world.api.i_am_authorised();
}

#[given("I am not authorised")]
async fn not_authorised(world: &mut ComponentWorld) {
    world.api.i_am_not_authorised();
}

#[given("I am an admin user")]
async fn admin_user(world: &mut ComponentWorld) -> ComponentResult<()> {
    world.api.i_am_admin_user()
}

#[given("I am a publisher user")]
async fn publisher_user(world: &mut ComponentWorld) -> ComponentResult<()> {
    world.api.i_am_publisher_user()
}

#[given(regex = r#"^I use a service auth token "([^"]*)"$"#)]
async fn service_token(world: &mut ComponentWorld, token: String) {
    world.api.use_service_auth_token(&token);
}

#[given(regex = r"^I have a healthcheck interval of (\d+) seconds?$")]
async fn healthcheck_interval(world: &mut ComponentWorld, seconds: i64) {
    world.api.set_health_check_interval(seconds);
}

#[given(regex = r"^the health checks should have completed within (\d+) seconds?$")]
async fn healthcheck_response_time(world: &mut ComponentWorld, seconds: i64) {
    world.api.set_expected_health_response_time(seconds);
}

#[when(regex = r#"^I GET "([^"]*)"$"#)]
async fn get_path(world: &mut ComponentWorld, path: String) -> ComponentResult<()> {
    world.api.get(&path).await
}

#[when(regex = r#"^I POST "([^"]*)"$"#)]
async fn post_path(world: &mut ComponentWorld, path: String, step: &Step) -> ComponentResult<()> {
    world.api.post(&path, &docstring(step)).await
}

#[when(regex = r#"^I PUT "([^"]*)"$"#)]
async fn put_path(world: &mut ComponentWorld, path: String, step: &Step) -> ComponentResult<()> {
    world.api.put(&path, &docstring(step)).await
}

#[when(regex = r#"^I DELETE "([^"]*)"$"#)]
async fn delete_path(world: &mut ComponentWorld, path: String) -> ComponentResult<()> {
    world.api.delete(&path).await
}

// ---- response steps ----

#[then(regex = r#"^the HTTP status code should be "([^"]*)"$"#)]
async fn status_code(world: &mut ComponentWorld, status: String) -> ComponentResult<()> {
    world.api.status_code_should_be(&status)
}

#[then(regex = r#"^the response header "([^"]*)" should be "([^"]*)"$"#)]
async fn response_header(world: &mut ComponentWorld, name: String, value: String) -> ComponentResult<()> {
    world.api.response_header_should_be(&name, &value)
}

#[then("I should receive the following response:")]
async fn plain_response(world: &mut ComponentWorld, step: &Step) -> ComponentResult<()> {
    world.api.should_receive_response(&docstring(step))
}

#[then("I should receive the following JSON response:")]
async fn json_response(world: &mut ComponentWorld, step: &Step) -> ComponentResult<()> {
    world.api.should_receive_json_response(&docstring(step))
}

#[then(regex = r#"^I should receive the following JSON response with status "([^"]*)":$"#)]
async fn json_response_with_status(
    world: &mut ComponentWorld,
    status: String,
    step: &Step,
) -> ComponentResult<()> {
    world
        .api
        .should_receive_json_response_with_status(&status, &docstring(step))
}

#[then("the following JSON response should be rejected:")]
async fn json_response_rejected(world: &mut ComponentWorld, step: &Step) -> ComponentResult<()> {
    match world.api.should_receive_json_response(&docstring(step)) {
        Err(ComponentError::Compare(e)) => {
            tracing::debug!("rejected as expected: {}", e);
            Ok(())
        }
        Err(other) => Err(other),
        Ok(()) => Err(ComponentError::AssertionFailed(
            "expected the JSON comparison to fail".to_string(),
        )),
    }
}

#[then("I should receive the following health JSON response:")]
async fn health_response(world: &mut ComponentWorld, step: &Step) -> ComponentResult<()> {
    world.api.should_receive_health_json_response(&docstring(step))
}

// ---- authorization steps ----

#[given("I am not identified")]
async fn not_identified(world: &mut ComponentWorld) -> ComponentResult<()> {
    world.auth().await?.i_am_not_identified();
    Ok(())
}

#[given(regex = r#"^I am identified as "([^"]*)"$"#)]
async fn identified_as(world: &mut ComponentWorld, user: String) -> ComponentResult<()> {
    world.auth().await?.i_am_identified_as(&user)
}

#[given(regex = r#"^an admin user has the "([^"]*)" permission$"#)]
async fn admin_permission(world: &mut ComponentWorld, permission: String) -> ComponentResult<()> {
    world.auth().await?.admin_user_has_permission(&permission)
}

#[then(regex = r#"^the permissions API should grant "([^"]*)" to "([^"]*)"$"#)]
async fn permissions_granted(
    world: &mut ComponentWorld,
    permission: String,
    entity: String,
) -> ComponentResult<()> {
    let url = format!(
        "{}{}",
        world.auth().await?.permissions_url(),
        componenttest::auth::PERMISSIONS_BUNDLE_PATH
    );
    let bundle: serde_json::Value = reqwest::get(url)
        .await
        .map_err(|e| ComponentError::AssertionFailed(e.to_string()))?
        .json()
        .await
        .map_err(|e| ComponentError::AssertionFailed(e.to_string()))?;
    if bundle[&permission][&entity].as_array().map_or(true, Vec::is_empty) {
        return Err(ComponentError::AssertionFailed(format!(
            "{entity} has no policies for {permission} in {bundle}"
        )));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    componenttest::init_tracing();

    ComponentWorld::cucumber()
        .fail_on_skipped()
        .run_and_exit(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/features"))
        .await;
}

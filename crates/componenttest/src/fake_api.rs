//! Fake upstream HTTP service with canned replies

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ComponentResult;

/// Canned reply for one method and path
#[derive(Debug, Clone)]
pub struct FakeRoute {
    method: Method,
    path: String,
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl FakeRoute {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn reply(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and set the JSON content type
    pub fn json<T: Serialize>(self, value: &T) -> ComponentResult<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    fn key(&self) -> (Method, String) {
        (self.method.clone(), self.path.clone())
    }

    fn to_response(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!("Skipping invalid fake header {}: {}", name, value),
            }
        }
        response
    }
}

/// A request the fake received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: String,
    pub matched: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    routes: HashMap<(Method, String), FakeRoute>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<FakeState>>;

/// Local HTTP server standing in for an upstream dependency
pub struct FakeApi {
    addr: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FakeApi {
    /// Bind to an ephemeral local port and start serving
    pub async fn start() -> ComponentResult<Self> {
        let state = SharedState::default();
        let (addr, shutdown, task) = serve(state.clone()).await?;
        Ok(Self {
            addr,
            state,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Base URL, without a trailing slash
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Register a canned reply; a later route for the same method and path wins
    pub fn register(&self, route: FakeRoute) {
        debug!("Fake {} {} -> {}", route.method, route.path, route.status);
        self.state.lock().routes.insert(route.key(), route);
    }

    pub fn outbound_requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Bodies of every received request, in arrival order
    pub fn outbound_bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|r| r.body.clone())
            .collect()
    }

    pub fn unmatched_requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| !r.matched)
            .cloned()
            .collect()
    }

    /// Forget all routes and recorded requests
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.routes.clear();
        state.requests.clear();
    }

    /// Stop serving and wait for the server task to finish
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Fake API task ended abnormally: {}", e);
            }
        }
    }

    /// Shut down and start again on a fresh port with no routes
    pub async fn restart(&mut self) -> ComponentResult<()> {
        self.close().await;
        self.reset();
        let (addr, shutdown, task) = serve(self.state.clone()).await?;
        self.addr = addr;
        self.shutdown = Some(shutdown);
        self.task = Some(task);
        Ok(())
    }
}

impl Drop for FakeApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl fmt::Debug for FakeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeApi")
            .field("addr", &self.addr)
            .field("running", &self.shutdown.is_some())
            .finish_non_exhaustive()
    }
}

async fn serve(
    state: SharedState,
) -> ComponentResult<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = Router::new().fallback(handle).with_state(state);
    let (tx, rx) = oneshot::channel::<()>();

    info!("Fake API listening on http://{}", addr);
    let task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!("Fake API on {} failed: {}", addr, e);
        }
    });

    Ok((addr, tx, task))
}

async fn handle(State(state): State<SharedState>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    let mut state = state.lock();
    let route = state.routes.get(&(method.clone(), path.clone())).cloned();

    state.requests.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
        matched: route.is_some(),
    });

    match route {
        Some(route) => route.to_response(),
        None => {
            debug!("Fake API has no route for {} {}", method, path);
            let mut response = Response::new(Body::from(format!("no fake route for {method} {path}")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

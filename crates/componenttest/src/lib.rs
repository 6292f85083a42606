//! Component test support for HTTP services
//!
//! Building blocks that Gherkin step definitions call into:
//! - `ApiFeature` issues requests against an in-process `axum::Router` and
//!   asserts on status, headers and JSON bodies (with dynamic placeholders)
//! - `FakeApi` stands in for upstream HTTP services
//! - `AuthorizationFeature` fakes the identity and permissions services
//! - `RedisFeature` runs a throwaway `redis-server` per test run
//! - `MongoFeature` runs a throwaway `mongod` on a temporary data directory
//! - `UiFeature` drives a browser through Playwright
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Step definitions (cucumber)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ApiFeature ──oneshot──> Router (service under test)        │
//! │      │                      │                               │
//! │      │                      └──HTTP──> FakeApi (upstreams)  │
//! │      └── componenttest_validator::Comparator                │
//! │  RedisFeature ──> ProcessHandle(redis-server)               │
//! │  MongoFeature ──> ProcessHandle(mongod --dbpath <tmp>)      │
//! │  UiFeature ──> node + Playwright script                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fake_api;
pub mod health;
pub mod mongo_store;
pub mod redis_store;
pub mod server;
pub mod ui;
pub mod utils;

pub use api::{static_handler, ApiFeature, CapturedResponse, ServiceInitialiser};
pub use auth::AuthorizationFeature;
pub use config::HarnessConfig;
pub use error::{ComponentError, ComponentResult};
pub use fake_api::{FakeApi, FakeRoute, RecordedRequest};
pub use mongo_store::MongoFeature;
pub use redis_store::RedisFeature;
pub use ui::UiFeature;
pub use utils::random_database;

pub use componenttest_validator as validator;

use tracing_subscriber::EnvFilter;

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

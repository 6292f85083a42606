//! Error types for component test features

use componenttest_validator::CompareError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("Service initialiser failed: {0}")]
    Initialiser(String),

    #[error("No response captured; make a request first")]
    NoResponse,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Expected status code {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },

    #[error("Expected header {name:?} to be {expected:?}, got {actual:?}")]
    HeaderMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Response body error: {0}")]
    ResponseBody(String),

    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error("Process failed to start: {0}")]
    ProcessStartup(String),

    #[error("{name} not ready after {attempts} attempts")]
    ProcessNotReady { name: String, attempts: usize },

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("{0}")]
    Accessibility(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] axum::http::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}

pub type ComponentResult<T> = Result<T, ComponentError>;

//! Health-check response model and time-window validation

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComponentError, ComponentResult};

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub build_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub git_commit: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub language_version: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_failure: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: VersionInfo,
    /// Nanoseconds since the service started
    #[serde(default)]
    pub uptime: i64,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
}

/// Timing bounds a health response is validated against
#[derive(Debug, Clone, Copy)]
pub struct HealthWindow {
    pub start_time: DateTime<Utc>,
    pub interval: Duration,
    pub expected_response_time: Duration,
}

impl HealthWindow {
    /// Latest acceptable service start or build time
    pub fn max_start_time(&self) -> DateTime<Utc> {
        self.start_time + self.interval + Duration::seconds(1)
    }

    pub fn validate(&self, actual: &HealthResponse, expected: &HealthResponse) -> ComponentResult<()> {
        ensure_eq("status", &expected.status, &actual.status)?;

        let max_start = self.max_start_time();
        match actual.start_time {
            Some(t) if t < max_start => {}
            other => return Err(fail(format!("start_time {other:?} is not before {max_start}"))),
        }
        if actual.uptime <= 0 {
            return Err(fail(format!("uptime {} should be positive", actual.uptime)));
        }

        self.validate_version(&actual.version, &expected.version, max_start)?;

        if actual.checks.len() != expected.checks.len() {
            return Err(fail(format!(
                "expected {} checks, got {}",
                expected.checks.len(),
                actual.checks.len()
            )));
        }
        for (actual, expected) in actual.checks.iter().zip(&expected.checks) {
            self.validate_check(actual, expected)?;
        }
        Ok(())
    }

    fn validate_version(
        &self,
        actual: &VersionInfo,
        expected: &VersionInfo,
        max_start: DateTime<Utc>,
    ) -> ComponentResult<()> {
        match actual.build_time {
            Some(t) if t < max_start => {}
            other => return Err(fail(format!("build_time {other:?} is not before {max_start}"))),
        }
        ensure_eq("version.git_commit", &expected.git_commit, &actual.git_commit)?;
        ensure_eq("version.language", &expected.language, &actual.language)?;
        if actual.language_version.is_empty() {
            return Err(fail("version.language_version is empty".to_string()));
        }
        ensure_eq("version.version", &expected.version, &actual.version)
    }

    fn validate_check(&self, actual: &HealthCheck, expected: &HealthCheck) -> ComponentResult<()> {
        ensure_eq("check.name", &expected.name, &actual.name)?;
        let name = &actual.name;
        ensure_eq(&format!("check {name} status"), &expected.status, &actual.status)?;
        if expected.status_code != actual.status_code {
            return Err(fail(format!(
                "check {name} status_code: expected {}, got {}",
                expected.status_code, actual.status_code
            )));
        }
        ensure_eq(&format!("check {name} message"), &expected.message, &actual.message)?;

        self.within_window(&format!("check {name} last_checked"), actual.last_checked)?;
        if expected.status == STATUS_OK {
            self.within_window(&format!("check {name} last_success"), actual.last_success)
        } else {
            self.within_window(&format!("check {name} last_failure"), actual.last_failure)
        }
    }

    fn within_window(&self, what: &str, time: Option<DateTime<Utc>>) -> ComponentResult<()> {
        let upper = self.start_time + self.expected_response_time;
        match time {
            Some(t) if t > self.start_time && t < upper => Ok(()),
            Some(t) => Err(fail(format!(
                "{what} {t} outside ({}, {upper})",
                self.start_time
            ))),
            None => Err(fail(format!("{what} is missing"))),
        }
    }
}

fn ensure_eq(what: &str, expected: &str, actual: &str) -> ComponentResult<()> {
    if expected != actual {
        return Err(fail(format!("{what}: expected {expected:?}, got {actual:?}")));
    }
    Ok(())
}

fn fail(message: String) -> ComponentError {
    ComponentError::AssertionFailed(message)
}

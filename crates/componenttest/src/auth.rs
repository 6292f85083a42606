//! Fake identity and permissions services

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{ComponentError, ComponentResult};
use crate::fake_api::{FakeApi, FakeRoute};

pub const PERMISSIONS_BUNDLE_PATH: &str = "/v1/permissions-bundle";
pub const ADMIN_GROUP: &str = "groups/role-admin";

const ALL_PERMISSIONS: &str = r#"{ "permissions": ["DELETE", "READ", "CREATE", "UPDATE"]}"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Policy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// permission -> entity (group or service) -> policies
pub type PermissionsBundle = BTreeMap<String, BTreeMap<String, Vec<Policy>>>;

/// Identity service fake plus permissions API fake
#[derive(Debug)]
pub struct AuthorizationFeature {
    pub identity: FakeApi,
    pub permissions: FakeApi,
}

impl AuthorizationFeature {
    pub async fn new() -> ComponentResult<Self> {
        let feature = Self {
            identity: FakeApi::start().await?,
            permissions: FakeApi::start().await?,
        };
        feature.register_default_permissions_bundle()?;
        Ok(feature)
    }

    pub fn identity_url(&self) -> String {
        self.identity.url()
    }

    pub fn permissions_url(&self) -> String {
        self.permissions.url()
    }

    /// Clear both fakes and restore the empty bundle
    pub fn reset(&self) -> ComponentResult<()> {
        self.identity.reset();
        self.permissions.reset();
        self.register_default_permissions_bundle()
    }

    pub async fn close(&mut self) {
        self.identity.close().await;
        self.permissions.close().await;
    }

    pub fn register_default_permissions_bundle(&self) -> ComponentResult<()> {
        self.set_permissions_bundle(&PermissionsBundle::new())
    }

    pub fn set_permissions_bundle(&self, bundle: &PermissionsBundle) -> ComponentResult<()> {
        debug!("Serving permissions bundle with {} permissions", bundle.len());
        self.permissions
            .register(FakeRoute::get(PERMISSIONS_BUNDLE_PATH).json(bundle)?);
        Ok(())
    }

    pub fn i_am_not_identified(&self) {
        self.identity
            .register(FakeRoute::get("/identity").reply(StatusCode::UNAUTHORIZED));
    }

    pub fn i_am_identified_as(&self, user: &str) -> ComponentResult<()> {
        self.identity
            .register(FakeRoute::get("/identity").json(&json!({ "identifier": user }))?);
        Ok(())
    }

    pub fn service_auth_token_is_valid(&self) {
        self.identity.register(
            FakeRoute::get("/serviceInstancePermissions").body(ALL_PERMISSIONS),
        );
    }

    pub fn service_auth_token_is_not_recognised(&self) {
        self.identity.register(
            FakeRoute::get("/serviceInstancePermissions")
                .reply(StatusCode::UNAUTHORIZED)
                .body(r#"{ "message": "CMD permissions request denied: service account not found"}"#),
        );
    }

    pub fn user_token_is_valid(&self) {
        self.identity
            .register(FakeRoute::get("/userInstancePermissions").body(ALL_PERMISSIONS));
    }

    pub fn user_token_is_not_recognised(&self) {
        self.identity.register(
            FakeRoute::get("/userInstancePermissions")
                .reply(StatusCode::UNAUTHORIZED)
                .body(r#"{ "message": "CMD permissions request denied: session not found"}"#),
        );
    }

    pub fn admin_user_has_permission(&self, permission: &str) -> ComponentResult<()> {
        self.set_permissions_bundle(&single_grant(permission, ADMIN_GROUP))
    }

    pub fn service_user_has_permission(&self, service: &str, permission: &str) -> ComponentResult<()> {
        self.set_permissions_bundle(&single_grant(permission, service))
    }

    /// Replace the bundle with one given as JSON
    pub fn admin_user_has_permissions_json(&self, json: &str) -> ComponentResult<()> {
        let bundle: PermissionsBundle = serde_json::from_str(json)
            .map_err(|e| ComponentError::InvalidArgument(format!("invalid JSON input: {e}")))?;
        self.set_permissions_bundle(&bundle)
    }
}

fn single_grant(permission: &str, entity: &str) -> PermissionsBundle {
    let mut entities = BTreeMap::new();
    entities.insert(entity.to_string(), vec![Policy::new("1")]);
    let mut bundle = PermissionsBundle::new();
    bundle.insert(permission.to_string(), entities);
    bundle
}

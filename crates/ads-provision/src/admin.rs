//! Capability contracts for the four control-plane collaborators.
//!
//! The provisioner only talks to these traits. Lookups return `Ok(None)` for
//! a missing resource; creates return [`AdminError::AlreadyExists`] when the
//! resource is already there.

use std::sync::Arc;

use ads_core::manifest::{FunctionSpec, TableSpec};
use ads_core::{HttpMethod, TableStatus};
use ads_pack::CodePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AdminError, AdminResult};
use crate::wait::{WaitPolicy, poll_until};

// ── Tables ─────────────────────────────────────────────────────────

#[async_trait]
pub trait TableAdmin: Send + Sync {
    async fn create_table(&self, spec: &TableSpec) -> AdminResult<()>;

    /// Current status, or `None` if the table does not exist.
    async fn table_status(&self, name: &str) -> AdminResult<Option<TableStatus>>;

    /// Poll [`table_status`](Self::table_status) until the table is active.
    async fn wait_until_active(&self, name: &str, policy: &WaitPolicy) -> AdminResult<()> {
        poll_until("wait_until_active", name, policy, move || async move {
            match self.table_status(name).await? {
                Some(status) => Ok(status.is_active()),
                None => Err(AdminError::not_found("table_status", name)),
            }
        })
        .await
    }
}

// ── Identity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub name: String,
    pub arn: String,
}

#[async_trait]
pub trait IdentityAdmin: Send + Sync {
    async fn get_role(&self, name: &str) -> AdminResult<Option<RoleInfo>>;

    async fn create_role(&self, name: &str, trust_policy: &str) -> AdminResult<RoleInfo>;

    async fn attached_policies(&self, role: &str) -> AdminResult<Vec<String>>;

    /// Attach one policy. Attaching an attached policy reports `AlreadyExists`.
    async fn attach_policy(&self, role: &str, policy: &str) -> AdminResult<()>;
}

// ── Functions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub arn: String,
    /// Hex SHA-256 of the deployed code archive.
    pub code_sha256: String,
}

/// Permission for a service principal to invoke a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeGrant {
    pub statement_id: String,
    pub principal: String,
    pub source_arn: String,
}

#[async_trait]
pub trait FunctionAdmin: Send + Sync {
    async fn get_function(&self, name: &str) -> AdminResult<Option<FunctionInfo>>;

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodePayload,
        role_arn: &str,
    ) -> AdminResult<FunctionInfo>;

    /// Replace the code of an existing function in place.
    async fn update_function_code(&self, name: &str, code: &CodePayload) -> AdminResult<FunctionInfo>;

    async fn invoke_grant(&self, function: &str, statement_id: &str) -> AdminResult<Option<InvokeGrant>>;

    /// Grant invoke permission. A duplicate statement id reports `AlreadyExists`.
    async fn grant_invoke(&self, function: &str, grant: &InvokeGrant) -> AdminResult<()>;
}

// ── Routing ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub id: String,
    pub name: String,
}

/// Addresses one (node, verb) pair of an API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodTarget {
    pub api_id: String,
    pub node_id: String,
    pub method: HttpMethod,
}

/// What the control plane reports for an existing method binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodInfo {
    pub has_integration: bool,
    /// A 200 method response is declared.
    pub has_method_response: bool,
    /// The integration maps its result onto the 200 response.
    pub has_integration_response: bool,
}

impl MethodInfo {
    /// Every part of the binding is wired.
    pub fn is_complete(&self) -> bool {
        self.has_integration && self.has_method_response && self.has_integration_response
    }
}

/// How a stage relates to the routes currently defined on its API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Missing,
    /// Published, but its deployment predates the current bindings.
    Stale,
    Current,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Integration {
    /// Invoke a function through its integration URI.
    Function { uri: String, request_template: String },
    /// Answer from the gateway itself.
    Mock { request_template: String },
}

/// Integration response for status 200.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationResponse {
    pub template: Option<String>,
    /// Static header values, `(name, value)`.
    pub headers: Vec<(String, String)>,
}

impl IntegrationResponse {
    pub fn header_names(&self) -> Vec<String> {
        self.headers.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[async_trait]
pub trait RoutingAdmin: Send + Sync {
    async fn find_api(&self, name: &str) -> AdminResult<Option<ApiInfo>>;

    async fn create_api(&self, name: &str, description: &str) -> AdminResult<ApiInfo>;

    async fn root_node(&self, api_id: &str) -> AdminResult<String>;

    async fn find_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<Option<String>>;

    async fn create_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<String>;

    async fn get_method(&self, target: &MethodTarget) -> AdminResult<Option<MethodInfo>>;

    async fn put_method(&self, target: &MethodTarget, authorization: &str) -> AdminResult<()>;

    async fn put_integration(&self, target: &MethodTarget, integration: &Integration) -> AdminResult<()>;

    /// Declare the 200 method response and the headers it may carry.
    async fn put_method_response(&self, target: &MethodTarget, header_names: &[String]) -> AdminResult<()>;

    async fn put_integration_response(
        &self,
        target: &MethodTarget,
        response: &IntegrationResponse,
    ) -> AdminResult<()>;

    /// Compare what `stage` serves with the bindings defined now.
    async fn stage_state(&self, api_id: &str, stage: &str) -> AdminResult<StageState>;

    /// Publish the current routes to `stage`, returning the deployment id.
    async fn create_deployment(&self, api_id: &str, stage: &str, description: &str) -> AdminResult<String>;
}

/// The four collaborators a provisioning run needs.
#[derive(Clone)]
pub struct ControlPlane {
    pub tables: Arc<dyn TableAdmin>,
    pub identity: Arc<dyn IdentityAdmin>,
    pub functions: Arc<dyn FunctionAdmin>,
    pub routing: Arc<dyn RoutingAdmin>,
}

impl ControlPlane {
    /// Use one implementation for all four collaborators.
    pub fn unified<T>(cloud: Arc<T>) -> Self
    where
        T: TableAdmin + IdentityAdmin + FunctionAdmin + RoutingAdmin + 'static,
    {
        Self {
            tables: cloud.clone(),
            identity: cloud.clone(),
            functions: cloud.clone(),
            routing: cloud,
        }
    }
}

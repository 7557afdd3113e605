//! Records persisted by the classifieds state store.
//!
//! These mirror what a managed control plane reports for each resource kind:
//! tables, roles, functions, invoke permissions, gateway APIs with their route
//! nodes and method bindings, deployments and stages. All records are
//! serialized to JSON for storage in redb tables.

use std::collections::BTreeMap;

use ads_core::manifest::TableSpec;
use ads_core::{HttpMethod, TableStatus};
use serde::{Deserialize, Serialize};

/// Separator for item keys; cannot appear in table names.
pub const ITEM_KEY_SEP: char = '\u{1f}';

// ── Tables ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRecord {
    pub spec: TableSpec,
    pub status: TableStatus,
    /// Status queries left before a `CREATING` table reports `ACTIVE`.
    pub polls_until_active: u32,
    pub created_at: u64,
}

impl TableRecord {
    pub fn table_key(&self) -> String {
        self.spec.name.clone()
    }
}

// ── Identity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleRecord {
    pub name: String,
    pub arn: String,
    pub trust_policy: String,
    /// Attached policy identifiers, in attachment order.
    pub attached_policies: Vec<String>,
    pub created_at: u64,
}

impl RoleRecord {
    pub fn table_key(&self) -> String {
        self.name.clone()
    }
}

// ── Functions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionRecord {
    pub name: String,
    pub arn: String,
    pub runtime: String,
    /// Entry point, the handler unit name.
    pub handler: String,
    pub role_arn: String,
    pub timeout_secs: u32,
    pub memory_mb: u32,
    pub environment: BTreeMap<String, String>,
    /// Hex SHA-256 of the deployed code archive.
    pub code_sha256: String,
    pub code_size: u64,
    /// Incremented on every code update.
    pub revision: u32,
    pub updated_at: u64,
}

impl FunctionRecord {
    pub fn table_key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionRecord {
    pub function: String,
    pub statement_id: String,
    pub principal: String,
    pub source_arn: String,
}

impl PermissionRecord {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.function, self.statement_id)
    }
}

// ── Gateway ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub root_node_id: String,
    pub created_at: u64,
}

impl ApiRecord {
    pub fn table_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteNodeRecord {
    pub api_id: String,
    pub id: String,
    /// `None` for the root node.
    pub parent_id: Option<String>,
    /// Empty for the root node.
    pub path_part: String,
    pub path: String,
}

impl RouteNodeRecord {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.api_id, self.id)
    }
}

/// How a method binding reaches its backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrationRecord {
    /// Invoke a function with the shaped request.
    Function {
        uri: String,
        request_template: String,
    },
    /// Answer directly without a backend.
    Mock { request_template: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodRecord {
    pub api_id: String,
    pub node_id: String,
    pub method: HttpMethod,
    pub authorization: String,
    pub integration: Option<IntegrationRecord>,
    /// A status 200 method response has been declared.
    #[serde(default)]
    pub has_method_response: bool,
    /// Declared method response headers for status 200.
    pub response_headers: Vec<String>,
    /// The integration response for status 200 has been written.
    #[serde(default)]
    pub has_integration_response: bool,
    /// Integration response: template plus static header values.
    pub response_template: Option<String>,
    pub response_header_values: BTreeMap<String, String>,
}

impl MethodRecord {
    pub fn table_key(&self) -> String {
        method_key(&self.api_id, &self.node_id, self.method)
    }
}

pub fn method_key(api_id: &str, node_id: &str, method: HttpMethod) -> String {
    format!("{api_id}:{node_id}:{}", method.as_str())
}

/// One route as frozen in a deployment snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployedRoute {
    pub path: String,
    pub method: HttpMethod,
    pub integration: Option<IntegrationRecord>,
    pub response_template: Option<String>,
    pub response_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentRecord {
    pub api_id: String,
    pub id: String,
    pub description: String,
    pub created_at: u64,
    pub routes: Vec<DeployedRoute>,
}

impl DeploymentRecord {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.api_id, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    pub api_id: String,
    pub name: String,
    pub deployment_id: String,
    pub updated_at: u64,
}

impl StageRecord {
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.api_id, self.name)
    }
}

/// Current unix time in seconds.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

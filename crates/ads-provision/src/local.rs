//! A persistent local control plane.
//!
//! `LocalCloud` implements all four admin traits over [`StateStore`], so a
//! local target behaves like the managed one across process restarts:
//! creates conflict on existing resources, tables start `CREATING` and turn
//! `ACTIVE` only after being polled, deployments freeze a snapshot of the
//! routes that the local gateway serves.

use std::collections::BTreeMap;

use ads_core::arn::function_arn_from_uri;
use ads_core::manifest::{FunctionSpec, TableSpec};
use ads_core::{HttpMethod, TableStatus};
use ads_pack::CodePayload;
use ads_state::{
    ApiRecord, DeployedRoute, DeploymentRecord, FunctionRecord, IntegrationRecord, MethodRecord,
    PermissionRecord, RoleRecord, RouteNodeRecord, StageRecord, StateError, StateStore, TableRecord,
    now_epoch,
};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::admin::{
    ApiInfo, FunctionAdmin, FunctionInfo, IdentityAdmin, Integration, IntegrationResponse,
    InvokeGrant, MethodInfo, MethodTarget, RoleInfo, RoutingAdmin, StageState, TableAdmin,
};
use crate::error::{AdminError, AdminResult};

/// Account id used in every local ARN.
pub const LOCAL_ACCOUNT: &str = "000000000000";

/// Status polls a new table needs before it reports `ACTIVE`.
pub const DEFAULT_ACTIVATION_POLLS: u32 = 2;

#[derive(Clone)]
pub struct LocalCloud {
    store: StateStore,
    region: String,
    activation_polls: u32,
}

impl LocalCloud {
    pub fn new(store: StateStore, region: &str) -> Self {
        Self {
            store,
            region: region.to_string(),
            activation_polls: DEFAULT_ACTIVATION_POLLS,
        }
    }

    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn function_arn(&self, name: &str) -> String {
        format!("arn:aws:lambda:{}:{LOCAL_ACCOUNT}:function:{name}", self.region)
    }

    fn require_api(&self, op: &'static str, api_id: &str) -> AdminResult<ApiRecord> {
        self.store
            .get_api(api_id)
            .map_err(state_err(op))?
            .ok_or_else(|| AdminError::not_found(op, format!("api {api_id}")))
    }

    fn require_method(&self, op: &'static str, target: &MethodTarget) -> AdminResult<MethodRecord> {
        self.store
            .get_method(&target.api_id, &target.node_id, target.method)
            .map_err(state_err(op))?
            .ok_or_else(|| AdminError::not_found(op, format!("{} on node {}", target.method, target.node_id)))
    }

    /// Freeze every wired method binding of an API into route snapshots.
    fn snapshot_routes(&self, op: &'static str, api_id: &str) -> AdminResult<Vec<DeployedRoute>> {
        let paths: BTreeMap<String, String> = self
            .store
            .list_route_nodes(api_id)
            .map_err(state_err(op))?
            .into_iter()
            .map(|node| (node.id, node.path))
            .collect();

        let mut routes = Vec::new();
        for method in self.store.list_methods(api_id).map_err(state_err(op))? {
            let Some(path) = paths.get(&method.node_id) else {
                continue;
            };
            if method.integration.is_none() {
                continue;
            }
            routes.push(DeployedRoute {
                path: path.clone(),
                method: method.method,
                integration: method.integration,
                response_template: method.response_template,
                response_headers: method.response_header_values,
            });
        }
        routes.sort_by(|a, b| (&a.path, a.method).cmp(&(&b.path, b.method)));
        Ok(routes)
    }
}

fn state_err(op: &'static str) -> impl Fn(StateError) -> AdminError {
    move |e| AdminError::backend(op, e.to_string())
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

// ── Tables ─────────────────────────────────────────────────────────

#[async_trait]
impl TableAdmin for LocalCloud {
    async fn create_table(&self, spec: &TableSpec) -> AdminResult<()> {
        let op = "create_table";
        if self.store.get_table(&spec.name).map_err(state_err(op))?.is_some() {
            return Err(AdminError::already_exists(op, format!("table {}", spec.name)));
        }
        let status = if self.activation_polls == 0 {
            TableStatus::Active
        } else {
            TableStatus::Creating
        };
        self.store
            .put_table(&TableRecord {
                spec: spec.clone(),
                status,
                polls_until_active: self.activation_polls,
                created_at: now_epoch(),
            })
            .map_err(state_err(op))?;
        info!(table = %spec.name, "local table created");
        Ok(())
    }

    async fn table_status(&self, name: &str) -> AdminResult<Option<TableStatus>> {
        let op = "table_status";
        let Some(mut record) = self.store.get_table(name).map_err(state_err(op))? else {
            return Ok(None);
        };
        if record.status == TableStatus::Creating {
            record.polls_until_active = record.polls_until_active.saturating_sub(1);
            if record.polls_until_active == 0 {
                record.status = TableStatus::Active;
            }
            self.store.put_table(&record).map_err(state_err(op))?;
        }
        Ok(Some(record.status))
    }
}

// ── Identity ───────────────────────────────────────────────────────

#[async_trait]
impl IdentityAdmin for LocalCloud {
    async fn get_role(&self, name: &str) -> AdminResult<Option<RoleInfo>> {
        Ok(self
            .store
            .get_role(name)
            .map_err(state_err("get_role"))?
            .map(|r| RoleInfo { name: r.name, arn: r.arn }))
    }

    async fn create_role(&self, name: &str, trust_policy: &str) -> AdminResult<RoleInfo> {
        let op = "create_role";
        if self.store.get_role(name).map_err(state_err(op))?.is_some() {
            return Err(AdminError::already_exists(op, format!("role {name}")));
        }
        serde_json::from_str::<serde_json::Value>(trust_policy)
            .map_err(|e| AdminError::invalid(op, format!("malformed trust policy: {e}")))?;
        let record = RoleRecord {
            name: name.to_string(),
            arn: format!("arn:aws:iam::{LOCAL_ACCOUNT}:role/{name}"),
            trust_policy: trust_policy.to_string(),
            attached_policies: Vec::new(),
            created_at: now_epoch(),
        };
        self.store.put_role(&record).map_err(state_err(op))?;
        Ok(RoleInfo {
            name: record.name,
            arn: record.arn,
        })
    }

    async fn attached_policies(&self, role: &str) -> AdminResult<Vec<String>> {
        let op = "attached_policies";
        self.store
            .get_role(role)
            .map_err(state_err(op))?
            .map(|r| r.attached_policies)
            .ok_or_else(|| AdminError::not_found(op, format!("role {role}")))
    }

    async fn attach_policy(&self, role: &str, policy: &str) -> AdminResult<()> {
        let op = "attach_policy";
        let mut record = self
            .store
            .get_role(role)
            .map_err(state_err(op))?
            .ok_or_else(|| AdminError::not_found(op, format!("role {role}")))?;
        if record.attached_policies.iter().any(|p| p == policy) {
            return Err(AdminError::already_exists(op, format!("{policy} on {role}")));
        }
        record.attached_policies.push(policy.to_string());
        self.store.put_role(&record).map_err(state_err(op))
    }
}

// ── Functions ──────────────────────────────────────────────────────

#[async_trait]
impl FunctionAdmin for LocalCloud {
    async fn get_function(&self, name: &str) -> AdminResult<Option<FunctionInfo>> {
        Ok(self
            .store
            .get_function(name)
            .map_err(state_err("get_function"))?
            .map(|f| FunctionInfo {
                name: f.name,
                arn: f.arn,
                code_sha256: f.code_sha256,
            }))
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodePayload,
        role_arn: &str,
    ) -> AdminResult<FunctionInfo> {
        let op = "create_function";
        if self.store.get_function(&spec.name).map_err(state_err(op))?.is_some() {
            return Err(AdminError::already_exists(op, format!("function {}", spec.name)));
        }
        let role_name = role_arn.rsplit('/').next().unwrap_or_default();
        if self.store.get_role(role_name).map_err(state_err(op))?.is_none() {
            return Err(AdminError::invalid(op, format!("role {role_arn} cannot be assumed")));
        }

        let record = FunctionRecord {
            name: spec.name.clone(),
            arn: self.function_arn(&spec.name),
            runtime: spec.runtime.clone(),
            handler: spec.handler.name().to_string(),
            role_arn: role_arn.to_string(),
            timeout_secs: spec.timeout_secs,
            memory_mb: spec.memory_mb,
            environment: spec.environment.clone(),
            code_sha256: code.sha256.clone(),
            code_size: code.size_bytes(),
            revision: 1,
            updated_at: now_epoch(),
        };
        self.store.put_function(&record).map_err(state_err(op))?;
        Ok(FunctionInfo {
            name: record.name,
            arn: record.arn,
            code_sha256: record.code_sha256,
        })
    }

    async fn update_function_code(&self, name: &str, code: &CodePayload) -> AdminResult<FunctionInfo> {
        let op = "update_function_code";
        let mut record = self
            .store
            .get_function(name)
            .map_err(state_err(op))?
            .ok_or_else(|| AdminError::not_found(op, format!("function {name}")))?;
        record.code_sha256 = code.sha256.clone();
        record.code_size = code.size_bytes();
        record.revision += 1;
        record.updated_at = now_epoch();
        self.store.put_function(&record).map_err(state_err(op))?;
        debug!(function = %name, revision = record.revision, "local function code replaced");
        Ok(FunctionInfo {
            name: record.name,
            arn: record.arn,
            code_sha256: record.code_sha256,
        })
    }

    async fn invoke_grant(&self, function: &str, statement_id: &str) -> AdminResult<Option<InvokeGrant>> {
        Ok(self
            .store
            .get_permission(function, statement_id)
            .map_err(state_err("invoke_grant"))?
            .map(|p| InvokeGrant {
                statement_id: p.statement_id,
                principal: p.principal,
                source_arn: p.source_arn,
            }))
    }

    async fn grant_invoke(&self, function: &str, grant: &InvokeGrant) -> AdminResult<()> {
        let op = "grant_invoke";
        if self.store.get_function(function).map_err(state_err(op))?.is_none() {
            return Err(AdminError::not_found(op, format!("function {function}")));
        }
        if self
            .store
            .get_permission(function, &grant.statement_id)
            .map_err(state_err(op))?
            .is_some()
        {
            return Err(AdminError::already_exists(
                op,
                format!("statement {} on {function}", grant.statement_id),
            ));
        }
        self.store
            .put_permission(&PermissionRecord {
                function: function.to_string(),
                statement_id: grant.statement_id.clone(),
                principal: grant.principal.clone(),
                source_arn: grant.source_arn.clone(),
            })
            .map_err(state_err(op))
    }
}

// ── Routing ────────────────────────────────────────────────────────

#[async_trait]
impl RoutingAdmin for LocalCloud {
    async fn find_api(&self, name: &str) -> AdminResult<Option<ApiInfo>> {
        Ok(self
            .store
            .list_apis()
            .map_err(state_err("find_api"))?
            .into_iter()
            .find(|a| a.name == name)
            .map(|a| ApiInfo { id: a.id, name: a.name }))
    }

    async fn create_api(&self, name: &str, description: &str) -> AdminResult<ApiInfo> {
        let op = "create_api";
        let api = ApiRecord {
            id: short_id(),
            name: name.to_string(),
            description: description.to_string(),
            root_node_id: short_id(),
            created_at: now_epoch(),
        };
        self.store
            .put_route_node(&RouteNodeRecord {
                api_id: api.id.clone(),
                id: api.root_node_id.clone(),
                parent_id: None,
                path_part: String::new(),
                path: "/".to_string(),
            })
            .map_err(state_err(op))?;
        self.store.put_api(&api).map_err(state_err(op))?;
        info!(api = %api.name, id = %api.id, "local api created");
        Ok(ApiInfo {
            id: api.id,
            name: api.name,
        })
    }

    async fn root_node(&self, api_id: &str) -> AdminResult<String> {
        Ok(self.require_api("root_node", api_id)?.root_node_id)
    }

    async fn find_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<Option<String>> {
        Ok(self
            .store
            .list_route_nodes(api_id)
            .map_err(state_err("find_child_node"))?
            .into_iter()
            .find(|n| n.parent_id.as_deref() == Some(parent_id) && n.path_part == segment)
            .map(|n| n.id))
    }

    async fn create_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<String> {
        let op = "create_child_node";
        let parent = self
            .store
            .get_route_node(api_id, parent_id)
            .map_err(state_err(op))?
            .ok_or_else(|| AdminError::not_found(op, format!("parent node {parent_id}")))?;
        if self.find_child_node(api_id, parent_id, segment).await?.is_some() {
            return Err(AdminError::already_exists(op, format!("{segment} under {}", parent.path)));
        }
        let path = if parent.path == "/" {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", parent.path)
        };
        let node = RouteNodeRecord {
            api_id: api_id.to_string(),
            id: short_id(),
            parent_id: Some(parent_id.to_string()),
            path_part: segment.to_string(),
            path,
        };
        self.store.put_route_node(&node).map_err(state_err(op))?;
        Ok(node.id)
    }

    async fn get_method(&self, target: &MethodTarget) -> AdminResult<Option<MethodInfo>> {
        Ok(self
            .store
            .get_method(&target.api_id, &target.node_id, target.method)
            .map_err(state_err("get_method"))?
            .map(|m| MethodInfo {
                has_integration: m.integration.is_some(),
                has_method_response: m.has_method_response,
                has_integration_response: m.has_integration_response,
            }))
    }

    async fn put_method(&self, target: &MethodTarget, authorization: &str) -> AdminResult<()> {
        let op = "put_method";
        if self
            .store
            .get_route_node(&target.api_id, &target.node_id)
            .map_err(state_err(op))?
            .is_none()
        {
            return Err(AdminError::not_found(op, format!("node {}", target.node_id)));
        }
        if self.get_method(target).await?.is_some() {
            return Err(AdminError::already_exists(
                op,
                format!("{} on node {}", target.method, target.node_id),
            ));
        }
        self.store
            .put_method(&MethodRecord {
                api_id: target.api_id.clone(),
                node_id: target.node_id.clone(),
                method: target.method,
                authorization: authorization.to_string(),
                integration: None,
                has_method_response: false,
                response_headers: Vec::new(),
                has_integration_response: false,
                response_template: None,
                response_header_values: BTreeMap::new(),
            })
            .map_err(state_err(op))
    }

    async fn put_integration(&self, target: &MethodTarget, integration: &Integration) -> AdminResult<()> {
        let op = "put_integration";
        let mut method = self.require_method(op, target)?;
        method.integration = Some(match integration {
            Integration::Function {
                uri,
                request_template,
            } => {
                let Some(arn) = function_arn_from_uri(uri) else {
                    return Err(AdminError::invalid(op, format!("not an invocation uri: {uri}")));
                };
                let name = arn.rsplit(':').next().unwrap_or_default();
                if self.store.get_function(name).map_err(state_err(op))?.is_none() {
                    return Err(AdminError::invalid(op, format!("no function behind {uri}")));
                }
                IntegrationRecord::Function {
                    uri: uri.clone(),
                    request_template: request_template.clone(),
                }
            }
            Integration::Mock { request_template } => IntegrationRecord::Mock {
                request_template: request_template.clone(),
            },
        });
        self.store.put_method(&method).map_err(state_err(op))
    }

    async fn put_method_response(&self, target: &MethodTarget, header_names: &[String]) -> AdminResult<()> {
        let op = "put_method_response";
        let mut method = self.require_method(op, target)?;
        method.has_method_response = true;
        method.response_headers = header_names.to_vec();
        self.store.put_method(&method).map_err(state_err(op))
    }

    async fn put_integration_response(
        &self,
        target: &MethodTarget,
        response: &IntegrationResponse,
    ) -> AdminResult<()> {
        let op = "put_integration_response";
        let mut method = self.require_method(op, target)?;
        if method.integration.is_none() {
            return Err(AdminError::invalid(op, "method has no integration"));
        }
        let mut values = BTreeMap::new();
        for (name, value) in &response.headers {
            if !method.response_headers.contains(name) {
                return Err(AdminError::invalid(op, format!("undeclared response header {name}")));
            }
            values.insert(name.clone(), value.trim_matches('\'').to_string());
        }
        method.has_integration_response = true;
        method.response_template = response.template.clone();
        method.response_header_values = values;
        self.store.put_method(&method).map_err(state_err(op))
    }

    async fn stage_state(&self, api_id: &str, stage: &str) -> AdminResult<StageState> {
        let op = "stage_state";
        let Some(stage) = self.store.get_stage(api_id, stage).map_err(state_err(op))? else {
            return Ok(StageState::Missing);
        };
        let Some(deployment) = self
            .store
            .get_deployment(api_id, &stage.deployment_id)
            .map_err(state_err(op))?
        else {
            return Ok(StageState::Stale);
        };
        if deployment.routes == self.snapshot_routes(op, api_id)? {
            Ok(StageState::Current)
        } else {
            Ok(StageState::Stale)
        }
    }

    async fn create_deployment(&self, api_id: &str, stage: &str, description: &str) -> AdminResult<String> {
        let op = "create_deployment";
        self.require_api(op, api_id)?;
        let routes = self.snapshot_routes(op, api_id)?;
        if routes.iter().all(|r| r.method == HttpMethod::Options) {
            return Err(AdminError::invalid(op, "the api has no methods to deploy"));
        }

        let deployment = DeploymentRecord {
            api_id: api_id.to_string(),
            id: short_id(),
            description: description.to_string(),
            created_at: now_epoch(),
            routes,
        };
        self.store.put_deployment(&deployment).map_err(state_err(op))?;
        self.store
            .put_stage(&StageRecord {
                api_id: api_id.to_string(),
                name: stage.to_string(),
                deployment_id: deployment.id.clone(),
                updated_at: now_epoch(),
            })
            .map_err(state_err(op))?;
        info!(api = %api_id, %stage, deployment = %deployment.id, "local deployment published");
        Ok(deployment.id)
    }
}

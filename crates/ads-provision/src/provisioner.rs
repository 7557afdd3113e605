//! The seven-step reconciliation procedure.
//!
//! Every step re-queries the control plane before acting and nothing is
//! cached across steps, so an interrupted run is resumed by running again.
//! Table and role failures abort the run; everything after the role is
//! attempted item by item and aggregated into the [`RunReport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ads_core::arn::{self, Arn};
use ads_core::manifest::{
    FunctionSpec, GATEWAY_SERVICE_PRINCIPAL, Manifest, MethodSpec, RouteNode, TableSpec,
};
use ads_core::{AdsConfig, CORS_MOCK_TEMPLATE, HttpMethod, RESPONSE_TEMPLATE};
use ads_pack::PayloadSource;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::admin::{
    ControlPlane, FunctionInfo, Integration, IntegrationResponse, InvokeGrant, MethodInfo,
    MethodTarget, RoleInfo, StageState,
};
use crate::error::{AdminError, AdminResult, ProvisionError};
use crate::reconcile::{Found, find_or_create, retry_transient};
use crate::report::{Outcome, ResourceKind, RunReport, Step};
use crate::wait::{RetryPolicy, WaitPolicy};

const AUTHORIZATION_NONE: &str = "NONE";
const ALLOW_ORIGIN_HEADER: &str = "Access-Control-Allow-Origin";

/// Tunables of a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Worst-case delay before a newly created role can be assumed.
    pub propagation_delay: Duration,
    pub table_wait: WaitPolicy,
    pub retry: RetryPolicy,
    /// Publish a deployment even when routing is unchanged.
    pub always_redeploy: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_secs(30),
            table_wait: WaitPolicy::default(),
            retry: RetryPolicy::default(),
            always_redeploy: false,
        }
    }
}

impl ProvisionSettings {
    pub fn from_config(config: &AdsConfig) -> Result<Self, ProvisionError> {
        Ok(Self {
            propagation_delay: config.propagation_delay()?,
            table_wait: WaitPolicy {
                timeout: config.table_active_timeout()?,
                interval: config.poll_interval()?,
            },
            retry: RetryPolicy {
                attempts: config.retry_attempts().max(1),
                backoff: config.retry_backoff()?,
            },
            always_redeploy: config.always_redeploy(),
        })
    }
}

pub struct Provisioner {
    plane: ControlPlane,
    payloads: Arc<dyn PayloadSource>,
    manifest: Manifest,
    settings: ProvisionSettings,
}

/// Route node ids resolved during step 5, keyed by path.
type NodeIds = HashMap<String, String>;

impl Provisioner {
    pub fn new(
        plane: ControlPlane,
        payloads: Arc<dyn PayloadSource>,
        manifest: Manifest,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            plane,
            payloads,
            manifest,
            settings,
        }
    }

    /// Run all seven steps and report what happened.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        info!(
            api = %self.manifest.api.name,
            stage = %self.manifest.api.stage,
            region = %self.manifest.region,
            "provisioning started"
        );
        if let Err(e) = self.run_steps(&mut report).await {
            if let ProvisionError::Blocking { step, .. } = &e {
                error!(%step, error = %e, "provisioning aborted");
                report.abort(*step, e.to_string());
            }
        }
        info!(changes = report.changes(), status = ?report.status(), "provisioning finished");
        report
    }

    async fn run_steps(&self, report: &mut RunReport) -> Result<(), ProvisionError> {
        self.ensure_tables(report).await?;
        let role = self.ensure_role(report).await?;
        self.attach_policies(&role, report).await;
        self.ensure_functions(&role, report).await;

        let Some(api_id) = self.ensure_api(report).await else {
            self.skip_routing(report, "api unavailable");
            return Ok(());
        };
        report.api_id = Some(api_id.clone());
        let mut routing_changed = report.created(ResourceKind::Api) > 0;

        let nodes = self.ensure_route_tree(&api_id, report).await;
        self.ensure_methods(&api_id, &nodes, report).await;
        routing_changed |= report.items.iter().any(|i| {
            matches!(
                i.kind,
                ResourceKind::RouteNode | ResourceKind::Method | ResourceKind::Cors
            ) && i.outcome.is_change()
        });

        self.ensure_deployment(&api_id, routing_changed, report).await;
        Ok(())
    }

    // ── Step 1: tables ─────────────────────────────────────────────

    async fn ensure_tables(&self, report: &mut RunReport) -> Result<(), ProvisionError> {
        let step = Step::Tables;
        for table in &self.manifest.tables {
            let outcome = self
                .ensure_table(table)
                .await
                .map_err(|e| ProvisionError::blocking(step, e))?;
            report.record(step, ResourceKind::Table, &table.name, outcome);
        }

        for table in &self.manifest.tables {
            self.plane
                .tables
                .wait_until_active(&table.name, &self.settings.table_wait)
                .await
                .map_err(|e| ProvisionError::blocking(step, e))?;
            info!(table = %table.name, "table active");
        }
        Ok(())
    }

    async fn ensure_table(&self, table: &TableSpec) -> AdminResult<Outcome> {
        let tables = &self.plane.tables;
        let retry = &self.settings.retry;
        let found = find_or_create(
            move || retry_transient("table_status", retry, move || tables.table_status(&table.name)),
            move || async move {
                retry_transient("create_table", retry, move || tables.create_table(table)).await?;
                Ok(ads_core::TableStatus::Creating)
            },
        )
        .await?;
        Ok(match found {
            Found::Created(_) => {
                info!(table = %table.name, "table created");
                Outcome::Created
            }
            Found::Existing(status) => {
                info!(table = %table.name, %status, "table already exists");
                Outcome::AlreadySatisfied
            }
        })
    }

    // ── Step 2: role ───────────────────────────────────────────────

    async fn ensure_role(&self, report: &mut RunReport) -> Result<RoleInfo, ProvisionError> {
        let step = Step::Role;
        let role = &self.manifest.role;
        let identity = &self.plane.identity;
        let retry = &self.settings.retry;
        let trust_policy = role.trust_policy();
        let trust_policy = trust_policy.as_str();

        let found = find_or_create(
            move || retry_transient("get_role", retry, move || identity.get_role(&role.name)),
            move || retry_transient("create_role", retry, move || identity.create_role(&role.name, trust_policy)),
        )
        .await
        .map_err(|e| ProvisionError::blocking(step, e))?;

        let created = found.was_created();
        let info = found.into_inner();
        if created {
            report.record(step, ResourceKind::Role, &role.name, Outcome::Created);
            info!(
                role = %role.name,
                arn = %info.arn,
                delay = ?self.settings.propagation_delay,
                "role created, waiting for propagation"
            );
            sleep(self.settings.propagation_delay).await;
        } else {
            report.record(step, ResourceKind::Role, &role.name, Outcome::AlreadySatisfied);
            info!(role = %role.name, arn = %info.arn, "role already exists");
        }
        Ok(info)
    }

    // ── Step 3: policies ───────────────────────────────────────────

    async fn attach_policies(&self, role: &RoleInfo, report: &mut RunReport) {
        let step = Step::Policies;
        let identity = &self.plane.identity;
        let retry = &self.settings.retry;

        let attached = match retry_transient("attached_policies", retry, move || {
            identity.attached_policies(&role.name)
        })
        .await
        {
            Ok(attached) => attached,
            Err(e) => {
                // Attaching is idempotent upstream, so without the listing
                // there is no telling a new attachment from an existing one.
                error!(role = %role.name, error = %e, "could not list attached policies");
                let reason = format!("attached policies unavailable: {e}");
                for policy in &self.manifest.role.policies {
                    report.record(step, ResourceKind::Policy, policy, Outcome::Failed(reason.clone()));
                }
                return;
            }
        };

        for policy in &self.manifest.role.policies {
            let outcome = if attached.contains(policy) {
                Outcome::AlreadySatisfied
            } else {
                match retry_transient("attach_policy", retry, move || {
                    identity.attach_policy(&role.name, policy)
                })
                .await
                {
                    Ok(()) => Outcome::Created,
                    Err(e) if e.is_already_satisfied() => Outcome::AlreadySatisfied,
                    Err(e) => {
                        error!(%policy, error = %e, "policy attachment failed");
                        Outcome::Failed(e.to_string())
                    }
                }
            };
            debug!(%policy, %outcome, "policy reconciled");
            report.record(step, ResourceKind::Policy, policy, outcome);
        }
    }

    // ── Step 4: functions ──────────────────────────────────────────

    async fn ensure_functions(&self, role: &RoleInfo, report: &mut RunReport) {
        let step = Step::Functions;
        for function in &self.manifest.functions {
            match self.ensure_function(function, role).await {
                Ok((outcome, info)) => {
                    info!(function = %function.name, %outcome, "function reconciled");
                    report.record(step, ResourceKind::Function, &function.name, outcome);
                    let grant = self.ensure_invoke_grant(function, &info).await;
                    report.record(step, ResourceKind::Permission, &function.name, grant);
                }
                Err(reason) => {
                    error!(function = %function.name, %reason, "function failed");
                    report.record(
                        step,
                        ResourceKind::Function,
                        &function.name,
                        Outcome::Failed(reason),
                    );
                    report.record(
                        step,
                        ResourceKind::Permission,
                        &function.name,
                        Outcome::Skipped("function failed".to_string()),
                    );
                }
            }
        }
    }

    async fn ensure_function(
        &self,
        function: &FunctionSpec,
        role: &RoleInfo,
    ) -> Result<(Outcome, FunctionInfo), String> {
        let code = self
            .payloads
            .package(function)
            .map_err(|e| format!("packaging failed: {e:#}"))?;
        debug!(function = %function.name, sha256 = %code.sha256, size = code.size_bytes(), "code packaged");

        let code = &code;
        let functions = &self.plane.functions;
        let retry = &self.settings.retry;
        let found = find_or_create(
            move || retry_transient("get_function", retry, move || functions.get_function(&function.name)),
            move || retry_transient("create_function", retry, move || {
                functions.create_function(function, code, &role.arn)
            }),
        )
        .await
        .map_err(|e| e.to_string())?;

        match found {
            Found::Created(info) => Ok((Outcome::Created, info)),
            Found::Existing(info) if info.code_sha256 == code.sha256 => {
                Ok((Outcome::AlreadySatisfied, info))
            }
            Found::Existing(_) => {
                let info = retry_transient("update_function_code", retry, move || {
                    functions.update_function_code(&function.name, code)
                })
                .await
                .map_err(|e| e.to_string())?;
                Ok((Outcome::Updated, info))
            }
        }
    }

    async fn ensure_invoke_grant(&self, function: &FunctionSpec, info: &FunctionInfo) -> Outcome {
        let account = match Arn::parse(&info.arn) {
            Ok(arn) => arn.account,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        let grant = InvokeGrant {
            statement_id: function.invoke_statement_id(),
            principal: GATEWAY_SERVICE_PRINCIPAL.to_string(),
            source_arn: arn::execute_api_source_pattern(&self.manifest.region, &account),
        };

        let grant = &grant;
        let functions = &self.plane.functions;
        let retry = &self.settings.retry;
        let result = find_or_create(
            move || retry_transient("invoke_grant", retry, move || {
                functions.invoke_grant(&function.name, &grant.statement_id)
            }),
            move || async move {
                retry_transient("grant_invoke", retry, move || functions.grant_invoke(&function.name, grant))
                    .await
                    .map(|()| grant.clone())
            },
        )
        .await;

        match result {
            Ok(Found::Created(_)) => Outcome::Created,
            Ok(Found::Existing(_)) => Outcome::AlreadySatisfied,
            Err(e) if e.is_already_satisfied() => Outcome::AlreadySatisfied,
            Err(e) => {
                error!(function = %function.name, error = %e, "invoke grant failed");
                Outcome::Failed(e.to_string())
            }
        }
    }

    // ── Step 5: API and route tree ─────────────────────────────────

    async fn ensure_api(&self, report: &mut RunReport) -> Option<String> {
        let step = Step::Routes;
        let api = &self.manifest.api;
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;

        let found = find_or_create(
            move || retry_transient("find_api", retry, move || routing.find_api(&api.name)),
            move || retry_transient("create_api", retry, move || routing.create_api(&api.name, &api.description)),
        )
        .await;

        match found {
            Ok(found) => {
                let outcome = if found.was_created() {
                    Outcome::Created
                } else {
                    Outcome::AlreadySatisfied
                };
                let info = found.into_inner();
                info!(api = %info.name, id = %info.id, %outcome, "api reconciled");
                report.record(step, ResourceKind::Api, &api.name, outcome);
                Some(info.id)
            }
            Err(e) => {
                error!(api = %api.name, error = %e, "api unavailable");
                report.record(step, ResourceKind::Api, &api.name, Outcome::Failed(e.to_string()));
                None
            }
        }
    }

    async fn ensure_route_tree(&self, api_id: &str, report: &mut RunReport) -> NodeIds {
        let step = Step::Routes;
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;
        let mut nodes = NodeIds::new();

        match retry_transient("root_node", retry, move || routing.root_node(api_id)).await {
            Ok(root) => {
                nodes.insert("/".to_string(), root);
            }
            Err(e) => {
                error!(error = %e, "root node unavailable");
                for node in &self.manifest.routes {
                    report.record(
                        step,
                        ResourceKind::RouteNode,
                        &node.path,
                        Outcome::Skipped("root node unavailable".to_string()),
                    );
                }
                return nodes;
            }
        }

        for node in &self.manifest.routes {
            let Some(parent_id) = nodes.get(&node.parent).cloned() else {
                report.record(
                    step,
                    ResourceKind::RouteNode,
                    &node.path,
                    Outcome::Skipped(format!("parent {} unavailable", node.parent)),
                );
                continue;
            };
            match self.ensure_node(api_id, &parent_id, node).await {
                Ok(found) => {
                    let outcome = if found.was_created() {
                        Outcome::Created
                    } else {
                        Outcome::AlreadySatisfied
                    };
                    info!(path = %node.path, %outcome, "route node reconciled");
                    report.record(step, ResourceKind::RouteNode, &node.path, outcome);
                    nodes.insert(node.path.clone(), found.into_inner());
                }
                Err(e) => {
                    error!(path = %node.path, error = %e, "route node failed");
                    report.record(
                        step,
                        ResourceKind::RouteNode,
                        &node.path,
                        Outcome::Failed(e.to_string()),
                    );
                }
            }
        }
        nodes
    }

    async fn ensure_node(&self, api_id: &str, parent_id: &str, node: &RouteNode) -> AdminResult<Found<String>> {
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;
        find_or_create(
            move || retry_transient("find_child_node", retry, move || {
                routing.find_child_node(api_id, parent_id, &node.segment)
            }),
            move || retry_transient("create_child_node", retry, move || {
                routing.create_child_node(api_id, parent_id, &node.segment)
            }),
        )
        .await
    }

    // ── Step 6: method bindings ────────────────────────────────────

    async fn ensure_methods(&self, api_id: &str, nodes: &NodeIds, report: &mut RunReport) {
        let step = Step::Methods;
        for node in &self.manifest.routes {
            let bindings: Vec<&MethodSpec> = self.manifest.methods_at(&node.path).collect();
            if bindings.is_empty() {
                continue;
            }
            let Some(node_id) = nodes.get(&node.path) else {
                for binding in &bindings {
                    report.record(
                        step,
                        ResourceKind::Method,
                        binding_name(binding),
                        Outcome::Skipped(format!("route {} unavailable", node.path)),
                    );
                }
                report.record(
                    step,
                    ResourceKind::Cors,
                    &node.path,
                    Outcome::Skipped(format!("route {} unavailable", node.path)),
                );
                continue;
            };

            for binding in &bindings {
                let target = MethodTarget {
                    api_id: api_id.to_string(),
                    node_id: node_id.clone(),
                    method: binding.method,
                };
                let outcome = match self.ensure_binding(&target, binding).await {
                    Ok(outcome) => outcome,
                    Err(e) => Outcome::Failed(e.to_string()),
                };
                info!(method = %binding.method, path = %binding.path, function = %binding.function, %outcome, "method reconciled");
                report.record(step, ResourceKind::Method, binding_name(binding), outcome);
            }

            let target = MethodTarget {
                api_id: api_id.to_string(),
                node_id: node_id.clone(),
                method: HttpMethod::Options,
            };
            let outcome = match self.ensure_cors(&target, &node.path).await {
                Ok(outcome) => outcome,
                Err(e) => Outcome::Failed(e.to_string()),
            };
            info!(path = %node.path, %outcome, "cors pre-flight reconciled");
            report.record(step, ResourceKind::Cors, &node.path, outcome);
        }
    }

    /// Create a binding if absent. An existing, fully wired binding is left
    /// untouched; an interrupted one gets only its missing parts.
    async fn ensure_binding(&self, target: &MethodTarget, binding: &MethodSpec) -> AdminResult<Outcome> {
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;

        let existing = retry_transient("get_method", retry, move || routing.get_method(target)).await?;
        if existing.is_some_and(|m| m.is_complete()) {
            return Ok(Outcome::AlreadySatisfied);
        }

        let integration = if existing.is_some_and(|m| m.has_integration) {
            None
        } else {
            let function = retry_transient("get_function", retry, move || {
                self.plane.functions.get_function(&binding.function)
            })
            .await?
            .ok_or_else(move || AdminError::not_found("get_function", &binding.function))?;
            Some(Integration::Function {
                uri: arn::invocation_uri(&self.manifest.region, &function.arn),
                request_template: binding.request.template().to_string(),
            })
        };
        let response = IntegrationResponse {
            template: Some(RESPONSE_TEMPLATE.to_string()),
            headers: vec![(ALLOW_ORIGIN_HEADER.to_string(), "'*'".to_string())],
        };
        self.wire_method(target, existing, integration.as_ref(), &response)
            .await?;

        Ok(if existing.is_none() {
            Outcome::Created
        } else {
            Outcome::Updated
        })
    }

    async fn ensure_cors(&self, target: &MethodTarget, path: &str) -> AdminResult<Outcome> {
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;

        let existing = retry_transient("get_method", retry, move || routing.get_method(target)).await?;
        if existing.is_some_and(|m| m.is_complete()) {
            return Ok(Outcome::AlreadySatisfied);
        }

        let cors = self.manifest.cors_headers(path);
        let integration = Integration::Mock {
            request_template: CORS_MOCK_TEMPLATE.to_string(),
        };
        let response = IntegrationResponse {
            template: None,
            headers: cors
                .pairs()
                .into_iter()
                .map(|(name, value)| (name.to_string(), format!("'{value}'")))
                .collect(),
        };
        let integration = (!existing.is_some_and(|m| m.has_integration)).then_some(&integration);
        self.wire_method(target, existing, integration, &response)
            .await?;

        Ok(if existing.is_none() {
            Outcome::Created
        } else {
            Outcome::Updated
        })
    }

    /// Method, integration, method response, integration response, in the
    /// order the gateway requires. Parts `existing` already has are not
    /// rewritten; `integration` is `None` when it is already in place.
    async fn wire_method(
        &self,
        target: &MethodTarget,
        existing: Option<MethodInfo>,
        integration: Option<&Integration>,
        response: &IntegrationResponse,
    ) -> AdminResult<()> {
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;
        let header_names = response.header_names();
        let header_names = header_names.as_slice();
        let wired = existing.unwrap_or_default();

        if existing.is_none() {
            tolerate_existing(
                retry_transient("put_method", retry, move || routing.put_method(target, AUTHORIZATION_NONE)).await,
            )?;
        }
        if let Some(integration) = integration {
            retry_transient("put_integration", retry, move || routing.put_integration(target, integration)).await?;
        }
        if !wired.has_method_response {
            tolerate_existing(
                retry_transient("put_method_response", retry, move || {
                    routing.put_method_response(target, header_names)
                })
                .await,
            )?;
        }
        if !wired.has_integration_response {
            tolerate_existing(
                retry_transient("put_integration_response", retry, move || {
                    routing.put_integration_response(target, response)
                })
                .await,
            )?;
        }
        Ok(())
    }

    // ── Step 7: deployment ─────────────────────────────────────────

    async fn ensure_deployment(&self, api_id: &str, routing_changed: bool, report: &mut RunReport) {
        let step = Step::Deployment;
        let api = &self.manifest.api;
        let routing = &self.plane.routing;
        let retry = &self.settings.retry;

        let stage = match retry_transient("stage_state", retry, move || routing.stage_state(api_id, &api.stage)).await
        {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(stage = %api.stage, error = %e, "could not check stage, deploying");
                None
            }
        };

        match stage {
            Some(StageState::Current) if !routing_changed && !self.settings.always_redeploy => {
                info!(stage = %api.stage, "routes unchanged, stage is current");
                report.record(step, ResourceKind::Deployment, &api.stage, Outcome::AlreadySatisfied);
                return;
            }
            Some(StageState::Stale) => info!(stage = %api.stage, "stage serves an older snapshot"),
            _ => {}
        }

        let outcome = match retry_transient("create_deployment", retry, move || {
            routing.create_deployment(api_id, &api.stage, &api.description)
        })
        .await
        {
            Ok(deployment) => {
                info!(stage = %api.stage, %deployment, "deployment published");
                Outcome::Created
            }
            Err(e) => {
                error!(stage = %api.stage, error = %e, "deployment failed");
                Outcome::Failed(e.to_string())
            }
        };
        report.record(step, ResourceKind::Deployment, &api.stage, outcome);
    }

    fn skip_routing(&self, report: &mut RunReport, reason: &str) {
        for node in &self.manifest.routes {
            report.record(
                Step::Routes,
                ResourceKind::RouteNode,
                &node.path,
                Outcome::Skipped(reason.to_string()),
            );
        }
        for binding in &self.manifest.methods {
            report.record(
                Step::Methods,
                ResourceKind::Method,
                binding_name(binding),
                Outcome::Skipped(reason.to_string()),
            );
        }
        for node in &self.manifest.routes {
            if self.manifest.methods_at(&node.path).next().is_some() {
                report.record(
                    Step::Methods,
                    ResourceKind::Cors,
                    &node.path,
                    Outcome::Skipped(reason.to_string()),
                );
            }
        }
        report.record(
            Step::Deployment,
            ResourceKind::Deployment,
            &self.manifest.api.stage,
            Outcome::Skipped(reason.to_string()),
        );
    }
}

fn binding_name(binding: &MethodSpec) -> String {
    format!("{} {}", binding.method, binding.path)
}

fn tolerate_existing(result: AdminResult<()>) -> AdminResult<()> {
    match result {
        Err(e) if e.is_already_satisfied() => Ok(()),
        other => other,
    }
}

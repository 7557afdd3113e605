//! End-to-end provisioning runs against a scripted control plane.
//!
//! `ScriptedCloud` delegates to a `LocalCloud`, records every call with the
//! (paused) tokio clock, and can inject failures for chosen calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ads_core::manifest::{FunctionSpec, TableSpec};
use ads_core::{AdsConfig, HttpMethod, Manifest, RequestShape, TableStatus};
use ads_pack::{CodePayload, DescriptorPackager, PayloadSource};
use ads_provision::{
    AdminError, AdminResult, ApiInfo, ControlPlane, FunctionAdmin, FunctionInfo, IdentityAdmin,
    Integration, IntegrationResponse, InvokeGrant, LocalCloud, MethodInfo, MethodTarget, Outcome,
    ProvisionSettings, Provisioner, ResourceKind, RetryPolicy, RoleInfo, RoutingAdmin, RunReport,
    RunStatus, StageState, Step, TableAdmin, WaitPolicy,
};
use ads_state::{IntegrationRecord, StateStore};
use async_trait::async_trait;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Call {
    op: &'static str,
    subject: String,
    at: Instant,
}

struct Injected {
    op: &'static str,
    subject: String,
    error: AdminError,
    remaining: usize,
}

struct ScriptedCloud {
    inner: LocalCloud,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<Vec<Injected>>,
}

impl ScriptedCloud {
    fn new(inner: LocalCloud) -> Arc<Self> {
        Arc::new(Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        })
    }

    /// Fail the next `times` calls of `op` on `subject`.
    fn fail(&self, op: &'static str, subject: &str, error: AdminError, times: usize) {
        self.failures.lock().unwrap().push(Injected {
            op,
            subject: subject.to_string(),
            error,
            remaining: times,
        });
    }

    fn enter(&self, op: &'static str, subject: &str) -> AdminResult<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            subject: subject.to_string(),
            at: Instant::now(),
        });
        let mut failures = self.failures.lock().unwrap();
        if let Some(f) = failures
            .iter_mut()
            .find(|f| f.op == op && f.subject == subject && f.remaining > 0)
        {
            f.remaining -= 1;
            return Err(f.error.clone());
        }
        Ok(())
    }

    fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that would create or mutate a resource.
    fn mutating_calls(&self) -> Vec<Call> {
        const MUTATING: &[&str] = &[
            "create_table",
            "create_role",
            "attach_policy",
            "create_function",
            "update_function_code",
            "grant_invoke",
            "create_api",
            "create_child_node",
            "put_method",
            "put_integration",
            "put_method_response",
            "put_integration_response",
            "create_deployment",
        ];
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| MUTATING.contains(&c.op))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TableAdmin for ScriptedCloud {
    async fn create_table(&self, spec: &TableSpec) -> AdminResult<()> {
        self.enter("create_table", &spec.name)?;
        self.inner.create_table(spec).await
    }

    async fn table_status(&self, name: &str) -> AdminResult<Option<TableStatus>> {
        self.enter("table_status", name)?;
        self.inner.table_status(name).await
    }
}

#[async_trait]
impl IdentityAdmin for ScriptedCloud {
    async fn get_role(&self, name: &str) -> AdminResult<Option<RoleInfo>> {
        self.enter("get_role", name)?;
        self.inner.get_role(name).await
    }

    async fn create_role(&self, name: &str, trust_policy: &str) -> AdminResult<RoleInfo> {
        self.enter("create_role", name)?;
        self.inner.create_role(name, trust_policy).await
    }

    async fn attached_policies(&self, role: &str) -> AdminResult<Vec<String>> {
        self.enter("attached_policies", role)?;
        self.inner.attached_policies(role).await
    }

    async fn attach_policy(&self, role: &str, policy: &str) -> AdminResult<()> {
        self.enter("attach_policy", policy)?;
        self.inner.attach_policy(role, policy).await
    }
}

#[async_trait]
impl FunctionAdmin for ScriptedCloud {
    async fn get_function(&self, name: &str) -> AdminResult<Option<FunctionInfo>> {
        self.enter("get_function", name)?;
        self.inner.get_function(name).await
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodePayload,
        role_arn: &str,
    ) -> AdminResult<FunctionInfo> {
        self.enter("create_function", &spec.name)?;
        self.inner.create_function(spec, code, role_arn).await
    }

    async fn update_function_code(&self, name: &str, code: &CodePayload) -> AdminResult<FunctionInfo> {
        self.enter("update_function_code", name)?;
        self.inner.update_function_code(name, code).await
    }

    async fn invoke_grant(&self, function: &str, statement_id: &str) -> AdminResult<Option<InvokeGrant>> {
        self.enter("invoke_grant", function)?;
        self.inner.invoke_grant(function, statement_id).await
    }

    async fn grant_invoke(&self, function: &str, grant: &InvokeGrant) -> AdminResult<()> {
        self.enter("grant_invoke", function)?;
        self.inner.grant_invoke(function, grant).await
    }
}

#[async_trait]
impl RoutingAdmin for ScriptedCloud {
    async fn find_api(&self, name: &str) -> AdminResult<Option<ApiInfo>> {
        self.enter("find_api", name)?;
        self.inner.find_api(name).await
    }

    async fn create_api(&self, name: &str, description: &str) -> AdminResult<ApiInfo> {
        self.enter("create_api", name)?;
        self.inner.create_api(name, description).await
    }

    async fn root_node(&self, api_id: &str) -> AdminResult<String> {
        self.enter("root_node", api_id)?;
        self.inner.root_node(api_id).await
    }

    async fn find_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<Option<String>> {
        self.enter("find_child_node", segment)?;
        self.inner.find_child_node(api_id, parent_id, segment).await
    }

    async fn create_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<String> {
        self.enter("create_child_node", segment)?;
        self.inner.create_child_node(api_id, parent_id, segment).await
    }

    async fn get_method(&self, target: &MethodTarget) -> AdminResult<Option<MethodInfo>> {
        self.enter("get_method", target.method.as_str())?;
        self.inner.get_method(target).await
    }

    async fn put_method(&self, target: &MethodTarget, authorization: &str) -> AdminResult<()> {
        self.enter("put_method", target.method.as_str())?;
        self.inner.put_method(target, authorization).await
    }

    async fn put_integration(&self, target: &MethodTarget, integration: &Integration) -> AdminResult<()> {
        self.enter("put_integration", target.method.as_str())?;
        self.inner.put_integration(target, integration).await
    }

    async fn put_method_response(&self, target: &MethodTarget, header_names: &[String]) -> AdminResult<()> {
        self.enter("put_method_response", target.method.as_str())?;
        self.inner.put_method_response(target, header_names).await
    }

    async fn put_integration_response(
        &self,
        target: &MethodTarget,
        response: &IntegrationResponse,
    ) -> AdminResult<()> {
        self.enter("put_integration_response", target.method.as_str())?;
        self.inner.put_integration_response(target, response).await
    }

    async fn stage_state(&self, api_id: &str, stage: &str) -> AdminResult<StageState> {
        self.enter("stage_state", stage)?;
        self.inner.stage_state(api_id, stage).await
    }

    async fn create_deployment(&self, api_id: &str, stage: &str, description: &str) -> AdminResult<String> {
        self.enter("create_deployment", stage)?;
        self.inner.create_deployment(api_id, stage, description).await
    }
}

/// Payloads whose digest changes with `version`.
struct VersionedPayloads {
    version: u32,
}

impl PayloadSource for VersionedPayloads {
    fn package(&self, function: &FunctionSpec) -> anyhow::Result<CodePayload> {
        Ok(CodePayload::from_bytes(
            format!("{}@{}", function.name, self.version).into_bytes(),
        ))
    }
}

const PROPAGATION: Duration = Duration::from_secs(30);

fn settings() -> ProvisionSettings {
    ProvisionSettings {
        propagation_delay: PROPAGATION,
        table_wait: WaitPolicy {
            timeout: Duration::from_secs(10),
            interval: Duration::from_secs(1),
        },
        retry: RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(100),
        },
        always_redeploy: false,
    }
}

fn manifest() -> Manifest {
    Manifest::classifieds(&AdsConfig::minimal("classifieds-test"))
}

fn local_cloud() -> LocalCloud {
    LocalCloud::new(StateStore::open_in_memory().unwrap(), "eu-west-1")
}

fn provisioner(cloud: &Arc<ScriptedCloud>, payloads: Arc<dyn PayloadSource>) -> Provisioner {
    Provisioner::new(ControlPlane::unified(cloud.clone()), payloads, manifest(), settings())
}

async fn run(cloud: &Arc<ScriptedCloud>) -> RunReport {
    provisioner(cloud, Arc::new(DescriptorPackager)).run().await
}

// ── Idempotence ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn first_run_creates_every_resource_once() {
    let cloud = ScriptedCloud::new(local_cloud());
    let report = run(&cloud).await;

    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    assert_eq!(report.created(ResourceKind::Table), 2);
    assert_eq!(report.created(ResourceKind::Role), 1);
    assert_eq!(report.created(ResourceKind::Policy), 3);
    assert_eq!(report.created(ResourceKind::Function), 5);
    assert_eq!(report.created(ResourceKind::Permission), 5);
    assert_eq!(report.created(ResourceKind::Api), 1);
    assert_eq!(report.created(ResourceKind::RouteNode), 3);
    assert_eq!(report.created(ResourceKind::Method), 5);
    assert_eq!(report.created(ResourceKind::Cors), 3);
    assert_eq!(report.created(ResourceKind::Deployment), 1);

    let store = cloud.inner.store();
    assert_eq!(store.list_tables().unwrap().len(), 2);
    assert_eq!(store.list_roles().unwrap()[0].attached_policies.len(), 3);
    assert_eq!(store.list_functions().unwrap().len(), 5);
    let api_id = report.api_id.clone().unwrap();
    assert_eq!(store.list_route_nodes(&api_id).unwrap().len(), 4);
    assert_eq!(store.list_methods(&api_id).unwrap().len(), 8);
    assert_eq!(store.list_deployments(&api_id).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_run_creates_nothing() {
    let cloud = ScriptedCloud::new(local_cloud());
    run(&cloud).await;
    cloud.clear_calls();

    let report = run(&cloud).await;
    assert_eq!(report.status(), RunStatus::FullyDeployed);
    assert_eq!(report.changes(), 0, "{report}");
    assert!(
        report
            .items
            .iter()
            .all(|i| i.outcome == Outcome::AlreadySatisfied),
        "{report}"
    );
    assert!(cloud.mutating_calls().is_empty(), "{:?}", cloud.mutating_calls());

    let store = cloud.inner.store();
    assert_eq!(store.list_apis().unwrap().len(), 1);
    assert_eq!(store.list_functions().unwrap().len(), 5);
    let api_id = report.api_id.unwrap();
    assert_eq!(store.list_route_nodes(&api_id).unwrap().len(), 4);
    assert_eq!(store.list_deployments(&api_id).unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stage_behind_its_bindings_is_redeployed() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_function",
        "getAd",
        AdminError::invalid("create_function", "bad handler"),
        1,
    );
    run(&cloud).await;

    // The missing binding is created, but publishing it fails.
    cloud.fail(
        "create_deployment",
        "prod",
        AdminError::backend("create_deployment", "boom"),
        1,
    );
    let report = run(&cloud).await;
    assert_eq!(
        report.outcome_of(ResourceKind::Method, "GET /listings/{id}"),
        Some(&Outcome::Created)
    );
    assert!(report.outcome_of(ResourceKind::Deployment, "prod").unwrap().is_failure());
    cloud.clear_calls();

    let report = run(&cloud).await;
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    assert_eq!(report.outcome_of(ResourceKind::Deployment, "prod"), Some(&Outcome::Created));
    assert_eq!(cloud.calls_to("create_deployment").len(), 1);

    let api_id = report.api_id.unwrap();
    let store = cloud.inner.store();
    let stage = store.get_stage(&api_id, "prod").unwrap().unwrap();
    let deployment = store
        .get_deployment(&api_id, &stage.deployment_id)
        .unwrap()
        .unwrap();
    assert!(
        deployment
            .routes
            .iter()
            .any(|r| r.path == "/listings/{id}" && r.method == HttpMethod::Get)
    );

    // Once published, the stage is current again.
    let report = run(&cloud).await;
    assert_eq!(report.changes(), 0, "{report}");
}

#[tokio::test(start_paused = true)]
async fn always_redeploy_publishes_on_every_run() {
    let cloud = ScriptedCloud::new(local_cloud());
    run(&cloud).await;

    let settings = ProvisionSettings {
        always_redeploy: true,
        ..settings()
    };
    let report = Provisioner::new(
        ControlPlane::unified(cloud.clone()),
        Arc::new(DescriptorPackager),
        manifest(),
        settings,
    )
    .run()
    .await;
    assert_eq!(report.created(ResourceKind::Deployment), 1);
    assert_eq!(report.changes(), 1);
}

#[tokio::test(start_paused = true)]
async fn changed_code_is_updated_in_place() {
    let cloud = ScriptedCloud::new(local_cloud());
    provisioner(&cloud, Arc::new(VersionedPayloads { version: 1 }))
        .run()
        .await;
    cloud.clear_calls();

    let report = provisioner(&cloud, Arc::new(VersionedPayloads { version: 2 }))
        .run()
        .await;
    assert_eq!(report.count(ResourceKind::Function, |o| *o == Outcome::Updated), 5);
    assert!(cloud.calls_to("create_function").is_empty());
    assert_eq!(cloud.calls_to("update_function_code").len(), 5);
    assert_eq!(
        cloud.inner.store().get_function("getAd").unwrap().unwrap().revision,
        2
    );
}

// ── Ordering ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn functions_wait_for_role_propagation() {
    let cloud = ScriptedCloud::new(local_cloud());
    run(&cloud).await;

    let role_created = cloud.calls_to("create_role")[0].at;
    let first_function = cloud.calls_to("create_function")[0].at;
    assert!(
        first_function >= role_created + PROPAGATION,
        "function created {:?} after role",
        first_function - role_created
    );
}

#[tokio::test(start_paused = true)]
async fn existing_role_skips_propagation_wait() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud
        .inner
        .create_role("ClassifiedsLambdaRole", "{}")
        .await
        .unwrap();

    let started = Instant::now();
    run(&cloud).await;
    assert!(cloud.calls_to("create_role").is_empty());
    assert!(cloud.calls_to("create_function")[0].at < started + PROPAGATION);
}

#[tokio::test(start_paused = true)]
async fn tables_are_active_before_role_step() {
    let cloud = ScriptedCloud::new(local_cloud());
    run(&cloud).await;

    let calls = cloud.calls.lock().unwrap().clone();
    let role_step = calls.iter().position(|c| c.op == "get_role").unwrap();
    let last_status = calls.iter().rposition(|c| c.op == "table_status").unwrap();
    assert!(last_status < role_step);
    for table in ["Listings", "Comments"] {
        assert!(
            cloud
                .inner
                .store()
                .get_table(table)
                .unwrap()
                .unwrap()
                .status
                .is_active()
        );
    }
}

// ── Error policy ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn table_readiness_timeout_aborts_run() {
    let cloud = ScriptedCloud::new(local_cloud().with_activation_polls(u32::MAX));
    let report = run(&cloud).await;

    assert!(matches!(
        report.status(),
        RunStatus::Aborted {
            step: Step::Tables,
            ..
        }
    ));
    assert_eq!(report.exit_code(false), 1);
    assert!(cloud.calls_to("get_role").is_empty());
    assert!(cloud.calls_to("create_function").is_empty());
}

#[tokio::test(start_paused = true)]
async fn table_creation_failure_aborts_run() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_table",
        "Comments",
        AdminError::AccessDenied {
            op: "create_table",
            message: "no dynamodb:CreateTable".into(),
        },
        1,
    );
    let report = run(&cloud).await;

    let RunStatus::Aborted { step, error } = report.status() else {
        panic!("expected abort, got {report}");
    };
    assert_eq!(step, Step::Tables);
    assert!(error.contains("access denied"));
    assert!(cloud.calls_to("create_role").is_empty());
}

#[tokio::test(start_paused = true)]
async fn role_failure_aborts_before_functions() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_role",
        "ClassifiedsLambdaRole",
        AdminError::backend("create_role", "boom"),
        1,
    );
    let report = run(&cloud).await;

    assert!(matches!(report.status(), RunStatus::Aborted { step: Step::Role, .. }));
    assert!(report.to_string().contains("aborted at step 2/7 role"));
    assert!(cloud.calls_to("attach_policy").is_empty());
    assert!(cloud.calls_to("create_function").is_empty());
}

#[tokio::test(start_paused = true)]
async fn single_function_failure_is_isolated() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_function",
        "getAd",
        AdminError::invalid("create_function", "bad handler"),
        1,
    );
    let report = run(&cloud).await;

    assert_eq!(report.created(ResourceKind::Function), 4);
    assert!(report.outcome_of(ResourceKind::Function, "getAd").unwrap().is_failure());
    assert!(matches!(
        report.outcome_of(ResourceKind::Permission, "getAd"),
        Some(Outcome::Skipped(_))
    ));
    assert_eq!(report.created(ResourceKind::Method), 4);
    assert!(
        report
            .outcome_of(ResourceKind::Method, "GET /listings/{id}")
            .unwrap()
            .is_failure()
    );
    assert_eq!(report.created(ResourceKind::Cors), 3);
    assert_eq!(report.created(ResourceKind::Deployment), 1);
    assert_eq!(report.status(), RunStatus::Partial { failed: 2, skipped: 1 });
    assert_eq!(report.exit_code(false), 0);
    assert_eq!(report.exit_code(true), 2);

    // The next run picks up where this one left off.
    let report = run(&cloud).await;
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    assert_eq!(report.outcome_of(ResourceKind::Function, "getAd"), Some(&Outcome::Created));
    assert_eq!(
        report.outcome_of(ResourceKind::Method, "GET /listings/{id}"),
        Some(&Outcome::Created)
    );
    assert_eq!(report.created(ResourceKind::Deployment), 1);
}

#[tokio::test(start_paused = true)]
async fn policy_failures_do_not_block_other_policies() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "attach_policy",
        ads_core::manifest::TABLE_READ_POLICY,
        AdminError::AccessDenied {
            op: "attach_policy",
            message: "denied".into(),
        },
        1,
    );
    let report = run(&cloud).await;

    assert_eq!(report.created(ResourceKind::Policy), 2);
    assert_eq!(report.count(ResourceKind::Policy, Outcome::is_failure), 1);
    assert_eq!(report.created(ResourceKind::Function), 5);
    assert_eq!(report.status(), RunStatus::Partial { failed: 1, skipped: 0 });
}

#[tokio::test(start_paused = true)]
async fn unlisted_policies_are_reported_failed() {
    let cloud = ScriptedCloud::new(local_cloud());
    let role = manifest().role.name;
    cloud.fail(
        "attached_policies",
        &role,
        AdminError::AccessDenied {
            op: "attached_policies",
            message: "denied".into(),
        },
        1,
    );
    let report = run(&cloud).await;

    assert_eq!(report.created(ResourceKind::Policy), 0, "{report}");
    assert_eq!(report.count(ResourceKind::Policy, Outcome::is_failure), 3);
    assert!(cloud.calls_to("attach_policy").is_empty());
    assert_eq!(report.created(ResourceKind::Function), 5);
    assert_eq!(report.status(), RunStatus::Partial { failed: 3, skipped: 0 });

    let report = run(&cloud).await;
    assert_eq!(report.created(ResourceKind::Policy), 3);
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
}

#[tokio::test(start_paused = true)]
async fn transient_function_errors_are_retried() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_function",
        "listAds",
        AdminError::not_ready("create_function", "role cannot be assumed yet"),
        2,
    );
    let report = run(&cloud).await;

    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    let attempts = cloud
        .calls_to("create_function")
        .into_iter()
        .filter(|c| c.subject == "listAds")
        .count();
    assert_eq!(attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn api_failure_skips_routing() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail("create_api", "ClassifiedsAPI", AdminError::backend("create_api", "boom"), 1);
    let report = run(&cloud).await;

    assert!(report.outcome_of(ResourceKind::Api, "ClassifiedsAPI").unwrap().is_failure());
    assert_eq!(report.count(ResourceKind::RouteNode, |o| matches!(o, Outcome::Skipped(_))), 3);
    assert_eq!(report.count(ResourceKind::Method, |o| matches!(o, Outcome::Skipped(_))), 5);
    assert!(matches!(
        report.outcome_of(ResourceKind::Deployment, "prod"),
        Some(Outcome::Skipped(_))
    ));
    assert_eq!(report.created(ResourceKind::Function), 5);
    assert!(cloud.calls_to("create_deployment").is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_node_skips_its_subtree() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "create_child_node",
        "{id}",
        AdminError::backend("create_child_node", "boom"),
        1,
    );
    let report = run(&cloud).await;

    assert!(report.outcome_of(ResourceKind::RouteNode, "/listings/{id}").unwrap().is_failure());
    assert!(matches!(
        report.outcome_of(ResourceKind::RouteNode, "/listings/{id}/comments"),
        Some(Outcome::Skipped(_))
    ));
    assert_eq!(report.created(ResourceKind::Method), 2);
    assert_eq!(report.created(ResourceKind::Cors), 1);
}

// ── Method bindings ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn existing_binding_is_not_overwritten() {
    let cloud = ScriptedCloud::new(local_cloud());
    let report = run(&cloud).await;
    let api_id = report.api_id.unwrap();
    let store = cloud.inner.store();

    let mut tuned = store
        .list_methods(&api_id)
        .unwrap()
        .into_iter()
        .find(|m| m.method == HttpMethod::Post)
        .unwrap();
    let hand_tuned = IntegrationRecord::Function {
        uri: match &tuned.integration {
            Some(IntegrationRecord::Function { uri, .. }) => uri.clone(),
            other => panic!("unexpected integration {other:?}"),
        },
        request_template: r#"{ "body": $input.json("$.data") }"#.to_string(),
    };
    tuned.integration = Some(hand_tuned.clone());
    tuned.response_template = Some("$input.json('$')".to_string());
    store.put_method(&tuned).unwrap();

    let report = run(&cloud).await;
    assert_eq!(report.changes(), 0, "{report}");

    let after = store
        .get_method(&api_id, &tuned.node_id, HttpMethod::Post)
        .unwrap()
        .unwrap();
    assert_eq!(after.integration, Some(hand_tuned));
    assert_eq!(after.response_template.as_deref(), Some("$input.json('$')"));
}

#[tokio::test(start_paused = true)]
async fn interrupted_binding_is_completed() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "put_integration",
        "GET",
        AdminError::backend("put_integration", "connection reset"),
        1,
    );
    let report = run(&cloud).await;
    assert_eq!(report.count(ResourceKind::Method, Outcome::is_failure), 1);

    let report = run(&cloud).await;
    assert_eq!(report.count(ResourceKind::Method, |o| *o == Outcome::Updated), 1);
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    assert_eq!(report.created(ResourceKind::Deployment), 1);
}

#[tokio::test(start_paused = true)]
async fn binding_missing_its_responses_is_finished() {
    let cloud = ScriptedCloud::new(local_cloud());
    cloud.fail(
        "put_integration_response",
        "POST",
        AdminError::backend("put_integration_response", "connection reset"),
        2,
    );
    let report = run(&cloud).await;
    assert_eq!(report.count(ResourceKind::Method, Outcome::is_failure), 2, "{report}");
    cloud.clear_calls();

    let report = run(&cloud).await;
    assert_eq!(report.status(), RunStatus::FullyDeployed, "{report}");
    assert_eq!(report.count(ResourceKind::Method, |o| *o == Outcome::Updated), 2);
    assert!(cloud.calls_to("put_method").is_empty());
    assert!(cloud.calls_to("put_integration").is_empty());
    assert!(cloud.calls_to("put_method_response").is_empty());
    assert_eq!(cloud.calls_to("put_integration_response").len(), 2);
    assert_eq!(report.created(ResourceKind::Deployment), 1);

    let api_id = report.api_id.unwrap();
    for method in cloud
        .inner
        .store()
        .list_methods(&api_id)
        .unwrap()
        .into_iter()
        .filter(|m| m.method == HttpMethod::Post)
    {
        assert_eq!(method.response_template.as_deref(), Some(ads_core::RESPONSE_TEMPLATE));
        assert_eq!(method.response_header_values["Access-Control-Allow-Origin"], "*");
    }
}

#[tokio::test(start_paused = true)]
async fn bindings_carry_request_templates_and_cors_headers() {
    let cloud = ScriptedCloud::new(local_cloud());
    let report = run(&cloud).await;
    let api_id = report.api_id.unwrap();
    let store = cloud.inner.store();
    let stage = store.get_stage(&api_id, "prod").unwrap().unwrap();
    let deployment = store
        .get_deployment(&api_id, &stage.deployment_id)
        .unwrap()
        .unwrap();

    let create_comment = deployment
        .routes
        .iter()
        .find(|r| r.path == "/listings/{id}/comments" && r.method == HttpMethod::Post)
        .unwrap();
    match &create_comment.integration {
        Some(IntegrationRecord::Function {
            uri,
            request_template,
        }) => {
            assert!(uri.ends_with("function:createComment/invocations"));
            assert_eq!(request_template, RequestShape::PathIdAndBody.template());
        }
        other => panic!("unexpected integration {other:?}"),
    }

    let preflight = deployment
        .routes
        .iter()
        .find(|r| r.path == "/listings" && r.method == HttpMethod::Options)
        .unwrap();
    assert!(matches!(preflight.integration, Some(IntegrationRecord::Mock { .. })));
    assert_eq!(
        preflight.response_headers["Access-Control-Allow-Methods"],
        "GET,POST,OPTIONS"
    );
}

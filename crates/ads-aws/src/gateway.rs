//! API Gateway REST APIs: route tree, method bindings, deployments.
//!
//! Every API Gateway operation reports the same small set of error codes,
//! so failures are classified by code rather than per-operation variant.

use std::collections::{BTreeSet, HashMap};

use ads_provision::{
    AdminResult, ApiInfo, Integration, IntegrationResponse, MethodInfo, MethodTarget, RoutingAdmin,
    StageState,
};
use async_trait::async_trait;
use aws_sdk_apigateway::error::ProvideErrorMetadata;
use aws_sdk_apigateway::types::{
    EndpointConfiguration, EndpointType, IntegrationType, MethodSnapshot, Resource,
};
use tracing::debug;

use crate::AwsCloud;
use crate::error::{Kind, classify, missing};

const PAGE_SIZE: i32 = 500;
const JSON: &str = "application/json";
const OK_STATUS: &str = "200";
const FUNCTION_INVOKE_VERB: &str = "POST";

fn gateway_kind(code: Option<&str>) -> Option<Kind> {
    match code? {
        "ConflictException" => Some(Kind::AlreadyExists),
        "NotFoundException" => Some(Kind::NotFound),
        "TooManyRequestsException" | "LimitExceededException" => Some(Kind::Throttled),
        "UnauthorizedException" => Some(Kind::AccessDenied),
        "BadRequestException" => Some(Kind::Invalid),
        _ => None,
    }
}

fn header_parameter(name: &str) -> String {
    format!("method.response.header.{name}")
}

/// (path, verb) pairs with a wired integration.
fn wired_routes(resources: &[Resource]) -> BTreeSet<(String, String)> {
    resources
        .iter()
        .filter_map(|r| Some((r.path()?, r.resource_methods()?)))
        .flat_map(|(path, methods)| {
            methods
                .iter()
                .filter(|(_, m)| m.method_integration().is_some())
                .map(move |(verb, _)| (path.to_string(), verb.clone()))
        })
        .collect()
}

/// (path, verb) pairs frozen into a deployment's API summary.
fn published_routes(summary: &HashMap<String, HashMap<String, MethodSnapshot>>) -> BTreeSet<(String, String)> {
    summary
        .iter()
        .flat_map(|(path, methods)| methods.keys().map(move |verb| (path.clone(), verb.clone())))
        .collect()
}

impl AwsCloud {
    /// Every resource (route node) of an API, optionally with its methods.
    async fn resources(&self, api_id: &str, with_methods: bool) -> AdminResult<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut position = None;
        loop {
            let out = self
                .gateway
                .get_resources()
                .rest_api_id(api_id)
                .limit(PAGE_SIZE)
                .set_embed(with_methods.then(|| vec!["methods".to_string()]))
                .set_position(position.take())
                .send()
                .await
                .map_err(|e| classify("get_resources", e, |e| gateway_kind(e.code())))?;
            resources.extend(out.items().iter().cloned());
            match out.position() {
                Some(next) => position = Some(next.to_string()),
                None => return Ok(resources),
            }
        }
    }
}

#[async_trait]
impl RoutingAdmin for AwsCloud {
    async fn find_api(&self, name: &str) -> AdminResult<Option<ApiInfo>> {
        const OP: &str = "get_rest_apis";
        let mut position = None;
        loop {
            let out = self
                .gateway
                .get_rest_apis()
                .limit(PAGE_SIZE)
                .set_position(position.take())
                .send()
                .await
                .map_err(|e| classify(OP, e, |e| gateway_kind(e.code())))?;
            if let Some(api) = out.items().iter().find(|api| api.name() == Some(name)) {
                let id = api.id().ok_or_else(|| missing(OP, "id"))?;
                return Ok(Some(ApiInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                }));
            }
            match out.position() {
                Some(next) => position = Some(next.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn create_api(&self, name: &str, description: &str) -> AdminResult<ApiInfo> {
        const OP: &str = "create_rest_api";
        let out = self
            .gateway
            .create_rest_api()
            .name(name)
            .description(description)
            .endpoint_configuration(EndpointConfiguration::builder().types(EndpointType::Regional).build())
            .send()
            .await
            .map_err(|e| classify(OP, e, |e| gateway_kind(e.code())))?;
        let id = out.id().ok_or_else(|| missing(OP, "id"))?;
        debug!(api = %name, %id, "rest api created");
        Ok(ApiInfo {
            id: id.to_string(),
            name: name.to_string(),
        })
    }

    async fn root_node(&self, api_id: &str) -> AdminResult<String> {
        self.resources(api_id, false)
            .await?
            .iter()
            .find(|r| r.path() == Some("/"))
            .and_then(|r| r.id())
            .map(str::to_string)
            .ok_or_else(|| missing("get_resources", "the root resource"))
    }

    async fn find_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<Option<String>> {
        Ok(self
            .resources(api_id, false)
            .await?
            .iter()
            .find(|r| r.parent_id() == Some(parent_id) && r.path_part() == Some(segment))
            .and_then(|r| r.id())
            .map(str::to_string))
    }

    async fn create_child_node(&self, api_id: &str, parent_id: &str, segment: &str) -> AdminResult<String> {
        const OP: &str = "create_resource";
        let out = self
            .gateway
            .create_resource()
            .rest_api_id(api_id)
            .parent_id(parent_id)
            .path_part(segment)
            .send()
            .await
            .map_err(|e| classify(OP, e, |e| gateway_kind(e.code())))?;
        let id = out.id().ok_or_else(|| missing(OP, "id"))?;
        debug!(%segment, %id, "resource created");
        Ok(id.to_string())
    }

    async fn get_method(&self, target: &MethodTarget) -> AdminResult<Option<MethodInfo>> {
        let result = self
            .gateway
            .get_method()
            .rest_api_id(&target.api_id)
            .resource_id(&target.node_id)
            .http_method(target.method.as_str())
            .send()
            .await;
        match result {
            Ok(out) => Ok(Some(MethodInfo {
                has_integration: out.method_integration().is_some(),
                has_method_response: out.method_responses().is_some_and(|r| r.contains_key(OK_STATUS)),
                has_integration_response: out
                    .method_integration()
                    .and_then(|i| i.integration_responses())
                    .is_some_and(|r| r.contains_key(OK_STATUS)),
            })),
            Err(e) if e.as_service_error().and_then(|e| e.code()) == Some("NotFoundException") => Ok(None),
            Err(e) => Err(classify("get_method", e, |e| gateway_kind(e.code()))),
        }
    }

    async fn put_method(&self, target: &MethodTarget, authorization: &str) -> AdminResult<()> {
        self.gateway
            .put_method()
            .rest_api_id(&target.api_id)
            .resource_id(&target.node_id)
            .http_method(target.method.as_str())
            .authorization_type(authorization)
            .send()
            .await
            .map_err(|e| classify("put_method", e, |e| gateway_kind(e.code())))?;
        Ok(())
    }

    async fn put_integration(&self, target: &MethodTarget, integration: &Integration) -> AdminResult<()> {
        let request = self
            .gateway
            .put_integration()
            .rest_api_id(&target.api_id)
            .resource_id(&target.node_id)
            .http_method(target.method.as_str());
        let request = match integration {
            Integration::Function { uri, request_template } => request
                .r#type(IntegrationType::Aws)
                .integration_http_method(FUNCTION_INVOKE_VERB)
                .uri(uri)
                .request_templates(JSON, request_template),
            Integration::Mock { request_template } => request
                .r#type(IntegrationType::Mock)
                .request_templates(JSON, request_template),
        };
        request
            .send()
            .await
            .map_err(|e| classify("put_integration", e, |e| gateway_kind(e.code())))?;
        Ok(())
    }

    async fn put_method_response(&self, target: &MethodTarget, header_names: &[String]) -> AdminResult<()> {
        let mut request = self
            .gateway
            .put_method_response()
            .rest_api_id(&target.api_id)
            .resource_id(&target.node_id)
            .http_method(target.method.as_str())
            .status_code(OK_STATUS)
            .response_models(JSON, "Empty");
        for name in header_names {
            request = request.response_parameters(header_parameter(name), false);
        }
        request
            .send()
            .await
            .map_err(|e| classify("put_method_response", e, |e| gateway_kind(e.code())))?;
        Ok(())
    }

    async fn put_integration_response(
        &self,
        target: &MethodTarget,
        response: &IntegrationResponse,
    ) -> AdminResult<()> {
        let mut request = self
            .gateway
            .put_integration_response()
            .rest_api_id(&target.api_id)
            .resource_id(&target.node_id)
            .http_method(target.method.as_str())
            .status_code(OK_STATUS);
        if let Some(template) = &response.template {
            request = request.response_templates(JSON, template);
        }
        for (name, value) in &response.headers {
            request = request.response_parameters(header_parameter(name), value);
        }
        request
            .send()
            .await
            .map_err(|e| classify("put_integration_response", e, |e| gateway_kind(e.code())))?;
        Ok(())
    }

    async fn stage_state(&self, api_id: &str, stage: &str) -> AdminResult<StageState> {
        let deployment_id = match self.gateway.get_stage().rest_api_id(api_id).stage_name(stage).send().await {
            Ok(out) => out.deployment_id().map(str::to_string),
            Err(e) if e.as_service_error().and_then(|e| e.code()) == Some("NotFoundException") => {
                return Ok(StageState::Missing);
            }
            Err(e) => return Err(classify("get_stage", e, |e| gateway_kind(e.code()))),
        };
        let Some(deployment_id) = deployment_id else {
            return Ok(StageState::Stale);
        };

        let deployment = self
            .gateway
            .get_deployment()
            .rest_api_id(api_id)
            .deployment_id(&deployment_id)
            .embed("apisummary")
            .send()
            .await
            .map_err(|e| classify("get_deployment", e, |e| gateway_kind(e.code())))?;
        let published = deployment.api_summary().map(published_routes).unwrap_or_default();
        let current = wired_routes(&self.resources(api_id, true).await?);
        debug!(
            %stage,
            deployment = %deployment_id,
            published = published.len(),
            current = current.len(),
            "stage compared"
        );
        if published == current {
            Ok(StageState::Current)
        } else {
            Ok(StageState::Stale)
        }
    }

    async fn create_deployment(&self, api_id: &str, stage: &str, description: &str) -> AdminResult<String> {
        const OP: &str = "create_deployment";
        let out = self
            .gateway
            .create_deployment()
            .rest_api_id(api_id)
            .stage_name(stage)
            .description(description)
            .send()
            .await
            .map_err(|e| classify(OP, e, |e| gateway_kind(e.code())))?;
        let id = out.id().ok_or_else(|| missing(OP, "id"))?;
        debug!(%stage, deployment = %id, "deployment created");
        Ok(id.to_string())
    }
}

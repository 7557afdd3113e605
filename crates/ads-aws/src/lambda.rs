//! Lambda: function units and their invoke permissions.

use ads_core::manifest::FunctionSpec;
use ads_pack::CodePayload;
use ads_provision::{AdminError, AdminResult, FunctionAdmin, FunctionInfo, InvokeGrant};
use async_trait::async_trait;
use aws_sdk_lambda::operation::add_permission::AddPermissionError;
use aws_sdk_lambda::operation::create_function::CreateFunctionError;
use aws_sdk_lambda::operation::get_function::GetFunctionError;
use aws_sdk_lambda::operation::get_policy::GetPolicyError;
use aws_sdk_lambda::operation::update_function_code::UpdateFunctionCodeError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::AwsCloud;
use crate::error::{Kind, build_error, classify, missing};

const INVOKE_ACTION: &str = "lambda:InvokeFunction";

/// Lambda reports `CodeSha256` as base64; the provisioner compares hex.
fn digest_hex(op: &'static str, encoded: &str) -> AdminResult<String> {
    STANDARD
        .decode(encoded)
        .map(hex::encode)
        .map_err(|e| AdminError::backend(op, format!("undecodable CodeSha256 {encoded:?}: {e}")))
}

fn function_info(
    op: &'static str,
    name: &str,
    arn: Option<&str>,
    code_sha256: Option<&str>,
) -> AdminResult<FunctionInfo> {
    Ok(FunctionInfo {
        name: name.to_string(),
        arn: arn.ok_or_else(|| missing(op, "FunctionArn"))?.to_string(),
        code_sha256: match code_sha256 {
            Some(encoded) => digest_hex(op, encoded)?,
            None => String::new(),
        },
    })
}

/// Find the statement `statement_id` in a resource policy document.
fn find_statement(policy: &str, statement_id: &str) -> Result<Option<InvokeGrant>, serde_json::Error> {
    let doc: Value = serde_json::from_str(policy)?;
    let Some(statements) = doc.get("Statement").and_then(Value::as_array) else {
        return Ok(None);
    };
    let Some(statement) = statements
        .iter()
        .find(|s| s.get("Sid").and_then(Value::as_str) == Some(statement_id))
    else {
        return Ok(None);
    };

    let principal = match statement.get("Principal") {
        Some(Value::String(p)) => p.clone(),
        Some(p) => p.get("Service").and_then(Value::as_str).unwrap_or_default().to_string(),
        None => String::new(),
    };
    let source_arn = statement
        .pointer("/Condition/ArnLike/AWS:SourceArn")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Some(InvokeGrant {
        statement_id: statement_id.to_string(),
        principal,
        source_arn,
    }))
}

#[async_trait]
impl FunctionAdmin for AwsCloud {
    async fn get_function(&self, name: &str) -> AdminResult<Option<FunctionInfo>> {
        const OP: &str = "get_function";
        match self.lambda.get_function().function_name(name).send().await {
            Ok(out) => {
                let config = out.configuration().ok_or_else(|| missing(OP, "Configuration"))?;
                function_info(OP, name, config.function_arn(), config.code_sha256()).map(Some)
            }
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(GetFunctionError::ResourceNotFoundException(_))
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(classify(OP, e, |_| None)),
        }
    }

    async fn create_function(
        &self,
        spec: &FunctionSpec,
        code: &CodePayload,
        role_arn: &str,
    ) -> AdminResult<FunctionInfo> {
        const OP: &str = "create_function";
        let timeout = i32::try_from(spec.timeout_secs).map_err(|e| build_error(OP, e))?;
        let memory = i32::try_from(spec.memory_mb).map_err(|e| build_error(OP, e))?;
        let environment = Environment::builder()
            .set_variables(Some(spec.environment.clone().into_iter().collect()))
            .build();

        let out = self
            .lambda
            .create_function()
            .function_name(&spec.name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .role(role_arn)
            .handler(spec.handler.name())
            .code(FunctionCode::builder().zip_file(Blob::new(code.bytes.clone())).build())
            .timeout(timeout)
            .memory_size(memory)
            .environment(environment)
            .send()
            .await
            .map_err(|e| {
                classify(OP, e, |e| match e {
                    CreateFunctionError::ResourceConflictException(_) => Some(Kind::AlreadyExists),
                    // Lambda's only signal that a new role cannot be assumed yet.
                    CreateFunctionError::InvalidParameterValueException(_) => Some(Kind::NotReady),
                    CreateFunctionError::TooManyRequestsException(_) => Some(Kind::Throttled),
                    CreateFunctionError::CodeStorageExceededException(_) => Some(Kind::Invalid),
                    _ => None,
                })
            })?;
        debug!(function = %spec.name, size = code.size_bytes(), "function created");
        function_info(OP, &spec.name, out.function_arn(), out.code_sha256())
    }

    async fn update_function_code(&self, name: &str, code: &CodePayload) -> AdminResult<FunctionInfo> {
        const OP: &str = "update_function_code";
        let out = self
            .lambda
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(code.bytes.clone()))
            .send()
            .await
            .map_err(|e| {
                classify(OP, e, |e| match e {
                    // An earlier create or update is still in progress.
                    UpdateFunctionCodeError::ResourceConflictException(_) => Some(Kind::NotReady),
                    UpdateFunctionCodeError::ResourceNotFoundException(_) => Some(Kind::NotFound),
                    UpdateFunctionCodeError::TooManyRequestsException(_) => Some(Kind::Throttled),
                    UpdateFunctionCodeError::InvalidParameterValueException(_)
                    | UpdateFunctionCodeError::CodeStorageExceededException(_) => Some(Kind::Invalid),
                    _ => None,
                })
            })?;
        debug!(function = %name, size = code.size_bytes(), "function code updated");
        function_info(OP, name, out.function_arn(), out.code_sha256())
    }

    async fn invoke_grant(&self, function: &str, statement_id: &str) -> AdminResult<Option<InvokeGrant>> {
        const OP: &str = "get_policy";
        let out = match self.lambda.get_policy().function_name(function).send().await {
            Ok(out) => out,
            // No resource policy at all.
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(GetPolicyError::ResourceNotFoundException(_))
                ) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(classify(OP, e, |_| None)),
        };
        let Some(policy) = out.policy() else {
            return Ok(None);
        };
        find_statement(policy, statement_id)
            .map_err(|e| AdminError::backend(OP, format!("unreadable policy of {function}: {e}")))
    }

    async fn grant_invoke(&self, function: &str, grant: &InvokeGrant) -> AdminResult<()> {
        self.lambda
            .add_permission()
            .function_name(function)
            .statement_id(&grant.statement_id)
            .action(INVOKE_ACTION)
            .principal(&grant.principal)
            .source_arn(&grant.source_arn)
            .send()
            .await
            .map_err(|e| {
                classify("add_permission", e, |e| match e {
                    AddPermissionError::ResourceConflictException(_) => Some(Kind::AlreadyExists),
                    AddPermissionError::ResourceNotFoundException(_) => Some(Kind::NotFound),
                    AddPermissionError::TooManyRequestsException(_) => Some(Kind::Throttled),
                    AddPermissionError::PreconditionFailedException(_) => Some(Kind::NotReady),
                    AddPermissionError::PolicyLengthExceededException(_)
                    | AddPermissionError::InvalidParameterValueException(_) => Some(Kind::Invalid),
                    _ => None,
                })
            })?;
        debug!(%function, statement = %grant.statement_id, "invoke permission granted");
        Ok(())
    }
}

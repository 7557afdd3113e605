//! Resource name (ARN) parsing and the addresses derived from it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

#[derive(Debug, Error)]
#[error("invalid ARN: {0}")]
pub struct ArnError(pub String);

impl Arn {
    /// Parse `arn:partition:service:region:account:resource`.
    ///
    /// The resource part may itself contain colons.
    pub fn parse(s: &str) -> Result<Self, ArnError> {
        let mut parts = s.splitn(6, ':');
        let prefix = parts.next();
        if prefix != Some("arn") {
            return Err(ArnError(s.to_string()));
        }
        let mut next = || parts.next().ok_or_else(|| ArnError(s.to_string()));
        let partition = next()?.to_string();
        let service = next()?.to_string();
        let region = next()?.to_string();
        let account = next()?.to_string();
        let resource = next()?.to_string();
        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return Err(ArnError(s.to_string()));
        }
        Ok(Self {
            partition,
            service,
            region,
            account,
            resource,
        })
    }
}

impl std::fmt::Display for Arn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// Gateway integration URI that invokes the given function.
pub fn invocation_uri(region: &str, function_arn: &str) -> String {
    format!("arn:aws:apigateway:{region}:lambda:path/2015-03-31/functions/{function_arn}/invocations")
}

/// The function ARN embedded in an integration URI built by [`invocation_uri`].
pub fn function_arn_from_uri(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once("/functions/")?;
    rest.strip_suffix("/invocations")
}

/// Source pattern covering every API, stage, verb and path in one account.
///
/// Invoke permissions are granted before the API exists, so the API id
/// cannot be part of the pattern.
pub fn execute_api_source_pattern(region: &str, account: &str) -> String {
    format!("arn:aws:execute-api:{region}:{account}:*/*/*/*")
}

/// Public invoke URL of a deployed stage.
pub fn stage_url(api_id: &str, region: &str, stage: &str) -> String {
    format!("https://{api_id}.execute-api.{region}.amazonaws.com/{stage}")
}

//! Client for the function Runtime API and the invocation loop.

use ads_core::HandlerKind;
use ads_handlers::{HandlerContext, HandlerRequest, HandlerResponse, invoke};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const API_VERSION: &str = "2018-06-01";

/// One pending invocation.
#[derive(Debug)]
pub struct Invocation {
    pub request_id: String,
    pub event: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport<'a> {
    error_message: &'a str,
    error_type: &'a str,
}

pub struct RuntimeClient {
    http: reqwest::Client,
    base: String,
}

impl RuntimeClient {
    /// `api` is the `host:port` of the Runtime API.
    pub fn new(api: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{api}/{API_VERSION}/runtime"),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api = std::env::var(RUNTIME_API_ENV).with_context(|| format!("{RUNTIME_API_ENV} is not set"))?;
        Ok(Self::new(&api))
    }

    /// Block until the next invocation arrives.
    pub async fn next_invocation(&self) -> Result<Invocation> {
        let resp = self
            .http
            .get(format!("{}/invocation/next", self.base))
            .send()
            .await
            .context("polling for the next invocation")?
            .error_for_status()?;
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context("invocation carries no request id")?;
        let event = resp.json().await.context("reading invocation event")?;
        Ok(Invocation { request_id, event })
    }

    pub async fn respond<T: Serialize>(&self, request_id: &str, body: &T) -> Result<()> {
        self.http
            .post(format!("{}/invocation/{request_id}/response", self.base))
            .json(body)
            .send()
            .await
            .with_context(|| format!("posting response for {request_id}"))?
            .error_for_status()?;
        Ok(())
    }

    pub async fn fail(&self, request_id: &str, message: &str) -> Result<()> {
        self.http
            .post(format!("{}/invocation/{request_id}/error", self.base))
            .json(&ErrorReport {
                error_message: message,
                error_type: "Handler.InvalidEvent",
            })
            .send()
            .await
            .with_context(|| format!("posting error for {request_id}"))?
            .error_for_status()?;
        Ok(())
    }

    pub async fn init_error(&self, message: &str) -> Result<()> {
        self.http
            .post(format!("{}/init/error", self.base))
            .json(&ErrorReport {
                error_message: message,
                error_type: "Runtime.InitError",
            })
            .send()
            .await
            .context("posting init error")?
            .error_for_status()?;
        Ok(())
    }
}

/// Run one event through the handler unit.
pub async fn handle_event(kind: HandlerKind, ctx: &HandlerContext, event: Value) -> Result<HandlerResponse, String> {
    let request: HandlerRequest =
        serde_json::from_value(event).map_err(|e| format!("event is not a handler request: {e}"))?;
    Ok(invoke(kind, ctx, request).await)
}

/// Fetch, handle and answer one invocation.
pub async fn serve_one(client: &RuntimeClient, kind: HandlerKind, ctx: &HandlerContext) -> Result<()> {
    let invocation = client.next_invocation().await?;
    debug!(request_id = %invocation.request_id, "invocation received");
    match handle_event(kind, ctx, invocation.event).await {
        Ok(response) => {
            info!(request_id = %invocation.request_id, status = response.status_code, "invocation handled");
            client.respond(&invocation.request_id, &response).await
        }
        Err(message) => {
            error!(request_id = %invocation.request_id, %message, "invocation rejected");
            client.fail(&invocation.request_id, &message).await
        }
    }
}

/// Serve invocations until the runtime shuts the process down.
pub async fn run(client: RuntimeClient, kind: HandlerKind, ctx: HandlerContext) -> Result<()> {
    info!(handler = %kind, "runtime loop started");
    loop {
        if let Err(e) = serve_one(&client, kind, &ctx).await {
            error!(error = %e, "invocation cycle failed");
        }
    }
}

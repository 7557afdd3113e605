//! Reconciliation primitives shared by every resource kind.

use std::future::Future;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AdminResult;
use crate::wait::RetryPolicy;

/// Result of [`find_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found<T> {
    Existing(T),
    Created(T),
}

impl<T> Found<T> {
    pub fn into_inner(self) -> T {
        match self {
            Found::Existing(v) | Found::Created(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Found::Created(_))
    }
}

/// Look a resource up and create it only if the lookup finds nothing.
///
/// A create that loses a race and reports "already exists" is resolved by
/// looking the resource up once more.
pub async fn find_or_create<T, L, LF, C, CF>(lookup: L, create: C) -> AdminResult<Found<T>>
where
    L: Fn() -> LF,
    LF: Future<Output = AdminResult<Option<T>>>,
    C: FnOnce() -> CF,
    CF: Future<Output = AdminResult<T>>,
{
    if let Some(existing) = lookup().await? {
        return Ok(Found::Existing(existing));
    }
    match create().await {
        Ok(created) => Ok(Found::Created(created)),
        Err(e) if e.is_already_satisfied() => {
            debug!(error = %e, "create raced with another writer, looking up again");
            match lookup().await? {
                Some(existing) => Ok(Found::Existing(existing)),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Run `call`, retrying transient failures with linear backoff.
pub async fn retry_transient<T, F, Fut>(op: &str, policy: &RetryPolicy, mut call: F) -> AdminResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AdminResult<T>>,
{
    let mut attempt = 1u32;
    loop {
        match call().await {
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                let delay = policy.backoff * attempt;
                warn!(%op, attempt, ?delay, error = %e, "transient failure, retrying");
                sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

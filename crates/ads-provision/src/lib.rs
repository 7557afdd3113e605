//! ads-provision: brings a target environment to the fully deployed
//! classifieds backend, idempotently.
//!
//! # Components
//!
//! - **`admin`**: capability traits for the four control-plane collaborators
//! - **`error`**: admin error kinds and their classification
//! - **`reconcile`**: find-or-create and bounded transient retry
//! - **`wait`**: poll-with-timeout readiness waits
//! - **`provisioner`**: the seven ordered reconciliation steps
//! - **`report`**: per-item outcomes and the terminal run status
//! - **`local`**: a persistent local control plane over `ads-state`
//!
//! # Concurrency
//!
//! Runs are strictly sequential. Two simultaneous runs against the same
//! target are not supported: both may observe a resource as missing and race
//! to create it. No run-level lock is taken.

pub mod admin;
pub mod error;
pub mod local;
pub mod provisioner;
pub mod reconcile;
pub mod report;
pub mod wait;

pub use admin::{
    ApiInfo, ControlPlane, FunctionAdmin, FunctionInfo, IdentityAdmin, Integration,
    IntegrationResponse, InvokeGrant, MethodInfo, MethodTarget, RoleInfo, RoutingAdmin, StageState,
    TableAdmin,
};
pub use error::{AdminError, AdminResult, ErrorClass, ProvisionError};
pub use local::LocalCloud;
pub use provisioner::{ProvisionSettings, Provisioner};
pub use report::{ItemReport, Outcome, ResourceKind, RunReport, RunStatus, Step};
pub use wait::{RetryPolicy, WaitPolicy};

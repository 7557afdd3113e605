//! IAM: the execution role and its policy attachments.

use ads_provision::{AdminResult, IdentityAdmin, RoleInfo};
use async_trait::async_trait;
use aws_sdk_iam::operation::attach_role_policy::AttachRolePolicyError;
use aws_sdk_iam::operation::create_role::CreateRoleError;
use aws_sdk_iam::operation::get_role::GetRoleError;
use aws_sdk_iam::operation::list_attached_role_policies::ListAttachedRolePoliciesError;
use aws_sdk_iam::types::Role;
use tracing::debug;

use crate::AwsCloud;
use crate::error::{Kind, classify, missing};

fn role_info(role: &Role) -> RoleInfo {
    RoleInfo {
        name: role.role_name().to_string(),
        arn: role.arn().to_string(),
    }
}

#[async_trait]
impl IdentityAdmin for AwsCloud {
    async fn get_role(&self, name: &str) -> AdminResult<Option<RoleInfo>> {
        match self.iam.get_role().role_name(name).send().await {
            Ok(out) => Ok(out.role().map(role_info)),
            Err(e) if matches!(e.as_service_error(), Some(GetRoleError::NoSuchEntityException(_))) => Ok(None),
            Err(e) => Err(classify("get_role", e, |_| None)),
        }
    }

    async fn create_role(&self, name: &str, trust_policy: &str) -> AdminResult<RoleInfo> {
        const OP: &str = "create_role";
        let out = self
            .iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(trust_policy)
            .send()
            .await
            .map_err(|e| {
                classify(OP, e, |e| match e {
                    CreateRoleError::EntityAlreadyExistsException(_) => Some(Kind::AlreadyExists),
                    CreateRoleError::MalformedPolicyDocumentException(_)
                    | CreateRoleError::InvalidInputException(_)
                    | CreateRoleError::LimitExceededException(_) => Some(Kind::Invalid),
                    CreateRoleError::ConcurrentModificationException(_) => Some(Kind::NotReady),
                    _ => None,
                })
            })?;
        let role = out.role().ok_or_else(|| missing(OP, "Role"))?;
        debug!(role = %name, arn = %role.arn(), "role created");
        Ok(role_info(role))
    }

    async fn attached_policies(&self, role: &str) -> AdminResult<Vec<String>> {
        let mut policies = Vec::new();
        let mut marker = None;
        loop {
            let out = self
                .iam
                .list_attached_role_policies()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| {
                    classify("list_attached_role_policies", e, |e| match e {
                        ListAttachedRolePoliciesError::NoSuchEntityException(_) => Some(Kind::NotFound),
                        _ => None,
                    })
                })?;
            policies.extend(
                out.attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn())
                    .map(str::to_string),
            );
            marker = out.marker().map(str::to_string);
            if !out.is_truncated() || marker.is_none() {
                break;
            }
        }
        Ok(policies)
    }

    async fn attach_policy(&self, role: &str, policy: &str) -> AdminResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role)
            .policy_arn(policy)
            .send()
            .await
            .map_err(|e| {
                classify("attach_role_policy", e, |e| match e {
                    // A freshly created role is not visible everywhere yet.
                    AttachRolePolicyError::NoSuchEntityException(_) => Some(Kind::NotReady),
                    AttachRolePolicyError::PolicyNotAttachableException(_)
                    | AttachRolePolicyError::InvalidInputException(_)
                    | AttachRolePolicyError::LimitExceededException(_) => Some(Kind::Invalid),
                    _ => None,
                })
            })?;
        debug!(%role, %policy, "policy attached");
        Ok(())
    }
}

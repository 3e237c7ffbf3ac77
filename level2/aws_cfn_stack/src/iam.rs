use serde::Serialize;
use serde_json::Value;

use crate::intrinsics::sub;
use crate::policy::{assume_role_policy_doc, PolicyDocument, PolicyStatement};
use crate::CfnResource;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RolePolicy {
    pub policy_name: String,
    pub policy_document: PolicyDocument,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnRole {
    pub assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<RolePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
}

/// lets a function write its logs to CloudWatch.
pub fn lambda_basic_execution_policy_arn() -> Value {
    sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole")
}

impl CfnRole {
    /// a role lambda can assume, with basic logging permissions and one inline
    /// policy holding `statements`.
    pub fn for_lambda(
        description: &str,
        policy_name: &str,
        statements: Vec<PolicyStatement>,
    ) -> Self {
        let policies = if statements.is_empty() {
            vec![]
        } else {
            vec![RolePolicy {
                policy_name: policy_name.to_string(),
                policy_document: PolicyDocument::new(statements),
            }]
        };
        Self {
            assume_role_policy_document: assume_role_policy_doc("lambda.amazonaws.com"),
            description: Some(description.to_string()),
            managed_policy_arns: vec![lambda_basic_execution_policy_arn()],
            policies,
            role_name: None,
        }
    }
}

impl CfnResource for CfnRole {
    fn type_string(&self) -> &'static str {
        "AWS::IAM::Role"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.role_name {
            if name.is_empty() || name.len() > 64 {
                return Err(format!(
                    "Invalid role name {:?}\nMust be between 1 and 64 characters",
                    name
                ));
            }
        }
        if let Some(desc) = &self.description {
            if desc.len() > 1000 {
                return Err("Role description must be at most 1000 characters".to_string());
            }
        }
        for policy in self.policies.iter() {
            if policy.policy_name.is_empty() || policy.policy_name.len() > 128 {
                return Err(format!(
                    "Invalid policy name {:?}\nMust be between 1 and 128 characters",
                    policy.policy_name
                ));
            }
            if policy.policy_document.statement.is_empty() {
                return Err(format!("Policy {} has no statements", policy.policy_name));
            }
        }
        Ok(())
    }
}

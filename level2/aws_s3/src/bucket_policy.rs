use aws_cfn_stack::policy::{PolicyDocument, PolicyStatement};
use aws_cfn_stack::{get_ref, logical_suffix, sub, CfnResource, Resource};
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

pub mod outputs {
    pub const LOGICAL_POLICY_NAME: &str = "LOGICAL_POLICY_NAME";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnBucketPolicy {
    pub bucket: Value,
    pub policy_document: PolicyDocument,
}

impl CfnResource for CfnBucketPolicy {
    fn type_string(&self) -> &'static str {
        "AWS::S3::BucketPolicy"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.policy_document.statement.is_empty() {
            return Err("Bucket policy must contain at least one statement".to_string());
        }
        if self.policy_document.statement.iter().any(|s| s.principal.is_none()) {
            return Err("Every bucket policy statement requires a principal".to_string());
        }
        Ok(())
    }
}

/// `arn:<partition>:s3:::<bucket>/*`
pub fn objects_arn(logical_bucket_name: &str) -> Value {
    sub(&format!("arn:${{AWS::Partition}}:s3:::${{{logical_bucket_name}}}/*"))
}

/// `arn:<partition>:cloudfront::<account>:distribution/<id>`
pub fn distribution_arn(logical_distribution_name: &str) -> Value {
    sub(&format!(
        "arn:${{AWS::Partition}}:cloudfront::${{AWS::AccountId}}:distribution/${{{}}}",
        logical_distribution_name
    ))
}

/// read access to every object for the CloudFront service, but only when
/// the request is made on behalf of the given distribution.
pub fn cloudfront_read_statement(
    logical_bucket_name: &str,
    logical_distribution_name: &str,
) -> PolicyStatement {
    let source_arn = distribution_arn(logical_distribution_name);
    PolicyStatement::allow(&["s3:GetObject"])
        .with_service_principal("cloudfront.amazonaws.com")
        .on_resources(vec![objects_arn(logical_bucket_name)])
        .with_condition("StringEquals", "AWS:SourceArn", source_arn)
}

pub struct Input {
    /// logical name of the policy. by default `{logical_bucket_name}Policy`.
    pub resource_name: String,
    /// logical id of the bucket the policy is attached to. required.
    pub logical_bucket_name: String,
    pub statements: Vec<PolicyStatement>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            resource_name: "UNDEFINED_RESOURCE".into(),
            logical_bucket_name: String::new(),
            statements: vec![],
        }
    }
}

pub fn config(myinput: &mut Input, stackinp: &mut aws_cfn_stack::Input, l0core: &mut L0Core) {
    if myinput.logical_bucket_name.is_empty() {
        l0core.config_error("Bucket policy requires the logical id of a bucket");
        return;
    }
    if myinput.statements.is_empty() {
        l0core.config_error("Bucket policy requires at least one statement");
        return;
    }
    if myinput.resource_name == "UNDEFINED_RESOURCE" {
        myinput.resource_name = format!("{}Policy", logical_suffix(&myinput.logical_bucket_name));
    }
    if let Some(err) = aws_cfn_stack::verify_resource_name(&myinput.resource_name) {
        l0core.config_error(&err);
        return;
    }
    let policy = CfnBucketPolicy {
        bucket: get_ref(&myinput.logical_bucket_name),
        policy_document: PolicyDocument::new(myinput.statements.clone()),
    };
    stackinp.resources.push(Resource::new(myinput.resource_name.clone(), policy));
    l0core.set_output(outputs::LOGICAL_POLICY_NAME, &myinput.resource_name);
}

//! this is a higher level module for creating S3 buckets easily.
//! In addition to creating an S3 bucket, by default we create custom cloudformation resources
//! for cleanup. That is: a lambda function will be created that will delete the contents
//! of this S3 bucket when the cloudformation stack gets deleted. This enables easy teardown.
//! See the input section to customize this behavior.

use aws_cfn_stack::iam::CfnRole;
use aws_cfn_stack::policy::PolicyStatement;
use aws_cfn_stack::{get_att, get_ref, logical_suffix, sub, CfnResource, Resource};
use aws_lambda::inline_python_function;
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

pub mod bucket_policy;

pub mod outputs {
    /// the logical name of the resource in cloudformation.
    /// Reference this value in other modules, for example
    /// allowing permissions to read/write from this bucket,
    /// pointing a cloudfront distribution to this bucket, etc.
    pub const LOGICAL_BUCKET_NAME: &str = "LOGICAL_BUCKET_NAME";
}

const AUTO_DELETE_HANDLER_SOURCE: &str = r#"
import boto3
import cfnresponse

s3 = boto3.resource('s3')

def handler(event, context):
    props = event['ResourceProperties']
    physical_id = props['BucketName'] + '-auto-delete'
    status = cfnresponse.SUCCESS
    if event['RequestType'] == 'Delete':
        # only empty the bucket when this resource is really going away,
        # not when an update handed out a new id.
        removing = event.get('PhysicalResourceId') == physical_id
        physical_id = event.get('PhysicalResourceId', physical_id)
        if removing:
            try:
                bucket = s3.Bucket(props['BucketName'])
                bucket.object_versions.delete()
                bucket.objects.all().delete()
            except Exception as e:
                print(e)
                status = cfnresponse.FAILED
    cfnresponse.send(event, context, status, {}, physicalResourceId=physical_id)
"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PublicAccessBlockConfiguration {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlockConfiguration {
    pub fn block_all() -> Self {
        Self {
            block_public_acls: true,
            block_public_policy: true,
            ignore_public_acls: true,
            restrict_public_buckets: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorsRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<HttpMethod>,
    pub allowed_origins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exposed_headers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
}

impl CorsRule {
    /// GET and HEAD from any origin with any header.
    pub fn read_from_any_origin() -> Self {
        Self {
            allowed_headers: vec!["*".to_string()],
            allowed_methods: vec![HttpMethod::Get, HttpMethod::Head],
            allowed_origins: vec!["*".to_string()],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CorsConfiguration {
    pub cors_rules: Vec<CorsRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnBucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_block_configuration: Option<PublicAccessBlockConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_configuration: Option<CorsConfiguration>,
}

pub fn verify_bucket_name(bucket_name: &str) -> Option<String> {
    if bucket_name.len() > 63 || bucket_name.len() < 3 {
        return Some(format!(
            "Invalid bucket name {:?}\nMust be between 3 and 63 characters",
            bucket_name
        ));
    }
    let valid_char_check = |c: char| -> bool {
        c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
    };
    if !bucket_name.chars().all(valid_char_check) {
        return Some(format!(
            "Invalid bucket name {:?}\n\
            May only contain lowercase letters, numbers, dots, and dashes",
            bucket_name
        ));
    }
    let alnum_at_ends = bucket_name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket_name.ends_with(|c: char| c.is_ascii_alphanumeric());
    if !alnum_at_ends {
        return Some(format!(
            "Invalid bucket name {:?}\n\
            First and last character must be either lowercase letter, or number",
            bucket_name
        ));
    }
    if bucket_name.contains("..") {
        return Some(format!(
            "Invalid bucket name {:?}\nMay not contain two consecutive dots",
            bucket_name
        ));
    }
    None
}

impl CfnResource for CfnBucket {
    fn type_string(&self) -> &'static str {
        "AWS::S3::Bucket"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.bucket_name {
            if let Some(err) = verify_bucket_name(name) {
                return Err(err);
            }
        }
        if let Some(cors) = &self.cors_configuration {
            for rule in cors.cors_rules.iter() {
                if rule.allowed_methods.is_empty() || rule.allowed_origins.is_empty() {
                    return Err("Every CORS rule needs at least one allowed method \
                        and one allowed origin"
                        .to_string());
                }
            }
        }
        Ok(())
    }
}

/// custom resource that empties the bucket when the stack is deleted.
pub struct AutoDeleteObjects {
    pub lambda_logical_id: String,
    pub bucket_logical_id: String,
}

impl CfnResource for AutoDeleteObjects {
    fn type_string(&self) -> &'static str {
        "Custom::S3AutoDeleteObjects"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        let mut map = serde_json::Map::new();
        map.insert("ServiceToken".to_string(), get_att(&self.lambda_logical_id, "Arn"));
        map.insert("BucketName".to_string(), get_ref(&self.bucket_logical_id));
        Ok(Value::Object(map))
    }
}

pub struct Input {
    /// logical name of the bucket in cloudformation.
    /// by default this is `Bucket{users_module_name}`.
    pub resource_name: String,
    /// physical name of the S3 bucket. Must be globally unique.
    /// Leave empty to have cloudformation generate one from the logical name.
    pub bucket_name: String,
    /// blocks every form of public access. on by default.
    pub block_public_access: bool,
    pub cors_rules: Vec<CorsRule>,
    /// By default, every s3 bucket gets a cleanup resource created for it.
    /// this includes:
    /// - a cloudformation custom resource
    /// - a lambda function that will perform the cleanup
    /// - a role for the lambda function that allows it to cleanup the S3 bucket.
    ///
    /// Without a cleanup resource, deleting a stack with an S3 bucket that is not empty will fail.
    /// To disable cleanup resources, set this value to false.
    pub auto_delete_objects: bool,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            resource_name: "UNDEFINED_RESOURCE".into(),
            bucket_name: String::new(),
            block_public_access: true,
            cors_rules: vec![],
            auto_delete_objects: true,
        }
    }
}

impl Input {
    pub fn set_names(&mut self, users_mod_name: &str) {
        if self.resource_name == "UNDEFINED_RESOURCE" {
            self.resource_name = format!("Bucket{}", logical_suffix(users_mod_name));
        }
    }

    pub fn is_valid(&self) -> Option<String> {
        if let Some(err) = aws_cfn_stack::verify_resource_name(&self.resource_name) {
            return Some(err);
        }
        if !self.bucket_name.is_empty() {
            if let Some(err) = verify_bucket_name(&self.bucket_name) {
                return Some(err);
            }
        }
        None
    }

    pub fn output_cfn(&self) -> CfnBucket {
        CfnBucket {
            bucket_name: if self.bucket_name.is_empty() {
                None
            } else {
                Some(self.bucket_name.clone())
            },
            public_access_block_configuration: if self.block_public_access {
                Some(PublicAccessBlockConfiguration::block_all())
            } else {
                None
            },
            cors_configuration: if self.cors_rules.is_empty() {
                None
            } else {
                Some(CorsConfiguration { cors_rules: self.cors_rules.clone() })
            },
        }
    }
}

fn add_auto_delete_resources(logical_bucket_name: &str, stackinp: &mut aws_cfn_stack::Input) {
    let role_name = format!("AutoDeleteObjectsRole{logical_bucket_name}");
    let handler_name = format!("AutoDeleteObjectsHandler{logical_bucket_name}");
    let cleanup_name = format!("AutoDeleteObjects{logical_bucket_name}");

    let role = CfnRole::for_lambda(
        &format!("empties {logical_bucket_name} when the stack is deleted"),
        &format!("{cleanup_name}-policy"),
        vec![
            PolicyStatement::allow(&["s3:ListBucket", "s3:ListBucketVersions"])
                .on_resources(vec![get_att(logical_bucket_name, "Arn")]),
            PolicyStatement::allow(&["s3:DeleteObject", "s3:DeleteObjectVersion"])
                .on_resources(vec![sub(&format!(
                    "arn:${{AWS::Partition}}:s3:::${{{logical_bucket_name}}}/*"
                ))]),
        ],
    );
    let handler = inline_python_function(
        &format!("empties {logical_bucket_name} when the stack is deleted"),
        &role_name,
        AUTO_DELETE_HANDLER_SOURCE,
        300,
    );
    let cleanup = AutoDeleteObjects {
        lambda_logical_id: handler_name.clone(),
        bucket_logical_id: logical_bucket_name.to_string(),
    };
    stackinp.resources.push(Resource::new(role_name, role));
    stackinp.resources.push(Resource::new(handler_name, handler));
    stackinp.resources.push(Resource::new(cleanup_name, cleanup));
}

pub fn config(myinput: &mut Input, stackinp: &mut aws_cfn_stack::Input, l0core: &mut L0Core) {
    let user_mod_name = l0core.users_module_name();
    myinput.set_names(&user_mod_name);
    if let Some(err) = myinput.is_valid() {
        l0core.config_error(&err);
        return;
    }
    if !myinput.block_public_access {
        l0core.config_warning(&format!("{} does not block public access", myinput.resource_name));
    }
    let logical_bucket_name = myinput.resource_name.clone();
    stackinp.resources.push(Resource::new(logical_bucket_name.clone(), myinput.output_cfn()));
    l0core.set_output(outputs::LOGICAL_BUCKET_NAME, &logical_bucket_name);

    if myinput.auto_delete_objects {
        add_auto_delete_resources(&logical_bucket_name, stackinp);
    } else {
        tracing::debug!(bucket = %logical_bucket_name, "skipping auto delete resources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bucket_name_rules() {
        assert!(verify_bucket_name("cdk-cloudfront-s3-demo-bucket").is_none());
        assert!(verify_bucket_name("a.b-c").is_none());
        assert!(verify_bucket_name("ab").is_some());
        assert!(verify_bucket_name(&"a".repeat(64)).is_some());
        assert!(verify_bucket_name("Upper").is_some());
        assert!(verify_bucket_name("-abc").is_some());
        assert!(verify_bucket_name("abc.").is_some());
        assert!(verify_bucket_name("a..b").is_some());
    }

    #[test]
    fn default_bucket_blocks_public_access() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        core.set_current_module("aws_s3");
        let mut inp = Input {
            bucket_name: "my-bucket".into(),
            cors_rules: vec![CorsRule::read_from_any_origin()],
            auto_delete_objects: false,
            ..Default::default()
        };
        config(&mut inp, &mut stack, &mut core);
        assert!(!core.has_errors());
        assert_eq!(stack.resources.len(), 1);
        assert_eq!(core.get_output("aws_s3", outputs::LOGICAL_BUCKET_NAME), Some("Bucketcdndemo"));
        let props = stack.resources[0].properties.properties().unwrap();
        assert_eq!(props, json!({
            "BucketName": "my-bucket",
            "PublicAccessBlockConfiguration": {
                "BlockPublicAcls": true,
                "BlockPublicPolicy": true,
                "IgnorePublicAcls": true,
                "RestrictPublicBuckets": true,
            },
            "CorsConfiguration": {"CorsRules": [{
                "AllowedHeaders": ["*"],
                "AllowedMethods": ["GET", "HEAD"],
                "AllowedOrigins": ["*"],
            }]},
        }));
    }

    #[test]
    fn auto_delete_adds_cleanup_resources() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        let mut inp = Input { resource_name: "Assets".into(), ..Default::default() };
        config(&mut inp, &mut stack, &mut core);
        let names: Vec<&str> = stack.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Assets",
                "AutoDeleteObjectsRoleAssets",
                "AutoDeleteObjectsHandlerAssets",
                "AutoDeleteObjectsAssets"
            ]
        );
        let cleanup = &stack.resources[3];
        assert_eq!(cleanup.properties.type_string(), "Custom::S3AutoDeleteObjects");
        assert_eq!(cleanup.properties.properties().unwrap(), json!({
            "ServiceToken": {"Fn::GetAtt": ["AutoDeleteObjectsHandlerAssets", "Arn"]},
            "BucketName": {"Ref": "Assets"},
        }));
        let role = stack.resources[1].properties.properties().unwrap();
        let statements = &role["Policies"][0]["PolicyDocument"]["Statement"];
        assert_eq!(
            statements[1]["Resource"],
            json!([{"Fn::Sub": "arn:${AWS::Partition}:s3:::${Assets}/*"}])
        );
        for r in stack.resources.iter() {
            r.properties.validate().unwrap();
        }
    }

    #[test]
    fn invalid_bucket_name_is_reported() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        let mut inp = Input { bucket_name: "Not_Valid".into(), ..Default::default() };
        config(&mut inp, &mut stack, &mut core);
        assert!(core.has_errors());
        assert!(stack.resources.is_empty());
    }

    #[test]
    fn public_bucket_is_a_warning() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        let mut inp =
            Input { block_public_access: false, auto_delete_objects: false, ..Default::default() };
        config(&mut inp, &mut stack, &mut core);
        assert!(!core.has_errors());
        assert_eq!(core.warnings().len(), 1);
        assert_eq!(stack.resources.len(), 1);
    }

    #[test]
    fn cleanup_handler_keeps_a_stable_physical_id() {
        let sends: Vec<&str> = AUTO_DELETE_HANDLER_SOURCE
            .lines()
            .filter(|l| l.contains("cfnresponse.send("))
            .collect();
        assert_eq!(sends.len(), 1);
        assert!(sends[0].contains("physicalResourceId=physical_id"), "{}", sends[0]);
        let stable_id = "physical_id = props['BucketName'] + '-auto-delete'";
        assert!(AUTO_DELETE_HANDLER_SOURCE.contains(stable_id));
        let guard = AUTO_DELETE_HANDLER_SOURCE.find("if removing:").unwrap();
        let delete = AUTO_DELETE_HANDLER_SOURCE.find("object_versions.delete()").unwrap();
        assert!(guard < delete);
    }
}

use std::collections::BTreeMap;

use aws_cfn_stack::iam::CfnRole;
use aws_cfn_stack::policy::PolicyStatement;
use aws_cfn_stack::{get_att, get_ref, logical_suffix, CfnResource, Resource, TemplateParameter};
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

pub mod s3_event_source;

pub use s3_event_source::S3EventSource;

pub mod outputs {
    /// logical id of the `AWS::Lambda::Function`. `Ref` gives the function name,
    /// `Fn::GetAtt [id, Arn]` the ARN.
    pub const LOGICAL_FUNCTION_NAME: &str = "LOGICAL_FUNCTION_NAME";
    pub const LOGICAL_ROLE_NAME: &str = "LOGICAL_ROLE_NAME";
    /// names of the template parameters the deployer must fill with
    /// the S3 location of the function's zip artifact.
    pub const ARTIFACT_BUCKET_PARAM: &str = "ARTIFACT_BUCKET_PARAM";
    pub const ARTIFACT_KEY_PARAM: &str = "ARTIFACT_KEY_PARAM";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Runtime {
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
    #[serde(rename = "provided.al2")]
    ProvidedAl2,
    #[serde(rename = "python3.12")]
    Python312,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Architecture {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "x86_64")]
    X86_64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Code {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<Value>,
    /// inline source code. only valid for interpreted runtimes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Environment {
    pub variables: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub runtime: Runtime,
    pub handler: String,
    pub code: Code,
    pub role: Value,
    pub timeout: u32,
    pub memory_size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<Architecture>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
}

pub fn verify_function_name(function_name: &str) -> Option<String> {
    if function_name.len() > 64 {
        return Some(format!(
            "Invalid function name {:?}\nMust be at most 64 characters",
            function_name
        ));
    }
    if !function_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Some(format!(
            "Invalid function name {:?}\n\
            May only contain letters, numbers, hyphens, and underscores",
            function_name
        ));
    }
    None
}

impl CfnResource for CfnFunction {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Function"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.function_name {
            if let Some(err) = verify_function_name(name) {
                return Err(err);
            }
        }
        if self.memory_size < 128 || self.memory_size > 10240 {
            return Err(format!(
                "Invalid memory size {:?}\nMust be between 128 and 10240",
                self.memory_size
            ));
        }
        if self.timeout < 1 || self.timeout > 900 {
            return Err(format!("Invalid timeout {:?}\nMust be between 1 and 900", self.timeout));
        }
        let has_s3 = self.code.s3_bucket.is_some() && self.code.s3_key.is_some();
        match (&self.code.zip_file, has_s3) {
            (Some(_), true) => {
                return Err("Function code must be either inline or in S3, not both".to_string())
            }
            (None, false) => {
                return Err(
                    "Function code requires both an S3 bucket and key, or inline code".to_string()
                )
            }
            _ => {}
        }
        if self.code.zip_file.is_some() && self.runtime != Runtime::Python312 {
            return Err("Inline function code requires an interpreted runtime".to_string());
        }
        Ok(())
    }
}

/// `AWS::Lambda::Permission`: a resource policy on the function allowing
/// `principal` to invoke it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnPermission {
    pub action: String,
    pub function_name: Value,
    pub principal: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_arn: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_account: Option<Value>,
}

impl CfnResource for CfnPermission {
    fn type_string(&self) -> &'static str {
        "AWS::Lambda::Permission"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if !self.action.starts_with("lambda:") {
            return Err(format!(
                "Invalid permission action {:?}\nMust be a lambda action",
                self.action
            ));
        }
        Ok(())
    }
}

/// a small python function whose source is embedded in the template.
/// used for the custom resources that back other constructs.
pub fn inline_python_function(
    description: &str,
    role_logical_id: &str,
    source: &str,
    timeout: u32,
) -> CfnFunction {
    CfnFunction {
        function_name: None,
        description: Some(description.to_string()),
        runtime: Runtime::Python312,
        handler: "index.handler".to_string(),
        code: Code { zip_file: Some(source.to_string()), ..Default::default() },
        role: get_att(role_logical_id, "Arn"),
        timeout,
        memory_size: 128,
        architectures: vec![],
        environment: None,
    }
}

pub struct Input {
    /// logical name of the resource referenced in cloudformation.
    /// by default this is `Lambda{function_name}`.
    /// Must be alphanumeric, and up to 255 characters.
    pub resource_name: String,
    /// physical id of the lambda function. By default it is the users module name.
    /// Optionally set this to an empty string to get a randomly generated name.
    /// max 64 characters.
    pub function_name: String,

    /// memory to give your function (in MB). Defaults to 128.
    /// Valid values: 128 - 10240
    pub memory_size: u64,

    /// timeout of your function (in seconds). Defaults to 30.
    /// Valid values: 1 - 900
    pub timeout: u32,

    pub runtime: Runtime,
    /// for `provided.*` runtimes the handler is ignored by lambda, but
    /// cloudformation still requires one.
    pub handler: String,
    pub architecture: Architecture,

    /// environment variables. values may be intrinsics, eg: a `Ref` to a distribution.
    pub environment: Vec<(String, Value)>,

    /// statements for the function's inline role policy. Basic logging
    /// permissions are always attached separately.
    pub policy_statements: Vec<PolicyStatement>,

    /// set to some to have the function invoked by S3 bucket notifications.
    pub s3_event_source: Option<S3EventSource>,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            resource_name: "UNDEFINED_RESOURCE".into(),
            function_name: "UNDEFINED_FN_NAME".into(),
            memory_size: 128,
            timeout: 30,
            runtime: Runtime::ProvidedAl2023,
            handler: "bootstrap".into(),
            architecture: Architecture::Arm64,
            environment: vec![],
            policy_statements: vec![],
            s3_event_source: None,
        }
    }
}

impl Input {
    const RESOURCE_NAME_PREFIX: &'static str = "Lambda";
    const RESOURCE_NAME_PREFIX_LEN: usize = Self::RESOURCE_NAME_PREFIX.len();

    pub fn set_names(&mut self, users_mod_name: &str) {
        if self.function_name == "UNDEFINED_FN_NAME" {
            let mut func_name = users_mod_name.replace('_', "");
            // trim if longer than 64.
            let max_func_len = 64 - Self::RESOURCE_NAME_PREFIX_LEN;
            if func_name.len() > max_func_len {
                func_name.truncate(max_func_len);
            }
            self.function_name = func_name;
        }
        if self.resource_name == "UNDEFINED_RESOURCE" {
            let base = if self.function_name.is_empty() {
                users_mod_name
            } else {
                self.function_name.as_str()
            };
            self.resource_name = format!("{}{}", Self::RESOURCE_NAME_PREFIX, logical_suffix(base));
        }
    }

    pub fn is_valid(&self) -> Option<String> {
        if let Some(err_msg) = aws_cfn_stack::verify_resource_name(&self.resource_name) {
            return Some(err_msg);
        }
        if let Some(err_msg) = verify_function_name(&self.function_name) {
            return Some(err_msg);
        }
        if self.memory_size < 128 || self.memory_size > 10240 {
            return Some(format!(
                "Invalid memory size {:?}\nMust be between 128 and 10240",
                self.memory_size
            ));
        }
        if self.timeout < 1 || self.timeout > 900 {
            return Some(format!("Invalid timeout {:?}\nMust be between 1 and 900", self.timeout));
        }
        for (key, _) in self.environment.iter() {
            let valid_key = key.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
                && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_key {
                return Some(format!("Invalid environment variable name {:?}", key));
            }
        }
        None
    }

    fn artifact_param_names(&self) -> (String, String) {
        let suffix = logical_suffix(&self.resource_name);
        (format!("ArtifactBucket{suffix}"), format!("ArtifactKey{suffix}"))
    }

    pub fn output_cfn(&self) -> (CfnFunction, CfnRole) {
        let (bucket_param, key_param) = self.artifact_param_names();
        let role_resource_name = format!("Role{}", self.resource_name);
        let role = CfnRole::for_lambda(
            &format!("execution role for {}", self.resource_name),
            &format!("{}-policy", self.resource_name),
            self.policy_statements.clone(),
        );
        let environment = if self.environment.is_empty() {
            None
        } else {
            Some(Environment { variables: self.environment.iter().cloned().collect() })
        };
        let function = CfnFunction {
            function_name: if self.function_name.is_empty() {
                None
            } else {
                Some(self.function_name.clone())
            },
            description: None,
            runtime: self.runtime,
            handler: self.handler.clone(),
            code: Code {
                s3_bucket: Some(get_ref(&bucket_param)),
                s3_key: Some(get_ref(&key_param)),
                zip_file: None,
            },
            role: get_att(&role_resource_name, "Arn"),
            timeout: self.timeout,
            memory_size: self.memory_size,
            architectures: vec![self.architecture],
            environment,
        };
        (function, role)
    }
}

pub fn config(lambda_input: &mut Input, stackinp: &mut aws_cfn_stack::Input, l0core: &mut L0Core) {
    let user_mod_name = l0core.users_module_name();
    lambda_input.set_names(&user_mod_name);
    if let Some(err) = lambda_input.is_valid() {
        l0core.config_error(&err);
        return;
    }
    let (bucket_param, key_param) = lambda_input.artifact_param_names();
    stackinp.parameters.push((bucket_param.clone(), TemplateParameter::string(
        &format!("S3 bucket holding the deployment artifact for {}", lambda_input.resource_name),
    )));
    stackinp.parameters.push((key_param.clone(), TemplateParameter::string(
        &format!("S3 key of the deployment artifact for {}", lambda_input.resource_name),
    )));

    let (function, role) = lambda_input.output_cfn();
    let resource_name = lambda_input.resource_name.clone();
    let role_resource_name = format!("Role{resource_name}");
    stackinp.resources.push(Resource::new(role_resource_name.clone(), role));
    stackinp.resources.push(Resource::new(resource_name.clone(), function));

    l0core.set_output(outputs::LOGICAL_FUNCTION_NAME, &resource_name);
    l0core.set_output(outputs::LOGICAL_ROLE_NAME, &role_resource_name);
    l0core.set_output(outputs::ARTIFACT_BUCKET_PARAM, &bucket_param);
    l0core.set_output(outputs::ARTIFACT_KEY_PARAM, &key_param);

    if let Some(source) = &lambda_input.s3_event_source {
        s3_event_source::config(source, &resource_name, stackinp, l0core);
    }
}

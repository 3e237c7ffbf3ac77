use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stack_lib::{L0Core, Result, StackError};

pub mod deploy;
pub mod graph;
pub mod iam;
pub mod intrinsics;
pub mod policy;

pub use intrinsics::{get_att, get_ref, sub};

pub mod outputs {
    /// the validated name the stack will be deployed under.
    pub const STACK_NAME: &str = "STACK_NAME";
}

/// A typed CloudFormation resource. Implementors serialize into the
/// `Properties` section of the template.
pub trait CfnResource {
    fn type_string(&self) -> &'static str;
    fn properties(&self) -> serde_json::Result<Value>;
    /// checks that cannot be expressed in the type itself, eg: length limits.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// what CloudFormation should do with the physical resource when the
/// stack (or the resource) is deleted or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    #[default]
    Destroy,
    Retain,
    Snapshot,
}

impl RemovalPolicy {
    pub fn as_cfn_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
            RemovalPolicy::Snapshot => "Snapshot",
        }
    }
}

pub struct Resource {
    pub name: String,
    pub properties: Box<dyn CfnResource>,
    pub removal_policy: RemovalPolicy,
    /// explicit ordering for dependencies that cannot be expressed
    /// through a `Ref` or `Fn::GetAtt` in the properties.
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, properties: impl CfnResource + 'static) -> Self {
        Self {
            name: name.into(),
            properties: Box::new(properties),
            removal_policy: RemovalPolicy::default(),
            depends_on: vec![],
        }
    }

    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedResource {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub ty: String,
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl TemplateParameter {
    pub fn string(description: &str) -> Self {
        Self { ty: "String".to_string(), description: description.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutput {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Value")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, SavedResource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ResourceOutput>,
}

impl Default for SavedTemplate {
    fn default() -> Self {
        Self {
            version: "2010-09-09".to_string(),
            description: Default::default(),
            parameters: Default::default(),
            resources: Default::default(),
            outputs: Default::default(),
        }
    }
}

impl SavedTemplate {
    /// we make it pretty so if a user needs to look at the stack in Cfn console, it looks nice
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&SavedResource> {
        self.resources.get(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        ty: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a SavedResource)> + 'a {
        self.resources.iter().filter(move |(_, r)| r.ty == ty)
    }
}

/// a validated template together with the name it deploys under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedStack {
    pub stack_name: String,
    pub template: SavedTemplate,
}

#[derive(Default)]
pub struct Input {
    /// if left empty (default), we will use the users module name
    /// as the stack name.
    pub stack_name: String,
    pub description: String,
    pub resources: Vec<Resource>,
    pub parameters: Vec<(String, TemplateParameter)>,
    pub outputs: Vec<(String, ResourceOutput)>,
}

impl Input {
    pub fn add_output(&mut self, name: &str, description: &str, value: Value) {
        let output = ResourceOutput { description: description.to_string(), value };
        self.outputs.push((name.to_string(), output));
    }
}

pub fn verify_resource_name(resource_name: &str) -> Option<String> {
    if resource_name.len() > 255 {
        return Some(format!(
            "Invalid resource name {:?}\nmust be less than 255 characters",
            resource_name
        ));
    }
    if resource_name.is_empty() {
        return Some(format!(
            "Invalid resource name {:?}\nMust contain at least 1 character",
            resource_name
        ));
    }
    if !resource_name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Some(format!(
            "Invalid resource name {:?}\nMust contain only alphanumeric characters [A-Za-z0-9]",
            resource_name
        ));
    }
    None
}

/// turns a snake_case module name into something usable inside a logical id.
pub fn logical_suffix(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn validate_resources_to_template(input: &Input) -> Result<SavedTemplate> {
    let mut out_template = SavedTemplate {
        description: input.description.clone(),
        ..Default::default()
    };
    for resource in input.resources.iter() {
        if let Some(e) = verify_resource_name(&resource.name) {
            return Err(StackError::validation(&resource.name, e));
        }
        if let Err(e) = resource.properties.validate() {
            return Err(StackError::validation(&resource.name, e));
        }
        let policy = resource.removal_policy.as_cfn_str().to_string();
        let saved_resource = SavedResource {
            ty: resource.properties.type_string().to_string(),
            properties: resource.properties.properties()?,
            depends_on: resource.depends_on.clone(),
            deletion_policy: Some(policy.clone()),
            update_replace_policy: Some(policy),
        };
        if out_template.resources.insert(resource.name.clone(), saved_resource).is_some() {
            return Err(StackError::validation(
                &resource.name,
                "Duplicate logical id. Every resource in a stack must have a unique name",
            ));
        }
    }
    for (name, param) in input.parameters.iter() {
        if let Some(e) = verify_resource_name(name) {
            return Err(StackError::validation(name, e));
        }
        if out_template.resources.contains_key(name) {
            return Err(StackError::validation(
                name,
                "Parameter name collides with a resource logical id",
            ));
        }
        out_template.parameters.insert(name.clone(), param.clone());
    }
    for (name, output) in input.outputs.iter() {
        if let Some(e) = verify_resource_name(name) {
            return Err(StackError::validation(name, e));
        }
        out_template.outputs.insert(name.clone(), output.clone());
    }
    Ok(out_template)
}

pub fn validate_stack_name(user_mod_name: &str, current_stack_name: &str) -> Result<String> {
    let stack_name = if current_stack_name.is_empty() {
        let mut stack_name = user_mod_name.replace('_', "-");
        stack_name.truncate(128);
        stack_name
    } else {
        current_stack_name.to_string()
    };
    // A stack name can contain only alphanumeric characters (case sensitive) and hyphens.
    // It must start with an alphabetical character and can't be longer than 128 characters.
    let restriction = "Must only consist of alphanumeric characters and hyphens, \
        Must start with an alphabetical character, \
        and cannot be longer than 128 characters.";
    let invalid = || StackError::InvalidStackName {
        name: stack_name.clone(),
        reason: restriction.to_string(),
    };
    match stack_name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(invalid()),
    }
    if !stack_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if stack_name.len() > 128 {
        return Err(invalid());
    }
    Ok(stack_name)
}

/// validates every resource, checks that all references resolve and that
/// the dependency graph is acyclic, then returns the renderable stack.
pub fn synth(input: &Input, core: &mut L0Core) -> Result<SavedStack> {
    core.set_current_module("aws_cfn_stack");
    core.finish()?;
    let stack_name = validate_stack_name(&core.users_module_name(), &input.stack_name)?;
    let template = validate_resources_to_template(input)?;
    graph::validate_references(&template)?;
    let order = graph::dependency_order(&template)?;
    tracing::debug!(stack = %stack_name, ?order, "synthesized template");
    core.set_output(outputs::STACK_NAME, &stack_name);
    Ok(SavedStack { stack_name, template })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Dummy {
        props: Value,
        valid: bool,
    }

    impl CfnResource for Dummy {
        fn type_string(&self) -> &'static str {
            "AWS::Test::Dummy"
        }
        fn properties(&self) -> serde_json::Result<Value> {
            Ok(self.props.clone())
        }
        fn validate(&self) -> std::result::Result<(), String> {
            if self.valid { Ok(()) } else { Err("dummy is invalid".into()) }
        }
    }

    fn dummy(props: Value) -> Dummy {
        Dummy { props, valid: true }
    }

    #[test]
    fn stack_name_defaults_to_module_name() {
        assert_eq!(validate_stack_name("my_stack", "").unwrap(), "my-stack");
        assert_eq!(validate_stack_name("my_stack", "Explicit-Name").unwrap(), "Explicit-Name");
        assert!(validate_stack_name("my_stack", "1abc").is_err());
        assert!(validate_stack_name("my_stack", "has_underscore").is_err());
        assert!(validate_stack_name("", "").is_err());
        let long = "a".repeat(129);
        assert!(validate_stack_name("x", &long).is_err());
    }

    #[test]
    fn resource_names_must_be_alphanumeric() {
        assert!(verify_resource_name("Bucket1").is_none());
        assert!(verify_resource_name("").is_some());
        assert!(verify_resource_name("my-bucket").is_some());
        assert!(verify_resource_name(&"a".repeat(256)).is_some());
        assert_eq!(logical_suffix("my_cool-stack"), "mycoolstack");
    }

    #[test]
    fn every_resource_gets_destroy_policy_by_default() {
        let mut input = Input::default();
        input.resources.push(Resource::new("A", dummy(json!({"X": 1}))));
        input.resources.push(Resource::new("B", dummy(json!({"Y": {"Ref": "A"}}))).depends_on("A"));
        let mut core = L0Core::new("test_stack");
        let stack = synth(&input, &mut core).unwrap();
        assert_eq!(stack.stack_name, "test-stack");
        for (_, r) in stack.template.resources.iter() {
            assert_eq!(r.deletion_policy.as_deref(), Some("Delete"));
            assert_eq!(r.update_replace_policy.as_deref(), Some("Delete"));
        }
        let b = serde_json::to_value(stack.template.resource("B").unwrap()).unwrap();
        assert_eq!(b, json!({
            "Type": "AWS::Test::Dummy",
            "Properties": {"Y": {"Ref": "A"}},
            "DependsOn": ["A"],
            "DeletionPolicy": "Delete",
            "UpdateReplacePolicy": "Delete",
        }));
        assert_eq!(core.get_output("aws_cfn_stack", outputs::STACK_NAME), Some("test-stack"));
    }

    #[test]
    fn retained_resources_keep_their_policy() {
        let mut input = Input::default();
        let mut bucket = Resource::new("Logs", dummy(json!({})));
        bucket.removal_policy = RemovalPolicy::Retain;
        input.resources.push(bucket);
        let stack = synth(&input, &mut L0Core::new("test_stack")).unwrap();
        let logs = stack.template.resource("Logs").unwrap();
        assert_eq!(logs.deletion_policy.as_deref(), Some("Retain"));
        assert_eq!(logs.update_replace_policy.as_deref(), Some("Retain"));
    }

    #[test]
    fn synth_fails_on_invalid_resource() {
        let mut input = Input::default();
        input.resources.push(Resource::new("A", Dummy { props: json!({}), valid: false }));
        let mut core = L0Core::new("test_stack");
        let err = synth(&input, &mut core).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed on resource 'A'\ndummy is invalid");
    }

    #[test]
    fn synth_fails_on_duplicate_logical_id() {
        let mut input = Input::default();
        input.resources.push(Resource::new("A", dummy(json!({}))));
        input.resources.push(Resource::new("A", dummy(json!({}))));
        let mut core = L0Core::new("test_stack");
        assert!(matches!(synth(&input, &mut core), Err(StackError::Validation { .. })));
    }

    #[test]
    fn synth_surfaces_module_errors_first() {
        let input = Input::default();
        let mut core = L0Core::new("test_stack");
        core.set_current_module("aws_s3");
        core.config_error("bad bucket");
        match synth(&input, &mut core) {
            Err(StackError::Config(errs)) => {
                assert_eq!(errs, vec!["[aws_s3] bad bucket".to_string()])
            }
            other => panic!("expected config error, got {:?}", other.map(|s| s.stack_name)),
        }
    }

    #[test]
    fn empty_sections_are_omitted_from_json() {
        let template = SavedTemplate::default();
        let rendered: Value = serde_json::from_str(&template.to_json_pretty().unwrap()).unwrap();
        assert_eq!(rendered, json!({"AWSTemplateFormatVersion": "2010-09-09", "Resources": {}}));
    }
}

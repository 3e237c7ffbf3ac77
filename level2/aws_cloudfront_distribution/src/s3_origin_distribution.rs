//! a higher level construct for a distribution in front of a private S3 bucket.
//! The bucket is reached through an origin access control, so the bucket
//! itself can block all public access.

use aws_cfn_stack::{get_att, logical_suffix, CfnResource, Resource};
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

use crate::OriginKind;

pub mod outputs {
    pub use crate::outputs::*;
    /// logical id of the `AWS::CloudFront::OriginAccessControl`.
    pub const LOGICAL_OAC_NAME: &str = "LOGICAL_OAC_NAME";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningBehavior {
    Always,
    Never,
    NoOverride,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OriginAccessControlConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub origin_access_control_origin_type: String,
    pub signing_behavior: SigningBehavior,
    pub signing_protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnOriginAccessControl {
    pub origin_access_control_config: OriginAccessControlConfig,
}

impl CfnResource for CfnOriginAccessControl {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::OriginAccessControl"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        verify_oac_name(&self.origin_access_control_config.name).map_or(Ok(()), Err)
    }
}

pub fn verify_oac_name(name: &str) -> Option<String> {
    if name.is_empty() || name.len() > 64 {
        return Some(format!(
            "Invalid origin access control name {:?}\nMust be between 1 and 64 characters",
            name
        ));
    }
    None
}

pub struct Input {
    /// this should be the logical id of the s3 bucket to serve.
    pub logical_bucket_name: String,
    /// logical name of the origin access control. by default `OAC{users_module_name}`.
    pub oac_resource_name: String,
    /// name of the origin access control, unique per account.
    /// by default the users module name.
    pub oac_name: String,
    /// by default we sign every request to the bucket.
    pub signing_behavior: SigningBehavior,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            logical_bucket_name: String::new(),
            oac_resource_name: "UNDEFINED_RESOURCE".into(),
            oac_name: String::new(),
            signing_behavior: SigningBehavior::Always,
        }
    }
}

/// creates the origin access control and points the distribution's default
/// origin at the bucket through it. `distrinput` still needs to be passed to
/// [`crate::config`] afterwards.
pub fn config(
    inp: &mut Input,
    distrinput: &mut crate::Input,
    stackinp: &mut aws_cfn_stack::Input,
    l0core: &mut L0Core,
) {
    let user_mod_name = l0core.users_module_name();
    if inp.logical_bucket_name.is_empty() {
        l0core.config_error("S3 origin distribution requires the logical id of a bucket");
        return;
    }
    if inp.oac_resource_name == "UNDEFINED_RESOURCE" {
        inp.oac_resource_name = format!("OAC{}", logical_suffix(&user_mod_name));
    }
    if inp.oac_name.is_empty() {
        inp.oac_name = user_mod_name;
    }
    if let Some(err) = aws_cfn_stack::verify_resource_name(&inp.oac_resource_name) {
        l0core.config_error(&err);
        return;
    }
    if let Some(err) = verify_oac_name(&inp.oac_name) {
        l0core.config_error(&err);
        return;
    }

    let oac = CfnOriginAccessControl {
        origin_access_control_config: OriginAccessControlConfig {
            name: inp.oac_name.clone(),
            description: None,
            origin_access_control_origin_type: "s3".to_string(),
            signing_behavior: inp.signing_behavior,
            signing_protocol: "sigv4".to_string(),
        },
    };
    stackinp.resources.push(Resource::new(inp.oac_resource_name.clone(), oac));
    l0core.set_output(outputs::LOGICAL_OAC_NAME, &inp.oac_resource_name);

    distrinput.default_origin_domain_name = get_att(&inp.logical_bucket_name, "RegionalDomainName");
    distrinput.default_origin_kind = OriginKind::S3 {
        origin_access_identity: String::new(),
        origin_access_control_id: Some(get_att(&inp.oac_resource_name, "Id")),
    };
}

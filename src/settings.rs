use clap::{ArgAction, Args};
use stack_lib::{Result, StackError};

/// Everything about the stack a deployer may want to change. Each field can
/// be given as a flag or through its `CDN_INVALIDATION_*` environment variable.
#[derive(Debug, Clone, Args)]
pub struct StackSettings {
    /// Name of the CloudFormation stack.
    #[arg(
        long,
        env = "CDN_INVALIDATION_STACK_NAME",
        default_value = "cloudfront-s3-invalidation-lambda-demo"
    )]
    pub stack_name: String,

    /// Physical name of the bucket. Must be globally unique.
    #[arg(
        long,
        env = "CDN_INVALIDATION_BUCKET_NAME",
        default_value = "cdk-cloudfront-s3-demo-bucket"
    )]
    pub bucket_name: String,

    /// Physical name of the invalidation function.
    #[arg(
        long,
        env = "CDN_INVALIDATION_FUNCTION_NAME",
        default_value = "LambdaInvalidationDemoLambda"
    )]
    pub function_name: String,

    /// Timeout of the invalidation function, in seconds.
    #[arg(long, env = "CDN_INVALIDATION_FUNCTION_TIMEOUT", default_value_t = 120)]
    pub function_timeout: u32,

    /// Name of the origin access control.
    #[arg(long, env = "CDN_INVALIDATION_OAC_NAME", default_value = "cdkCloudfronts3DemoOAC")]
    pub oac_name: String,

    /// Region the stack is deployed to.
    #[arg(long, env = "CDN_INVALIDATION_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Empty the bucket when the stack is deleted.
    #[arg(
        long,
        env = "CDN_INVALIDATION_AUTO_DELETE_OBJECTS",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub auto_delete_objects: bool,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            stack_name: "cloudfront-s3-invalidation-lambda-demo".into(),
            bucket_name: "cdk-cloudfront-s3-demo-bucket".into(),
            function_name: "LambdaInvalidationDemoLambda".into(),
            function_timeout: 120,
            oac_name: "cdkCloudfronts3DemoOAC".into(),
            region: "us-east-1".into(),
            auto_delete_objects: true,
        }
    }
}

impl StackSettings {
    /// checks that do not belong to any one resource. Resource level
    /// settings are validated by the modules that render them.
    pub fn validate(&self) -> Result<()> {
        if let Some(err) = aws_regions::verify_region(&self.region) {
            return Err(StackError::Config(vec![err]));
        }
        aws_cfn_stack::validate_stack_name("", &self.stack_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: StackSettings,
    }

    #[test]
    fn flag_defaults_match_default_impl() {
        let parsed = TestCli::parse_from(["test"]).settings;
        let defaults = StackSettings::default();
        assert_eq!(parsed.stack_name, defaults.stack_name);
        assert_eq!(parsed.bucket_name, defaults.bucket_name);
        assert_eq!(parsed.function_name, defaults.function_name);
        assert_eq!(parsed.function_timeout, defaults.function_timeout);
        assert_eq!(parsed.oac_name, defaults.oac_name);
        assert_eq!(parsed.region, defaults.region);
        assert_eq!(parsed.auto_delete_objects, defaults.auto_delete_objects);
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = TestCli::parse_from([
            "test",
            "--bucket-name",
            "other-bucket",
            "--function-timeout",
            "30",
            "--auto-delete-objects",
            "false",
        ])
        .settings;
        assert_eq!(parsed.bucket_name, "other-bucket");
        assert_eq!(parsed.function_timeout, 30);
        assert!(!parsed.auto_delete_objects);
    }

    #[test]
    fn validates_region_and_stack_name() {
        assert!(StackSettings::default().validate().is_ok());
        let bad_region = StackSettings { region: "mars-north-1".into(), ..Default::default() };
        assert!(matches!(bad_region.validate(), Err(StackError::Config(_))));
        let bad_stack = StackSettings { stack_name: "1-stack".into(), ..Default::default() };
        assert!(matches!(bad_stack.validate(), Err(StackError::InvalidStackName { .. })));
    }
}

//! The stack itself: a private bucket, a distribution reading it through an
//! origin access control, a bucket policy granting only that distribution
//! read access, and a function that invalidates the distribution's cache
//! whenever an object is written to the bucket.

use aws_cfn_stack::policy::PolicyStatement;
use aws_cfn_stack::{get_att, get_ref, SavedStack};
use aws_cloudfront_distribution::s3_origin_distribution;
use aws_cloudfront_distribution::{
    managed_policies, AllowedMethods, CachedMethods, CustomErrorResponse, HttpVersion, PriceClass,
    ViewerProtocolPolicy,
};
use aws_lambda::S3EventSource;
use aws_s3::bucket_policy;
use aws_s3::CorsRule;
use stack_lib::{L0Core, Result};

use crate::settings::StackSettings;

/// prefix for every logical id this stack generates on its own.
pub const USERS_MODULE_NAME: &str = "cloudfront_s3_invalidation_lambda";

pub mod logical_ids {
    pub const BUCKET: &str = "cdkCloudfronts3DemoBucket";
    pub const DISTRIBUTION: &str = "cdkCloudfronts3DemoDistribution";
    pub const OAC: &str = "cdkCloudfronts3DemoOAC";
    pub const BUCKET_POLICY: &str = "cdkCloudfronts3DemoBucketPolicy";
    pub const FUNCTION: &str = "LambdaInvalidationDemoLambda";
}

pub mod stack_outputs {
    pub const DISTRIBUTION_ID: &str = "DistributionId";
    pub const DISTRIBUTION_DOMAIN_NAME: &str = "DistributionDomainName";
    pub const BUCKET_NAME: &str = "BucketName";
    pub const FUNCTION_NAME: &str = "FunctionName";
}

const ERROR_PAGE_TTL_SECONDS: u64 = 300;

/// the synthesized stack plus the names of the template parameters the
/// deployer fills with the location of the function's artifact.
#[derive(Debug, Clone)]
pub struct StackDefinition {
    pub stack: SavedStack,
    pub artifact_bucket_param: String,
    pub artifact_key_param: String,
}

impl StackDefinition {
    pub fn artifact_parameters(&self, bucket: &str, key: &str) -> Vec<(String, String)> {
        vec![
            (self.artifact_bucket_param.clone(), bucket.to_string()),
            (self.artifact_key_param.clone(), key.to_string()),
        ]
    }
}

fn output(core: &L0Core, module: &str, key: &str) -> String {
    core.get_output(module, key).unwrap_or_default().to_string()
}

pub fn build(settings: &StackSettings) -> Result<StackDefinition> {
    let mut core = L0Core::new(USERS_MODULE_NAME);
    let mut stack = aws_cfn_stack::Input {
        stack_name: settings.stack_name.clone(),
        description: "CloudFront distribution in front of a private S3 bucket, \
            invalidated on every upload"
            .into(),
        ..Default::default()
    };

    core.set_current_module("aws_s3");
    let mut bucket = aws_s3::Input {
        resource_name: logical_ids::BUCKET.into(),
        bucket_name: settings.bucket_name.clone(),
        block_public_access: true,
        cors_rules: vec![CorsRule::read_from_any_origin()],
        auto_delete_objects: settings.auto_delete_objects,
    };
    aws_s3::config(&mut bucket, &mut stack, &mut core);
    let bucket_id = output(&core, "aws_s3", aws_s3::outputs::LOGICAL_BUCKET_NAME);

    core.set_current_module("s3_origin_distribution");
    let mut distribution = aws_cloudfront_distribution::Input {
        resource_name: logical_ids::DISTRIBUTION.into(),
        viewer_protocol_policy: ViewerProtocolPolicy::HttpsOnly,
        allowed_methods: AllowedMethods::GetHeadOptions,
        cached_methods: CachedMethods::GetHeadOptions,
        compress: true,
        cache_policy_id: Some(managed_policies::CACHING_OPTIMIZED.into()),
        origin_request_policy_id: Some(managed_policies::CORS_S3_ORIGIN.into()),
        response_headers_policy_id: Some(managed_policies::CORS_WITH_PREFLIGHT.into()),
        error_responses: vec![
            CustomErrorResponse::page(403, "/errors/403.json", ERROR_PAGE_TTL_SECONDS),
            CustomErrorResponse::page(404, "/errors/404.json", ERROR_PAGE_TTL_SECONDS),
        ],
        http_version: HttpVersion::Http2And3,
        price_class: PriceClass::PriceClass200,
        ipv6_enabled: true,
        ..Default::default()
    };
    let mut origin = s3_origin_distribution::Input {
        logical_bucket_name: bucket_id.clone(),
        oac_resource_name: logical_ids::OAC.into(),
        oac_name: settings.oac_name.clone(),
        ..Default::default()
    };
    s3_origin_distribution::config(&mut origin, &mut distribution, &mut stack, &mut core);
    aws_cloudfront_distribution::config(&mut distribution, &mut stack, &mut core);
    let distribution_id = output(
        &core,
        "s3_origin_distribution",
        s3_origin_distribution::outputs::LOGICAL_DISTR_NAME,
    );

    core.set_current_module("bucket_policy");
    let mut policy = bucket_policy::Input {
        resource_name: logical_ids::BUCKET_POLICY.into(),
        logical_bucket_name: bucket_id.clone(),
        statements: vec![bucket_policy::cloudfront_read_statement(&bucket_id, &distribution_id)],
    };
    bucket_policy::config(&mut policy, &mut stack, &mut core);

    core.set_current_module("aws_lambda");
    let mut function = aws_lambda::Input {
        resource_name: logical_ids::FUNCTION.into(),
        function_name: settings.function_name.clone(),
        timeout: settings.function_timeout,
        memory_size: 128,
        environment: vec![("DISTRIBUTION_ID".into(), get_ref(&distribution_id))],
        policy_statements: vec![
            PolicyStatement::allow(&["cloudfront:CreateInvalidation"])
                .on_resources(vec![bucket_policy::distribution_arn(&distribution_id)]),
        ],
        s3_event_source: Some(S3EventSource::new(&bucket_id)),
        ..Default::default()
    };
    aws_lambda::config(&mut function, &mut stack, &mut core);
    let function_id = output(&core, "aws_lambda", aws_lambda::outputs::LOGICAL_FUNCTION_NAME);
    let artifact_bucket_param =
        output(&core, "aws_lambda", aws_lambda::outputs::ARTIFACT_BUCKET_PARAM);
    let artifact_key_param = output(&core, "aws_lambda", aws_lambda::outputs::ARTIFACT_KEY_PARAM);

    stack.add_output(
        stack_outputs::DISTRIBUTION_ID,
        "id of the distribution",
        get_ref(&distribution_id),
    );
    stack.add_output(
        stack_outputs::DISTRIBUTION_DOMAIN_NAME,
        "domain the distribution serves the bucket on",
        get_att(&distribution_id, "DomainName"),
    );
    stack.add_output(stack_outputs::BUCKET_NAME, "name of the origin bucket", get_ref(&bucket_id));
    stack.add_output(
        stack_outputs::FUNCTION_NAME,
        "name of the invalidation function",
        get_ref(&function_id),
    );

    let stack = aws_cfn_stack::synth(&stack, &mut core)?;
    Ok(StackDefinition { stack, artifact_bucket_param, artifact_key_param })
}

use aws_cfn_stack::{logical_suffix, CfnResource, Resource};
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

pub mod s3_origin_distribution;

pub mod outputs {
    /// logical id of the distribution. `Ref` gives the distribution id,
    /// `Fn::GetAtt [id, DomainName]` its `*.cloudfront.net` domain.
    pub const LOGICAL_DISTR_NAME: &str = "LOGICAL_DISTR_NAME";
}

/// ids of policies that AWS manages. see the "using managed cache policies"
/// page of the CloudFront developer guide.
pub mod managed_policies {
    /// cache policy.
    pub const CACHING_OPTIMIZED: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";
    /// response headers policy allowing all origins, including preflight requests.
    pub const CORS_WITH_PREFLIGHT: &str = "5cc3b908-e619-4b99-88e5-2cf7f45965bd";
    /// origin request policy forwarding the CORS headers S3 needs.
    pub const CORS_S3_ORIGIN: &str = "88a5eaf4-2fd4-4709-b370-b4c650ea3fcf";
}

/// http status codes CloudFront lets you customize the response for.
pub const CUSTOMIZABLE_ERROR_CODES: &[u16] =
    &[400, 403, 404, 405, 414, 416, 500, 501, 502, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewerProtocolPolicy {
    #[serde(rename = "allow-all")]
    AllowAll,
    #[serde(rename = "https-only")]
    HttpsOnly,
    #[serde(rename = "redirect-to-https")]
    RedirectToHttps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OriginProtocolPolicy {
    #[serde(rename = "http-only")]
    HttpOnly,
    #[serde(rename = "https-only")]
    HttpsOnly,
    #[serde(rename = "match-viewer")]
    MatchViewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HttpVersion {
    #[serde(rename = "http1.1")]
    Http1_1,
    #[serde(rename = "http2")]
    Http2,
    #[serde(rename = "http3")]
    Http3,
    #[serde(rename = "http2and3")]
    Http2And3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceClass {
    #[serde(rename = "PriceClass_100")]
    PriceClass100,
    #[serde(rename = "PriceClass_200")]
    PriceClass200,
    #[serde(rename = "PriceClass_All")]
    PriceClassAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Options,
    Put,
    Post,
    Patch,
    Delete,
}

/// the method sets CloudFront accepts for a cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(&self) -> Vec<Method> {
        match self {
            AllowedMethods::GetHead => vec![Method::Get, Method::Head],
            AllowedMethods::GetHeadOptions => vec![Method::Get, Method::Head, Method::Options],
            AllowedMethods::All => vec![
                Method::Get, Method::Head, Method::Options, Method::Put,
                Method::Post, Method::Patch, Method::Delete,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedMethods {
    GetHead,
    GetHeadOptions,
}

impl CachedMethods {
    pub fn methods(&self) -> Vec<Method> {
        match self {
            CachedMethods::GetHead => vec![Method::Get, Method::Head],
            CachedMethods::GetHeadOptions => vec![Method::Get, Method::Head, Method::Options],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3OriginConfig {
    /// must be empty when the origin uses an origin access control.
    pub origin_access_identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomOriginConfig {
    pub origin_protocol_policy: OriginProtocolPolicy,
    #[serde(rename = "HTTPPort", skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    #[serde(rename = "HTTPSPort", skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Origin {
    pub id: String,
    pub domain_name: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_origin_config: Option<S3OriginConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_origin_config: Option<CustomOriginConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_access_control_id: Option<Value>,
}

impl Origin {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("Origin id must not be empty".to_string());
        }
        if self.s3_origin_config.is_some() == self.custom_origin_config.is_some() {
            return Err(format!(
                "Origin {} must have exactly one of an S3 or a custom origin config",
                self.id
            ));
        }
        if let (Some(s3), Some(_)) = (&self.s3_origin_config, &self.origin_access_control_id) {
            if !s3.origin_access_identity.is_empty() {
                return Err(format!(
                    "Origin {} has both an origin access identity and an origin access control\n\
                    The origin access identity must be empty",
                    self.id
                ));
            }
        }
        if self.custom_origin_config.is_some() && self.origin_access_control_id.is_some() {
            return Err(format!(
                "Origin {} is not an S3 origin and cannot use an origin access control",
                self.id
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefaultCacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub allowed_methods: Vec<Method>,
    pub cached_methods: Vec<Method>,
    pub compress: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_request_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers_policy_id: Option<String>,
}

/// replaces the error CloudFront returns for `error_code` with a cached page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomErrorResponse {
    pub error_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_page_path: Option<String>,
    #[serde(rename = "ErrorCachingMinTTL", skip_serializing_if = "Option::is_none")]
    pub error_caching_min_ttl: Option<u64>,
}

impl CustomErrorResponse {
    /// serve `page_path` with the original status, cached for `ttl_seconds`.
    pub fn page(error_code: u16, page_path: &str, ttl_seconds: u64) -> Self {
        Self {
            error_code,
            response_code: Some(error_code),
            response_page_path: Some(page_path.to_string()),
            error_caching_min_ttl: Some(ttl_seconds),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !CUSTOMIZABLE_ERROR_CODES.contains(&self.error_code) {
            return Err(format!(
                "Invalid error code {}\nMust be one of {:?}",
                self.error_code, CUSTOMIZABLE_ERROR_CODES
            ));
        }
        if let Some(code) = self.response_code {
            if code != 200 && !CUSTOMIZABLE_ERROR_CODES.contains(&code) {
                return Err(format!(
                    "Invalid response code {}\nMust be 200 or one of {:?}",
                    code, CUSTOMIZABLE_ERROR_CODES
                ));
            }
        }
        match (&self.response_page_path, self.response_code) {
            (Some(path), Some(_)) if !path.starts_with('/') => {
                Err(format!("Invalid response page path {:?}\nMust start with '/'", path))
            }
            (Some(_), None) | (None, Some(_)) => {
                Err(format!(
                    "Error response for {} needs both a response code and a page path",
                    self.error_code
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DistributionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub enabled: bool,
    pub origins: Vec<Origin>,
    pub default_cache_behavior: DefaultCacheBehavior,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_error_responses: Vec<CustomErrorResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_root_object: Option<String>,
    pub http_version: HttpVersion,
    pub price_class: PriceClass,
    #[serde(rename = "IPV6Enabled")]
    pub ipv6_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CfnDistribution {
    pub distribution_config: DistributionConfig,
}

impl CfnResource for CfnDistribution {
    fn type_string(&self) -> &'static str {
        "AWS::CloudFront::Distribution"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        let config = &self.distribution_config;
        if config.origins.is_empty() {
            return Err("Distribution must have at least one origin".to_string());
        }
        for origin in config.origins.iter() {
            origin.validate()?;
        }
        let target = &config.default_cache_behavior.target_origin_id;
        if !config.origins.iter().any(|o| &o.id == target) {
            return Err(format!("Default cache behavior targets unknown origin {:?}", target));
        }
        let behavior = &config.default_cache_behavior;
        let not_allowed =
            behavior.cached_methods.iter().find(|m| !behavior.allowed_methods.contains(m));
        if let Some(m) = not_allowed {
            return Err(format!("Cached method {:?} is not an allowed method", m));
        }
        let mut seen = vec![];
        for response in config.custom_error_responses.iter() {
            response.validate()?;
            if seen.contains(&response.error_code) {
                return Err(format!(
                    "Error code {} has more than one custom response",
                    response.error_code
                ));
            }
            seen.push(response.error_code);
        }
        if let Some(comment) = &config.comment {
            if comment.len() > 128 {
                return Err("Distribution comment must be at most 128 characters".to_string());
            }
        }
        Ok(())
    }
}

/// how the distribution reaches its default origin.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginKind {
    /// a bucket's REST endpoint. leave both fields empty for a public bucket.
    S3 {
        origin_access_identity: String,
        origin_access_control_id: Option<Value>,
    },
    Custom {
        protocol_policy: OriginProtocolPolicy,
    },
}

pub struct Input {
    /// logical name of the distribution. by default `Distribution{users_module_name}`.
    pub resource_name: String,

    /// by default we create the distribution enabled and ready to use.
    /// optionally set this field to true to create the distribution
    /// but have it be disabled at first.
    pub disabled: bool,
    pub comment: String,

    /// By default set to allow-all.
    pub viewer_protocol_policy: ViewerProtocolPolicy,

    /// the domain name of your default origin. For an S3 bucket origin this should be
    /// the bucket's `RegionalDomainName` attribute.
    pub default_origin_domain_name: Value,

    /// by default a custom origin reached over http only.
    pub default_origin_kind: OriginKind,

    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    pub compress: bool,

    /// by default the managed caching optimized policy.
    pub cache_policy_id: Option<String>,
    pub origin_request_policy_id: Option<String>,
    pub response_headers_policy_id: Option<String>,

    /// custom error responses, rendered in this order.
    pub error_responses: Vec<CustomErrorResponse>,
    pub default_root_object: String,

    pub http_version: HttpVersion,
    pub price_class: PriceClass,
    pub ipv6_enabled: bool,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            resource_name: "UNDEFINED_RESOURCE".into(),
            disabled: false,
            comment: String::new(),
            viewer_protocol_policy: ViewerProtocolPolicy::AllowAll,
            default_origin_domain_name: Value::Null,
            default_origin_kind: OriginKind::Custom {
                protocol_policy: OriginProtocolPolicy::HttpOnly,
            },
            allowed_methods: AllowedMethods::GetHead,
            cached_methods: CachedMethods::GetHead,
            compress: true,
            cache_policy_id: Some(managed_policies::CACHING_OPTIMIZED.to_string()),
            origin_request_policy_id: None,
            response_headers_policy_id: None,
            error_responses: vec![],
            default_root_object: String::new(),
            http_version: HttpVersion::Http2,
            price_class: PriceClass::PriceClassAll,
            ipv6_enabled: true,
        }
    }
}

impl Input {
    const DEFAULT_ORIGIN_ID: &'static str = "origin0";

    pub fn set_names(&mut self, users_mod_name: &str) {
        if self.resource_name == "UNDEFINED_RESOURCE" {
            self.resource_name = format!("Distribution{}", logical_suffix(users_mod_name));
        }
    }

    fn default_origin(&self) -> Origin {
        let (s3_origin_config, custom_origin_config, origin_access_control_id) =
            match &self.default_origin_kind {
                OriginKind::S3 { origin_access_identity, origin_access_control_id } => (
                    Some(S3OriginConfig { origin_access_identity: origin_access_identity.clone() }),
                    None,
                    origin_access_control_id.clone(),
                ),
                OriginKind::Custom { protocol_policy } => (
                    None,
                    Some(CustomOriginConfig {
                        origin_protocol_policy: *protocol_policy,
                        http_port: None,
                        https_port: None,
                    }),
                    None,
                ),
            };
        Origin {
            id: Self::DEFAULT_ORIGIN_ID.to_string(),
            domain_name: self.default_origin_domain_name.clone(),
            s3_origin_config,
            custom_origin_config,
            origin_access_control_id,
        }
    }

    pub fn output_cfn(&self) -> CfnDistribution {
        let non_empty = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        CfnDistribution {
            distribution_config: DistributionConfig {
                comment: non_empty(&self.comment),
                enabled: !self.disabled,
                // TODO: allow users adding origins and additional cache behaviors
                origins: vec![self.default_origin()],
                default_cache_behavior: DefaultCacheBehavior {
                    target_origin_id: Self::DEFAULT_ORIGIN_ID.to_string(),
                    viewer_protocol_policy: self.viewer_protocol_policy,
                    allowed_methods: self.allowed_methods.methods(),
                    cached_methods: self.cached_methods.methods(),
                    compress: self.compress,
                    cache_policy_id: self.cache_policy_id.clone(),
                    origin_request_policy_id: self.origin_request_policy_id.clone(),
                    response_headers_policy_id: self.response_headers_policy_id.clone(),
                },
                custom_error_responses: self.error_responses.clone(),
                default_root_object: non_empty(&self.default_root_object),
                http_version: self.http_version,
                price_class: self.price_class,
                ipv6_enabled: self.ipv6_enabled,
            },
        }
    }
}

pub fn config(myinput: &mut Input, stackinp: &mut aws_cfn_stack::Input, l0core: &mut L0Core) {
    let user_mod_name = l0core.users_module_name();
    myinput.set_names(&user_mod_name);
    if let Some(err) = aws_cfn_stack::verify_resource_name(&myinput.resource_name) {
        l0core.config_error(&err);
        return;
    }
    if myinput.default_origin_domain_name.is_null() {
        l0core.config_error("Distribution requires a default origin domain name");
        return;
    }
    let distribution = myinput.output_cfn();
    if let Err(err) = distribution.validate() {
        l0core.config_error(&err);
        return;
    }
    let logical_distr_name = myinput.resource_name.clone();
    stackinp.resources.push(Resource::new(logical_distr_name.clone(), distribution));
    l0core.set_output(outputs::LOGICAL_DISTR_NAME, &logical_distr_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_cfn_stack::get_att;
    use serde_json::json;

    fn s3_input() -> Input {
        Input {
            resource_name: "Dist".into(),
            default_origin_domain_name: get_att("Bucket", "RegionalDomainName"),
            default_origin_kind: OriginKind::S3 {
                origin_access_identity: String::new(),
                origin_access_control_id: Some(get_att("Oac", "Id")),
            },
            ..Default::default()
        }
    }

    #[test]
    fn renders_distribution_config() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        core.set_current_module("aws_cloudfront_distribution");
        let mut inp = Input {
            viewer_protocol_policy: ViewerProtocolPolicy::HttpsOnly,
            allowed_methods: AllowedMethods::GetHeadOptions,
            cached_methods: CachedMethods::GetHeadOptions,
            http_version: HttpVersion::Http2And3,
            price_class: PriceClass::PriceClass200,
            error_responses: vec![CustomErrorResponse::page(404, "/errors/404.json", 300)],
            ..s3_input()
        };
        config(&mut inp, &mut stack, &mut core);
        assert!(!core.has_errors(), "{:?}", core.errors());
        assert_eq!(
            core.get_output("aws_cloudfront_distribution", outputs::LOGICAL_DISTR_NAME),
            Some("Dist")
        );
        let props = stack.resources[0].properties.properties().unwrap();
        let config = &props["DistributionConfig"];
        assert_eq!(config["Enabled"], true);
        assert_eq!(config["IPV6Enabled"], true);
        assert_eq!(config["HttpVersion"], "http2and3");
        assert_eq!(config["PriceClass"], "PriceClass_200");
        assert!(config.get("Comment").is_none());
        assert_eq!(config["Origins"], json!([{
            "Id": "origin0",
            "DomainName": {"Fn::GetAtt": ["Bucket", "RegionalDomainName"]},
            "S3OriginConfig": {"OriginAccessIdentity": ""},
            "OriginAccessControlId": {"Fn::GetAtt": ["Oac", "Id"]},
        }]));
        assert_eq!(config["DefaultCacheBehavior"], json!({
            "TargetOriginId": "origin0",
            "ViewerProtocolPolicy": "https-only",
            "AllowedMethods": ["GET", "HEAD", "OPTIONS"],
            "CachedMethods": ["GET", "HEAD", "OPTIONS"],
            "Compress": true,
            "CachePolicyId": "658327ea-f89d-4fab-a63d-7e88639e58f6",
        }));
        assert_eq!(config["CustomErrorResponses"], json!([{
            "ErrorCode": 404,
            "ResponseCode": 404,
            "ResponsePagePath": "/errors/404.json",
            "ErrorCachingMinTTL": 300,
        }]));
    }

    #[test]
    fn oac_and_oai_are_exclusive() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        let mut inp = Input {
            default_origin_kind: OriginKind::S3 {
                origin_access_identity: "origin-access-identity/cloudfront/E123".into(),
                origin_access_control_id: Some(get_att("Oac", "Id")),
            },
            ..s3_input()
        };
        config(&mut inp, &mut stack, &mut core);
        assert!(core.errors()[0].contains("The origin access identity must be empty"));
        assert!(stack.resources.is_empty());
    }

    #[test]
    fn error_responses_are_validated() {
        assert!(CustomErrorResponse::page(403, "/errors/403.json", 300).validate().is_ok());
        assert!(CustomErrorResponse::page(418, "/errors/418.json", 300).validate().is_err());
        let relative = CustomErrorResponse::page(404, "errors/404.json", 300);
        assert!(relative.validate().unwrap_err().contains("Must start with '/'"));
        let no_page = CustomErrorResponse {
            response_page_path: None,
            ..CustomErrorResponse::page(404, "/x", 10)
        };
        assert!(no_page.validate().is_err());
        let ttl_only = CustomErrorResponse {
            error_code: 503,
            response_code: None,
            response_page_path: None,
            error_caching_min_ttl: Some(0),
        };
        assert!(ttl_only.validate().is_ok());

        let mut dist = s3_input().output_cfn();
        dist.distribution_config.custom_error_responses = vec![
            CustomErrorResponse::page(404, "/a", 1),
            CustomErrorResponse::page(404, "/b", 1),
        ];
        assert!(dist.validate().unwrap_err().contains("more than one custom response"));
    }

    #[test]
    fn cached_methods_must_be_allowed() {
        let inp = Input {
            allowed_methods: AllowedMethods::GetHead,
            cached_methods: CachedMethods::GetHeadOptions,
            ..s3_input()
        };
        assert!(inp.output_cfn().validate().unwrap_err().contains("not an allowed method"));
    }

    #[test]
    fn missing_origin_domain_is_reported() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("cdn_demo");
        config(&mut Input::default(), &mut stack, &mut core);
        assert!(core.has_errors());
        assert!(stack.resources.is_empty());
    }
}

//! Invoke a function from S3 bucket notifications.
//!
//! Declaring the notification on the bucket itself makes the bucket depend on
//! the function. When the function in turn references something that depends
//! on the bucket (eg: a distribution in front of it) the template has a cycle.
//! Instead the notification is applied by a custom resource created after both
//! the bucket and the function exist.

use aws_cfn_stack::iam::CfnRole;
use aws_cfn_stack::policy::PolicyStatement;
use aws_cfn_stack::{get_att, get_ref, CfnResource, Resource};
use serde::Serialize;
use serde_json::Value;
use stack_lib::L0Core;

use crate::{inline_python_function, CfnPermission};

pub const OBJECT_CREATED: &str = "s3:ObjectCreated:*";

const NOTIFICATIONS_HANDLER_SOURCE: &str = r#"
import boto3
import cfnresponse

s3 = boto3.client('s3')

def handler(event, context):
    props = event['ResourceProperties']
    physical_id = props['BucketName'] + '-notifications'
    if event['RequestType'] == 'Delete':
        # a delete for an id we did not hand out is the cleanup of a
        # replaced resource, the bucket still has to notify.
        removing = event.get('PhysicalResourceId') == physical_id
        physical_id = event.get('PhysicalResourceId', physical_id)
    try:
        if event['RequestType'] != 'Delete':
            s3.put_bucket_notification_configuration(
                Bucket=props['BucketName'],
                NotificationConfiguration=props['NotificationConfiguration'],
            )
        elif removing:
            s3.put_bucket_notification_configuration(
                Bucket=props['BucketName'],
                NotificationConfiguration={},
            )
        cfnresponse.send(event, context, cfnresponse.SUCCESS, {}, physicalResourceId=physical_id)
    except Exception as e:
        print(e)
        cfnresponse.send(event, context, cfnresponse.FAILED, {}, physicalResourceId=physical_id)
"#;

pub struct S3EventSource {
    /// logical id of the bucket whose events invoke the function.
    pub logical_bucket_name: String,
    /// defaults to every object created event.
    pub events: Vec<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl S3EventSource {
    pub fn new(logical_bucket_name: &str) -> Self {
        Self {
            logical_bucket_name: logical_bucket_name.to_string(),
            events: vec![OBJECT_CREATED.to_string()],
            prefix: None,
            suffix: None,
        }
    }

    pub fn is_valid(&self) -> Option<String> {
        if self.logical_bucket_name.is_empty() {
            return Some("S3 event source requires the logical id of a bucket".to_string());
        }
        if self.events.is_empty() {
            return Some("S3 event source requires at least one event".to_string());
        }
        if let Some(bad) = self.events.iter().find(|e| !e.starts_with("s3:")) {
            return Some(format!("Invalid S3 event {:?}\nMust start with 's3:'", bad));
        }
        None
    }

    fn filter(&self) -> Option<NotificationFilter> {
        let mut filter_rules = vec![];
        if let Some(prefix) = &self.prefix {
            filter_rules.push(FilterRule { name: "prefix".to_string(), value: prefix.clone() });
        }
        if let Some(suffix) = &self.suffix {
            filter_rules.push(FilterRule { name: "suffix".to_string(), value: suffix.clone() });
        }
        if filter_rules.is_empty() {
            return None;
        }
        Some(NotificationFilter { key: KeyFilter { filter_rules } })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterRule {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyFilter {
    pub filter_rules: Vec<FilterRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationFilter {
    pub key: KeyFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LambdaFunctionConfiguration {
    pub events: Vec<String>,
    pub lambda_function_arn: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<NotificationFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationConfiguration {
    pub lambda_function_configurations: Vec<LambdaFunctionConfiguration>,
}

/// custom resource that replaces the bucket's notification configuration
/// on create/update and clears it on delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketNotifications {
    pub service_token: Value,
    pub bucket_name: Value,
    pub notification_configuration: NotificationConfiguration,
}

impl CfnResource for BucketNotifications {
    fn type_string(&self) -> &'static str {
        "Custom::S3BucketNotifications"
    }
    fn properties(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
    fn validate(&self) -> Result<(), String> {
        if self.notification_configuration.lambda_function_configurations.is_empty() {
            return Err(
                "Bucket notifications require at least one function configuration".to_string(),
            );
        }
        Ok(())
    }
}

pub fn config(
    source: &S3EventSource,
    function_logical_id: &str,
    stackinp: &mut aws_cfn_stack::Input,
    l0core: &mut L0Core,
) {
    if let Some(err) = source.is_valid() {
        l0core.config_error(&err);
        return;
    }
    let bucket = &source.logical_bucket_name;
    let permission_name = format!("Permission{function_logical_id}");
    let role_name = format!("NotificationsRole{function_logical_id}");
    let handler_name = format!("NotificationsHandler{function_logical_id}");
    let notifications_name = format!("Notifications{function_logical_id}");

    let permission = CfnPermission {
        action: "lambda:InvokeFunction".to_string(),
        function_name: get_ref(function_logical_id),
        principal: "s3.amazonaws.com".to_string(),
        source_arn: Some(get_att(bucket, "Arn")),
        source_account: Some(get_ref("AWS::AccountId")),
    };

    let role = CfnRole::for_lambda(
        &format!("applies bucket notifications for {function_logical_id}"),
        &format!("{notifications_name}-policy"),
        vec![PolicyStatement::allow(&["s3:PutBucketNotification"])
            .on_resources(vec![get_att(bucket, "Arn")])],
    );
    let handler = inline_python_function(
        &format!("applies bucket notifications for {function_logical_id}"),
        &role_name,
        NOTIFICATIONS_HANDLER_SOURCE,
        60,
    );
    let notifications = BucketNotifications {
        service_token: get_att(&handler_name, "Arn"),
        bucket_name: get_ref(bucket),
        notification_configuration: NotificationConfiguration {
            lambda_function_configurations: vec![LambdaFunctionConfiguration {
                events: source.events.clone(),
                lambda_function_arn: get_att(function_logical_id, "Arn"),
                filter: source.filter(),
            }],
        },
    };

    stackinp.resources.push(Resource::new(permission_name.clone(), permission));
    stackinp.resources.push(Resource::new(role_name, role));
    stackinp.resources.push(Resource::new(handler_name, handler));
    // S3 checks that it may invoke the function when the configuration is applied.
    stackinp
        .resources
        .push(Resource::new(notifications_name, notifications).depends_on(permission_name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_source_listens_for_created_objects() {
        let source = S3EventSource::new("Bucket");
        assert_eq!(source.events, vec!["s3:ObjectCreated:*"]);
        assert!(source.is_valid().is_none());
        assert!(source.filter().is_none());
        let bad =
            S3EventSource { events: vec!["ObjectCreated".into()], ..S3EventSource::new("Bucket") };
        assert!(bad.is_valid().unwrap().contains("Must start with 's3:'"));
    }

    #[test]
    fn config_wires_permission_and_notifications() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("invalidator");
        let source = S3EventSource { suffix: Some(".json".into()), ..S3EventSource::new("Bucket") };
        config(&source, "Fn", &mut stack, &mut core);
        assert!(!core.has_errors());
        let names: Vec<&str> = stack.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["PermissionFn", "NotificationsRoleFn", "NotificationsHandlerFn", "NotificationsFn"]
        );

        let permission = stack.resources[0].properties.properties().unwrap();
        assert_eq!(permission, json!({
            "Action": "lambda:InvokeFunction",
            "FunctionName": {"Ref": "Fn"},
            "Principal": "s3.amazonaws.com",
            "SourceArn": {"Fn::GetAtt": ["Bucket", "Arn"]},
            "SourceAccount": {"Ref": "AWS::AccountId"},
        }));

        let notifications = &stack.resources[3];
        assert_eq!(notifications.depends_on, vec!["PermissionFn"]);
        assert_eq!(notifications.properties.type_string(), "Custom::S3BucketNotifications");
        let props = notifications.properties.properties().unwrap();
        assert_eq!(props["BucketName"], json!({"Ref": "Bucket"}));
        assert_eq!(props["ServiceToken"], json!({"Fn::GetAtt": ["NotificationsHandlerFn", "Arn"]}));
        assert_eq!(props["NotificationConfiguration"]["LambdaFunctionConfigurations"][0], json!({
            "Events": ["s3:ObjectCreated:*"],
            "LambdaFunctionArn": {"Fn::GetAtt": ["Fn", "Arn"]},
            "Filter": {"Key": {"FilterRules": [{"Name": "suffix", "Value": ".json"}]}},
        }));
        for r in stack.resources.iter() {
            r.properties.validate().unwrap();
        }
    }

    #[test]
    fn handler_reports_the_same_physical_id_on_every_request() {
        let sends: Vec<&str> = NOTIFICATIONS_HANDLER_SOURCE
            .lines()
            .filter(|l| l.contains("cfnresponse.send("))
            .collect();
        assert_eq!(sends.len(), 2);
        for send in sends {
            assert!(send.contains("physicalResourceId=physical_id"), "{send}");
        }
        let stable_id = "physical_id = props['BucketName'] + '-notifications'";
        assert!(NOTIFICATIONS_HANDLER_SOURCE.contains(stable_id));
        assert!(!NOTIFICATIONS_HANDLER_SOURCE.contains("log_stream_name"));
    }

    #[test]
    fn handler_only_clears_notifications_it_owns() {
        let clear = NOTIFICATIONS_HANDLER_SOURCE.find("NotificationConfiguration={}").unwrap();
        let guard = NOTIFICATIONS_HANDLER_SOURCE.find("elif removing:").unwrap();
        assert!(guard < clear);
    }

    #[test]
    fn invalid_source_adds_nothing() {
        let mut stack = aws_cfn_stack::Input::default();
        let mut core = L0Core::new("invalidator");
        let source = S3EventSource { events: vec![], ..S3EventSource::new("Bucket") };
        config(&source, "Fn", &mut stack, &mut core);
        assert!(core.has_errors());
        assert!(stack.resources.is_empty());
    }
}

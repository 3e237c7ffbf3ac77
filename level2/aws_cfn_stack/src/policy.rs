//! IAM policy documents, as embedded in bucket policies and role policies.

use serde::Serialize;
use serde_json::{Map, Value};

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: vec![],
            condition: None,
        }
    }

    pub fn on_resources(mut self, resources: Vec<Value>) -> Self {
        self.resource = resources;
        self
    }

    /// `"Principal": { "Service": "<service>" }`
    pub fn with_service_principal(mut self, service: &str) -> Self {
        let mut principal = Map::new();
        principal.insert("Service".to_string(), Value::String(service.to_string()));
        self.principal = Some(Value::Object(principal));
        self
    }

    /// adds `"Condition": { "<operator>": { "<key>": <value> } }`, merging with
    /// any existing conditions.
    pub fn with_condition(mut self, operator: &str, key: &str, value: Value) -> Self {
        let mut conditions = match self.condition.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let entry = conditions
            .entry(operator.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(op_map) = entry {
            op_map.insert(key.to_string(), value);
        }
        self.condition = Some(Value::Object(conditions));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self { version: POLICY_VERSION.to_string(), statement }
    }
}

/// a trust policy letting `service` (eg: lambda.amazonaws.com) assume a role.
pub fn assume_role_policy_doc(service: &str) -> PolicyDocument {
    PolicyDocument::new(vec![
        PolicyStatement::allow(&["sts:AssumeRole"]).with_service_principal(service),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conditions_merge_under_operator() {
        let statement = PolicyStatement::allow(&["s3:GetObject"])
            .with_service_principal("cloudfront.amazonaws.com")
            .on_resources(vec![json!("arn:aws:s3:::bucket/*")])
            .with_condition("StringEquals", "AWS:SourceArn", json!("arn:1"))
            .with_condition("StringEquals", "AWS:SourceAccount", json!("123"));
        let doc = serde_json::to_value(PolicyDocument::new(vec![statement])).unwrap();
        assert_eq!(doc, json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Service": "cloudfront.amazonaws.com"},
                "Action": ["s3:GetObject"],
                "Resource": ["arn:aws:s3:::bucket/*"],
                "Condition": {"StringEquals": {
                    "AWS:SourceArn": "arn:1",
                    "AWS:SourceAccount": "123",
                }},
            }]
        }));
    }

    #[test]
    fn assume_role_has_no_resource() {
        let doc = serde_json::to_value(assume_role_policy_doc("lambda.amazonaws.com")).unwrap();
        assert_eq!(doc["Statement"][0]["Action"], json!(["sts:AssumeRole"]));
        assert!(doc["Statement"][0].get("Resource").is_none());
    }
}

//! Helpers for CloudFormation intrinsic functions, and for discovering which
//! logical ids a property value references through them.

use std::collections::BTreeSet;

use serde_json::{json, Value};

/// `{ "Ref": "<logical_id>" }`
pub fn get_ref(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": ["<logical_id>", "<attribute>"] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Sub": "<template>" }`, eg: `sub("arn:aws:s3:::${MyBucket}/*")`
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// pseudo parameters such as `AWS::AccountId` are always resolvable.
pub fn is_pseudo_parameter(name: &str) -> bool {
    name.starts_with("AWS::")
}

/// the variable names used in an `Fn::Sub` template string.
/// `${!Literal}` is an escape and is skipped. for `${Res.Attr}` only `Res` is returned.
pub fn sub_variables(template: &str) -> Vec<String> {
    let mut out = vec![];
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(e) => e,
            None => break,
        };
        let var = &after[..end];
        if !var.starts_with('!') && !var.is_empty() {
            let name = var.split('.').next().unwrap_or(var);
            out.push(name.trim().to_string());
        }
        rest = &after[end + 1..];
    }
    out
}

/// collects every logical id (or parameter name) referenced anywhere inside `value`.
pub fn referenced_ids(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.insert(target.clone());
            }
            if let Some(att) = map.get("Fn::GetAtt") {
                match att {
                    Value::Array(parts) => {
                        if let Some(Value::String(target)) = parts.first() {
                            out.insert(target.clone());
                        }
                    }
                    Value::String(dotted) => {
                        if let Some((target, _)) = dotted.split_once('.') {
                            out.insert(target.to_string());
                        }
                    }
                    _ => {}
                }
            }
            if let Some(sub_value) = map.get("Fn::Sub") {
                match sub_value {
                    Value::String(template) => out.extend(sub_variables(template)),
                    Value::Array(parts) => {
                        // [template, { local vars }]: local vars shadow logical ids
                        let locals = parts.get(1).and_then(|v| v.as_object());
                        if let Some(Value::String(template)) = parts.first() {
                            for var in sub_variables(template) {
                                if !locals.map(|l| l.contains_key(&var)).unwrap_or(false) {
                                    out.insert(var);
                                }
                            }
                        }
                        if let Some(locals) = locals {
                            for v in locals.values() {
                                referenced_ids(v, out);
                            }
                        }
                    }
                    _ => {}
                }
            }
            for (key, v) in map.iter() {
                if key == "Fn::Sub" || key == "Fn::GetAtt" {
                    continue;
                }
                referenced_ids(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                referenced_ids(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_variables_skip_escapes_and_attributes() {
        let vars = sub_variables("arn:${AWS::Partition}:s3:::${Bucket}/*-${Fn.Arn}-${!Literal}");
        assert_eq!(vars, vec!["AWS::Partition", "Bucket", "Fn"]);
        assert!(sub_variables("no variables").is_empty());
        assert!(sub_variables("${unterminated").is_empty());
    }

    #[test]
    fn finds_refs_in_nested_values() {
        let value = json!({
            "A": get_ref("Bucket"),
            "B": [get_att("Role", "Arn"), {"Fn::GetAtt": "Dist.DomainName"}],
            "C": sub("arn:${AWS::Partition}:cloudfront::${AWS::AccountId}:distribution/${Dist}"),
            "D": {"Fn::Sub": ["${Local}-${Oac}", {"Local": get_ref("Fn")}]},
            "E": {"Fn::Join": ["", [get_ref("Param"), "x"]]},
        });
        let mut out = BTreeSet::new();
        referenced_ids(&value, &mut out);
        let got: Vec<_> = out.into_iter().filter(|x| !is_pseudo_parameter(x)).collect();
        assert_eq!(got, vec!["Bucket", "Dist", "Fn", "Oac", "Param", "Role"]);
    }
}

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use serde_yaml::value::TaggedValue;

use crate::model::Tag;

/// Placeholder returned when a template cannot be parsed at all.
pub const INVALID_TEMPLATE: &str = "Invalid template format";

/// String values in the reduced template are cut to this many characters.
pub const DEFAULT_MAX_LENGTH: usize = 50;

const STACK_ARN_PREFIX: &str = "arn:aws:cloudformation:";

/// First tag value that looks like a CloudFormation stack ARN.
///
/// Example: the `aws:cloudformation:stack-id` tag set on stack-managed resources.
pub fn find_stack_arn(tags: &[Tag]) -> Option<&str> {
    tags.iter()
        .map(|t| t.value.as_str())
        .find(|v| v.starts_with(STACK_ARN_PREFIX))
}

/// Parse a JSON or YAML template into JSON.
///
/// Short-form intrinsics (`!Ref`, `!GetAtt a.b`, `!Sub`, ...) become their
/// long form so the result can be handled as plain JSON.
pub fn parse_template(body: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(body).ok()?;
    Some(yaml_to_json(yaml))
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    other => match yaml_to_json(other) {
                        Value::String(s) => s,
                        v => v.to_string(),
                    },
                };
                map.insert(key, yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => intrinsic(*tagged),
    }
}

fn intrinsic(tagged: TaggedValue) -> Value {
    let tag = tagged.tag.to_string();
    let name = tag.trim_start_matches('!');
    let key = if name == "Ref" || name == "Condition" {
        name.to_string()
    } else {
        format!("Fn::{name}")
    };
    let value = match (name, tagged.value) {
        ("GetAtt", serde_yaml::Value::String(s)) => match s.split_once('.') {
            Some((resource, attribute)) => Value::Array(vec![resource.into(), attribute.into()]),
            None => Value::String(s),
        },
        (_, other) => yaml_to_json(other),
    };
    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

/// Resources whose `Type` is one of the given root-cause types.
pub fn filter_resources(template: &Value, types: &BTreeSet<String>) -> Map<String, Value> {
    template
        .get("Resources")
        .and_then(Value::as_object)
        .map(|resources| {
            resources
                .iter()
                .filter(|(_, r)| r.get("Type").and_then(Value::as_str).is_some_and(|t| types.contains(t)))
                .map(|(id, r)| (id.clone(), r.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Cut every string in the document to `max_length` characters.
pub fn truncate_values(value: Value, max_length: usize) -> Value {
    match value {
        Value::String(s) => Value::String(s.chars().take(max_length).collect()),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| truncate_values(v, max_length)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, truncate_values(v, max_length)))
                .collect(),
        ),
        other => other,
    }
}

/// Reduce a template to what the prompt needs.
///
/// When root-cause types match template resources, only those resources are
/// returned, pretty printed. Otherwise the whole template is returned with
/// truncated strings, minified.
pub fn reduce_template(
    body: &str,
    root_cause_types: &BTreeSet<String>,
    max_length: usize,
) -> String {
    let Some(template) = parse_template(body) else {
        return INVALID_TEMPLATE.to_string();
    };

    if !root_cause_types.is_empty() {
        let filtered = filter_resources(&template, root_cause_types);
        if !filtered.is_empty() {
            return serde_json::to_string_pretty(&Value::Object(filtered))
                .unwrap_or_else(|_| INVALID_TEMPLATE.to_string());
        }
    }

    serde_json::to_string(&truncate_values(template, max_length))
        .unwrap_or_else(|_| INVALID_TEMPLATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
AWSTemplateFormatVersion: "2010-09-09"
Description: A stack with a table and a function that reads from it
Resources:
  Orders:
    Type: AWS::DynamoDB::Table
    Properties:
      TableName: !Sub "${AWS::StackName}-orders"
  Reader:
    Type: AWS::Lambda::Function
    Properties:
      Role: !GetAtt ReaderRole.Arn
      Environment:
        Variables:
          TABLE: !Ref Orders
"#;

    fn types(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stack_arn_is_found_in_tags() {
        let tags = vec![
            Tag::new("team", "core"),
            Tag::new("aws:cloudformation:stack-id", "arn:aws:cloudformation:us-east-1:123:stack/app/1"),
        ];
        assert_eq!(find_stack_arn(&tags), Some("arn:aws:cloudformation:us-east-1:123:stack/app/1"));
        assert_eq!(find_stack_arn(&tags[..1]), None);
    }

    #[test]
    fn yaml_short_form_intrinsics_are_expanded() {
        let template = parse_template(YAML).unwrap();
        let reader = &template["Resources"]["Reader"]["Properties"];
        assert_eq!(reader["Role"], json!({"Fn::GetAtt": ["ReaderRole", "Arn"]}));
        assert_eq!(reader["Environment"]["Variables"]["TABLE"], json!({"Ref": "Orders"}));
        assert_eq!(
            template["Resources"]["Orders"]["Properties"]["TableName"],
            json!({"Fn::Sub": "${AWS::StackName}-orders"})
        );
    }

    #[test]
    fn matching_root_causes_keep_only_those_resources() {
        let reduced = reduce_template(YAML, &types(&["AWS::DynamoDB::Table"]), 50);
        let value: Value = serde_json::from_str(&reduced).unwrap();
        assert_eq!(value.as_object().map(|m| m.len()), Some(1));
        assert_eq!(value["Orders"]["Type"], "AWS::DynamoDB::Table");
        assert!(reduced.contains('\n'));
    }

    #[test]
    fn unmatched_root_causes_truncate_and_minify() {
        let reduced = reduce_template(YAML, &types(&["AWS::EC2::Instance"]), 10);
        assert!(!reduced.contains('\n'));
        let value: Value = serde_json::from_str(&reduced).unwrap();
        assert_eq!(value["Description"], "A stack wi");
        assert_eq!(value["Resources"]["Orders"]["Type"], "AWS::Dynam");
    }

    #[test]
    fn json_templates_are_accepted() {
        let body = r#"{"Resources":{"Q":{"Type":"AWS::SQS::Queue"}}}"#;
        assert_eq!(reduce_template(body, &types(&["AWS::SQS::Queue"]), 50), "{\n  \"Q\": {\n    \"Type\": \"AWS::SQS::Queue\"\n  }\n}");
        assert_eq!(reduce_template(body, &BTreeSet::new(), 50), body);
    }

    #[test]
    fn garbage_is_reported_as_invalid() {
        assert_eq!(reduce_template("Resources: [unclosed", &BTreeSet::new(), 50), INVALID_TEMPLATE);
    }
}

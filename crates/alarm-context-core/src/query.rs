use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::Dimension;

/// One `MetricDataQuery`, independent of the SDK types.
///
/// Both the image path and the numeric path derive these from a widget spec,
/// so a metric has the same identity wherever it appears.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricQuery {
    Stat {
        id: String,
        namespace: String,
        metric_name: String,
        dimensions: Vec<Dimension>,
        period: i32,
        stat: String,
        label: Option<String>,
        account_id: Option<String>,
    },
    Expression {
        id: String,
        expression: String,
        label: Option<String>,
        period: Option<i32>,
    },
}

impl MetricQuery {
    pub fn id(&self) -> &str {
        match self {
            MetricQuery::Stat { id, .. } | MetricQuery::Expression { id, .. } => id,
        }
    }

    /// The fields attached to each numeric result handed to the LLM.
    pub fn identity(&self) -> Value {
        match self {
            MetricQuery::Stat {
                namespace,
                metric_name,
                dimensions,
                ..
            } => json!({
                "namespace": namespace,
                "metric_name": metric_name,
                "dimensions": dimensions
                    .iter()
                    .map(|d| json!({"Name": d.name, "Value": d.value}))
                    .collect::<Vec<_>>(),
            }),
            MetricQuery::Expression { expression, .. } => json!({ "expression": expression }),
        }
    }
}

/// Wrap a dimension value as a Metrics Insights string literal.
///
/// Values are allow-listed rather than escaped: quotes, backslashes and
/// control characters are rejected.
pub fn insights_literal(value: &str) -> Result<String, CoreError> {
    quoted(value, '\'', "metrics insights")
}

/// Wrap a value as an X-Ray filter expression string literal.
pub fn xray_literal(value: &str) -> Result<String, CoreError> {
    quoted(value, '"', "x-ray filter")
}

/// Check a metric or dimension name used unquoted in a Metrics Insights query.
pub fn insights_identifier(value: &str) -> Result<&str, CoreError> {
    let valid = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.';
    if value.is_empty() || !value.chars().all(valid) {
        return Err(CoreError::UnsafeQueryValue {
            context: "metrics insights identifier",
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn quoted(value: &str, quote: char, context: &'static str) -> Result<String, CoreError> {
    let unsafe_char = |c: char| c == '\'' || c == '"' || c == '\\' || c.is_control();
    if value.is_empty() || value.chars().any(unsafe_char) {
        return Err(CoreError::UnsafeQueryValue {
            context,
            value: value.to_string(),
        });
    }
    Ok(format!("{quote}{value}{quote}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_quoted() {
        assert_eq!(insights_literal("prod-cluster").unwrap(), "'prod-cluster'");
        assert_eq!(xray_literal("i-0123").unwrap(), "\"i-0123\"");
    }

    #[test]
    fn rejects_quote_injection() {
        assert!(insights_literal("x' OR ClusterName = 'y").is_err());
        assert!(xray_literal("a\") OR (service(\"b").is_err());
        assert!(xray_literal("back\\slash").is_err());
        assert!(insights_literal("line\nbreak").is_err());
        assert!(insights_literal("").is_err());
    }

    #[test]
    fn identifiers_are_plain_names() {
        assert_eq!(insights_identifier("apiserver_request_total").unwrap(), "apiserver_request_total");
        assert!(insights_identifier("a) FROM x").is_err());
    }

    #[test]
    fn identity_of_stat_and_expression() {
        let stat = MetricQuery::Stat {
            id: "query1".into(),
            namespace: "AWS/EC2".into(),
            metric_name: "CPUUtilization".into(),
            dimensions: vec![Dimension::new("InstanceId", "i-1")],
            period: 60,
            stat: "Average".into(),
            label: None,
            account_id: None,
        };
        assert_eq!(stat.id(), "query1");
        assert_eq!(stat.identity()["dimensions"][0]["Value"], "i-1");

        let expr = MetricQuery::Expression {
            id: "e1".into(),
            expression: "m1/PERIOD(m1)".into(),
            label: Some("Consumed".into()),
            period: Some(60),
        };
        assert_eq!(expr.identity(), json!({"expression": "m1/PERIOD(m1)"}));
    }
}

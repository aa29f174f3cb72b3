use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Alarm message
// ---------------------------------------------------------------------------

/// The CloudWatch alarm state-change payload carried in an SNS message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmEvent {
    pub alarm_name: String,

    #[serde(default)]
    pub alarm_description: Option<String>,

    pub new_state_value: String,

    pub new_state_reason: String,

    /// ISO-8601 with offset, e.g. `2024-03-14T12:53:20.538+0000`.
    pub state_change_time: String,

    pub alarm_arn: String,

    /// Human readable region name, e.g. `US East (N. Virginia)`.
    pub region: String,

    pub trigger: Trigger,
}

/// The alarm condition. Holds either a direct metric or a `Metrics` array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Trigger {
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub metric_name: Option<String>,

    #[serde(default)]
    pub statistic: Option<String>,

    #[serde(default)]
    pub extended_statistic: Option<String>,

    #[serde(default)]
    pub dimensions: Vec<Dimension>,

    #[serde(default)]
    pub metrics: Option<Vec<TriggerMetric>>,

    #[serde(default)]
    pub period: Option<i32>,

    #[serde(default)]
    pub comparison_operator: Option<String>,

    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default)]
    pub label: Option<String>,
}

/// One entry of `Trigger.Metrics`: a metric stat or a math expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerMetric {
    pub id: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub metric_stat: Option<MetricStat>,

    #[serde(default)]
    pub return_data: Option<bool>,

    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricStat {
    pub metric: MetricIdentity,
    pub period: i32,
    pub stat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricIdentity {
    pub namespace: String,
    pub metric_name: String,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

/// A CloudWatch dimension as it appears in alarm notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tags and links
// ---------------------------------------------------------------------------

/// A resource tag, normalized across services that spell it differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A console deep link rendered as a button in the email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub title: String,
    pub url: String,
}

impl Link {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// An information panel shown under the alarm summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// HTML content of the panel body.
    pub body: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Widget images
// ---------------------------------------------------------------------------

/// Rendered output of one dashboard widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetData {
    /// PNG returned by `GetMetricWidgetImage`, attached with a Content-ID.
    Png(Vec<u8>),
    /// Inline single-value card.
    Html(String),
}

impl Serialize for WidgetData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WidgetData::Png(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            WidgetData::Html(html) => serializer.serialize_str(html),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WidgetImage {
    /// Sanitized title followed by `-{view}`.
    pub widget: String,
    pub data: WidgetData,
}

impl WidgetImage {
    /// Content-ID and attachment stem: the widget name with spaces replaced.
    pub fn content_id(&self) -> String {
        self.widget.replace(' ', "_")
    }

    pub fn is_png(&self) -> bool {
        matches!(self.data, WidgetData::Png(_))
    }
}

// ---------------------------------------------------------------------------
// HandlerResult
// ---------------------------------------------------------------------------

/// The normalized output of every namespace handler.
///
/// All eleven fields serialize even when empty so consumers can rely on a
/// fixed shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandlerResult {
    pub contextual_links: Option<String>,
    pub log_information: Option<String>,
    pub log_events: Option<Vec<Value>>,
    pub resource_information: Option<String>,
    pub resource_information_object: Option<Value>,
    pub notifications: Option<String>,
    pub widget_images: Option<Vec<WidgetImage>>,
    pub additional_metrics_with_timestamps_removed: Option<Vec<Value>>,
    pub trace_summary: Option<Value>,
    pub trace: Option<String>,
    pub tags: Option<Vec<Tag>>,
}

impl HandlerResult {
    /// The all-null result used when no handler or shape matches.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_result_has_all_eleven_keys() {
        let value = serde_json::to_value(HandlerResult::empty()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 11);
        assert!(object.values().all(Value::is_null));
        for key in [
            "contextual_links",
            "log_information",
            "log_events",
            "resource_information",
            "resource_information_object",
            "notifications",
            "widget_images",
            "additional_metrics_with_timestamps_removed",
            "trace_summary",
            "trace",
            "tags",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn parses_direct_trigger() {
        let event: AlarmEvent = serde_json::from_value(json!({
            "AlarmName": "cpu-high",
            "AlarmDescription": null,
            "NewStateValue": "ALARM",
            "NewStateReason": "Threshold Crossed",
            "StateChangeTime": "2024-03-14T12:53:20.538+0000",
            "AlarmArn": "arn:aws:cloudwatch:us-east-1:123456789012:alarm:cpu-high",
            "Region": "US East (N. Virginia)",
            "OldStateValue": "OK",
            "Trigger": {
                "MetricName": "CPUUtilization",
                "Namespace": "AWS/EC2",
                "Statistic": "AVERAGE",
                "Dimensions": [{"value": "i-0123", "name": "InstanceId"}],
                "Period": 60,
                "ComparisonOperator": "GreaterThanThreshold",
                "Threshold": 80.0
            }
        }))
        .unwrap();
        assert_eq!(event.trigger.namespace.as_deref(), Some("AWS/EC2"));
        assert_eq!(event.trigger.dimensions, vec![Dimension::new("InstanceId", "i-0123")]);
        assert!(event.alarm_description.is_none());
    }

    #[test]
    fn content_id_replaces_spaces() {
        let image = WidgetImage {
            widget: "CPU Utilization-timeSeries".into(),
            data: WidgetData::Png(vec![1, 2, 3]),
        };
        assert_eq!(image.content_id(), "CPU_Utilization-timeSeries");
        assert!(image.is_png());
        assert_eq!(serde_json::to_value(&image).unwrap()["data"], "AQID");
    }
}

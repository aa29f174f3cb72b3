use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::{Dimension, Trigger};
use crate::query::MetricQuery;

// ---------------------------------------------------------------------------
// Alarm ARN
// ---------------------------------------------------------------------------

/// `arn:partition:cloudwatch:region:account:alarm:name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmArn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource_type: String,
    pub resource_id: String,
}

impl FromStr for AlarmArn {
    type Err = CoreError;

    fn from_str(arn: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = arn.splitn(7, ':').collect();
        if parts.len() != 7 || parts[0] != "arn" || parts[3].is_empty() || parts[4].is_empty() {
            return Err(CoreError::InvalidArn(arn.to_string()));
        }
        Ok(Self {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            resource_type: parts[5].to_string(),
            resource_id: parts[6].to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

const CHART_LOOKBACK_MINUTES: i64 = 115;
const CHART_LOOKAHEAD_MINUTES: i64 = 5;
const ALARM_DATA_LOOKBACK_MINUTES: i64 = 1500;
const ENRICHMENT_LOOKBACK_MINUTES: i64 = 60;

/// Time windows derived from the alarm's state change time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmWindow {
    pub change: DateTime<Utc>,
    /// Chart start: change - 115 minutes.
    pub start: DateTime<Utc>,
    /// Chart end: change + 5 minutes.
    pub end: DateTime<Utc>,
}

impl AlarmWindow {
    pub fn new(change: DateTime<Utc>) -> Self {
        Self {
            change,
            start: change - Duration::minutes(CHART_LOOKBACK_MINUTES),
            end: change + Duration::minutes(CHART_LOOKAHEAD_MINUTES),
        }
    }

    /// Parse `StateChangeTime`, e.g. `2024-03-14T12:53:20.538+0000`.
    pub fn parse(state_change_time: &str) -> Result<Self, CoreError> {
        let parsed = DateTime::parse_from_str(state_change_time, "%Y-%m-%dT%H:%M:%S%.f%z")
            .or_else(|_| DateTime::parse_from_rfc3339(state_change_time))
            .map_err(|source| CoreError::InvalidTime {
                value: state_change_time.to_string(),
                source,
            })?;
        Ok(Self::new(parsed.with_timezone(&Utc)))
    }

    /// Vertical annotation marker for charts.
    pub fn annotation_time(&self) -> String {
        format_ms_z(self.change)
    }

    /// Example: Thursday 14 March, 2024 12:53:20 UTC
    pub fn display_change_time(&self) -> String {
        self.change.format("%A %d %B, %Y %H:%M:%S %Z").to_string()
    }

    /// Start of the 25 hour window used for the alarm's own metric data.
    pub fn alarm_data_start(&self) -> DateTime<Utc> {
        self.change - Duration::minutes(ALARM_DATA_LOOKBACK_MINUTES)
    }

    /// Start of the pre-alarm window for the numeric series of each widget.
    pub fn enrichment_start(&self) -> DateTime<Utc> {
        self.change - Duration::minutes(ENRICHMENT_LOOKBACK_MINUTES)
    }
}

/// Example: 2024-03-14T12:53:20.538Z
pub fn format_ms_z(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Console hash-route encoding of a timestamp, `:` written as `*3a`.
///
/// Example: 2024-03-14T12*3a53*3a20.538Z
pub fn format_console_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H*3a%M*3a%S%.3fZ").to_string()
}

// ---------------------------------------------------------------------------
// Statistic names
// ---------------------------------------------------------------------------

const EXTENDED_STAT_PREFIXES: &[&str] = &["p", "tc", "tm", "ts", "wm", "pr"];

/// Alarm notifications upper-case the statistic; CloudWatch APIs want the
/// canonical spelling.
pub fn correct_statistic_case(statistic: &str) -> Result<String, CoreError> {
    let folded = statistic.to_lowercase();
    let canonical = match folded.as_str() {
        "samplecount" => Some("SampleCount"),
        "average" => Some("Average"),
        "sum" => Some("Sum"),
        "minimum" => Some("Minimum"),
        "maximum" => Some("Maximum"),
        "iqm" => Some("IQM"),
        _ => None,
    };
    if let Some(canonical) = canonical {
        return Ok(canonical.to_string());
    }

    let extended = EXTENDED_STAT_PREFIXES.iter().any(|prefix| {
        folded.strip_prefix(prefix).is_some_and(|rest| {
            rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_digit() || c == '(')
        })
    });
    if extended {
        Ok(folded)
    } else {
        Err(CoreError::InvalidStatistic(statistic.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Metric array
// ---------------------------------------------------------------------------

/// One line of the alarm's own graph.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmMetricLine {
    Metric {
        id: String,
        namespace: String,
        metric_name: String,
        dimensions: Vec<Dimension>,
        statistic: String,
        period: i32,
        label: Option<String>,
    },
    Expression {
        id: String,
        expression: String,
        label: Option<String>,
    },
}

/// The metrics an alarm watches, plus the namespace/metric/statistic/
/// dimensions of the first metric, which drives handler dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricArray {
    pub namespace: String,
    pub metric_name: String,
    pub statistic: String,
    pub dimensions: Vec<Dimension>,
    pub lines: Vec<AlarmMetricLine>,
    /// True when the trigger names the metric directly rather than via `Metrics`.
    pub direct: bool,
    /// Set for direct triggers only; drawn as a horizontal annotation.
    pub threshold: Option<f64>,
}

const DEFAULT_PERIOD: i32 = 60;

/// Extract the metric array from an alarm trigger.
pub fn metric_array(trigger: &Trigger) -> Result<MetricArray, CoreError> {
    if let Some(namespace) = &trigger.namespace {
        let metric_name = trigger
            .metric_name
            .clone()
            .ok_or(CoreError::MissingMetricDetails)?;
        let raw_stat = trigger
            .statistic
            .as_deref()
            .or(trigger.extended_statistic.as_deref())
            .ok_or(CoreError::MissingMetricDetails)?;
        let statistic = correct_statistic_case(raw_stat)?;
        let line = AlarmMetricLine::Metric {
            id: "m1".to_string(),
            namespace: namespace.clone(),
            metric_name: metric_name.clone(),
            dimensions: trigger.dimensions.clone(),
            statistic: statistic.clone(),
            period: trigger.period.unwrap_or(DEFAULT_PERIOD),
            label: non_empty(trigger.label.as_deref()),
        };
        return Ok(MetricArray {
            namespace: namespace.clone(),
            metric_name,
            statistic,
            dimensions: trigger.dimensions.clone(),
            lines: vec![line],
            direct: true,
            threshold: trigger.threshold,
        });
    }

    let mut first: Option<(String, String, String, Vec<Dimension>)> = None;
    let mut lines = Vec::new();

    for item in trigger.metrics.iter().flatten() {
        if let Some(stat) = &item.metric_stat {
            let statistic = correct_statistic_case(&stat.stat)?;
            let metric = &stat.metric;
            if first.is_none() {
                first = Some((
                    metric.namespace.clone(),
                    metric.metric_name.clone(),
                    statistic.clone(),
                    metric.dimensions.clone(),
                ));
            }
            lines.push(AlarmMetricLine::Metric {
                id: item.id.clone(),
                namespace: metric.namespace.clone(),
                metric_name: metric.metric_name.clone(),
                dimensions: metric.dimensions.clone(),
                statistic,
                period: stat.period,
                label: non_empty(item.label.as_deref()),
            });
        } else if let Some(expression) = &item.expression {
            lines.push(AlarmMetricLine::Expression {
                id: item.id.clone(),
                expression: expression.clone(),
                label: non_empty(item.label.as_deref()),
            });
        }
    }

    let (namespace, metric_name, statistic, dimensions) =
        first.ok_or(CoreError::MissingMetricDetails)?;

    Ok(MetricArray {
        namespace,
        metric_name,
        statistic,
        dimensions,
        lines,
        direct: false,
        threshold: None,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

impl MetricArray {
    /// The 640x400 graph of the alarm's metrics at the top of the email.
    pub fn main_widget(&self, region: &str, window: &AlarmWindow) -> Value {
        let metrics: Vec<Value> = self
            .lines
            .iter()
            .map(|line| match line {
                AlarmMetricLine::Metric {
                    id,
                    namespace,
                    metric_name,
                    dimensions,
                    statistic,
                    label,
                    ..
                } => {
                    let mut tuple = vec![json!(namespace), json!(metric_name)];
                    for dimension in dimensions {
                        tuple.push(json!(dimension.name));
                        tuple.push(json!(dimension.value));
                    }
                    tuple.push(json!({
                        "id": id,
                        "stat": statistic,
                        "label": label.as_deref().unwrap_or(metric_name),
                        "visible": true,
                        "region": region,
                    }));
                    Value::Array(tuple)
                }
                AlarmMetricLine::Expression { id, expression, label } => json!([{
                    "id": id,
                    "expression": expression,
                    "label": label.as_deref().unwrap_or(""),
                    "visible": true,
                    "region": region,
                }]),
            })
            .collect();

        let mut annotations = json!({
            "vertical": [{ "value": window.annotation_time(), "label": "Alarm" }]
        });
        if let Some(threshold) = self.threshold {
            annotations["horizontal"] = json!([{ "value": threshold, "label": "Threshold" }]);
        }

        json!({
            "metrics": metrics,
            "title": "",
            "view": "timeSeries",
            "stacked": false,
            "width": 640,
            "height": 400,
            "region": region,
            "start": format_ms_z(window.start),
            "end": format_ms_z(window.end),
            "annotations": annotations,
        })
    }

    /// Queries for the alarm's own metric data over the 25 hour window.
    pub fn data_queries(&self, account_id: &str) -> Vec<MetricQuery> {
        self.lines
            .iter()
            .map(|line| match line {
                AlarmMetricLine::Metric {
                    id,
                    namespace,
                    metric_name,
                    dimensions,
                    statistic,
                    period,
                    label,
                } => MetricQuery::Stat {
                    id: if self.direct { "a1".to_string() } else { id.clone() },
                    namespace: namespace.clone(),
                    metric_name: metric_name.clone(),
                    dimensions: dimensions.clone(),
                    period: *period,
                    stat: statistic.clone(),
                    label: Some(label.clone().unwrap_or_else(|| metric_name.clone())),
                    account_id: Some(account_id.to_string()),
                },
                AlarmMetricLine::Expression { id, expression, label } => MetricQuery::Expression {
                    id: id.clone(),
                    expression: expression.clone(),
                    label: label.clone(),
                    period: None,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetricIdentity, MetricStat, TriggerMetric};

    #[test]
    fn parses_arn() {
        let arn: AlarmArn = "arn:aws:cloudwatch:eu-west-1:123456789012:alarm:my:alarm".parse().unwrap();
        assert_eq!(arn.region, "eu-west-1");
        assert_eq!(arn.account_id, "123456789012");
        assert_eq!(arn.resource_id, "my:alarm");
        assert!("arn:aws:cloudwatch".parse::<AlarmArn>().is_err());
    }

    #[test]
    fn window_offsets() {
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        assert_eq!(window.annotation_time(), "2024-03-14T12:53:20.538Z");
        assert_eq!(format_ms_z(window.start), "2024-03-14T10:58:20.538Z");
        assert_eq!(format_ms_z(window.end), "2024-03-14T12:58:20.538Z");
        assert_eq!(format_ms_z(window.alarm_data_start()), "2024-03-13T11:53:20.538Z");
        assert_eq!(window.display_change_time(), "Thursday 14 March, 2024 12:53:20 UTC");
        assert_eq!(format_console_time(window.change), "2024-03-14T12*3a53*3a20.538Z");
    }

    #[test]
    fn window_normalizes_offsets_to_utc() {
        let window = AlarmWindow::parse("2024-03-14T14:53:20.000+0200").unwrap();
        assert_eq!(window.annotation_time(), "2024-03-14T12:53:20.000Z");
    }

    #[test]
    fn statistic_case() {
        assert_eq!(correct_statistic_case("AVERAGE").unwrap(), "Average");
        assert_eq!(correct_statistic_case("SampleCount").unwrap(), "SampleCount");
        assert_eq!(correct_statistic_case("iqm").unwrap(), "IQM");
        assert_eq!(correct_statistic_case("P99").unwrap(), "p99");
        assert_eq!(correct_statistic_case("TM(10%:90%)").unwrap(), "tm(10%:90%)");
        assert!(matches!(
            correct_statistic_case("median"),
            Err(CoreError::InvalidStatistic(s)) if s == "median"
        ));
    }

    fn stat_item(id: &str, namespace: &str, metric: &str) -> TriggerMetric {
        TriggerMetric {
            id: id.into(),
            label: None,
            expression: None,
            metric_stat: Some(MetricStat {
                metric: MetricIdentity {
                    namespace: namespace.into(),
                    metric_name: metric.into(),
                    dimensions: vec![Dimension::new("FunctionName", "checkout")],
                },
                period: 300,
                stat: "Sum".into(),
            }),
            return_data: Some(false),
            account_id: None,
        }
    }

    #[test]
    fn metrics_array_uses_first_metric_stat() {
        let expression = TriggerMetric {
            id: "e1".into(),
            label: Some("Error rate".into()),
            expression: Some("m1/m2*100".into()),
            metric_stat: None,
            return_data: Some(true),
            account_id: None,
        };
        let trigger = Trigger {
            metrics: Some(vec![
                expression,
                stat_item("m1", "AWS/Lambda", "Errors"),
                stat_item("m2", "AWS/Lambda", "Invocations"),
            ]),
            ..Default::default()
        };
        let array = metric_array(&trigger).unwrap();
        assert_eq!(array.namespace, "AWS/Lambda");
        assert_eq!(array.metric_name, "Errors");
        assert_eq!(array.statistic, "Sum");
        assert_eq!(array.lines.len(), 3);
        assert!(array.threshold.is_none());

        let queries = array.data_queries("123456789012");
        assert_eq!(queries[0].id(), "e1");
        assert_eq!(queries[1].id(), "m1");
    }

    #[test]
    fn metrics_array_without_metric_stat_fails() {
        let trigger = Trigger {
            metrics: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(metric_array(&trigger), Err(CoreError::MissingMetricDetails)));
        assert!(matches!(
            metric_array(&Trigger::default()),
            Err(CoreError::MissingMetricDetails)
        ));
    }

    #[test]
    fn main_widget_for_direct_trigger() {
        let trigger = Trigger {
            namespace: Some("AWS/EC2".into()),
            metric_name: Some("CPUUtilization".into()),
            statistic: Some("AVERAGE".into()),
            dimensions: vec![Dimension::new("InstanceId", "i-0123")],
            period: Some(60),
            threshold: Some(80.0),
            ..Default::default()
        };
        let array = metric_array(&trigger).unwrap();
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let widget = array.main_widget("us-east-1", &window);

        assert_eq!(widget["width"], 640);
        assert_eq!(widget["metrics"][0][0], "AWS/EC2");
        assert_eq!(widget["metrics"][0][3], "i-0123");
        assert_eq!(widget["metrics"][0][4]["id"], "m1");
        assert_eq!(widget["metrics"][0][4]["label"], "CPUUtilization");
        assert_eq!(widget["annotations"]["horizontal"][0]["label"], "Threshold");
        assert_eq!(widget["annotations"]["vertical"][0]["value"], "2024-03-14T12:53:20.538Z");

        let queries = array.data_queries("123456789012");
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].id(), "a1");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::alarm::format_ms_z;
use crate::error::CoreError;
use crate::model::Dimension;
use crate::query::MetricQuery;

const DEFAULT_PERIOD: i32 = 300;
const DEFAULT_STAT: &str = "Average";
const IMAGE_WIDTH: u32 = 320;
const IMAGE_HEIGHT: u32 = 200;

// ---------------------------------------------------------------------------
// View
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    TimeSeries,
    SingleValue,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::TimeSeries => "timeSeries",
            View::SingleValue => "singleValue",
        }
    }

    fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "timeSeries" => Ok(View::TimeSeries),
            "singleValue" => Ok(View::SingleValue),
            other => Err(CoreError::WidgetSpec(format!("unsupported view {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricLine
// ---------------------------------------------------------------------------

/// One entry of a widget's `metrics` array.
///
/// In dashboard JSON a metric is a tuple `[namespace, metric, name, value, ...,
/// {options}]` and an expression is `[{expression, ...options}]`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricLine {
    Metric {
        namespace: String,
        metric_name: String,
        dimensions: Vec<Dimension>,
        /// Trailing rendering options (`id`, `label`, `color`, `visible`, `stat`, ...).
        options: Map<String, Value>,
    },
    Expression {
        expression: String,
        options: Map<String, Value>,
    },
}

impl MetricLine {
    pub fn metric(namespace: impl Into<String>, metric_name: impl Into<String>) -> Self {
        MetricLine::Metric {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            dimensions: Vec::new(),
            options: Map::new(),
        }
    }

    pub fn expression(expression: impl Into<String>) -> Self {
        MetricLine::Expression {
            expression: expression.into(),
            options: Map::new(),
        }
    }

    /// Add a dimension pair. Ignored for expressions.
    pub fn dim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let MetricLine::Metric { dimensions, .. } = &mut self {
            dimensions.push(Dimension::new(name, value));
        }
        self
    }

    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options_mut().insert(key.to_string(), value.into());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.option("id", id)
    }

    pub fn label(self, label: &str) -> Self {
        self.option("label", label)
    }

    pub fn color(self, color: &str) -> Self {
        self.option("color", color)
    }

    pub fn hidden(self) -> Self {
        self.option("visible", false)
    }

    pub fn options(&self) -> &Map<String, Value> {
        match self {
            MetricLine::Metric { options, .. } | MetricLine::Expression { options, .. } => options,
        }
    }

    fn options_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            MetricLine::Metric { options, .. } | MetricLine::Expression { options, .. } => options,
        }
    }

    fn option_str(&self, key: &str) -> Option<&str> {
        self.options().get(key).and_then(Value::as_str)
    }

    pub fn metric_name(&self) -> Option<&str> {
        match self {
            MetricLine::Metric { metric_name, .. } => Some(metric_name),
            MetricLine::Expression { .. } => None,
        }
    }

    /// Parse one dashboard tuple. `previous` resolves the `"."` shorthand,
    /// which repeats the token at the same position in the line above.
    pub fn parse(value: &Value, previous: Option<&MetricLine>) -> Result<Self, CoreError> {
        let items = value
            .as_array()
            .ok_or_else(|| CoreError::WidgetSpec(format!("metric line is not an array: {value}")))?;

        if let Some(Value::Object(first)) = items.first() {
            let mut options = first.clone();
            let expression = match options.remove("expression") {
                Some(Value::String(expression)) => expression,
                _ => {
                    return Err(CoreError::WidgetSpec(
                        "object-only metric line without an expression".to_string(),
                    ));
                }
            };
            return Ok(MetricLine::Expression { expression, options });
        }

        let previous_tokens = previous.map(MetricLine::tokens).unwrap_or_default();
        let mut tokens = Vec::new();
        let mut options = Map::new();

        for (position, item) in items.iter().enumerate() {
            match item {
                Value::Object(trailing) => {
                    if position + 1 != items.len() {
                        return Err(CoreError::WidgetSpec(
                            "options object must be the last element of a metric line".to_string(),
                        ));
                    }
                    options = trailing.clone();
                }
                Value::String(token) if token == "." => {
                    let repeated = previous_tokens.get(position).ok_or_else(|| {
                        CoreError::WidgetSpec(format!("\".\" at position {position} has nothing to repeat"))
                    })?;
                    tokens.push(repeated.clone());
                }
                Value::String(token) => tokens.push(token.clone()),
                Value::Number(number) => tokens.push(number.to_string()),
                other => {
                    return Err(CoreError::WidgetSpec(format!("unexpected metric token {other}")));
                }
            }
        }

        if tokens.len() < 2 || tokens.len() % 2 != 0 {
            return Err(CoreError::WidgetSpec(format!(
                "metric line needs a namespace, a metric name and name/value pairs: {value}"
            )));
        }

        let dimensions = tokens[2..]
            .chunks(2)
            .map(|pair| Dimension::new(pair[0].clone(), pair[1].clone()))
            .collect();

        Ok(MetricLine::Metric {
            namespace: tokens[0].clone(),
            metric_name: tokens[1].clone(),
            dimensions,
            options,
        })
    }

    fn tokens(&self) -> Vec<String> {
        match self {
            MetricLine::Metric {
                namespace,
                metric_name,
                dimensions,
                ..
            } => {
                let mut tokens = vec![namespace.clone(), metric_name.clone()];
                for dimension in dimensions {
                    tokens.push(dimension.name.clone());
                    tokens.push(dimension.value.clone());
                }
                tokens
            }
            MetricLine::Expression { .. } => Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MetricLine::Metric { options, .. } => {
                let mut items: Vec<Value> = self.tokens().into_iter().map(Value::String).collect();
                if !options.is_empty() {
                    items.push(Value::Object(options.clone()));
                }
                Value::Array(items)
            }
            MetricLine::Expression { expression, options } => {
                let mut object = Map::new();
                object.insert("expression".to_string(), json!(expression));
                object.extend(options.clone());
                json!([object])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WidgetSpec
// ---------------------------------------------------------------------------

/// A CloudWatch dashboard widget definition (`DashboardMetricSpec`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct WidgetSpec {
    pub title: String,
    pub view: View,
    pub stat: Option<String>,
    pub period: i32,
    pub metrics: Vec<MetricLine>,
    /// Other widget properties (`yAxis`, `stacked`, `region`, ...) passed through as-is.
    pub properties: Map<String, Value>,
}

impl WidgetSpec {
    pub fn new(title: impl Into<String>, view: View) -> Self {
        Self {
            title: title.into(),
            view,
            stat: None,
            period: DEFAULT_PERIOD,
            metrics: Vec::new(),
            properties: Map::new(),
        }
    }

    pub fn time_series(title: impl Into<String>) -> Self {
        Self::new(title, View::TimeSeries).property("stacked", false)
    }

    pub fn single_value(title: impl Into<String>) -> Self {
        Self::new(title, View::SingleValue)
    }

    pub fn stat(mut self, stat: &str) -> Self {
        self.stat = Some(stat.to_string());
        self
    }

    pub fn period(mut self, period: i32) -> Self {
        self.period = period;
        self
    }

    pub fn line(mut self, line: MetricLine) -> Self {
        self.metrics.push(line);
        self
    }

    pub fn lines(mut self, lines: impl IntoIterator<Item = MetricLine>) -> Self {
        self.metrics.extend(lines);
        self
    }

    pub fn property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Percent y-axis used for utilization style widgets.
    pub fn percent_axis(self) -> Self {
        self.property("yAxis", json!({"left": {"label": "Percent", "showUnits": false}}))
    }

    /// `title` with every character outside `[\w\-_. ]` replaced by `_`,
    /// followed by `-{view}`.
    pub fn widget_name(&self) -> String {
        let sanitized: String = self
            .title
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{sanitized}-{}", self.view.as_str())
    }

    /// The `MetricWidget` JSON for `GetMetricWidgetImage`.
    pub fn image_request(
        &self,
        annotation_time: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Value {
        let mut widget = Value::from(self.clone());
        widget["annotations"] = json!({"vertical": [{"label": " ", "value": annotation_time}]});
        widget["width"] = json!(IMAGE_WIDTH);
        widget["height"] = json!(IMAGE_HEIGHT);
        widget["start"] = json!(format_ms_z(start));
        widget["end"] = json!(format_ms_z(end));
        widget
    }

    /// Derive `MetricDataQuery` definitions from the widget.
    ///
    /// Lines without an explicit `id` get `query1`, `query2`, ... numbered per
    /// widget. A line's own `stat` wins over the widget stat, which wins over
    /// `Average`.
    pub fn queries(&self) -> Vec<MetricQuery> {
        self.metrics
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let id = line
                    .option_str("id")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("query{}", index + 1));
                let period = line
                    .options()
                    .get("period")
                    .and_then(Value::as_i64)
                    .and_then(|p| i32::try_from(p).ok())
                    .unwrap_or(self.period);
                match line {
                    MetricLine::Metric {
                        namespace,
                        metric_name,
                        dimensions,
                        ..
                    } => MetricQuery::Stat {
                        id,
                        namespace: namespace.clone(),
                        metric_name: metric_name.clone(),
                        dimensions: dimensions.clone(),
                        period,
                        stat: line
                            .option_str("stat")
                            .or(self.stat.as_deref())
                            .unwrap_or(DEFAULT_STAT)
                            .to_string(),
                        label: None,
                        account_id: None,
                    },
                    MetricLine::Expression { expression, .. } => MetricQuery::Expression {
                        id,
                        expression: expression.clone(),
                        label: Some(line.option_str("label").unwrap_or_default().to_string()),
                        period: Some(period),
                    },
                }
            })
            .collect()
    }

    /// Metric name shown under a single-value card.
    pub fn first_metric_name(&self) -> &str {
        self.metrics
            .iter()
            .find_map(MetricLine::metric_name)
            .unwrap_or_default()
    }
}

impl TryFrom<Value> for WidgetSpec {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut object) = value else {
            return Err(CoreError::WidgetSpec("widget spec is not an object".to_string()));
        };

        let title = match object.remove("title") {
            Some(Value::String(title)) => title,
            _ => return Err(CoreError::WidgetSpec("widget spec has no title".to_string())),
        };
        let view = match object.remove("view") {
            Some(Value::String(view)) => View::parse(&view)?,
            None => View::TimeSeries,
            Some(other) => return Err(CoreError::WidgetSpec(format!("invalid view {other}"))),
        };
        let stat = object
            .remove("stat")
            .and_then(|stat| stat.as_str().map(str::to_string));
        let period = object
            .remove("period")
            .and_then(|p| p.as_i64())
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(DEFAULT_PERIOD);

        let mut metrics: Vec<MetricLine> = Vec::new();
        if let Some(raw) = object.remove("metrics") {
            let raw = raw
                .as_array()
                .ok_or_else(|| CoreError::WidgetSpec("metrics is not an array".to_string()))?;
            for line in raw {
                let parsed = MetricLine::parse(line, metrics.last())?;
                metrics.push(parsed);
            }
        }

        Ok(Self {
            title,
            view,
            stat,
            period,
            metrics,
            properties: object,
        })
    }
}

impl From<WidgetSpec> for Value {
    fn from(spec: WidgetSpec) -> Self {
        let mut object = Map::new();
        object.insert("title".to_string(), json!(spec.title));
        object.insert("view".to_string(), json!(spec.view.as_str()));
        if let Some(stat) = &spec.stat {
            object.insert("stat".to_string(), json!(stat));
        }
        object.insert("period".to_string(), json!(spec.period));
        object.insert(
            "metrics".to_string(),
            Value::Array(spec.metrics.iter().map(MetricLine::to_value).collect()),
        );
        object.extend(spec.properties);
        Value::Object(object)
    }
}

// ---------------------------------------------------------------------------
// Numeric results
// ---------------------------------------------------------------------------

/// One `MetricDataResult` with timestamps already dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricResult {
    pub id: String,
    pub label: Option<String>,
    pub status_code: Option<String>,
    pub values: Vec<f64>,
}

/// Round to `precision` decimal places.
pub fn round_value(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Attach each result's metric identity and round its values for the prompt.
pub fn enrich_results(queries: &[MetricQuery], results: &[MetricResult], precision: u32) -> Value {
    let enriched: Vec<Value> = results
        .iter()
        .map(|result| {
            let mut entry = json!({
                "Id": result.id,
                "Label": result.label,
                "StatusCode": result.status_code,
                "Values": result
                    .values
                    .iter()
                    .map(|v| round_value(*v, precision))
                    .collect::<Vec<_>>(),
            });
            if let Some(query) = queries.iter().find(|q| q.id() == result.id)
                && let (Value::Object(target), Value::Object(identity)) =
                    (&mut entry, query.identity())
            {
                target.extend(identity);
            }
            entry
        })
        .collect();
    json!({ "MetricDataResults": enriched })
}

// ---------------------------------------------------------------------------
// Single value card
// ---------------------------------------------------------------------------

/// Human formatting of a datapoint: integers without decimals, others to two places.
pub fn format_datapoint(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rounded = format!("{:.2}", value);
        rounded.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Inline HTML stat card; `- -` when the metric has no datapoint.
pub fn single_value_card(title: &str, value: Option<f64>, metric_name: &str) -> String {
    let value = value.map(format_datapoint).unwrap_or_else(|| "- -".to_string());
    format!(
        concat!(
            r#"<table cellpadding="0" cellspacing="0" border="0" style="padding:0px;margin:0px;width:100%; color: #888; color: rgb(68, 68, 68) !important; -webkit-text-fill-color: rgb(68, 68, 68) !important; font-family: 'Amazon Ember','Helvetica Neue',Roboto,Arial,sans-serif;">"#,
            r#"<tr><td style="padding-left:10px; font-size:18px;"><p style="margin-top:8px">{title}</p></td></tr>"#,
            r#"<tr><td style="text-align:center; vertical-align: middle; font-size:45px;">"#,
            r#"<p style="margin:32px; line-height:56px;">{value}</p>"#,
            r#"<p style="padding-left:10px; vertical-align: bottom; text-align:left; font-size:12px;">&#9634;&nbsp;{metric}</p>"#,
            r#"</td></tr></table>"#
        ),
        title = title,
        value = value,
        metric = metric_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmWindow;

    #[test]
    fn widget_name_sanitizes_title() {
        let spec = WidgetSpec::time_series("Read usage (average units/second)");
        assert_eq!(spec.widget_name(), "Read usage _average units_second_-timeSeries");
        let card = WidgetSpec::single_value("Group In Service Instances");
        assert_eq!(card.widget_name(), "Group In Service Instances-singleValue");
    }

    #[test]
    fn parses_tuple_without_dimensions() {
        let line = MetricLine::parse(&json!(["AWS/Lambda", "Invocations"]), None).unwrap();
        assert_eq!(line, MetricLine::metric("AWS/Lambda", "Invocations"));
    }

    #[test]
    fn rendering_only_dict_is_not_a_dimension() {
        let line = MetricLine::parse(
            &json!(["AWS/EC2", "NetworkIn", "InstanceId", "i-1", {"label": "Network In", "color": "#0073BB"}]),
            None,
        )
        .unwrap();
        let MetricLine::Metric { dimensions, options, .. } = &line else {
            panic!("expected metric line");
        };
        assert_eq!(dimensions, &vec![Dimension::new("InstanceId", "i-1")]);
        assert_eq!(options["color"], "#0073BB");

        let spec = WidgetSpec::time_series("Network").stat("Average").period(60).line(line);
        assert_eq!(spec.queries()[0].id(), "query1");
    }

    #[test]
    fn trailing_dict_with_id_carries_the_id() {
        let spec: WidgetSpec = serde_json::from_value(json!({
            "title": "Read usage",
            "view": "timeSeries",
            "stat": "Sum",
            "period": 60,
            "metrics": [
                ["AWS/DynamoDB", "ConsumedReadCapacityUnits", "TableName", "orders", {"id": "m1", "visible": false}],
                [{"expression": "m1/PERIOD(m1)", "label": "Consumed", "id": "e1"}],
                ["AWS/DynamoDB", "ProvisionedReadCapacityUnits", "TableName", "orders"]
            ]
        }))
        .unwrap();

        let queries = spec.queries();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].id(), "m1");
        assert_eq!(queries[1].id(), "e1");
        assert_eq!(queries[2].id(), "query3");
        match &queries[1] {
            MetricQuery::Expression { label, period, .. } => {
                assert_eq!(label.as_deref(), Some("Consumed"));
                assert_eq!(*period, Some(60));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dot_shorthand_repeats_previous_line() {
        let spec: WidgetSpec = serde_json::from_value(json!({
            "title": "Latency",
            "metrics": [
                ["AWS/ApiGateway", "Latency", "ApiName", "shop"],
                [".", "IntegrationLatency", ".", "."]
            ]
        }))
        .unwrap();
        let queries = spec.queries();
        assert_eq!(
            queries[1].identity()["dimensions"],
            json!([{"Name": "ApiName", "Value": "shop"}])
        );
        assert_eq!(queries[1].identity()["metric_name"], "IntegrationLatency");
        assert!(MetricLine::parse(&json!([".", "x"]), None).is_err());
    }

    #[test]
    fn line_stat_overrides_widget_stat() {
        let spec = WidgetSpec::time_series("Cluster Nodes")
            .stat("Average")
            .line(MetricLine::metric("ContainerInsights", "node_status_condition_ready").option("stat", "Sum"))
            .line(MetricLine::metric("ContainerInsights", "cluster_node_count"));
        match (&spec.queries()[0], &spec.queries()[1]) {
            (MetricQuery::Stat { stat: first, .. }, MetricQuery::Stat { stat: second, .. }) => {
                assert_eq!(first, "Sum");
                assert_eq!(second, "Average");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn queries_are_deterministic() {
        let spec = WidgetSpec::time_series("CPU")
            .line(MetricLine::metric("AWS/EC2", "CPUUtilization").dim("InstanceId", "i-1"));
        assert_eq!(spec.queries(), spec.queries());
    }

    #[test]
    fn image_request_adds_annotation_and_size() {
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let spec = WidgetSpec::time_series("CPU Utilization")
            .stat("Average")
            .period(60)
            .line(MetricLine::metric("AWS/EC2", "CPUUtilization").dim("InstanceId", "i-1"));
        let request = spec.image_request(&window.annotation_time(), window.start, window.end);
        assert_eq!(request["width"], 320);
        assert_eq!(request["height"], 200);
        assert_eq!(request["annotations"]["vertical"][0]["value"], "2024-03-14T12:53:20.538Z");
        assert_eq!(request["metrics"][0], json!(["AWS/EC2", "CPUUtilization", "InstanceId", "i-1"]));
        assert_eq!(request["stacked"], false);
        assert_eq!(request["start"], "2024-03-14T10:58:20.538Z");
    }

    #[test]
    fn spec_round_trips_through_json() {
        let spec = WidgetSpec::time_series("Read usage")
            .stat("Sum")
            .period(60)
            .line(MetricLine::expression("m1/PERIOD(m1)").label("Consumed").id("e1"))
            .percent_axis();
        let value = Value::from(spec.clone());
        let back = WidgetSpec::try_from(value).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn enrich_results_rounds_and_labels() {
        let spec = WidgetSpec::time_series("Duration")
            .stat("Average")
            .line(MetricLine::metric("AWS/Lambda", "Duration").dim("FunctionName", "f"));
        let queries = spec.queries();
        let results = vec![MetricResult {
            id: "query1".into(),
            label: Some("Duration".into()),
            status_code: Some("Complete".into()),
            values: vec![1.23456, 2.0],
        }];
        let enriched = enrich_results(&queries, &results, 2);
        let first = &enriched["MetricDataResults"][0];
        assert_eq!(first["Values"], json!([1.23, 2.0]));
        assert_eq!(first["metric_name"], "Duration");
        assert_eq!(first["namespace"], "AWS/Lambda");
        assert!(first.get("Timestamps").is_none());
    }

    #[test]
    fn single_value_card_falls_back() {
        let card = single_value_card("Group Pending Instances", None, "GroupPendingInstances");
        assert!(card.contains("- -"));
        assert!(card.contains("&#9634;&nbsp;GroupPendingInstances"));
        assert!(single_value_card("x", Some(3.0), "m").contains(">3<"));
        assert_eq!(format_datapoint(12.3456), "12.35");
    }
}

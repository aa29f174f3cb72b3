use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::CoreError;
use crate::html::{button, collapse_whitespace, escape};
use crate::links;

/// Trace summaries kept for the prompt.
pub const MAX_TRACE_SUMMARIES: usize = 3;

/// Alarms often fire without a coincident faulty trace, so the search window
/// reaches further back than the chart window.
pub const TRACE_LOOKBACK_HOURS: i64 = 21;

pub fn widen_start(start: DateTime<Utc>) -> DateTime<Utc> {
    start - Duration::hours(TRACE_LOOKBACK_HOURS)
}

/// An X-Ray filter expression and the window to search.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRequest {
    pub filter_expression: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The `{"TraceSummaries": [...]}` document handed to the prompt.
pub fn summary_document(mut summaries: Vec<Value>) -> Value {
    summaries.truncate(MAX_TRACE_SUMMARIES);
    json!({ "TraceSummaries": summaries })
}

/// Id of the summary with the latest `StartTime` (epoch seconds).
pub fn latest_trace_id(summaries: &[Value]) -> Option<String> {
    summaries
        .iter()
        .filter_map(|s| Some((s.get("StartTime")?.as_f64()?, s.get("Id")?.as_str()?)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, id)| id.to_string())
}

/// Resource types implicated by fault and error root causes.
///
/// A service counts when it is not `remote` and some entity on its path
/// recorded exceptions. A `DynamoDB` entity also implicates the table type.
pub fn root_cause_types(summaries: &[Value]) -> BTreeSet<String> {
    let mut types = BTreeSet::new();
    for summary in summaries {
        for key in ["FaultRootCauses", "ErrorRootCauses"] {
            let services = summary
                .get(key)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|cause| cause.get("Services").and_then(Value::as_array))
                .flatten();
            for service in services {
                let Some(service_type) = service.get("Type").and_then(Value::as_str) else {
                    continue;
                };
                if service_type == "remote" {
                    continue;
                }
                let entities = service.get("EntityPath").and_then(Value::as_array).into_iter().flatten();
                for entity in entities {
                    let has_exceptions = entity
                        .get("Exceptions")
                        .and_then(Value::as_array)
                        .is_some_and(|e| !e.is_empty());
                    if has_exceptions {
                        types.insert(service_type.to_string());
                        if entity.get("Name").and_then(Value::as_str) == Some("DynamoDB") {
                            types.insert("AWS::DynamoDB::Table".to_string());
                        }
                    }
                }
            }
        }
    }
    types
}

/// "Resources in Trace" table; EC2 services expand to one row per instance.
pub fn resources_table(summaries: &[Value]) -> String {
    let mut rows: Vec<(String, String, String)> = Vec::new();
    for summary in summaries {
        let instance_ids: Vec<&str> = summary
            .get("InstanceIds")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|i| i.get("Id").and_then(Value::as_str))
            .collect();
        let services = summary.get("ServiceIds").and_then(Value::as_array).into_iter().flatten();
        for service in services {
            let name = service.get("Name").and_then(Value::as_str).unwrap_or_default();
            let kind = service.get("Type").and_then(Value::as_str).unwrap_or_default();
            if kind == "AWS::EC2::Instance" {
                for id in &instance_ids {
                    push_unique(&mut rows, (name.to_string(), kind.to_string(), id.to_string()));
                }
            } else {
                push_unique(&mut rows, (name.to_string(), kind.to_string(), String::new()));
            }
        }
    }

    let mut html = String::from(
        r#"<table id="info" width="640" style="max-width:640px !important; border-collapse: collapse; margin-bottom:10px;" cellpadding="2" cellspacing="0" align="center" border="0">"#,
    );
    html.push_str(r#"<thead><tr><th colspan="3" style="text-align: center;">Resources in Trace</th></tr>"#);
    html.push_str("<tr><th>Name</th><th>Type</th><th>InstanceId</th></tr></thead><tbody>");
    for (name, kind, instance) in &rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(name),
            escape(kind),
            if instance.is_empty() { "None".to_string() } else { escape(instance) }
        ));
    }
    html.push_str("</tbody></table>");
    html
}

fn push_unique<T: PartialEq>(rows: &mut Vec<T>, row: T) {
    if !rows.contains(&row) {
        rows.push(row);
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// A segment or subsegment document.
#[derive(Debug, Clone, Deserialize)]
pub struct Segment {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub fault: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub throttle: bool,
    #[serde(default)]
    pub http: Option<Value>,
    #[serde(default)]
    pub subsegments: Vec<Segment>,
}

fn unknown_name() -> String {
    "Unknown".to_string()
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time.unwrap_or(self.start_time) - self.start_time
    }

    pub fn status(&self) -> SegmentStatus {
        if self.fault {
            SegmentStatus::Fault
        } else if self.error {
            SegmentStatus::Error
        } else if self.throttle {
            SegmentStatus::Throttle
        } else {
            SegmentStatus::Ok
        }
    }

    fn response_code(&self) -> String {
        self.http
            .as_ref()
            .and_then(|http| http.pointer("/response/status"))
            .map(|status| match status {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "-".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Ok,
    Error,
    Fault,
    Throttle,
}

impl SegmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SegmentStatus::Ok => "OK",
            SegmentStatus::Error => "Error",
            SegmentStatus::Fault => "Fault",
            SegmentStatus::Throttle => "Throttle",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            SegmentStatus::Ok => "#4CAF50",
            SegmentStatus::Error => "#c59600",
            SegmentStatus::Fault => "#fe6e73",
            SegmentStatus::Throttle => "#b088f5",
        }
    }
}

/// Left offset and width of a bar, both in percent of the trace duration.
pub fn bar_geometry(start: f64, duration: f64, earliest: f64, trace_duration: f64) -> (f64, f64) {
    if trace_duration <= 0.0 {
        return (0.0, 0.0);
    }
    (
        (start - earliest) * 100.0 / trace_duration,
        duration * 100.0 / trace_duration,
    )
}

/// The latest full trace, ready for rendering.
#[derive(Debug, Clone)]
pub struct TraceTimeline {
    pub trace_id: String,
    /// Trace duration in seconds; the bar scale.
    pub duration: f64,
    pub segments: Vec<Segment>,
}

const TD_STYLE: &str = "padding: 2px; border: 1px solid #ddd; overflow: hidden; white-space: nowrap; text-overflow: ellipsis; font-size: small;";
const HEADER_TD: &str = "padding: 2px; border: 1px solid #ddd; font-size: small;";
const BAR_CONTAINER_STYLE: &str = "position: relative; width: 100%; background-color: #ddd; height: 20px; min-width: 340px;";

impl TraceTimeline {
    /// Build from the raw segment documents returned by `BatchGetTraces`.
    pub fn from_documents<'a>(
        trace_id: impl Into<String>,
        duration: f64,
        documents: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, CoreError> {
        let mut segments = documents
            .into_iter()
            .map(serde_json::from_str::<Segment>)
            .collect::<Result<Vec<_>, _>>()?;
        segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut duration = duration;
        if duration <= 0.0 {
            let earliest = segments.iter().map(|s| s.start_time).fold(f64::INFINITY, f64::min);
            let latest = segments
                .iter()
                .map(|s| s.end_time.unwrap_or(s.start_time))
                .fold(f64::NEG_INFINITY, f64::max);
            duration = (latest - earliest).max(0.0);
        }

        Ok(Self {
            trace_id: trace_id.into(),
            duration,
            segments,
        })
    }

    fn earliest_start(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.start_time)
            .fold(f64::INFINITY, f64::min)
    }

    /// Nested HTML table of every segment with a proportional bar.
    pub fn render(&self, region: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let link = links::xray_trace(region, &self.trace_id, start, end);
        let mut html = String::from(
            r#"<table id="traces" width="640" cellspacing="0" align="center" border="0" style="max-width:640px!important; border-collapse:collapse; margin-bottom:10px">"#,
        );
        html.push_str(&format!(
            r#"<tr><td colspan="5" style="font-weight: bold; padding: 5px; border: 1px solid #ddd;">{}</td></tr>"#,
            button(&format!("Trace {} details", self.trace_id), &link)
        ));
        html.push_str(&format!(
            concat!(
                r#"<tr><td style="{h} max-width:155px;" width="155">Node</td>"#,
                r#"<td style="{h} max-width:40px;" width="40">Stat.</td>"#,
                r#"<td style="{h} max-width:40px;" width="40">Resp.</td>"#,
                r#"<td style="{h} max-width:40px;" width="40">Dur.</td>"#,
                r#"<td style="{h} min-width:340px;">Timeline</td></tr>"#
            ),
            h = HEADER_TD
        ));

        let earliest = self.earliest_start();
        for segment in &self.segments {
            let title = match segment.origin.as_deref() {
                Some(origin) if !origin.is_empty() => {
                    format!("{}&nbsp;&nbsp;&nbsp;&nbsp;{}", escape(&segment.name), escape(origin))
                }
                _ => escape(&segment.name),
            };
            html.push_str(&format!(
                r#"<tr><td colspan="5" style="font-weight: bold; padding: 5px; border: 1px solid #ddd;">{title}</td></tr>"#
            ));
            self.render_segment(&mut html, segment, earliest, 1);
        }

        html.push_str("</table>");
        html
    }

    fn render_segment(&self, html: &mut String, segment: &Segment, earliest: f64, depth: usize) {
        let status = segment.status();
        let (offset, width) =
            bar_geometry(segment.start_time, segment.duration(), earliest, self.duration);
        let indent = "&nbsp;&nbsp;&nbsp;&nbsp;".repeat(depth);

        html.push_str(&format!(
            concat!(
                r#"<tr><td style="{td} max-width:155px;" width="155">{indent}{name}</td>"#,
                r#"<td style="{td} max-width:40px; color:{color};" width="40">{status}</td>"#,
                r#"<td style="{td} max-width:40px;" width="40">{code}</td>"#,
                r#"<td style="{td} max-width:40px;" width="40">{ms}ms</td>"#,
                r#"<td style="{td}"><div style="{container}"><div style="position: absolute; height: 100%; background-color: {color}; left: {offset}%; width: {width}%;"></div></div></td></tr>"#
            ),
            td = TD_STYLE,
            indent = indent,
            name = escape(&segment.name),
            color = status.color(),
            status = status.label(),
            code = escape(&segment.response_code()),
            ms = (segment.duration() * 1000.0).round() as i64,
            container = BAR_CONTAINER_STYLE,
            offset = offset,
            width = width,
        ));

        let mut children: Vec<&Segment> = segment.subsegments.iter().collect();
        children.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        for child in children {
            self.render_segment(html, child, earliest, depth + 1);
        }
    }
}

/// Resources table followed by the timeline, whitespace collapsed.
pub fn trace_html(resources: &str, timeline: &str) -> String {
    collapse_whitespace(&format!("{resources}{timeline}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, start: f64) -> Value {
        json!({
            "Id": id,
            "StartTime": start,
            "ServiceIds": [
                {"Name": "web", "Type": "AWS::EC2::Instance"},
                {"Name": "orders", "Type": "AWS::DynamoDB::Table"}
            ],
            "InstanceIds": [{"Id": "i-1"}, {"Id": "i-2"}],
            "FaultRootCauses": [{
                "Services": [
                    {"Name": "web", "Type": "AWS::EC2::Instance", "EntityPath": [
                        {"Name": "web", "Exceptions": []},
                        {"Name": "DynamoDB", "Exceptions": [{"Name": "ResourceNotFoundException"}]}
                    ]},
                    {"Name": "api.example.com", "Type": "remote", "EntityPath": [
                        {"Name": "api.example.com", "Exceptions": [{"Name": "Timeout"}]}
                    ]}
                ]
            }]
        })
    }

    #[test]
    fn bar_geometry_is_proportional() {
        let (offset, width) = bar_geometry(102.0, 3.0, 100.0, 10.0);
        assert!((offset - 20.0).abs() < 1e-9);
        assert!((width - 30.0).abs() < 1e-9);
        assert_eq!(bar_geometry(1.0, 1.0, 0.0, 0.0), (0.0, 0.0));
    }

    #[test]
    fn latest_trace_is_selected_by_start_time() {
        let summaries = vec![summary("1-a", 10.0), summary("1-b", 30.0), summary("1-c", 20.0)];
        assert_eq!(latest_trace_id(&summaries).as_deref(), Some("1-b"));
        assert_eq!(latest_trace_id(&[]), None);
    }

    #[test]
    fn root_causes_skip_remote_and_add_dynamodb_table() {
        let types = root_cause_types(&[summary("1-a", 1.0)]);
        assert_eq!(
            types.into_iter().collect::<Vec<_>>(),
            vec!["AWS::DynamoDB::Table".to_string(), "AWS::EC2::Instance".to_string()]
        );
    }

    #[test]
    fn resources_table_expands_instances_and_dedups() {
        let html = resources_table(&[summary("1-a", 1.0), summary("1-b", 2.0)]);
        assert_eq!(html.matches("<td>i-1</td>").count(), 1);
        assert_eq!(html.matches("<td>i-2</td>").count(), 1);
        assert!(html.contains("<td>orders</td><td>AWS::DynamoDB::Table</td><td>None</td>"));
        assert!(html.contains("Resources in Trace"));
    }

    #[test]
    fn summaries_are_capped() {
        let doc = summary_document((0..5).map(|i| summary(&i.to_string(), i as f64)).collect());
        assert_eq!(doc["TraceSummaries"].as_array().map(Vec::len), Some(3));
        assert_eq!(summary_document(Vec::new()), json!({"TraceSummaries": []}));
    }

    #[test]
    fn timeline_renders_sorted_segments_and_subsegments() {
        let late = r#"{"name":"db","start_time":105.0,"end_time":106.0,"fault":true}"#;
        let early = r#"{"name":"api","origin":"AWS::Lambda::Function","start_time":100.0,"end_time":110.0,
            "http":{"response":{"status":200}},
            "subsegments":[{"name":"second","start_time":104.0,"end_time":105.0},
                           {"name":"first","start_time":102.0,"end_time":105.0,"throttle":true}]}"#;
        let timeline = TraceTimeline::from_documents("1-abc", 10.0, [late, early]).unwrap();
        assert_eq!(timeline.segments[0].name, "api");

        let window = crate::alarm::AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let html = timeline.render("us-east-1", window.start, window.end);
        assert!(html.contains("api&nbsp;&nbsp;&nbsp;&nbsp;AWS::Lambda::Function"));
        assert!(html.contains("Trace 1-abc details"));
        assert!(html.contains("#xray:traces/1-abc?"));
        assert!(html.contains("left: 20%; width: 30%;"));
        assert!(html.contains(">10000ms<"));
        assert!(html.contains(">200<"));
        assert!(html.contains(">Fault<"));
        let first = html.find("first</td>").unwrap_or_default();
        let second = html.find("second</td>").unwrap_or_default();
        assert!(html.contains("&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;first"));
        assert!(first > 0 && first < second);
    }

    #[test]
    fn trace_html_collapses_whitespace() {
        assert_eq!(trace_html("<a>\n  </a>", "  <b> </b>"), "<a> </a> <b> </b>");
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::html::{self, escape};

const LOG_TABLE_OPEN: &str = r#"<table id="info" width="640" style="max-width:640px !important; border-collapse: collapse; margin-bottom:10px;" cellpadding="2" cellspacing="0" align="center" border="0">"#;

/// A log event as fed to the prompt and rendered in the email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "logStreamName")]
    pub log_stream_name: Option<String>,
    pub timestamp: i64,
    pub message: String,
}

impl LogEvent {
    /// Example: 2024-03-14 12:53:20.538Z
    pub fn display_time(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string())
            .unwrap_or_else(|| self.timestamp.to_string())
    }
}

/// Table of recent events for one log group.
pub fn events_table(log_group: &str, log_stream: Option<&str>, events: &[LogEvent]) -> String {
    let stream = log_stream
        .or_else(|| events.first().and_then(|e| e.log_stream_name.as_deref()))
        .unwrap_or("N/A");

    let mut table = String::from(LOG_TABLE_OPEN);
    table.push_str(&format!(
        r#"<tr><th colspan="2">Log group: {}<br>Log stream: {}</th></tr>"#,
        escape(log_group),
        escape(stream)
    ));
    table.push_str("<tr><th>Timestamp</th><th>Message</th></tr>");

    if events.is_empty() {
        table.push_str(r#"<tr><td colspan="2"><p>No log events found in the time period specified.</p></td></tr>"#);
    }
    for event in events {
        table.push_str(&format!(
            r#"<tr><td>{}</td><td style="word-break:break-all;">{}</td></tr>"#,
            event.display_time(),
            escape(&event.message).replace('\n', "<br>")
        ));
    }

    table.push_str("</table>");
    table
}

/// Placeholder when a stream name matched no log group.
pub fn no_events_found() -> String {
    "<p>No log events found.</p>".to_string()
}

/// Tabulate Logs Insights rows; columns are the union of fields in first-seen order.
pub fn insights_table(title: &str, rows: &[Vec<(String, String)>]) -> String {
    let mut fields: Vec<&str> = Vec::new();
    for row in rows {
        for (field, _) in row {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
    }

    let values: Vec<Value> = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = row
                .iter()
                .map(|(field, value)| (field.clone(), Value::String(value.clone())))
                .collect();
            Value::Object(object)
        })
        .collect();

    html::table_with_fields(title, &values, &fields)
}

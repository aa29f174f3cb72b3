use std::time::Duration as StdDuration;

use alarm_context_core::handlers::{LogRequest, LogSource, MissingLog};
use alarm_context_core::html::escape;
use alarm_context_core::links;
use alarm_context_core::logs::{self as render, LogEvent};
use alarm_context_core::model::{Link, Notification};
use alarm_context_core::{AwsApiError, RequestEnv};
use aws_sdk_cloudwatchlogs::Client;
use aws_sdk_cloudwatchlogs::types::QueryStatus;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::errors::AwsResultExt;

const SERVICE: &str = "logs";

/// Events shown per log group.
const RECENT_EVENT_LIMIT: i32 = 10;

/// Logs Insights queries look back this far from now.
const INSIGHTS_LOOKBACK_HOURS: i64 = 3;

const INSIGHTS_POLL_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// CloudWatch Logs client shared by every log lookup of an invocation.
#[derive(Clone)]
pub struct LogsClient {
    client: Client,
}

impl LogsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The last ten events before `end`, optionally limited to one stream.
    pub async fn recent_events(
        &self,
        log_group: &str,
        log_stream: Option<&str>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LogEvent>, AwsApiError> {
        let output = self
            .client
            .filter_log_events()
            .log_group_name(log_group)
            .set_log_stream_names(log_stream.map(|stream| vec![stream.to_string()]))
            .limit(RECENT_EVENT_LIMIT)
            .end_time(end.timestamp_millis())
            .send()
            .await
            .aws(SERVICE, "FilterLogEvents")?;

        Ok(output
            .events()
            .iter()
            .map(|event| LogEvent {
                log_stream_name: event.log_stream_name().map(str::to_string),
                timestamp: event.timestamp().unwrap_or_default(),
                message: event.message().unwrap_or_default().to_string(),
            })
            .collect())
    }

    /// Whether a group with exactly this name exists.
    pub async fn group_exists(&self, log_group: &str) -> Result<bool, AwsApiError> {
        let pages = self
            .client
            .describe_log_groups()
            .log_group_name_prefix(log_group)
            .into_paginator()
            .send()
            .try_collect()
            .await
            .aws(SERVICE, "DescribeLogGroups")?;
        Ok(pages
            .iter()
            .flat_map(|page| page.log_groups())
            .any(|group| group.log_group_name() == Some(log_group)))
    }

    /// Every log group holding a stream whose name starts with `log_stream`.
    pub async fn groups_with_stream(&self, log_stream: &str) -> Result<Vec<String>, AwsApiError> {
        let pages = self
            .client
            .describe_log_groups()
            .into_paginator()
            .send()
            .try_collect()
            .await
            .aws(SERVICE, "DescribeLogGroups")?;

        let mut matching = Vec::new();
        let names = pages
            .iter()
            .flat_map(|page| page.log_groups())
            .filter_map(|group| group.log_group_name());
        for name in names {
            let streams = self
                .client
                .describe_log_streams()
                .log_group_name(name)
                .log_stream_name_prefix(log_stream)
                .limit(1)
                .send()
                .await
                .aws(SERVICE, "DescribeLogStreams")?;
            if !streams.log_streams().is_empty() {
                matching.push(name.to_string());
            }
        }
        debug!(log_stream, groups = matching.len(), "resolved log stream to groups");
        Ok(matching)
    }

    /// Run a Logs Insights query over the last three hours and wait for it.
    pub async fn insights_rows(
        &self,
        log_group: &str,
        query: &str,
    ) -> Result<Vec<Vec<(String, String)>>, AwsApiError> {
        let now = Utc::now();
        let started = self
            .client
            .start_query()
            .log_group_name(log_group)
            .start_time((now - Duration::hours(INSIGHTS_LOOKBACK_HOURS)).timestamp())
            .end_time(now.timestamp())
            .query_string(query)
            .send()
            .await
            .aws(SERVICE, "StartQuery")?;
        let query_id = started.query_id().unwrap_or_default();

        loop {
            tokio::time::sleep(INSIGHTS_POLL_INTERVAL).await;
            let output = self
                .client
                .get_query_results()
                .query_id(query_id)
                .send()
                .await
                .aws(SERVICE, "GetQueryResults")?;
            if matches!(output.status(), Some(QueryStatus::Scheduled | QueryStatus::Running)) {
                continue;
            }
            return Ok(output
                .results()
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|field| {
                            (
                                field.field().unwrap_or_default().to_string(),
                                field.value().unwrap_or_default().to_string(),
                            )
                        })
                        .collect()
                })
                .collect());
        }
    }
}

/// What the log lookups of a plan turned up.
#[derive(Debug, Default)]
pub struct LogFindings {
    pub links: Vec<Link>,
    pub notifications: Vec<Notification>,
    pub tables: Vec<String>,
    pub events: Vec<Value>,
}

impl LogFindings {
    fn push_events(&mut self, events: &[LogEvent]) {
        self.events
            .extend(events.iter().filter_map(|event| serde_json::to_value(event).ok()));
    }
}

/// Execute one log request.
pub async fn fetch(
    logs: &LogsClient,
    env: &RequestEnv<'_>,
    request: &LogRequest,
    findings: &mut LogFindings,
) -> Result<(), AwsApiError> {
    let groups = match &request.source {
        LogSource::Group(group) => {
            if let Some(missing) = &request.when_missing
                && !logs.group_exists(group).await?
            {
                info!(log_group = %group, "log group does not exist");
                match missing {
                    MissingLog::Skip => {}
                    MissingLog::Note(text) => findings.tables.push(format!("<p>{}</p>", escape(text))),
                    MissingLog::Notify(notification) => {
                        findings.notifications.push(notification.clone())
                    }
                }
                return Ok(());
            }
            vec![group.clone()]
        }
        LogSource::Stream(stream) => logs.groups_with_stream(stream).await?,
    };
    let stream = match &request.source {
        LogSource::Stream(stream) => Some(stream.as_str()),
        LogSource::Group(_) => None,
    };

    if let Some(query) = &request.insights_link
        && !groups.is_empty()
    {
        findings.links.push(Link::new(
            "Log Insights",
            links::logs_insights(env.region, &groups, query, env.window.start, env.window.end),
        ));
    }

    if request.recent_events {
        if groups.is_empty() {
            findings.tables.push(render::no_events_found());
        }
        for group in &groups {
            let events = logs.recent_events(group, stream, env.window.change).await?;
            info!(log_group = %group, events = events.len(), "fetched recent log events");
            if stream.is_some() && events.is_empty() {
                findings.tables.push(render::no_events_found());
                continue;
            }
            findings.tables.push(render::events_table(group, stream, &events));
            findings.push_events(&events);
        }
    }

    if let Some(insights) = &request.insights_results {
        for group in &groups {
            let rows = logs.insights_rows(group, &insights.query).await?;
            info!(log_group = %group, rows = rows.len(), "fetched Logs Insights results");
            if rows.is_empty() {
                continue;
            }
            findings.tables.push(render::insights_table(&insights.title, &rows));
            findings.events.extend(rows.iter().map(|row| {
                Value::Object(
                    row.iter()
                        .map(|(field, value)| (field.clone(), Value::String(value.clone())))
                        .collect::<Map<_, _>>(),
                )
            }));
        }
    }
    Ok(())
}

/// All log tables of a handler as one block.
pub fn log_information(tables: &[String]) -> Option<String> {
    (!tables.is_empty()).then(|| tables.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_keep_event_shape() {
        let mut findings = LogFindings::default();
        findings.push_events(&[LogEvent {
            log_stream_name: Some("2024/03/14/[$LATEST]abc".into()),
            timestamp: 1_710_420_800_538,
            message: "Task timed out".into(),
        }]);
        assert_eq!(findings.events[0]["logStreamName"], "2024/03/14/[$LATEST]abc");
        assert_eq!(findings.events[0]["timestamp"], 1_710_420_800_538i64);
        assert_eq!(findings.events[0]["message"], "Task timed out");
    }

    #[test]
    fn log_information_joins_tables() {
        assert_eq!(log_information(&[]), None);
        assert_eq!(
            log_information(&["<p>a</p>".to_string(), "<p>b</p>".to_string()]).as_deref(),
            Some("<p>a</p><p>b</p>")
        );
    }
}

use alarm_context_core::AwsApiError;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::types::{HistoryItemType, ScanBy};
use serde_json::{Value, json};
use tracing::info;

use crate::convert::aws_time_text;
use crate::errors::AwsResultExt;

const MAX_HISTORY_ITEMS: i32 = 10;

/// The alarm's last state changes, newest first.
///
/// Only the timestamp and summary of each item are kept; the rest repeats
/// what the prompt already holds.
pub async fn alarm_history(client: &Client, alarm_name: &str) -> Result<Value, AwsApiError> {
    let output = client
        .describe_alarm_history()
        .alarm_name(alarm_name)
        .history_item_type(HistoryItemType::StateUpdate)
        .scan_by(ScanBy::TimestampDescending)
        .max_records(MAX_HISTORY_ITEMS)
        .send()
        .await
        .aws("cloudwatch", "DescribeAlarmHistory")?;

    let items: Vec<Value> = output
        .alarm_history_items()
        .iter()
        .map(|item| {
            json!({
                "Timestamp": aws_time_text(item.timestamp()),
                "HistorySummary": item.history_summary(),
            })
        })
        .collect();
    info!(items = items.len(), "fetched alarm history");
    Ok(json!({ "AlarmHistoryItems": items }))
}

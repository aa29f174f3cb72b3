use alarm_context_core::AwsApiError;
use aws_sdk_health::Client;
use aws_sdk_health::types::{DateTimeRange, EventFilter, EventStatusCode};
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::convert::to_aws;
use crate::errors::AwsResultExt;

const SERVICE: &str = "health";

const LOOKBACK_DAYS: i64 = 7;

/// `DescribeEventDetails` accepts at most this many ARNs.
const DETAILS_BATCH_SIZE: usize = 10;

/// Open and upcoming Health events of the last week in `region`, as
/// event ARN → latest description.
///
/// Accounts without a Business or Enterprise support plan get an empty map.
pub async fn describe_events(client: &Client, region: &str) -> Result<Value, AwsApiError> {
    match event_descriptions(client, region).await {
        Ok(events) => Ok(events),
        Err(err) => tolerate_subscription(err),
    }
}

fn tolerate_subscription(err: AwsApiError) -> Result<Value, AwsApiError> {
    if err.is_subscription_required() {
        warn!(
            error = %err,
            "AWS Health requires a Business, Enterprise On-Ramp or Enterprise support plan, skipping health events"
        );
        return Ok(Value::Object(Map::new()));
    }
    Err(err)
}

async fn event_descriptions(client: &Client, region: &str) -> Result<Value, AwsApiError> {
    let filter = EventFilter::builder()
        .start_times(
            DateTimeRange::builder()
                .from(to_aws(Utc::now() - Duration::days(LOOKBACK_DAYS)))
                .build(),
        )
        .regions(region)
        .event_status_codes(EventStatusCode::Open)
        .event_status_codes(EventStatusCode::Upcoming)
        .build();

    let pages = client
        .describe_events()
        .filter(filter)
        .into_paginator()
        .send()
        .try_collect()
        .await
        .aws(SERVICE, "DescribeEvents")?;
    let arns: Vec<String> = pages
        .iter()
        .flat_map(|page| page.events())
        .filter_map(|event| event.arn().map(str::to_string))
        .collect();
    if arns.is_empty() {
        info!("no AWS Health events match the filters");
        return Ok(Value::Object(Map::new()));
    }

    let mut descriptions = Map::new();
    for batch in arns.chunks(DETAILS_BATCH_SIZE) {
        let details = client
            .describe_event_details()
            .set_event_arns(Some(batch.to_vec()))
            .send()
            .await
            .aws(SERVICE, "DescribeEventDetails")?;
        for detail in details.successful_set() {
            if let Some(arn) = detail.event().and_then(|event| event.arn()) {
                let description = detail
                    .event_description()
                    .and_then(|d| d.latest_description())
                    .unwrap_or_default();
                descriptions.insert(arn.to_string(), Value::String(description.to_string()));
            }
        }
    }
    info!(events = descriptions.len(), "fetched AWS Health events");
    Ok(Value::Object(descriptions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscription_required_means_no_events() {
        let err = AwsApiError::new(
            SERVICE,
            "DescribeEvents",
            Some("SubscriptionRequiredException".into()),
            "The AWS Support plan does not allow this",
        );
        assert_eq!(tolerate_subscription(err).unwrap(), json!({}));
    }

    #[test]
    fn other_failures_propagate() {
        let err = AwsApiError::new(SERVICE, "DescribeEvents", Some("AccessDeniedException".into()), "denied");
        assert_eq!(tolerate_subscription(err.clone()).unwrap_err(), err);
    }
}

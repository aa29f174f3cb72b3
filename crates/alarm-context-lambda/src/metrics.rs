use alarm_context_core::alarm::MetricArray;
use alarm_context_core::dashboard::{self, MetricResult, View, WidgetSpec};
use alarm_context_core::model::{WidgetData, WidgetImage};
use alarm_context_core::query::MetricQuery;
use alarm_context_core::{AlarmWindow, AwsApiError};
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::types::{Dimension, Metric, MetricDataQuery, MetricStat, ScanBy};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::convert::to_aws;
use crate::errors::{AwsResultExt, build_error};

const SERVICE: &str = "cloudwatch";

/// Single-value cards read the latest datapoint this far before the window end,
/// where the last bucket is usually still empty.
const SINGLE_VALUE_LAG_MINUTES: i64 = 5;

/// Numeric series for the prompt start this long before the alarm.
pub const SERIES_LOOKBACK_MINUTES: i64 = 60;

/// The SDK form of a derived query.
pub fn sdk_query(query: &MetricQuery) -> Result<MetricDataQuery, AwsApiError> {
    let invalid = build_error(SERVICE, "GetMetricData");
    let built = match query {
        MetricQuery::Stat {
            id,
            namespace,
            metric_name,
            dimensions,
            period,
            stat,
            label,
            account_id,
        } => {
            let dimensions = dimensions
                .iter()
                .map(|d| Dimension::builder().name(&d.name).value(&d.value).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(&invalid)?;
            let metric = Metric::builder()
                .namespace(namespace)
                .metric_name(metric_name)
                .set_dimensions(Some(dimensions))
                .build();
            let metric_stat = MetricStat::builder()
                .metric(metric)
                .period(*period)
                .stat(stat)
                .build()
                .map_err(&invalid)?;
            MetricDataQuery::builder()
                .id(id)
                .metric_stat(metric_stat)
                .set_label(label.clone())
                .set_account_id(account_id.clone())
                .return_data(true)
                .build()
        }
        MetricQuery::Expression {
            id,
            expression,
            label,
            period,
        } => MetricDataQuery::builder()
            .id(id)
            .expression(expression)
            .set_label(label.clone())
            .set_period(*period)
            .return_data(true)
            .build(),
    };
    built.map_err(invalid)
}

/// `GetMetricData` over `[start, end]`, timestamps dropped.
pub async fn metric_data(
    client: &Client,
    queries: &[MetricQuery],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<MetricResult>, AwsApiError> {
    let sdk_queries = queries.iter().map(sdk_query).collect::<Result<Vec<_>, _>>()?;
    let output = client
        .get_metric_data()
        .set_metric_data_queries(Some(sdk_queries))
        .start_time(to_aws(start))
        .end_time(to_aws(end))
        .send()
        .await
        .aws(SERVICE, "GetMetricData")?;

    Ok(output
        .metric_data_results()
        .iter()
        .map(|result| MetricResult {
            id: result.id().unwrap_or_default().to_string(),
            label: result.label().map(str::to_string),
            status_code: result.status_code().map(|code| code.as_str().to_string()),
            values: result.values().to_vec(),
        })
        .collect())
}

/// Latest datapoint of the widget's first metric.
async fn latest_value(
    client: &Client,
    widget: &WidgetSpec,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Option<f64>, AwsApiError> {
    let Some(query) = widget.queries().into_iter().find_map(|query| match query {
        MetricQuery::Stat { .. } => Some(single_value_query(query)),
        MetricQuery::Expression { .. } => None,
    }) else {
        return Ok(None);
    };

    let output = client
        .get_metric_data()
        .metric_data_queries(sdk_query(&query)?)
        .start_time(to_aws(start))
        .end_time(to_aws(end - Duration::minutes(SINGLE_VALUE_LAG_MINUTES)))
        .scan_by(ScanBy::TimestampDescending)
        .max_datapoints(1)
        .send()
        .await
        .aws(SERVICE, "GetMetricData")?;

    Ok(output
        .metric_data_results()
        .first()
        .and_then(|result| result.values().first().copied()))
}

fn single_value_query(query: MetricQuery) -> MetricQuery {
    match query {
        MetricQuery::Stat {
            namespace,
            metric_name,
            dimensions,
            period,
            stat,
            ..
        } => MetricQuery::Stat {
            id: "m1".to_string(),
            namespace,
            metric_name,
            dimensions,
            period,
            stat,
            label: None,
            account_id: None,
        },
        expression => expression,
    }
}

/// PNG for a `MetricWidget` document.
pub async fn widget_image(client: &Client, widget: &Value) -> Result<Vec<u8>, AwsApiError> {
    let output = client
        .get_metric_widget_image()
        .metric_widget(widget.to_string())
        .output_format("png")
        .send()
        .await
        .aws(SERVICE, "GetMetricWidgetImage")?;
    Ok(output
        .metric_widget_image()
        .map(|blob| blob.as_ref().to_vec())
        .unwrap_or_default())
}

/// Render each widget: time series as PNGs, single values as inline cards.
pub async fn render_widgets(
    client: &Client,
    widgets: &[WidgetSpec],
    annotation_time: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<WidgetImage>, AwsApiError> {
    let mut images = Vec::with_capacity(widgets.len());
    for widget in widgets {
        let data = match widget.view {
            View::SingleValue => {
                let value = latest_value(client, widget, start, end).await?;
                WidgetData::Html(dashboard::single_value_card(
                    &widget.title,
                    value,
                    widget.first_metric_name(),
                ))
            }
            View::TimeSeries => {
                let request = widget.image_request(annotation_time, start, end);
                WidgetData::Png(widget_image(client, &request).await?)
            }
        };
        images.push(WidgetImage {
            widget: widget.widget_name(),
            data,
        });
    }
    info!(widgets = images.len(), "rendered dashboard widgets");
    Ok(images)
}

/// The same widgets as numbers, one `GetMetricData` per widget.
pub async fn widget_series(
    client: &Client,
    widgets: &[WidgetSpec],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    precision: u32,
) -> Result<Vec<Value>, AwsApiError> {
    let mut series = Vec::with_capacity(widgets.len());
    for widget in widgets {
        let queries = widget.queries();
        if queries.is_empty() {
            continue;
        }
        let results = metric_data(client, &queries, start, end).await?;
        debug!(widget = %widget.title, results = results.len(), "fetched widget series");
        series.push(dashboard::enrich_results(&queries, &results, precision));
    }
    Ok(series)
}

/// The alarm's own graph for the top of the email.
pub async fn main_graph(
    client: &Client,
    metrics: &MetricArray,
    region: &str,
    window: &AlarmWindow,
) -> Result<Vec<u8>, AwsApiError> {
    widget_image(client, &metrics.main_widget(region, window)).await
}

/// The alarm's metric data over the long window, for the prompt.
pub async fn alarm_metric_data(
    client: &Client,
    metrics: &MetricArray,
    account_id: &str,
    window: &AlarmWindow,
    precision: u32,
) -> Result<Value, AwsApiError> {
    let queries = metrics.data_queries(account_id);
    let results = metric_data(client, &queries, window.alarm_data_start(), window.end).await?;
    Ok(dashboard::enrich_results(&queries, &results, precision))
}

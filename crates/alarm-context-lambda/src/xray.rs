use std::collections::BTreeSet;

use alarm_context_core::CoreError;
use alarm_context_core::trace::{self, TraceRequest, TraceTimeline};
use aws_sdk_xray::Client;
use aws_sdk_xray::types::{
    ErrorRootCause, FaultRootCause, RootCauseException, TimeRangeType, TraceSummary,
};
use serde_json::{Value, json};
use tracing::info;

use crate::convert::to_aws;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "xray";

/// Trace data for the prompt, the email and the template reduction.
#[derive(Debug, Clone)]
pub struct TraceFindings {
    /// `{"TraceSummaries": [...]}`, at most three entries.
    pub summary: Value,
    /// Resources table and timeline, absent when no trace matched.
    pub html: Option<String>,
    pub root_cause_types: BTreeSet<String>,
}

impl Default for TraceFindings {
    fn default() -> Self {
        Self {
            summary: trace::summary_document(Vec::new()),
            html: None,
            root_cause_types: BTreeSet::new(),
        }
    }
}

/// Search traces and render the latest one.
///
/// The search starts 21 hours before the requested start.
pub async fn process_traces(
    client: &Client,
    region: &str,
    request: &TraceRequest,
) -> Result<TraceFindings, AlarmError> {
    let start = trace::widen_start(request.start);
    info!(filter_expression = %request.filter_expression, "searching X-Ray traces");

    let output = client
        .get_trace_summaries()
        .start_time(to_aws(start))
        .end_time(to_aws(request.end))
        .time_range_type(TimeRangeType::Event)
        .sampling(false)
        .filter_expression(&request.filter_expression)
        .send()
        .await
        .aws(SERVICE, "GetTraceSummaries")?;

    let summaries: Vec<Value> = output.trace_summaries().iter().map(summary_json).collect();
    for summary in &summaries {
        info!(trace_id = summary["Id"].as_str().unwrap_or_default(), "trace summary found");
    }

    let Some(trace_id) = trace::latest_trace_id(&summaries) else {
        info!("no trace matched the filter expression");
        return Ok(TraceFindings::default());
    };

    let traces = client
        .batch_get_traces()
        .trace_ids(&trace_id)
        .send()
        .await
        .aws(SERVICE, "BatchGetTraces")?;
    let timeline = match traces.traces().first() {
        Some(found) => {
            let documents = found.segments().iter().filter_map(|segment| segment.document());
            TraceTimeline::from_documents(trace_id, found.duration().unwrap_or_default(), documents)
                .map_err(CoreError::from)?
                .render(region, start, request.end)
        }
        None => String::new(),
    };

    let root_cause_types = trace::root_cause_types(&summaries);
    let resources = trace::resources_table(&summaries);
    let html = trace::trace_html(&resources, &timeline);
    Ok(TraceFindings {
        summary: trace::summary_document(summaries),
        html: (!html.is_empty()).then_some(html),
        root_cause_types,
    })
}

fn summary_json(summary: &TraceSummary) -> Value {
    json!({
        "Id": summary.id(),
        "StartTime": summary.start_time().map(|t| t.as_secs_f64()),
        "Duration": summary.duration(),
        "ResponseTime": summary.response_time(),
        "HasFault": summary.has_fault(),
        "HasError": summary.has_error(),
        "HasThrottle": summary.has_throttle(),
        "IsPartial": summary.is_partial(),
        "Http": summary.http().map(|http| json!({
            "HttpURL": http.http_url(),
            "HttpStatus": http.http_status(),
            "HttpMethod": http.http_method(),
            "UserAgent": http.user_agent(),
        })),
        "ServiceIds": summary
            .service_ids()
            .iter()
            .map(|service| json!({
                "Name": service.name(),
                "Names": service.names(),
                "AccountId": service.account_id(),
                "Type": service.r#type(),
            }))
            .collect::<Vec<_>>(),
        "InstanceIds": summary
            .instance_ids()
            .iter()
            .map(|instance| json!({ "Id": instance.id() }))
            .collect::<Vec<_>>(),
        "FaultRootCauses": summary.fault_root_causes().iter().map(fault_cause_json).collect::<Vec<_>>(),
        "ErrorRootCauses": summary.error_root_causes().iter().map(error_cause_json).collect::<Vec<_>>(),
    })
}

fn fault_cause_json(cause: &FaultRootCause) -> Value {
    let services: Vec<Value> = cause
        .services()
        .iter()
        .map(|service| {
            let path: Vec<Value> = service
                .entity_path()
                .iter()
                .map(|entity| entity_json(entity.name(), entity.exceptions(), entity.remote()))
                .collect();
            service_json(service.name(), service.r#type(), service.account_id(), path)
        })
        .collect();
    json!({ "Services": services, "ClientImpacting": cause.client_impacting() })
}

fn error_cause_json(cause: &ErrorRootCause) -> Value {
    let services: Vec<Value> = cause
        .services()
        .iter()
        .map(|service| {
            let path: Vec<Value> = service
                .entity_path()
                .iter()
                .map(|entity| entity_json(entity.name(), entity.exceptions(), entity.remote()))
                .collect();
            service_json(service.name(), service.r#type(), service.account_id(), path)
        })
        .collect();
    json!({ "Services": services, "ClientImpacting": cause.client_impacting() })
}

fn service_json(
    name: Option<&str>,
    kind: Option<&str>,
    account_id: Option<&str>,
    path: Vec<Value>,
) -> Value {
    json!({ "Name": name, "Type": kind, "AccountId": account_id, "EntityPath": path })
}

fn entity_json(
    name: Option<&str>,
    exceptions: &[RootCauseException],
    remote: Option<bool>,
) -> Value {
    json!({
        "Name": name,
        "Exceptions": exceptions
            .iter()
            .map(|e| json!({ "Name": e.name(), "Message": e.message() }))
            .collect::<Vec<_>>(),
        "Remote": remote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_xray::primitives::DateTime;
    use aws_sdk_xray::types::{
        FaultRootCauseEntity, FaultRootCauseService, InstanceIdDetail, ServiceId,
    };

    #[test]
    fn summary_projection_feeds_root_causes() {
        let summary = TraceSummary::builder()
            .id("1-65f2f2a0-abc")
            .start_time(DateTime::from_secs(1_710_420_800))
            .has_fault(true)
            .service_ids(ServiceId::builder().name("web").r#type("AWS::EC2::Instance").build())
            .instance_ids(InstanceIdDetail::builder().id("i-0123").build())
            .fault_root_causes(
                FaultRootCause::builder()
                    .services(
                        FaultRootCauseService::builder()
                            .name("orders")
                            .r#type("AWS::DynamoDB::Table")
                            .entity_path(
                                FaultRootCauseEntity::builder()
                                    .name("DynamoDB")
                                    .exceptions(
                                        RootCauseException::builder()
                                            .name("ProvisionedThroughputExceededException")
                                            .build(),
                                    )
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .build();

        let value = summary_json(&summary);
        assert_eq!(value["StartTime"], 1_710_420_800.0);
        assert_eq!(value["InstanceIds"][0]["Id"], "i-0123");

        let summaries = vec![value];
        assert_eq!(trace::latest_trace_id(&summaries).as_deref(), Some("1-65f2f2a0-abc"));
        assert!(trace::root_cause_types(&summaries).contains("AWS::DynamoDB::Table"));
        assert!(trace::resources_table(&summaries).contains("<td>web</td><td>AWS::EC2::Instance</td><td>i-0123</td>"));
    }

    #[test]
    fn no_trace_is_an_empty_shell() {
        let findings = TraceFindings::default();
        assert_eq!(findings.summary, json!({ "TraceSummaries": [] }));
        assert_eq!(findings.html, None);
    }
}

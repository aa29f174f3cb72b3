use std::collections::BTreeSet;

use alarm_context_core::handlers::ResourceInfo;
use alarm_context_core::html;
use alarm_context_core::model::{Tag, WidgetImage};
use alarm_context_core::{Handler, HandlerPlan, HandlerResult, RequestEnv, ResourceOutcome};
use chrono::Duration;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::clients::AwsClients;
use crate::errors::AlarmError;
use crate::logs::{self, LogFindings};
use crate::metrics::{self, SERIES_LOOKBACK_MINUTES};
use crate::resources;
use crate::xray::{self, TraceFindings};

/// A handler's result plus what the template reduction needs from the trace.
#[derive(Debug, Default)]
pub struct HandlerRun {
    pub result: HandlerResult,
    pub root_cause_types: BTreeSet<String>,
}

/// Everything resource executors produced that the plan itself does not carry.
#[derive(Debug, Default)]
struct Gathered {
    information: Vec<ResourceInfo>,
    tables: Vec<String>,
    tags: Vec<Tag>,
    log_tables: Vec<String>,
    log_events: Vec<Value>,
}

impl Gathered {
    fn absorb(&mut self, outcome: ResourceOutcome) {
        self.information.extend(outcome.information);
        self.tables.extend(outcome.tables);
        self.tags.extend(outcome.tags);
        self.log_tables.extend(outcome.log_tables);
        self.log_events.extend(outcome.log_events);
    }
}

/// Plan, describe, fetch and render for one alarm.
pub async fn run(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    handler: Handler,
    precision: u32,
) -> Result<HandlerRun, AlarmError> {
    let Some(mut plan) = handler.plan(env)? else {
        warn!(
            handler = handler.name(),
            namespace = env.namespace,
            metric_name = env.metric_name,
            dimensions = ?env.dimensions.names().collect::<Vec<_>>(),
            "no dimension shape matched"
        );
        return Ok(HandlerRun::default());
    };
    info!(
        handler = handler.name(),
        widgets = plan.widgets.len(),
        resources = plan.resources.len(),
        logs = plan.logs.len(),
        "planned alarm enrichment"
    );

    let mut gathered = Gathered::default();
    for request in std::mem::take(&mut plan.resources) {
        let mut outcome = resources::execute(clients, env, &request).await?;
        plan.absorb(&mut outcome);
        gathered.absorb(outcome);
    }

    let mut findings = LogFindings::default();
    for request in &plan.logs {
        logs::fetch(&clients.logs, env, request, &mut findings).await?;
    }
    plan.links.append(&mut findings.links);
    plan.notifications.append(&mut findings.notifications);

    let (start, end) = plan.widget_window.unwrap_or((env.window.start, env.window.end));
    let images = metrics::render_widgets(
        &clients.cloudwatch,
        &plan.widgets,
        &env.window.annotation_time(),
        start,
        end,
    )
    .await?;
    let series = metrics::widget_series(
        &clients.cloudwatch,
        &plan.widgets,
        env.window.change - Duration::minutes(SERIES_LOOKBACK_MINUTES),
        env.window.end,
        precision,
    )
    .await?;

    let trace = match &plan.trace {
        Some(request) => Some(xray::process_traces(&clients.xray, env.region, request).await?),
        None => None,
    };

    Ok(fold(plan, gathered, findings, images, series, trace))
}

fn fold(
    plan: HandlerPlan,
    gathered: Gathered,
    findings: LogFindings,
    images: Vec<WidgetImage>,
    series: Vec<Value>,
    trace: Option<TraceFindings>,
) -> HandlerRun {
    let mut resource_html: Vec<String> = gathered
        .information
        .iter()
        .map(|info| html::key_value_table(&info.title, &info.value))
        .collect();
    resource_html.extend(gathered.tables);

    let mut log_tables = gathered.log_tables;
    log_tables.extend(findings.tables);
    let mut log_events = gathered.log_events;
    log_events.extend(findings.events);

    let (trace_summary, trace_html, root_cause_types) = match trace {
        Some(found) => (Some(found.summary), found.html, found.root_cause_types),
        None => (None, None, BTreeSet::new()),
    };

    HandlerRun {
        result: HandlerResult {
            contextual_links: (!plan.links.is_empty()).then(|| html::link_buttons(&plan.links)),
            log_information: logs::log_information(&log_tables),
            log_events: non_empty_list(log_events),
            resource_information: non_empty(resource_html.concat()),
            resource_information_object: information_object(gathered.information),
            notifications: (!plan.notifications.is_empty())
                .then(|| html::notification_panels(&plan.notifications)),
            widget_images: non_empty_list(images),
            additional_metrics_with_timestamps_removed: non_empty_list(series),
            trace_summary,
            trace: trace_html,
            tags: non_empty_list(gathered.tags),
        },
        root_cause_types,
    }
}

/// A single description as-is; several keyed by title, later ones winning.
fn information_object(information: Vec<ResourceInfo>) -> Option<Value> {
    match information.len() {
        0 => None,
        1 => information.into_iter().next().map(|info| info.value),
        _ => Some(Value::Object(
            information
                .into_iter()
                .map(|info| (info.title, info.value))
                .collect::<Map<_, _>>(),
        )),
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn non_empty_list<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_context_core::model::{Link, Notification};
    use serde_json::json;

    fn info(title: &str, value: Value) -> ResourceInfo {
        ResourceInfo {
            title: title.into(),
            value,
        }
    }

    #[test]
    fn information_object_shapes() {
        assert_eq!(information_object(Vec::new()), None);
        assert_eq!(
            information_object(vec![info("Instance: i-0123", json!({ "InstanceId": "i-0123" }))]),
            Some(json!({ "InstanceId": "i-0123" }))
        );
        assert_eq!(
            information_object(vec![
                info("Canary: web", json!({ "Name": "web" })),
                info("Last Canary Run for web", json!({ "Id": "run-1" })),
            ]),
            Some(json!({
                "Canary: web": { "Name": "web" },
                "Last Canary Run for web": { "Id": "run-1" },
            }))
        );
    }

    #[test]
    fn empty_plan_folds_to_nulls() {
        let run = fold(
            HandlerPlan::new(),
            Gathered::default(),
            LogFindings::default(),
            Vec::new(),
            Vec::new(),
            None,
        );
        assert_eq!(run.result, HandlerResult::empty());
        assert!(run.root_cause_types.is_empty());
    }

    #[test]
    fn fold_renders_links_resources_and_logs() {
        let plan = HandlerPlan::new()
            .link("EC2 automatic dashboard", "https://console.aws.amazon.com/cloudwatch")
            .notify(Notification::new("Container Insights", "<p>off</p>"));
        let mut gathered = Gathered::default();
        gathered.absorb(
            ResourceOutcome {
                tags: vec![Tag::new("env", "prod")],
                log_tables: vec!["<p>commands</p>".into()],
                ..Default::default()
            }
            .info("Instance: i-0123", json!({ "InstanceId": "i-0123" })),
        );
        let findings = LogFindings {
            links: vec![Link::new("unused", "https://example.com")],
            tables: vec!["<p>events</p>".into()],
            events: vec![json!({ "message": "boom" })],
            ..Default::default()
        };

        let run = fold(plan, gathered, findings, Vec::new(), vec![json!({ "m1": [1.0] })], Some(TraceFindings::default()));
        let result = run.result;

        assert!(result.contextual_links.unwrap().contains("EC2 automatic dashboard"));
        assert!(result.notifications.unwrap().contains("Container Insights"));
        assert!(result.resource_information.unwrap().contains("Instance: i-0123"));
        assert_eq!(result.log_information.as_deref(), Some("<p>commands</p><p>events</p>"));
        assert_eq!(result.log_events, Some(vec![json!({ "message": "boom" })]));
        assert_eq!(result.tags, Some(vec![Tag::new("env", "prod")]));
        assert_eq!(result.trace_summary, Some(json!({ "TraceSummaries": [] })));
        assert_eq!(result.trace, None);
        assert_eq!(result.widget_images, None);
        assert_eq!(result.additional_metrics_with_timestamps_removed.map(|s| s.len()), Some(1));
    }

    #[test]
    fn rendered_trace_is_carried_through() {
        let trace = TraceFindings {
            html: Some("<table>timeline</table>".into()),
            root_cause_types: BTreeSet::from(["AWS::DynamoDB::Table".to_string()]),
            ..Default::default()
        };
        let run = fold(
            HandlerPlan::new(),
            Gathered::default(),
            LogFindings::default(),
            Vec::new(),
            Vec::new(),
            Some(trace),
        );
        assert_eq!(run.result.trace.as_deref(), Some("<table>timeline</table>"));
        assert!(run.root_cause_types.contains("AWS::DynamoDB::Table"));
    }
}

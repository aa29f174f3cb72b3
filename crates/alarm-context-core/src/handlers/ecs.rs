use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::{Link, Notification};

use super::{
    HandlerPlan, LogRequest, RECENT_MESSAGES_QUERY, RequestEnv, ResourceOutcome, ResourceRequest,
};

const INSIGHTS_NAMESPACE: &str = "ECS/ContainerInsights";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Service,
    Cluster,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(Kind::Service, &["ClusterName", "ServiceName"]),
    Shape::new(Kind::Cluster, &["ClusterName"]),
];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let Some(kind) = env.dimensions.classify(SHAPES) else {
        return Ok(None);
    };
    let region = env.region;
    let cluster = env.dimensions.value("ClusterName");

    let mut plan = HandlerPlan::new()
        .link("ECS automatic dashboard", links::alarm_dashboard(region, "ECS"))
        .link(
            format!("<b>ECS Console:</b> {cluster}"),
            links::console(region, &format!("ecs/v2/clusters/{cluster}/services?region={region}")),
        )
        .resource(ResourceRequest::EcsCluster {
            cluster: cluster.to_string(),
        });

    if kind == Kind::Service {
        let service = env.dimensions.value("ServiceName");
        let line = |metric: &str| {
            MetricLine::metric("AWS/ECS", metric)
                .dim("ClusterName", cluster)
                .dim("ServiceName", service)
        };
        plan = plan
            .link(
                format!("<b>ECS Console:</b> {service}"),
                links::console(region, &format!("ecs/v2/clusters/{cluster}/services/{service}/health?region={region}")),
            )
            .widgets([
                WidgetSpec::time_series(format!("{service} CPU Utilization"))
                    .stat("Average")
                    .period(60)
                    .line(line("CPUUtilization")),
                WidgetSpec::time_series(format!("{service} Memory Utilization"))
                    .stat("Average")
                    .period(60)
                    .line(line("MemoryUtilization")),
            ])
            .resource(ResourceRequest::EcsService {
                cluster: cluster.to_string(),
                service: service.to_string(),
            })
            .trace(env.service_trace(service, "AWS::ECS::Container")?);
    }

    Ok(Some(plan))
}

/// Whether a cluster's settings turn Container Insights on.
pub fn container_insights_enabled<'a>(
    settings: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> bool {
    settings
        .into_iter()
        .any(|(name, value)| name == "containerInsights" && value == "enabled")
}

/// Links and widgets that depend on whether Container Insights is on.
pub fn cluster_followup(
    env: &RequestEnv<'_>,
    cluster: &str,
    insights_enabled: bool,
) -> ResourceOutcome {
    let region = env.region;
    if !insights_enabled {
        let url = links::console(region, &format!("ecs/v2/account-settings/account-settings-edit?region={region}"));
        return ResourceOutcome {
            notifications: vec![Notification::new(
                "Container Insights",
                format!(
                    "<p>You do not have Container Insights enabled for this cluster. Use CloudWatch Container Insights to collect, aggregate, and summarize metrics and logs from your containerized applications and microservices.<a href=\"{url}\">Enable Container Insights</a>"
                ),
            )],
            ..Default::default()
        };
    }

    let line = |metric: &str| MetricLine::metric(INSIGHTS_NAMESPACE, metric).dim("ClusterName", cluster);
    let counts = [
        ("Container Instance Count", "ContainerInstanceCount"),
        ("Task Count", "TaskCount"),
        ("Service Count", "ServiceCount"),
    ];
    let utilized = [
        ("CPU Utilized", "CpuReserved", "CpuUtilized"),
        ("Memory Utilized", "MemoryReserved", "MemoryUtilized"),
        ("Ephemeral Storage Utilized", "EphemeralStorageReserved", "EphemeralStorageUtilized"),
    ];

    let mut widgets: Vec<WidgetSpec> = counts
        .iter()
        .map(|(title, metric)| {
            WidgetSpec::single_value(format!("{cluster} {title}"))
                .stat("Average")
                .period(60)
                .line(line(*metric))
        })
        .collect();

    widgets.extend(utilized.iter().map(|(title, reserved, used)| {
        WidgetSpec::time_series(format!("{cluster} {title}"))
            .stat("Average")
            .period(60)
            .percent_axis()
            .lines([
                MetricLine::expression("mm1m0 * 100 / mm0m0")
                    .id("expr1m0")
                    .label(cluster)
                    .option("stat", "Average")
                    .option("region", region),
                line(*reserved).id("mm0m0").hidden().option("stat", "Sum").option("region", region),
                line(*used).id("mm1m0").hidden().option("stat", "Sum").option("region", region),
            ])
    }));

    let series = [("Network Tx Bytes", "NetworkTxBytes"), ("Network Rx Bytes", "NetworkRxBytes")]
        .into_iter()
        .chain(counts);
    widgets.extend(series.map(|(title, metric)| {
        WidgetSpec::time_series(format!("{cluster} {title}"))
            .stat("Average")
            .period(60)
            .line(line(metric))
    }));

    ResourceOutcome {
        links: vec![Link::new(
            format!("<b>Container Insights:</b> {cluster}"),
            links::cloudwatch(
                region,
                &format!("container-insights:performance/ECS:Cluster?~(query~(controls~(CW*3a*3aECS.cluster~(~'{cluster}')))~context~())"),
            ),
        )],
        widgets,
        ..Default::default()
    }
}

/// Recent events from every `awslogs` group of a service's task definition,
/// plus one Logs Insights link across them.
pub fn service_logs(env: &RequestEnv<'_>, log_groups: &[String]) -> ResourceOutcome {
    if log_groups.is_empty() {
        return ResourceOutcome::default();
    }
    ResourceOutcome {
        links: vec![Link::new(
            "Log Insights",
            links::logs_insights(
                env.region,
                log_groups,
                RECENT_MESSAGES_QUERY,
                env.window.start,
                env.window.end,
            ),
        )],
        logs: log_groups
            .iter()
            .map(|group| LogRequest::group(group.as_str()).recent_events())
            .collect(),
        ..Default::default()
    }
}

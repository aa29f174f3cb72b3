//! Container Insights for EKS.
//!
//! Most shapes chart Metrics Insights queries. Every dimension value goes
//! through [`insights_literal`] before it is placed in a `WHERE` clause.

use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::query::{insights_identifier, insights_literal};

use super::{HandlerPlan, LogRequest, MissingLog, RequestEnv, ResourceRequest};

const NAMESPACE: &str = "ContainerInsights";

const CONTROLLER_ERRORS_QUERY: &str = "filter @logStream like /^kube-controller-manager-/
| filter @message like /Error/
| fields @logStream, @timestamp, @message
| sort @timestamp desc
| limit 10";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    ContainerFullPod,
    Container,
    FullPod,
    Node,
    Pod,
    Service,
    ClientCode,
    ServerCode,
    Namespace,
    Endpoint,
    Operation,
    PriorityLevel,
    RequestKind,
    Resource,
    Verb,
    Cluster,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(
        Kind::ContainerFullPod,
        &["ClusterName", "ContainerName", "FullPodName", "Namespace", "PodName"],
    ),
    Shape::new(Kind::Container, &["ClusterName", "ContainerName", "Namespace", "PodName"]),
    Shape::new(Kind::FullPod, &["ClusterName", "FullPodName", "Namespace", "PodName"]),
    Shape::new(Kind::Node, &["ClusterName", "InstanceId", "NodeName"]),
    Shape::new(Kind::Pod, &["ClusterName", "Namespace", "PodName"]),
    Shape::new(Kind::Service, &["ClusterName", "Namespace", "Service"]),
    Shape::new(Kind::ClientCode, &["ClusterName", "code", "method"]),
    Shape::new(Kind::ServerCode, &["ClusterName", "code", "verb"]),
    Shape::new(Kind::Namespace, &["ClusterName", "Namespace"]),
    Shape::new(Kind::Endpoint, &["ClusterName", "endpoint"]),
    Shape::new(Kind::Operation, &["ClusterName", "operation"]),
    Shape::new(Kind::PriorityLevel, &["ClusterName", "priority_level"]),
    Shape::new(Kind::RequestKind, &["ClusterName", "request_kind"]),
    Shape::new(Kind::Resource, &["ClusterName", "resource"]),
    Shape::new(Kind::Verb, &["ClusterName", "verb"]),
    Shape::new(Kind::Cluster, &["ClusterName"]),
];

const CONTAINER_METRICS: &[&str] = &[
    "container_cpu_utilization",
    "container_cpu_utilization_over_container_limit",
    "container_memory_utilization",
    "container_memory_utilization_over_container_limit",
    "container_memory_failures_total",
];

/// (metric, aggregate)
const FULL_POD_METRICS: &[(&str, &str)] = &[
    ("pod_cpu_utilization", "AVG"),
    ("pod_cpu_utilization_over_pod_limit", "AVG"),
    ("pod_memory_utilization", "AVG"),
    ("pod_memory_utilization_over_pod_limit", "AVG"),
    ("pod_network_rx_bytes", "AVG"),
    ("pod_network_tx_bytes", "AVG"),
    ("pod_number_of_running_containers", "SUM"),
    ("pod_number_of_container_restarts", "SUM"),
    ("pod_container_status_running", "SUM"),
    ("pod_container_status_terminated", "SUM"),
    ("pod_container_status_waiting", "SUM"),
    ("pod_container_status_waiting_reason_crash_loop_back_off", "SUM"),
];

/// (title, metric, aggregate). The first six are shared by the pod, service
/// and namespace shapes.
const POD_METRICS: &[(&str, &str, &str)] = &[
    ("Pod CPU Utilization", "pod_cpu_utilization", "AVG"),
    ("Pod CPU Utilization Over Limit", "pod_cpu_utilization_over_pod_limit", "AVG"),
    ("Pod Memory Utilization", "pod_memory_utilization", "AVG"),
    ("Pod Memory Over Limit", "pod_memory_utilization_over_pod_limit", "AVG"),
    ("Network RX", "pod_network_rx_bytes", "AVG"),
    ("Network TX", "pod_network_tx_bytes", "AVG"),
    ("Number of Running Containers", "pod_number_of_running_containers", "SUM"),
    ("Number of Container Restarts", "pod_number_of_container_restarts", "SUM"),
    ("Container Status Running", "pod_container_status_running", "SUM"),
    ("Container Status Terminated", "pod_container_status_terminated", "SUM"),
    ("Container Status Waiting", "pod_container_status_waiting", "SUM"),
    ("Reason Containers Waiting", "pod_container_status_waiting_reason_crashed", "SUM"),
];

const SHARED_POD_METRICS: usize = 6;

/// (title, metric, stat)
const NODE_METRICS: &[(&str, &str, &str)] = &[
    ("CPU Utilization", "node_cpu_utilization", "Average"),
    ("Memory Utilization", "node_memory_utilization", "Average"),
    ("Disk Utilization", "node_filesystem_utilization", "Average"),
    ("Network Utilization", "node_network_total_bytes", "Average"),
    ("Number of Running Pods", "node_number_of_running_pods", "Average"),
    ("Number of Containers", "node_number_of_running_containers", "Average"),
    ("Nodes Disk Pressure Status", "node_status_condition_disk_pressure", "Sum"),
    ("Nodes Memory Pressure Status", "node_status_condition_memory_pressure", "Sum"),
    ("Nodes Ready Status", "node_status_condition_ready", "Sum"),
    ("Nodes PID Pressure Status", "node_status_condition_pid_pressure", "Sum"),
    ("Pods Capacity", "node_status_capacity_pods", "Average"),
    ("Allocatable Pods", "node_status_allocatable_pods", "Average"),
];

const STATUS_CODES: &[(&str, &str)] = &[
    ("200", "StatusOK"),
    ("201", "StatusCreated"),
    ("204", "StatusNoContent"),
    ("307", "StatusTemporaryRedirect"),
    ("400", "StatusBadRequest"),
    ("401", "StatusUnauthorized"),
    ("403", "StatusForbidden"),
    ("404", "StatusNotFound"),
    ("405", "StatusMethodNotAllowed"),
    ("409", "StatusConflict"),
    ("410", "StatusGone"),
    ("422", "StatusUnprocessableEntity"),
    ("429", "StatusTooManyRequests"),
    ("500", "StatusInternalServerError"),
    ("503", "StatusServiceUnavailable"),
    ("504", "StatusServerTimeout"),
];

const OPERATION_METRICS: &[&str] = &[
    "apiserver_admission_controller_admission_duration_seconds",
    "apiserver_admission_step_admission_duration_seconds",
    "etcd_request_duration_seconds",
    "rest_client_request_duration_seconds",
];

const PRIORITY_LEVELS: &[&str] = &[
    "workload-low",
    "leader-election",
    "workload-high",
    "system",
    "exempt",
    "global-default",
    "catch-all",
    "node-high",
];

const REQUEST_KIND_METRICS: &[(&str, &str)] = &[
    ("Current inqueue requests", "apiserver_current_inqueue_requests"),
    ("Current inflight requests", "apiserver_current_inflight_requests"),
];

const RESOURCE_METRICS: &[(&str, &str)] = &[
    ("Storage objects", "apiserver_storage_objects"),
    ("Storage list duration", "apiserver_storage_list_duration_seconds"),
    ("Long running requests", "apiserver_longrunning_requests"),
];

const VERB_METRICS: &[(&str, &str)] = &[
    ("API server request duration", "apiserver_request_duration_seconds"),
    ("Rest client request duration", "rest_client_request_duration_seconds"),
];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let Some(kind) = env.dimensions.classify(SHAPES) else {
        return Ok(None);
    };
    let cluster = env.dimensions.value("ClusterName");
    let log_group = format!("/aws/eks/{cluster}/cluster");

    Ok(Some(
        HandlerPlan::new()
            .link("EKS automatic dashboard", links::legend_dashboard(env.region, "EKS:Cluster"))
            .widgets(cluster_widgets(env.region, cluster))
            .resource(ResourceRequest::EksCluster {
                cluster: cluster.to_string(),
            })
            .log(
                LogRequest::group(log_group.as_str())
                    .insights_results(format!("Controller manager errors: {log_group}"), CONTROLLER_ERRORS_QUERY)
                    .when_missing(MissingLog::Skip),
            )
            .widgets(shape_widgets(env, kind, cluster)?),
    ))
}

fn cluster_widgets(region: &str, cluster: &str) -> Vec<WidgetSpec> {
    [
        ("Cluster Nodes", "node_status_condition_ready"),
        ("Container Restarts", "pod_number_of_container_restarts"),
        ("Node CPU utilization", "node_cpu_utilization"),
        ("Node memory utilization", "node_memory_utilization"),
    ]
    .into_iter()
    .map(|(title, metric)| {
        WidgetSpec::time_series(format!("{title} - {cluster}"))
            .stat("Average")
            .period(60)
            .line(
                MetricLine::metric(NAMESPACE, metric)
                    .dim("ClusterName", cluster)
                    .label("Sum")
                    .color("#1f77b4")
                    .option("stat", "Sum")
                    .option("region", region),
            )
    })
    .collect()
}

fn query_widget(title: &str, expression: String, label: &str) -> WidgetSpec {
    WidgetSpec::time_series(title)
        .stat("Average")
        .period(300)
        .line(MetricLine::expression(expression).label(label))
}

/// `WHERE A = 'a' AND B = 'b'` over the named alarm dimensions.
fn where_clause(env: &RequestEnv<'_>, names: &[&str]) -> Result<String, CoreError> {
    let conditions = names
        .iter()
        .map(|name| Ok(format!("{name} = {}", insights_literal(env.dimensions.value(name))?)))
        .collect::<Result<Vec<_>, CoreError>>()?;
    Ok(format!("WHERE {}", conditions.join(" AND ")))
}

fn shape_widgets(
    env: &RequestEnv<'_>,
    kind: Kind,
    cluster: &str,
) -> Result<Vec<WidgetSpec>, CoreError> {
    let dims = env.dimensions;
    let cluster_only = || where_clause(env, &["ClusterName"]);

    let widgets = match kind {
        Kind::ContainerFullPod => {
            let filter = where_clause(env, &["ClusterName", "FullPodName", "Namespace", "PodName"])?;
            CONTAINER_METRICS
                .iter()
                .map(|metric| {
                    query_widget(
                        metric,
                        format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, FullPodName, Namespace, PodName) {filter}"),
                        "${LABEL}",
                    )
                })
                .collect()
        }
        Kind::Container => {
            let filter = where_clause(env, &["ClusterName", "ContainerName", "Namespace", "PodName"])?;
            CONTAINER_METRICS
                .iter()
                .map(|metric| {
                    query_widget(
                        metric,
                        format!("SELECT AVG({metric}) FROM ContainerInsights {filter}"),
                        dims.value("PodName"),
                    )
                })
                .collect()
        }
        Kind::FullPod => {
            let filter = where_clause(env, &["ClusterName", "FullPodName", "Namespace", "PodName"])?;
            FULL_POD_METRICS
                .iter()
                .map(|(metric, aggregate)| {
                    query_widget(
                        metric,
                        format!("SELECT {aggregate}({metric}) FROM SCHEMA(ContainerInsights, ClusterName, FullPodName, Namespace, PodName) {filter}"),
                        "${LABEL}",
                    )
                })
                .collect()
        }
        Kind::Node => NODE_METRICS
            .iter()
            .map(|(title, metric, stat)| {
                WidgetSpec::time_series(*title).stat("Average").period(300).line(
                    MetricLine::metric(NAMESPACE, *metric)
                        .dim("InstanceId", dims.value("InstanceId"))
                        .dim("NodeName", dims.value("NodeName"))
                        .dim("ClusterName", cluster)
                        .option("stat", *stat)
                        .label("NodeName: ${PROP('Dim.NodeName')}"),
                )
            })
            .collect(),
        Kind::Pod => {
            let filter = where_clause(env, &["ClusterName", "Namespace", "PodName"])?;
            POD_METRICS
                .iter()
                .map(|(title, metric, aggregate)| {
                    query_widget(
                        title,
                        format!("SELECT {aggregate}({metric}) FROM SCHEMA(ContainerInsights, ClusterName, FullPodName, Namespace, PodName) {filter} GROUP BY FullPodName ORDER BY MAX()"),
                        "${LABEL}",
                    )
                })
                .collect()
        }
        Kind::Service => {
            let filter = where_clause(env, &["ClusterName", "Namespace", "Service"])?;
            POD_METRICS[..SHARED_POD_METRICS]
                .iter()
                .chain(&[("Number of pods", "service_number_of_running_pods", "AVG")])
                .map(|(title, metric, aggregate)| {
                    query_widget(
                        title,
                        format!("SELECT {aggregate}({metric}) FROM ContainerInsights {filter}"),
                        dims.value("Service"),
                    )
                })
                .collect()
        }
        Kind::ClientCode | Kind::ServerCode => {
            let (metric, group) = match kind {
                Kind::ClientCode => ("rest_client_requests_total", "method"),
                _ => ("apiserver_request_total", "verb"),
            };
            let cluster_filter = cluster_only()?;
            STATUS_CODES
                .iter()
                .map(|(code, title)| {
                    query_widget(
                        &format!("{title} - HTTP {code}"),
                        format!("SELECT AVG({metric}) FROM ContainerInsights {cluster_filter} AND code = '{code}' GROUP BY \"{group}\""),
                        code,
                    )
                })
                .collect()
        }
        Kind::Namespace => {
            let filter = where_clause(env, &["ClusterName", "Namespace"])?;
            POD_METRICS[..SHARED_POD_METRICS]
                .iter()
                .chain(&[
                    ("Network TX Dropped", "pod_interface_network_tx_dropped", "AVG"),
                    ("Number of pods", "namespace_number_of_running_pods", "AVG"),
                ])
                .map(|(title, metric, aggregate)| {
                    query_widget(
                        title,
                        format!("SELECT {aggregate}({metric}) FROM ContainerInsights {filter}"),
                        dims.value("Namespace"),
                    )
                })
                .collect()
        }
        Kind::Endpoint => {
            let metric = insights_identifier(env.metric_name)?;
            vec![query_widget(
                metric,
                format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, endpoint) {} GROUP BY endpoint", cluster_only()?),
                "${LABEL}",
            )]
        }
        Kind::Operation => {
            let filter = cluster_only()?;
            OPERATION_METRICS
                .iter()
                .map(|metric| {
                    query_widget(
                        metric,
                        format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, operation) {filter} GROUP BY operation"),
                        dims.value("operation"),
                    )
                })
                .collect()
        }
        Kind::PriorityLevel => {
            let filter = cluster_only()?;
            PRIORITY_LEVELS
                .iter()
                .map(|level| {
                    query_widget(
                        level,
                        format!("SELECT AVG(apiserver_flowcontrol_request_concurrency_limit) FROM SCHEMA(ContainerInsights, ClusterName, priority_level) {filter} AND priority_level = '{level}'"),
                        level,
                    )
                })
                .collect()
        }
        Kind::RequestKind => {
            let filter = cluster_only()?;
            REQUEST_KIND_METRICS
                .iter()
                .map(|(title, metric)| {
                    query_widget(
                        title,
                        format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, request_kind) {filter} GROUP BY request_kind"),
                        "${LABEL}",
                    )
                })
                .collect()
        }
        Kind::Resource => {
            let filter = where_clause(env, &["ClusterName", "resource"])?;
            RESOURCE_METRICS
                .iter()
                .map(|(title, metric)| {
                    query_widget(
                        title,
                        format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, resource) {filter}"),
                        metric,
                    )
                })
                .collect()
        }
        Kind::Verb => {
            let filter = cluster_only()?;
            VERB_METRICS
                .iter()
                .map(|(title, metric)| {
                    query_widget(
                        title,
                        format!("SELECT AVG({metric}) FROM SCHEMA(ContainerInsights, ClusterName, verb) {filter} GROUP BY verb"),
                        metric,
                    )
                })
                .collect()
        }
        Kind::Cluster => Vec::new(),
    };
    Ok(widgets)
}

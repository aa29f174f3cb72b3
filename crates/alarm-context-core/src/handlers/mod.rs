//! Per-namespace enrichment planners.
//!
//! A planner turns the alarm's dimensions into a [`HandlerPlan`]: links,
//! widgets and the describe, log and trace lookups worth making. Planners are
//! pure; the Lambda crate executes plans against AWS.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::alarm::AlarmWindow;
use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::DimensionSet;
use crate::error::CoreError;
use crate::model::{Link, Notification, Tag};
use crate::query::xray_literal;
use crate::trace::TraceRequest;

pub mod apigateway;
pub mod dynamodb;
pub mod ec2;
pub mod ecs;
pub mod eks;
pub mod elb;
pub mod lambda;
pub mod rds;
pub mod s3;
pub mod sns;
pub mod ssm;
pub mod synthetics;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Ec2,
    Ecs,
    Rds,
    S3,
    Eks,
    DynamoDb,
    Lambda,
    ApplicationElb,
    ApiGateway,
    Sns,
    Synthetics,
    SsmRunCommand,
}

const NAMESPACES: &[(&str, Handler)] = &[
    ("AWS/EC2", Handler::Ec2),
    ("AWS/ECS", Handler::Ecs),
    ("ECS/ContainerInsights", Handler::Ecs),
    ("AWS/RDS", Handler::Rds),
    ("AWS/S3", Handler::S3),
    ("AWS/S3/Storage-Lens", Handler::S3),
    ("ContainerInsights", Handler::Eks),
    ("AWS/DynamoDB", Handler::DynamoDb),
    ("AWS/Lambda", Handler::Lambda),
    ("AWS/ApplicationELB", Handler::ApplicationElb),
    ("AWS/ApiGateway", Handler::ApiGateway),
    ("AWS/SNS", Handler::Sns),
    ("CloudWatchSynthetics", Handler::Synthetics),
    ("AWS/SSM-RunCommand", Handler::SsmRunCommand),
];

impl Handler {
    /// Handler registered for a CloudWatch namespace, if any.
    pub fn for_namespace(namespace: &str) -> Option<Self> {
        NAMESPACES
            .iter()
            .find(|(ns, _)| *ns == namespace)
            .map(|(_, handler)| *handler)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Handler::Ec2 => "ec2",
            Handler::Ecs => "ecs",
            Handler::Rds => "rds",
            Handler::S3 => "s3",
            Handler::Eks => "eks",
            Handler::DynamoDb => "dynamodb",
            Handler::Lambda => "lambda",
            Handler::ApplicationElb => "application_elb",
            Handler::ApiGateway => "api_gateway",
            Handler::Sns => "sns",
            Handler::Synthetics => "synthetics",
            Handler::SsmRunCommand => "ssm_run_command",
        }
    }

    /// Build the plan. `Ok(None)` means no dimension shape matched.
    pub fn plan(&self, env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
        match self {
            Handler::Ec2 => ec2::plan(env),
            Handler::Ecs => ecs::plan(env),
            Handler::Rds => rds::plan(env),
            Handler::S3 => s3::plan(env),
            Handler::Eks => eks::plan(env),
            Handler::DynamoDb => dynamodb::plan(env),
            Handler::Lambda => lambda::plan(env),
            Handler::ApplicationElb => elb::plan(env),
            Handler::ApiGateway => apigateway::plan(env),
            Handler::Sns => sns::plan(env),
            Handler::Synthetics => synthetics::plan(env),
            Handler::SsmRunCommand => ssm::plan(env),
        }
    }
}

/// What a planner knows about the alarm.
#[derive(Debug, Clone, Copy)]
pub struct RequestEnv<'a> {
    pub namespace: &'a str,
    pub metric_name: &'a str,
    pub dimensions: &'a DimensionSet,
    /// Region code, e.g. `us-east-1`.
    pub region: &'a str,
    pub account_id: &'a str,
    pub window: &'a AlarmWindow,
}

impl RequestEnv<'_> {
    /// A trace lookup over the chart window.
    pub fn trace(&self, filter_expression: String) -> TraceRequest {
        TraceRequest {
            filter_expression,
            start: self.window.start,
            end: self.window.end,
        }
    }

    /// `!OK` traces through a named service of the given type in this account.
    pub fn service_trace(&self, name: &str, service_type: &str) -> Result<TraceRequest, CoreError> {
        Ok(self.trace(format!(
            "!OK and service(id(name: {}, type: \"{service_type}\")) AND service(id(account.id: {}))",
            xray_literal(name)?,
            xray_literal(self.account_id)?
        )))
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything a handler wants fetched and shown for one alarm.
#[derive(Debug, Clone, Default)]
pub struct HandlerPlan {
    pub links: Vec<Link>,
    pub notifications: Vec<Notification>,
    pub widgets: Vec<WidgetSpec>,
    /// Chart window override for slow metrics such as Storage Lens.
    pub widget_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub resources: Vec<ResourceRequest>,
    pub logs: Vec<LogRequest>,
    pub trace: Option<TraceRequest>,
}

impl HandlerPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(mut self, title: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.push(Link::new(title, url));
        self
    }

    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn widgets(mut self, widgets: impl IntoIterator<Item = WidgetSpec>) -> Self {
        self.widgets.extend(widgets);
        self
    }

    pub fn resource(mut self, request: ResourceRequest) -> Self {
        self.resources.push(request);
        self
    }

    pub fn log(mut self, request: LogRequest) -> Self {
        self.logs.push(request);
        self
    }

    pub fn trace(mut self, request: TraceRequest) -> Self {
        self.trace = Some(request);
        self
    }

    /// Fold in what a describe call found out.
    pub fn absorb(&mut self, outcome: &mut ResourceOutcome) {
        self.links.append(&mut outcome.links);
        self.notifications.append(&mut outcome.notifications);
        self.widgets.append(&mut outcome.widgets);
        self.logs.append(&mut outcome.logs);
        if let Some(trace) = outcome.trace.take() {
            self.trace = Some(trace);
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A describe call whose result enriches the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRequest {
    Ec2Instance { instance_id: String },
    AutoScalingGroup { name: String },
    EcsCluster { cluster: String },
    EcsService { cluster: String, service: String },
    RdsCluster { cluster_id: String },
    RdsInstance(RdsInstanceFilter),
    S3BucketTags { bucket: String },
    EksCluster { cluster: String },
    DynamoDbTable { table: String },
    LambdaFunction { function: String },
    LoadBalancer { load_balancer: Option<String>, target_group: Option<String> },
    RestApi { api_name: String, stage: Option<String> },
    SnsTopic { topic_arn: String },
    Canary { name: String },
    SsmFailedCommands { after: DateTime<Utc>, before: DateTime<Utc> },
}

impl ResourceRequest {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceRequest::Ec2Instance { .. } => "ec2_instance",
            ResourceRequest::AutoScalingGroup { .. } => "auto_scaling_group",
            ResourceRequest::EcsCluster { .. } => "ecs_cluster",
            ResourceRequest::EcsService { .. } => "ecs_service",
            ResourceRequest::RdsCluster { .. } => "rds_cluster",
            ResourceRequest::RdsInstance(_) => "rds_instance",
            ResourceRequest::S3BucketTags { .. } => "s3_bucket_tags",
            ResourceRequest::EksCluster { .. } => "eks_cluster",
            ResourceRequest::DynamoDbTable { .. } => "dynamodb_table",
            ResourceRequest::LambdaFunction { .. } => "lambda_function",
            ResourceRequest::LoadBalancer { .. } => "load_balancer",
            ResourceRequest::RestApi { .. } => "rest_api",
            ResourceRequest::SnsTopic { .. } => "sns_topic",
            ResourceRequest::Canary { .. } => "canary",
            ResourceRequest::SsmFailedCommands { .. } => "ssm_failed_commands",
        }
    }
}

/// `DescribeDBInstances` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdsInstanceFilter {
    InstanceId(String),
    ResourceId(String),
}

/// Where log events come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSource {
    Group(String),
    /// A stream name searched for across every log group.
    Stream(String),
}

/// What to show when a log group turns out not to exist.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingLog {
    Skip,
    Note(String),
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsightsQuery {
    pub title: String,
    pub query: String,
}

/// A log lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRequest {
    pub source: LogSource,
    pub recent_events: bool,
    /// Query behind a "Log Insights" console button.
    pub insights_link: Option<String>,
    /// Query run now, results shown as a table.
    pub insights_results: Option<InsightsQuery>,
    /// `Some` checks the group exists before anything else is fetched.
    pub when_missing: Option<MissingLog>,
}

impl LogRequest {
    fn new(source: LogSource) -> Self {
        Self {
            source,
            recent_events: false,
            insights_link: None,
            insights_results: None,
            when_missing: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(LogSource::Group(name.into()))
    }

    pub fn stream(name: impl Into<String>) -> Self {
        Self::new(LogSource::Stream(name.into()))
    }

    pub fn recent_events(mut self) -> Self {
        self.recent_events = true;
        self
    }

    pub fn insights_link(mut self, query: &str) -> Self {
        self.insights_link = Some(query.to_string());
        self
    }

    pub fn insights_results(mut self, title: impl Into<String>, query: &str) -> Self {
        self.insights_results = Some(InsightsQuery {
            title: title.into(),
            query: query.to_string(),
        });
        self
    }

    pub fn when_missing(mut self, missing: MissingLog) -> Self {
        self.when_missing = Some(missing);
        self
    }
}

/// Generic Logs Insights query for recent messages.
pub const RECENT_MESSAGES_QUERY: &str = "fields @timestamp, @message
| sort @timestamp desc
| limit 100";

/// Logs Insights query for likely failures.
pub const ERRORS_QUERY: &str = "filter @message like /(?i)(Exception|error|fail)/
| fields @timestamp, @message
| sort @timestamp desc
| limit 100";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A described resource, shown as a key/value table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub title: String,
    pub value: Value,
}

/// What executing a [`ResourceRequest`] added.
#[derive(Debug, Clone, Default)]
pub struct ResourceOutcome {
    pub information: Vec<ResourceInfo>,
    /// Pre-rendered tables, e.g. tag lists.
    pub tables: Vec<String>,
    pub links: Vec<Link>,
    pub notifications: Vec<Notification>,
    pub widgets: Vec<WidgetSpec>,
    pub logs: Vec<LogRequest>,
    pub trace: Option<TraceRequest>,
    pub tags: Vec<Tag>,
    /// Log-like rows produced directly by the describe call.
    pub log_tables: Vec<String>,
    pub log_events: Vec<Value>,
}

impl ResourceOutcome {
    pub fn info(mut self, title: impl Into<String>, value: Value) -> Self {
        self.information.push(ResourceInfo {
            title: title.into(),
            value,
        });
        self
    }

    pub fn merge(&mut self, mut other: ResourceOutcome) {
        self.information.append(&mut other.information);
        self.tables.append(&mut other.tables);
        self.links.append(&mut other.links);
        self.notifications.append(&mut other.notifications);
        self.widgets.append(&mut other.widgets);
        self.logs.append(&mut other.logs);
        if other.trace.is_some() {
            self.trace = other.trace;
        }
        self.tags.append(&mut other.tags);
        self.log_tables.append(&mut other.log_tables);
        self.log_events.append(&mut other.log_events);
    }
}

// ---------------------------------------------------------------------------
// Widget helpers
// ---------------------------------------------------------------------------

/// One time series widget per `(metric, stat)`, titled by the metric.
pub(crate) fn metric_widgets(
    namespace: &str,
    dimensions: &[(&str, &str)],
    catalogue: &[(&str, &str)],
    period: i32,
) -> Vec<WidgetSpec> {
    catalogue
        .iter()
        .map(|(metric, stat)| {
            WidgetSpec::time_series(*metric)
                .stat(stat)
                .period(period)
                .line(metric_line(namespace, metric, dimensions))
        })
        .collect()
}

pub(crate) fn metric_line(
    namespace: &str,
    metric: &str,
    dimensions: &[(&str, &str)],
) -> MetricLine {
    dimensions
        .iter()
        .fold(MetricLine::metric(namespace, metric), |line, (name, value)| line.dim(*name, *value))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::model::Dimension;

    pub struct Fixture {
        pub dimensions: DimensionSet,
        pub window: AlarmWindow,
    }

    impl Fixture {
        pub fn new(dimensions: &[(&str, &str)]) -> Self {
            let dimensions: Vec<Dimension> =
                dimensions.iter().map(|(n, v)| Dimension::new(*n, *v)).collect();
            Self {
                dimensions: DimensionSet::new(&dimensions),
                window: AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap(),
            }
        }

        pub fn env<'a>(&'a self, namespace: &'a str, metric_name: &'a str) -> RequestEnv<'a> {
            RequestEnv {
                namespace,
                metric_name,
                dimensions: &self.dimensions,
                region: "us-east-1",
                account_id: "123456789012",
                window: &self.window,
            }
        }
    }

    pub fn titles(plan: &HandlerPlan) -> Vec<String> {
        plan.widgets.iter().map(|w| w.title.clone()).collect()
    }

    pub fn link_urls(plan: &HandlerPlan) -> Vec<String> {
        plan.links.iter().map(|l| l.url.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;

    #[test]
    fn namespaces_dispatch_to_handlers() {
        assert_eq!(Handler::for_namespace("AWS/EC2"), Some(Handler::Ec2));
        assert_eq!(Handler::for_namespace("ECS/ContainerInsights"), Some(Handler::Ecs));
        assert_eq!(Handler::for_namespace("ContainerInsights"), Some(Handler::Eks));
        assert_eq!(Handler::for_namespace("AWS/S3/Storage-Lens"), Some(Handler::S3));
        assert_eq!(Handler::for_namespace("Custom/Foo"), None);
    }

    #[test]
    fn service_trace_quotes_values() {
        let fixture = Fixture::new(&[]);
        let env = fixture.env("AWS/SNS", "NumberOfNotificationsFailed");
        let trace = env.service_trace("orders", "AWS::SNS::Topic").unwrap();
        assert_eq!(
            trace.filter_expression,
            r#"!OK and service(id(name: "orders", type: "AWS::SNS::Topic")) AND service(id(account.id: "123456789012"))"#
        );
        assert_eq!(trace.start, fixture.window.start);
        assert!(env.service_trace("a\"b", "AWS::SNS::Topic").is_err());
    }

    #[test]
    fn absorb_moves_followups_into_plan() {
        let mut plan = HandlerPlan::new().link("a", "https://a");
        let mut outcome = ResourceOutcome {
            links: vec![Link::new("b", "https://b")],
            logs: vec![LogRequest::group("/aws/lambda/f").recent_events()],
            ..Default::default()
        };
        plan.absorb(&mut outcome);
        assert_eq!(plan.links.len(), 2);
        assert_eq!(plan.logs.len(), 1);
        assert!(outcome.links.is_empty());
    }

    #[test]
    fn metric_widgets_follow_catalogue() {
        let widgets = metric_widgets("AWS/RDS", &[("DBInstanceIdentifier", "db1")], &[("CPUUtilization", "Average"), ("DatabaseConnections", "Sum")], 60);
        assert_eq!(widgets.len(), 2);
        assert_eq!(widgets[1].stat.as_deref(), Some("Sum"));
        assert_eq!(
            widgets[0].metrics[0],
            MetricLine::metric("AWS/RDS", "CPUUtilization").dim("DBInstanceIdentifier", "db1")
        );
    }
}

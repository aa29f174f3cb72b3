use std::collections::BTreeSet;

use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::{Link, Notification};
use crate::query::{insights_literal, xray_literal};
use crate::trace::TraceRequest;

use super::{
    HandlerPlan, RdsInstanceFilter, RequestEnv, ResourceOutcome, ResourceRequest, metric_widgets,
};

const NAMESPACE: &str = "AWS/RDS";

/// Performance Insights counters worth charting, across engines.
pub const PERFORMANCE_INSIGHTS_METRICS: &[&str] = &[
    "os.memory.active",
    "os.memory.free",
    "os.network.rx",
    "os.network.tx",
    // PostgreSQL
    "db.SQL.tup_inserted",
    "db.SQL.tup_updated",
    "db.SQL.tup_deleted",
    "db.Checkpoint.checkpoints_req",
    "db.IO.blk_read_time",
    "db.Concurrency.deadlocks",
    "db.Transactions.xact_commit",
    "db.Transactions.xact_rollback",
    // MariaDB and MySQL
    "db.SQL.Innodb_rows_read",
    "db.SQL.Select_scan",
    "db.SQL.Select_range",
    "db.Users.Connections",
    "db.Locks.Table_locks_waited",
    "db.IO.Innodb_pages_written",
    "db.Cache.Innodb_buffer_pool_reads",
    "db.SQL.Slow_queries",
    // SQL Server
    "db.Buffer Manager.Buffer cache hit ratio",
    "db.Buffer Manager.Page life expectancy",
    "db.General Statistics.User Connections",
    "db.SQL Statistics.Batch Requests",
    "db.Locks.Number of Deadlocks (_Total)",
    "db.Databases.Active Transactions (_Total)",
    "db.Memory Manager.Memory Grants Pending",
    "db.General Statistics.Processes blocked",
    // Oracle
    "db.User.CPU used by this session",
    "db.User.SQL*Net roundtrips to/from client",
    "db.Redo.redo size",
    "db.SQL.table scan rows gotten",
    "db.Cache.DBWR checkpoints",
    "db.Cache.physical reads",
    "db.SQL.parse count (hard)",
    "db.User.user commits",
];

const STANDARD_METRICS: &[(&str, &str)] = &[
    ("CPUUtilization", "Average"),
    ("DatabaseConnections", "Sum"),
    ("FreeStorageSpace", "Average"),
    ("FreeableMemory", "Average"),
    ("ReadIOPS", "Average"),
    ("ReadLatency", "Average"),
    ("ReadThroughput", "Average"),
    ("WriteIOPS", "Average"),
    ("WriteLatency", "Average"),
    ("WriteThroughput", "Average"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    ClusterEngine,
    Cluster,
    Instance,
    ResourceId,
    DatabaseClass,
    EngineName,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(Kind::ClusterEngine, &["DBClusterIdentifier", "EngineName"]),
    Shape::new(Kind::Cluster, &["DBClusterIdentifier"]),
    Shape::new(Kind::Instance, &["DBInstanceIdentifier"]),
    Shape::new(Kind::ResourceId, &["DbiResourceId"]),
    Shape::new(Kind::DatabaseClass, &["DatabaseClass"]),
    Shape::new(Kind::EngineName, &["EngineName"]),
];

/// Which kind of database a Performance Insights hint is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseTarget<'a> {
    Cluster(&'a str),
    Instance(&'a str),
}

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let base = HandlerPlan::new()
        .link("RDS automatic dashboard", links::legend_dashboard(env.region, "RDS"))
        .link("RDS Cluster automatic dashboard", links::legend_dashboard(env.region, "RDSCluster"));
    let dims = env.dimensions;

    let Some(kind) = dims.classify(SHAPES) else {
        if dims.is_empty() && !env.metric_name.is_empty() {
            return Ok(Some(base.widgets(standard_widgets(None))));
        }
        return Ok(None);
    };

    let plan = match kind {
        Kind::ClusterEngine => {
            let cluster = dims.value("DBClusterIdentifier");
            let engine = dims.value("EngineName");
            base.widgets(["VolumeWriteIOPs", "VolumeBytesUsed", "VolumeReadIOPs"].map(|metric| {
                WidgetSpec::time_series(metric).stat("Average").period(60).line(
                    MetricLine::metric(NAMESPACE, metric)
                        .dim("DBClusterIdentifier", cluster)
                        .dim("EngineName", engine),
                )
            }))
        }
        Kind::Cluster => {
            let cluster = dims.value("DBClusterIdentifier");
            base.widgets(standard_widgets(Some(("DBClusterIdentifier", cluster))))
                .resource(ResourceRequest::RdsCluster {
                    cluster_id: cluster.to_string(),
                })
                .trace(database_trace(env, cluster)?)
        }
        Kind::Instance => base.resource(ResourceRequest::RdsInstance(RdsInstanceFilter::InstanceId(
            dims.value("DBInstanceIdentifier").to_string(),
        ))),
        Kind::ResourceId => base.resource(ResourceRequest::RdsInstance(
            RdsInstanceFilter::ResourceId(dims.value("DbiResourceId").to_string()),
        )),
        Kind::DatabaseClass => {
            base.widgets(standard_widgets(Some(("DatabaseClass", dims.value("DatabaseClass")))))
        }
        Kind::EngineName => base.widgets(standard_widgets(Some(("EngineName", dims.value("EngineName"))))),
    };
    Ok(Some(plan))
}

/// The ten headline RDS widgets, optionally narrowed to one dimension.
pub fn standard_widgets(dimension: Option<(&str, &str)>) -> Vec<WidgetSpec> {
    let dimensions: Vec<(&str, &str)> = dimension.into_iter().collect();
    metric_widgets(NAMESPACE, &dimensions, STANDARD_METRICS, 60)
}

/// Widgets and trace for an instance once its identifier is known.
pub fn instance_followup(
    env: &RequestEnv<'_>,
    instance_id: &str,
) -> Result<ResourceOutcome, CoreError> {
    Ok(ResourceOutcome {
        widgets: standard_widgets(Some(("DBInstanceIdentifier", instance_id))),
        trace: Some(database_trace(env, instance_id)?),
        ..Default::default()
    })
}

/// `Database::SQL` traces whose fault root cause names the database.
pub fn database_trace(env: &RequestEnv<'_>, identifier: &str) -> Result<TraceRequest, CoreError> {
    Ok(env.trace(format!(
        "rootcause.fault.service {{ name CONTAINS {} }} AND (service(id(type: \"Database::SQL\")))",
        xray_literal(identifier)?
    )))
}

/// One widget per charted counter the instances publish, with a
/// `DB_PERF_INSIGHTS` line per instance.
pub fn performance_insights_widgets(
    resource_ids: &[String],
    available: &BTreeSet<String>,
) -> Result<Vec<WidgetSpec>, CoreError> {
    let literals = resource_ids
        .iter()
        .map(|id| Ok((id.as_str(), insights_literal(id)?)))
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(PERFORMANCE_INSIGHTS_METRICS
        .iter()
        .filter(|metric| available.contains(**metric))
        .map(|metric| {
            WidgetSpec::time_series(*metric).stat("Average").period(300).lines(
                literals.iter().map(|(id, literal)| {
                    MetricLine::expression(format!("DB_PERF_INSIGHTS('RDS', {literal}, '{metric}.avg')")).label(id)
                }),
            )
        })
        .collect())
}

/// Link and notice shown when Performance Insights is off.
pub fn performance_insights_disabled(region: &str, target: DatabaseTarget<'_>) -> ResourceOutcome {
    let (noun, link) = match target {
        DatabaseTarget::Cluster(id) => (
            "cluster",
            Link::new(
                format!("<b>Modify DB Cluster:</b> {id}"),
                links::console(region, &format!("rds/home?region={region}#modify-cluster:id={id}")),
            ),
        ),
        DatabaseTarget::Instance(id) => (
            "instance",
            Link::new(
                format!("<b>Modify DB Instance:</b> {id}"),
                links::console(region, &format!("rds/home?region={region}#modify-instance:id={id}")),
            ),
        ),
    };
    let body = format!(
        "Amazon RDS Performance Insights enables you to monitor and explore different dimensions of database load based on data captured from a running DB instance. <a href=\"{}\">{}</a>",
        link.url, link.title
    );
    ResourceOutcome {
        notifications: vec![Notification::new(
            format!("You do not have Performance Insights enabled for this {noun}"),
            body,
        )],
        links: vec![link],
        ..Default::default()
    }
}

use std::collections::BTreeSet;

use alarm_context_core::handlers::RdsInstanceFilter;
use alarm_context_core::handlers::rds::{
    DatabaseTarget, instance_followup, performance_insights_disabled, performance_insights_widgets,
};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_pi::types::ServiceType;
use aws_sdk_rds::types::{DbCluster, DbInstance, Filter};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{tag, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt, build_error};

const SERVICE: &str = "rds";

pub async fn cluster(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    cluster_id: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .rds
        .describe_db_clusters()
        .db_cluster_identifier(cluster_id)
        .send()
        .await
        .aws(SERVICE, "DescribeDBClusters")?;
    let Some(found) = output.db_clusters().first() else {
        warn!(cluster_id, "DB cluster not found");
        return Ok(ResourceOutcome::default());
    };

    let mut outcome = ResourceOutcome::default().info(format!("RDS Cluster: {cluster_id}"), cluster_json(found));
    outcome.tags = found.tag_list().iter().filter_map(|t| tag(t.key(), t.value())).collect();

    let instances = describe_instances(clients, "db-cluster-id", cluster_id).await?;
    let resource_ids = insights_resource_ids(&instances);
    let target = DatabaseTarget::Cluster(cluster_id);
    outcome.merge(performance_insights(clients, env.region, &resource_ids, target).await?);
    Ok(outcome)
}

pub async fn instance(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    filter: &RdsInstanceFilter,
) -> Result<ResourceOutcome, AlarmError> {
    let (filter_name, value) = match filter {
        RdsInstanceFilter::InstanceId(id) => ("db-instance-id", id.as_str()),
        RdsInstanceFilter::ResourceId(id) => ("dbi-resource-id", id.as_str()),
    };
    let instances = describe_instances(clients, filter_name, value).await?;
    let Some(found) = instances.first() else {
        warn!(filter = filter_name, value, "DB instance not found");
        return Ok(ResourceOutcome::default());
    };
    let identifier = text(found.db_instance_identifier()).unwrap_or(value);

    let mut outcome =
        instance_followup(env, identifier)?.info(format!("RDS Instance: {identifier}"), instance_json(found));
    outcome.tags = found.tag_list().iter().filter_map(|t| tag(t.key(), t.value())).collect();

    let resource_ids = insights_resource_ids(&instances);
    let target = DatabaseTarget::Instance(identifier);
    outcome.merge(performance_insights(clients, env.region, &resource_ids, target).await?);
    Ok(outcome)
}

async fn describe_instances(
    clients: &AwsClients,
    filter_name: &str,
    value: &str,
) -> Result<Vec<DbInstance>, AlarmError> {
    let filter = Filter::builder()
        .name(filter_name)
        .values(value)
        .build()
        .map_err(build_error(SERVICE, "DescribeDBInstances"))?;
    let output = clients
        .rds
        .describe_db_instances()
        .filters(filter)
        .send()
        .await
        .aws(SERVICE, "DescribeDBInstances")?;
    info!(filter = filter_name, value, instances = output.db_instances().len(), "described DB instances");
    Ok(output.db_instances().to_vec())
}

/// `DbiResourceId` of every instance with Performance Insights on.
fn insights_resource_ids(instances: &[DbInstance]) -> Vec<String> {
    instances
        .iter()
        .filter(|instance| instance.performance_insights_enabled().unwrap_or(false))
        .filter_map(|instance| text(instance.dbi_resource_id()))
        .map(str::to_string)
        .collect()
}

async fn performance_insights(
    clients: &AwsClients,
    region: &str,
    resource_ids: &[String],
    target: DatabaseTarget<'_>,
) -> Result<ResourceOutcome, AlarmError> {
    if resource_ids.is_empty() {
        info!("Performance Insights is disabled");
        return Ok(performance_insights_disabled(region, target));
    }

    let mut available = BTreeSet::new();
    for resource_id in resource_ids {
        let output = clients
            .pi
            .list_available_resource_metrics()
            .service_type(ServiceType::Rds)
            .identifier(resource_id)
            .metric_types("os")
            .metric_types("db")
            .send()
            .await
            .aws("pi", "ListAvailableResourceMetrics")?;
        available.extend(
            output
                .metrics()
                .iter()
                .filter_map(|metric| text(metric.metric()))
                .map(str::to_string),
        );
    }
    info!(available = available.len(), "listed Performance Insights metrics");

    Ok(ResourceOutcome {
        widgets: performance_insights_widgets(resource_ids, &available)?,
        ..Default::default()
    })
}

fn cluster_json(cluster: &DbCluster) -> Value {
    json!({
        "DBClusterIdentifier": cluster.db_cluster_identifier(),
        "DBClusterArn": cluster.db_cluster_arn(),
        "Engine": cluster.engine(),
        "EngineVersion": cluster.engine_version(),
        "Status": cluster.status(),
        "Endpoint": cluster.endpoint(),
        "ReaderEndpoint": cluster.reader_endpoint(),
        "MultiAZ": cluster.multi_az(),
        "ClusterCreateTime": aws_time_text(cluster.cluster_create_time()),
        "PerformanceInsightsEnabled": cluster.performance_insights_enabled(),
        "DBClusterMembers": cluster
            .db_cluster_members()
            .iter()
            .map(|member| json!({
                "DBInstanceIdentifier": member.db_instance_identifier(),
                "IsClusterWriter": member.is_cluster_writer(),
            }))
            .collect::<Vec<_>>(),
    })
}

fn instance_json(instance: &DbInstance) -> Value {
    json!({
        "DBInstanceIdentifier": instance.db_instance_identifier(),
        "DBInstanceArn": instance.db_instance_arn(),
        "DbiResourceId": instance.dbi_resource_id(),
        "DBInstanceClass": instance.db_instance_class(),
        "Engine": instance.engine(),
        "EngineVersion": instance.engine_version(),
        "DBInstanceStatus": instance.db_instance_status(),
        "AvailabilityZone": instance.availability_zone(),
        "MultiAZ": instance.multi_az(),
        "AllocatedStorage": instance.allocated_storage(),
        "StorageType": instance.storage_type(),
        "DBClusterIdentifier": instance.db_cluster_identifier(),
        "Endpoint": instance.endpoint().and_then(|e| e.address()),
        "InstanceCreateTime": aws_time_text(instance.instance_create_time()),
        "PerformanceInsightsEnabled": instance.performance_insights_enabled(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_insights_enabled_instances_count() {
        let instances = [
            DbInstance::builder()
                .db_instance_identifier("writer")
                .dbi_resource_id("db-ABC")
                .performance_insights_enabled(true)
                .build(),
            DbInstance::builder()
                .db_instance_identifier("reader")
                .dbi_resource_id("db-DEF")
                .performance_insights_enabled(false)
                .build(),
            DbInstance::builder().db_instance_identifier("legacy").dbi_resource_id("db-GHI").build(),
        ];
        assert_eq!(insights_resource_ids(&instances), vec!["db-ABC"]);
    }
}

use alarm_context_core::ResourceOutcome;
use aws_sdk_eks::types::Cluster;
use serde_json::{Value, json};
use tracing::warn;

use super::map_tags;
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt};

pub async fn cluster(clients: &AwsClients, cluster: &str) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .eks
        .describe_cluster()
        .name(cluster)
        .send()
        .await
        .aws("eks", "DescribeCluster")?;
    let Some(found) = output.cluster() else {
        warn!(cluster, "EKS cluster not found");
        return Ok(ResourceOutcome::default());
    };

    let mut outcome = ResourceOutcome::default().info(format!("EKS Cluster: {cluster}"), cluster_json(found));
    outcome.tags = map_tags(found.tags());
    Ok(outcome)
}

fn cluster_json(cluster: &Cluster) -> Value {
    json!({
        "Name": cluster.name(),
        "Arn": cluster.arn(),
        "Version": cluster.version(),
        "PlatformVersion": cluster.platform_version(),
        "Status": cluster.status().map(|s| s.as_str()),
        "Endpoint": cluster.endpoint(),
        "RoleArn": cluster.role_arn(),
        "CreatedAt": aws_time_text(cluster.created_at()),
        "SubnetIds": cluster.resources_vpc_config().map(|vpc| vpc.subnet_ids()),
        "SecurityGroupIds": cluster.resources_vpc_config().map(|vpc| vpc.security_group_ids()),
        "EnabledLogTypes": cluster
            .logging()
            .map(|logging| logging.cluster_logging())
            .unwrap_or_default()
            .iter()
            .filter(|setup| setup.enabled().unwrap_or(false))
            .flat_map(|setup| setup.types())
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>(),
    })
}

use alarm_context_core::handlers::ecs::{cluster_followup, container_insights_enabled, service_logs};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_ecs::types::{Cluster, ClusterField, ContainerDefinition, Service, ServiceField};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{tag, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "ecs";

pub async fn cluster(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    cluster: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .ecs
        .describe_clusters()
        .clusters(cluster)
        .include(ClusterField::Settings)
        .include(ClusterField::Statistics)
        .include(ClusterField::Tags)
        .send()
        .await
        .aws(SERVICE, "DescribeClusters")?;
    let Some(found) = output.clusters().first() else {
        warn!(cluster, "ECS cluster not found");
        return Ok(ResourceOutcome::default());
    };

    let insights = container_insights_enabled(
        found
            .settings()
            .iter()
            .filter_map(|setting| Some((setting.name()?.as_str(), text(setting.value())?))),
    );
    info!(cluster, container_insights = insights, "described ECS cluster");

    let mut outcome = cluster_followup(env, cluster, insights).info(format!("ECS Cluster: {cluster}"), cluster_json(found));
    outcome.tags = found.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();
    Ok(outcome)
}

pub async fn service(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    cluster: &str,
    service: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .ecs
        .describe_services()
        .cluster(cluster)
        .services(service)
        .include(ServiceField::Tags)
        .send()
        .await
        .aws(SERVICE, "DescribeServices")?;
    let Some(found) = output.services().first() else {
        warn!(cluster, service, "ECS service not found");
        return Ok(ResourceOutcome::default());
    };

    let mut outcome = ResourceOutcome::default().info(format!("ECS Service: {service}"), service_json(found));
    outcome.tags = found.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();

    if let Some(task_definition) = found.task_definition() {
        let described = clients
            .ecs
            .describe_task_definition()
            .task_definition(task_definition)
            .send()
            .await
            .aws(SERVICE, "DescribeTaskDefinition")?;
        let containers = described
            .task_definition()
            .map(|definition| definition.container_definitions())
            .unwrap_or_default();
        let groups = awslogs_groups(containers);
        info!(task_definition, log_groups = groups.len(), "resolved service log groups");
        outcome.merge(service_logs(env, &groups));
    }
    Ok(outcome)
}

/// `awslogs-group` of every container, first occurrence kept.
fn awslogs_groups(containers: &[ContainerDefinition]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    let names = containers
        .iter()
        .filter_map(|container| container.log_configuration()?.options()?.get("awslogs-group"));
    for name in names {
        if !groups.contains(name) {
            groups.push(name.clone());
        }
    }
    groups
}

fn cluster_json(cluster: &Cluster) -> Value {
    json!({
        "ClusterArn": cluster.cluster_arn(),
        "ClusterName": cluster.cluster_name(),
        "Status": cluster.status(),
        "RegisteredContainerInstancesCount": cluster.registered_container_instances_count(),
        "RunningTasksCount": cluster.running_tasks_count(),
        "PendingTasksCount": cluster.pending_tasks_count(),
        "ActiveServicesCount": cluster.active_services_count(),
        "CapacityProviders": cluster.capacity_providers(),
        "Settings": cluster
            .settings()
            .iter()
            .map(|setting| json!({
                "Name": setting.name().map(|n| n.as_str()),
                "Value": setting.value(),
            }))
            .collect::<Vec<_>>(),
    })
}

fn service_json(service: &Service) -> Value {
    json!({
        "ServiceArn": service.service_arn(),
        "ServiceName": service.service_name(),
        "ClusterArn": service.cluster_arn(),
        "Status": service.status(),
        "DesiredCount": service.desired_count(),
        "RunningCount": service.running_count(),
        "PendingCount": service.pending_count(),
        "LaunchType": service.launch_type().map(|t| t.as_str()),
        "TaskDefinition": service.task_definition(),
        "CreatedAt": aws_time_text(service.created_at()),
        "Deployments": service
            .deployments()
            .iter()
            .map(|deployment| json!({
                "Status": deployment.status(),
                "TaskDefinition": deployment.task_definition(),
                "DesiredCount": deployment.desired_count(),
                "RunningCount": deployment.running_count(),
                "RolloutState": deployment.rollout_state().map(|s| s.as_str()),
            }))
            .collect::<Vec<_>>(),
        "Events": service
            .events()
            .iter()
            .take(5)
            .map(|event| json!({
                "CreatedAt": aws_time_text(event.created_at()),
                "Message": event.message(),
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecs::types::{LogConfiguration, LogDriver};

    fn container(group: Option<&str>) -> ContainerDefinition {
        let mut builder = ContainerDefinition::builder().name("app");
        if let Some(group) = group {
            let logging = LogConfiguration::builder()
                .log_driver(LogDriver::Awslogs)
                .options("awslogs-group", group)
                .build()
                .unwrap();
            builder = builder.log_configuration(logging);
        }
        builder.build()
    }

    #[test]
    fn log_groups_are_unique() {
        let containers = [
            container(Some("/ecs/orders")),
            container(None),
            container(Some("/ecs/orders")),
            container(Some("/ecs/sidecar")),
        ];
        assert_eq!(awslogs_groups(&containers), vec!["/ecs/orders", "/ecs/sidecar"]);
    }
}

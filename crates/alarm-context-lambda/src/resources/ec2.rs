use alarm_context_core::handlers::ec2::{asg_trace, ssm_links};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_autoscaling::types::AutoScalingGroup;
use aws_sdk_ec2::types::Instance;
use aws_sdk_ssm::types::{
    InstanceInformation, InstanceInformationFilter, InstanceInformationFilterKey,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{tag, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt, build_error};

pub async fn instance(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    instance_id: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .ec2
        .describe_instances()
        .instance_ids(instance_id)
        .send()
        .await
        .aws("ec2", "DescribeInstances")?;
    let Some(instance) = output.reservations().iter().flat_map(|r| r.instances()).next() else {
        warn!(instance_id, "instance not found");
        return Ok(ResourceOutcome::default());
    };

    let mut outcome = ResourceOutcome::default().info(format!("Instance: {instance_id}"), instance_json(instance));
    outcome.tags = instance.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();

    let filter = InstanceInformationFilter::builder()
        .key(InstanceInformationFilterKey::InstanceIds)
        .value_set(instance_id)
        .build()
        .map_err(build_error("ssm", "DescribeInstanceInformation"))?;
    let managed = clients
        .ssm
        .describe_instance_information()
        .instance_information_filter_list(filter)
        .send()
        .await
        .aws("ssm", "DescribeInstanceInformation")?;
    if let Some(information) = managed.instance_information_list().first() {
        info!(instance_id, "instance is managed by Systems Manager");
        outcome.links.extend(ssm_links(env.region, instance_id));
        outcome = outcome.info(format!("System Manager: {instance_id}"), managed_json(information));
    }
    Ok(outcome)
}

pub async fn auto_scaling_group(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    name: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .autoscaling
        .describe_auto_scaling_groups()
        .auto_scaling_group_names(name)
        .send()
        .await
        .aws("autoscaling", "DescribeAutoScalingGroups")?;
    let Some(group) = output.auto_scaling_groups().first() else {
        warn!(auto_scaling_group = name, "auto scaling group not found");
        return Ok(ResourceOutcome::default());
    };

    let instance_ids: Vec<String> = group
        .instances()
        .iter()
        .filter_map(|instance| text(instance.instance_id()))
        .map(str::to_string)
        .collect();
    info!(auto_scaling_group = name, instances = instance_ids.len(), "described auto scaling group");

    let mut outcome = ResourceOutcome::default().info(format!("Auto Scaling Group: {name}"), group_json(group));
    outcome.tags = group.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();
    outcome.trace = asg_trace(env, &instance_ids)?;
    Ok(outcome)
}

fn instance_json(instance: &Instance) -> Value {
    json!({
        "InstanceId": instance.instance_id(),
        "InstanceType": instance.instance_type().map(|t| t.as_str()),
        "State": instance.state().and_then(|s| s.name()).map(|n| n.as_str()),
        "ImageId": instance.image_id(),
        "LaunchTime": aws_time_text(instance.launch_time()),
        "AvailabilityZone": instance.placement().and_then(|p| p.availability_zone()),
        "PrivateIpAddress": instance.private_ip_address(),
        "PublicIpAddress": instance.public_ip_address(),
        "VpcId": instance.vpc_id(),
        "SubnetId": instance.subnet_id(),
        "SecurityGroups": instance
            .security_groups()
            .iter()
            .filter_map(|group| group.group_id())
            .collect::<Vec<_>>(),
        "IamInstanceProfile": instance.iam_instance_profile().and_then(|p| p.arn()),
        "Monitoring": instance.monitoring().and_then(|m| m.state()).map(|s| s.as_str()),
        "PlatformDetails": instance.platform_details(),
    })
}

fn managed_json(information: &InstanceInformation) -> Value {
    json!({
        "InstanceId": information.instance_id(),
        "PingStatus": information.ping_status().map(|s| s.as_str()),
        "LastPingDateTime": aws_time_text(information.last_ping_date_time()),
        "AgentVersion": information.agent_version(),
        "PlatformType": information.platform_type().map(|p| p.as_str()),
        "PlatformName": information.platform_name(),
        "PlatformVersion": information.platform_version(),
        "ComputerName": information.computer_name(),
        "IPAddress": information.ip_address(),
    })
}

fn group_json(group: &AutoScalingGroup) -> Value {
    json!({
        "AutoScalingGroupName": group.auto_scaling_group_name(),
        "MinSize": group.min_size(),
        "MaxSize": group.max_size(),
        "DesiredCapacity": group.desired_capacity(),
        "AvailabilityZones": group.availability_zones(),
        "HealthCheckType": group.health_check_type(),
        "LaunchTemplate": group.launch_template().and_then(|t| t.launch_template_name()),
        "CreatedTime": aws_time_text(group.created_time()),
        "Status": group.status(),
        "Instances": group
            .instances()
            .iter()
            .map(|instance| json!({
                "InstanceId": instance.instance_id(),
                "LifecycleState": instance.lifecycle_state().map(|s| s.as_str()),
                "HealthStatus": instance.health_status(),
                "AvailabilityZone": instance.availability_zone(),
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::types::{InstanceState, InstanceStateName, InstanceType, Placement};

    #[test]
    fn instance_projection() {
        let instance = Instance::builder()
            .instance_id("i-0123")
            .instance_type(InstanceType::T3Micro)
            .state(InstanceState::builder().name(InstanceStateName::Running).build())
            .placement(Placement::builder().availability_zone("us-east-1a").build())
            .build();
        let value = instance_json(&instance);
        assert_eq!(value["InstanceId"], "i-0123");
        assert_eq!(value["InstanceType"], "t3.micro");
        assert_eq!(value["State"], "running");
        assert_eq!(value["AvailabilityZone"], "us-east-1a");
        assert_eq!(value["SecurityGroups"], json!([]));
    }
}

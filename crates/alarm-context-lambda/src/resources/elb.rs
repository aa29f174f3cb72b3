use alarm_context_core::ResourceOutcome;
use alarm_context_core::model::Tag;
use aws_sdk_elasticloadbalancingv2::types::{LoadBalancer, TargetGroup};
use serde_json::{Value, json};
use tracing::info;

use super::{tag, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "elasticloadbalancing";

/// Describe the load balancer and target group by short name, then their tags.
pub async fn load_balancer(
    clients: &AwsClients,
    load_balancer: Option<&str>,
    target_group: Option<&str>,
) -> Result<ResourceOutcome, AlarmError> {
    let mut outcome = ResourceOutcome::default();
    let mut arns = Vec::new();

    if let Some(name) = load_balancer {
        let output = clients
            .elb
            .describe_load_balancers()
            .names(name)
            .send()
            .await
            .aws(SERVICE, "DescribeLoadBalancers")?;
        if let Some(found) = output.load_balancers().first() {
            arns.extend(text(found.load_balancer_arn()).map(str::to_string));
            outcome = outcome.info(format!("ELB: {name}"), load_balancer_json(found));
        }
    }

    if let Some(name) = target_group {
        let output = clients
            .elb
            .describe_target_groups()
            .names(name)
            .send()
            .await
            .aws(SERVICE, "DescribeTargetGroups")?;
        if let Some(found) = output.target_groups().first() {
            arns.extend(text(found.target_group_arn()).map(str::to_string));
            outcome = outcome.info(format!("ELB: {name}"), target_group_json(found));
        }
    }

    if !arns.is_empty() {
        let output = clients
            .elb
            .describe_tags()
            .set_resource_arns(Some(arns))
            .send()
            .await
            .aws(SERVICE, "DescribeTags")?;
        let tags = output
            .tag_descriptions()
            .iter()
            .flat_map(|description| description.tags())
            .filter_map(|t| tag(t.key(), t.value()));
        outcome.tags = unique_by_key(tags);
        info!(tags = outcome.tags.len(), "fetched load balancer tags");
    }
    Ok(outcome)
}

/// The load balancer and its target group often share tags; keep the first.
fn unique_by_key(tags: impl IntoIterator<Item = Tag>) -> Vec<Tag> {
    let mut unique: Vec<Tag> = Vec::new();
    for tag in tags {
        if !unique.iter().any(|seen| seen.key == tag.key) {
            unique.push(tag);
        }
    }
    unique
}

fn load_balancer_json(load_balancer: &LoadBalancer) -> Value {
    json!({
        "LoadBalancerArn": load_balancer.load_balancer_arn(),
        "LoadBalancerName": load_balancer.load_balancer_name(),
        "DNSName": load_balancer.dns_name(),
        "Type": load_balancer.r#type().map(|t| t.as_str()),
        "Scheme": load_balancer.scheme().map(|s| s.as_str()),
        "State": load_balancer.state().and_then(|s| s.code()).map(|c| c.as_str()),
        "VpcId": load_balancer.vpc_id(),
        "IpAddressType": load_balancer.ip_address_type().map(|t| t.as_str()),
        "CreatedTime": aws_time_text(load_balancer.created_time()),
        "AvailabilityZones": load_balancer
            .availability_zones()
            .iter()
            .map(|zone| zone.zone_name())
            .collect::<Vec<_>>(),
        "SecurityGroups": load_balancer.security_groups(),
    })
}

fn target_group_json(target_group: &TargetGroup) -> Value {
    json!({
        "TargetGroupArn": target_group.target_group_arn(),
        "TargetGroupName": target_group.target_group_name(),
        "Protocol": target_group.protocol().map(|p| p.as_str()),
        "Port": target_group.port(),
        "VpcId": target_group.vpc_id(),
        "TargetType": target_group.target_type().map(|t| t.as_str()),
        "HealthCheckProtocol": target_group.health_check_protocol().map(|p| p.as_str()),
        "HealthCheckPath": target_group.health_check_path(),
        "HealthyThresholdCount": target_group.healthy_threshold_count(),
        "UnhealthyThresholdCount": target_group.unhealthy_threshold_count(),
        "LoadBalancerArns": target_group.load_balancer_arns(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_tags_appear_once() {
        let tags = unique_by_key([
            Tag::new("env", "prod"),
            Tag::new("team", "edge"),
            Tag::new("env", "prod"),
        ]);
        assert_eq!(tags, vec![Tag::new("env", "prod"), Tag::new("team", "edge")]);
    }
}

//! Describe calls behind each [`ResourceRequest`].
//!
//! Every executor projects the SDK output it needs into JSON for the email and
//! the prompt, then hands the identifiers it learned to the matching follow-up
//! in `alarm_context_core::handlers`.

mod apigateway;
mod dynamodb;
mod ec2;
mod ecs;
mod eks;
mod elb;
mod lambda;
mod rds;
mod s3;
mod sns;
mod ssm;
mod synthetics;

use std::collections::HashMap;

use alarm_context_core::handlers::ResourceRequest;
use alarm_context_core::html;
use alarm_context_core::model::Tag;
use alarm_context_core::{RequestEnv, ResourceOutcome};
use serde_json::{Map, Value};
use tracing::debug;

use crate::clients::AwsClients;
use crate::errors::AlarmError;

/// Run one describe call and its follow-ups.
pub async fn execute(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    request: &ResourceRequest,
) -> Result<ResourceOutcome, AlarmError> {
    debug!(kind = request.kind(), "describing resource");
    match request {
        ResourceRequest::Ec2Instance { instance_id } => {
            ec2::instance(clients, env, instance_id).await
        }
        ResourceRequest::AutoScalingGroup { name } => {
            ec2::auto_scaling_group(clients, env, name).await
        }
        ResourceRequest::EcsCluster { cluster } => ecs::cluster(clients, env, cluster).await,
        ResourceRequest::EcsService { cluster, service } => {
            ecs::service(clients, env, cluster, service).await
        }
        ResourceRequest::RdsCluster { cluster_id } => rds::cluster(clients, env, cluster_id).await,
        ResourceRequest::RdsInstance(filter) => rds::instance(clients, env, filter).await,
        ResourceRequest::S3BucketTags { bucket } => s3::bucket_tags(clients, bucket).await,
        ResourceRequest::EksCluster { cluster } => eks::cluster(clients, cluster).await,
        ResourceRequest::DynamoDbTable { table } => dynamodb::table(clients, table).await,
        ResourceRequest::LambdaFunction { function } => {
            lambda::function(clients, env, function).await
        }
        ResourceRequest::LoadBalancer {
            load_balancer,
            target_group,
        } => elb::load_balancer(clients, load_balancer.as_deref(), target_group.as_deref()).await,
        ResourceRequest::RestApi { api_name, stage } => {
            apigateway::rest_api(clients, env, api_name, stage.as_deref()).await
        }
        ResourceRequest::SnsTopic { topic_arn } => sns::topic(clients, topic_arn).await,
        ResourceRequest::Canary { name } => synthetics::canary(clients, env, name).await,
        ResourceRequest::SsmFailedCommands { after, before } => {
            ssm::failed_commands(clients, env, *after, *before).await
        }
    }
}

/// Optional SDK text, whether the accessor returns `&str` or `Option<&str>`.
fn text<'a>(value: impl Into<Option<&'a str>>) -> Option<&'a str> {
    value.into()
}

/// A tag from one of the many SDK tag shapes. Tags without a key are dropped.
fn tag<'a>(key: impl Into<Option<&'a str>>, value: impl Into<Option<&'a str>>) -> Option<Tag> {
    Some(Tag::new(key.into()?, value.into().unwrap_or_default()))
}

/// Tags held as a map, sorted by key.
fn map_tags(tags: Option<&HashMap<String, String>>) -> Vec<Tag> {
    let mut tags: Vec<Tag> = tags
        .into_iter()
        .flatten()
        .map(|(key, value)| Tag::new(key.as_str(), value.as_str()))
        .collect();
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    tags
}

/// A string map as a JSON object, sorted by key.
fn string_map(values: Option<&HashMap<String, String>>) -> Value {
    let mut entries: Vec<(&String, &String)> = values.into_iter().flatten().collect();
    entries.sort();
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect::<Map<_, _>>(),
    )
}

fn tags_table(title: &str, tags: &[Tag]) -> String {
    let rows: Vec<Value> = tags.iter().filter_map(|tag| serde_json::to_value(tag).ok()).collect();
    html::table_with_fields(title, &rows, &["Key", "Value"])
}

use alarm_context_core::ResourceOutcome;
use tracing::info;

use super::{string_map, tag};
use crate::clients::AwsClients;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "sns";

pub async fn topic(clients: &AwsClients, topic_arn: &str) -> Result<ResourceOutcome, AlarmError> {
    let attributes = clients
        .sns
        .get_topic_attributes()
        .topic_arn(topic_arn)
        .send()
        .await
        .aws(SERVICE, "GetTopicAttributes")?;
    let tagged = clients
        .sns
        .list_tags_for_resource()
        .resource_arn(topic_arn)
        .send()
        .await
        .aws(SERVICE, "ListTagsForResource")?;

    let name = topic_name(topic_arn);
    info!(topic = name, "described SNS topic");
    let mut outcome = ResourceOutcome::default().info(format!("SNS Topic: {name}"), string_map(attributes.attributes()));
    outcome.tags = tagged.tags().iter().filter_map(|t| tag(t.key(), t.value())).collect();
    Ok(outcome)
}

fn topic_name(topic_arn: &str) -> &str {
    topic_arn.rsplit(':').next().unwrap_or(topic_arn)
}

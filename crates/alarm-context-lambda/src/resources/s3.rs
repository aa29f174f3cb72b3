use alarm_context_core::ResourceOutcome;
use tracing::info;

use super::{tag, tags_table};
use crate::clients::AwsClients;
use crate::errors::{AlarmError, AwsResultExt};

/// Returned for a bucket that has never been tagged.
const NO_TAG_SET: &str = "NoSuchTagSet";

pub async fn bucket_tags(
    clients: &AwsClients,
    bucket: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = match clients.s3.get_bucket_tagging().bucket(bucket).send().await.aws("s3", "GetBucketTagging") {
        Ok(output) => output,
        Err(err) if err.has_code(NO_TAG_SET) => {
            info!(bucket, "bucket has no tags");
            return Ok(ResourceOutcome::default());
        }
        Err(err) => return Err(err.into()),
    };

    let tags: Vec<_> = output.tag_set().iter().filter_map(|t| tag(t.key(), t.value())).collect();
    Ok(ResourceOutcome {
        tables: vec![tags_table(&format!("S3 Bucket Tags: {bucket}"), &tags)],
        tags,
        ..Default::default()
    })
}

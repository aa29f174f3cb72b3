use std::collections::BTreeSet;

use alarm_context_core::cloudformation::{self, DEFAULT_MAX_LENGTH};
use alarm_context_core::model::Tag;
use alarm_context_core::AwsApiError;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::types::TemplateStage;
use tracing::info;

use crate::errors::AwsResultExt;

/// The processed template of the stack that owns the alarmed resource,
/// reduced for the prompt. `None` when no tag names a stack.
pub async fn stack_template(
    client: &Client,
    tags: &[Tag],
    root_cause_types: &BTreeSet<String>,
) -> Result<Option<String>, AwsApiError> {
    let Some(stack_arn) = cloudformation::find_stack_arn(tags) else {
        return Ok(None);
    };
    let output = client
        .get_template()
        .stack_name(stack_arn)
        .template_stage(TemplateStage::Processed)
        .send()
        .await
        .aws("cloudformation", "GetTemplate")?;

    let body = output.template_body().unwrap_or_default();
    info!(stack_arn, template_bytes = body.len(), "fetched CloudFormation template");
    Ok(Some(cloudformation::reduce_template(body, root_cause_types, DEFAULT_MAX_LENGTH)))
}

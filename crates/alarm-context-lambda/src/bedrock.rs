use alarm_context_core::prompt::{self, PromptInputs};
use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::primitives::Blob;
use tracing::info;

use crate::config::BedrockConfig;
use crate::errors::{AlarmError, AwsResultExt};

/// Ask the model for a root cause analysis and wrap the answer in a panel.
pub async fn analyse(
    client: &Client,
    config: &BedrockConfig,
    inputs: &PromptInputs,
) -> Result<String, AlarmError> {
    let prompt = prompt::build_prompt(inputs);
    info!(model_id = %config.model_id, prompt_chars = prompt.len(), "invoking Bedrock");

    let body = prompt::request_body(&config.anthropic_version, config.max_tokens, &prompt);
    let output = client
        .invoke_model()
        .model_id(&config.model_id)
        .content_type("application/json")
        .accept("application/json")
        .body(Blob::new(body.to_string()))
        .send()
        .await
        .aws("bedrock", "InvokeModel")?;

    let text = prompt::response_text(output.body().as_ref())?;
    info!(response_chars = text.len(), "Bedrock responded");
    Ok(prompt::analysis_panel(&config.model_id, &text))
}

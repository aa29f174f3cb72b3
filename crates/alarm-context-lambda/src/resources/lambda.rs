use alarm_context_core::handlers::lambda::{function_followup, insights_enabled};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_lambda::types::{FunctionConfiguration, TracingMode};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{map_tags, tags_table, text};
use crate::clients::AwsClients;
use crate::errors::{AlarmError, AwsResultExt};

pub async fn function(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    function: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let output = clients
        .lambda
        .get_function()
        .function_name(function)
        .send()
        .await
        .aws("lambda", "GetFunction")?;
    let Some(configuration) = output.configuration() else {
        warn!(function, "function has no configuration");
        return Ok(ResourceOutcome::default());
    };

    let layers = configuration.layers().iter().filter_map(|layer| text(layer.arn()));
    let insights = insights_enabled(layers);
    let tracing_mode = configuration.tracing_config().and_then(|config| config.mode());
    let tracing_active = tracing_mode == Some(&TracingMode::Active);
    info!(function, lambda_insights = insights, tracing_active, "described function");

    let mut outcome = function_followup(env, function, insights, tracing_active)?
        .info(format!("Function: {function}"), configuration_json(configuration));
    outcome.tags = map_tags(output.tags());
    if !outcome.tags.is_empty() {
        outcome.tables.push(tags_table(&format!("Function: {function}"), &outcome.tags));
    }
    Ok(outcome)
}

fn configuration_json(configuration: &FunctionConfiguration) -> Value {
    json!({
        "FunctionName": configuration.function_name(),
        "FunctionArn": configuration.function_arn(),
        "Runtime": configuration.runtime().map(|r| r.as_str()),
        "Handler": configuration.handler(),
        "CodeSize": configuration.code_size(),
        "Description": configuration.description(),
        "Timeout": configuration.timeout(),
        "MemorySize": configuration.memory_size(),
        "LastModified": configuration.last_modified(),
        "Role": configuration.role(),
        "Version": configuration.version(),
        "State": configuration.state().map(|s| s.as_str()),
        "LastUpdateStatus": configuration.last_update_status().map(|s| s.as_str()),
        "PackageType": configuration.package_type().map(|p| p.as_str()),
        "Architectures": configuration
            .architectures()
            .iter()
            .map(|architecture| architecture.as_str())
            .collect::<Vec<_>>(),
        "Layers": configuration
            .layers()
            .iter()
            .map(|layer| layer.arn())
            .collect::<Vec<_>>(),
        "TracingConfig": configuration
            .tracing_config()
            .and_then(|config| config.mode())
            .map(|mode| mode.as_str()),
        "LogGroup": configuration.logging_config().and_then(|config| config.log_group()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lambda::types::{Layer, Runtime, TracingConfigResponse};

    #[test]
    fn configuration_projection() {
        let configuration = FunctionConfiguration::builder()
            .function_name("orders")
            .runtime(Runtime::Python312)
            .timeout(30)
            .layers(
                Layer::builder()
                    .arn("arn:aws:lambda:us-east-1:580247275435:layer:LambdaInsightsExtension:49")
                    .build(),
            )
            .tracing_config(TracingConfigResponse::builder().mode(TracingMode::Active).build())
            .build();
        let value = configuration_json(&configuration);
        assert_eq!(value["FunctionName"], "orders");
        assert_eq!(value["Runtime"], "python3.12");
        assert_eq!(value["Timeout"], 30);
        assert_eq!(value["TracingConfig"], "Active");
        assert!(value["Layers"][0].as_str().unwrap().contains("LambdaInsightsExtension"));
    }
}

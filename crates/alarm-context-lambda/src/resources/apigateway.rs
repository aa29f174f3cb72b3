use alarm_context_core::handlers::apigateway::rest_api_followup;
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_apigateway::operation::get_rest_api::GetRestApiOutput;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{map_tags, text};
use crate::clients::AwsClients;
use crate::convert::aws_time_text;
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "apigateway";

/// REST APIs are alarmed on by name; look the id up first.
pub async fn rest_api(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    api_name: &str,
    stage: Option<&str>,
) -> Result<ResourceOutcome, AlarmError> {
    let pages = clients
        .apigateway
        .get_rest_apis()
        .into_paginator()
        .send()
        .try_collect()
        .await
        .aws(SERVICE, "GetRestApis")?;
    let api_id = pages
        .iter()
        .flat_map(|page| page.items())
        .find(|api| text(api.name()) == Some(api_name))
        .and_then(|api| text(api.id()))
        .map(str::to_string);
    let Some(api_id) = api_id else {
        warn!(api_name, "REST API not found");
        return Ok(ResourceOutcome::default());
    };
    info!(api_name, api_id = %api_id, "resolved REST API");

    let details = clients
        .apigateway
        .get_rest_api()
        .rest_api_id(&api_id)
        .send()
        .await
        .aws(SERVICE, "GetRestApi")?;

    let mut outcome = rest_api_followup(env, &api_id, api_name, stage)?
        .info(format!("API Gateway: {api_name}"), rest_api_json(&details));
    outcome.tags = map_tags(details.tags());
    Ok(outcome)
}

fn rest_api_json(api: &GetRestApiOutput) -> Value {
    json!({
        "id": api.id(),
        "name": api.name(),
        "description": api.description(),
        "createdDate": aws_time_text(api.created_date()),
        "version": api.version(),
        "apiKeySource": api.api_key_source().map(|s| s.as_str()),
        "endpointConfiguration": api.endpoint_configuration().map(|config| {
            config.types().iter().map(|t| t.as_str()).collect::<Vec<_>>()
        }),
        "disableExecuteApiEndpoint": api.disable_execute_api_endpoint(),
    })
}

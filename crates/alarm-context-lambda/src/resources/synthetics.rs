use alarm_context_core::handlers::synthetics::{CanaryRun, canary_followup};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_synthetics::types::{Canary, CanaryRun as SdkCanaryRun};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{map_tags, text};
use crate::clients::AwsClients;
use crate::convert::{aws_time_text, from_aws};
use crate::errors::{AlarmError, AwsResultExt};

const SERVICE: &str = "synthetics";

const RECENT_RUNS: i32 = 10;

pub async fn canary(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    name: &str,
) -> Result<ResourceOutcome, AlarmError> {
    let described = clients
        .synthetics
        .describe_canaries()
        .names(name)
        .send()
        .await
        .aws(SERVICE, "DescribeCanaries")?;
    let Some(found) = described.canaries().first() else {
        warn!(canary = name, "canary not found");
        return Ok(ResourceOutcome::default());
    };
    let engine_arn = text(found.engine_arn());
    info!(canary = name, engine_arn = engine_arn.unwrap_or_default(), "described canary");

    let output = clients
        .synthetics
        .get_canary_runs()
        .name(name)
        .max_results(RECENT_RUNS)
        .send()
        .await
        .aws(SERVICE, "GetCanaryRuns")?;
    let runs: Vec<CanaryRun> = output.canary_runs().iter().map(canary_run).collect();
    info!(canary = name, runs = runs.len(), "fetched canary runs");

    let mut outcome = ResourceOutcome::default().info(format!("Canary: {name}"), canary_json(found));
    outcome.merge(canary_followup(env, name, engine_arn, &runs)?);
    outcome.tags = map_tags(found.tags());
    Ok(outcome)
}

fn canary_run(run: &SdkCanaryRun) -> CanaryRun {
    let timeline = run.timeline();
    CanaryRun {
        id: text(run.id()).unwrap_or_default().to_string(),
        state: run.status().and_then(|s| s.state()).map(|s| s.as_str().to_string()),
        started: timeline.and_then(|t| t.started()).and_then(from_aws),
        completed: timeline.and_then(|t| t.completed()).and_then(from_aws),
        detail: json!({
            "Id": run.id(),
            "Name": run.name(),
            "Status": {
                "State": run.status().and_then(|s| s.state()).map(|s| s.as_str()),
                "StateReason": run.status().and_then(|s| s.state_reason()),
                "StateReasonCode": run.status().and_then(|s| s.state_reason_code()).map(|c| c.as_str()),
            },
            "Timeline": {
                "Started": aws_time_text(timeline.and_then(|t| t.started())),
                "Completed": aws_time_text(timeline.and_then(|t| t.completed())),
            },
            "ArtifactS3Location": run.artifact_s3_location(),
        }),
    }
}

fn canary_json(canary: &Canary) -> Value {
    json!({
        "Id": canary.id(),
        "Name": canary.name(),
        "Status": canary.status().and_then(|s| s.state()).map(|s| s.as_str()),
        "EngineArn": canary.engine_arn(),
        "RuntimeVersion": canary.runtime_version(),
        "Schedule": canary.schedule().and_then(|s| s.expression()),
        "ArtifactS3Location": canary.artifact_s3_location(),
        "ExecutionRoleArn": canary.execution_role_arn(),
        "SuccessRetentionPeriodInDays": canary.success_retention_period_in_days(),
        "FailureRetentionPeriodInDays": canary.failure_retention_period_in_days(),
        "LastRun": aws_time_text(canary.timeline().and_then(|t| t.last_run())),
    })
}

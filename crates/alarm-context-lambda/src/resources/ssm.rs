use alarm_context_core::handlers::ssm::{self as planner, CommandSummary};
use alarm_context_core::{RequestEnv, ResourceOutcome};
use aws_sdk_ssm::types::{Command, CommandFilter, CommandFilterKey};
use chrono::{DateTime, Utc};
use tracing::info;

use super::text;
use crate::clients::AwsClients;
use crate::convert::from_aws;
use crate::errors::{AlarmError, AwsResultExt, build_error};

const OPERATION: &str = "ListCommands";

const MAX_COMMANDS: i32 = 50;

/// Failed and timed out Run Command invocations between `after` and `before`.
pub async fn failed_commands(
    clients: &AwsClients,
    env: &RequestEnv<'_>,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Result<ResourceOutcome, AlarmError> {
    let mut commands = Vec::new();
    for status in ["Failed", "TimedOut"] {
        let output = clients
            .ssm
            .list_commands()
            .filters(filter(CommandFilterKey::Status, status)?)
            .filters(filter(CommandFilterKey::InvokedAfter, &filter_time(after))?)
            .filters(filter(CommandFilterKey::InvokedBefore, &filter_time(before))?)
            .max_results(MAX_COMMANDS)
            .send()
            .await
            .aws("ssm", OPERATION)?;
        info!(status, commands = output.commands().len(), "listed Run Command invocations");
        commands.extend(output.commands().iter().map(summary));
    }
    Ok(planner::failed_commands(env.region, &commands))
}

fn filter(key: CommandFilterKey, value: &str) -> Result<CommandFilter, AlarmError> {
    CommandFilter::builder()
        .key(key)
        .value(value)
        .build()
        .map_err(build_error("ssm", OPERATION))
        .map_err(AlarmError::from)
}

fn filter_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn summary(command: &Command) -> CommandSummary {
    CommandSummary {
        command_id: text(command.command_id()).unwrap_or_default().to_string(),
        document_name: text(command.document_name()).unwrap_or_default().to_string(),
        status: command.status().map(|s| s.as_str()).unwrap_or_default().to_string(),
        requested: command.requested_date_time().and_then(from_aws),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ssm::primitives::DateTime as AwsDateTime;
    use aws_sdk_ssm::types::CommandStatus;

    #[test]
    fn filter_times_are_whole_seconds() {
        let time = DateTime::parse_from_rfc3339("2024-03-14T12:53:20.538Z").unwrap().to_utc();
        assert_eq!(filter_time(time), "2024-03-14T12:53:20Z");
    }

    #[test]
    fn command_summary() {
        let command = Command::builder()
            .command_id("c-1")
            .document_name("AWS-RunShellScript")
            .status(CommandStatus::TimedOut)
            .requested_date_time(AwsDateTime::from_secs(1_710_420_800))
            .build();
        let converted = summary(&command);
        assert_eq!(converted.command_id, "c-1");
        assert_eq!(converted.status, "TimedOut");
        assert_eq!(converted.requested.map(|t| t.timestamp()), Some(1_710_420_800));
    }
}

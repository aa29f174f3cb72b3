use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::error::CoreError;
use crate::html::table_with_fields;
use crate::links;

use super::{HandlerPlan, RequestEnv, ResourceOutcome, ResourceRequest, metric_widgets};

const COMMAND_METRICS: &[&str] = &["CommandsDeliveryTimedOut", "CommandsFailed", "CommandsSucceeded"];
const FAILURE_METRICS: &[&str] = &["CommandsDeliveryTimedOut", "CommandsFailed"];

const COMMAND_FIELDS: &[&str] = &["Command ID", "Document Name", "Status", "Requested Date Time"];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let metric_name = env.metric_name;
    if !COMMAND_METRICS.contains(&metric_name) {
        return Ok(None);
    }
    let region = env.region;

    let others: Vec<(&str, &str)> = COMMAND_METRICS
        .iter()
        .filter(|metric| **metric != metric_name)
        .map(|metric| (*metric, "Sum"))
        .collect();

    let mut plan = HandlerPlan::new()
        .link(
            "SSM Run Command",
            links::console(region, &format!("systems-manager/run-command/complete-commands?region={region}")),
        )
        .link(
            "SSM Run Command in ALARM dashboard",
            links::alarm_dashboard(region, "SSM-RunCommand"),
        )
        .widgets(metric_widgets("AWS/SSM-RunCommand", &[], &others, 60));

    if FAILURE_METRICS.contains(&metric_name) {
        plan = plan.resource(ResourceRequest::SsmFailedCommands {
            after: env.window.start,
            before: env.window.change,
        });
    }
    Ok(Some(plan))
}

/// A Run Command invocation as listed by `ListCommands`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSummary {
    pub command_id: String,
    pub document_name: String,
    pub status: String,
    pub requested: Option<DateTime<Utc>>,
}

/// Failed and timed out commands as a linked table, doubling as log events.
pub fn failed_commands(region: &str, commands: &[CommandSummary]) -> ResourceOutcome {
    let rows: Vec<Value> = commands
        .iter()
        .map(|command| {
            let id = &command.command_id;
            json!({
                "Command ID": {
                    "value": id,
                    "link": links::console(region, &format!("systems-manager/run-command/{id}?region={region}")),
                },
                "Document Name": command.document_name,
                "Status": command.status,
                "Requested Date Time": command
                    .requested
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            })
        })
        .collect();

    ResourceOutcome {
        log_tables: vec![table_with_fields(
            "SSM Failed or Timed Out Command Invocations",
            &rows,
            COMMAND_FIELDS,
        )],
        log_events: rows,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn failure_metric_lists_commands() {
        let fixture = Fixture::new(&[]);
        let plan = plan(&fixture.env("AWS/SSM-RunCommand", "CommandsFailed")).unwrap().unwrap();

        assert_eq!(titles(&plan), vec!["CommandsDeliveryTimedOut", "CommandsSucceeded"]);
        assert_eq!(
            plan.resources,
            vec![ResourceRequest::SsmFailedCommands {
                after: fixture.window.start,
                before: fixture.window.change,
            }]
        );
    }

    #[test]
    fn success_metric_has_no_command_lookup() {
        let fixture = Fixture::new(&[]);
        let plan = plan(&fixture.env("AWS/SSM-RunCommand", "CommandsSucceeded")).unwrap().unwrap();
        assert_eq!(plan.widgets.len(), 2);
        assert!(plan.resources.is_empty());

        assert!(super::plan(&fixture.env("AWS/SSM-RunCommand", "Other")).unwrap().is_none());
    }

    #[test]
    fn failed_commands_link_each_invocation() {
        let commands = [CommandSummary {
            command_id: "5c0d-11".into(),
            document_name: "AWS-RunShellScript".into(),
            status: "Failed".into(),
            requested: Some(chrono::DateTime::parse_from_rfc3339("2024-03-14T12:40:00Z").unwrap().to_utc()),
        }];
        let outcome = failed_commands("us-east-1", &commands);

        assert_eq!(outcome.log_events[0]["Requested Date Time"], "2024-03-14 12:40:00");
        let table = &outcome.log_tables[0];
        assert!(table.contains("SSM Failed or Timed Out Command Invocations"));
        assert!(table.contains(
            r#"<a href="https://us-east-1.console.aws.amazon.com/systems-manager/run-command/5c0d-11?region=us-east-1">5c0d-11</a>"#
        ));
        assert!(table.contains("<td>AWS-RunShellScript</td>"));
    }
}

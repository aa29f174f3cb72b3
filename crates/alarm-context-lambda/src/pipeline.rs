use alarm_context_core::alarm::metric_array;
use alarm_context_core::email::{self, BodyParts, RawEmail};
use alarm_context_core::html;
use alarm_context_core::links;
use alarm_context_core::prompt::{self, PromptInputs};
use alarm_context_core::{
    AlarmArn, AlarmEvent, AlarmWindow, CoreError, DimensionSet, Handler, HandlerResult, RequestEnv,
};
use aws_config::SdkConfig;
use aws_lambda_events::event::sns::SnsEvent;
use serde_json::Value;
use tracing::{info, warn};

use crate::bedrock;
use crate::clients::{AwsClients, with_region};
use crate::cloudformation;
use crate::config::Config;
use crate::errors::AlarmError;
use crate::health;
use crate::history;
use crate::metrics;
use crate::runner::{self, HandlerRun};
use crate::ses;

/// Cold-start state shared by every invocation.
pub struct Enricher {
    config: Config,
    sdk: SdkConfig,
    ses: aws_sdk_sesv2::Client,
    bedrock: Option<aws_sdk_bedrockruntime::Client>,
}

impl Enricher {
    pub fn new(config: Config, sdk: SdkConfig) -> Self {
        let ses = aws_sdk_sesv2::Client::new(&with_region(&sdk, &config.region));
        let bedrock = config
            .bedrock
            .as_ref()
            .map(|bedrock| {
                aws_sdk_bedrockruntime::Client::new(&with_region(&sdk, &bedrock.region))
            });
        Self {
            config,
            sdk,
            ses,
            bedrock,
        }
    }

    /// Enrich the alarm in the first SNS record and email it. Returns the SES
    /// message id.
    pub async fn handle(&self, event: SnsEvent) -> Result<String, AlarmError> {
        let record = event.records.first();
        let message = alarm_message(record.map(|record| record.sns.message.as_str()))?;
        let alarm: AlarmEvent = serde_json::from_value(message.clone()).map_err(CoreError::from)?;
        info!(
            alarm_name = %alarm.alarm_name,
            state = %alarm.new_state_value,
            state_change_time = %alarm.state_change_time,
            "processing alarm"
        );

        let alarm_metrics = metric_array(&alarm.trigger)?;
        info!(
            namespace = %alarm_metrics.namespace,
            metric_name = %alarm_metrics.metric_name,
            metrics = alarm_metrics.lines.len(),
            "resolved alarm metrics"
        );
        let window = AlarmWindow::parse(&alarm.state_change_time)?;
        let arn: AlarmArn = alarm.alarm_arn.parse()?;
        let region = arn.region.as_str();
        let clients = AwsClients::for_region(&self.sdk, region);
        let precision = self.config.rounding_precision;

        let dimensions = DimensionSet::new(&alarm_metrics.dimensions);
        let env = RequestEnv {
            namespace: &alarm_metrics.namespace,
            metric_name: &alarm_metrics.metric_name,
            dimensions: &dimensions,
            region,
            account_id: &arn.account_id,
            window: &window,
        };
        let run = match Handler::for_namespace(&alarm_metrics.namespace) {
            Some(handler) => runner::run(&clients, &env, handler, precision).await?,
            None => {
                warn!(namespace = %alarm_metrics.namespace, "undefined_namespace_dimensions");
                HandlerRun::default()
            }
        };
        let result = &run.result;

        let display_change_time = window.display_change_time();
        let text_summary = email::text_summary(&alarm, &display_change_time);
        let mut summary = email::summary_html(&alarm, &display_change_time, region);
        if let Some(notifications) = &result.notifications {
            summary.push_str(notifications);
        }
        let additional_information = additional_information(region, result);

        let main_graph =
            metrics::main_graph(&clients.cloudwatch, &alarm_metrics, region, &window).await?;
        let metric_data = metrics::alarm_metric_data(
            &clients.cloudwatch,
            &alarm_metrics,
            &arn.account_id,
            &window,
            precision,
        )
        .await?;
        let alarm_history = history::alarm_history(&clients.cloudwatch, &alarm.alarm_name).await?;
        let health_events = health::describe_events(&clients.health, region).await?;
        let template = cloudformation::stack_template(
            &clients.cloudformation,
            result.tags.as_deref().unwrap_or_default(),
            &run.root_cause_types,
        )
        .await?;

        let mut inputs = PromptInputs {
            alarm_history,
            message: message.clone(),
            metric_data,
            text_summary: text_summary.clone(),
            health_events,
            truncated_cloudformation_template: template,
            ..Default::default()
        };
        add_handler_context(&mut inputs, result);
        let ai_response = match (&self.bedrock, &self.config.bedrock) {
            (Some(client), Some(config)) => bedrock::analyse(client, config, &inputs).await?,
            _ => {
                info!("Bedrock analysis is disabled");
                prompt::disabled_panel()
            }
        };

        let subject = email::subject(&alarm.alarm_name);
        let widgets = result.widget_images.as_deref().unwrap_or_default();
        let (alarm_details, metric_details) = detail_tables(&message);
        let html = email::html_body(&BodyParts {
            subject: &subject,
            summary: &summary,
            ai_response: &ai_response,
            widgets,
            trace: result.trace.as_deref(),
            additional_information: &additional_information,
            alarm_details: &alarm_details,
            metric_details: &metric_details,
        });
        let attachments = email::attachments(main_graph, widgets);

        let message_id = ses::send(
            &self.ses,
            &RawEmail {
                sender: &self.config.sender,
                recipient: &self.config.recipient,
                subject: &subject,
                text: &text_summary,
                html: &html,
                attachments: &attachments,
            },
        )
        .await?;
        Ok(message_id)
    }
}

/// The alarm JSON carried as the SNS message body.
fn alarm_message(message: Option<&str>) -> Result<Value, AlarmError> {
    let message = message.ok_or(AlarmError::EmptyEvent)?;
    Ok(serde_json::from_str(message).map_err(CoreError::from)?)
}

/// Generic links, then the handler's links, logs and resource descriptions.
fn additional_information(region: &str, result: &HandlerResult) -> String {
    let mut html = html::link_buttons(&links::generic_links(region));
    for section in [
        &result.contextual_links,
        &result.log_information,
        &result.resource_information,
    ]
    .into_iter()
    .flatten()
    {
        html.push_str(section);
    }
    html
}

/// Prompt sections that come from the namespace handler.
fn add_handler_context(inputs: &mut PromptInputs, result: &HandlerResult) {
    inputs.resource_information_object =
        result.resource_information_object.clone().unwrap_or_default();
    inputs.log_events = result.log_events.clone().map(Value::Array).unwrap_or_default();
    inputs.additional_metrics_with_timestamps_removed = result
        .additional_metrics_with_timestamps_removed
        .clone()
        .map(Value::Array)
        .unwrap_or_default();
    inputs.trace_summary = result.trace_summary.clone().unwrap_or_default();
}

/// "Alarm" table without the trigger, and the trigger as "Metrics".
fn detail_tables(message: &Value) -> (String, String) {
    let mut alarm = message.clone();
    let trigger = alarm
        .as_object_mut()
        .and_then(|object| object.shift_remove("Trigger"))
        .unwrap_or_default();
    (
        html::key_value_table("Alarm", &alarm),
        html::key_value_table("Metrics", &trigger),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_record_is_an_empty_event() {
        assert!(matches!(alarm_message(None), Err(AlarmError::EmptyEvent)));
    }

    #[test]
    fn malformed_message_is_a_core_error() {
        assert!(matches!(
            alarm_message(Some("not json")),
            Err(AlarmError::Core(CoreError::Message(_)))
        ));
    }

    #[test]
    fn message_parses_into_alarm_event() {
        let body = json!({
            "AlarmName": "orders-errors",
            "AlarmDescription": null,
            "NewStateValue": "ALARM",
            "NewStateReason": "Threshold Crossed",
            "StateChangeTime": "2024-03-14T12:53:20.538+0000",
            "AlarmArn": "arn:aws:cloudwatch:us-east-1:123456789012:alarm:orders-errors",
            "Region": "US East (N. Virginia)",
            "Trigger": {
                "MetricName": "Errors",
                "Namespace": "AWS/Lambda",
                "Statistic": "SUM",
                "Dimensions": [{ "name": "FunctionName", "value": "orders" }],
                "Period": 60,
                "ComparisonOperator": "GreaterThanThreshold",
                "Threshold": 0.0
            }
        })
        .to_string();

        let message = alarm_message(Some(&body)).unwrap();
        let alarm: AlarmEvent = serde_json::from_value(message).unwrap();
        assert_eq!(alarm.alarm_name, "orders-errors");
        assert_eq!(alarm.trigger.namespace.as_deref(), Some("AWS/Lambda"));
    }

    #[test]
    fn details_split_trigger_from_alarm() {
        let message = json!({
            "AlarmName": "orders-errors",
            "Trigger": { "MetricName": "Errors" }
        });
        let (alarm, metrics) = detail_tables(&message);
        assert!(alarm.contains("orders-errors"));
        assert!(!alarm.contains("MetricName"));
        assert!(metrics.contains("MetricName"));
        assert!(metrics.contains("<b>Metrics</b>"));
    }

    #[test]
    fn additional_information_order() {
        let result = HandlerResult {
            contextual_links: Some("<p>links</p>".into()),
            resource_information: Some("<p>resources</p>".into()),
            log_information: Some("<p>logs</p>".into()),
            ..HandlerResult::empty()
        };
        let html = additional_information("us-east-1", &result);
        assert!(html.starts_with(&html::link_buttons(&links::generic_links("us-east-1"))));
        assert!(html.ends_with("<p>links</p><p>logs</p><p>resources</p>"));
    }

    #[test]
    fn unmatched_namespace_gets_generic_links_only() {
        assert!(Handler::for_namespace("Custom/Foo").is_none());
        let run = HandlerRun::default();

        let html = additional_information("us-east-1", &run.result);
        assert_eq!(html, html::link_buttons(&links::generic_links("us-east-1")));
        assert!(html.contains("Cross service dashboard"));
        assert!(html.contains("AWS Health dashboard"));
        assert_eq!(html.matches("<a ").count(), 2);
    }

    #[test]
    fn unmatched_namespace_prompt_omits_handler_sections() {
        let run = HandlerRun::default();
        let mut inputs = PromptInputs {
            message: json!({ "AlarmName": "custom", "Trigger": { "Namespace": "Custom/Foo" } }),
            text_summary: "summary".to_string(),
            ..Default::default()
        };
        add_handler_context(&mut inputs, &run.result);

        let prompt = prompt::build_prompt(&inputs);
        for absent in [
            "<resource_information_object>",
            "<log_events>",
            "<additional_metrics_with_timestamps_removed>",
            "<trace_summary>",
        ] {
            assert!(!prompt.contains(absent), "{absent} should be omitted");
        }
        assert!(prompt.contains("<text_summary>"));
    }

    #[test]
    fn handler_context_fills_prompt_sections() {
        let result = HandlerResult {
            resource_information_object: Some(json!({ "FunctionName": "orders" })),
            log_events: Some(vec![json!({ "message": "boom" })]),
            trace_summary: Some(json!({ "TraceSummaries": [] })),
            ..HandlerResult::empty()
        };
        let mut inputs = PromptInputs::default();
        add_handler_context(&mut inputs, &result);
        assert_eq!(inputs.resource_information_object, json!({ "FunctionName": "orders" }));
        assert_eq!(inputs.log_events, json!([{ "message": "boom" }]));
        assert_eq!(inputs.additional_metrics_with_timestamps_removed, Value::Null);
    }
}

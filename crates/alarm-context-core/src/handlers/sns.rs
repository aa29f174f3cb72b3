use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::Notification;

use super::{HandlerPlan, LogRequest, MissingLog, RequestEnv, ResourceRequest, metric_widgets};

/// Delivery status log fields worth a first look.
pub const DELIVERY_STATUS_QUERY: &str = "fields @timestamp, delivery.statusCode as code, status, delivery.attempts as attempts, notification.messageId as messageId, @message
| sort @timestamp desc
| limit 100";

const SHAPES: &[Shape<()>] = &[Shape::new((), &["TopicName"])];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    if env.dimensions.classify(SHAPES).is_none() {
        return Ok(None);
    }
    let region = env.region;
    let account = env.account_id;
    let topic = env.dimensions.value("TopicName");
    let topic_arn = format!("arn:aws:sns:{region}:{account}:{topic}");

    let not_logging = Notification::new(
        "Your SNS topic is not writing logs to CloudWatch Logs",
        "For additional information, configure SNS to log status to CloudWatch Logs. Follow the instructions <a href=\"https://docs.aws.amazon.com/sns/latest/dg/sms_stats_cloudwatch.html#sns-viewing-cloudwatch-logs\" rel=\"noopener\" target=\"_blank\">here&nbsp;<span><img style=\"margin-bottom: -4px;\" src=\"cid:imageId2\"></span></a>",
    );

    let mut widgets = metric_widgets(
        env.namespace,
        &[("TopicName", topic)],
        &[("NumberOfNotificationsDelivered", "Sum"), ("NumberOfNotificationsFailed", "Sum")],
        60,
    );
    widgets[0].title = "Number Of Notifications Delivered: Sum".into();
    widgets[1].title = "Number Of Notifications Failed: Sum".into();

    Ok(Some(
        HandlerPlan::new()
            .link(
                format!("{topic} details"),
                links::console(region, &format!("sns/v3/home?region={region}#/topic/{topic_arn}")),
            )
            .link("SNS in ALARM dashboard", links::alarm_dashboard(region, "SNS"))
            .log(
                LogRequest::group(format!("sns/{region}/{account}/{topic}"))
                    .recent_events()
                    .insights_link(DELIVERY_STATUS_QUERY)
                    .when_missing(MissingLog::Notify(not_logging)),
            )
            .widgets(widgets)
            .resource(ResourceRequest::SnsTopic { topic_arn })
            .trace(env.service_trace(topic, "AWS::SNS::Topic")?),
    ))
}

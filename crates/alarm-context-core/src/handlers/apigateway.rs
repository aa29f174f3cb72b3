use crate::dashboard::WidgetSpec;
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::Link;
use crate::query::insights_literal;

use super::{
    HandlerPlan, LogRequest, MissingLog, RequestEnv, ResourceOutcome, ResourceRequest, metric_line,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Stage,
    Api,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(Kind::Stage, &["ApiName", "ApiStage"]),
    Shape::new(Kind::Api, &["ApiName"]),
];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let Some(kind) = env.dimensions.classify(SHAPES) else {
        return Ok(None);
    };
    let api_name = env.dimensions.value("ApiName");
    let stage = env.dimensions.get("ApiStage");

    let mut dimensions = vec![("ApiName", api_name)];
    if let Some(stage) = stage {
        dimensions.push(("ApiStage", stage));
    }
    let widget = |title: &str, metric: &str, stat: &str| {
        WidgetSpec::time_series(title)
            .stat(stat)
            .period(60)
            .line(metric_line(env.namespace, metric, &dimensions))
    };
    let count = match kind {
        Kind::Stage => widget("Request Count", "Count", "SampleCount"),
        Kind::Api => widget("Count", "Count", "Sum"),
    };

    Ok(Some(
        HandlerPlan::new()
            .widgets([
                widget("Integration Latency", "IntegrationLatency", "Average"),
                widget("Latency", "Latency", "Average"),
                widget("5xx Errors", "5XXError", "Sum"),
                count,
                widget("4xx Errors", "4XXError", "Sum"),
            ])
            .resource(ResourceRequest::RestApi {
                api_name: api_name.to_string(),
                stage: stage.map(str::to_string),
            }),
    ))
}

/// Follow-ups once the REST API id is known: the stage link and the stage's
/// execution log group.
pub fn rest_api_followup(
    env: &RequestEnv<'_>,
    api_id: &str,
    api_name: &str,
    stage: Option<&str>,
) -> Result<ResourceOutcome, CoreError> {
    let region = env.region;
    let Some(stage) = stage else {
        return Ok(ResourceOutcome {
            links: vec![Link::new(
                format!("{api_name} details"),
                links::console(region, &format!("apigateway/home?region={region}#/apis/{api_id}/resources")),
            )],
            ..Default::default()
        });
    };

    let log_group = format!("/aws/api-gateway/{api_id}/{stage}");
    let query = format!(
        "fields @timestamp, @message
| filter requestContext.apiId = {}
| sort @timestamp desc
| limit 200",
        insights_literal(api_id)?
    );
    Ok(ResourceOutcome {
        links: vec![Link::new(
            format!("{api_name} stage: {stage} details"),
            links::console(region, &format!("apigateway/home?region={region}#/apis/{api_id}/stages/{stage}")),
        )],
        logs: vec![
            LogRequest::group(log_group.as_str())
                .recent_events()
                .insights_link(&query)
                .when_missing(MissingLog::Note(format!("Log group {log_group} does not exist"))),
        ],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::MetricLine;
    use crate::handlers::LogSource;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn stage_plan() {
        let fixture = Fixture::new(&[("ApiStage", "prod"), ("ApiName", "orders")]);
        let plan = plan(&fixture.env("AWS/ApiGateway", "5XXError")).unwrap().unwrap();

        assert_eq!(
            titles(&plan),
            vec!["Integration Latency", "Latency", "5xx Errors", "Request Count", "4xx Errors"]
        );
        assert_eq!(plan.widgets[3].stat.as_deref(), Some("SampleCount"));
        assert_eq!(
            plan.widgets[0].metrics[0],
            MetricLine::metric("AWS/ApiGateway", "IntegrationLatency")
                .dim("ApiName", "orders")
                .dim("ApiStage", "prod")
        );
        assert_eq!(
            plan.resources,
            vec![ResourceRequest::RestApi {
                api_name: "orders".into(),
                stage: Some("prod".into())
            }]
        );
    }

    #[test]
    fn api_only_plan_counts_with_sum() {
        let fixture = Fixture::new(&[("ApiName", "orders")]);
        let plan = plan(&fixture.env("AWS/ApiGateway", "Count")).unwrap().unwrap();
        assert_eq!(plan.widgets[3].title, "Count");
        assert_eq!(plan.widgets[3].stat.as_deref(), Some("Sum"));
    }

    #[test]
    fn followup_reads_stage_log_group() {
        let fixture = Fixture::new(&[("ApiStage", "prod"), ("ApiName", "orders")]);
        let env = fixture.env("AWS/ApiGateway", "5XXError");
        let outcome = rest_api_followup(&env, "a1b2c3", "orders", Some("prod")).unwrap();

        assert!(outcome.links[0].url.ends_with("#/apis/a1b2c3/stages/prod"));
        let log = &outcome.logs[0];
        assert_eq!(log.source, LogSource::Group("/aws/api-gateway/a1b2c3/prod".into()));
        assert!(log.insights_link.as_deref().unwrap().contains("requestContext.apiId = 'a1b2c3'"));
        assert_eq!(
            log.when_missing,
            Some(MissingLog::Note("Log group /aws/api-gateway/a1b2c3/prod does not exist".into()))
        );

        let without_stage = rest_api_followup(&env, "a1b2c3", "orders", None).unwrap();
        assert!(without_stage.logs.is_empty());
        assert_eq!(without_stage.links[0].title, "orders details");
    }
}

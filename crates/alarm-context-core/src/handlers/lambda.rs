use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::{Link, Notification};
use crate::query::xray_literal;

use super::{HandlerPlan, LogRequest, RequestEnv, ResourceOutcome, ResourceRequest};

const INSIGHTS_LAYER: &str = "LambdaInsightsExtension";

const STANDARD_METRICS: &[(&str, &str)] = &[
    ("Invocations", "Sum"),
    ("Duration", "Average"),
    ("Errors", "Sum"),
    ("Throttles", "Sum"),
];

const INSIGHTS_METRICS: &[(&str, &str)] = &[
    ("Memory Utilization", "memory_utilization"),
    ("CPU Total Time", "cpu_total_time"),
    ("Total Network", "total_network"),
];

/// Errors plus the runtime's timeout message.
pub const FUNCTION_ERRORS_QUERY: &str = "filter @message like /(?i)(Exception|error|fail)/ or @message LIKE /Task timed out/
| fields @timestamp, @message
| sort @timestamp desc
| limit 100";

const SHAPES: &[Shape<()>] = &[Shape::new((), &["FunctionName"])];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let region = env.region;
    let plan = HandlerPlan::new().link("Lambda automatic dashboard", links::alarm_dashboard(region, "Lambda"));

    if env.dimensions.is_empty() {
        if env.metric_name.is_empty() {
            return Ok(None);
        }
        return Ok(Some(plan.widgets(standard_widgets(env.namespace, None))));
    }
    if env.dimensions.classify(SHAPES).is_none() {
        return Ok(None);
    }

    let function = env.dimensions.value("FunctionName");
    Ok(Some(
        plan.link(
            "Lambda Function Monitoring",
            links::console(region, &format!("lambda/home?region={region}#/functions/{function}?tab=monitoring")),
        )
        .widgets(standard_widgets(env.namespace, Some(function)))
        .resource(ResourceRequest::LambdaFunction {
            function: function.to_string(),
        })
        .log(
            LogRequest::group(format!("/aws/lambda/{function}"))
                .recent_events()
                .insights_link(FUNCTION_ERRORS_QUERY),
        ),
    ))
}

fn standard_widgets(namespace: &str, function: Option<&str>) -> Vec<WidgetSpec> {
    STANDARD_METRICS
        .iter()
        .map(|(metric, stat)| {
            let line = MetricLine::metric(namespace, *metric);
            let line = match function {
                Some(function) => line.dim("FunctionName", function),
                None => line,
            };
            WidgetSpec::time_series(*metric).stat(stat).period(60).line(line)
        })
        .collect()
}

/// Whether any attached layer is the Lambda Insights extension.
pub fn insights_enabled<'a>(layer_arns: impl IntoIterator<Item = &'a str>) -> bool {
    layer_arns.into_iter().any(|arn| {
        if !arn.starts_with("arn:aws:lambda:") {
            return false;
        }
        let parts: Vec<&str> = arn.split(':').collect();
        parts.len() >= 2 && parts[parts.len() - 2].starts_with(INSIGHTS_LAYER)
    })
}

/// Follow-ups from `GetFunction`: Lambda Insights and, with active tracing,
/// the X-Ray link and trace lookup.
pub fn function_followup(
    env: &RequestEnv<'_>,
    function: &str,
    insights: bool,
    tracing_active: bool,
) -> Result<ResourceOutcome, CoreError> {
    let region = env.region;
    let mut outcome = ResourceOutcome::default();

    if insights {
        outcome.links.push(Link::new(
            "Lambda Insights",
            links::cloudwatch(region, &format!("lambda-insights:functions/{function}")),
        ));
        outcome.widgets = INSIGHTS_METRICS
            .iter()
            .map(|(title, metric)| {
                WidgetSpec::time_series(*title)
                    .stat("Maximum")
                    .period(60)
                    .line(MetricLine::metric("LambdaInsights", *metric).dim("function_name", function))
            })
            .collect();
    } else {
        let url = links::console(
            region,
            &format!("lambda/home?region={region}#/functions/{function}/edit/monitoring-tools?tab=configure"),
        );
        outcome.notifications.push(Notification::new(
            "Lambda Insights",
            format!(
                "<p>You do not have Lambda Insights enabled for this Lambda function. CloudWatch Lambda Insights is a monitoring and troubleshooting solution for serverless applications running on AWS Lambda. The solution collects, aggregates, and summarizes system-level metrics including CPU time, memory, disk and network usage. It also collects, aggregates, and summarizes diagnostic information such as cold starts and Lambda worker shutdowns to help you isolate issues with your Lambda functions and resolve them quickly.<a href=\"{url}\">Enable Lambda Insights</a>"
            ),
        ));
    }

    if tracing_active {
        let service = format!(
            "service(id(name: {}, type: \"AWS::Lambda::Function\"))",
            xray_literal(function)?
        );
        outcome.links.push(Link::new(
            "X-Ray Traces",
            links::xray_traces_query(region, &service, env.window.start, env.window.end),
        ));
        outcome.trace = Some(env.service_trace(function, "AWS::Lambda::Function")?);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::LogSource;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn function_plan() {
        let fixture = Fixture::new(&[("FunctionName", "checkout")]);
        let plan = plan(&fixture.env("AWS/Lambda", "Errors")).unwrap().unwrap();

        assert_eq!(titles(&plan), vec!["Invocations", "Duration", "Errors", "Throttles"]);
        assert!(plan.links[1].url.ends_with("#/functions/checkout?tab=monitoring"));
        assert_eq!(plan.logs[0].source, LogSource::Group("/aws/lambda/checkout".into()));
        assert!(plan.logs[0].recent_events);
        assert_eq!(plan.resources, vec![ResourceRequest::LambdaFunction { function: "checkout".into() }]);
        assert!(plan.trace.is_none());
    }

    #[test]
    fn namespace_wide_without_dimensions() {
        let fixture = Fixture::new(&[]);
        let plan = plan(&fixture.env("AWS/Lambda", "Throttles")).unwrap().unwrap();
        assert_eq!(plan.widgets.len(), 4);
        assert_eq!(plan.widgets[0].metrics[0], MetricLine::metric("AWS/Lambda", "Invocations"));
        assert!(plan.resources.is_empty());

        assert!(plan_for(&[], "").is_none());
        assert!(plan_for(&[("Resource", "checkout:live")], "Errors").is_none());
    }

    fn plan_for(dimensions: &[(&str, &str)], metric: &str) -> Option<HandlerPlan> {
        let fixture = Fixture::new(dimensions);
        plan(&fixture.env("AWS/Lambda", metric)).unwrap()
    }

    #[test]
    fn detects_insights_layer() {
        assert!(insights_enabled([
            "arn:aws:lambda:us-east-1:580247275435:layer:LambdaInsightsExtension:38"
        ]));
        assert!(insights_enabled([
            "arn:aws:lambda:us-east-1:111:layer:other:1",
            "arn:aws:lambda:us-east-1:580247275435:layer:LambdaInsightsExtension-Arm64:5",
        ]));
        assert!(!insights_enabled(["arn:aws:lambda:us-east-1:111:layer:other:1"]));
        assert!(!insights_enabled([]));
    }

    #[test]
    fn followup_with_insights_and_tracing() {
        let fixture = Fixture::new(&[("FunctionName", "checkout")]);
        let env = fixture.env("AWS/Lambda", "Errors");

        let outcome = function_followup(&env, "checkout", true, true).unwrap();
        assert_eq!(outcome.widgets.len(), 3);
        assert_eq!(outcome.widgets[2].title, "Total Network");
        assert_eq!(outcome.links[0].title, "Lambda Insights");
        assert_eq!(outcome.links[1].title, "X-Ray Traces");
        assert!(outcome.links[1].url.contains("name*3a*20*22checkout*22"));
        assert!(outcome.trace.unwrap().filter_expression.contains("AWS::Lambda::Function"));
    }

    #[test]
    fn followup_without_insights_or_tracing() {
        let fixture = Fixture::new(&[("FunctionName", "checkout")]);
        let env = fixture.env("AWS/Lambda", "Errors");

        let outcome = function_followup(&env, "checkout", false, false).unwrap();
        assert!(outcome.widgets.is_empty());
        assert!(outcome.links.is_empty());
        assert!(outcome.trace.is_none());
        assert!(outcome.notifications[0].body.contains("monitoring-tools?tab=configure"));
    }
}

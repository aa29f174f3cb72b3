use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::Link;
use crate::query::xray_literal;
use crate::trace::TraceRequest;

use super::{
    HandlerPlan, LogRequest, RECENT_MESSAGES_QUERY, RequestEnv, ResourceOutcome, ResourceRequest,
};

const SINGLE_VALUES: &[(&str, &str)] = &[("Duration", "Average"), ("Failed", "Sum"), ("4xx", "Sum"), ("5xx", "Sum")];

const TIME_SERIES: &[(&str, &str)] = &[
    ("Duration", "Average"),
    ("SuccessPercent", "Average"),
    ("2xx", "Sum"),
    ("4xx", "Sum"),
    ("5xx", "Sum"),
    ("Failed", "Sum"),
];

const RUN_TRACE_MARGIN_MINUTES: i64 = 5;

const SHAPES: &[Shape<()>] = &[Shape::new((), &["CanaryName"])];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    if env.dimensions.classify(SHAPES).is_none() {
        return Ok(None);
    }
    let region = env.region;
    let canary = env.dimensions.value("CanaryName");
    let line = |metric: &str| MetricLine::metric(env.namespace, metric).dim("CanaryName", canary);

    let singles = SINGLE_VALUES
        .iter()
        .map(|(metric, stat)| {
            WidgetSpec::single_value(*metric).stat(stat).period(60).line(line(*metric))
        });
    let series = TIME_SERIES
        .iter()
        .map(|(metric, stat)| {
            WidgetSpec::time_series(*metric).stat(stat).period(60).line(line(*metric))
        });

    Ok(Some(
        HandlerPlan::new()
            .link(
                format!("{canary} details"),
                links::cloudwatch(region, &format!("synthetics:canary/detail/{canary}")),
            )
            .link(
                "Canaries in ALARM dashboard",
                links::alarm_dashboard(region, "CloudWatchSynthetics"),
            )
            .widgets(singles.chain(series))
            .resource(ResourceRequest::Canary {
                name: canary.to_string(),
            }),
    ))
}

/// Function name of a canary's engine, e.g.
/// `arn:aws:lambda:us-east-1:123456789012:function:cwsyn-web-1a2b:3` → `cwsyn-web-1a2b`.
pub fn engine_function(engine_arn: &str) -> Option<&str> {
    engine_arn.split(':').nth(6)
}

/// The fields of a canary run used to pick one and search its traces.
#[derive(Debug, Clone, PartialEq)]
pub struct CanaryRun {
    pub id: String,
    pub state: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// The run as shown to the reader.
    pub detail: Value,
}

impl CanaryRun {
    /// A run with only an id and state, for callers that have nothing else.
    pub fn new(id: impl Into<String>, state: Option<&str>) -> Self {
        let id = id.into();
        Self {
            detail: json!({ "Id": id, "Status": { "State": state } }),
            id,
            state: state.map(str::to_string),
            started: None,
            completed: None,
        }
    }
}

/// The first failed run, otherwise the most recent one.
pub fn select_run(runs: &[CanaryRun]) -> Option<&CanaryRun> {
    runs.iter()
        .find(|run| run.state.as_deref() == Some("FAILED"))
        .or_else(|| runs.first())
}

/// Traces the run produced, within five minutes either side of it.
pub fn run_trace(env: &RequestEnv<'_>, run: &CanaryRun) -> Result<TraceRequest, CoreError> {
    let margin = Duration::minutes(RUN_TRACE_MARGIN_MINUTES);
    let started = run.started.unwrap_or(env.window.start);
    let completed = run.completed.unwrap_or(env.window.end);
    Ok(TraceRequest {
        filter_expression: format!(
            "annotation.aws:canary_run_id = {} and responsetime > 0",
            xray_literal(&run.id)?
        ),
        start: started - margin,
        end: completed + margin,
    })
}

/// Logs of the canary's engine function plus the selected run and its trace.
pub fn canary_followup(
    env: &RequestEnv<'_>,
    canary: &str,
    engine_arn: Option<&str>,
    runs: &[CanaryRun],
) -> Result<ResourceOutcome, CoreError> {
    let mut outcome = ResourceOutcome::default();

    if let Some(function) = engine_arn.and_then(engine_function) {
        let group = format!("/aws/lambda/{function}");
        outcome.links.push(Link::new(
            "Log Insights",
            links::logs_insights(
                env.region,
                std::slice::from_ref(&group),
                RECENT_MESSAGES_QUERY,
                env.window.start,
                env.window.end,
            ),
        ));
        outcome.logs.push(LogRequest::group(group).recent_events());
    }

    if let Some(run) = select_run(runs) {
        outcome = outcome.info(format!("Last Canary Run for {canary}"), run.detail.clone());
        outcome.trace = Some(run_trace(env, run)?);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn canary_plan() {
        let fixture = Fixture::new(&[("CanaryName", "web")]);
        let plan = plan(&fixture.env("CloudWatchSynthetics", "SuccessPercent")).unwrap().unwrap();

        assert_eq!(plan.widgets.len(), 10);
        assert_eq!(titles(&plan)[..4], ["Duration", "Failed", "4xx", "5xx"]);
        assert_eq!(plan.widgets[3].view.as_str(), "singleValue");
        assert_eq!(plan.widgets[4].view.as_str(), "timeSeries");
        assert!(plan.links[0].url.ends_with("#synthetics:canary/detail/web"));
        assert_eq!(plan.resources, vec![ResourceRequest::Canary { name: "web".into() }]);
    }

    #[test]
    fn engine_arn_names_function() {
        assert_eq!(
            engine_function("arn:aws:lambda:us-east-1:123456789012:function:cwsyn-web-1a2b:3"),
            Some("cwsyn-web-1a2b")
        );
        assert_eq!(engine_function("arn:aws:lambda:us-east-1"), None);
    }

    #[test]
    fn selects_first_failed_run_else_first() {
        let passed = CanaryRun::new("r1", Some("PASSED"));
        let failed = CanaryRun::new("r2", Some("FAILED"));
        let runs = vec![passed.clone(), failed.clone(), CanaryRun::new("r3", Some("FAILED"))];
        assert_eq!(select_run(&runs).map(|r| r.id.as_str()), Some("r2"));
        assert_eq!(select_run(&[passed]).map(|r| r.id.as_str()), Some("r1"));
        assert!(select_run(&[]).is_none());
    }

    #[test]
    fn run_trace_pads_the_run() {
        let fixture = Fixture::new(&[("CanaryName", "web")]);
        let env = fixture.env("CloudWatchSynthetics", "SuccessPercent");
        let mut run = CanaryRun::new("0f1e-22", Some("FAILED"));
        run.started = Some(fixture.window.change);
        run.completed = Some(fixture.window.change + Duration::seconds(30));

        let trace = run_trace(&env, &run).unwrap();
        assert_eq!(
            trace.filter_expression,
            r#"annotation.aws:canary_run_id = "0f1e-22" and responsetime > 0"#
        );
        assert_eq!(trace.start, fixture.window.change - Duration::minutes(5));
        assert_eq!(trace.end, fixture.window.change + Duration::seconds(330));
    }

    #[test]
    fn followup_reads_engine_logs() {
        let fixture = Fixture::new(&[("CanaryName", "web")]);
        let env = fixture.env("CloudWatchSynthetics", "SuccessPercent");
        let runs = [CanaryRun::new("r1", Some("PASSED"))];
        let outcome = canary_followup(
            &env,
            "web",
            Some("arn:aws:lambda:us-east-1:123456789012:function:cwsyn-web-1a2b:3"),
            &runs,
        )
        .unwrap();

        assert_eq!(outcome.logs[0], LogRequest::group("/aws/lambda/cwsyn-web-1a2b").recent_events());
        assert_eq!(outcome.information[0].title, "Last Canary Run for web");
        assert!(outcome.trace.is_some());
        assert!(canary_followup(&env, "web", None, &[]).unwrap().logs.is_empty());
    }
}

use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;

use super::{HandlerPlan, RequestEnv, ResourceRequest};

const NAMESPACE: &str = "AWS/DynamoDB";

const READ_OPERATIONS: &[(&str, &str)] = &[
    ("GetItem", "#0073BB"),
    ("Scan", "#FF7F0F"),
    ("Query", "#2DA02D"),
    ("BatchGetItem", "#9468BD"),
];

const WRITE_OPERATIONS: &[(&str, &str)] = &[
    ("PutItem", "#0073BB"),
    ("UpdateItem", "#FF7F0F"),
    ("DeleteItem", "#2DA02D"),
    ("BatchWriteItem", "#9468BD"),
];

const SHAPES: &[Shape<()>] = &[Shape::new((), &["TableName"])];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    if env.dimensions.classify(SHAPES).is_none() {
        return Ok(None);
    }
    let region = env.region;
    let table = env.dimensions.value("TableName");

    Ok(Some(
        HandlerPlan::new()
            .link(
                format!("{table} table Monitoring"),
                links::console(region, &format!("dynamodbv2/home?region={region}#table?name={table}&tab=monitoring")),
            )
            .link(
                format!("{table} details"),
                links::console(region, &format!("dynamodbv2/home?region={region}#table?name={table}")),
            )
            .link("DynamoDB in ALARM dashboard", links::alarm_dashboard(region, "DynamoDB"))
            .widgets(widgets(region, table))
            .resource(ResourceRequest::DynamoDbTable {
                table: table.to_string(),
            })
            .trace(env.service_trace(table, "AWS::DynamoDB::Table")?),
    ))
}

fn widgets(region: &str, table: &str) -> Vec<WidgetSpec> {
    let line = |metric: &str| {
        MetricLine::metric(NAMESPACE, metric)
            .dim("TableName", table)
            .option("region", region)
    };
    let usage = |title: &str, direction: &str| {
        WidgetSpec::time_series(title).stat("Average").period(60).lines([
            line(&format!("Provisioned{direction}CapacityUnits"))
                .label("Provisioned")
                .color("#E02020"),
            line(&format!("Consumed{direction}CapacityUnits"))
                .option("stat", "Sum")
                .id("m1")
                .hidden(),
            MetricLine::expression("m1/PERIOD(m1)")
                .label("Consumed")
                .id("e1")
                .color("#0073BB")
                .option("region", region),
        ])
    };
    let throttled = |title: &str, operations: &[(&str, &str)]| {
        WidgetSpec::time_series(title).stat("Sum").period(60).lines(
            operations
                .iter()
                .map(|(operation, color)| line("ThrottledRequests").dim("Operation", *operation).color(color)),
        )
    };
    let events = |title: &str, metric: &str| {
        WidgetSpec::time_series(title).stat("Sum").period(60).line(line(metric))
    };

    vec![
        usage("Read usage (average units/second)", "Read"),
        usage("Write usage (average units/second)", "Write"),
        throttled("Read throttled requests (count)", READ_OPERATIONS),
        events("Read throttled events (count)", "ReadThrottleEvents"),
        throttled("Write throttled requests (count)", WRITE_OPERATIONS),
        events("Write throttled events (count)", "WriteThrottleEvents"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{Fixture, titles};

    #[test]
    fn table_plan() {
        let fixture = Fixture::new(&[("TableName", "orders")]);
        let plan = plan(&fixture.env(NAMESPACE, "ReadThrottleEvents")).unwrap().unwrap();

        assert_eq!(titles(&plan).len(), 6);
        assert!(plan.links[0].url.ends_with("#table?name=orders&tab=monitoring"));
        assert_eq!(plan.resources, vec![ResourceRequest::DynamoDbTable { table: "orders".into() }]);
        assert!(plan.trace.is_some());

        let usage = &plan.widgets[0];
        assert_eq!(usage.metrics.len(), 3);
        assert_eq!(usage.metrics[0].options()["region"], "us-east-1");
        assert_eq!(usage.metrics[1].options()["visible"], false);

        let throttled = &plan.widgets[4];
        assert_eq!(throttled.metrics.len(), 4);
        assert!(matches!(
            &throttled.metrics[3],
            MetricLine::Metric { dimensions, .. } if dimensions[1].value == "BatchWriteItem"
        ));
    }

    #[test]
    fn requires_table_name() {
        let fixture = Fixture::new(&[("GlobalSecondaryIndexName", "gsi")]);
        assert!(plan(&fixture.env(NAMESPACE, "ReadThrottleEvents")).unwrap().is_none());
    }
}

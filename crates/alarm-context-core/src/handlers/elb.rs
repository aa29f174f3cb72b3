use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::query::insights_literal;

use super::{HandlerPlan, RequestEnv, ResourceRequest, metric_line};

const NAMESPACE: &str = "AWS/ApplicationELB";

const ZONE_TARGET_GROUP_METRICS: &[(&str, &str)] = &[
    ("RequestCount", "SUM"),
    ("HealthyHostCount", "AVG"),
    ("UnHealthyHostCount", "AVG"),
    ("HTTPCode_Target_2XX_Count", "SUM"),
    ("HTTPCode_Target_3XX_Count", "SUM"),
    ("HTTPCode_Target_4XX_Count", "SUM"),
    ("TargetResponseTime", "AVG"),
];

const ZONE_METRICS: &[(&str, &str)] = &[
    ("RequestCount", "SUM"),
    ("UnhealthyRoutingRequestCount", "SUM"),
    ("HTTPCode_ELB_5XX_Count", "SUM"),
    ("HTTPCode_Target_2XX_Count", "SUM"),
    ("HTTPCode_Target_3XX_Count", "SUM"),
    ("HTTPCode_Target_4XX_Count", "SUM"),
    ("ProcessedBytes", "SUM"),
    ("TargetResponseTime", "AVG"),
];

const LOAD_BALANCER_METRICS: &[(&str, &str)] = &[
    ("HTTPCode_ELB_5XX_Count", "Sum"),
    ("ActiveConnectionCount", "Sum"),
    ("ClientTLSNegotiationErrorCount", "Sum"),
    ("ConsumedLCUs", "Average"),
    ("HTTP_Fixed_Response_Count", "Sum"),
    ("HTTP_Redirect_Count", "Sum"),
    ("HTTP_Redirect_Url_Limit_Exceeded_Count", "Sum"),
    ("HTTPCode_ELB_3XX_Count", "Sum"),
    ("HTTPCode_ELB_4XX_Count", "Sum"),
    ("IPv6ProcessedBytes", "Sum"),
    ("IPv6RequestCount", "Sum"),
    ("NewConnectionCount", "Sum"),
    ("ProcessedBytes", "Sum"),
    ("RejectedConnectionCount", "Sum"),
    ("RuleEvaluations", "Sum"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    ZoneTargetGroup,
    Zone,
    TargetGroup,
    LoadBalancer,
    TargetGroupOnly,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(Kind::ZoneTargetGroup, &["LoadBalancer", "AvailabilityZone", "TargetGroup"]),
    Shape::new(Kind::Zone, &["LoadBalancer", "AvailabilityZone"]),
    Shape::new(Kind::TargetGroup, &["LoadBalancer", "TargetGroup"]),
    Shape::new(Kind::LoadBalancer, &["LoadBalancer"]),
    Shape::new(Kind::TargetGroupOnly, &["TargetGroup"]),
];

/// `app/my-alb/50dc6c495c0c9188` → `my-alb`
fn short_name(value: &str) -> &str {
    value.split('/').nth(1).unwrap_or(value)
}

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let Some(kind) = env.dimensions.classify(SHAPES) else {
        return Ok(None);
    };
    let region = env.region;
    let account = env.account_id;
    let load_balancer = env.dimensions.get("LoadBalancer");
    let target_group = env.dimensions.get("TargetGroup");

    let mut plan = HandlerPlan::new();
    if let Some(lb) = load_balancer {
        plan = plan.link(
            format!("{} ELB details", short_name(lb)),
            links::console(
                region,
                &format!("ec2/home?region={region}#LoadBalancer:loadBalancerArn=arn:aws:elasticloadbalancing:{region}:{account}:loadbalancer/{lb};tab=monitoring"),
            ),
        );
    }
    if let Some(tg) = target_group {
        plan = plan.link(
            format!("{} TG details", short_name(tg)),
            links::console(
                region,
                &format!("ec2/home?region={region}#TargetGroup:targetGroupArn=arn:aws:elasticloadbalancing:{region}:{account}:{tg}"),
            ),
        );
    }
    plan = plan.link("Application ELB in ALARM dashboard", links::alarm_dashboard(region, "ApplicationELB"));

    let widgets = match (kind, load_balancer, target_group) {
        (Kind::ZoneTargetGroup, Some(lb), Some(tg)) => {
            let filter = format!(
                "WHERE LoadBalancer = {} AND TargetGroup = {}",
                insights_literal(lb)?,
                insights_literal(tg)?
            );
            zone_widgets(ZONE_TARGET_GROUP_METRICS, "AvailabilityZone, LoadBalancer, TargetGroup", &filter)
        }
        (Kind::Zone, Some(lb), _) => {
            let filter = format!("WHERE LoadBalancer = {}", insights_literal(lb)?);
            zone_widgets(ZONE_METRICS, "AvailabilityZone, LoadBalancer", &filter)
        }
        (Kind::TargetGroup, Some(lb), Some(tg)) => {
            let mut widgets = vec![
                WidgetSpec::time_series("RequestCount: Sum")
                    .stat("Sum")
                    .period(60)
                    .line(metric_line(NAMESPACE, "RequestCount", &[("LoadBalancer", lb), ("TargetGroup", tg)])),
            ];
            widgets.extend(load_balancer_widgets(lb));
            widgets
        }
        (Kind::LoadBalancer, Some(lb), _) => load_balancer_widgets(lb),
        _ => Vec::new(),
    };

    Ok(Some(plan.widgets(widgets).resource(ResourceRequest::LoadBalancer {
        load_balancer: load_balancer.map(|lb| short_name(lb).to_string()),
        target_group: target_group.map(|tg| short_name(tg).to_string()),
    })))
}

/// Metrics Insights widgets grouped by availability zone.
fn zone_widgets(catalogue: &[(&str, &str)], schema: &str, filter: &str) -> Vec<WidgetSpec> {
    catalogue
        .iter()
        .map(|(metric, aggregate)| {
            WidgetSpec::time_series(*metric).stat("Sum").period(300).line(MetricLine::expression(format!(
                "SELECT {aggregate}({metric}) FROM SCHEMA(\"{NAMESPACE}\", {schema}) {filter} GROUP BY AvailabilityZone"
            )))
        })
        .collect()
}

fn load_balancer_widgets(load_balancer: &str) -> Vec<WidgetSpec> {
    LOAD_BALANCER_METRICS
        .iter()
        .map(|(metric, stat)| {
            WidgetSpec::time_series(format!("{metric}: {stat}"))
                .stat(stat)
                .period(60)
                .line(metric_line(NAMESPACE, metric, &[("LoadBalancer", load_balancer)]))
        })
        .collect()
}

use crate::dashboard::{MetricLine, WidgetSpec};
use crate::dimensions::Shape;
use crate::error::CoreError;
use crate::links;
use crate::model::Link;
use crate::query::xray_literal;
use crate::trace::TraceRequest;

use super::{ERRORS_QUERY, HandlerPlan, LogRequest, RequestEnv, ResourceRequest, metric_line};

const NAMESPACE: &str = "AWS/EC2";
const AUTOSCALING_NAMESPACE: &str = "AWS/AutoScaling";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Instance,
    AutoScalingGroup,
}

const SHAPES: &[Shape<Kind>] = &[
    Shape::new(Kind::Instance, &["InstanceId"]),
    Shape::new(Kind::AutoScalingGroup, &["AutoScalingGroupName"]),
];

pub fn plan(env: &RequestEnv<'_>) -> Result<Option<HandlerPlan>, CoreError> {
    let plan = match env.dimensions.classify(SHAPES) {
        Some(Kind::Instance) => instance(env, env.dimensions.value("InstanceId"))?,
        Some(Kind::AutoScalingGroup) => auto_scaling_group(env, env.dimensions.value("AutoScalingGroupName")),
        None => return Ok(None),
    };
    Ok(Some(plan))
}

fn instance(env: &RequestEnv<'_>, instance_id: &str) -> Result<HandlerPlan, CoreError> {
    let region = env.region;
    let line = |metric: &str| metric_line(NAMESPACE, metric, &[("InstanceId", instance_id)]);
    let widget = |title: &str| WidgetSpec::time_series(title).stat("Average").period(60);

    let widgets = vec![
        widget("CPU Utilization").line(line("CPUUtilization")),
        widget("Network").lines([
            line("NetworkIn").label("Network In").color("#0073BB"),
            line("NetworkOut").label("Network Out").color("#E02020"),
        ]),
        widget("EBS").lines([
            line("EBSReadBytes").label("EBS Read Bytes").color("#0073BB"),
            line("EBSWriteBytes").label("EBS Write Bytes").color("#E02020"),
        ]),
        widget("Status Check").lines([
            line("StatusCheckFailed_Instance").label("Instance").color("#0073BB"),
            line("StatusCheckFailed_System").label("System").color("#E02020"),
            line("StatusCheckFailed").label("Total").color("#9468BD"),
        ]),
    ];

    let filter = format!(
        "!OK AND (service(id(type: \"AWS::EC2::Instance\"))) AND (instance.id = {}) AND service(id(account.id: {}))",
        xray_literal(instance_id)?,
        xray_literal(env.account_id)?
    );

    Ok(HandlerPlan::new()
        .link("EC2 automatic dashboard", links::alarm_dashboard(region, "EC2"))
        .link(
            format!("Resource Health Dashboard: {instance_id}"),
            links::cloudwatch(region, &format!("resource-health:dashboards/ec2/{instance_id}")),
        )
        .link(
            format!("<b>EC2 Console:</b> {instance_id}"),
            links::console(region, &format!("ec2/home?region={region}#InstanceDetails:instanceId={instance_id}")),
        )
        .link(
            format!("<b>Connect to: </b> {instance_id}"),
            links::console(region, &format!("ec2/home?region={region}#ConnectToInstance:instanceId={instance_id}")),
        )
        .widgets(widgets)
        .log(LogRequest::stream(instance_id).recent_events().insights_link(ERRORS_QUERY))
        .resource(ResourceRequest::Ec2Instance {
            instance_id: instance_id.to_string(),
        })
        .trace(env.trace(filter)))
}

fn auto_scaling_group(env: &RequestEnv<'_>, name: &str) -> HandlerPlan {
    let region = env.region;
    let line = |metric: &str| {
        MetricLine::metric(AUTOSCALING_NAMESPACE, metric).dim("AutoScalingGroupName", name)
    };

    const CURRENT: &[(&str, &str)] = &[
        ("Group In Service Instances", "GroupInServiceInstances"),
        ("Group Desired Capacity", "GroupDesiredCapacity"),
        ("Group Pending Instances", "GroupPendingInstances"),
        ("Group Terminating Instances", "GroupTerminatingInstances"),
    ];
    const HISTORY: &[(&str, &str)] = &[
        ("Group Standby Instances", "GroupStandbyInstances"),
        ("Group Min Size", "GroupMinSize"),
        ("Group Max Size", "GroupMaxSize"),
        ("Group Total Instances", "GroupTotalInstances"),
    ];

    let single = CURRENT.iter().map(|(title, metric)| {
        WidgetSpec::single_value(*title).stat("Average").period(60).line(line(*metric))
    });
    let series = CURRENT.iter().chain(HISTORY).map(|(title, metric)| {
        WidgetSpec::time_series(*title).stat("Average").period(60).line(line(*metric))
    });

    HandlerPlan::new()
        .link("ASG automatic dashboard", links::alarm_dashboard(region, "AutoScaling"))
        .link(
            format!("ASG metrics: {name}"),
            links::console(region, &format!("ec2/home?region={region}#AutoScalingGroupDetails:id={name};view=monitoring")),
        )
        .link(
            format!("<b>ASG Console:</b> {name}"),
            links::console(region, &format!("ec2/home?region={region}#AutoScalingGroupDetails:id={name};view=details")),
        )
        .link("EC2 automatic dashboard", links::alarm_dashboard(region, "EC2"))
        .widgets(single.chain(series))
        .resource(ResourceRequest::AutoScalingGroup { name: name.to_string() })
}

/// Systems Manager shortcuts for an instance whose agent is online.
pub fn ssm_links(region: &str, instance_id: &str) -> Vec<Link> {
    vec![
        Link::new(
            format!("<b>SSM Fleet Manager: </b> {instance_id}"),
            links::console(region, &format!("systems-manager/managed-instances/{instance_id}/tags?region={region}")),
        ),
        Link::new(
            format!("<b>SSM Run Command: </b> {instance_id}"),
            links::console(
                region,
                &format!("systems-manager/run-command/send-command?region={region}#instanceIds=[%22{instance_id}%22]"),
            ),
        ),
    ]
}

/// Trace filter over the instances of an Auto Scaling group. `None` for an
/// empty group.
pub fn asg_trace(
    env: &RequestEnv<'_>,
    instance_ids: &[String],
) -> Result<Option<TraceRequest>, CoreError> {
    if instance_ids.is_empty() {
        return Ok(None);
    }
    let instances = instance_ids
        .iter()
        .map(|id| Ok(format!("instance.id = {}", xray_literal(id)?)))
        .collect::<Result<Vec<_>, CoreError>>()?
        .join(" OR ");
    Ok(Some(env.trace(format!(
        "!OK AND ((service(id(type: \"AWS::EC2::Instance\")))) AND ({instances})"
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{Fixture, link_urls, titles};
    use crate::handlers::LogSource;

    #[test]
    fn instance_plan_links_to_instance_details() {
        let fixture = Fixture::new(&[("InstanceId", "i-0123")]);
        let plan = plan(&fixture.env(NAMESPACE, "CPUUtilization")).unwrap().unwrap();

        assert!(link_urls(&plan).iter().any(|url| url.contains("InstanceDetails:instanceId=i-0123")));
        assert_eq!(titles(&plan), vec!["CPU Utilization", "Network", "EBS", "Status Check"]);
        assert_eq!(plan.logs[0].source, LogSource::Stream("i-0123".into()));
        assert!(plan.logs[0].insights_link.is_some());
        assert_eq!(
            plan.resources,
            vec![ResourceRequest::Ec2Instance { instance_id: "i-0123".into() }]
        );
        let trace = plan.trace.unwrap();
        assert!(trace.filter_expression.contains(r#"(instance.id = "i-0123")"#));
        assert!(trace.filter_expression.ends_with(r#"service(id(account.id: "123456789012"))"#));
    }

    #[test]
    fn instance_wins_over_auto_scaling_group() {
        let fixture = Fixture::new(&[("AutoScalingGroupName", "web"), ("InstanceId", "i-0123")]);
        let plan = plan(&fixture.env(NAMESPACE, "CPUUtilization")).unwrap().unwrap();
        assert_eq!(plan.widgets.len(), 4);
    }

    #[test]
    fn auto_scaling_group_plan() {
        let fixture = Fixture::new(&[("AutoScalingGroupName", "web")]);
        let plan = plan(&fixture.env(NAMESPACE, "CPUUtilization")).unwrap().unwrap();

        assert_eq!(plan.widgets.len(), 12);
        assert_eq!(
            plan.widgets.iter().filter(|w| w.view == crate::dashboard::View::SingleValue).count(),
            4
        );
        assert_eq!(plan.links.len(), 4);
        assert!(plan.links[2].url.ends_with("#AutoScalingGroupDetails:id=web;view=details"));
        assert!(plan.trace.is_none());
    }

    #[test]
    fn asg_trace_joins_instances() {
        let fixture = Fixture::new(&[("AutoScalingGroupName", "web")]);
        let env = fixture.env(NAMESPACE, "CPUUtilization");
        let trace = asg_trace(&env, &["i-1".into(), "i-2".into()]).unwrap().unwrap();
        assert_eq!(
            trace.filter_expression,
            r#"!OK AND ((service(id(type: "AWS::EC2::Instance")))) AND (instance.id = "i-1" OR instance.id = "i-2")"#
        );
        assert!(asg_trace(&env, &[]).unwrap().is_none());
    }

    #[test]
    fn ssm_links_quote_instance_id() {
        let links = ssm_links("us-east-1", "i-1");
        assert!(links[1].url.ends_with("#instanceIds=[%22i-1%22]"));
    }

    #[test]
    fn unknown_dimensions_have_no_plan() {
        let fixture = Fixture::new(&[("ImageId", "ami-1")]);
        assert!(plan(&fixture.env(NAMESPACE, "CPUUtilization")).unwrap().is_none());
    }
}

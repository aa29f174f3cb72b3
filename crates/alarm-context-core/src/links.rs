use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::alarm::format_console_time;
use crate::model::Link;

/// Characters left alone by form encoding; everything else is percent-encoded.
const FORM: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'.').remove(b'-').remove(b'~');

/// Characters an X-Ray console expression keeps verbatim.
const XRAY_EXPRESSION: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'.').remove(b'-');

/// Form-encode a value, spaces as `+`.
pub fn quote_plus(value: &str) -> String {
    value
        .split(' ')
        .map(|part| utf8_percent_encode(part, FORM).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// `https://{region}.console.aws.amazon.com/{path}`
pub fn console(region: &str, path: &str) -> String {
    format!("https://{region}.console.aws.amazon.com/{path}")
}

/// A CloudWatch console hash route.
pub fn cloudwatch(region: &str, fragment: &str) -> String {
    console(region, &format!("cloudwatch/home?region={region}#{fragment}"))
}

/// CloudWatch automatic dashboard filtered to resources in ALARM.
pub fn alarm_dashboard(region: &str, service: &str) -> String {
    cloudwatch(region, &format!("home:dashboards/{service}?~(alarmStateFilter~(~'ALARM))"))
}

/// CloudWatch automatic dashboard with the legend enabled.
pub fn legend_dashboard(region: &str, service: &str) -> String {
    cloudwatch(region, &format!("home:dashboards/{service}?~(globalLegendEnabled~true)"))
}

/// Links shown for every alarm regardless of namespace.
pub fn generic_links(region: &str) -> Vec<Link> {
    vec![
        Link::new("Cross service dashboard", cloudwatch(region, "home:cross_service")),
        Link::new("AWS Health dashboard", "https://health.aws.amazon.com/health/home"),
    ]
}

/// The alarm itself in the CloudWatch console.
pub fn alarm(region: &str, alarm_name: &str) -> String {
    console(
        region,
        &format!(
            "cloudwatch/deeplink.js?region={region}#alarmsV2:alarm/{}",
            quote_plus(alarm_name)
        ),
    )
}

/// Logs Insights deep link with the query pre-filled.
///
/// The console expects the query form-encoded with `%` rewritten as `*`.
pub fn logs_insights(
    region: &str,
    log_groups: &[String],
    query: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let editor = quote_plus(&query.replace("  ", "")).replace('%', "*");
    let sources: String = log_groups
        .iter()
        .map(|group| format!("~'{}", quote_plus(group)))
        .collect();
    cloudwatch(
        region,
        &format!(
            "logsV2:logs-insights$3FqueryDetail$3D~(end~'{}~start~'{}~timeType~'ABSOLUTE~tz~'Local~editorString~'{}~source~({}))",
            format_console_time(end),
            format_console_time(start),
            editor,
            sources
        ),
    )
}

/// A single X-Ray trace in the CloudWatch console.
pub fn xray_trace(
    region: &str,
    trace_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    cloudwatch(
        region,
        &format!(
            "xray:traces/{trace_id}?~(query~()~context~(timeRange~(end~'{}~start~'{})))",
            format_console_time(end),
            format_console_time(start)
        ),
    )
}

/// X-Ray trace search in the CloudWatch console, pre-filled with a filter
/// expression.
///
/// The expression is percent-encoded with lower-case hex and `%` rewritten
/// as `*`.
pub fn xray_traces_query(
    region: &str,
    expression: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let encoded: String = utf8_percent_encode(expression, XRAY_EXPRESSION)
        .map(|chunk| match chunk.strip_prefix('%') {
            Some(hex) => format!("*{}", hex.to_ascii_lowercase()),
            None => chunk.to_string(),
        })
        .collect();
    cloudwatch(
        region,
        &format!(
            "xray:traces/query?~(query~(filter~()~expression~'{encoded})~context~(timeRange~(end~'{}~start~'{})))",
            format_console_time(end),
            format_console_time(start)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmWindow;

    #[test]
    fn quote_plus_matches_form_encoding() {
        assert_eq!(quote_plus("a b/c"), "a+b%2Fc");
        assert_eq!(quote_plus("my_alarm-1.x~"), "my_alarm-1.x~");
        assert_eq!(quote_plus("@timestamp,"), "%40timestamp%2C");
    }

    #[test]
    fn alarm_link_encodes_name() {
        assert_eq!(
            alarm("us-east-1", "CPU high"),
            "https://us-east-1.console.aws.amazon.com/cloudwatch/deeplink.js?region=us-east-1#alarmsV2:alarm/CPU+high"
        );
    }

    #[test]
    fn logs_insights_link_uses_asterisk_encoding() {
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let link = logs_insights(
            "eu-west-1",
            &["/aws/lambda/checkout".to_string()],
            "fields @timestamp, @message\n  | limit 10",
            window.start,
            window.end,
        );
        assert!(link.starts_with(
            "https://eu-west-1.console.aws.amazon.com/cloudwatch/home?region=eu-west-1#logsV2:logs-insights$3FqueryDetail$3D~(end~'2024-03-14T12*3a58*3a20.538Z~start~'2024-03-14T10*3a58*3a20.538Z"
        ));
        assert!(link.contains("editorString~'fields+*40timestamp*2C+*40message*0A*7C+limit+10~"));
        assert!(link.ends_with("~source~(~'%2Faws%2Flambda%2Fcheckout))"));
    }

    #[test]
    fn xray_query_link_star_encodes_expression() {
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let expression = r#"service(id(name: "f", type: "AWS::Lambda::Function"))"#;
        let link = xray_traces_query("us-east-1", expression, window.start, window.end);
        assert!(link.contains(
            "expression~'service*28id*28name*3a*20*22f*22*2c*20type*3a*20*22AWS*3a*3aLambda*3a*3aFunction*22*29*29)~context~"
        ));
        assert!(link.ends_with("start~'2024-03-14T10*3a58*3a20.538Z)))"));
    }

    #[test]
    fn xray_query_link_keeps_unreserved_characters() {
        let window = AlarmWindow::parse("2024-03-14T12:53:20.538+0000").unwrap();
        let link = xray_traces_query("us-east-1", "fault = true AND service(\"my_api-v1.0\")", window.start, window.end);
        assert!(link.contains("expression~'fault*20*3d*20true*20AND*20service*28*22my_api-v1.0*22*29)~"));
    }

    #[test]
    fn generic_links_cover_dashboard_and_health() {
        let links = generic_links("ap-southeast-2");
        assert_eq!(links.len(), 2);
        assert!(links[0].url.ends_with("#home:cross_service"));
        assert_eq!(links[1].url, "https://health.aws.amazon.com/health/home");
    }
}

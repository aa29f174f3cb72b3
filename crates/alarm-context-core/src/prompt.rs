use serde_json::{Value, json};

use crate::error::CoreError;
use crate::html::information_panel;

pub const SYSTEM_PROMPT: &str = "You are a devops engineer providing guidance about how to do root cause analysis. Your response will be displayed in an email to a user where a CloudWatch alarm has been triggered.";

const PREAMBLE: &str = "
The alarm message is contained in the <message> tag.

Summarize the trigger for the alarm based on the metric and provide possible root causes and links to aws documentation that might help fix it.
Use the alarm history in the <alarm_history> tags to understand the frequency of the alarm and describe this to the reader.
Using all of the available data, describe to the reader your interpretation of the immediacy that action is required to address the root cause.
The response needs to be in HTML format, maximum header size should be h3.
Add headers to make the response more readable.
";

const CLOSING: &str = "
The most important thing is to try to identify the root cause of potential issues with the information that you have.
The actual values of the metrics in the <metric_data> tag should override the AlarmDescription in the <message> tag if there is a discrepancy.
The response must be in HTML, be structured with headers so it is easy to read and include at least 3 links to relevant AWS documentation.
Do not include an introductory line or prompt for a follow up.
If <cloudformation_template> exists, attempt to highlight a fix via changing the template in JSON format, presented in HTML, make the code change stand out.
";

struct Section {
    tag: &'static str,
    instructions: &'static str,
}

/// Prompt sections in the order they are emitted.
const SECTIONS: [Section; 10] = [
    Section {
        tag: "alarm_history",
        instructions: "Alarm history is contained in the <alarm_history> tag.\nUse this information to understand the frequency of the alarm and describe this to the reader.",
    },
    Section {
        tag: "message",
        instructions: "The CloudWatch alarm message is contained in the <message> tag.",
    },
    Section {
        tag: "metric_data",
        instructions: "Metric data for the metric that triggered the alarm is contained in the <metric_data> tag. The metric will be graphed below your response.\nThe metric data contains 25 hours of data, comment on the last 24 hours of data and do a comparison with the last hour with the day before at the same time.",
    },
    Section {
        tag: "text_summary",
        instructions: "A human readable message for the alarm is contained in the <text_summary> tag.\nThe email to the end user will already contain this summary above your response.",
    },
    Section {
        tag: "health_events",
        instructions: "AWS Health events are contained in the <health_events> tag.\nSee if there are events in <health_events> that may be impacting the resources.\nWarn the reader if there are upcoming events for related resources.",
    },
    Section {
        tag: "truncated_cloudformation_template",
        instructions: "The CloudFormation template used to create this resource is in the <truncated_cloudformation_template> tag.\nValues have been truncated to minimize token usage.\nUse the cloudformation_template and if there is a fix that can be made, call it out and tell the reader which code they need to change to resolve the issue.\nIf this is identifiable, it will be the most important information that the reader will want to see.",
    },
    Section {
        tag: "resource_information_object",
        instructions: "Information about the resource related to the metric is contained in the <resource_information_object> tag.\nUse the resource_information_object as additional context, but also summarize or highlight any relevant data as well.",
    },
    Section {
        tag: "log_events",
        instructions: "If there are any relevant logs, the last 10 log events will be contained within the <log_events> tag.",
    },
    Section {
        tag: "additional_metrics_with_timestamps_removed",
        instructions: "Also use related metrics contained in the <additional_metrics_with_timestamps_removed> tag, they are from 60 minutes before the time of the alarm. They have had the timestamps removed.\nComment on each of the additional metrics and its relevance to the root cause.",
    },
    Section {
        tag: "trace_summary",
        instructions: "Also use the following trace summary contained in the <trace_summary> tag, it's likely to be the best source of information.\nComment on how the trace_summary shows the potential root cause.\nDo not output the trace to the reader in JSON format, if you quote it, it must be in human readable format.\nWhen correlating the trace data with the alarm and metrics, be mindful that the trace may not have occurred at the same time as the alarm.\nIf necessary, explain that the trace may not have occurred at the same time as the alarm and any root cause may be correlated.",
    },
];

/// Everything the model is shown. Empty values drop their section.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub alarm_history: Value,
    pub message: Value,
    pub metric_data: Value,
    pub text_summary: String,
    pub health_events: Value,
    pub truncated_cloudformation_template: Option<String>,
    pub resource_information_object: Value,
    pub log_events: Value,
    pub additional_metrics_with_timestamps_removed: Value,
    pub trace_summary: Value,
}

impl PromptInputs {
    fn values(&self) -> [Option<String>; 10] {
        [
            render(&self.alarm_history),
            render(&self.message),
            render(&self.metric_data),
            non_empty(&self.text_summary),
            render(&self.health_events),
            self.truncated_cloudformation_template.as_deref().and_then(non_empty),
            render(&self.resource_information_object),
            render(&self.log_events),
            render(&self.additional_metrics_with_timestamps_removed),
            render(&self.trace_summary),
        ]
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_empty(s),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// The prompt: preamble, one tagged section per non-empty input, closing block.
pub fn build_prompt(inputs: &PromptInputs) -> String {
    let mut prompt = String::from(PREAMBLE);
    for (section, value) in SECTIONS.iter().zip(inputs.values()) {
        if let Some(information) = value {
            prompt.push_str(&format!(
                "\n{}\n<{tag}>\n{information}\n</{tag}>\n",
                section.instructions,
                tag = section.tag
            ));
        }
    }
    prompt.push_str(CLOSING);
    prompt
}

/// Friendly model name for the panel title.
///
/// Example: `anthropic.claude-3-sonnet-20240229-v1:0` gives `Claude-3-sonnet-20240229`.
pub fn model_display_name(model_id: &str) -> String {
    let name = model_id.split('.').nth(1).unwrap_or(model_id);
    let name = name.split("-v").next().unwrap_or(name);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Anthropic messages request body for `InvokeModel`.
pub fn request_body(anthropic_version: &str, max_tokens: u32, prompt: &str) -> Value {
    json!({
        "anthropic_version": anthropic_version,
        "max_tokens": max_tokens,
        "system": SYSTEM_PROMPT,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": 0.5,
        "top_k": 250,
        "top_p": 0.999,
    })
}

/// Text of the first content block of a model response.
pub fn response_text(body: &[u8]) -> Result<String, CoreError> {
    let value: Value = serde_json::from_slice(body)?;
    value
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CoreError::ModelResponse("content[0].text missing".to_string()))
}

/// Panel holding the model's analysis.
pub fn analysis_panel(model_id: &str, text: &str) -> String {
    information_panel(&format!("{} says:", model_display_name(model_id)), text)
}

pub fn disabled_panel() -> String {
    information_panel("Bedrock says:", "Bedrock analysis is disabled.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_emitted_in_order_and_only_when_present() {
        let inputs = PromptInputs {
            alarm_history: json!([{"Summary": "Alarm updated from OK to ALARM"}]),
            message: json!({"AlarmName": "cpu-high"}),
            text_summary: "Your alarm fired".to_string(),
            trace_summary: json!({"TraceSummaries": [{"Id": "1-a"}]}),
            health_events: json!({}),
            log_events: json!([]),
            truncated_cloudformation_template: Some(String::new()),
            ..Default::default()
        };
        let prompt = build_prompt(&inputs);

        let history = prompt.find("<alarm_history>").unwrap();
        let message = prompt.find("<message>\n").unwrap();
        let summary = prompt.find("<text_summary>").unwrap();
        let trace = prompt.find("<trace_summary>").unwrap();
        assert!(history < message && message < summary && summary < trace);
        assert!(prompt.contains("<message>\n{\"AlarmName\":\"cpu-high\"}\n</message>"));
        for absent in ["<health_events>", "<log_events>", "<metric_data>", "<truncated_cloudformation_template>"] {
            assert!(!prompt.contains(absent), "{absent} should be omitted");
        }
        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.ends_with(CLOSING));
    }

    #[test]
    fn unmatched_namespace_prompt_has_no_resource_sections() {
        let inputs = PromptInputs {
            message: json!({"AlarmName": "custom", "Trigger": {"Namespace": "Custom/Foo"}}),
            text_summary: "summary".to_string(),
            ..Default::default()
        };
        let prompt = build_prompt(&inputs);
        for absent in ["<resource_information_object>", "<log_events>", "<additional_metrics_with_timestamps_removed>", "<trace_summary>"] {
            assert!(!prompt.contains(absent));
        }
    }

    #[test]
    fn model_names_are_shortened() {
        assert_eq!(model_display_name("anthropic.claude-3-sonnet-20240229-v1:0"), "Claude-3-sonnet-20240229");
        assert_eq!(model_display_name("anthropic.claude-v2"), "Claude");
    }

    #[test]
    fn request_body_follows_messages_contract() {
        let body = request_body("bedrock-2023-05-31", 2048, "hello");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "hello"}));
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["top_k"], 250);
        assert_eq!(body["system"], SYSTEM_PROMPT);
    }

    #[test]
    fn response_text_reads_first_content_block() {
        let body = br#"{"content":[{"type":"text","text":"<h3>Cause</h3>"}]}"#;
        assert_eq!(response_text(body).unwrap(), "<h3>Cause</h3>");
        assert!(matches!(response_text(b"{\"content\":[]}"), Err(CoreError::ModelResponse(_))));
    }

    #[test]
    fn panels_are_titled() {
        assert!(analysis_panel("anthropic.claude-v2", "x").contains("Claude says:"));
        assert!(disabled_panel().contains("Bedrock analysis is disabled."));
    }
}

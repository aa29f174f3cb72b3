use serde_json::Value;

use crate::model::{Link, Notification};

/// Zebra striping shared by every `table#info` in the email.
pub const TABLE_STYLE: &str = "<style>table#info tr{border:1px solid #232F3E;}  table#info tr:nth-child(even) { background-color:#D4DADA; } table#info tr:nth-child(odd) { background-color:#F1F3F3; }</style>";

const INFO_TABLE_OPEN: &str = r#"<table id="info" width="640" style="word-wrap: anywhere; max-width:640px !important; border-collapse: collapse; margin-bottom:10px;" cellpadding="2" cellspacing="0" align="center" border="0">"#;

const PRE_STYLE: &str = "overflow-x: auto; white-space: pre-wrap; word-wrap: break-word;";

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Collapse every run of whitespace to a single space.
pub fn collapse_whitespace(html: &str) -> String {
    html.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Orange console button with the link icon (`cid:imageId2`).
pub fn button(title: &str, url: &str) -> String {
    format!(
        concat!(
            r#"<a rel="noopener" target="_blank" href="{url}" style="margin-right: 10px; margin-bottom:10px; background-color: #ff9900; background-image: linear-gradient(#ff9900,#ff9900); font-size: 13px; font-family: Helvetica, Arial, sans-serif; font-weight: 700; text-decoration: none; padding: 9px 9px; color: rgb(255, 255, 255) !important; -webkit-text-fill-color: rgb(255, 255, 255) !important; border-radius: 2px; display: inline-block; mso-padding-alt: 0;">"#,
            r#"<!--[if mso]><i style="letter-spacing: 25px; mso-font-width: -100%; mso-text-raise: 30pt;">&nbsp;</i><![endif]-->"#,
            r#"<span style="mso-text-raise: 15pt;">{title} <img style="margin-bottom: -4px;" src="cid:imageId2"></span>"#,
            r#"<!--[if mso]><i style="letter-spacing: 25px; mso-font-width: -100%;">&nbsp;</i><![endif]-->"#,
            "</a>"
        ),
        url = url,
        title = title,
    )
}

pub fn link_buttons(links: &[Link]) -> String {
    links.iter().map(|link| button(&link.title, &link.url)).collect()
}

/// Blue two-row panel with an info glyph.
pub fn information_panel(title: &str, content: &str) -> String {
    const CELL: &str = "color: rgb(255, 255, 255) !important; -webkit-text-fill-color: rgb(255, 255, 255) !important";
    format!(
        concat!(
            r#"<table style="border-radius: 2px; margin-bottom:10px;" cellpadding="9" cellspacing="0" width="100%" align="center" border="0">"#,
            r#"<tr><td style="background-color: #003181; background-image: linear-gradient(#003181,#003181); {cell}" rowspan="2">&#8505;</td>"#,
            r#"<td style="background-color: #2074d5; background-image: linear-gradient(#2074d5,#2074d5); {cell}"><b>{title}</b></td></tr>"#,
            r#"<tr><td style="background-color: #2074d5; background-image: linear-gradient(#2074d5,#2074d5); {cell}">{content}</td></tr>"#,
            "</table>"
        ),
        cell = CELL,
        title = title,
        content = content,
    )
}

pub fn notification_panels(notifications: &[Notification]) -> String {
    notifications
        .iter()
        .map(|n| information_panel(&n.title, &n.body))
        .collect()
}

/// A titled table with one column per field.
///
/// A cell given as `{"value": .., "link": ..}` renders as an anchor.
pub fn table_with_fields(title: &str, rows: &[Value], fields: &[&str]) -> String {
    let mut html = String::from(INFO_TABLE_OPEN);
    html.push_str(&format!(
        r#"<tr><td colspan="{}"><center><b>{}</b></center></td></tr>"#,
        fields.len().max(1),
        escape(title)
    ));
    html.push_str(TABLE_STYLE);

    if !fields.is_empty() {
        html.push_str("<tr>");
        for field in fields {
            html.push_str(&format!("<th>{}</th>", escape(field)));
        }
        html.push_str("</tr>");
    }

    for row in rows {
        html.push_str("<tr>");
        for field in fields {
            let cell = row.get(*field).unwrap_or(&Value::Null);
            match (cell.get("value"), cell.get("link").and_then(Value::as_str)) {
                (Some(value), Some(link)) => {
                    html.push_str(&format!(
                        r#"<td><a href="{}">{}</a></td>"#,
                        escape(link),
                        scalar_text(value)
                    ));
                }
                _ => html.push_str(&format!("<td>{}</td>", scalar_text(cell))),
            }
        }
        html.push_str("</tr>");
    }

    html.push_str("</table>");
    html
}

/// Recursive key/value table used for alarm details and resource descriptions.
pub fn key_value_table(title: &str, items: &Value) -> String {
    let mut html = String::from(INFO_TABLE_OPEN);
    html.push_str(&format!(
        r#"<tr><td colspan="3"><center><b>{}</b></center></td></tr>"#,
        escape(title)
    ));

    if let Value::Object(map) = items {
        for (key, value) in map {
            match value {
                Value::Array(list) if !list.is_empty() => {
                    let cells: Vec<String> =
                        list.iter().filter(|v| !is_blank(v)).map(cell_html).collect();
                    if cells.is_empty() {
                        continue;
                    }
                    html.push_str(&format!(r#"<tr><td rowspan="{}"><b>{}</b></td>"#, cells.len(), escape(key)));
                    for (index, cell) in cells.iter().enumerate() {
                        if index > 0 {
                            html.push_str("<tr>");
                        }
                        html.push_str(&format!(
                            r#"<td colspan="2" style="word-wrap: break-all;">{cell}</td></tr>"#
                        ));
                    }
                }
                Value::Object(sub) => {
                    let rows: Vec<(&String, &Value)> =
                        sub.iter().filter(|(_, v)| !is_blank(v)).collect();
                    if rows.is_empty() {
                        continue;
                    }
                    html.push_str(&format!(r#"<tr><td rowspan="{}"><b>{}</b></td>"#, rows.len(), escape(key)));
                    for (index, (sub_key, sub_value)) in rows.iter().enumerate() {
                        if index > 0 {
                            html.push_str("<tr>");
                        }
                        html.push_str(&format!(
                            r#"<td style="word-wrap: break-all;"><b>{}</b></td><td style="word-wrap: break-all;">{}</td></tr>"#,
                            escape(sub_key),
                            cell_html(sub_value)
                        ));
                    }
                }
                other if !is_blank(other) => {
                    html.push_str(&format!(
                        r#"<tr><td><b>{}</b></td><td colspan="2" style="word-wrap: break-all;">{}</td></tr>"#,
                        escape(key),
                        cell_html(other)
                    ));
                }
                _ => {}
            }
        }
    }

    html.push_str("</table>");
    html
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape(s),
        other => escape(&other.to_string()),
    }
}

/// Strings holding JSON documents are pretty-printed; nested objects render
/// as `key: value` lines.
fn cell_html(value: &Value) -> String {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => pretty_block(&parsed),
            _ => escape(s),
        },
        Value::Object(map) if is_tag(map) => inline_text(value),
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !is_blank(v))
            .map(|(k, v)| format!("<b>{}</b>: {}<br>", escape(k), inline_text(v)))
            .collect(),
        Value::Array(list) => list.iter().map(inline_text).collect::<Vec<_>>().join("<br>"),
        other => scalar_text(other),
    }
}

fn inline_text(value: &Value) -> String {
    match value {
        Value::String(s) => escape(s),
        Value::Object(map) if is_tag(map) => {
            format!("{}: {}", scalar_text(&map["Key"]), scalar_text(&map["Value"]))
        }
        other => escape(&other.to_string()),
    }
}

fn is_tag(map: &serde_json::Map<String, Value>) -> bool {
    map.len() == 2 && map.contains_key("Key") && map.contains_key("Value")
}

fn pretty_block(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!(
        r#"<pre style="{PRE_STYLE}">{}</pre>"#,
        escape(&pretty).replace('\n', "<br>").replace(' ', "&nbsp;")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn button_embeds_link_and_icon() {
        let html = button("EC2 automatic dashboard", "https://example.com/x");
        assert!(html.contains(r#"href="https://example.com/x""#));
        assert!(html.contains("EC2 automatic dashboard <img"));
        assert!(html.contains("cid:imageId2"));
    }

    #[test]
    fn information_panel_has_title_and_body() {
        let html = information_panel("Bedrock says:", "Bedrock analysis is disabled.");
        assert!(html.contains("<b>Bedrock says:</b>"));
        assert!(html.contains("Bedrock analysis is disabled."));
        assert!(html.contains("&#8505;"));
    }

    #[test]
    fn table_with_fields_renders_links() {
        let rows = vec![json!({
            "Command ID": {"value": "abc", "link": "https://console/abc"},
            "Status": "Failed"
        })];
        let html = table_with_fields("Commands", &rows, &["Command ID", "Status", "Missing"]);
        assert!(html.contains(r#"<td><a href="https://console/abc">abc</a></td>"#));
        assert!(html.contains("<td>Failed</td>"));
        assert!(html.contains("<td></td>"));
        assert!(html.contains("<th>Command ID</th>"));
    }

    #[test]
    fn key_value_table_skips_blank_and_expands_json() {
        let html = key_value_table(
            "Alarm",
            &json!({
                "AlarmName": "cpu-high",
                "AlarmDescription": null,
                "Policy": "{\"a\": 1}",
                "Tags": [{"Key": "team", "Value": "core"}],
                "Empty": []
            }),
        );
        assert!(html.contains("<b>AlarmName</b>"));
        assert!(!html.contains("AlarmDescription"));
        assert!(!html.contains("Empty"));
        assert!(html.contains("<pre"));
        assert!(html.contains("team: core"));
    }

    #[test]
    fn escape_and_collapse() {
        assert_eq!(escape("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
        assert_eq!(collapse_whitespace("  <tr>\n   <td>x</td>\n"), "<tr> <td>x</td>");
    }
}

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pulldown_cmark::{Parser, html as markdown};

use crate::html::{TABLE_STYLE, button, escape, information_panel};
use crate::links;
use crate::model::{AlarmEvent, WidgetData, WidgetImage};

/// 16×16 PNG shown after every console button (`cid:imageId2`).
pub const LINK_ICON_PNG: &str = "iVBORw0KGgoAAAANSUhEUgAAABAAAAAQCAYAAAAf8/9hAAAACXBIWXMAAAsTAAALEwEAmpwYAAAAj0lEQVQ4ja2SwQ3CMBAEx6kgedIFbVAHaZIeQhmEdLF8LshEd9YZWGllS/aMbclIukha5QdrmCJpBU74KTYqWGeo4OKUw9oE3D8MznWjjpIW27vUUEZwhKcegQeTFURwStCC340EKbgluCXg5hPOJglP3qEiSdVn6Yn2n/hT/iJ42lydBdgGYAa2Lw5/ANcX9a8GnTGB0iAAAAAASUVORK5CYII=";

pub fn subject(alarm_name: &str) -> String {
    format!("ALARM: {alarm_name}")
}

/// Plain-text summary used as the text part and as prompt context.
pub fn text_summary(event: &AlarmEvent, display_change_time: &str) -> String {
    format!(
        r#"Your Amazon CloudWatch Alarm "{}" in the {} region has entered the {} state, because "{}" at "{}"."#,
        event.alarm_name,
        event.region,
        event.new_state_value,
        event.new_state_reason,
        display_change_time
    )
}

/// Render an alarm description written in Markdown.
pub fn markdown_to_html(text: &str) -> String {
    let mut out = String::new();
    markdown::push_html(&mut out, Parser::new(text));
    out
}

/// State sentence, description and the alarm console button.
pub fn summary_html(event: &AlarmEvent, display_change_time: &str, region: &str) -> String {
    let mut summary = format!(
        r#"<p>Your Amazon CloudWatch Alarm <b>"{}"</b> in the <b>{}</b> region has entered the <b>{}</b> state, because <b>"{}"</b> at <b>"{}"</b>.<p>"#,
        escape(&event.alarm_name),
        escape(&event.region),
        escape(&event.new_state_value),
        escape(&event.new_state_reason),
        display_change_time
    );
    summary.push_str(TABLE_STYLE);

    match event.alarm_description.as_deref().filter(|d| !d.trim().is_empty()) {
        None => summary.push_str(&information_panel(
            "Your alarm has no description.",
            "Use alarm descriptions to add context and links to your alarms using markdown.",
        )),
        Some(description) => {
            summary.push_str(r#"<table id="info" style="max-width:640px; border-collapse: collapse; margin-bottom:10px;" cellpadding="2" cellspacing="0" width="640" align="center" border="0">"#);
            summary.push_str("<tr><td><center><b>Alarm Description</b></center></td></tr><tr><td>");
            summary.push_str(&markdown_to_html(description));
            summary.push_str("</td></tr></table>");
        }
    }

    summary.push_str(&button(
        "View this alarm in the AWS Management Console",
        &links::alarm(region, &event.alarm_name),
    ));
    summary
}

// ---------------------------------------------------------------------------
// HTML body
// ---------------------------------------------------------------------------

/// The already-rendered fragments that make up the email body.
#[derive(Debug, Clone, Default)]
pub struct BodyParts<'a> {
    pub subject: &'a str,
    pub summary: &'a str,
    pub ai_response: &'a str,
    pub widgets: &'a [WidgetImage],
    pub trace: Option<&'a str>,
    pub additional_information: &'a str,
    pub alarm_details: &'a str,
    pub metric_details: &'a str,
}

const SPACER_ROW: &str = r#"<tr><td></td><td width="100%" style="text-align:left; line-height: 10px;">&nbsp;</td><td></td></tr>"#;

fn content_row(content: &str) -> String {
    format!(r#"<tr><td></td><td width="640" style="max-width:640px; text-align:left;">{content}</td><td></td></tr>"#)
}

fn widget_grid(widgets: &[WidgetImage]) -> String {
    let mut html = String::from(
        r#"<tr><td></td><td width="100%" style="max-width: 640px !important; text-align:left; background-color: #ffffff; background-image: linear-gradient(#ffffff,#ffffff);">"#,
    );
    html.push_str(r#"<center><table style="max-width: 640px !important;" width="640"><tr>"#);
    for (i, widget) in widgets.iter().enumerate() {
        if i > 0 && i % 2 == 0 {
            html.push_str("</tr><tr>");
        }
        match &widget.data {
            WidgetData::Png(_) => html.push_str(&format!(
                r#"<td style="max-width: 320px !important;" width="320"><img style="margin-bottom:10px;" src="cid:{}"></td>"#,
                widget.content_id()
            )),
            WidgetData::Html(card) => html.push_str(&format!(
                r#"<td valign="top" style="vertical-align: top; max-width: 320px !important;" width="320">{card}</td>"#
            )),
        }
    }
    html.push_str("</tr></table></center></td><td></td></tr>");
    html
}

/// Full HTML document, top to bottom: title bar, summary, model analysis,
/// main graph, widget grid, trace, links and details tables.
pub fn html_body(parts: &BodyParts<'_>) -> String {
    let title = escape(parts.subject);
    let mut html = format!(
        concat!(
            r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#,
            r#"<html xmlns="http://www.w3.org/1999/xhtml" lang="en"><head>"#,
            r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8">"#,
            r#"<meta http-equiv="X-UA-Compatible" content="IE=edge">"#,
            r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#,
            "<title>{title}</title></head><body><center>",
            r#"<table style="word-wrap: break-all; width:100%;max-width:640px;margin: 0 auto;" width="100%" cellpadding="0" cellspacing="0" border="0">"#,
            r#"<tr><td></td><td width="640" style="max-width:640px; padding:9px; color: rgb(255, 255, 255) !important; -webkit-text-fill-color: rgb(255, 255, 255) !important; margin-bottom:10px; text-align:left; background: rgb(35,47,62); background: linear-gradient(135deg, rgba(35,47,62,1) 0%, rgba(0,49,129,1) 25%, rgba(0,49,129,1) 50%, rgba(32,116,213,1) 90%, rgba(255,153,0,1) 100%);">{title}</td><td></td></tr>"#
        ),
        title = title
    );
    html.push_str(SPACER_ROW);
    html.push_str(&content_row(parts.summary));
    html.push_str(&content_row(parts.ai_response));
    html.push_str(r#"<tr><td></td><td width="640" style="max-width:640px; text-align:left; background-color: #ffffff; background-image: linear-gradient(#ffffff,#ffffff);"><center><img style="margin-bottom:10px;" src="cid:imageId"></center></td><td></td></tr>"#);

    if !parts.widgets.is_empty() {
        html.push_str(&widget_grid(parts.widgets));
    }

    if let Some(trace) = parts.trace.filter(|t| !t.is_empty()) {
        html.push_str(SPACER_ROW);
        html.push_str(&content_row(trace));
        html.push_str(SPACER_ROW);
    }

    html.push_str(SPACER_ROW);
    html.push_str(&content_row(&format!(
        concat!(
            r#"<table cellpadding="0" cellspacing="0" border="0" style="padding:0px;margin:0px;width:100%;">"#,
            r#"<tr><td colspan="3" style="padding:0px;margin:0px;font-size:20px;height:20px;" height="20">&nbsp;</td></tr>"#,
            r#"<tr><td style="padding:0px;margin:0px;">&nbsp;</td><td style="padding:0px;margin:0px;" width="640">{}</td><td style="padding:0px;margin:0px;">&nbsp;</td></tr>"#,
            r#"<tr><td colspan="3" style="padding:0px;margin:0px;max-width: 640px !important;" height="20">&nbsp;</td></tr>"#,
            "</table>"
        ),
        parts.additional_information
    )));
    html.push_str(SPACER_ROW);
    html.push_str(&content_row(parts.alarm_details));
    html.push_str(SPACER_ROW);
    html.push_str(&content_row(parts.metric_details));
    html.push_str("</table></center></body></html>");
    html
}

// ---------------------------------------------------------------------------
// Raw MIME
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_id: String,
    pub data: Vec<u8>,
}

/// Link icon, main graph and every PNG widget. Single-value cards are inline.
pub fn attachments(main_graph: Vec<u8>, widgets: &[WidgetImage]) -> Vec<Attachment> {
    let mut out = vec![
        Attachment {
            filename: "link_icon.png".to_string(),
            content_id: "imageId2".to_string(),
            data: STANDARD.decode(LINK_ICON_PNG).unwrap_or_default(),
        },
        Attachment {
            filename: "image.png".to_string(),
            content_id: "imageId".to_string(),
            data: main_graph,
        },
    ];
    for widget in widgets {
        if let WidgetData::Png(bytes) = &widget.data {
            let id = widget.content_id();
            out.push(Attachment {
                filename: format!("{id}.png"),
                content_id: id,
                data: bytes.clone(),
            });
        }
    }
    out
}

/// A complete message ready for `SendRawEmail`.
#[derive(Debug, Clone)]
pub struct RawEmail<'a> {
    pub sender: &'a str,
    pub recipient: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
    pub html: &'a str,
    pub attachments: &'a [Attachment],
}

impl RawEmail<'_> {
    /// Serialize as `multipart/mixed` holding a `multipart/alternative` body
    /// followed by base64 attachments. `boundary` must not occur in the content.
    pub fn to_mime(&self, boundary: &str) -> String {
        let outer = format!("mixed-{boundary}");
        let inner = format!("alt-{boundary}");
        let mut mime = String::new();

        push_line(&mut mime, &format!("From: {}", self.sender));
        push_line(&mut mime, &format!("To: {}", self.recipient));
        push_line(&mut mime, &format!("Subject: {}", encode_header(self.subject)));
        push_line(&mut mime, "MIME-Version: 1.0");
        push_line(&mut mime, &format!("Content-Type: multipart/mixed; boundary=\"{outer}\""));
        push_line(&mut mime, "");

        push_line(&mut mime, &format!("--{outer}"));
        push_line(&mut mime, &format!("Content-Type: multipart/alternative; boundary=\"{inner}\""));
        push_line(&mut mime, "");
        for (subtype, content) in [("plain", self.text), ("html", self.html)] {
            push_line(&mut mime, &format!("--{inner}"));
            push_line(&mut mime, &format!("Content-Type: text/{subtype}; charset=\"utf-8\""));
            push_line(&mut mime, "Content-Transfer-Encoding: base64");
            push_line(&mut mime, "");
            push_base64(&mut mime, content.as_bytes());
        }
        push_line(&mut mime, &format!("--{inner}--"));
        push_line(&mut mime, "");

        for attachment in self.attachments {
            push_line(&mut mime, &format!("--{outer}"));
            push_line(&mut mime, "Content-Type: application/octet-stream");
            push_line(&mut mime, "Content-Transfer-Encoding: base64");
            push_line(&mut mime, &format!("Content-Disposition: attachment; filename=\"{}\"", attachment.filename));
            push_line(&mut mime, &format!("Content-ID: <{}>", attachment.content_id));
            push_line(&mut mime, "");
            push_base64(&mut mime, &attachment.data);
        }
        push_line(&mut mime, &format!("--{outer}--"));
        mime
    }
}

fn push_line(mime: &mut String, line: &str) {
    mime.push_str(line);
    mime.push_str("\r\n");
}

/// Base64 wrapped at 76 characters per line.
fn push_base64(mime: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    for chunk in encoded.as_bytes().chunks(76) {
        mime.push_str(&String::from_utf8_lossy(chunk));
        mime.push_str("\r\n");
    }
}

/// RFC 2047 encoded-word for non-ASCII header values.
fn encode_header(value: &str) -> String {
    if value.is_ascii() && !value.contains(['\r', '\n']) {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

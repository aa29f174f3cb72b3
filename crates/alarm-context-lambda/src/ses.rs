use alarm_context_core::AwsApiError;
use alarm_context_core::email::RawEmail;
use aws_sdk_sesv2::Client;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Destination, EmailContent, RawMessage};
use tracing::info;

use crate::errors::AwsResultExt;

const SERVICE: &str = "ses";

/// Send the message as raw MIME. Returns the SES message id.
pub async fn send(client: &Client, email: &RawEmail<'_>) -> Result<String, AwsApiError> {
    let boundary = uuid::Uuid::new_v4().simple().to_string();
    let mime = email.to_mime(&boundary);

    let raw = RawMessage::builder()
        .data(Blob::new(mime))
        .build()
        .map_err(|err| AwsApiError::validation(SERVICE, "SendEmail", err.to_string()))?;
    let output = client
        .send_email()
        .from_email_address(email.sender)
        .destination(Destination::builder().to_addresses(email.recipient).build())
        .content(EmailContent::builder().raw(raw).build())
        .send()
        .await
        .aws(SERVICE, "SendEmail")?;

    let message_id = output.message_id().unwrap_or_default().to_string();
    info!(message_id = %message_id, recipient = email.recipient, "email sent");
    Ok(message_id)
}

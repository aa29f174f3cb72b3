//! Conversions between chrono and the SDK's smithy types.

use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use chrono::{DateTime, Utc};

pub fn to_aws(time: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_millis(time.timestamp_millis())
}

pub fn from_aws(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// RFC 3339 text for JSON projections of SDK outputs.
pub fn aws_time_text(time: Option<&AwsDateTime>) -> Option<String> {
    time.and_then(from_aws).map(|t| t.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_smithy_time() {
        let time = DateTime::parse_from_rfc3339("2024-03-14T12:53:20.538Z").unwrap().to_utc();
        let aws = to_aws(time);
        assert_eq!(aws.secs(), time.timestamp());
        assert_eq!(from_aws(&aws), Some(time));
        assert_eq!(aws_time_text(Some(&aws)).as_deref(), Some("2024-03-14T12:53:20.538+00:00"));
        assert_eq!(aws_time_text(None), None);
    }
}

use thiserror::Error;

/// Core errors for alarm parsing, widget derivation and rendering.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid alarm message: {0}")]
    Message(#[from] serde_json::Error),

    #[error("Invalid statistic value: {0}")]
    InvalidStatistic(String),

    #[error("Required metric details not found in Alarm message")]
    MissingMetricDetails,

    #[error("invalid alarm ARN: {0}")]
    InvalidArn(String),

    #[error("invalid state change time {value}: {source}")]
    InvalidTime {
        value: String,
        source: chrono::ParseError,
    },

    #[error("invalid widget spec: {0}")]
    WidgetSpec(String),

    #[error("unsafe query value for {context}: {value:?}")]
    UnsafeQueryValue { context: &'static str, value: String },

    #[error("unexpected model response: {0}")]
    ModelResponse(String),
}

/// A failed AWS API call, kept structured so callers can decide on retries
/// without parsing error strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{service} {operation} failed ({}): {message}",
    .code.as_deref().unwrap_or("no error code")
)]
pub struct AwsApiError {
    pub service: &'static str,
    pub operation: &'static str,
    pub code: Option<String>,
    pub message: String,
    pub retryable: bool,
}

/// Error codes AWS documents as transient across services.
const RETRYABLE_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
    "ServiceUnavailable",
    "ServiceUnavailableException",
    "InternalFailure",
    "InternalServerError",
    "InternalServiceError",
    "InternalError",
    "RequestTimeout",
    "RequestTimeoutException",
];

impl AwsApiError {
    /// Value of the `source` field in the serialized error shape.
    pub const SOURCE: &'static str = "aws-api";

    pub fn new(
        service: &'static str,
        operation: &'static str,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        let retryable = code.as_deref().is_some_and(is_retryable_code);
        Self {
            service,
            operation,
            code,
            message: message.into(),
            retryable,
        }
    }

    /// A transport-level failure (timeout, dispatch, unparseable response).
    pub fn transport(
        service: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation,
            code: None,
            message: message.into(),
            retryable: true,
        }
    }

    /// The request could not be built from the supplied parameters.
    pub fn validation(
        service: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            operation,
            code: Some("ValidationError".to_string()),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    /// AWS Health rejects accounts without a Business or Enterprise support plan.
    pub fn is_subscription_required(&self) -> bool {
        self.has_code("SubscriptionRequiredException")
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": Self::SOURCE,
            "service": self.service,
            "operation": self.operation,
            "code": self.code,
            "message": self.message,
            "retryable": self.retryable,
        })
    }
}

pub fn is_retryable_code(code: &str) -> bool {
    RETRYABLE_CODES.contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_is_retryable() {
        let err = AwsApiError::new("logs", "FilterLogEvents", Some("ThrottlingException".into()), "slow down");
        assert!(err.retryable);
        assert_eq!(err.to_json()["source"], "aws-api");
    }

    #[test]
    fn access_denied_is_not_retryable() {
        let err = AwsApiError::new("ec2", "DescribeInstances", Some("AccessDenied".into()), "nope");
        assert!(!err.retryable);
        assert!(err.to_string().contains("ec2 DescribeInstances failed (AccessDenied)"));
    }

    #[test]
    fn subscription_required_detected() {
        let err = AwsApiError::new(
            "health",
            "DescribeEvents",
            Some("SubscriptionRequiredException".into()),
            "requires a support plan",
        );
        assert!(err.is_subscription_required());
        assert!(!AwsApiError::transport("health", "DescribeEvents", "timeout").is_subscription_required());
    }

    #[test]
    fn display_names_call_and_code() {
        let err = AwsApiError::transport("xray", "BatchGetTraces", "dispatch failure");
        assert_eq!(err.to_string(), "xray BatchGetTraces failed (no error code): dispatch failure");
        let err = AwsApiError::new("sns", "GetTopicAttributes", Some("NotFound".into()), "no topic");
        assert_eq!(err.to_string(), "sns GetTopicAttributes failed (NotFound): no topic");
    }

    #[test]
    fn validation_errors_keep_kind() {
        let err = AwsApiError::validation("cloudwatch", "GetMetricData", "missing Id");
        assert!(!err.retryable);
        assert!(err.has_code("ValidationError"));
    }
}
